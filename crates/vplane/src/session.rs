//! The per-frame tick loop.
//!
//! A [`SessionState`] owns the calibrator, tracker, interaction engine and
//! the previous frame. One call to [`SessionState::tick`] per camera frame
//! runs, in order: queued commands, plane tracking, dwell calibration,
//! velocity and hit resolution, then effect stepping and drawing.

use crate::config::SessionConfig;
use crate::events::{SessionCommand, SessionEvent};
use crate::overlay::{draw_overlay, OverlayState};
use log::{debug, info, warn};
use nalgebra::Point2;
use serde::Serialize;
use std::collections::VecDeque;
use std::time::Instant;
use vplane_core::{CoordinateProjector, FrameSize, GrayImage, GrayImageView};
use vplane_fx::{
    Activation, ActivationHook, DrawCommand, InteractionEngine, NodeId, VelocityEstimator,
};
use vplane_tracking::{
    AcquisitionMode, AdvanceOutcome, CalibrationError, CalibrationProgress, CalibrationStep,
    FeatureTracker, PlaneCalibrator,
};

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Input for one tick.
#[derive(Clone, Copy, Debug)]
pub struct FrameInput<'a> {
    /// Grayscale camera frame; `None` when no frame arrived this tick.
    pub image: Option<GrayImageView<'a>>,
    /// Candidate input points in image pixels. The first one is the primary
    /// point used for dwell calibration and velocity.
    pub candidates: &'a [Point2<f32>],
}

impl<'a> FrameInput<'a> {
    pub fn new(image: GrayImageView<'a>, candidates: &'a [Point2<f32>]) -> Self {
        Self {
            image: Some(image),
            candidates,
        }
    }

    pub fn without_image(candidates: &'a [Point2<f32>]) -> Self {
        Self {
            image: None,
            candidates,
        }
    }
}

/// Everything a renderer or UI needs after one tick.
#[derive(Clone, Debug, Serialize)]
pub struct TickOutput {
    pub events: Vec<SessionEvent>,
    pub draw: Vec<DrawCommand>,
    pub plane_active: bool,
    /// Current corner positions in image pixels, in plane mode.
    pub corners: Option<[Point2<f32>; 4]>,
    pub progress: CalibrationProgress,
    /// Nodes currently touched by at least one candidate.
    pub touched: Vec<NodeId>,
    /// Primary point speed in pixels per second.
    pub speed: f32,
}

/// Owned state of one interactive session.
#[derive(Debug)]
pub struct SessionState {
    config: SessionConfig,
    calibrator: PlaneCalibrator,
    tracker: FeatureTracker,
    engine: InteractionEngine,
    velocity: VelocityEstimator,
    commands: VecDeque<SessionCommand>,
    prev_frame: Option<GrayImage>,
    frame_size: FrameSize,
    /// Calibration completed on a tick without a frame; seed the tracker on
    /// the next frame.
    tracker_pending: bool,
    ticks: u64,
}

impl SessionState {
    pub fn new(config: SessionConfig) -> Self {
        let calibrator = PlaneCalibrator::new(config.plane, config.calibration.clone());
        let tracker = FeatureTracker::new(config.tracker.clone());
        let mut engine = InteractionEngine::new(
            config.build_nodes(),
            config.effects.clone(),
            config.interaction.clone(),
        );
        engine.select_effect(config.effect);
        Self {
            config,
            calibrator,
            tracker,
            engine,
            velocity: VelocityEstimator::new(),
            commands: VecDeque::new(),
            prev_frame: None,
            frame_size: FrameSize::default(),
            tracker_pending: false,
            ticks: 0,
        }
    }

    /// Replace the tracker, e.g. to plug in a different optical-flow backend.
    pub fn with_tracker(mut self, tracker: FeatureTracker) -> Self {
        self.tracker = tracker;
        self
    }

    #[inline]
    pub fn config(&self) -> &SessionConfig {
        &self.config
    }

    #[inline]
    pub fn calibrator(&self) -> &PlaneCalibrator {
        &self.calibrator
    }

    #[inline]
    pub fn tracker(&self) -> &FeatureTracker {
        &self.tracker
    }

    #[inline]
    pub fn engine(&self) -> &InteractionEngine {
        &self.engine
    }

    #[inline]
    pub fn frame_size(&self) -> FrameSize {
        self.frame_size
    }

    /// Projector for the most recent frame size.
    pub fn projector(&self) -> CoordinateProjector {
        self.calibrator.projector(self.frame_size)
    }

    /// Queue a command for the start of the next tick.
    pub fn push_command(&mut self, command: SessionCommand) {
        self.commands.push_back(command);
    }

    /// Move a node so its center sits under `image_point`. Returns `false`
    /// when the point cannot be projected or the node does not exist.
    pub fn move_node(&mut self, id: NodeId, image_point: Point2<f32>) -> bool {
        match self.projector().to_plane(image_point) {
            Some(p) => self.engine.move_node(id, p),
            None => false,
        }
    }

    /// Advance the session by one camera frame.
    ///
    /// Tracking runs first against the previous frame, then the queued
    /// commands and dwell input, then the interaction engine. A plane that
    /// completes calibration in this tick is tracked from the next frame on.
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "debug", skip(self, frame, hook), fields(candidates = frame.candidates.len()))
    )]
    pub fn tick(
        &mut self,
        frame: FrameInput<'_>,
        now: Instant,
        hook: &mut dyn ActivationHook,
    ) -> TickOutput {
        self.ticks += 1;
        vplane_core::set_log_frame(self.ticks);
        let mut events = Vec::new();

        if let Some(img) = &frame.image {
            let size = FrameSize::new(img.width, img.height);
            if size != self.frame_size {
                if self.prev_frame.take().is_some() {
                    debug!(
                        "frame size changed {}x{} -> {}x{}; dropping previous frame",
                        self.frame_size.width, self.frame_size.height, size.width, size.height
                    );
                }
                self.frame_size = size;
            }
        }

        self.track(frame.image.as_ref(), &mut events);

        while let Some(cmd) = self.commands.pop_front() {
            self.apply_command(cmd, frame.image.as_ref(), now, &mut events);
        }

        if self.calibrator.mode() == Some(AcquisitionMode::DwellHold) {
            if let Some(&p) = frame.candidates.first() {
                let step = self.calibrator.submit_candidate(p, now);
                self.handle_step(step, frame.image.as_ref(), &mut events);
            }
        }

        let speed = self.velocity.update(
            frame.candidates.first().copied(),
            now,
            &self.config.interaction,
        );
        let projector = self.projector();
        let mut record = |node: NodeId, activation: Activation| {
            hook.on_node_activated(node, activation);
            events.push(SessionEvent::NodeActivated { node, activation });
        };
        self.engine.update(frame.candidates, &projector, speed, &mut record);

        let mut draw = Vec::new();
        let overlay = OverlayState {
            corners: self.calibrator.locked_corners(),
            calibrating: self.calibrator.mode().is_some(),
            plane_active: self.calibrator.is_calibrated(),
            preview: self
                .calibrator
                .pending_point()
                .filter(|_| self.calibrator.mode() == Some(AcquisitionMode::PointerConfirm)),
        };
        draw_overlay(&self.config.overlay, &projector, &overlay, &mut draw);
        self.engine.render(&projector, &mut draw);

        TickOutput {
            events,
            draw,
            plane_active: self.calibrator.is_calibrated(),
            corners: self.calibrator.corners(),
            progress: self.calibrator.progress(),
            touched: self
                .engine
                .nodes()
                .iter()
                .filter(|n| n.touched)
                .map(|n| n.id)
                .collect(),
            speed,
        }
    }

    fn apply_command(
        &mut self,
        cmd: SessionCommand,
        image: Option<&GrayImageView<'_>>,
        now: Instant,
        events: &mut Vec<SessionEvent>,
    ) {
        match cmd {
            SessionCommand::StartCalibration { mode } => {
                self.drop_plane();
                self.calibrator.start(mode);
                events.push(SessionEvent::CalibrationStarted { mode });
            }
            SessionCommand::SubmitCandidate { point } => {
                let step = self.calibrator.submit_candidate(point, now);
                self.handle_step(step, image, events);
            }
            SessionCommand::Confirm => {
                let step = self.calibrator.confirm();
                self.handle_step(step, image, events);
            }
            SessionCommand::Reset => {
                self.drop_plane();
                self.calibrator.reset();
                events.push(SessionEvent::PlaneReset);
            }
            SessionCommand::SelectEffect { effect } => {
                self.engine.select_effect(effect);
                events.push(SessionEvent::EffectSelected { effect });
            }
        }
    }

    fn handle_step(
        &mut self,
        step: Result<CalibrationStep, CalibrationError>,
        image: Option<&GrayImageView<'_>>,
        events: &mut Vec<SessionEvent>,
    ) {
        match step {
            Ok(CalibrationStep::Pending) => {}
            Ok(CalibrationStep::CornerLocked { index, point }) => {
                events.push(SessionEvent::CornerLocked { index, point });
            }
            Ok(CalibrationStep::Completed { corners, .. }) => {
                events.push(SessionEvent::CornerLocked {
                    index: 3,
                    point: corners[3],
                });
                match image {
                    Some(img) => {
                        self.tracker.initialize(&corners, img);
                        self.prev_frame = Some(img.to_owned_image());
                        self.tracker_pending = false;
                    }
                    None => {
                        self.prev_frame = None;
                        self.tracker_pending = true;
                    }
                }
                info!("plane active");
                events.push(SessionEvent::CalibrationCompleted { corners });
            }
            Err(CalibrationError::Degenerate(err)) => {
                events.push(SessionEvent::CornersDegenerate {
                    reason: err.to_string(),
                });
            }
            Err(err) => {
                debug!("calibration input ignored: {err}");
                events.push(SessionEvent::CommandIgnored {
                    reason: err.to_string(),
                });
            }
        }
    }

    fn track(&mut self, image: Option<&GrayImageView<'_>>, events: &mut Vec<SessionEvent>) {
        let Some(img) = image else {
            return;
        };
        if !self.calibrator.is_calibrated() {
            return;
        }
        if self.tracker_pending {
            if let Some(corners) = self.calibrator.corners() {
                self.tracker.initialize(&corners, img);
            }
            self.tracker_pending = false;
            self.prev_frame = Some(img.to_owned_image());
            return;
        }

        if let Some(prev) = self.prev_frame.as_ref() {
            match self.tracker.advance(&prev.view(), img) {
                AdvanceOutcome::Updated { corners, lost } => {
                    if lost > 0 {
                        debug!("{lost} corner(s) held at their previous position");
                    }
                    let refresh = self.config.tracker.homography_refresh;
                    if let Err(err) = self.calibrator.update_corners(corners, refresh) {
                        debug!("keeping previous homography: {err}");
                    }
                }
                AdvanceOutcome::Lost { lost_corners } => {
                    warn!("plane tracking lost ({lost_corners} corners); recalibrate");
                    self.drop_plane();
                    self.calibrator.reset();
                    events.push(SessionEvent::TrackingLost { lost_corners });
                    return;
                }
                AdvanceOutcome::Regenerated | AdvanceOutcome::Inactive => {}
            }
        }

        if self.tracker.is_active() {
            match self.prev_frame.as_mut() {
                Some(prev) if prev.width == img.width && prev.height == img.height => {
                    prev.data.copy_from_slice(img.data);
                }
                _ => self.prev_frame = Some(img.to_owned_image()),
            }
        }
    }

    fn drop_plane(&mut self) {
        self.tracker.clear();
        self.prev_frame = None;
        self.tracker_pending = false;
    }
}
