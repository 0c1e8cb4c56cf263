use std::time::{Duration, Instant};

use approx::assert_relative_eq;
use nalgebra::Point2;
use vplane::core::{GrayImage, GrayImageView};
use vplane::fx::{Activation, NodeId};
use vplane::tracking::{CalibrationState, FeatureTracker, OpticalFlow};
use vplane::{
    AcquisitionMode, EffectKind, FrameInput, FrameSize, NoopHook, SessionCommand, SessionConfig,
    SessionEvent, SessionState,
};

const CORNERS: [(f32, f32); 4] = [(100.0, 80.0), (540.0, 90.0), (560.0, 420.0), (80.0, 410.0)];

/// Optical flow that loses every point.
struct DeadFlow;

impl OpticalFlow for DeadFlow {
    fn track(
        &self,
        _prev: &GrayImageView<'_>,
        _next: &GrayImageView<'_>,
        points: &[Point2<f32>],
    ) -> Option<Vec<Option<Point2<f32>>>> {
        Some(vec![None; points.len()])
    }
}

fn textured(width: usize, height: usize) -> GrayImage {
    textured_at(width, height, 0.0, 0.0)
}

/// Egg-crate texture translated by `(sx, sy)` pixels.
fn textured_at(width: usize, height: usize, sx: f32, sy: f32) -> GrayImage {
    GrayImage::from_fn(width, height, |x, y| {
        let (u, v) = (x as f32 - sx, y as f32 - sy);
        (128.0 + 60.0 * (u / 3.5).sin() * (v / 3.5).sin()) as u8
    })
}

fn feature_centroids(session: &SessionState) -> Vec<Point2<f32>> {
    session
        .tracker()
        .corners()
        .expect("active tracker")
        .iter()
        .map(|c| {
            let n = c.features.len() as f32;
            let sx: f32 = c.features.iter().map(|p| p.x).sum();
            let sy: f32 = c.features.iter().map(|p| p.y).sum();
            Point2::new(sx / n, sy / n)
        })
        .collect()
}

fn ms(t0: Instant, ms: u64) -> Instant {
    t0 + Duration::from_millis(ms)
}

fn queue_pointer_calibration(session: &mut SessionState, corners: &[(f32, f32)]) {
    session.push_command(SessionCommand::StartCalibration {
        mode: AcquisitionMode::PointerConfirm,
    });
    for &(x, y) in corners {
        session.push_command(SessionCommand::SubmitCandidate {
            point: Point2::new(x, y),
        });
        session.push_command(SessionCommand::Confirm);
    }
}

#[test]
fn pointer_calibration_activates_plane_mode() {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut session = SessionState::new(SessionConfig::default());
    let frame = textured(640, 480);
    queue_pointer_calibration(&mut session, &CORNERS);

    let out = session.tick(FrameInput::new(frame.view(), &[]), Instant::now(), &mut NoopHook);

    assert!(out.plane_active);
    assert_eq!(out.progress.locked, 4);
    assert!(matches!(
        out.events.first(),
        Some(SessionEvent::CalibrationStarted {
            mode: AcquisitionMode::PointerConfirm
        })
    ));
    let locked: Vec<usize> = out
        .events
        .iter()
        .filter_map(|e| match e {
            SessionEvent::CornerLocked { index, .. } => Some(*index),
            _ => None,
        })
        .collect();
    assert_eq!(locked, vec![0, 1, 2, 3]);
    assert!(matches!(
        out.events.last(),
        Some(SessionEvent::CalibrationCompleted { .. })
    ));
    assert!(session.tracker().is_active());

    let proj = session.projector();
    assert!(proj.is_plane_mode());
    let plane_corners = session.config().plane.corners();
    for (pc, &(x, y)) in plane_corners.iter().zip(CORNERS.iter()) {
        let ip = proj.to_image(*pc);
        assert_relative_eq!(ip.x, x, epsilon = 0.05);
        assert_relative_eq!(ip.y, y, epsilon = 0.05);
    }
    for p in [Point2::new(300.0, 200.0), Point2::new(17.0, 333.0)] {
        let back = proj.to_plane(proj.to_image(p)).expect("invertible");
        assert_relative_eq!(back.x, p.x, epsilon = 0.05);
        assert_relative_eq!(back.y, p.y, epsilon = 0.05);
    }
}

#[test]
fn calibration_tick_reports_confirmed_corners() {
    let mut session = SessionState::new(SessionConfig::default());
    let frame = textured(640, 480);
    queue_pointer_calibration(&mut session, &CORNERS);

    let out = session.tick(FrameInput::new(frame.view(), &[]), Instant::now(), &mut NoopHook);
    assert!(out.plane_active);
    let expected = CORNERS.map(|(x, y)| Point2::new(x, y));
    assert_eq!(out.corners, Some(expected));
    assert_eq!(session.calibrator().corners(), Some(expected));
}

#[test]
fn low_texture_plane_survives_its_calibration_tick() {
    let mut session = SessionState::new(SessionConfig::default());
    let blank = GrayImage::from_fn(640, 480, |_, _| 90);
    queue_pointer_calibration(&mut session, &CORNERS);

    let out = session.tick(FrameInput::new(blank.view(), &[]), Instant::now(), &mut NoopHook);
    assert!(out.plane_active);
    assert!(!out
        .events
        .iter()
        .any(|e| matches!(e, SessionEvent::TrackingLost { .. })));
    assert!(session.calibrator().is_calibrated());
}

#[test]
fn optical_flow_follows_shifted_frame_after_calibration() {
    let _ = env_logger::builder().is_test(true).try_init();
    let mut session = SessionState::new(SessionConfig::default());
    let t0 = Instant::now();
    let f0 = textured(640, 480);
    let f1 = textured_at(640, 480, 2.0, 1.0);

    queue_pointer_calibration(&mut session, &CORNERS);
    let out = session.tick(FrameInput::new(f0.view(), &[]), t0, &mut NoopHook);
    assert!(out.plane_active);
    let before = feature_centroids(&session);

    let out = session.tick(FrameInput::new(f1.view(), &[]), ms(t0, 33), &mut NoopHook);
    assert!(out.plane_active);
    assert!(!out
        .events
        .iter()
        .any(|e| matches!(e, SessionEvent::TrackingLost { .. })));
    let corners = out.corners.expect("plane corners");
    for (c, b) in corners.iter().zip(&before) {
        assert_relative_eq!(c.x, b.x + 2.0, epsilon = 0.3);
        assert_relative_eq!(c.y, b.y + 1.0, epsilon = 0.3);
    }

    // Per-frame refresh: the plane outline maps onto the tracked corners.
    let proj = session.projector();
    for (pc, c) in session.config().plane.corners().iter().zip(&corners) {
        let ip = proj.to_image(*pc);
        assert_relative_eq!(ip.x, c.x, epsilon = 0.05);
        assert_relative_eq!(ip.y, c.y, epsilon = 0.05);
    }
}

#[test]
fn held_point_fires_hook_once() {
    let mut session = SessionState::new(SessionConfig::default());
    let frame = GrayImage::new(600, 400);
    // Frame matches the plane, so the center node sits at (300, 200).
    let inside = [Point2::new(300.0, 200.0)];
    let t0 = Instant::now();

    let mut calls = Vec::new();
    let mut activated_events = 0;
    let mut hook = |id: NodeId, _: Activation| calls.push(id);
    for i in 0..10 {
        let out = session.tick(FrameInput::new(frame.view(), &inside), ms(t0, 33 * i), &mut hook);
        assert_eq!(out.touched, vec![NodeId(1)]);
        activated_events += out
            .events
            .iter()
            .filter(|e| matches!(e, SessionEvent::NodeActivated { .. }))
            .count();
    }
    assert_eq!(calls, vec![NodeId(1)]);
    assert_eq!(activated_events, 1);

    let out = session.tick(FrameInput::new(frame.view(), &[]), ms(t0, 400), &mut NoopHook);
    assert!(out.touched.is_empty());
}

#[test]
fn tracking_loss_resets_in_the_same_tick() {
    let _ = env_logger::builder().is_test(true).try_init();
    let config = SessionConfig::default();
    let tracker = FeatureTracker::with_flow(config.tracker.clone(), Box::new(DeadFlow));
    let mut session = SessionState::new(config).with_tracker(tracker);
    let frame = textured(640, 480);
    let t0 = Instant::now();

    queue_pointer_calibration(&mut session, &CORNERS);
    let out = session.tick(FrameInput::new(frame.view(), &[]), t0, &mut NoopHook);
    assert!(out.plane_active);

    let out = session.tick(FrameInput::new(frame.view(), &[]), ms(t0, 33), &mut NoopHook);
    assert!(!out.plane_active);
    assert!(out
        .events
        .contains(&SessionEvent::TrackingLost { lost_corners: 4 }));
    assert!(matches!(session.calibrator().state(), CalibrationState::Idle));
    assert!(!session.tracker().is_active());
    assert!(!session.projector().is_plane_mode());
}

#[test]
fn degenerate_fourth_corner_keeps_acquiring() {
    let mut session = SessionState::new(SessionConfig::default());
    let frame = textured(640, 480);
    let t0 = Instant::now();

    // The fourth point is collinear with the third and the first.
    queue_pointer_calibration(&mut session, &[CORNERS[0], CORNERS[1], CORNERS[2], (330.0, 250.0)]);
    let out = session.tick(FrameInput::new(frame.view(), &[]), t0, &mut NoopHook);
    assert!(!out.plane_active);
    assert_eq!(out.progress.locked, 3);
    assert!(out
        .events
        .iter()
        .any(|e| matches!(e, SessionEvent::CornersDegenerate { .. })));

    session.push_command(SessionCommand::SubmitCandidate {
        point: Point2::new(CORNERS[3].0, CORNERS[3].1),
    });
    session.push_command(SessionCommand::Confirm);
    let out = session.tick(FrameInput::new(frame.view(), &[]), ms(t0, 33), &mut NoopHook);
    assert!(out.plane_active);
}

#[test]
fn confirm_without_calibration_is_ignored() {
    let mut session = SessionState::new(SessionConfig::default());
    session.push_command(SessionCommand::Confirm);
    let out = session.tick(FrameInput::without_image(&[]), Instant::now(), &mut NoopHook);
    assert!(matches!(
        out.events.as_slice(),
        [SessionEvent::CommandIgnored { .. }]
    ));
}

#[test]
fn frame_size_change_drops_previous_frame() {
    let mut session = SessionState::new(SessionConfig::default());
    let big = textured(640, 480);
    let small = textured(320, 240);
    let t0 = Instant::now();

    queue_pointer_calibration(&mut session, &CORNERS);
    session.tick(FrameInput::new(big.view(), &[]), t0, &mut NoopHook);
    assert_eq!(session.frame_size(), FrameSize::new(640, 480));

    let out = session.tick(FrameInput::new(small.view(), &[]), ms(t0, 33), &mut NoopHook);
    assert_eq!(session.frame_size(), FrameSize::new(320, 240));
    assert_eq!(session.projector().frame(), FrameSize::new(320, 240));
    assert!(out.plane_active);
    assert!(!out
        .events
        .iter()
        .any(|e| matches!(e, SessionEvent::TrackingLost { .. })));
}

#[test]
fn dwell_calibration_locks_after_hold() {
    let mut session = SessionState::new(SessionConfig::default());
    let frame = GrayImage::new(640, 480);
    let t0 = Instant::now();
    let held = [Point2::new(100.0, 80.0)];

    session.push_command(SessionCommand::StartCalibration {
        mode: AcquisitionMode::DwellHold,
    });
    let out = session.tick(FrameInput::new(frame.view(), &held), t0, &mut NoopHook);
    assert_eq!(out.progress.locked, 0);

    let out = session.tick(FrameInput::new(frame.view(), &held), ms(t0, 200), &mut NoopHook);
    assert_eq!(out.progress.locked, 0);

    // Small jitter within the stable radius does not restart the hold.
    let jitter = [Point2::new(104.0, 83.0)];
    let out = session.tick(FrameInput::new(frame.view(), &jitter), ms(t0, 500), &mut NoopHook);
    assert_eq!(out.progress.locked, 1);
    assert!(out
        .events
        .iter()
        .any(|e| matches!(e, SessionEvent::CornerLocked { index: 0, .. })));

    // No candidate: nothing happens.
    let out = session.tick(FrameInput::new(frame.view(), &[]), ms(t0, 2000), &mut NoopHook);
    assert_eq!(out.progress.locked, 1);
}

#[test]
fn move_node_and_select_effect() {
    let mut session = SessionState::new(SessionConfig::default());
    let frame = GrayImage::new(1200, 800);
    session.tick(FrameInput::new(frame.view(), &[]), Instant::now(), &mut NoopHook);

    // Linear mode with a frame twice the plane size halves image coordinates.
    assert!(session.move_node(NodeId(0), Point2::new(100.0, 120.0)));
    let node = session.engine().node(NodeId(0)).expect("node 0");
    assert_relative_eq!(node.center.x, 50.0, epsilon = 1e-4);
    assert_relative_eq!(node.center.y, 60.0, epsilon = 1e-4);
    assert!(!session.move_node(NodeId(42), Point2::new(1.0, 1.0)));

    session.push_command(SessionCommand::SelectEffect {
        effect: EffectKind::Shockwave,
    });
    let out = session.tick(FrameInput::new(frame.view(), &[]), Instant::now(), &mut NoopHook);
    assert_eq!(
        out.events,
        vec![SessionEvent::EffectSelected {
            effect: EffectKind::Shockwave
        }]
    );
    assert_eq!(session.engine().selected_effect(), EffectKind::Shockwave);
}

#[test]
fn commands_round_trip_through_json() {
    let cmd: SessionCommand =
        serde_json::from_str(r#"{ "type": "start_calibration", "mode": "dwell-hold" }"#)
            .expect("parse");
    assert_eq!(
        cmd,
        SessionCommand::StartCalibration {
            mode: AcquisitionMode::DwellHold
        }
    );
    let event = serde_json::to_value(SessionEvent::TrackingLost { lost_corners: 2 }).expect("json");
    assert_eq!(event["event"], "tracking_lost");
    assert_eq!(event["lost_corners"], 2);
}
