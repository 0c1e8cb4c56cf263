//! Four-corner plane calibration.
//!
//! Two acquisition modes share one state machine:
//!
//! - [`AcquisitionMode::PointerConfirm`]: every candidate replaces the
//!   pending point; [`PlaneCalibrator::confirm`] locks it.
//! - [`AcquisitionMode::DwellHold`]: a candidate that stays within
//!   `stable_radius_px` of its anchor for `dwell_secs` locks automatically.
//!
//! The fourth corner is validated (area, convexity, invertible transform)
//! before the calibrator switches to [`CalibrationState::Calibrated`].

use crate::error::CalibrationError;
use crate::tracker::HomographyRefresh;
use log::{debug, info, warn};
use nalgebra::Point2;
use serde::{Deserialize, Serialize};
use std::time::Instant;
use vplane_core::{
    validate_quad, CoordinateProjector, FrameSize, GeometryError, PlaneHomography, PlaneSize,
};

/// How corner candidates become locked corners.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum AcquisitionMode {
    PointerConfirm,
    DwellHold,
}

/// Calibration tuning.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct CalibrationParams {
    /// Dwell mode: maximum drift from the anchor (pixels).
    pub stable_radius_px: f32,
    /// Dwell mode: hold time before a corner locks (seconds).
    pub dwell_secs: f32,
    /// Smallest accepted quadrilateral area (square pixels).
    pub min_quad_area_px: f32,
}

impl Default for CalibrationParams {
    fn default() -> Self {
        Self {
            stable_radius_px: 20.0,
            dwell_secs: 0.45,
            min_quad_area_px: 100.0,
        }
    }
}

/// Public view of the calibrator state.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum CalibrationState {
    Idle,
    Acquiring {
        mode: AcquisitionMode,
        /// Index of the next corner to lock (0..=3).
        index: usize,
    },
    Calibrated,
}

/// Locked corners out of the four required.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct CalibrationProgress {
    pub locked: usize,
    pub total: usize,
}

impl CalibrationProgress {
    pub const TOTAL: usize = 4;

    pub fn fraction(&self) -> f32 {
        self.locked as f32 / self.total as f32
    }
}

/// Result of feeding the calibrator.
#[derive(Clone, Copy, Debug, PartialEq)]
pub enum CalibrationStep {
    /// The candidate was recorded; nothing locked yet.
    Pending,
    /// Corner `index` locked at `point`.
    CornerLocked { index: usize, point: Point2<f32> },
    /// The fourth corner locked and the plane homography is ready.
    Completed {
        corners: [Point2<f32>; 4],
        homography: PlaneHomography,
    },
}

#[derive(Clone, Copy, Debug)]
struct DwellAnchor {
    point: Point2<f32>,
    since: Instant,
}

#[derive(Clone, Debug)]
struct Acquisition {
    mode: AcquisitionMode,
    locked: Vec<Point2<f32>>,
    pending: Option<Point2<f32>>,
    anchor: Option<DwellAnchor>,
}

#[derive(Clone, Debug)]
enum Phase {
    Idle,
    Acquiring(Acquisition),
    Calibrated {
        corners: [Point2<f32>; 4],
        homography: PlaneHomography,
    },
}

/// Collects four image-space corners and owns the resulting plane
/// homography.
#[derive(Clone, Debug)]
pub struct PlaneCalibrator {
    plane: PlaneSize,
    params: CalibrationParams,
    phase: Phase,
}

impl PlaneCalibrator {
    pub fn new(plane: PlaneSize, params: CalibrationParams) -> Self {
        Self {
            plane,
            params,
            phase: Phase::Idle,
        }
    }

    #[inline]
    pub fn plane(&self) -> PlaneSize {
        self.plane
    }

    #[inline]
    pub fn params(&self) -> &CalibrationParams {
        &self.params
    }

    /// Drop any existing calibration and begin acquiring corner 0.
    pub fn start(&mut self, mode: AcquisitionMode) {
        info!("calibration started ({mode:?})");
        self.phase = Phase::Acquiring(Acquisition {
            mode,
            locked: Vec::with_capacity(4),
            pending: None,
            anchor: None,
        });
    }

    /// Return to `Idle`, dropping corners and the homography.
    pub fn reset(&mut self) {
        if !matches!(self.phase, Phase::Idle) {
            info!("calibration reset");
        }
        self.phase = Phase::Idle;
    }

    /// Feed a candidate corner position.
    ///
    /// Pointer mode records it as the pending point. Dwell mode updates the
    /// stability anchor and locks the corner once the hold time elapsed.
    pub fn submit_candidate(
        &mut self,
        point: Point2<f32>,
        now: Instant,
    ) -> Result<CalibrationStep, CalibrationError> {
        let radius = self.params.stable_radius_px;
        let hold = self.params.dwell_secs;
        let Phase::Acquiring(acq) = &mut self.phase else {
            return Err(CalibrationError::NotAcquiring);
        };

        match acq.mode {
            AcquisitionMode::PointerConfirm => {
                acq.pending = Some(point);
                Ok(CalibrationStep::Pending)
            }
            AcquisitionMode::DwellHold => {
                acq.pending = Some(point);
                match acq.anchor {
                    Some(anchor) if (point - anchor.point).norm() <= radius => {
                        let held = now.saturating_duration_since(anchor.since).as_secs_f32();
                        if held >= hold {
                            self.lock(point)
                        } else {
                            Ok(CalibrationStep::Pending)
                        }
                    }
                    _ => {
                        acq.anchor = Some(DwellAnchor { point, since: now });
                        Ok(CalibrationStep::Pending)
                    }
                }
            }
        }
    }

    /// Pointer mode: lock the pending point as the current corner.
    pub fn confirm(&mut self) -> Result<CalibrationStep, CalibrationError> {
        let Phase::Acquiring(acq) = &self.phase else {
            return Err(CalibrationError::NotAcquiring);
        };
        if acq.mode != AcquisitionMode::PointerConfirm {
            return Err(CalibrationError::WrongMode { mode: acq.mode });
        }
        let Some(point) = acq.pending else {
            return Err(CalibrationError::NoPendingPoint);
        };
        self.lock(point)
    }

    fn lock(&mut self, point: Point2<f32>) -> Result<CalibrationStep, CalibrationError> {
        let Phase::Acquiring(acq) = &mut self.phase else {
            return Err(CalibrationError::NotAcquiring);
        };
        acq.locked.push(point);
        acq.pending = None;
        acq.anchor = None;
        let index = acq.locked.len() - 1;

        if acq.locked.len() < 4 {
            info!("corner {index} locked at ({:.1}, {:.1})", point.x, point.y);
            return Ok(CalibrationStep::CornerLocked { index, point });
        }

        let corners = [acq.locked[0], acq.locked[1], acq.locked[2], acq.locked[3]];
        match self.finalize(&corners) {
            Ok(homography) => {
                info!("calibration complete: corners {corners:?}");
                self.phase = Phase::Calibrated {
                    corners,
                    homography,
                };
                Ok(CalibrationStep::Completed {
                    corners,
                    homography,
                })
            }
            Err(err) => {
                warn!("fourth corner rejected: {err}");
                if let Phase::Acquiring(acq) = &mut self.phase {
                    acq.locked.pop();
                }
                Err(CalibrationError::Degenerate(err))
            }
        }
    }

    fn finalize(&self, corners: &[Point2<f32>; 4]) -> Result<PlaneHomography, GeometryError> {
        validate_quad(corners, self.params.min_quad_area_px)?;
        PlaneHomography::from_corners(self.plane, corners)
    }

    /// Feed tracked corner positions back into a calibrated plane.
    ///
    /// With [`HomographyRefresh::PerFrame`] the transforms are recomputed;
    /// if the new quadrilateral is unusable the previous transforms stay
    /// and the error is returned. The stored corners always follow the
    /// tracker. Does nothing when not calibrated.
    pub fn update_corners(
        &mut self,
        tracked: [Point2<f32>; 4],
        refresh: HomographyRefresh,
    ) -> Result<(), GeometryError> {
        let refreshed = match refresh {
            HomographyRefresh::PerFrame if self.is_calibrated() => Some(self.finalize(&tracked)),
            _ => None,
        };
        let Phase::Calibrated {
            corners,
            homography,
        } = &mut self.phase
        else {
            return Ok(());
        };
        *corners = tracked;
        match refreshed {
            Some(Ok(h)) => {
                *homography = h;
                Ok(())
            }
            Some(Err(err)) => {
                debug!("homography refresh skipped: {err}");
                Err(err)
            }
            None => Ok(()),
        }
    }

    #[inline]
    pub fn is_calibrated(&self) -> bool {
        matches!(self.phase, Phase::Calibrated { .. })
    }

    pub fn state(&self) -> CalibrationState {
        match &self.phase {
            Phase::Idle => CalibrationState::Idle,
            Phase::Acquiring(acq) => CalibrationState::Acquiring {
                mode: acq.mode,
                index: acq.locked.len(),
            },
            Phase::Calibrated { .. } => CalibrationState::Calibrated,
        }
    }

    pub fn mode(&self) -> Option<AcquisitionMode> {
        match &self.phase {
            Phase::Acquiring(acq) => Some(acq.mode),
            _ => None,
        }
    }

    pub fn homography(&self) -> Option<PlaneHomography> {
        match &self.phase {
            Phase::Calibrated { homography, .. } => Some(*homography),
            _ => None,
        }
    }

    /// Current plane corners (tracked positions once calibrated).
    pub fn corners(&self) -> Option<[Point2<f32>; 4]> {
        match &self.phase {
            Phase::Calibrated { corners, .. } => Some(*corners),
            _ => None,
        }
    }

    /// Corners locked so far; all four once calibrated.
    pub fn locked_corners(&self) -> &[Point2<f32>] {
        match &self.phase {
            Phase::Idle => &[],
            Phase::Acquiring(acq) => acq.locked.as_slice(),
            Phase::Calibrated { corners, .. } => corners.as_slice(),
        }
    }

    pub fn pending_point(&self) -> Option<Point2<f32>> {
        match &self.phase {
            Phase::Acquiring(acq) => acq.pending,
            _ => None,
        }
    }

    pub fn progress(&self) -> CalibrationProgress {
        CalibrationProgress {
            locked: self.locked_corners().len(),
            total: CalibrationProgress::TOTAL,
        }
    }

    /// Projector for a frame of the given size, in plane mode when
    /// calibrated and linear mode otherwise.
    pub fn projector(&self, frame: FrameSize) -> CoordinateProjector {
        CoordinateProjector::new(self.plane, frame, self.homography())
    }
}
