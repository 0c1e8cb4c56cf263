use crate::AcquisitionMode;
use vplane_core::GeometryError;

/// Errors returned by [`crate::PlaneCalibrator`] acquisition calls.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq)]
pub enum CalibrationError {
    #[error("calibration is not acquiring corners")]
    NotAcquiring,
    #[error("operation not available in {mode:?} mode")]
    WrongMode { mode: AcquisitionMode },
    #[error("no pending corner to confirm")]
    NoPendingPoint,
    #[error("fourth corner rejected: {0}")]
    Degenerate(#[from] GeometryError),
}
