//! Calibration and frame-to-frame tracking of a virtual plane.
//!
//! The calibrator collects four image-space corners and finalizes the
//! plane homography. Once calibrated, the feature tracker follows small
//! clusters of salient points around each corner with pyramidal
//! Lucas-Kanade optical flow and re-estimates the corner positions every
//! frame.
//!
//! ## Quickstart
//!
//! ```
//! use std::time::Instant;
//! use nalgebra::Point2;
//! use vplane_core::PlaneSize;
//! use vplane_tracking::{AcquisitionMode, CalibrationParams, CalibrationStep, PlaneCalibrator};
//!
//! let mut calib = PlaneCalibrator::new(PlaneSize::default(), CalibrationParams::default());
//! calib.start(AcquisitionMode::PointerConfirm);
//! let now = Instant::now();
//! for p in [(100.0, 80.0), (520.0, 90.0), (540.0, 400.0), (80.0, 410.0)] {
//!     calib.submit_candidate(Point2::new(p.0, p.1), now).unwrap();
//!     let step = calib.confirm().unwrap();
//!     if let CalibrationStep::Completed { .. } = step {
//!         assert!(calib.is_calibrated());
//!     }
//! }
//! ```

mod calibrator;
mod error;
mod features;
mod flow;
mod pyramid;
mod tracker;

pub use calibrator::{
    AcquisitionMode, CalibrationParams, CalibrationProgress, CalibrationState, CalibrationStep,
    PlaneCalibrator,
};
pub use error::CalibrationError;
pub use features::{good_features_in_window, FeatureParams};
pub use flow::{FlowParams, OpticalFlow, PyramidalLk};
pub use pyramid::{FloatImage, Pyramid};
pub use tracker::{
    AdvanceOutcome, FeatureTracker, HomographyRefresh, TrackedCorner, TrackerParams,
};
