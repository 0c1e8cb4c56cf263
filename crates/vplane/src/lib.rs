//! High-level facade for the `vplane-*` workspace.
//!
//! This crate provides:
//! - re-exports of the geometry, tracking and effects crates
//! - a per-frame [`SessionState`] that wires calibration, plane tracking,
//!   hit testing and effects together and emits renderer-agnostic
//!   [`DrawCommand`]s plus [`SessionEvent`]s
//! - a JSON [`SessionConfig`] with defaults for every section
//! - (feature `image`) adapters from `image::GrayImage` and a scripted
//!   replay runner used by the `vplane-replay` binary
//!
//! ## Quickstart
//!
//! ```
//! use std::time::{Duration, Instant};
//! use nalgebra::Point2;
//! use vplane::{FrameInput, SessionCommand, SessionConfig, SessionState};
//! use vplane::core::GrayImage;
//! use vplane::fx::{Activation, NodeId};
//! use vplane::tracking::AcquisitionMode;
//!
//! let mut session = SessionState::new(SessionConfig::default());
//! let frame = GrayImage::new(640, 480);
//! let t0 = Instant::now();
//!
//! session.push_command(SessionCommand::StartCalibration { mode: AcquisitionMode::PointerConfirm });
//! for (i, p) in [(100.0, 80.0), (540.0, 90.0), (560.0, 420.0), (80.0, 410.0)].iter().enumerate() {
//!     session.push_command(SessionCommand::SubmitCandidate { point: Point2::new(p.0, p.1) });
//!     session.push_command(SessionCommand::Confirm);
//!     let t = t0 + Duration::from_millis(33 * i as u64);
//!     session.tick(FrameInput::new(frame.view(), &[]), t, &mut |_: NodeId, _: Activation| {});
//! }
//! assert!(session.calibrator().is_calibrated());
//! ```
//!
//! ## API map
//! - `vplane::core`: homographies, quad validation, coordinate projection, gray images.
//! - `vplane::tracking`: corner calibration, feature detection, optical flow, plane tracking.
//! - `vplane::fx`: virtual nodes, hit testing, effects and draw commands.
//! - `vplane::frame` (feature `image`): adapters from `image::GrayImage`.
//! - `vplane::replay` (feature `image`): scripted replay of recorded frames.

pub use vplane_core as core;
pub use vplane_fx as fx;
pub use vplane_tracking as tracking;

mod config;
mod events;
mod overlay;
mod session;

#[cfg(feature = "image")]
pub mod frame;
#[cfg(feature = "image")]
pub mod replay;

pub use config::{ConfigError, NodeSpec, SessionConfig};
pub use events::{SessionCommand, SessionEvent};
pub use overlay::{draw_overlay, OverlayParams, OverlayState};
pub use session::{FrameInput, SessionState, TickOutput};

pub use vplane_core::{CoordinateProjector, FrameSize, PlaneSize};
pub use vplane_fx::{Activation, ActivationHook, DrawCommand, EffectKind, NodeId, NoopHook};
pub use vplane_tracking::{AcquisitionMode, HomographyRefresh};
