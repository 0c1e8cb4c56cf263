//! Core geometry for virtual-plane tracking.
//!
//! This crate is intentionally small and purely geometric: homographies
//! between the canonical plane rectangle and the camera image, quadrilateral
//! validation, coordinate projection, and a lightweight gray image type.
//! It does *not* know about optical flow or interaction.

mod error;
mod homography;
mod image;
mod logger;
mod projector;
mod quad;

pub use error::GeometryError;
pub use homography::{homography_from_4pt, Homography, PlaneHomography};
pub use image::{sample_bilinear, sample_bilinear_u8, GrayImage, GrayImageView};
pub use projector::{CoordinateProjector, FrameSize, PlaneSize};
pub use quad::{quad_area, validate_quad};

#[cfg(feature = "tracing")]
pub use logger::{init_tracing, LOG_ENV};

pub use logger::{init_with_level, set_log_frame};
