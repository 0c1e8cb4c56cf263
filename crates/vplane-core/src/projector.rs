//! Plane-space <-> image-space coordinate projection.
//!
//! With a calibrated [`PlaneHomography`] the projector applies the
//! perspective transforms. Without one it falls back to an anisotropic
//! linear scale from the canonical plane rectangle to the frame pixels.

use crate::PlaneHomography;
use nalgebra::Point2;
use serde::{Deserialize, Serialize};

/// Size of the canonical plane rectangle that plane coordinates live in.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct PlaneSize {
    pub width: f32,
    pub height: f32,
}

impl PlaneSize {
    pub const fn new(width: f32, height: f32) -> Self {
        Self { width, height }
    }

    /// Rectangle corners in calibration order: TL, TR, BR, BL.
    pub fn corners(&self) -> [Point2<f32>; 4] {
        [
            Point2::new(0.0, 0.0),
            Point2::new(self.width, 0.0),
            Point2::new(self.width, self.height),
            Point2::new(0.0, self.height),
        ]
    }
}

impl Default for PlaneSize {
    fn default() -> Self {
        Self::new(600.0, 400.0)
    }
}

/// Pixel dimensions of the current camera frame.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct FrameSize {
    pub width: usize,
    pub height: usize,
}

impl FrameSize {
    pub const fn new(width: usize, height: usize) -> Self {
        Self { width, height }
    }

    #[inline]
    pub fn is_empty(&self) -> bool {
        self.width == 0 || self.height == 0
    }

    #[inline]
    pub fn contains(&self, p: Point2<f32>) -> bool {
        p.x >= 0.0 && p.y >= 0.0 && p.x < self.width as f32 && p.y < self.height as f32
    }
}

/// Stateless projection between plane and image coordinates for one frame.
#[derive(Clone, Copy, Debug)]
pub struct CoordinateProjector {
    plane: PlaneSize,
    frame: FrameSize,
    homography: Option<PlaneHomography>,
}

impl CoordinateProjector {
    /// Fallback projector: linear scale only.
    pub fn linear(plane: PlaneSize, frame: FrameSize) -> Self {
        Self {
            plane,
            frame,
            homography: None,
        }
    }

    /// Pick plane mode when a homography is present, linear mode otherwise.
    pub fn new(plane: PlaneSize, frame: FrameSize, homography: Option<PlaneHomography>) -> Self {
        Self {
            plane,
            frame,
            homography,
        }
    }

    #[inline]
    pub fn is_plane_mode(&self) -> bool {
        self.homography.is_some()
    }

    #[inline]
    pub fn plane(&self) -> PlaneSize {
        self.plane
    }

    #[inline]
    pub fn frame(&self) -> FrameSize {
        self.frame
    }

    /// Map a plane point into the image. Total; the result is not clamped.
    pub fn to_image(&self, p: Point2<f32>) -> Point2<f32> {
        match &self.homography {
            Some(h) => h.to_image(p),
            // Multiply before dividing so the rectangle corners land exactly
            // on the frame corners.
            None => Point2::new(
                p.x * self.frame.width as f32 / self.plane.width,
                p.y * self.frame.height as f32 / self.plane.height,
            ),
        }
    }

    /// Map an image point into the plane.
    ///
    /// In linear mode the inverse scale is substituted; it is unavailable
    /// (`None`) only when the frame has no pixels to scale from.
    pub fn to_plane(&self, p: Point2<f32>) -> Option<Point2<f32>> {
        match &self.homography {
            Some(h) => Some(h.to_plane(p)),
            None if self.frame.is_empty() => None,
            None => Some(Point2::new(
                p.x * self.plane.width / self.frame.width as f32,
                p.y * self.plane.height / self.frame.height as f32,
            )),
        }
    }

    /// Image-space length of a horizontal plane-space segment starting at `center`.
    ///
    /// Used to size circles and rings drawn around projected plane points.
    pub fn project_length(&self, center: Point2<f32>, len: f32) -> f32 {
        let a = self.to_image(center);
        let b = self.to_image(Point2::new(center.x + len, center.y));
        (b - a).norm()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use approx::assert_relative_eq;

    #[test]
    fn fallback_maps_rectangle_to_frame_corners() {
        let plane = PlaneSize::new(600.0, 400.0);
        let frame = FrameSize::new(640, 480);
        let proj = CoordinateProjector::linear(plane, frame);

        let expected = [
            Point2::new(0.0, 0.0),
            Point2::new(640.0, 0.0),
            Point2::new(640.0, 480.0),
            Point2::new(0.0, 480.0),
        ];
        for (c, e) in plane.corners().iter().zip(expected) {
            assert_eq!(proj.to_image(*c), e);
        }
    }

    #[test]
    fn fallback_inverse_is_substituted() {
        let proj = CoordinateProjector::linear(PlaneSize::default(), FrameSize::new(1200, 800));
        let back = proj.to_plane(Point2::new(600.0, 400.0)).expect("non-empty frame");
        assert_relative_eq!(back.x, 300.0);
        assert_relative_eq!(back.y, 200.0);
    }

    #[test]
    fn empty_frame_has_no_inverse() {
        let proj = CoordinateProjector::linear(PlaneSize::default(), FrameSize::new(0, 480));
        assert!(proj.to_plane(Point2::new(1.0, 1.0)).is_none());
    }

    #[test]
    fn plane_mode_round_trips() {
        let plane = PlaneSize::default();
        let corners = [
            Point2::new(100.0, 80.0),
            Point2::new(520.0, 95.0),
            Point2::new(560.0, 420.0),
            Point2::new(70.0, 400.0),
        ];
        let h = PlaneHomography::from_corners(plane, &corners).expect("valid");
        let proj = CoordinateProjector::new(plane, FrameSize::new(640, 480), Some(h));
        assert!(proj.is_plane_mode());

        for p in [Point2::new(10.0, 10.0), Point2::new(450.0, 120.0)] {
            let back = proj.to_plane(proj.to_image(p)).expect("plane mode");
            assert!((back - p).norm() < 1e-3, "{p:?} -> {back:?}");
        }
    }

    #[test]
    fn projected_length_follows_linear_scale() {
        let proj = CoordinateProjector::linear(PlaneSize::new(600.0, 400.0), FrameSize::new(1200, 400));
        assert_relative_eq!(proj.project_length(Point2::new(100.0, 100.0), 36.0), 72.0);
    }
}
