//! Sparse optical flow.
//!
//! [`PyramidalLk`] is a forward-additive Lucas-Kanade tracker run
//! coarse-to-fine over an image pyramid: the displacement found on a coarse
//! level seeds the next finer level (scaled by 2). Gradients are taken at
//! the warped position in the current frame, so the 2x2 normal matrix is
//! rebuilt every iteration.
//!
//! A coarse level whose patch is too weak to constrain the motion, or whose
//! solve does not converge, is skipped and the guess from the level above is
//! passed down unchanged. On level 0 the same conditions mark the point
//! lost, as does a mean patch residual above [`FlowParams::max_residual`].

use crate::pyramid::{FloatImage, Pyramid};
use nalgebra::Point2;
use serde::{Deserialize, Serialize};
use vplane_core::GrayImageView;

/// Frame-to-frame point tracker.
///
/// Returns one entry per input point: `Some(new_position)` when the point
/// was tracked, `None` when it was lost. The outer `None` means the backend
/// produced no result at all (e.g. mismatched frame buffers).
pub trait OpticalFlow {
    fn track(
        &self,
        prev: &GrayImageView<'_>,
        next: &GrayImageView<'_>,
        points: &[Point2<f32>],
    ) -> Option<Vec<Option<Point2<f32>>>>;
}

/// Lucas-Kanade settings.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FlowParams {
    /// Patch half-size; the patch is `(2 * window_half + 1)^2` pixels.
    pub window_half: usize,
    /// Number of pyramid levels (level 0 included).
    pub max_levels: usize,
    /// Gauss-Newton iterations per level.
    pub max_iterations: usize,
    /// Stop iterating once the update is shorter than this (pixels).
    pub epsilon: f32,
    /// Gaussian sigma applied before each 2x decimation of the pyramid.
    pub pyramid_sigma: f32,
    /// Smallest eigenvalue of the patch structure tensor, per patch pixel
    /// (gray levels squared per pixel squared), for a level to be usable.
    pub min_eigenvalue: f32,
    /// Largest mean absolute intensity difference between the source patch
    /// and the tracked patch on level 0.
    pub max_residual: f32,
}

impl Default for FlowParams {
    fn default() -> Self {
        Self {
            window_half: 10,
            max_levels: 4,
            max_iterations: 30,
            epsilon: 0.01,
            pyramid_sigma: 1.0,
            min_eigenvalue: 8.0,
            max_residual: 20.0,
        }
    }
}

enum LkResult {
    Converged(f32, f32),
    MaxIter,
    /// The patch gradients do not constrain both directions.
    Singular,
}

/// Pyramidal forward-additive Lucas-Kanade.
#[derive(Clone, Debug, Default)]
pub struct PyramidalLk {
    params: FlowParams,
}

impl PyramidalLk {
    pub fn new(params: FlowParams) -> Self {
        Self { params }
    }

    pub fn params(&self) -> &FlowParams {
        &self.params
    }

    /// Track points between two prebuilt pyramids.
    pub fn track_pyramids(
        &self,
        prev: &Pyramid,
        next: &Pyramid,
        points: &[Point2<f32>],
    ) -> Vec<Option<Point2<f32>>> {
        let levels = self
            .params
            .max_levels
            .min(prev.num_levels())
            .min(next.num_levels());
        if levels == 0 {
            return vec![None; points.len()];
        }
        points
            .iter()
            .map(|p| self.track_single(prev, next, *p, levels))
            .collect()
    }

    fn track_single(
        &self,
        prev: &Pyramid,
        next: &Pyramid,
        p: Point2<f32>,
        levels: usize,
    ) -> Option<Point2<f32>> {
        let mut dx = 0.0f32;
        let mut dy = 0.0f32;

        for level in (0..levels).rev() {
            let scale = 1.0 / (1u32 << level) as f32;
            let fx = p.x * scale;
            let fy = p.y * scale;

            match self.lk_forward_additive(prev.level(level), next.level(level), fx, fy, dx, dy) {
                LkResult::Converged(ndx, ndy) => {
                    dx = ndx;
                    dy = ndy;
                }
                LkResult::MaxIter | LkResult::Singular if level == 0 => return None,
                LkResult::MaxIter | LkResult::Singular => {}
            }

            if level > 0 {
                dx *= 2.0;
                dy *= 2.0;
            }
        }

        let out = Point2::new(p.x + dx, p.y + dy);
        let base = next.level(0);
        let inside = out.x >= 0.0
            && out.y >= 0.0
            && out.x < base.width as f32
            && out.y < base.height as f32;
        if !(inside && out.x.is_finite() && out.y.is_finite()) {
            return None;
        }
        let residual = self.patch_residual(prev.level(0), base, p, dx, dy);
        (residual <= self.params.max_residual).then_some(out)
    }

    /// Mean absolute difference between the patch at `p` in `prev` and the
    /// patch displaced by `(dx, dy)` in `curr`.
    fn patch_residual(
        &self,
        prev: &FloatImage,
        curr: &FloatImage,
        p: Point2<f32>,
        dx: f32,
        dy: f32,
    ) -> f32 {
        let half = self.params.window_half as isize;
        let mut sum = 0.0f32;
        for py in -half..=half {
            for px in -half..=half {
                let (ox, oy) = (px as f32, py as f32);
                let t = prev.sample(p.x + ox, p.y + oy);
                sum += (t - curr.sample(p.x + dx + ox, p.y + dy + oy)).abs();
            }
        }
        let side = (2 * half + 1) as f32;
        sum / (side * side)
    }

    fn lk_forward_additive(
        &self,
        prev: &FloatImage,
        curr: &FloatImage,
        fx: f32,
        fy: f32,
        mut dx: f32,
        mut dy: f32,
    ) -> LkResult {
        let half = self.params.window_half as isize;
        let side = (2 * half + 1) as f32;
        let area = side * side;

        for _ in 0..self.params.max_iterations {
            let mut h00 = 0.0f32;
            let mut h01 = 0.0f32;
            let mut h11 = 0.0f32;
            let mut b0 = 0.0f32;
            let mut b1 = 0.0f32;

            for py in -half..=half {
                for px in -half..=half {
                    let ox = px as f32;
                    let oy = py as f32;

                    let t = prev.sample(fx + ox, fy + oy);
                    let wx = fx + dx + ox;
                    let wy = fy + dy + oy;
                    let e = t - curr.sample(wx, wy);

                    let gx = 0.5 * (curr.sample(wx + 1.0, wy) - curr.sample(wx - 1.0, wy));
                    let gy = 0.5 * (curr.sample(wx, wy + 1.0) - curr.sample(wx, wy - 1.0));

                    h00 += gx * gx;
                    h01 += gx * gy;
                    h11 += gy * gy;
                    b0 += gx * e;
                    b1 += gy * e;
                }
            }

            let det = h00 * h11 - h01 * h01;
            let half_diff = 0.5 * (h00 - h11);
            let min_eig = (0.5 * (h00 + h11) - (half_diff * half_diff + h01 * h01).sqrt()) / area;
            if det.abs() < 1e-6 || !(min_eig >= self.params.min_eigenvalue) {
                return LkResult::Singular;
            }
            let inv_det = 1.0 / det;
            let step_x = inv_det * (h11 * b0 - h01 * b1);
            let step_y = inv_det * (h00 * b1 - h01 * b0);

            dx += step_x;
            dy += step_y;

            if step_x * step_x + step_y * step_y < self.params.epsilon * self.params.epsilon {
                return LkResult::Converged(dx, dy);
            }
        }

        LkResult::MaxIter
    }
}

impl OpticalFlow for PyramidalLk {
    fn track(
        &self,
        prev: &GrayImageView<'_>,
        next: &GrayImageView<'_>,
        points: &[Point2<f32>],
    ) -> Option<Vec<Option<Point2<f32>>>> {
        if prev.width != next.width || prev.height != next.height || prev.is_empty() {
            return None;
        }
        let prev_pyr = Pyramid::build(prev, self.params.max_levels, self.params.pyramid_sigma);
        let next_pyr = Pyramid::build(next, self.params.max_levels, self.params.pyramid_sigma);
        Some(self.track_pyramids(&prev_pyr, &next_pyr, points))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use vplane_core::GrayImage;

    /// Smooth blobs on a dark background, shifted by (sx, sy).
    fn blob_scene(sx: f32, sy: f32) -> GrayImage {
        let blobs = [(40.0f32, 40.0f32), (80.0, 45.0), (50.0, 85.0), (90.0, 90.0)];
        GrayImage::from_fn(128, 128, |x, y| {
            let mut v = 30.0f32;
            for (bx, by) in blobs {
                let dx = x as f32 - (bx + sx);
                let dy = y as f32 - (by + sy);
                v += 180.0 * (-(dx * dx + dy * dy) / 50.0).exp();
            }
            v.min(255.0) as u8
        })
    }

    #[test]
    fn tracks_small_translation() {
        let a = blob_scene(0.0, 0.0);
        let b = blob_scene(3.0, -2.0);
        let lk = PyramidalLk::new(FlowParams {
            window_half: 7,
            ..FlowParams::default()
        });

        // Points on blob flanks where both gradient directions are present.
        let pts = [Point2::new(36.0f32, 36.0), Point2::new(84.0, 49.0)];
        let out = lk.track(&a.view(), &b.view(), &pts).expect("same-size frames");
        for (p, q) in pts.iter().zip(out) {
            let q = q.expect("tracked");
            assert!((q.x - (p.x + 3.0)).abs() < 0.5, "x {} -> {}", p.x, q.x);
            assert!((q.y - (p.y - 2.0)).abs() < 0.5, "y {} -> {}", p.y, q.y);
        }
    }

    /// Egg-crate texture with a period of about 22 px, shifted by (sx, sy),
    /// plus a constant brightness offset.
    fn egg_crate(w: usize, h: usize, sx: f32, sy: f32, offset: f32) -> GrayImage {
        GrayImage::from_fn(w, h, |x, y| {
            let u = x as f32 - sx;
            let v = y as f32 - sy;
            (offset + 128.0 + 60.0 * (u / 3.5).sin() * (v / 3.5).sin()).round() as u8
        })
    }

    #[test]
    fn four_levels_follow_fine_periodic_texture() {
        // The coarsest level of this texture is close to aliasing; it must
        // not pull the estimate onto a neighbouring period.
        let a = egg_crate(240, 200, 0.0, 0.0, 0.0);
        let b = egg_crate(240, 200, 2.0, 1.0, 0.0);
        let lk = PyramidalLk::default();
        assert_eq!(lk.params().max_levels, 4);

        let mut pts = Vec::new();
        for dx in [-24.0f32, -13.0, -5.0, 3.0, 11.0, 22.0] {
            for dy in [-25.0f32, -9.0, 6.0, 19.0] {
                pts.push(Point2::new(80.0 + dx, 70.0 + dy));
            }
        }
        let out = lk.track(&a.view(), &b.view(), &pts).expect("same-size frames");
        for (p, q) in pts.iter().zip(out) {
            let q = q.unwrap_or_else(|| panic!("{p:?} lost"));
            assert!((q.x - (p.x + 2.0)).abs() < 0.3, "x {} -> {}", p.x, q.x);
            assert!((q.y - (p.y + 1.0)).abs() < 0.3, "y {} -> {}", p.y, q.y);
        }
    }

    #[test]
    fn brightness_jump_fails_residual_check() {
        let a = egg_crate(128, 128, 0.0, 0.0, 0.0);
        let b = egg_crate(128, 128, 0.0, 0.0, 50.0);
        let lk = PyramidalLk::default();
        let pts = [Point2::new(40.0f32, 40.0), Point2::new(64.0, 50.0)];
        let out = lk.track(&a.view(), &b.view(), &pts).expect("same-size frames");
        assert_eq!(out, vec![None, None]);

        let tolerant = PyramidalLk::new(FlowParams {
            max_residual: 60.0,
            ..FlowParams::default()
        });
        let out = tolerant.track(&a.view(), &b.view(), &pts).expect("same-size frames");
        assert!(out.iter().all(Option::is_some));
    }

    #[test]
    fn unconverged_points_are_lost() {
        let a = egg_crate(128, 128, 0.0, 0.0, 0.0);
        let b = egg_crate(128, 128, 3.0, 0.0, 0.0);
        let pts = [Point2::new(40.0f32, 40.0), Point2::new(64.0, 50.0)];

        let hurried = PyramidalLk::new(FlowParams {
            max_iterations: 1,
            ..FlowParams::default()
        });
        let out = hurried.track(&a.view(), &b.view(), &pts).expect("same-size frames");
        assert_eq!(out, vec![None, None]);

        let out = PyramidalLk::default()
            .track(&a.view(), &b.view(), &pts)
            .expect("same-size frames");
        for (p, q) in pts.iter().zip(out) {
            let q = q.expect("tracked");
            assert!((q.x - (p.x + 3.0)).abs() < 0.3 && (q.y - p.y).abs() < 0.3);
        }
    }

    #[test]
    fn flat_patch_is_lost() {
        let a = GrayImage::from_fn(64, 64, |_, _| 100);
        let lk = PyramidalLk::default();
        let out = lk
            .track(&a.view(), &a.view(), &[Point2::new(32.0, 32.0)])
            .expect("same-size frames");
        assert_eq!(out, vec![None]);
    }

    #[test]
    fn mismatched_frames_give_no_result() {
        let a = GrayImage::new(64, 64);
        let b = GrayImage::new(32, 64);
        let lk = PyramidalLk::default();
        assert!(lk.track(&a.view(), &b.view(), &[]).is_none());
    }
}
