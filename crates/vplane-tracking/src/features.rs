//! Minimum-eigenvalue ("good features to track") corner detection.
//!
//! Detection is restricted to a square window around a calibrated corner,
//! so the cost per frame is a few thousand pixels per corner regardless of
//! the frame size.

use nalgebra::Point2;
use serde::{Deserialize, Serialize};
use vplane_core::GrayImageView;

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Detector tuning for sparse, well separated features.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct FeatureParams {
    /// Keep responses above `quality_level * best_response` in the window.
    pub quality_level: f32,
    /// Minimum distance in pixels between two accepted features.
    pub min_distance: f32,
    /// Side of the structure-tensor summation block (odd).
    pub block_size: usize,
}

impl Default for FeatureParams {
    fn default() -> Self {
        Self {
            quality_level: 0.01,
            min_distance: 6.0,
            block_size: 3,
        }
    }
}

#[derive(Clone, Copy, Debug)]
struct Candidate {
    x: usize,
    y: usize,
    response: f32,
}

#[inline]
fn px(img: &GrayImageView<'_>, x: isize, y: isize) -> f32 {
    let xc = x.clamp(0, img.width as isize - 1) as usize;
    let yc = y.clamp(0, img.height as isize - 1) as usize;
    img.get(xc, yc) as f32
}

/// Sobel gradients with border replication.
#[inline]
fn sobel(img: &GrayImageView<'_>, x: isize, y: isize) -> (f32, f32) {
    let gx = (px(img, x + 1, y - 1) + 2.0 * px(img, x + 1, y) + px(img, x + 1, y + 1))
        - (px(img, x - 1, y - 1) + 2.0 * px(img, x - 1, y) + px(img, x - 1, y + 1));
    let gy = (px(img, x - 1, y + 1) + 2.0 * px(img, x, y + 1) + px(img, x + 1, y + 1))
        - (px(img, x - 1, y - 1) + 2.0 * px(img, x, y - 1) + px(img, x + 1, y - 1));
    (gx * 0.125, gy * 0.125)
}

/// Detect up to `max_features` salient points within `half_window` pixels
/// of `center`, strongest first.
///
/// Returns integer pixel positions. The window is clipped to the image; an
/// empty intersection yields no features.
#[cfg_attr(
    feature = "tracing",
    instrument(level = "debug", skip(img, params), fields(cx = center.x, cy = center.y))
)]
pub fn good_features_in_window(
    img: &GrayImageView<'_>,
    center: Point2<f32>,
    half_window: f32,
    max_features: usize,
    params: &FeatureParams,
) -> Vec<Point2<f32>> {
    if img.is_empty() || max_features == 0 || !center.x.is_finite() || !center.y.is_finite() {
        return Vec::new();
    }

    let x0 = ((center.x - half_window) as isize).max(0);
    let y0 = ((center.y - half_window) as isize).max(0);
    let x1 = ((center.x + half_window) as isize).min(img.width as isize);
    let y1 = ((center.y + half_window) as isize).min(img.height as isize);
    if x1 <= x0 || y1 <= y0 {
        return Vec::new();
    }
    let rw = (x1 - x0) as usize;
    let rh = (y1 - y0) as usize;

    // Gradient products over the window.
    let mut ixx = vec![0.0f32; rw * rh];
    let mut iyy = vec![0.0f32; rw * rh];
    let mut ixy = vec![0.0f32; rw * rh];
    for ry in 0..rh {
        for rx in 0..rw {
            let (gx, gy) = sobel(img, x0 + rx as isize, y0 + ry as isize);
            let i = ry * rw + rx;
            ixx[i] = gx * gx;
            iyy[i] = gy * gy;
            ixy[i] = gx * gy;
        }
    }

    // Box-summed structure tensor, minimum eigenvalue per pixel.
    let r = (params.block_size.max(1) / 2) as isize;
    let mut response = vec![0.0f32; rw * rh];
    let mut best = 0.0f32;
    for ry in 0..rh as isize {
        for rx in 0..rw as isize {
            let (mut a, mut b, mut c) = (0.0f32, 0.0f32, 0.0f32);
            for dy in -r..=r {
                let yy = (ry + dy).clamp(0, rh as isize - 1) as usize;
                for dx in -r..=r {
                    let xx = (rx + dx).clamp(0, rw as isize - 1) as usize;
                    let i = yy * rw + xx;
                    a += ixx[i];
                    b += ixy[i];
                    c += iyy[i];
                }
            }
            let half_trace = 0.5 * (a + c);
            let half_diff = 0.5 * (a - c);
            let min_eig = half_trace - (half_diff * half_diff + b * b).sqrt();
            response[ry as usize * rw + rx as usize] = min_eig;
            best = best.max(min_eig);
        }
    }
    if !(best > 0.0) {
        return Vec::new();
    }

    // Threshold + 3x3 local maxima.
    let threshold = params.quality_level * best;
    let mut candidates = Vec::new();
    for ry in 0..rh {
        for rx in 0..rw {
            let v = response[ry * rw + rx];
            if v < threshold || v <= 0.0 {
                continue;
            }
            let mut is_max = true;
            'nb: for dy in -1isize..=1 {
                for dx in -1isize..=1 {
                    let nx = rx as isize + dx;
                    let ny = ry as isize + dy;
                    if nx < 0 || ny < 0 || nx >= rw as isize || ny >= rh as isize {
                        continue;
                    }
                    if response[ny as usize * rw + nx as usize] > v {
                        is_max = false;
                        break 'nb;
                    }
                }
            }
            if is_max {
                candidates.push(Candidate {
                    x: x0 as usize + rx,
                    y: y0 as usize + ry,
                    response: v,
                });
            }
        }
    }

    candidates.sort_by(|a, b| b.response.total_cmp(&a.response));

    // Greedy minimum-distance selection.
    let min_d2 = params.min_distance * params.min_distance;
    let mut out: Vec<Point2<f32>> = Vec::with_capacity(max_features.min(candidates.len()));
    for c in candidates {
        let p = Point2::new(c.x as f32, c.y as f32);
        if out.iter().all(|q| (*q - p).norm_squared() >= min_d2) {
            out.push(p);
            if out.len() == max_features {
                break;
            }
        }
    }
    out
}
