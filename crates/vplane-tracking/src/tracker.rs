//! Per-corner feature tracking for a calibrated plane.

use crate::features::{good_features_in_window, FeatureParams};
use crate::flow::{FlowParams, OpticalFlow, PyramidalLk};
use log::{debug, warn};
use nalgebra::Point2;
use serde::{Deserialize, Serialize};
use vplane_core::GrayImageView;

#[cfg(feature = "tracing")]
use tracing::instrument;

/// What happens to the plane homography when corners move under tracking.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "kebab-case")]
pub enum HomographyRefresh {
    /// Recompute both transforms from the tracked corners after every
    /// successful tracking step.
    #[default]
    PerFrame,
    /// Keep the transforms computed at calibration time; only the outline
    /// follows the tracked corners.
    Fixed,
}

/// Feature tracker tuning.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct TrackerParams {
    /// Target cardinality of each corner's feature set.
    pub target_features_per_corner: usize,
    /// Below this many detections the corner point itself is added.
    pub min_features_per_corner: usize,
    /// A corner is lost when fewer than `lost_fraction * target` features track.
    pub lost_fraction: f32,
    /// Number of lost corners in one frame that counts as tracking failure.
    pub max_lost_corners: usize,
    /// Detection half-window at calibration time (pixels).
    pub init_window_px: f32,
    /// Detection half-window when regenerating after each frame (pixels).
    pub regen_window_px: f32,
    pub homography_refresh: HomographyRefresh,
    pub features: FeatureParams,
    pub flow: FlowParams,
}

impl Default for TrackerParams {
    fn default() -> Self {
        Self {
            target_features_per_corner: 40,
            min_features_per_corner: 4,
            lost_fraction: 0.25,
            max_lost_corners: 2,
            init_window_px: 30.0,
            regen_window_px: 35.0,
            homography_refresh: HomographyRefresh::PerFrame,
            features: FeatureParams::default(),
            flow: FlowParams::default(),
        }
    }
}

impl TrackerParams {
    /// Minimum number of successfully tracked features for a corner to
    /// survive a frame.
    pub fn min_tracked_per_corner(&self) -> usize {
        ((self.lost_fraction * self.target_features_per_corner as f32) as usize).max(1)
    }
}

/// One calibrated corner and the image features that follow it.
#[derive(Clone, Debug, PartialEq)]
pub struct TrackedCorner {
    pub position: Point2<f32>,
    pub features: Vec<Point2<f32>>,
}

/// Result of one [`FeatureTracker::advance`] call.
#[derive(Clone, Debug, PartialEq)]
pub enum AdvanceOutcome {
    /// Nothing to track (no calibration).
    Inactive,
    /// The flow backend produced no result; features were re-seeded around
    /// the unchanged corners.
    Regenerated,
    /// Corners were re-estimated. `lost` corners kept their old position.
    Updated {
        corners: [Point2<f32>; 4],
        lost: usize,
    },
    /// Too many corners were lost in one frame. The tracker is now empty.
    Lost { lost_corners: usize },
}

/// Maintains the per-corner feature sets and re-estimates corners each frame.
pub struct FeatureTracker {
    params: TrackerParams,
    flow: Box<dyn OpticalFlow + Send>,
    corners: Option<[TrackedCorner; 4]>,
}

impl FeatureTracker {
    pub fn new(params: TrackerParams) -> Self {
        let flow = Box::new(PyramidalLk::new(params.flow.clone()));
        Self::with_flow(params, flow)
    }

    /// Use a custom optical-flow backend.
    pub fn with_flow(params: TrackerParams, flow: Box<dyn OpticalFlow + Send>) -> Self {
        Self {
            params,
            flow,
            corners: None,
        }
    }

    #[inline]
    pub fn params(&self) -> &TrackerParams {
        &self.params
    }

    #[inline]
    pub fn is_active(&self) -> bool {
        self.corners.is_some()
    }

    pub fn corners(&self) -> Option<&[TrackedCorner; 4]> {
        self.corners.as_ref()
    }

    pub fn corner_positions(&self) -> Option<[Point2<f32>; 4]> {
        self.corners
            .as_ref()
            .map(|c| [c[0].position, c[1].position, c[2].position, c[3].position])
    }

    /// Seed a feature set around every corner.
    pub fn initialize(&mut self, corners: &[Point2<f32>; 4], frame: &GrayImageView<'_>) {
        let sets = corners.map(|c| TrackedCorner {
            position: c,
            features: self.detect_around(frame, c, self.params.init_window_px),
        });
        debug!(
            "tracker initialized with {:?} features per corner",
            sets.each_ref().map(|c| c.features.len())
        );
        self.corners = Some(sets);
    }

    /// Drop all corners and features.
    pub fn clear(&mut self) {
        self.corners = None;
    }

    /// Run optical flow from `prev` to `frame` and re-estimate the corners.
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "debug", skip(self, prev, frame), fields(w = frame.width, h = frame.height))
    )]
    pub fn advance(&mut self, prev: &GrayImageView<'_>, frame: &GrayImageView<'_>) -> AdvanceOutcome {
        let Some(corners) = self.corners.as_ref() else {
            return AdvanceOutcome::Inactive;
        };

        let mut points = Vec::new();
        let mut owner = Vec::new();
        for (i, c) in corners.iter().enumerate() {
            points.extend_from_slice(&c.features);
            owner.extend(std::iter::repeat(i).take(c.features.len()));
        }

        let Some(tracked) = self.flow.track(prev, frame, &points) else {
            debug!("optical flow returned nothing; regenerating features");
            self.regenerate(frame);
            return AdvanceOutcome::Regenerated;
        };

        let mut sums = [(0.0f64, 0.0f64, 0usize); 4];
        for (res, &i) in tracked.iter().zip(owner.iter()) {
            if let Some(p) = res {
                sums[i].0 += p.x as f64;
                sums[i].1 += p.y as f64;
                sums[i].2 += 1;
            }
        }

        let min_tracked = self.params.min_tracked_per_corner();
        let lost = sums.iter().filter(|s| s.2 < min_tracked).count();
        if lost >= self.params.max_lost_corners {
            warn!(
                "plane tracking lost: {lost} corners below {min_tracked} tracked features (counts {:?})",
                sums.map(|s| s.2)
            );
            self.corners = None;
            return AdvanceOutcome::Lost { lost_corners: lost };
        }

        let mut positions = [Point2::origin(); 4];
        if let Some(corners) = self.corners.as_mut() {
            for (i, c) in corners.iter_mut().enumerate() {
                let (sx, sy, n) = sums[i];
                if n >= min_tracked {
                    c.position = Point2::new((sx / n as f64) as f32, (sy / n as f64) as f32);
                }
                positions[i] = c.position;
            }
        }
        self.regenerate(frame);

        AdvanceOutcome::Updated {
            corners: positions,
            lost,
        }
    }

    /// Replace every corner's feature set with fresh detections around its
    /// current position.
    fn regenerate(&mut self, frame: &GrayImageView<'_>) {
        let window = self.params.regen_window_px;
        let Some(mut corners) = self.corners.take() else {
            return;
        };
        for c in corners.iter_mut() {
            c.features = self.detect_around(frame, c.position, window);
        }
        self.corners = Some(corners);
    }

    fn detect_around(
        &self,
        frame: &GrayImageView<'_>,
        center: Point2<f32>,
        window: f32,
    ) -> Vec<Point2<f32>> {
        let mut found = good_features_in_window(
            frame,
            center,
            window,
            self.params.target_features_per_corner,
            &self.params.features,
        );
        if found.len() < self.params.min_features_per_corner {
            found.push(Point2::new(center.x.trunc(), center.y.trunc()));
        }
        found
    }
}

impl std::fmt::Debug for FeatureTracker {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("FeatureTracker")
            .field("params", &self.params)
            .field("corners", &self.corners)
            .finish_non_exhaustive()
    }
}
