//! Session configuration.
//!
//! Every section has defaults, so a JSON document only needs the keys it
//! wants to override:
//!
//! ```json
//! { "tracker": { "homography_refresh": "fixed" }, "effects": { "seed": 7 } }
//! ```

use crate::overlay::OverlayParams;
use nalgebra::Point2;
use serde::{Deserialize, Serialize};
use std::path::Path;
use vplane_core::PlaneSize;
use vplane_fx::{
    default_scene, EffectKind, EffectParams, EffectProfile, InteractionParams, NodeId, VirtualNode,
};
use vplane_tracking::{CalibrationParams, TrackerParams};

#[derive(thiserror::Error, Debug)]
pub enum ConfigError {
    #[error("failed to read config: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse config: {0}")]
    Json(#[from] serde_json::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

/// A node placed in plane coordinates.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct NodeSpec {
    pub name: String,
    pub center: [f32; 2],
    pub radius: f32,
    /// Use the larger "main" effect profile.
    #[serde(default)]
    pub main: bool,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SessionConfig {
    pub plane: PlaneSize,
    pub calibration: CalibrationParams,
    pub tracker: TrackerParams,
    pub effects: EffectParams,
    pub interaction: InteractionParams,
    pub overlay: OverlayParams,
    /// Effect selected at startup.
    pub effect: EffectKind,
    /// Scene nodes; the default scene when absent.
    pub nodes: Option<Vec<NodeSpec>>,
}

impl SessionConfig {
    pub fn from_json_str(s: &str) -> Result<Self, ConfigError> {
        let cfg: Self = serde_json::from_str(s)?;
        cfg.validate()?;
        Ok(cfg)
    }

    pub fn load(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let text = std::fs::read_to_string(path)?;
        Self::from_json_str(&text)
    }

    /// Build the scene described by `nodes` (or the default one).
    pub fn build_nodes(&self) -> Vec<VirtualNode> {
        match &self.nodes {
            None => default_scene(self.plane),
            Some(specs) => specs
                .iter()
                .enumerate()
                .map(|(i, s)| {
                    let node = VirtualNode::new(
                        NodeId(i),
                        s.name.clone(),
                        Point2::new(s.center[0], s.center[1]),
                        s.radius,
                    );
                    if s.main {
                        node.with_profile(EffectProfile::main())
                    } else {
                        node
                    }
                })
                .collect(),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        let invalid = |msg: String| Err(ConfigError::Invalid(msg));

        let PlaneSize { width, height } = self.plane;
        if !(width > 0.0 && height > 0.0 && width.is_finite() && height.is_finite()) {
            return invalid(format!("plane size must be positive, got {width}x{height}"));
        }

        let cal = &self.calibration;
        if !(cal.stable_radius_px > 0.0) || !(cal.dwell_secs >= 0.0) {
            return invalid("calibration radius must be positive and dwell non-negative".into());
        }

        let tr = &self.tracker;
        if !(tr.lost_fraction > 0.0 && tr.lost_fraction <= 1.0) {
            return invalid(format!("lost_fraction must be in (0, 1], got {}", tr.lost_fraction));
        }
        if tr.target_features_per_corner == 0 || tr.max_lost_corners == 0 {
            return invalid("feature target and lost-corner limit must be non-zero".into());
        }
        if tr.flow.max_levels == 0 || tr.flow.window_half == 0 {
            return invalid("optical flow needs at least one level and a non-empty window".into());
        }
        let flow = &tr.flow;
        if !(flow.pyramid_sigma > 0.0 && flow.max_residual > 0.0 && flow.min_eigenvalue >= 0.0) {
            return invalid(format!(
                "flow pyramid_sigma and max_residual must be positive, min_eigenvalue non-negative (got {}, {}, {})",
                flow.pyramid_sigma, flow.max_residual, flow.min_eigenvalue
            ));
        }

        let [lo, hi] = self.effects.intensity_range;
        if !(lo > 0.0 && lo <= hi) {
            return invalid(format!("intensity range [{lo}, {hi}] is empty or non-positive"));
        }
        let [dt_lo, dt_hi] = self.interaction.dt_clamp_secs;
        if !(dt_lo > 0.0 && dt_lo <= dt_hi) {
            return invalid(format!("dt clamp [{dt_lo}, {dt_hi}] is empty or non-positive"));
        }
        if !(self.interaction.boost_speed > 0.0 && self.interaction.volume_speed > 0.0) {
            return invalid("boost and volume speeds must be positive".into());
        }
        let [v_lo, v_hi] = self.interaction.volume_range;
        if v_lo > v_hi {
            return invalid(format!("volume range [{v_lo}, {v_hi}] is inverted"));
        }
        if !(self.overlay.grid_spacing > 0.0) {
            return invalid("grid spacing must be positive".into());
        }

        for (i, node) in self.build_nodes().iter().enumerate() {
            if !(node.radius > 0.0) {
                return invalid(format!("node {i} has non-positive radius"));
            }
            let [s0, s1] = node.profile.particle_speed;
            let [l0, l1] = node.profile.particle_life;
            if s0 > s1 || l0 > l1 || l0 == 0 {
                return invalid(format!("node {i} has an invalid particle profile"));
            }
        }
        Ok(())
    }
}
