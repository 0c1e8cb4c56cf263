//! Scripted replay of recorded frames and inputs.
//!
//! A replay script is a JSON document listing one step per frame:
//!
//! ```json
//! {
//!   "steps": [
//!     { "frame": "f000.png", "commands": [ { "type": "start_calibration", "mode": "pointer-confirm" } ] },
//!     { "frame": "f001.png", "candidates": [[120, 80]], "dt_ms": 40 }
//!   ]
//! }
//! ```
//!
//! Frame paths are resolved relative to the script's directory. Time is
//! synthetic: every step advances the session clock by `dt_ms`.

use crate::config::SessionConfig;
use crate::events::{SessionCommand, SessionEvent};
use crate::frame::{gray_view, load_gray};
use crate::session::{FrameInput, SessionState};
use log::{debug, info};
use nalgebra::Point2;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::{Duration, Instant};
use vplane_fx::{ActivationHook, NodeId};
use vplane_tracking::CalibrationProgress;

#[derive(thiserror::Error, Debug)]
pub enum ReplayError {
    #[error("failed to read replay script: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to parse replay script: {0}")]
    Json(#[from] serde_json::Error),
    #[error("failed to load frame {path}: {source}")]
    Image {
        path: PathBuf,
        #[source]
        source: ::image::ImageError,
    },
    #[error("frame {path} is empty")]
    EmptyFrame { path: PathBuf },
}

fn default_dt_ms() -> u64 {
    33
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ReplayStep {
    /// Frame image, relative to the script directory.
    #[serde(default)]
    pub frame: Option<PathBuf>,
    /// Candidate input points in image pixels.
    #[serde(default)]
    pub candidates: Vec<[f32; 2]>,
    /// Commands queued before this step's tick.
    #[serde(default)]
    pub commands: Vec<SessionCommand>,
    /// Time elapsed since the previous step.
    #[serde(default = "default_dt_ms")]
    pub dt_ms: u64,
}

#[derive(Clone, Debug, Default, PartialEq, Serialize, Deserialize)]
pub struct ReplayScript {
    pub steps: Vec<ReplayStep>,
    /// Directory frame paths are resolved against.
    #[serde(skip)]
    pub base_dir: PathBuf,
}

impl ReplayScript {
    pub fn load(path: impl AsRef<Path>) -> Result<Self, ReplayError> {
        let path = path.as_ref();
        let text = std::fs::read_to_string(path)?;
        let mut script: Self = serde_json::from_str(&text)?;
        script.base_dir = path
            .parent()
            .map(Path::to_path_buf)
            .unwrap_or_default();
        Ok(script)
    }
}

/// Per-tick record written by the replay binary.
#[derive(Clone, Debug, Serialize)]
pub struct TickSummary {
    pub step: usize,
    pub plane_active: bool,
    pub progress: CalibrationProgress,
    pub corners: Option<[Point2<f32>; 4]>,
    pub touched: Vec<NodeId>,
    pub speed: f32,
    pub draw_commands: usize,
    pub events: Vec<SessionEvent>,
}

/// Drive a fresh session through `script`, calling `sink` after every tick.
pub fn run_replay(
    config: SessionConfig,
    script: &ReplayScript,
    hook: &mut dyn ActivationHook,
    mut sink: impl FnMut(TickSummary) -> Result<(), ReplayError>,
) -> Result<SessionState, ReplayError> {
    let mut session = SessionState::new(config);
    let start = Instant::now();
    let mut elapsed = Duration::ZERO;
    info!("replaying {} steps", script.steps.len());

    for (i, step) in script.steps.iter().enumerate() {
        elapsed += Duration::from_millis(step.dt_ms);
        for cmd in &step.commands {
            session.push_command(cmd.clone());
        }
        let candidates: Vec<Point2<f32>> = step
            .candidates
            .iter()
            .map(|c| Point2::new(c[0], c[1]))
            .collect();

        let image = match &step.frame {
            Some(rel) => {
                let path = script.base_dir.join(rel);
                let img = load_gray(&path).map_err(|source| ReplayError::Image {
                    path: path.clone(),
                    source,
                })?;
                if img.width() == 0 || img.height() == 0 {
                    return Err(ReplayError::EmptyFrame { path });
                }
                debug!("step {i}: {} ({}x{})", path.display(), img.width(), img.height());
                Some(img)
            }
            None => None,
        };
        let input = match &image {
            Some(img) => FrameInput::new(gray_view(img), &candidates),
            None => FrameInput::without_image(&candidates),
        };

        let out = session.tick(input, start + elapsed, hook);
        sink(TickSummary {
            step: i,
            plane_active: out.plane_active,
            progress: out.progress,
            corners: out.corners,
            touched: out.touched,
            speed: out.speed,
            draw_commands: out.draw.len(),
            events: out.events,
        })?;
    }
    Ok(session)
}
