use nalgebra::Point2;
use serde::{Deserialize, Serialize};
use vplane_fx::{Activation, EffectKind, NodeId};
use vplane_tracking::AcquisitionMode;

/// Discrete input queued with [`crate::SessionState::push_command`]; applied
/// at the start of the next tick.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum SessionCommand {
    StartCalibration { mode: AcquisitionMode },
    SubmitCandidate { point: Point2<f32> },
    Confirm,
    Reset,
    SelectEffect { effect: EffectKind },
}

/// Something the caller may want to surface, produced during a tick.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "event", rename_all = "snake_case")]
pub enum SessionEvent {
    CalibrationStarted {
        mode: AcquisitionMode,
    },
    CornerLocked {
        index: usize,
        point: Point2<f32>,
    },
    CalibrationCompleted {
        corners: [Point2<f32>; 4],
    },
    /// The fourth corner was rejected; acquisition stays at corner 4.
    CornersDegenerate {
        reason: String,
    },
    /// A command that does not apply in the current state.
    CommandIgnored {
        reason: String,
    },
    /// Too many corners lost in one frame; the plane was reset.
    TrackingLost {
        lost_corners: usize,
    },
    PlaneReset,
    EffectSelected {
        effect: EffectKind,
    },
    NodeActivated {
        node: NodeId,
        activation: Activation,
    },
}
