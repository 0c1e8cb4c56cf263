//! Interaction and effects for nodes placed on a virtual plane.
//!
//! Nodes live in plane coordinates. Each frame the caller projects its
//! input points into the plane (through a [`vplane_core::CoordinateProjector`]),
//! [`InteractionEngine::update`] resolves rising-edge hits and triggers the
//! selected [`EffectKind`], and [`InteractionEngine::render`] emits
//! [`DrawCommand`]s in image coordinates while stepping every effect one
//! frame.

mod draw;
mod effect;
mod interaction;
mod node;
mod velocity;

pub use draw::{Color, DrawCommand};
pub use effect::{EffectAnimator, EffectKind, EffectParams, ParseEffectKindError};
pub use interaction::{
    Activation, ActivationHook, InteractionEngine, InteractionParams, NoopHook,
};
pub use node::{default_scene, EffectProfile, EffectState, NodeId, Particle, VirtualNode};
pub use velocity::VelocityEstimator;
