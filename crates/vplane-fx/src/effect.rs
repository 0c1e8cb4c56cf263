//! Frame-stepped node effects.
//!
//! Each kind is an independent sub-animation on [`EffectState`]. A trigger
//! (re)initializes only the selected kind; anything already in flight keeps
//! decaying. [`EffectAnimator::advance`] draws the current state first and
//! then steps it, so a fresh trigger is visible on the very next frame.

use crate::draw::{Color, DrawCommand};
use crate::node::{Particle, VirtualNode};
use nalgebra::Vector2;
use rand::prelude::*;
use serde::{Deserialize, Serialize};
use std::f32::consts::TAU;
use std::fmt;
use std::str::FromStr;
use vplane_core::CoordinateProjector;

/// Effect applied to a node on activation.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum EffectKind {
    #[default]
    None,
    Pulse,
    Glow,
    Shockwave,
    Particles,
}

impl EffectKind {
    /// Menu order.
    pub const ALL: [EffectKind; 5] = [
        EffectKind::None,
        EffectKind::Pulse,
        EffectKind::Glow,
        EffectKind::Shockwave,
        EffectKind::Particles,
    ];

    /// Short machine key, as accepted by [`FromStr`].
    pub fn key(self) -> &'static str {
        match self {
            EffectKind::None => "none",
            EffectKind::Pulse => "pulse",
            EffectKind::Glow => "glow",
            EffectKind::Shockwave => "shockwave",
            EffectKind::Particles => "particles",
        }
    }

    /// Human readable menu label.
    pub fn label(self) -> &'static str {
        match self {
            EffectKind::None => "None",
            EffectKind::Pulse => "Pulse Ring",
            EffectKind::Glow => "Glow Bloom",
            EffectKind::Shockwave => "Shockwave",
            EffectKind::Particles => "Particle Burst",
        }
    }
}

impl fmt::Display for EffectKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.key())
    }
}

#[derive(thiserror::Error, Debug, Clone, PartialEq, Eq)]
#[error("unknown effect kind `{0}` (expected none, pulse, glow, shockwave or particles)")]
pub struct ParseEffectKindError(pub String);

impl FromStr for EffectKind {
    type Err = ParseEffectKindError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = s.trim().to_ascii_lowercase();
        EffectKind::ALL
            .into_iter()
            .find(|k| k.key() == key)
            .ok_or_else(|| ParseEffectKindError(s.to_string()))
    }
}

/// Effect tuning shared by all nodes.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EffectParams {
    /// Pulse growth per frame (plane units).
    pub pulse_step: f32,
    /// Pulse ends once its radius exceeds `node.radius * pulse_bound`.
    pub pulse_bound: f32,
    pub shockwave_step: f32,
    pub shockwave_bound: f32,
    pub glow_start: u8,
    pub glow_decay: u8,
    /// Trigger intensities are clamped into `[min, max]`.
    pub intensity_range: [f32; 2],
    /// Particle dot radius in image pixels.
    pub particle_radius: f32,
    /// Fixed RNG seed for reproducible bursts; entropy when absent.
    pub seed: Option<u64>,
}

impl Default for EffectParams {
    fn default() -> Self {
        Self {
            pulse_step: 4.0,
            pulse_bound: 3.0,
            shockwave_step: 6.0,
            shockwave_bound: 4.0,
            glow_start: 255,
            glow_decay: 15,
            intensity_range: [1.0, 2.5],
            particle_radius: 3.0,
            seed: None,
        }
    }
}

const PULSE_COLOR: Color = Color::rgb(255, 255, 0);
const SHOCKWAVE_COLOR: Color = Color::rgb(0, 255, 255);

/// Triggers and advances node effects.
#[derive(Debug)]
pub struct EffectAnimator {
    params: EffectParams,
    rng: StdRng,
}

impl EffectAnimator {
    pub fn new(params: EffectParams) -> Self {
        let rng = match params.seed {
            Some(seed) => StdRng::seed_from_u64(seed),
            None => StdRng::from_entropy(),
        };
        Self { params, rng }
    }

    #[inline]
    pub fn params(&self) -> &EffectParams {
        &self.params
    }

    /// Clamp a raw intensity into the configured range; non-finite input
    /// maps to the lower bound.
    pub fn clamp_intensity(&self, intensity: f32) -> f32 {
        let [lo, hi] = self.params.intensity_range;
        if intensity.is_finite() {
            intensity.clamp(lo, hi)
        } else {
            lo
        }
    }

    /// (Re)start the `kind` sub-animation on `node`.
    pub fn trigger(&mut self, node: &mut VirtualNode, kind: EffectKind, intensity: f32) {
        let intensity = self.clamp_intensity(intensity);
        let fx = &mut node.effect;
        match kind {
            EffectKind::None => {}
            EffectKind::Pulse => fx.pulse_radius = node.radius * intensity,
            EffectKind::Shockwave => fx.shockwave_radius = node.radius * intensity,
            EffectKind::Glow => fx.glow_alpha = self.params.glow_start,
            EffectKind::Particles => {
                let profile = &node.profile;
                let count = profile.particle_count(intensity);
                let [s0, s1] = profile.particle_speed;
                let [l0, l1] = profile.particle_life;
                fx.particles.clear();
                fx.particles.extend((0..count).map(|_| {
                    let angle = self.rng.gen_range(0.0..TAU);
                    let speed = self.rng.gen_range(s0..=s1) * intensity;
                    Particle {
                        position: node.center,
                        velocity: Vector2::new(angle.cos(), angle.sin()) * speed,
                        life: self.rng.gen_range(l0..=l1),
                    }
                }));
            }
        }
    }

    /// Emit draw commands for the node's active effects, then step them one
    /// frame.
    pub fn advance(
        &mut self,
        node: &mut VirtualNode,
        projector: &CoordinateProjector,
        out: &mut Vec<DrawCommand>,
    ) {
        let center = projector.to_image(node.center);
        let p = &self.params;
        let fx = &mut node.effect;

        if fx.pulse_radius > 0.0 {
            out.push(DrawCommand::Ring {
                center,
                radius: projector.project_length(node.center, fx.pulse_radius),
                thickness: 2.0,
                color: PULSE_COLOR,
            });
            fx.pulse_radius += p.pulse_step;
            if fx.pulse_radius > node.radius * p.pulse_bound {
                fx.pulse_radius = 0.0;
            }
        }

        if fx.shockwave_radius > 0.0 {
            out.push(DrawCommand::Ring {
                center,
                radius: projector.project_length(node.center, fx.shockwave_radius),
                thickness: 1.0,
                color: SHOCKWAVE_COLOR,
            });
            fx.shockwave_radius += p.shockwave_step;
            if fx.shockwave_radius > node.radius * p.shockwave_bound {
                fx.shockwave_radius = 0.0;
            }
        }

        if fx.glow_alpha > 0 {
            out.push(DrawCommand::Ring {
                center,
                radius: projector
                    .project_length(node.center, node.radius + node.profile.glow_offset),
                thickness: 2.0,
                color: Color::rgb(255, fx.glow_alpha, 0).with_alpha(fx.glow_alpha),
            });
            fx.glow_alpha = fx.glow_alpha.saturating_sub(p.glow_decay);
        }

        if !fx.particles.is_empty() {
            fx.particles.retain_mut(|part| {
                part.position += part.velocity;
                part.life = part.life.saturating_sub(1);
                if part.life == 0 {
                    return false;
                }
                out.push(DrawCommand::Disc {
                    center: projector.to_image(part.position),
                    radius: p.particle_radius,
                    color: Color::WHITE,
                });
                true
            });
        }
    }
}
