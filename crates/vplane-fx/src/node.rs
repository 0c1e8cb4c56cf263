use crate::draw::Color;
use nalgebra::{Point2, Vector2};
use serde::{Deserialize, Serialize};
use vplane_core::PlaneSize;

/// Stable index of a node within its engine.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(transparent)]
pub struct NodeId(pub usize);

impl std::fmt::Display for NodeId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "node#{}", self.0)
    }
}

/// One spark of a particle burst, in plane coordinates.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Particle {
    pub position: Point2<f32>,
    /// Plane units per frame.
    pub velocity: Vector2<f32>,
    /// Remaining frames.
    pub life: u32,
}

/// Animation state of all effect kinds on one node.
///
/// A zero radius / alpha / empty burst means the sub-animation is inactive.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct EffectState {
    pub pulse_radius: f32,
    pub glow_alpha: u8,
    pub shockwave_radius: f32,
    pub particles: Vec<Particle>,
}

impl EffectState {
    pub fn is_idle(&self) -> bool {
        self.pulse_radius == 0.0
            && self.glow_alpha == 0
            && self.shockwave_radius == 0.0
            && self.particles.is_empty()
    }
}

/// Per-node tuning of the spawn-time effect parameters and base colors.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EffectProfile {
    /// Minimum particle count of a burst.
    pub particle_floor: usize,
    /// Particles per unit of intensity.
    pub particles_per_intensity: f32,
    /// Particle speed range (plane units per frame) before intensity scaling.
    pub particle_speed: [f32; 2],
    /// Inclusive particle lifetime range in frames.
    pub particle_life: [u32; 2],
    /// Gap between the node edge and the glow ring.
    pub glow_offset: f32,
    pub idle_color: Color,
    pub touched_color: Color,
}

impl EffectProfile {
    /// Ordinary node.
    pub fn standard() -> Self {
        Self {
            particle_floor: 6,
            particles_per_intensity: 10.0,
            particle_speed: [3.0, 6.0],
            particle_life: [12, 30],
            glow_offset: 12.0,
            idle_color: Color::rgb(0, 0, 255),
            touched_color: Color::rgb(0, 255, 0),
        }
    }

    /// Larger centerpiece node: denser, faster, longer-lived bursts.
    pub fn main() -> Self {
        Self {
            particle_floor: 8,
            particles_per_intensity: 14.0,
            particle_speed: [3.0, 7.0],
            particle_life: [14, 40],
            glow_offset: 15.0,
            idle_color: Color::rgb(0, 255, 0),
            touched_color: Color::rgb(0, 255, 0),
        }
    }

    /// Burst size for a trigger of the given (already clamped) intensity.
    pub fn particle_count(&self, intensity: f32) -> usize {
        ((self.particles_per_intensity * intensity) as usize).max(self.particle_floor)
    }
}

impl Default for EffectProfile {
    fn default() -> Self {
        Self::standard()
    }
}

/// Circular hit region living in plane coordinates.
#[derive(Clone, Debug, PartialEq)]
pub struct VirtualNode {
    pub id: NodeId,
    pub name: String,
    pub center: Point2<f32>,
    pub radius: f32,
    /// True while at least one input point lies strictly inside.
    pub touched: bool,
    pub effect: EffectState,
    pub profile: EffectProfile,
}

impl VirtualNode {
    pub fn new(id: NodeId, name: impl Into<String>, center: Point2<f32>, radius: f32) -> Self {
        Self {
            id,
            name: name.into(),
            center,
            radius,
            touched: false,
            effect: EffectState::default(),
            profile: EffectProfile::standard(),
        }
    }

    pub fn with_profile(mut self, profile: EffectProfile) -> Self {
        self.profile = profile;
        self
    }

    /// Strict containment: a point exactly on the boundary is outside.
    #[inline]
    pub fn contains(&self, p: Point2<f32>) -> bool {
        (p - self.center).norm() < self.radius
    }
}

/// Three ordinary nodes and one main node spread over the plane.
pub fn default_scene(plane: PlaneSize) -> Vec<VirtualNode> {
    let (w, h) = (plane.width, plane.height);
    vec![
        VirtualNode::new(NodeId(0), "left", Point2::new(w / 4.0, h / 3.0), 36.0),
        VirtualNode::new(NodeId(1), "center", Point2::new(w / 2.0, h / 2.0), 36.0),
        VirtualNode::new(NodeId(2), "right", Point2::new(3.0 * w / 4.0, h / 6.0), 36.0),
        VirtualNode::new(NodeId(3), "main", Point2::new(w / 2.0, 3.0 * h / 4.0), 50.0)
            .with_profile(EffectProfile::main()),
    ]
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn containment_is_strict() {
        let node = VirtualNode::new(NodeId(0), "n", Point2::new(100.0, 100.0), 40.0);
        assert!(node.contains(Point2::new(139.9, 100.0)));
        assert!(!node.contains(Point2::new(140.0, 100.0)));
        assert!(!node.contains(Point2::new(140.1, 100.0)));
        assert!(!node.contains(Point2::new(100.0, 60.0)));
    }

    #[test]
    fn particle_count_has_floor() {
        let std = EffectProfile::standard();
        assert_eq!(std.particle_count(0.1), 6);
        assert_eq!(std.particle_count(1.0), 10);
        assert_eq!(std.particle_count(2.5), 25);
        let main = EffectProfile::main();
        assert_eq!(main.particle_count(0.1), 8);
        assert_eq!(main.particle_count(1.0), 14);
    }

    #[test]
    fn default_scene_layout() {
        let nodes = default_scene(PlaneSize::default());
        assert_eq!(nodes.len(), 4);
        assert_eq!(nodes[0].center, Point2::new(150.0, 400.0 / 3.0));
        assert_eq!(nodes[3].radius, 50.0);
        assert_eq!(nodes[3].profile, EffectProfile::main());
        for (i, n) in nodes.iter().enumerate() {
            assert_eq!(n.id, NodeId(i));
            assert!(n.effect.is_idle());
        }
    }
}
