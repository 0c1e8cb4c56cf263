//! Hit testing of input points against virtual nodes.
//!
//! Activation is level-triggered: a node fires its hook and effect only on
//! the frame it goes from untouched to touched. Holding a point inside a
//! node does nothing further; leaving clears `touched` silently.

use crate::draw::DrawCommand;
use crate::effect::{EffectAnimator, EffectKind, EffectParams};
use crate::node::{NodeId, VirtualNode};
use log::debug;
use nalgebra::Point2;
use serde::{Deserialize, Serialize};
use vplane_core::CoordinateProjector;

#[cfg(feature = "tracing")]
use tracing::instrument;

/// Payload handed to the activation hook.
#[derive(Clone, Copy, Debug, PartialEq, Serialize, Deserialize)]
pub struct Activation {
    /// Effect intensity after clamping.
    pub intensity: f32,
    /// Suggested feedback volume within `volume_range`.
    pub volume: f32,
}

/// External side effect run on every rising edge.
pub trait ActivationHook {
    fn on_node_activated(&mut self, node: NodeId, activation: Activation);
}

impl<F> ActivationHook for F
where
    F: FnMut(NodeId, Activation),
{
    fn on_node_activated(&mut self, node: NodeId, activation: Activation) {
        self(node, activation)
    }
}

/// Hook that ignores every activation.
#[derive(Clone, Copy, Debug, Default)]
pub struct NoopHook;

impl ActivationHook for NoopHook {
    fn on_node_activated(&mut self, _node: NodeId, _activation: Activation) {}
}

/// Mapping from input speed to activation strength.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct InteractionParams {
    /// Frame interval clamp for velocity estimation (seconds).
    pub dt_clamp_secs: [f32; 2],
    /// Speed cap (pixels per second).
    pub max_speed: f32,
    /// intensity = 1 + min(boost_max, speed / boost_speed)
    pub boost_speed: f32,
    pub boost_max: f32,
    /// volume = clamp(speed / volume_speed, volume_range)
    pub volume_speed: f32,
    pub volume_range: [f32; 2],
}

impl Default for InteractionParams {
    fn default() -> Self {
        Self {
            dt_clamp_secs: [0.016, 0.1],
            max_speed: 800.0,
            boost_speed: 150.0,
            boost_max: 1.5,
            volume_speed: 40.0,
            volume_range: [0.05, 1.0],
        }
    }
}

impl InteractionParams {
    pub fn activation(&self, speed: f32) -> Activation {
        let speed = if speed.is_finite() { speed.max(0.0) } else { 0.0 };
        let [vmin, vmax] = self.volume_range;
        Activation {
            intensity: 1.0 + (speed / self.boost_speed).min(self.boost_max),
            volume: (speed / self.volume_speed).clamp(vmin, vmax),
        }
    }
}

/// Owns the nodes, the selected effect kind and the animator.
#[derive(Debug)]
pub struct InteractionEngine {
    nodes: Vec<VirtualNode>,
    selected: EffectKind,
    animator: EffectAnimator,
    params: InteractionParams,
}

impl InteractionEngine {
    pub fn new(nodes: Vec<VirtualNode>, effects: EffectParams, params: InteractionParams) -> Self {
        Self {
            nodes,
            selected: EffectKind::default(),
            animator: EffectAnimator::new(effects),
            params,
        }
    }

    #[inline]
    pub fn nodes(&self) -> &[VirtualNode] {
        &self.nodes
    }

    pub fn node(&self, id: NodeId) -> Option<&VirtualNode> {
        self.nodes.iter().find(|n| n.id == id)
    }

    #[inline]
    pub fn params(&self) -> &InteractionParams {
        &self.params
    }

    #[inline]
    pub fn selected_effect(&self) -> EffectKind {
        self.selected
    }

    /// Kind used for subsequent activations; running animations continue.
    pub fn select_effect(&mut self, kind: EffectKind) {
        if kind != self.selected {
            debug!("effect selected: {}", kind.label());
        }
        self.selected = kind;
    }

    /// Move a node to a plane-space position. Returns `false` for an
    /// unknown id.
    pub fn move_node(&mut self, id: NodeId, center: Point2<f32>) -> bool {
        match self.nodes.iter_mut().find(|n| n.id == id) {
            Some(node) => {
                node.center = center;
                true
            }
            None => false,
        }
    }

    /// Topmost node containing a plane-space point.
    pub fn node_at(&self, p: Point2<f32>) -> Option<NodeId> {
        self.nodes.iter().find(|n| n.contains(p)).map(|n| n.id)
    }

    /// Resolve hits for this frame's image-space candidates.
    ///
    /// Candidates that cannot be projected are skipped. Returns the nodes
    /// activated this frame, in node order.
    pub fn update(
        &mut self,
        candidates: &[Point2<f32>],
        projector: &CoordinateProjector,
        speed: f32,
        hook: &mut dyn ActivationHook,
    ) -> Vec<NodeId> {
        let plane_points: Vec<Point2<f32>> = candidates
            .iter()
            .filter_map(|p| projector.to_plane(*p))
            .collect();
        self.resolve(&plane_points, speed, hook)
    }

    /// Resolve hits for points already in plane space.
    #[cfg_attr(
        feature = "tracing",
        instrument(level = "trace", skip(self, plane_points, hook), fields(points = plane_points.len()))
    )]
    pub fn resolve(
        &mut self,
        plane_points: &[Point2<f32>],
        speed: f32,
        hook: &mut dyn ActivationHook,
    ) -> Vec<NodeId> {
        let raw = self.params.activation(speed);
        let activation = Activation {
            intensity: self.animator.clamp_intensity(raw.intensity),
            volume: raw.volume,
        };

        let mut activated = Vec::new();
        for node in &mut self.nodes {
            let hit_now = plane_points.iter().any(|p| node.contains(*p));
            if !hit_now {
                node.touched = false;
                continue;
            }
            if node.touched {
                continue;
            }
            node.touched = true;
            debug!("{} ({}) activated, intensity {:.2}", node.id, node.name, activation.intensity);
            hook.on_node_activated(node.id, activation);
            self.animator.trigger(node, self.selected, activation.intensity);
            activated.push(node.id);
        }
        activated
    }

    /// Draw every node and step its effects one frame.
    pub fn render(&mut self, projector: &CoordinateProjector, out: &mut Vec<DrawCommand>) {
        for node in &mut self.nodes {
            let color = if node.touched {
                node.profile.touched_color
            } else {
                node.profile.idle_color
            };
            out.push(DrawCommand::Disc {
                center: projector.to_image(node.center),
                radius: projector.project_length(node.center, node.radius),
                color,
            });
            self.animator.advance(node, projector, out);
        }
    }

    /// Clear `touched` on every node and stop all effects.
    pub fn reset_nodes(&mut self) {
        for node in &mut self.nodes {
            node.touched = false;
            node.effect = Default::default();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::node::default_scene;
    use vplane_core::{FrameSize, PlaneSize};

    fn engine(nodes: Vec<VirtualNode>) -> InteractionEngine {
        InteractionEngine::new(
            nodes,
            EffectParams {
                seed: Some(1),
                ..EffectParams::default()
            },
            InteractionParams::default(),
        )
    }

    fn single() -> InteractionEngine {
        engine(vec![VirtualNode::new(
            NodeId(0),
            "probe",
            Point2::new(100.0, 100.0),
            40.0,
        )])
    }

    #[test]
    fn hit_test_is_strict() {
        for (dx, expect) in [(39.9f32, true), (40.0, false), (40.1, false)] {
            let mut e = single();
            let mut calls = 0;
            let mut hook = |_: NodeId, _: Activation| calls += 1;
            let hit = e.resolve(&[Point2::new(100.0 + dx, 100.0)], 0.0, &mut hook);
            assert_eq!(!hit.is_empty(), expect, "distance {dx}");
            assert_eq!(calls, usize::from(expect));
        }
    }

    #[test]
    fn held_point_activates_once_per_entry() {
        let mut e = single();
        e.select_effect(EffectKind::Pulse);
        let mut calls = Vec::new();
        let inside = [Point2::new(110.0, 95.0)];

        for _ in 0..10 {
            e.resolve(&inside, 0.0, &mut |id: NodeId, _: Activation| calls.push(id));
            assert!(e.nodes()[0].touched);
        }
        assert_eq!(calls, vec![NodeId(0)]);

        e.resolve(&[], 0.0, &mut |id: NodeId, _: Activation| calls.push(id));
        assert!(!e.nodes()[0].touched);
        // Effect keeps running after release.
        assert!(e.nodes()[0].effect.pulse_radius > 0.0);

        for _ in 0..3 {
            e.resolve(&inside, 0.0, &mut |id: NodeId, _: Activation| calls.push(id));
        }
        assert_eq!(calls, vec![NodeId(0), NodeId(0)]);
    }

    #[test]
    fn any_candidate_counts() {
        let mut e = single();
        let pts = [Point2::new(500.0, 500.0), Point2::new(100.0, 100.0)];
        assert_eq!(e.resolve(&pts, 0.0, &mut NoopHook), vec![NodeId(0)]);
    }

    #[test]
    fn activation_scales_with_speed() {
        let params = InteractionParams::default();
        let slow = params.activation(0.0);
        assert_eq!(slow.intensity, 1.0);
        assert_eq!(slow.volume, 0.05);
        let mid = params.activation(150.0);
        assert_eq!(mid.intensity, 2.0);
        assert_eq!(mid.volume, 1.0);
        let fast = params.activation(800.0);
        assert_eq!(fast.intensity, 2.5);
        assert_eq!(params.activation(f32::NAN).intensity, 1.0);
    }

    #[test]
    fn fast_entry_spawns_bigger_burst() {
        let mut e = single();
        e.select_effect(EffectKind::Particles);
        let mut seen = None;
        e.resolve(
            &[Point2::new(100.0, 100.0)],
            300.0,
            &mut |_: NodeId, a: Activation| seen = Some(a),
        );
        let a = seen.expect("activated");
        assert_eq!(a.intensity, 2.5);
        assert_eq!(e.nodes()[0].effect.particles.len(), 25);
    }

    #[test]
    fn update_projects_image_points() {
        let plane = PlaneSize::default();
        let mut e = engine(default_scene(plane));
        // Frame twice the plane size: the center node sits at image (600, 400).
        let proj = CoordinateProjector::linear(plane, FrameSize::new(1200, 800));
        let hit = e.update(&[Point2::new(600.0, 400.0)], &proj, 0.0, &mut NoopHook);
        assert_eq!(hit, vec![NodeId(1)]);

        let mut out = Vec::new();
        e.render(&proj, &mut out);
        let discs = out
            .iter()
            .filter(|c| matches!(c, DrawCommand::Disc { .. }))
            .count();
        assert_eq!(discs, 4);
        assert!(out.iter().any(|c| matches!(
            c,
            DrawCommand::Disc { radius, .. } if (*radius - 72.0).abs() < 1e-3
        )));
    }

    #[test]
    fn move_node_and_lookup() {
        let mut e = engine(default_scene(PlaneSize::default()));
        assert!(e.move_node(NodeId(2), Point2::new(10.0, 10.0)));
        assert_eq!(e.node_at(Point2::new(12.0, 12.0)), Some(NodeId(2)));
        assert!(!e.move_node(NodeId(99), Point2::new(0.0, 0.0)));
    }
}
