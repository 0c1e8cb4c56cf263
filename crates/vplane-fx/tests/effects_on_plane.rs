use nalgebra::Point2;
use vplane_core::{CoordinateProjector, FrameSize, PlaneHomography, PlaneSize};
use vplane_fx::{
    default_scene, Activation, DrawCommand, EffectKind, EffectParams, InteractionEngine,
    InteractionParams, NodeId,
};

fn tilted_projector() -> CoordinateProjector {
    let plane = PlaneSize::default();
    let corners = [
        Point2::new(120.0, 60.0),
        Point2::new(520.0, 100.0),
        Point2::new(560.0, 430.0),
        Point2::new(70.0, 400.0),
    ];
    let h = PlaneHomography::from_corners(plane, &corners).expect("valid quad");
    CoordinateProjector::new(plane, FrameSize::new(640, 480), Some(h))
}

fn engine(kind: EffectKind) -> InteractionEngine {
    let mut e = InteractionEngine::new(
        default_scene(PlaneSize::default()),
        EffectParams {
            seed: Some(11),
            ..EffectParams::default()
        },
        InteractionParams::default(),
    );
    e.select_effect(kind);
    e
}

#[test]
fn every_effect_plays_out_and_stops() {
    let proj = tilted_projector();
    for kind in EffectKind::ALL {
        let mut e = engine(kind);
        let center = proj.to_image(e.nodes()[1].center);

        let mut fired = Vec::new();
        e.update(&[center], &proj, 120.0, &mut |id: NodeId, a: Activation| {
            fired.push((id, a))
        });
        assert_eq!(fired.len(), 1, "{kind}");
        assert_eq!(fired[0].0, NodeId(1));
        assert!((fired[0].1.intensity - 1.8).abs() < 1e-4);

        let mut frames_with_fx = 0;
        for _ in 0..60 {
            let mut out = Vec::new();
            e.render(&proj, &mut out);
            // One disc per node plus whatever the effect adds.
            if out.len() > 4 {
                frames_with_fx += 1;
            }
        }
        assert!(e.nodes().iter().all(|n| n.effect.is_idle()), "{kind}");
        if kind == EffectKind::None {
            assert_eq!(frames_with_fx, 0);
        } else {
            assert!(frames_with_fx > 0, "{kind}");
        }
    }
}

#[test]
fn rings_are_centered_on_the_projected_node() {
    let proj = tilted_projector();
    let mut e = engine(EffectKind::Shockwave);
    let node_center = e.nodes()[3].center;
    let image_center = proj.to_image(node_center);

    e.update(&[image_center], &proj, 0.0, &mut |_: NodeId, _: Activation| {});
    let mut out = Vec::new();
    e.render(&proj, &mut out);

    let rings: Vec<_> = out
        .iter()
        .filter_map(|c| match c {
            DrawCommand::Ring { center, radius, .. } => Some((*center, *radius)),
            _ => None,
        })
        .collect();
    assert_eq!(rings.len(), 1);
    let (c, r) = rings[0];
    assert!((c - image_center).norm() < 1e-3);
    let expected = proj.project_length(node_center, 50.0);
    assert!((r - expected).abs() < 1e-3);
}

#[test]
fn reset_stops_running_effects() {
    let proj = tilted_projector();
    let mut e = engine(EffectKind::Particles);
    let center = proj.to_image(e.nodes()[0].center);
    e.update(&[center], &proj, 0.0, &mut |_: NodeId, _: Activation| {});
    assert!(!e.nodes()[0].effect.is_idle());

    e.reset_nodes();
    assert!(e.nodes().iter().all(|n| n.effect.is_idle() && !n.touched));
    let mut out = Vec::new();
    e.render(&proj, &mut out);
    assert_eq!(out.len(), 4);
}
