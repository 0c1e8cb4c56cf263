//! Plane grid, outline and calibration markers.

use nalgebra::{Point2, Vector2};
use serde::{Deserialize, Serialize};
use vplane_core::CoordinateProjector;
use vplane_fx::{Color, DrawCommand};

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct OverlayParams {
    /// Grid dot spacing in plane units.
    pub grid_spacing: f32,
    pub grid_dot_radius: f32,
    pub marker_radius: f32,
    pub grid_color: Color,
    pub outline_color: Color,
    pub marker_color: Color,
    pub label_color: Color,
    pub preview_color: Color,
}

impl Default for OverlayParams {
    fn default() -> Self {
        Self {
            grid_spacing: 50.0,
            grid_dot_radius: 1.0,
            marker_radius: 6.0,
            grid_color: Color::rgb(200, 200, 200),
            outline_color: Color::rgb(180, 180, 180),
            marker_color: Color::rgb(100, 220, 100),
            label_color: Color::rgb(220, 220, 220),
            preview_color: Color::rgb(100, 200, 0),
        }
    }
}

/// What the overlay needs to know about the calibration this frame.
#[derive(Clone, Copy, Debug)]
pub struct OverlayState<'a> {
    /// Locked (or tracked) corners in image coordinates.
    pub corners: &'a [Point2<f32>],
    pub calibrating: bool,
    pub plane_active: bool,
    /// Unconfirmed pointer-mode corner.
    pub preview: Option<Point2<f32>>,
}

/// Emit overlay primitives for the current calibration state.
///
/// Corner markers are shown while calibrating and in plane mode; the grid
/// and outline only in plane mode. Grid dots falling outside the frame are
/// skipped.
pub fn draw_overlay(
    params: &OverlayParams,
    projector: &CoordinateProjector,
    state: &OverlayState<'_>,
    out: &mut Vec<DrawCommand>,
) {
    if let Some(p) = state.preview.filter(|_| state.calibrating) {
        out.push(DrawCommand::Disc {
            center: p,
            radius: params.marker_radius,
            color: params.preview_color,
        });
        out.push(DrawCommand::Label {
            anchor: p + Vector2::new(8.0, 0.0),
            text: "Preview".to_string(),
            color: params.label_color,
        });
    }

    if state.calibrating || state.plane_active {
        for (i, c) in state.corners.iter().enumerate() {
            out.push(DrawCommand::Disc {
                center: *c,
                radius: params.marker_radius,
                color: params.marker_color,
            });
            out.push(DrawCommand::Label {
                anchor: *c + Vector2::new(6.0, 6.0),
                text: (i + 1).to_string(),
                color: params.label_color,
            });
        }
    }

    if !state.plane_active {
        return;
    }

    let plane = projector.plane();
    let frame = projector.frame();
    let steps_x = (plane.width / params.grid_spacing).floor() as usize;
    let steps_y = (plane.height / params.grid_spacing).floor() as usize;
    for ix in 0..=steps_x {
        for iy in 0..=steps_y {
            let gp = Point2::new(ix as f32 * params.grid_spacing, iy as f32 * params.grid_spacing);
            let ip = projector.to_image(gp);
            if frame.contains(ip) {
                out.push(DrawCommand::Disc {
                    center: ip,
                    radius: params.grid_dot_radius,
                    color: params.grid_color,
                });
            }
        }
    }

    if state.corners.len() == 4 {
        out.push(DrawCommand::Polyline {
            points: state.corners.to_vec(),
            closed: true,
            color: params.outline_color,
        });
    }
}
