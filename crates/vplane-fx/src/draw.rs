use nalgebra::Point2;
use serde::{Deserialize, Serialize};

/// 8-bit RGBA color.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct Color {
    pub r: u8,
    pub g: u8,
    pub b: u8,
    pub a: u8,
}

impl Color {
    pub const WHITE: Color = Color::rgb(255, 255, 255);

    pub const fn rgb(r: u8, g: u8, b: u8) -> Self {
        Self { r, g, b, a: 255 }
    }

    pub const fn with_alpha(self, a: u8) -> Self {
        Self { a, ..self }
    }
}

/// Renderer-agnostic drawing primitive in image pixel coordinates.
#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum DrawCommand {
    /// Filled circle.
    Disc {
        center: Point2<f32>,
        radius: f32,
        color: Color,
    },
    /// Circle outline.
    Ring {
        center: Point2<f32>,
        radius: f32,
        thickness: f32,
        color: Color,
    },
    Polyline {
        points: Vec<Point2<f32>>,
        closed: bool,
        color: Color,
    },
    Label {
        anchor: Point2<f32>,
        text: String,
        color: Color,
    },
}
