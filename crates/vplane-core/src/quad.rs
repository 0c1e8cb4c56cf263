use crate::GeometryError;
use nalgebra::Point2;

/// Signed shoelace area of a closed quadrilateral.
pub fn quad_area(corners: &[Point2<f32>; 4]) -> f32 {
    let mut twice = 0.0f32;
    for i in 0..4 {
        let a = corners[i];
        let b = corners[(i + 1) % 4];
        twice += a.x * b.y - b.x * a.y;
    }
    0.5 * twice
}

/// Check that four ordered corners enclose a usable, convex region.
///
/// Returns the absolute area on success. Either winding order is accepted.
pub fn validate_quad(corners: &[Point2<f32>; 4], min_area: f32) -> Result<f32, GeometryError> {
    let area = quad_area(corners).abs();
    if !(area >= min_area) {
        return Err(GeometryError::Degenerate { area });
    }

    let mut sign = 0.0f32;
    for i in 0..4 {
        let a = corners[i];
        let b = corners[(i + 1) % 4];
        let c = corners[(i + 2) % 4];
        let cross = (b - a).perp(&(c - b));
        if cross == 0.0 {
            return Err(GeometryError::NotConvex);
        }
        if sign == 0.0 {
            sign = cross.signum();
        } else if cross.signum() != sign {
            return Err(GeometryError::NotConvex);
        }
    }
    Ok(area)
}
