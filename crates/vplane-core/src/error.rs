/// Errors produced by plane geometry helpers.
#[derive(thiserror::Error, Debug, Clone, Copy, PartialEq)]
pub enum GeometryError {
    #[error("corners too close or collinear (area={area:.1} px^2)")]
    Degenerate { area: f32 },
    #[error("corners do not form a convex quadrilateral")]
    NotConvex,
    #[error("perspective transform is singular")]
    SingularTransform,
}
