use crate::{quad_area, GeometryError, PlaneSize};
use nalgebra::{Matrix3, Point2, SMatrix, SVector, Vector3};

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Homography {
    pub h: Matrix3<f64>,
}

impl Homography {
    pub fn new(h: Matrix3<f64>) -> Self {
        Self { h }
    }

    pub fn identity() -> Self {
        Self::new(Matrix3::identity())
    }

    pub fn to_array(&self) -> [[f64; 3]; 3] {
        [
            [self.h[(0, 0)], self.h[(0, 1)], self.h[(0, 2)]],
            [self.h[(1, 0)], self.h[(1, 1)], self.h[(1, 2)]],
            [self.h[(2, 0)], self.h[(2, 1)], self.h[(2, 2)]],
        ]
    }

    /// Apply the projective map. The result is not clamped to any range.
    #[inline]
    pub fn apply(&self, p: Point2<f32>) -> Point2<f32> {
        let v = self.h * Vector3::new(p.x as f64, p.y as f64, 1.0);
        let w = v[2];
        Point2::new((v[0] / w) as f32, (v[1] / w) as f32)
    }

    pub fn inverse(&self) -> Option<Self> {
        self.h.try_inverse().map(Self::new)
    }

    fn is_finite(&self) -> bool {
        self.h.iter().all(|v| v.is_finite())
    }
}

/// Virtual-to-image and image-to-virtual transforms for one calibrated plane.
///
/// Both directions are built together and dropped together; there is no way
/// to hold one without the other.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct PlaneHomography {
    virtual_to_image: Homography,
    image_to_virtual: Homography,
}

impl PlaneHomography {
    /// Map the canonical rectangle `[0,0]-[W,H]` onto `corners`.
    ///
    /// Corner order is top-left, top-right, bottom-right, bottom-left in
    /// plane space; the image-space order must match.
    pub fn from_corners(
        plane: PlaneSize,
        corners: &[Point2<f32>; 4],
    ) -> Result<Self, GeometryError> {
        let area = quad_area(corners);
        if !(area.abs() > f32::EPSILON) {
            return Err(GeometryError::Degenerate { area });
        }

        let rect = plane.corners();
        let forward =
            homography_from_4pt(&rect, corners).ok_or(GeometryError::SingularTransform)?;
        let backward = match homography_from_4pt(corners, &rect) {
            Some(h) => h,
            None => forward.inverse().ok_or(GeometryError::SingularTransform)?,
        };
        if !forward.is_finite() || !backward.is_finite() {
            return Err(GeometryError::SingularTransform);
        }

        // Near-singular systems solve to garbage instead of failing outright.
        let tol = 1e-3 * plane.width.max(plane.height);
        for r in rect {
            let back = backward.apply(forward.apply(r));
            if !((back - r).norm() < tol) {
                return Err(GeometryError::SingularTransform);
            }
        }
        Ok(Self {
            virtual_to_image: forward,
            image_to_virtual: backward,
        })
    }

    #[inline]
    pub fn virtual_to_image(&self) -> &Homography {
        &self.virtual_to_image
    }

    #[inline]
    pub fn image_to_virtual(&self) -> &Homography {
        &self.image_to_virtual
    }

    #[inline]
    pub fn to_image(&self, p: Point2<f32>) -> Point2<f32> {
        self.virtual_to_image.apply(p)
    }

    #[inline]
    pub fn to_plane(&self, p: Point2<f32>) -> Point2<f32> {
        self.image_to_virtual.apply(p)
    }
}

fn hartley_normalization(cx: f64, cy: f64, mean_dist: f64) -> Matrix3<f64> {
    let s = if mean_dist > 1e-12 {
        (2.0_f64).sqrt() / mean_dist
    } else {
        1.0
    };

    Matrix3::<f64>::new(s, 0.0, -s * cx, 0.0, s, -s * cy, 0.0, 0.0, 1.0)
}

fn normalize_points4(pts: &[Point2<f32>; 4]) -> ([Point2<f64>; 4], Matrix3<f64>) {
    // Hartley normalization: translate to centroid, scale so mean distance = sqrt(2)
    let n = 4.0_f64;
    let mut cx = 0.0_f64;
    let mut cy = 0.0_f64;
    for p in pts {
        cx += p.x as f64;
        cy += p.y as f64;
    }
    cx /= n;
    cy /= n;

    let mut mean_dist = 0.0_f64;
    for p in pts {
        let dx = p.x as f64 - cx;
        let dy = p.y as f64 - cy;
        mean_dist += (dx * dx + dy * dy).sqrt();
    }
    mean_dist /= n;

    let t = hartley_normalization(cx, cy, mean_dist);

    let mut out = [Point2::new(0.0_f64, 0.0_f64); 4];
    for (i, p) in pts.iter().enumerate() {
        let v = t * Vector3::new(p.x as f64, p.y as f64, 1.0);
        out[i] = Point2::new(v[0], v[1]);
    }

    (out, t)
}

fn normalize_homography(h: Matrix3<f64>) -> Option<Matrix3<f64>> {
    let s = h[(2, 2)];
    if s.abs() < 1e-12 {
        return None;
    }
    Some(h / s)
}

fn denormalize_homography(
    hn: Matrix3<f64>,
    t_src: Matrix3<f64>,
    t_dst: Matrix3<f64>,
) -> Option<Matrix3<f64>> {
    let t_dst_inv = t_dst.try_inverse()?;
    Some(t_dst_inv * hn * t_src)
}

/// Compute H such that: dst ~ H * src (projective), using 4 point correspondences.
///
/// Corner order must be consistent between `src` and `dst`. Returns `None`
/// when the linear system is singular (e.g. three collinear points).
pub fn homography_from_4pt(src: &[Point2<f32>; 4], dst: &[Point2<f32>; 4]) -> Option<Homography> {
    // Unknowns: [h11 h12 h13 h21 h22 h23 h31 h32], with h33 = 1
    // For each correspondence (x,y)->(u,v):
    // h11 x + h12 y + h13 - u h31 x - u h32 y = u
    // h21 x + h22 y + h23 - v h31 x - v h32 y = v
    let (src_n, t_src) = normalize_points4(src);
    let (dst_n, t_dst) = normalize_points4(dst);

    let mut a = SMatrix::<f64, 8, 8>::zeros();
    let mut b = SVector::<f64, 8>::zeros();

    for k in 0..4 {
        let x = src_n[k].x;
        let y = src_n[k].y;
        let u = dst_n[k].x;
        let v = dst_n[k].y;

        let r0 = 2 * k;
        a[(r0, 0)] = x;
        a[(r0, 1)] = y;
        a[(r0, 2)] = 1.0;
        a[(r0, 6)] = -u * x;
        a[(r0, 7)] = -u * y;
        b[r0] = u;

        let r1 = 2 * k + 1;
        a[(r1, 3)] = x;
        a[(r1, 4)] = y;
        a[(r1, 5)] = 1.0;
        a[(r1, 6)] = -v * x;
        a[(r1, 7)] = -v * y;
        b[r1] = v;
    }

    let x = a.lu().solve(&b)?;

    let hn = Matrix3::<f64>::new(
        x[0], x[1], x[2], //
        x[3], x[4], x[5], //
        x[6], x[7], 1.0,
    );

    let h_den = denormalize_homography(hn, t_src, t_dst)?;
    let h_den = normalize_homography(h_den)?;

    Some(Homography::new(h_den))
}
