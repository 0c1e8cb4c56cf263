//! Float image pyramid for coarse-to-fine optical flow.

use vplane_core::GrayImageView;

/// Row-major single-channel float image.
#[derive(Clone, Debug)]
pub struct FloatImage {
    pub width: usize,
    pub height: usize,
    pub data: Vec<f32>,
}

impl FloatImage {
    pub fn from_gray(src: &GrayImageView<'_>) -> Self {
        Self {
            width: src.width,
            height: src.height,
            data: src.data.iter().map(|&v| v as f32).collect(),
        }
    }

    #[inline]
    pub fn get(&self, x: usize, y: usize) -> f32 {
        self.data[y * self.width + x]
    }

    /// Bilinear sample with coordinates clamped to the image border.
    ///
    /// Clamping keeps patches that straddle the border finite; their
    /// gradients degenerate and the solver reports them as lost.
    #[inline]
    pub fn sample(&self, x: f32, y: f32) -> f32 {
        let max_x = (self.width - 1) as f32;
        let max_y = (self.height - 1) as f32;
        let x = x.clamp(0.0, max_x);
        let y = y.clamp(0.0, max_y);

        let x0 = x.floor() as usize;
        let y0 = y.floor() as usize;
        let x1 = (x0 + 1).min(self.width - 1);
        let y1 = (y0 + 1).min(self.height - 1);
        let fx = x - x0 as f32;
        let fy = y - y0 as f32;

        let p00 = self.get(x0, y0);
        let p10 = self.get(x1, y0);
        let p01 = self.get(x0, y1);
        let p11 = self.get(x1, y1);

        let a = p00 + fx * (p10 - p00);
        let b = p01 + fx * (p11 - p01);
        a + fy * (b - a)
    }

    /// Separable blur with a normalized 1D kernel; borders replicate.
    pub fn blur(&self, kernel: &[f32]) -> Self {
        let half = (kernel.len() / 2) as isize;
        let (w, h) = (self.width as isize, self.height as isize);

        let mut rows = vec![0.0f32; self.data.len()];
        for y in 0..self.height {
            let row = &self.data[y * self.width..(y + 1) * self.width];
            for x in 0..w {
                let mut acc = 0.0f32;
                for (k, &kv) in kernel.iter().enumerate() {
                    let sx = (x + k as isize - half).clamp(0, w - 1) as usize;
                    acc += row[sx] * kv;
                }
                rows[y * self.width + x as usize] = acc;
            }
        }

        let mut data = vec![0.0f32; self.data.len()];
        for y in 0..h {
            for x in 0..self.width {
                let mut acc = 0.0f32;
                for (k, &kv) in kernel.iter().enumerate() {
                    let sy = (y + k as isize - half).clamp(0, h - 1) as usize;
                    acc += rows[sy * self.width + x] * kv;
                }
                data[y as usize * self.width + x] = acc;
            }
        }
        Self {
            width: self.width,
            height: self.height,
            data,
        }
    }

    /// Keep every other pixel in both directions. Odd sides round up.
    pub fn decimate(&self) -> Self {
        let w = self.width.div_ceil(2);
        let h = self.height.div_ceil(2);
        let mut data = Vec::with_capacity(w * h);
        for y in 0..h {
            for x in 0..w {
                data.push(self.get(2 * x, 2 * y));
            }
        }
        Self {
            width: w,
            height: h,
            data,
        }
    }
}

/// Normalized 1D Gaussian with a half-size of `ceil(3 * sigma)` taps.
pub fn gaussian_kernel(sigma: f32) -> Vec<f32> {
    let half = (3.0 * sigma).ceil().max(1.0) as usize;
    let two_sigma_sq = 2.0 * sigma * sigma;
    let mut kernel: Vec<f32> = (0..=2 * half)
        .map(|i| {
            let x = i as f32 - half as f32;
            (-x * x / two_sigma_sq).exp()
        })
        .collect();
    let sum: f32 = kernel.iter().sum();
    for v in &mut kernel {
        *v /= sum;
    }
    kernel
}

/// Image pyramid; level 0 is full resolution.
#[derive(Clone, Debug)]
pub struct Pyramid {
    pub levels: Vec<FloatImage>,
}

impl Pyramid {
    /// Smallest side length a level may have.
    const MIN_SIDE: usize = 8;

    /// Build up to `num_levels` levels, stopping early once a level gets
    /// smaller than a few pixels. Level 0 is the source as is; every further
    /// level is the previous one blurred with a Gaussian of `sigma` and
    /// decimated by 2. An empty image yields an empty pyramid.
    pub fn build(src: &GrayImageView<'_>, num_levels: usize, sigma: f32) -> Self {
        let mut levels = Vec::with_capacity(num_levels);
        if src.is_empty() || num_levels == 0 {
            return Self { levels };
        }
        let kernel = gaussian_kernel(sigma.max(f32::EPSILON));
        levels.push(FloatImage::from_gray(src));
        while levels.len() < num_levels {
            let last = &levels[levels.len() - 1];
            if last.width < 2 * Self::MIN_SIDE || last.height < 2 * Self::MIN_SIDE {
                break;
            }
            let next = last.blur(&kernel).decimate();
            levels.push(next);
        }
        Self { levels }
    }

    #[inline]
    pub fn num_levels(&self) -> usize {
        self.levels.len()
    }

    #[inline]
    pub fn level(&self, level: usize) -> &FloatImage {
        &self.levels[level]
    }
}
