//! Adapters from the `image` crate.

use crate::session::FrameInput;
use nalgebra::Point2;
use std::path::Path;
use vplane_core::GrayImageView;

/// Borrow an `image::GrayImage` as a [`GrayImageView`].
pub fn gray_view(img: &::image::GrayImage) -> GrayImageView<'_> {
    GrayImageView {
        width: img.width() as usize,
        height: img.height() as usize,
        data: img.as_raw(),
    }
}

/// Decode any supported image file and convert it to 8-bit luma.
pub fn load_gray(path: impl AsRef<Path>) -> Result<::image::GrayImage, ::image::ImageError> {
    Ok(::image::ImageReader::open(path)?
        .with_guessed_format()?
        .decode()?
        .to_luma8())
}

impl<'a> FrameInput<'a> {
    pub fn from_luma(img: &'a ::image::GrayImage, candidates: &'a [Point2<f32>]) -> Self {
        Self::new(gray_view(img), candidates)
    }
}
