//! Watermark construction.
//!
//! Two paths build a watermark: loading an overlay image (optionally
//! sampling one of its pixels as a colour key) and rendering text with a
//! TTF font. Application onto the working buffer lives in the editor.

use crate::compositor;
use crate::error::EditorError;
use ab_glyph::{FontVec, PxScale};
use image::RgbaImage;
use imageproc::drawing::{draw_text_mut, text_size};
use imageproc::geometric_transformations::{rotate_about_center, Interpolation};

/// How the overlay composites onto the working buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WatermarkMode {
    /// One colour in the overlay is treated as fully transparent; the
    /// rest blends through the cut/paste/merge path at inverted opacity.
    ColorKey([u8; 3]),
    /// Overlay alpha blended directly at the configured opacity.
    AlphaMerge,
}

#[derive(Debug, Clone)]
pub struct Watermark {
    pub image: RgbaImage,
    pub mode: WatermarkMode,
}

impl Watermark {
    /// Build from a decoded overlay. Supplying `transparent_at` samples
    /// that pixel as the colour key and selects [`WatermarkMode::ColorKey`];
    /// otherwise the overlay's own alpha channel is used.
    pub fn from_image(
        image: RgbaImage,
        transparent_at: Option<(u32, u32)>,
    ) -> Result<Self, EditorError> {
        let mode = match transparent_at {
            Some((x, y)) => {
                let pixel =
                    compositor::sample_at(&image, x, y).ok_or(EditorError::InvalidGeometry {
                        x1: x as i64,
                        y1: y as i64,
                        x2: image.width() as i64,
                        y2: image.height() as i64,
                    })?;
                WatermarkMode::ColorKey([pixel[0], pixel[1], pixel[2]])
            }
            None => WatermarkMode::AlphaMerge,
        };
        Ok(Self { image, mode })
    }

    /// Render `text` into a freshly sized buffer.
    ///
    /// The buffer is transparent outside the glyphs, so the mode is
    /// always [`WatermarkMode::AlphaMerge`]. Known limitation: the
    /// bounding box is measured before rotation, so glyph corners crop
    /// at non-zero angles.
    pub fn from_text(
        text: &str,
        font: &FontVec,
        size: f32,
        colour: [u8; 3],
        angle: f32,
    ) -> Result<Self, EditorError> {
        let scale = PxScale::from(size);

        let (width, height) = text_size(scale, font, text);
        let mut canvas = compositor::allocate(width, height, compositor::TRANSPARENT)?;
        draw_text_mut(
            &mut canvas,
            crate::color::opaque(colour),
            0,
            0,
            scale,
            font,
            text,
        );

        if angle != 0.0 {
            canvas = rotate_about_center(
                &canvas,
                -angle.to_radians(),
                Interpolation::Bilinear,
                compositor::TRANSPARENT,
            );
        }

        Ok(Self {
            image: canvas,
            mode: WatermarkMode::AlphaMerge,
        })
    }

    pub fn dimensions(&self) -> (u32, u32) {
        self.image.dimensions()
    }
}
