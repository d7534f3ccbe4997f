//! Named pixel filters applied to the working buffer.

use crate::error::EditorError;
use image::{imageops, Rgba, RgbaImage};

/// Closed set of supported filters. Arguments are validated on apply;
/// rejected arguments surface as [`EditorError::FilterFailure`].
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum Filter {
    /// Invert every colour channel.
    Negate,
    Grayscale,
    Sepia,
    /// -100 (black) to 100 (double brightness), 0 is no change.
    Brightness(i32),
    /// -100 (flat) to 100 (doubled contrast), 0 is no change.
    Contrast(f32),
    /// Additive channel shift, each component -255 to 255.
    Colorize { r: i16, g: i16, b: i16 },
    /// Gaussian blur with the given sigma (> 0).
    GaussianBlur(f32),
    /// Average colour over square blocks of the given size (> 0).
    Pixelate(u32),
}

impl Filter {
    pub fn name(&self) -> &'static str {
        match self {
            Filter::Negate => "negate",
            Filter::Grayscale => "grayscale",
            Filter::Sepia => "sepia",
            Filter::Brightness(_) => "brightness",
            Filter::Contrast(_) => "contrast",
            Filter::Colorize { .. } => "colorize",
            Filter::GaussianBlur(_) => "gaussian_blur",
            Filter::Pixelate(_) => "pixelate",
        }
    }
}

/// Apply one filter, producing a new buffer of identical dimensions.
pub fn apply(img: &RgbaImage, filter: &Filter) -> Result<RgbaImage, EditorError> {
    match *filter {
        Filter::Negate => Ok(map_rgb(img, |r, g, b| (255 - r, 255 - g, 255 - b))),
        Filter::Grayscale => Ok(map_rgb(img, |r, g, b| {
            let gray = luma(r, g, b);
            (gray, gray, gray)
        })),
        Filter::Sepia => Ok(map_rgb(img, |r, g, b| {
            let (rf, gf, bf) = (r as f32, g as f32, b as f32);
            (
                (0.393 * rf + 0.769 * gf + 0.189 * bf).min(255.0) as u8,
                (0.349 * rf + 0.686 * gf + 0.168 * bf).min(255.0) as u8,
                (0.272 * rf + 0.534 * gf + 0.131 * bf).min(255.0) as u8,
            )
        })),
        Filter::Brightness(adjustment) => {
            let multiplier = 1.0 + adjustment as f32 / 100.0;
            Ok(map_rgb(img, |r, g, b| {
                (
                    scale(r, multiplier),
                    scale(g, multiplier),
                    scale(b, multiplier),
                )
            }))
        }
        Filter::Contrast(adjustment) => {
            let factor = 1.0 + adjustment / 100.0;
            let intercept = 128.0 * (1.0 - factor);
            let adjust = |c: u8| (c as f32 * factor + intercept).clamp(0.0, 255.0) as u8;
            Ok(map_rgb(img, |r, g, b| (adjust(r), adjust(g), adjust(b))))
        }
        Filter::Colorize { r, g, b } => {
            let shift = |c: u8, d: i16| (c as i16 + d).clamp(0, 255) as u8;
            Ok(map_rgb(img, |pr, pg, pb| {
                (shift(pr, r), shift(pg, g), shift(pb, b))
            }))
        }
        Filter::GaussianBlur(sigma) => {
            if sigma <= 0.0 {
                return Err(EditorError::FilterFailure(
                    filter.name(),
                    format!("sigma must be positive, got {sigma}"),
                ));
            }
            Ok(imageops::blur(img, sigma))
        }
        Filter::Pixelate(block) => {
            if block == 0 {
                return Err(EditorError::FilterFailure(
                    filter.name(),
                    "block size must be positive".to_string(),
                ));
            }
            Ok(pixelate(img, block))
        }
    }
}

fn luma(r: u8, g: u8, b: u8) -> u8 {
    (0.299 * r as f32 + 0.587 * g as f32 + 0.114 * b as f32) as u8
}

fn scale(c: u8, multiplier: f32) -> u8 {
    (c as f32 * multiplier).clamp(0.0, 255.0) as u8
}

/// Per-pixel RGB transform preserving alpha.
fn map_rgb(img: &RgbaImage, f: impl Fn(u8, u8, u8) -> (u8, u8, u8)) -> RgbaImage {
    let mut out = RgbaImage::new(img.width(), img.height());
    for (x, y, pixel) in img.enumerate_pixels() {
        let Rgba([r, g, b, a]) = *pixel;
        let (nr, ng, nb) = f(r, g, b);
        out.put_pixel(x, y, Rgba([nr, ng, nb, a]));
    }
    out
}

fn pixelate(img: &RgbaImage, block: u32) -> RgbaImage {
    let (width, height) = img.dimensions();
    let mut out = RgbaImage::new(width, height);

    for by in (0..height).step_by(block as usize) {
        for bx in (0..width).step_by(block as usize) {
            let bw = block.min(width - bx);
            let bh = block.min(height - by);
            let count = (bw * bh) as u32;

            let mut sums = [0u32; 4];
            for y in by..by + bh {
                for x in bx..bx + bw {
                    let p = img.get_pixel(x, y);
                    for (sum, channel) in sums.iter_mut().zip(p.0) {
                        *sum += channel as u32;
                    }
                }
            }
            let avg = Rgba(sums.map(|s| (s / count) as u8));
            for y in by..by + bh {
                for x in bx..bx + bw {
                    out.put_pixel(x, y, avg);
                }
            }
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;

    fn fixture(rgba: [u8; 4]) -> RgbaImage {
        RgbaImage::from_pixel(10, 10, Rgba(rgba))
    }

    #[test]
    fn test_negate() {
        let out = apply(&fixture([255, 100, 50, 255]), &Filter::Negate).unwrap();
        let p = out.get_pixel(0, 0);
        assert_eq!((p[0], p[1], p[2], p[3]), (0, 155, 205, 255));
    }

    #[test]
    fn test_negate_roundtrip() {
        let img = fixture([100, 150, 200, 255]);
        let twice = apply(&apply(&img, &Filter::Negate).unwrap(), &Filter::Negate).unwrap();
        assert_eq!(img.as_raw(), twice.as_raw());
    }

    #[test]
    fn test_grayscale_equalizes_channels() {
        let out = apply(&fixture([255, 0, 0, 200]), &Filter::Grayscale).unwrap();
        let p = out.get_pixel(0, 0);
        assert_eq!(p[0], p[1]);
        assert_eq!(p[1], p[2]);
        assert_eq!(p[3], 200); // alpha untouched
    }

    #[test]
    fn test_sepia_warm_tone() {
        let out = apply(&fixture([255, 255, 255, 255]), &Filter::Sepia).unwrap();
        let p = out.get_pixel(0, 0);
        assert!(p[0] >= p[1] && p[1] >= p[2]);
    }

    #[test]
    fn test_brightness() {
        let brighter = apply(&fixture([100, 100, 100, 255]), &Filter::Brightness(50)).unwrap();
        assert!(brighter.get_pixel(0, 0)[0] > 100);
        let darker = apply(&fixture([100, 100, 100, 255]), &Filter::Brightness(-50)).unwrap();
        assert!(darker.get_pixel(0, 0)[0] < 100);
    }

    #[test]
    fn test_contrast_moves_away_from_mid() {
        let out = apply(&fixture([100, 100, 100, 255]), &Filter::Contrast(50.0)).unwrap();
        assert!(out.get_pixel(0, 0)[0] < 100);
    }

    #[test]
    fn test_colorize_clamps() {
        let out = apply(
            &fixture([200, 10, 100, 255]),
            &Filter::Colorize { r: 100, g: -50, b: 0 },
        )
        .unwrap();
        let p = out.get_pixel(0, 0);
        assert_eq!((p[0], p[1], p[2]), (255, 0, 100));
    }

    #[test]
    fn test_gaussian_blur_rejects_non_positive_sigma() {
        let err = apply(&fixture([1, 2, 3, 255]), &Filter::GaussianBlur(0.0)).unwrap_err();
        assert!(err.to_string().contains("gaussian_blur"));
    }

    #[test]
    fn test_pixelate_averages_blocks() {
        let mut img = RgbaImage::from_pixel(4, 4, Rgba([0, 0, 0, 255]));
        img.put_pixel(0, 0, Rgba([255, 255, 255, 255]));
        let out = apply(&img, &Filter::Pixelate(2)).unwrap();
        // 2x2 block averaging one white and three black pixels
        let p = out.get_pixel(1, 1);
        assert_eq!(p[0], 63);
        // untouched block stays black
        assert_eq!(out.get_pixel(3, 3)[0], 0);
    }

    #[test]
    fn test_pixelate_rejects_zero_block() {
        assert!(apply(&fixture([1, 2, 3, 255]), &Filter::Pixelate(0)).is_err());
    }

    #[test]
    fn test_dimensions_preserved() {
        let img = fixture([10, 20, 30, 255]);
        for filter in [
            Filter::Negate,
            Filter::Grayscale,
            Filter::Sepia,
            Filter::Brightness(10),
            Filter::Contrast(10.0),
            Filter::GaussianBlur(1.5),
            Filter::Pixelate(3),
        ] {
            assert_eq!(apply(&img, &filter).unwrap().dimensions(), (10, 10));
        }
    }
}
