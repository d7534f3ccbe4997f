//! Buffer-level realization of geometry decisions.
//!
//! The geometry engine decides sizes and positions; this module turns
//! those decisions into pixels with the `image`/`imageproc` primitives.
//! All surfaces are RGBA8 so alpha survives every intermediate step.

use crate::error::EditorError;
use crate::geometry;
use image::{imageops, Rgba, RgbaImage};
use imageproc::drawing::{draw_filled_ellipse_mut, draw_hollow_rect_mut, draw_line_segment_mut};
use imageproc::geometric_transformations::{rotate_about_center, Interpolation};
use imageproc::rect::Rect;

pub const TRANSPARENT: Rgba<u8> = Rgba([0, 0, 0, 0]);

/// Allocate a canvas filled with `fill`. Zero-sized canvases are an
/// allocation failure, never a panic.
pub fn allocate(width: u32, height: u32, fill: Rgba<u8>) -> Result<RgbaImage, EditorError> {
    if width == 0 || height == 0 {
        return Err(EditorError::Allocation { width, height });
    }
    Ok(RgbaImage::from_pixel(width, height, fill))
}

/// Filter selection by downscale ratio: cheap filters for heavy
/// reductions, Lanczos3 near 1:1.
pub fn select_filter(
    orig_width: u32,
    orig_height: u32,
    new_width: u32,
    new_height: u32,
) -> imageops::FilterType {
    let width_ratio = orig_width as f32 / new_width as f32;
    let height_ratio = orig_height as f32 / new_height as f32;
    let max_ratio = width_ratio.max(height_ratio);

    if max_ratio > 2.0 {
        imageops::FilterType::Triangle
    } else if max_ratio > 1.5 {
        imageops::FilterType::CatmullRom
    } else {
        imageops::FilterType::Lanczos3
    }
}

/// Resample a source rectangle into a new `(dst_width, dst_height)` buffer.
pub fn resample(
    src: &RgbaImage,
    slice: geometry::CoverSlice,
    dst_width: u32,
    dst_height: u32,
) -> Result<RgbaImage, EditorError> {
    if dst_width == 0 || dst_height == 0 {
        return Err(EditorError::Allocation {
            width: dst_width,
            height: dst_height,
        });
    }
    let cropped = imageops::crop_imm(src, slice.x, slice.y, slice.width, slice.height).to_image();
    let filter = select_filter(slice.width, slice.height, dst_width, dst_height);
    Ok(imageops::resize(&cropped, dst_width, dst_height, filter))
}

/// Copy a source rectangle without resampling.
pub fn direct_copy(src: &RgbaImage, x: u32, y: u32, width: u32, height: u32) -> RgbaImage {
    imageops::crop_imm(src, x, y, width, height).to_image()
}

/// Alpha-blend `overlay` onto `dst` at `(x, y)` scaled to `opacity_pct`
/// (0-100). Full opacity keeps the overlay's own alpha channel.
pub fn merge(dst: &mut RgbaImage, overlay: &RgbaImage, x: i64, y: i64, opacity_pct: u8) {
    if opacity_pct >= 100 {
        imageops::overlay(dst, overlay, x, y);
    } else {
        let mut faded = overlay.clone();
        scale_alpha(&mut faded, opacity_pct);
        imageops::overlay(dst, &faded, x, y);
    }
}

/// Multiply every pixel's alpha by `pct / 100`.
pub fn scale_alpha(img: &mut RgbaImage, pct: u8) {
    let pct = pct.min(100) as u16;
    for pixel in img.pixels_mut() {
        pixel[3] = (pixel[3] as u16 * pct / 100) as u8;
    }
}

/// Make every pixel whose RGB matches `key` fully transparent.
pub fn color_key_to_alpha(img: &mut RgbaImage, key: [u8; 3]) {
    for pixel in img.pixels_mut() {
        if pixel[0] == key[0] && pixel[1] == key[1] && pixel[2] == key[2] {
            *pixel = TRANSPARENT;
        }
    }
}

/// Pixel at `(x, y)`, or None outside the buffer.
pub fn sample_at(img: &RgbaImage, x: u32, y: u32) -> Option<Rgba<u8>> {
    if x < img.width() && y < img.height() {
        Some(*img.get_pixel(x, y))
    } else {
        None
    }
}

/// Paint a solid rectangle, clipped to the buffer.
pub fn fill_rect(img: &mut RgbaImage, x: i64, y: i64, width: u32, height: u32, colour: Rgba<u8>) {
    if width == 0 || height == 0 {
        return;
    }
    let rect = Rect::at(x as i32, y as i32).of_size(width, height);
    imageproc::drawing::draw_filled_rect_mut(img, rect, colour);
}

/// Draw `width` concentric one-pixel rectangle outlines from the edge
/// inwards.
pub fn draw_border(img: &mut RgbaImage, width: u32, colour: Rgba<u8>) {
    let (w, h) = img.dimensions();
    for i in 0..width {
        if 2 * i >= w || 2 * i >= h {
            break;
        }
        let rect = Rect::at(i as i32, i as i32).of_size(w - 2 * i, h - 2 * i);
        draw_hollow_rect_mut(img, rect, colour);
    }
}

/// Two-tone bevel overlay for the 3D border: concentric black/white edge
/// lines on a transparent canvas, to be merged at the caller's opacity.
///
/// `rot` 0-3 selects which sides take black and which white; out-of-range
/// codes fall back to the 0 palette without reporting.
pub fn bevel_overlay(width: u32, height: u32, border_width: u32, rot: u8) -> RgbaImage {
    let black = Rgba([0, 0, 0, 255]);
    let white = Rgba([255, 255, 255, 255]);
    // (top, left, right, bottom)
    let (top, left, right, bottom) = match rot {
        1 => (white, black, white, black),
        2 => (black, black, white, white),
        3 => (black, white, black, white),
        _ => (white, white, black, black),
    };

    let mut overlay = RgbaImage::from_pixel(width, height, TRANSPARENT);
    let (wf, hf) = (width as f32, height as f32);
    for i in 0..border_width {
        let x = i as f32;
        if 2 * i >= width || 2 * i >= height {
            break;
        }
        draw_line_segment_mut(&mut overlay, (x, x), (wf - x - 1.0, x), top);
        draw_line_segment_mut(&mut overlay, (x, x), (x, hf - x - 1.0), left);
        draw_line_segment_mut(&mut overlay, (wf - x - 1.0, x), (wf - x - 1.0, hf - x - 1.0), right);
        draw_line_segment_mut(&mut overlay, (x, hf - x - 1.0), (wf - x - 1.0, hf - x - 1.0), bottom);
    }
    overlay
}

/// Quarter-circle stencil for corner rounding, shaped for the top-left
/// corner. The default form is background-coloured with a transparent
/// circular cutout hugging the inner corner; `invert` swaps fill and
/// cutout. Rotate with [`imageops::rotate90`] for the other corners.
pub fn corner_stencil(radius: u32, background: Rgba<u8>, invert: bool) -> RgbaImage {
    let r = radius as i32;
    if invert {
        let mut stencil = RgbaImage::from_pixel(radius, radius, TRANSPARENT);
        draw_filled_ellipse_mut(&mut stencil, (0, 0), r - 1, r - 1, background);
        stencil
    } else {
        let mut stencil = RgbaImage::from_pixel(radius, radius, background);
        draw_filled_ellipse_mut(&mut stencil, (r, r), r, r, TRANSPARENT);
        stencil
    }
}

/// Rotate a buffer counter-clockwise by `angle_degrees`, growing the
/// canvas to the rotated bounding box and filling the excess with
/// `fill`. Right angles take the exact paths and produce no excess.
pub fn rotate_canvas(img: &RgbaImage, angle_degrees: f32, fill: Rgba<u8>) -> RgbaImage {
    let angle = angle_degrees.rem_euclid(360.0);
    if angle == 0.0 {
        return img.clone();
    }
    if angle == 90.0 {
        return imageops::rotate270(img);
    }
    if angle == 180.0 {
        return imageops::rotate180(img);
    }
    if angle == 270.0 {
        return imageops::rotate90(img);
    }

    let (bw, bh) = geometry::rotated_bounds(img.width(), img.height(), angle);
    let mut canvas = RgbaImage::from_pixel(bw, bh, fill);
    let x = geometry::pad_offset(bw, img.width()) as i64;
    let y = geometry::pad_offset(bh, img.height()) as i64;
    imageops::overlay(&mut canvas, img, x, y);

    // rotate_about_center is clockwise for positive theta
    rotate_about_center(&canvas, -angle.to_radians(), Interpolation::Bilinear, fill)
}
