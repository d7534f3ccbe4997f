//! Pure geometry for the editing operations.
//!
//! Everything here is a deterministic size/position computation; buffer
//! work happens in [`crate::compositor`]. Fractional results truncate
//! toward zero, matching canvas allocation semantics.

use crate::error::EditorError;

/// Proportional fit inside `(mw, mh)`.
///
/// Aspect ratios decide the constrained axis: wider-than-bounds sources
/// are width-constrained, the rest height-constrained. A source already
/// inside the bounds keeps its size unless upscaling is allowed.
pub fn fit_within(width: u32, height: u32, mw: u32, mh: u32, allow_upscale: bool) -> (u32, u32) {
    if width > mw || height > mh || allow_upscale {
        let (w, h, mw_f, mh_f) = (width as f64, height as f64, mw as f64, mh as f64);
        if w / h > mw_f / mh_f {
            let tnw = mw_f;
            let tnh = tnw * h / w;
            (tnw as u32, tnh as u32)
        } else {
            let tnh = mh_f;
            let tnw = tnh * w / h;
            (tnw as u32, tnh as u32)
        }
    } else {
        (width, height)
    }
}

/// Centering offset for padding an `inner`-sized image onto an
/// `outer`-sized canvas.
pub fn pad_offset(outer: u32, inner: u32) -> u32 {
    outer.saturating_sub(inner) / 2
}

/// Source rectangle selected by fit-and-crop (cover) scaling.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CoverSlice {
    pub x: u32,
    pub y: u32,
    pub width: u32,
    pub height: u32,
}

/// Pick the centered source slice that covers `(mw, mh)` exactly.
///
/// The axis with the larger source/target ratio gets cropped; the other
/// is used in full.
pub fn cover_slice(width: u32, height: u32, mw: u32, mh: u32) -> CoverSlice {
    let wx = width as f64 / mw as f64;
    let wy = height as f64 / mh as f64;

    if wx >= wy {
        // full source height, horizontally centered slice
        let slice_width = mw as f64 * wy;
        CoverSlice {
            x: ((width as f64 - slice_width) / 2.0) as u32,
            y: 0,
            width: slice_width as u32,
            height,
        }
    } else {
        // full source width, vertically centered slice
        let slice_height = mh as f64 * wx;
        CoverSlice {
            x: 0,
            y: ((height as f64 - slice_height) / 2.0) as u32,
            width,
            height: slice_height as u32,
        }
    }
}

/// Validate a crop rectangle against the source bounds.
///
/// Returns `(x, y, width, height)` of the accepted rectangle. Negative
/// origins or a rectangle larger than the source are rejected without
/// clamping.
pub fn validate_crop(
    x1: i64,
    y1: i64,
    x2: i64,
    y2: i64,
    src_width: u32,
    src_height: u32,
) -> Result<(u32, u32, u32, u32), EditorError> {
    if x1 < 0 || y1 < 0 || x2 - x1 > src_width as i64 || y2 - y1 > src_height as i64 {
        return Err(EditorError::InvalidGeometry { x1, y1, x2, y2 });
    }
    Ok((x1 as u32, y1 as u32, (x2 - x1) as u32, (y2 - y1) as u32))
}

/// Keypad anchor, X axis. Columns: 7/4/1 left, 8/5/2 center, 9/6/3 right.
///
/// Invalid codes resolve to the left-edge default and report it so the
/// caller can log; Y resolution reports independently.
pub fn anchor_x(code: u8, canvas_w: u32, overlay_w: u32, offset: u32) -> (i64, bool) {
    match code {
        7 | 4 | 1 => (offset as i64, true),
        8 | 5 | 2 => ((canvas_w as i64 - overlay_w as i64) / 2, true),
        9 | 6 | 3 => (canvas_w as i64 - offset as i64 - overlay_w as i64, true),
        _ => (offset as i64, false),
    }
}

/// Keypad anchor, Y axis. Rows: 7/8/9 top, 4/5/6 middle, 1/2/3 bottom.
pub fn anchor_y(code: u8, canvas_h: u32, overlay_h: u32, offset: u32) -> (i64, bool) {
    match code {
        7 | 8 | 9 => (offset as i64, true),
        4 | 5 | 6 => ((canvas_h as i64 - overlay_h as i64) / 2, true),
        1 | 2 | 3 => (canvas_h as i64 - offset as i64 - overlay_h as i64, true),
        _ => (offset as i64, false),
    }
}

/// Shadow placement, X axis: `(shadow_x, image_x, code_valid)`.
///
/// The keypad codes mirror the anchor model but inverted: the shadow sits
/// toward the named direction and the image takes the complementary
/// offset, so image and shadow end up diagonally offset by `size`.
pub fn shadow_x(code: u8, size: u32) -> (u32, u32, bool) {
    match code {
        7 | 4 | 1 => (0, size, true),
        8 | 5 | 2 => (size / 2, size / 2, true),
        9 | 6 | 3 => (size, 0, true),
        _ => (size, 0, false),
    }
}

/// Shadow placement, Y axis: `(shadow_y, image_y, code_valid)`.
pub fn shadow_y(code: u8, size: u32) -> (u32, u32, bool) {
    match code {
        7 | 8 | 9 => (0, size, true),
        4 | 5 | 6 => (size / 2, size / 2, true),
        1 | 2 | 3 => (size, 0, true),
        _ => (size, 0, false),
    }
}

/// Canvas size needed to hold `(width, height)` rotated by `angle_degrees`.
pub fn rotated_bounds(width: u32, height: u32, angle_degrees: f32) -> (u32, u32) {
    let theta = (angle_degrees as f64).to_radians();
    let (sin, cos) = (theta.sin().abs(), theta.cos().abs());
    let w = width as f64;
    let h = height as f64;
    // the epsilon keeps right angles from ceiling up on sin/cos rounding
    let snap = |v: f64| (v - 1e-6).ceil().max(1.0) as u32;
    (snap(w * cos + h * sin), snap(w * sin + h * cos))
}
