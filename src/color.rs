//! Colour parsing.
//!
//! Any operation that takes a colour accepts `"#RGB"`, `"#RRGGBB"` (with or
//! without the leading `#`) or an explicit `[r, g, b]` triple. All forms
//! normalize to an RGB triple; a parse failure is fatal to the operation
//! that requested it but never to the chain.

use crate::error::EditorError;
use image::Rgba;

/// A colour argument before normalization.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ColorSpec {
    Hex(String),
    Rgb([u8; 3]),
}

impl From<&str> for ColorSpec {
    fn from(s: &str) -> Self {
        ColorSpec::Hex(s.to_string())
    }
}

impl From<String> for ColorSpec {
    fn from(s: String) -> Self {
        ColorSpec::Hex(s)
    }
}

impl From<[u8; 3]> for ColorSpec {
    fn from(rgb: [u8; 3]) -> Self {
        ColorSpec::Rgb(rgb)
    }
}

impl From<(u8, u8, u8)> for ColorSpec {
    fn from((r, g, b): (u8, u8, u8)) -> Self {
        ColorSpec::Rgb([r, g, b])
    }
}

/// Normalize a colour spec to an RGB triple.
pub fn parse(spec: &ColorSpec) -> Result<[u8; 3], EditorError> {
    match spec {
        ColorSpec::Rgb(rgb) => Ok(*rgb),
        ColorSpec::Hex(s) => parse_hex(s),
    }
}

/// Parse `#RGB`, `RGB`, `#RRGGBB` or `RRGGBB`. Short-form digits are
/// duplicated, so `#f0a` is `#ff00aa`.
pub fn parse_hex(s: &str) -> Result<[u8; 3], EditorError> {
    let hex = s.strip_prefix('#').unwrap_or(s);

    let expanded: String = match hex.len() {
        6 => hex.to_string(),
        3 => hex.chars().flat_map(|c| [c, c]).collect(),
        _ => return Err(EditorError::InvalidColor(s.to_string())),
    };

    let channel = |i: usize| {
        u8::from_str_radix(&expanded[i..i + 2], 16)
            .map_err(|_| EditorError::InvalidColor(s.to_string()))
    };

    Ok([channel(0)?, channel(2)?, channel(4)?])
}

/// RGB triple to an opaque RGBA pixel.
pub fn opaque(rgb: [u8; 3]) -> Rgba<u8> {
    Rgba([rgb[0], rgb[1], rgb[2], 255])
}

/// Re-serialize a triple to the canonical 6-digit form.
pub fn to_hex(rgb: [u8; 3]) -> String {
    format!("#{:02x}{:02x}{:02x}", rgb[0], rgb[1], rgb[2])
}
