//! Editor configuration.

use serde::{Deserialize, Serialize};

/// Per-instance configuration. Set once at construction (or through the
/// editor's fluent setters); there is no process-wide mutable state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EditorConfig {
    /// JPEG output quality, 1-100.
    pub jpeg_quality: u8,
    /// Background colour used for rotation excess, resize padding and
    /// shadow canvases.
    pub background: [u8; 3],
    /// Allow resize to scale images up past their source size.
    pub allow_upscale: bool,
    /// Watermark opacity, 0-100.
    pub watermark_opacity: u8,
    /// Relax decoder resource limits when loading (tolerates unusual or
    /// slightly damaged JPEG streams).
    pub lenient_jpeg_decode: bool,
}

impl Default for EditorConfig {
    fn default() -> Self {
        Self {
            jpeg_quality: 75,
            background: [255, 255, 255],
            allow_upscale: false,
            watermark_opacity: 50,
            lenient_jpeg_decode: false,
        }
    }
}

impl EditorConfig {
    /// Quality clamped into the encoder's accepted range.
    pub fn clamped_jpeg_quality(&self) -> u8 {
        self.jpeg_quality.clamp(1, 100)
    }

    pub fn clamped_watermark_opacity(&self) -> u8 {
        self.watermark_opacity.min(100)
    }
}
