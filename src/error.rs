//! Error types for the editing chain.
//!
//! Every variant here is recovered locally: the editor appends the
//! `Display` text to its error log, skips the failing operation and keeps
//! the chain alive. Nothing crosses the public API as a panic.

/// Failure taxonomy for chain operations.
///
/// The `Display` strings are what callers see in the editor's error log,
/// so they stay human-readable rather than machine-oriented.
#[derive(Debug, thiserror::Error)]
pub enum EditorError {
    #[error("No main image loaded!")]
    NoMainImage,

    #[error("No working image created!")]
    NoWorkingImage,

    #[error("Could not locate file {0}")]
    MissingResource(String),

    #[error("Unable to decode {name}: {source}")]
    Decode {
        name: String,
        #[source]
        source: image::ImageError,
    },

    #[error("Unable to encode image: {0}")]
    Encode(#[source] image::ImageError),

    #[error("Extension not recognised, must be jpg/jpeg/png/gif: {0}")]
    UnsupportedFormat(String),

    #[error("Unable to create image sized {width} x {height}")]
    Allocation { width: u32, height: u32 },

    #[error("Invalid dimensions, negative origin or region outside the source: {x1}/{y1} x {x2}/{y2}")]
    InvalidGeometry { x1: i64, y1: i64, x2: i64, y2: i64 },

    #[error("Could not parse font file {0}")]
    InvalidFont(String),

    #[error("Colour error, expected #RGB, #RRGGBB or an (r,g,b) triple: {0}")]
    InvalidColor(String),

    #[error("Position {0} not in valid range 7,8,9 - 4,5,6 - 1,2,3")]
    InvalidPosition(u8),

    #[error("File exists, overwrite is false, could not save over file {0}")]
    FileExists(String),

    #[error("Watermark is larger than image. Watermark: {wm_w} x {wm_h} Image: {img_w} x {img_h}")]
    WatermarkTooLarge {
        wm_w: u32,
        wm_h: u32,
        img_w: u32,
        img_h: u32,
    },

    #[error("No watermark loaded or created")]
    NoWatermark,

    #[error("Filter {0} failed: {1}")]
    FilterFailure(&'static str, String),

    #[error("No source filename to derive from")]
    NoFilename,

    #[error("I/O error on {path}: {source}")]
    Io {
        path: String,
        #[source]
        source: std::io::Error,
    },
}

/// Returned by [`crate::ImageEditor::finish`] when the chain logged errors.
#[derive(Debug, thiserror::Error)]
#[error("editing chain failed: {}", messages.join("; "))]
pub struct ChainFailed {
    pub messages: Vec<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_display_matches_log_wording() {
        assert_eq!(EditorError::NoMainImage.to_string(), "No main image loaded!");
        assert_eq!(
            EditorError::InvalidPosition(0).to_string(),
            "Position 0 not in valid range 7,8,9 - 4,5,6 - 1,2,3"
        );
        assert!(EditorError::InvalidColor("zzz".into())
            .to_string()
            .starts_with("Colour error"));
    }

    #[test]
    fn test_chain_failed_joins_messages() {
        let err = ChainFailed {
            messages: vec!["a".into(), "b".into()],
        };
        assert_eq!(err.to_string(), "editing chain failed: a; b");
    }
}
