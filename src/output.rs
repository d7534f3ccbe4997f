//! Output surface: extension-based format resolution, encoding to bytes
//! and the response-header bundle for streaming.

use crate::error::EditorError;
use bytes::Bytes;
use chrono::{DateTime, Utc};
use http::header::{HeaderMap, HeaderValue, CONTENT_DISPOSITION, CONTENT_TYPE, LAST_MODIFIED};
use image::codecs::jpeg::JpegEncoder;
use image::{DynamicImage, ImageFormat, RgbaImage};
use std::io::Cursor;
use std::path::Path;

/// The three output formats the editor writes.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Gif,
    Jpeg,
    Png,
}

impl OutputFormat {
    /// Case-insensitive extension match; `jpg` and `jpeg` are equivalent.
    pub fn from_extension(ext: &str) -> Option<Self> {
        match ext.to_ascii_lowercase().as_str() {
            "gif" => Some(OutputFormat::Gif),
            "jpg" | "jpeg" => Some(OutputFormat::Jpeg),
            "png" => Some(OutputFormat::Png),
            _ => None,
        }
    }

    /// Resolve from a filename, rejecting anything but gif/jpg/jpeg/png.
    pub fn from_path(path: &Path) -> Result<Self, EditorError> {
        path.extension()
            .and_then(|ext| ext.to_str())
            .and_then(Self::from_extension)
            .ok_or_else(|| EditorError::UnsupportedFormat(path.display().to_string()))
    }

    pub fn mime(&self) -> &'static str {
        match self {
            OutputFormat::Gif => "image/gif",
            OutputFormat::Jpeg => "image/jpeg",
            OutputFormat::Png => "image/png",
        }
    }
}

/// Encode a buffer. JPEG flattens alpha and honours `jpeg_quality`;
/// PNG and GIF keep the alpha channel.
pub fn encode(
    img: &RgbaImage,
    format: OutputFormat,
    jpeg_quality: u8,
) -> Result<Bytes, EditorError> {
    let (width, height) = img.dimensions();
    let mut buffer = Vec::with_capacity(width as usize * height as usize * 3);
    let mut cursor = Cursor::new(&mut buffer);

    match format {
        OutputFormat::Jpeg => {
            let rgb = DynamicImage::ImageRgba8(img.clone()).to_rgb8();
            JpegEncoder::new_with_quality(&mut cursor, jpeg_quality)
                .encode_image(&rgb)
                .map_err(EditorError::Encode)?;
        }
        OutputFormat::Png => {
            img.write_to(&mut cursor, ImageFormat::Png)
                .map_err(EditorError::Encode)?;
        }
        OutputFormat::Gif => {
            img.write_to(&mut cursor, ImageFormat::Gif)
                .map_err(EditorError::Encode)?;
        }
    }

    Ok(Bytes::from(buffer))
}

/// Encoded image ready to be sent over HTTP.
#[derive(Debug, Clone)]
pub struct StreamedImage {
    pub body: Bytes,
    pub format: OutputFormat,
    pub filename: String,
    pub last_modified: DateTime<Utc>,
}

impl StreamedImage {
    /// Response headers for the stream: content type, inline disposition
    /// with the resolved filename, and last-modified.
    pub fn headers(&self) -> HeaderMap {
        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static(self.format.mime()));
        if let Ok(value) =
            HeaderValue::from_str(&format!("inline; filename=\"{}\"", self.filename))
        {
            headers.insert(CONTENT_DISPOSITION, value);
        }
        let http_date = self
            .last_modified
            .format("%a, %d %b %Y %H:%M:%S GMT")
            .to_string();
        if let Ok(value) = HeaderValue::from_str(&http_date) {
            headers.insert(LAST_MODIFIED, value);
        }
        headers
    }
}
