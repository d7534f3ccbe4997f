//! The fluent editing chain.
//!
//! `ImageEditor` owns up to three buffers: `main` (the last committed
//! state), `working` (the scratch canvas the current chain accumulates
//! into) and an optional watermark overlay. Every operation reads from
//! `main` or the materialized `working` buffer, writes into `working`,
//! refreshes the `(new_width, new_height)` pair and hands the same
//! handle back. Failures never abort the chain: they append to the
//! error log and the operation becomes a no-op.

use std::fs;
use std::io::Cursor;
use std::path::{Path, PathBuf};

use ab_glyph::FontVec;
use bytes::Bytes;
use chrono::Utc;
use image::{imageops, ImageReader, RgbaImage};

use crate::color::{self, ColorSpec};
use crate::compositor;
use crate::config::EditorConfig;
use crate::error::{ChainFailed, EditorError};
use crate::filters::{self, Filter};
use crate::geometry;
use crate::output::{self, OutputFormat, StreamedImage};
use crate::watermark::{Watermark, WatermarkMode};

/// Overlay placement: a keypad grid cell with an edge inset, or literal
/// coordinates.
///
/// The keypad maps 1-9 onto a 3x3 grid the way a numeric pad lays them
/// out: 7/8/9 across the top, 4/5/6 through the middle, 1/2/3 along the
/// bottom.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Placement {
    Keypad(u8),
    Absolute(i64, i64),
}

/// Fluent image editor with deferred-commit semantics.
///
/// ```no_run
/// use imagechain::ImageEditor;
///
/// let mut editor = ImageEditor::new();
/// editor
///     .load("photo.jpg")
///     .resize(640, 480, false)
///     .border(5, "#000")
///     .save("thumb.jpg", false);
/// if editor.has_errors() {
///     eprintln!("{}", editor.display_errors("", "\n"));
/// }
/// ```
#[derive(Debug, Default)]
pub struct ImageEditor {
    main: Option<RgbaImage>,
    working: Option<RgbaImage>,
    watermark: Option<Watermark>,
    filename: Option<PathBuf>,
    config: EditorConfig,
    width: u32,
    height: u32,
    new_width: u32,
    new_height: u32,
    errors: Vec<String>,
    has_errors: bool,
}

impl ImageEditor {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_config(config: EditorConfig) -> Self {
        Self {
            config,
            ..Self::default()
        }
    }

    // ---- configuration chain setters ----

    /// JPEG output quality, 1-100.
    pub fn set_jpeg_quality(&mut self, quality: u8) -> &mut Self {
        self.config.jpeg_quality = quality;
        self
    }

    /// Background colour for rotation excess, padding and shadow
    /// canvases. An unparseable colour is logged and the previous value
    /// kept.
    pub fn set_background_colour(&mut self, colour: impl Into<ColorSpec>) -> &mut Self {
        match color::parse(&colour.into()) {
            Ok(rgb) => self.config.background = rgb,
            Err(err) => self.record(err),
        }
        self
    }

    /// Allow resize to scale images up past their source size.
    pub fn allow_scale_up(&mut self, allow: bool) -> &mut Self {
        self.config.allow_upscale = allow;
        self
    }

    /// Watermark opacity, 0-100.
    pub fn set_watermark_opacity(&mut self, opacity: u8) -> &mut Self {
        self.config.watermark_opacity = opacity;
        self
    }

    /// Relax decoder limits for subsequent loads.
    pub fn ignore_jpeg_warnings(&mut self, lenient: bool) -> &mut Self {
        self.config.lenient_jpeg_decode = lenient;
        self
    }

    // ---- lifecycle ----

    /// Load a GIF/JPEG/PNG file as the new main image. Resets the error
    /// log, drops any working buffer and re-reads dimensions. The format
    /// is sniffed from content, not the extension.
    pub fn load(&mut self, path: impl AsRef<Path>) -> &mut Self {
        let path = path.as_ref();
        self.reset_for_load(Some(path.to_path_buf()));

        if !path.exists() {
            self.record(EditorError::MissingResource(path.display().to_string()));
            return self;
        }
        let bytes = match fs::read(path) {
            Ok(bytes) => bytes,
            Err(source) => {
                self.record(EditorError::Io {
                    path: path.display().to_string(),
                    source,
                });
                return self;
            }
        };
        match self.decode(&bytes, &path.display().to_string()) {
            Ok(img) => self.install_main(img),
            Err(err) => self.record(err),
        }
        self
    }

    /// Load a main image from an in-memory encoded byte slice.
    pub fn load_bytes(&mut self, bytes: &[u8]) -> &mut Self {
        self.reset_for_load(None);
        match self.decode(bytes, "<memory>") {
            Ok(img) => self.install_main(img),
            Err(err) => self.record(err),
        }
        self
    }

    /// Promote the working buffer to main, committing the chain's edits
    /// so far. The next operation starts from the edited result.
    pub fn commit(&mut self) -> &mut Self {
        if !self.check_main() {
            return self;
        }
        match self.working.take() {
            Some(working) => {
                tracing::debug!(
                    width = working.width(),
                    height = working.height(),
                    "promoting working buffer to main"
                );
                self.width = working.width();
                self.height = working.height();
                self.main = Some(working);
                self.set_new_size();
            }
            None => self.record(EditorError::NoWorkingImage),
        }
        self
    }

    /// Release all buffers.
    pub fn clear(&mut self) -> &mut Self {
        self.main = None;
        self.working = None;
        self.watermark = None;
        self.filename = None;
        self.width = 0;
        self.height = 0;
        self.new_width = 0;
        self.new_height = 0;
        self
    }

    /// Discard uncommitted edits, reverting the chain to `main`.
    pub fn clear_working(&mut self) -> &mut Self {
        self.working = None;
        self.set_new_size();
        self
    }

    // ---- geometry operations (read main, rebuild working) ----

    /// Proportional fit inside `(mw, mh)`. With `pad` the output canvas
    /// is exactly `(mw, mh)`, background-filled, image centered;
    /// otherwise the canvas shrinks to the fitted size. Sources already
    /// inside the bounds are left alone unless upscaling is allowed.
    pub fn resize(&mut self, mw: u32, mh: u32, pad: bool) -> &mut Self {
        if !self.check_main() {
            return self;
        }
        let (tnw, tnh) =
            geometry::fit_within(self.width, self.height, mw, mh, self.config.allow_upscale);
        tracing::debug!(mw, mh, pad, tnw, tnh, "resize");

        let Some(main) = self.main.as_ref() else {
            return self;
        };
        let full = geometry::CoverSlice {
            x: 0,
            y: 0,
            width: self.width,
            height: self.height,
        };
        let result = if pad {
            compositor::allocate(mw, mh, color::opaque(self.config.background)).and_then(
                |mut canvas| {
                    let scaled = compositor::resample(main, full, tnw, tnh)?;
                    let px = geometry::pad_offset(mw, tnw) as i64;
                    let py = geometry::pad_offset(mh, tnh) as i64;
                    imageops::overlay(&mut canvas, &scaled, px, py);
                    Ok(canvas)
                },
            )
        } else {
            compositor::resample(main, full, tnw, tnh)
        };
        self.install_working(result)
    }

    /// Proportional resize plus centered crop so the result fills
    /// `(mw, mh)` exactly.
    pub fn resize_crop(&mut self, mw: u32, mh: u32) -> &mut Self {
        if !self.check_main() {
            return self;
        }
        let slice = geometry::cover_slice(self.width, self.height, mw, mh);
        tracing::debug!(mw, mh, ?slice, "resize_crop");
        let Some(main) = self.main.as_ref() else {
            return self;
        };
        let result = compositor::resample(main, slice, mw, mh);
        self.install_working(result)
    }

    /// Resample to `(mw, mh)` without preserving aspect ratio.
    pub fn stretch(&mut self, mw: u32, mh: u32) -> &mut Self {
        if !self.check_main() {
            return self;
        }
        let full = geometry::CoverSlice {
            x: 0,
            y: 0,
            width: self.width,
            height: self.height,
        };
        let Some(main) = self.main.as_ref() else {
            return self;
        };
        let result = compositor::resample(main, full, mw, mh);
        self.install_working(result)
    }

    /// Crop `main` to the rectangle `(x1, y1)-(x2, y2)`. Out-of-bounds
    /// rectangles are rejected without touching the working buffer.
    pub fn crop(&mut self, x1: i64, y1: i64, x2: i64, y2: i64) -> &mut Self {
        if !self.check_main() {
            return self;
        }
        let (x, y, w, h) = match geometry::validate_crop(x1, y1, x2, y2, self.width, self.height) {
            Ok(rect) => rect,
            Err(err) => {
                self.record(err);
                return self;
            }
        };
        if w == 0 || h == 0 {
            self.record(EditorError::Allocation {
                width: w,
                height: h,
            });
            return self;
        }
        let Some(main) = self.main.as_ref() else {
            return self;
        };
        let cropped = compositor::direct_copy(main, x, y, w, h);
        self.install_working(Ok(cropped))
    }

    // ---- compositing operations (materialize working, mutate) ----

    /// Rotate the working image counter-clockwise by `angle` degrees.
    /// The canvas grows to the rotated bounding box; excess is fully
    /// transparent.
    pub fn rotate(&mut self, angle: f32) -> &mut Self {
        if !self.check_main() {
            return self;
        }
        self.materialize_working();
        tracing::debug!(angle, "rotate");
        if let Some(working) = self.working.take() {
            self.working = Some(compositor::rotate_canvas(
                &working,
                angle,
                compositor::TRANSPARENT,
            ));
        }
        self.set_new_size();
        self
    }

    /// Draw a solid border `width` pixels thick around the working image.
    pub fn border(&mut self, width: u32, colour: impl Into<ColorSpec>) -> &mut Self {
        if !self.check_main() {
            return self;
        }
        let rgb = match color::parse(&colour.into()) {
            Ok(rgb) => rgb,
            Err(err) => {
                self.record(err);
                return self;
            }
        };
        self.materialize_working();
        if let Some(working) = self.working.as_mut() {
            compositor::draw_border(working, width, color::opaque(rgb));
        }
        self
    }

    /// Overlay a two-tone black/white bevel border at `opacity` percent.
    /// `rot` 0-3 rotates which sides take which tone; out-of-range codes
    /// quietly use the default pairing.
    pub fn border_3d(&mut self, width: u32, rot: u8, opacity: u8) -> &mut Self {
        if !self.check_main() {
            return self;
        }
        self.materialize_working();
        if let Some(working) = self.working.as_mut() {
            let overlay = compositor::bevel_overlay(working.width(), working.height(), width, rot);
            compositor::merge(working, &overlay, 0, 0, opacity.min(100));
        }
        self
    }

    /// Grow the canvas by `size` pixels and paint a drop shadow toward
    /// the keypad `direction`; the image shifts to the complementary
    /// corner. Invalid directions log and fall back to bottom-right.
    pub fn shadow(&mut self, size: u32, direction: u8, colour: impl Into<ColorSpec>) -> &mut Self {
        if !self.check_main() {
            return self;
        }
        let shadow_rgb = match color::parse(&colour.into()) {
            Ok(rgb) => rgb,
            Err(err) => {
                self.record(err);
                return self;
            }
        };
        self.materialize_working();

        let (sh_x, pic_x, x_valid) = geometry::shadow_x(direction, size);
        let (sh_y, pic_y, y_valid) = geometry::shadow_y(direction, size);
        if !x_valid {
            self.record(EditorError::InvalidPosition(direction));
        }
        if !y_valid {
            self.record(EditorError::InvalidPosition(direction));
        }

        let Some(current) = self.working.take() else {
            return self;
        };
        let (sx, sy) = current.dimensions();
        let mut canvas = match compositor::allocate(
            sx + size,
            sy + size,
            color::opaque(self.config.background),
        ) {
            Ok(canvas) => canvas,
            Err(err) => {
                self.working = Some(current);
                self.record(err);
                return self;
            }
        };
        compositor::fill_rect(
            &mut canvas,
            sh_x as i64,
            sh_y as i64,
            sx,
            sy,
            color::opaque(shadow_rgb),
        );
        imageops::replace(&mut canvas, &current, pic_x as i64, pic_y as i64);
        self.working = Some(canvas);
        self.set_new_size();
        self
    }

    /// Round the selected corners `(top-left, top-right, bottom-right,
    /// bottom-left)` with a quarter-circle stencil of the background
    /// colour; `invert` rounds outwards instead.
    pub fn round(&mut self, radius: u32, invert: bool, corners: [bool; 4]) -> &mut Self {
        if !self.check_main() {
            return self;
        }
        if radius == 0 {
            self.record(EditorError::Allocation {
                width: 0,
                height: 0,
            });
            return self;
        }
        self.materialize_working();
        if let Some(working) = self.working.as_mut() {
            let (w, h) = working.dimensions();
            let bg = color::opaque(self.config.background);
            let mut stencil = compositor::corner_stencil(radius, bg, invert);
            let r = radius as i64;
            let anchors = [
                (0, 0),
                (w as i64 - r, 0),
                (w as i64 - r, h as i64 - r),
                (0, h as i64 - r),
            ];
            for (selected, (x, y)) in corners.into_iter().zip(anchors) {
                if selected {
                    compositor::merge(working, &stencil, x, y, 100);
                }
                stencil = imageops::rotate90(&stencil);
            }
        }
        self
    }

    /// Run a named pixel filter over the working image.
    pub fn filter(&mut self, filter: Filter) -> &mut Self {
        if !self.check_main() {
            return self;
        }
        self.materialize_working();
        tracing::debug!(filter = filter.name(), "filter");
        if let Some(working) = self.working.take() {
            match filters::apply(&working, &filter) {
                Ok(filtered) => self.working = Some(filtered),
                Err(err) => {
                    self.working = Some(working);
                    self.record(err);
                }
            }
        }
        self
    }

    // ---- watermarks ----

    /// Load a watermark overlay from a file. Supplying
    /// `transparent_at` samples that pixel as a colour key.
    pub fn load_watermark(
        &mut self,
        path: impl AsRef<Path>,
        transparent_at: Option<(u32, u32)>,
    ) -> &mut Self {
        let path = path.as_ref();
        if !path.exists() {
            self.record(EditorError::MissingResource(path.display().to_string()));
            return self;
        }
        match fs::read(path) {
            Ok(bytes) => {
                let name = path.display().to_string();
                self.install_watermark(&bytes, &name, transparent_at);
            }
            Err(source) => self.record(EditorError::Io {
                path: path.display().to_string(),
                source,
            }),
        }
        self
    }

    /// Load a watermark overlay from an encoded byte slice.
    pub fn load_watermark_bytes(
        &mut self,
        bytes: &[u8],
        transparent_at: Option<(u32, u32)>,
    ) -> &mut Self {
        self.install_watermark(bytes, "<memory>", transparent_at);
        self
    }

    /// Render text with a TTF font file into a watermark overlay.
    ///
    /// Known limitation: the bounding box is measured before rotation,
    /// so non-zero angles crop the glyph corners.
    pub fn make_watermark_text(
        &mut self,
        text: &str,
        font_path: impl AsRef<Path>,
        size: f32,
        colour: impl Into<ColorSpec>,
        angle: f32,
    ) -> &mut Self {
        let font_path = font_path.as_ref();
        if !font_path.exists() {
            self.record(EditorError::MissingResource(font_path.display().to_string()));
            return self;
        }
        let bytes = match fs::read(font_path) {
            Ok(bytes) => bytes,
            Err(source) => {
                self.record(EditorError::Io {
                    path: font_path.display().to_string(),
                    source,
                });
                return self;
            }
        };
        let font = match FontVec::try_from_vec(bytes) {
            Ok(font) => font,
            Err(_) => {
                self.record(EditorError::InvalidFont(font_path.display().to_string()));
                return self;
            }
        };
        let rgb = match color::parse(&colour.into()) {
            Ok(rgb) => rgb,
            Err(err) => {
                self.record(err);
                return self;
            }
        };
        match Watermark::from_text(text, &font, size, rgb, angle) {
            Ok(wm) => self.watermark = Some(wm),
            Err(err) => self.record(err),
        }
        self
    }

    /// Composite the loaded/rendered watermark onto the working image.
    /// `offset` insets keypad placements from the edges; center cells
    /// ignore it.
    pub fn watermark(&mut self, placement: Placement, offset: u32) -> &mut Self {
        if !self.check_main() {
            return self;
        }
        let Some((wm_w, wm_h)) = self.watermark.as_ref().map(Watermark::dimensions) else {
            self.record(EditorError::NoWatermark);
            return self;
        };
        self.materialize_working();
        let Some((tw, th)) = self.working.as_ref().map(|w| w.dimensions()) else {
            return self;
        };
        if wm_w > tw || wm_h > th {
            self.record(EditorError::WatermarkTooLarge {
                wm_w,
                wm_h,
                img_w: tw,
                img_h: th,
            });
            return self;
        }

        let (x, y) = match placement {
            Placement::Absolute(x, y) => (x, y),
            Placement::Keypad(code) => {
                let (x, x_valid) = geometry::anchor_x(code, tw, wm_w, offset);
                let (y, y_valid) = geometry::anchor_y(code, th, wm_h, offset);
                if !x_valid {
                    self.record(EditorError::InvalidPosition(code));
                }
                if !y_valid {
                    self.record(EditorError::InvalidPosition(code));
                }
                (x, y)
            }
        };

        let opacity = self.config.clamped_watermark_opacity();
        tracing::debug!(x, y, opacity, "watermark");
        if let (Some(wm), Some(working)) = (self.watermark.as_ref(), self.working.as_mut()) {
            match wm.mode {
                WatermarkMode::AlphaMerge => {
                    compositor::merge(working, &wm.image, x, y, opacity);
                }
                WatermarkMode::ColorKey(key) => {
                    let mut overlay = wm.image.clone();
                    compositor::color_key_to_alpha(&mut overlay, key);
                    compositor::merge(working, &overlay, x, y, 100 - opacity);
                }
            }
        }
        self
    }

    // ---- output ----

    /// Encode the current state to `path`, format chosen by extension
    /// (gif/jpg/jpeg/png). Refuses to overwrite an existing file unless
    /// told to.
    pub fn save(&mut self, path: impl AsRef<Path>, overwrite: bool) -> &mut Self {
        let path = path.as_ref();
        if !self.check_main() {
            return self;
        }
        self.materialize_working();
        if !overwrite && path.exists() {
            self.record(EditorError::FileExists(path.display().to_string()));
            return self;
        }
        let format = match OutputFormat::from_path(path) {
            Ok(format) => format,
            Err(err) => {
                self.record(err);
                return self;
            }
        };
        let bytes = match self.encode_working(format) {
            Ok(bytes) => bytes,
            Err(err) => {
                self.record(err);
                return self;
            }
        };
        tracing::debug!(path = %path.display(), ?format, len = bytes.len(), "save");
        if let Err(source) = fs::write(path, &bytes) {
            self.record(EditorError::Io {
                path: path.display().to_string(),
                source,
            });
        }
        self
    }

    /// Save next to the originally loaded file with filename affixes:
    /// loading `photo.jpg` and calling `save_pa("pre_", "_app", false)`
    /// writes `pre_photo_app.jpg`.
    pub fn save_pa(&mut self, prepend: &str, append: &str, overwrite: bool) -> &mut Self {
        if !self.check_main() {
            return self;
        }
        let Some(filename) = self.filename.clone() else {
            self.record(EditorError::NoFilename);
            return self;
        };
        let stem = filename
            .file_stem()
            .and_then(|s| s.to_str())
            .unwrap_or_default();
        let ext = filename
            .extension()
            .and_then(|s| s.to_str())
            .unwrap_or_default();
        let target = filename
            .parent()
            .unwrap_or_else(|| Path::new(""))
            .join(format!("{prepend}{stem}{append}.{ext}"));
        self.save(target, overwrite)
    }

    /// Encode the current state to bytes, format chosen by the filename
    /// extension (defaults to JPEG when empty). Chain breaker: returns
    /// the bytes, or None with the failure logged.
    pub fn data_stream(&mut self, filename: &str) -> Option<Bytes> {
        if !self.check_main() {
            return None;
        }
        self.materialize_working();
        let name = if filename.is_empty() {
            "image.jpg"
        } else {
            filename
        };
        let format = match OutputFormat::from_path(Path::new(name)) {
            Ok(format) => format,
            Err(err) => {
                self.record(err);
                return None;
            }
        };
        match self.encode_working(format) {
            Ok(bytes) => Some(bytes),
            Err(err) => {
                self.record(err);
                None
            }
        }
    }

    /// Encode for HTTP streaming: bytes plus content-type,
    /// content-disposition and last-modified headers.
    pub fn stream(&mut self, filename: &str) -> Option<StreamedImage> {
        let body = self.data_stream(filename)?;
        let name = if filename.is_empty() {
            "image.jpg"
        } else {
            filename
        };
        // data_stream already validated the extension
        let format = OutputFormat::from_path(Path::new(name)).ok()?;
        Some(StreamedImage {
            body,
            format,
            filename: name.to_string(),
            last_modified: Utc::now(),
        })
    }

    /// Human-readable size of the originally loaded file, or `"-"` with
    /// the failure logged.
    pub fn real_filesize(&mut self) -> String {
        let Some(filename) = self.filename.clone() else {
            self.record(EditorError::NoFilename);
            return "-".to_string();
        };
        let len = match fs::metadata(&filename) {
            Ok(meta) => meta.len(),
            Err(source) => {
                self.record(EditorError::Io {
                    path: filename.display().to_string(),
                    source,
                });
                return "-".to_string();
            }
        };
        let units = [" B", " KB", " MB", " GB", " TB"];
        let mut size = len as f64;
        let mut unit = 0;
        while size >= 1024.0 && unit < units.len() - 1 {
            size /= 1024.0;
            unit += 1;
        }
        format!("{}{}", (size * 100.0).round() / 100.0, units[unit])
    }

    // ---- introspection ----

    /// Main image width (the last committed state).
    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Working image width after the chain's edits so far.
    pub fn new_width(&self) -> u32 {
        self.new_width
    }

    pub fn new_height(&self) -> u32 {
        self.new_height
    }

    pub fn config(&self) -> &EditorConfig {
        &self.config
    }

    pub fn has_errors(&self) -> bool {
        self.has_errors
    }

    /// Accumulated error messages, oldest first.
    pub fn errors(&self) -> &[String] {
        &self.errors
    }

    /// Render the error log with the given wrappers around each entry.
    pub fn display_errors(&self, open: &str, close: &str) -> String {
        self.errors
            .iter()
            .map(|msg| format!("{open}{msg}{close}"))
            .collect()
    }

    /// Fail-fast view of the chain: `Ok(())` when clean, otherwise every
    /// accumulated message.
    pub fn finish(&self) -> Result<(), ChainFailed> {
        if self.has_errors {
            Err(ChainFailed {
                messages: self.errors.clone(),
            })
        } else {
            Ok(())
        }
    }

    // ---- internals ----

    fn record(&mut self, err: EditorError) {
        tracing::warn!(error = %err, "operation skipped");
        self.has_errors = true;
        self.errors.push(err.to_string());
    }

    fn check_main(&mut self) -> bool {
        if self.main.is_some() {
            true
        } else {
            self.record(EditorError::NoMainImage);
            false
        }
    }

    /// Copy-on-first-write: the first mutating operation after a load or
    /// commit clones `main` into `working`.
    fn materialize_working(&mut self) {
        if self.working.is_none() {
            if let Some(main) = self.main.as_ref() {
                self.working = Some(main.clone());
                self.set_new_size();
            }
        }
    }

    fn set_new_size(&mut self) {
        match (&self.main, &self.working) {
            (Some(_), Some(working)) => {
                self.new_width = working.width();
                self.new_height = working.height();
            }
            (Some(_), None) => {
                self.new_width = self.width;
                self.new_height = self.height;
            }
            (None, _) => {
                self.new_width = 0;
                self.new_height = 0;
            }
        }
    }

    fn reset_for_load(&mut self, filename: Option<PathBuf>) {
        self.errors.clear();
        self.has_errors = false;
        self.working = None;
        self.main = None;
        self.filename = filename;
        self.width = 0;
        self.height = 0;
        self.new_width = 0;
        self.new_height = 0;
    }

    fn install_main(&mut self, img: RgbaImage) {
        self.width = img.width();
        self.height = img.height();
        self.main = Some(img);
        self.set_new_size();
    }

    /// Replace the working buffer with an operation result, or log the
    /// failure and keep the previous state.
    fn install_working(&mut self, result: Result<RgbaImage, EditorError>) -> &mut Self {
        match result {
            Ok(img) => {
                self.working = Some(img);
                self.set_new_size();
            }
            Err(err) => self.record(err),
        }
        self
    }

    fn decode(&self, bytes: &[u8], name: &str) -> Result<RgbaImage, EditorError> {
        let mut reader = ImageReader::new(Cursor::new(bytes))
            .with_guessed_format()
            .map_err(|source| EditorError::Io {
                path: name.to_string(),
                source,
            })?;
        if self.config.lenient_jpeg_decode {
            reader.no_limits();
        }
        let img = reader.decode().map_err(|source| EditorError::Decode {
            name: name.to_string(),
            source,
        })?;
        Ok(img.to_rgba8())
    }

    fn install_watermark(&mut self, bytes: &[u8], name: &str, transparent_at: Option<(u32, u32)>) {
        let decoded = match self.decode(bytes, name) {
            Ok(img) => img,
            Err(err) => {
                self.record(err);
                return;
            }
        };
        match Watermark::from_image(decoded, transparent_at) {
            Ok(wm) => self.watermark = Some(wm),
            Err(err) => self.record(err),
        }
    }

    fn encode_working(&self, format: OutputFormat) -> Result<Bytes, EditorError> {
        let img = self
            .working
            .as_ref()
            .or(self.main.as_ref())
            .ok_or(EditorError::NoMainImage)?;
        output::encode(img, format, self.config.clamped_jpeg_quality())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use image::{ImageFormat, Rgba};

    fn png_bytes(width: u32, height: u32, rgba: [u8; 4]) -> Vec<u8> {
        let img = RgbaImage::from_pixel(width, height, Rgba(rgba));
        let mut buffer = Vec::new();
        img.write_to(&mut Cursor::new(&mut buffer), ImageFormat::Png)
            .unwrap();
        buffer
    }

    fn loaded(width: u32, height: u32) -> ImageEditor {
        let mut editor = ImageEditor::new();
        editor.load_bytes(&png_bytes(width, height, [255, 0, 0, 255]));
        assert!(!editor.has_errors(), "{:?}", editor.errors());
        editor
    }

    #[test]
    fn test_operations_without_main_log_and_pass_through() {
        let mut editor = ImageEditor::new();
        editor.resize(10, 10, false).crop(0, 0, 5, 5).rotate(90.0);
        assert!(editor.has_errors());
        assert_eq!(editor.errors().len(), 3);
        assert_eq!(editor.errors()[0], "No main image loaded!");
    }

    #[test]
    fn test_load_bytes_sets_dimensions() {
        let editor = loaded(100, 50);
        assert_eq!(editor.width(), 100);
        assert_eq!(editor.height(), 50);
        assert_eq!(editor.new_width(), 100);
        assert_eq!(editor.new_height(), 50);
    }

    #[test]
    fn test_load_clears_previous_errors() {
        let mut editor = ImageEditor::new();
        editor.resize(10, 10, false);
        assert!(editor.has_errors());
        editor.load_bytes(&png_bytes(4, 4, [1, 2, 3, 255]));
        assert!(!editor.has_errors());
        assert!(editor.errors().is_empty());
    }

    #[test]
    fn test_copy_on_first_write() {
        let mut editor = loaded(10, 10);
        editor.rotate(180.0);
        assert_eq!(editor.new_width(), 10);
        assert_eq!(editor.new_height(), 10);
        // main untouched
        assert_eq!(editor.width(), 10);
    }

    #[test]
    fn test_resize_tracks_new_size() {
        let mut editor = loaded(100, 50);
        editor.resize(50, 50, false);
        assert_eq!((editor.new_width(), editor.new_height()), (50, 25));
        assert_eq!((editor.width(), editor.height()), (100, 50));
    }

    #[test]
    fn test_resize_no_upscale_is_noop_size() {
        let mut editor = loaded(40, 20);
        editor.resize(100, 100, false);
        assert_eq!((editor.new_width(), editor.new_height()), (40, 20));
    }

    #[test]
    fn test_resize_crop_exact_bounds() {
        let mut editor = loaded(123, 77);
        editor.resize_crop(50, 50);
        assert_eq!((editor.new_width(), editor.new_height()), (50, 50));
    }

    #[test]
    fn test_stretch_ignores_aspect() {
        let mut editor = loaded(100, 50);
        editor.stretch(30, 60);
        assert_eq!((editor.new_width(), editor.new_height()), (30, 60));
    }

    #[test]
    fn test_crop_updates_size() {
        let mut editor = loaded(100, 100);
        editor.crop(10, 10, 60, 40);
        assert_eq!((editor.new_width(), editor.new_height()), (50, 30));
    }

    #[test]
    fn test_invalid_crop_leaves_working_untouched() {
        let mut editor = loaded(100, 100);
        editor.resize(50, 50, false);
        let before = (editor.new_width(), editor.new_height());
        editor.crop(-1, 0, 10, 10);
        assert!(editor.has_errors());
        assert_eq!((editor.new_width(), editor.new_height()), before);
    }

    #[test]
    fn test_commit_promotes_working() {
        let mut editor = loaded(100, 100);
        editor.crop(0, 0, 60, 40).commit();
        assert_eq!((editor.width(), editor.height()), (60, 40));
        assert_eq!((editor.new_width(), editor.new_height()), (60, 40));
        // next op starts from the committed state
        editor.resize(30, 30, false);
        assert_eq!((editor.new_width(), editor.new_height()), (30, 20));
    }

    #[test]
    fn test_commit_without_edits_logs() {
        let mut editor = loaded(10, 10);
        editor.commit();
        assert_eq!(editor.errors(), ["No working image created!"]);
    }

    #[test]
    fn test_clear_working_reverts() {
        let mut editor = loaded(100, 100);
        editor.crop(0, 0, 10, 10);
        assert_eq!(editor.new_width(), 10);
        editor.clear_working();
        assert_eq!(editor.new_width(), 100);
    }

    #[test]
    fn test_rotate_90_swaps_dimensions() {
        let mut editor = loaded(40, 20);
        editor.rotate(90.0);
        assert_eq!((editor.new_width(), editor.new_height()), (20, 40));
    }

    #[test]
    fn test_rotate_arbitrary_angle_leaves_excess_transparent() {
        let mut editor = loaded(20, 20);
        editor.rotate(45.0);
        assert!(!editor.has_errors(), "{:?}", editor.errors());

        let bytes = editor.data_stream("out.png").unwrap();
        let img = image::load_from_memory(&bytes).unwrap().to_rgba8();
        let (w, h) = img.dimensions();
        assert!(w > 20 && h > 20);
        // grown corners are outside the rotated content
        assert_eq!(img.get_pixel(0, 0)[3], 0);
        assert_eq!(img.get_pixel(w - 1, h - 1)[3], 0);
        // rotated content itself is intact
        assert_eq!(*img.get_pixel(w / 2, h / 2), Rgba([255, 0, 0, 255]));
    }

    #[test]
    fn test_round_all_corners_take_background() {
        let mut editor = loaded(20, 20);
        editor.round(5, false, [true; 4]);
        assert!(!editor.has_errors(), "{:?}", editor.errors());

        let bytes = editor.data_stream("out.png").unwrap();
        let img = image::load_from_memory(&bytes).unwrap().to_rgba8();
        let white = Rgba([255, 255, 255, 255]);
        assert_eq!(*img.get_pixel(0, 0), white);
        assert_eq!(*img.get_pixel(19, 0), white);
        assert_eq!(*img.get_pixel(19, 19), white);
        assert_eq!(*img.get_pixel(0, 19), white);
        // inside the quarter-circle cutouts and the interior stay red
        assert_eq!(*img.get_pixel(4, 4), Rgba([255, 0, 0, 255]));
        assert_eq!(*img.get_pixel(10, 10), Rgba([255, 0, 0, 255]));
    }

    #[test]
    fn test_round_selector_skips_unselected_corners() {
        let mut editor = loaded(20, 20);
        editor.round(5, false, [true, false, false, false]);
        assert!(!editor.has_errors(), "{:?}", editor.errors());

        let bytes = editor.data_stream("out.png").unwrap();
        let img = image::load_from_memory(&bytes).unwrap().to_rgba8();
        assert_eq!(*img.get_pixel(0, 0), Rgba([255, 255, 255, 255]));
        assert_eq!(*img.get_pixel(19, 0), Rgba([255, 0, 0, 255]));
        assert_eq!(*img.get_pixel(19, 19), Rgba([255, 0, 0, 255]));
        assert_eq!(*img.get_pixel(0, 19), Rgba([255, 0, 0, 255]));
    }

    #[test]
    fn test_border_3d_default_palette_edges() {
        let mut editor = loaded(10, 10);
        editor.border_3d(2, 0, 100);
        assert!(!editor.has_errors(), "{:?}", editor.errors());

        let bytes = editor.data_stream("out.png").unwrap();
        let img = image::load_from_memory(&bytes).unwrap().to_rgba8();
        // rot 0: top/left white, right/bottom black, two pixels thick
        assert_eq!(*img.get_pixel(5, 0), Rgba([255, 255, 255, 255]));
        assert_eq!(*img.get_pixel(5, 1), Rgba([255, 255, 255, 255]));
        assert_eq!(*img.get_pixel(0, 5), Rgba([255, 255, 255, 255]));
        assert_eq!(*img.get_pixel(9, 5), Rgba([0, 0, 0, 255]));
        assert_eq!(*img.get_pixel(5, 9), Rgba([0, 0, 0, 255]));
        // interior untouched
        assert_eq!(*img.get_pixel(5, 5), Rgba([255, 0, 0, 255]));
    }

    #[test]
    fn test_border_3d_rot_2_swaps_tones() {
        let mut editor = loaded(10, 10);
        editor.border_3d(1, 2, 100);
        assert!(!editor.has_errors(), "{:?}", editor.errors());

        let bytes = editor.data_stream("out.png").unwrap();
        let img = image::load_from_memory(&bytes).unwrap().to_rgba8();
        // rot 2: top/left black, right/bottom white
        assert_eq!(*img.get_pixel(5, 0), Rgba([0, 0, 0, 255]));
        assert_eq!(*img.get_pixel(0, 5), Rgba([0, 0, 0, 255]));
        assert_eq!(*img.get_pixel(9, 5), Rgba([255, 255, 255, 255]));
        assert_eq!(*img.get_pixel(5, 9), Rgba([255, 255, 255, 255]));
    }

    #[test]
    fn test_border_3d_invalid_rot_is_silent() {
        let mut editor = loaded(10, 10);
        editor.border_3d(1, 9, 100);
        assert!(!editor.has_errors(), "{:?}", editor.errors());
    }

    #[test]
    fn test_shadow_grows_canvas() {
        let mut editor = loaded(20, 20);
        editor.shadow(4, 3, "#444");
        assert!(!editor.has_errors(), "{:?}", editor.errors());
        assert_eq!((editor.new_width(), editor.new_height()), (24, 24));
    }

    #[test]
    fn test_shadow_invalid_direction_logs_per_axis() {
        let mut editor = loaded(20, 20);
        editor.shadow(4, 0, "#444");
        assert_eq!(editor.errors().len(), 2);
        // still applied with the default offsets
        assert_eq!((editor.new_width(), editor.new_height()), (24, 24));
    }

    #[test]
    fn test_watermark_requires_overlay() {
        let mut editor = loaded(20, 20);
        editor.watermark(Placement::Keypad(5), 0);
        assert_eq!(editor.errors(), ["No watermark loaded or created"]);
    }

    #[test]
    fn test_watermark_too_large_is_skipped() {
        let mut editor = loaded(10, 10);
        editor.load_watermark_bytes(&png_bytes(20, 20, [0, 0, 0, 255]), None);
        editor.watermark(Placement::Keypad(5), 0);
        assert!(editor.errors()[0].starts_with("Watermark is larger"));
    }

    #[test]
    fn test_watermark_bottom_right_placement() {
        let mut editor = loaded(100, 100);
        editor.set_watermark_opacity(100);
        editor.load_watermark_bytes(&png_bytes(10, 10, [0, 255, 0, 255]), None);
        editor.watermark(Placement::Keypad(3), 8);
        assert!(!editor.has_errors(), "{:?}", editor.errors());

        let bytes = editor.data_stream("out.png").unwrap();
        let img = image::load_from_memory(&bytes).unwrap().to_rgba8();
        // bottom-right corner of the overlay sits 8px from each edge
        assert_eq!(*img.get_pixel(91, 91), Rgba([0, 255, 0, 255]));
        assert_eq!(*img.get_pixel(82, 82), Rgba([0, 255, 0, 255]));
        assert_eq!(*img.get_pixel(81, 81), Rgba([255, 0, 0, 255]));
        assert_eq!(*img.get_pixel(92, 92), Rgba([255, 0, 0, 255]));
    }

    #[test]
    fn test_watermark_invalid_position_defaults_to_offset() {
        let mut editor = loaded(50, 50);
        editor.set_watermark_opacity(100);
        editor.load_watermark_bytes(&png_bytes(5, 5, [0, 0, 255, 255]), None);
        editor.watermark(Placement::Keypad(0), 3);
        assert_eq!(editor.errors().len(), 2);
        let bytes = editor.data_stream("out.png").unwrap();
        let img = image::load_from_memory(&bytes).unwrap().to_rgba8();
        assert_eq!(*img.get_pixel(3, 3), Rgba([0, 0, 255, 255]));
    }

    #[test]
    fn test_watermark_color_key_uses_inverted_opacity() {
        // key colour disappears entirely; the rest blends at 100-opacity
        let mut wm = RgbaImage::from_pixel(4, 4, Rgba([0, 255, 0, 255]));
        wm.put_pixel(0, 0, Rgba([9, 8, 7, 255]));
        let mut wm_bytes = Vec::new();
        wm.write_to(&mut Cursor::new(&mut wm_bytes), ImageFormat::Png)
            .unwrap();

        let mut editor = loaded(10, 10);
        editor.set_watermark_opacity(0);
        editor.load_watermark_bytes(&wm_bytes, Some((0, 0)));
        editor.watermark(Placement::Absolute(0, 0), 0);
        assert!(!editor.has_errors(), "{:?}", editor.errors());

        let bytes = editor.data_stream("out.png").unwrap();
        let img = image::load_from_memory(&bytes).unwrap().to_rgba8();
        // keyed pixel left the background visible
        assert_eq!(*img.get_pixel(0, 0), Rgba([255, 0, 0, 255]));
        // opacity 0 inverts to a full-strength overlay
        assert_eq!(*img.get_pixel(1, 1), Rgba([0, 255, 0, 255]));
    }

    #[test]
    fn test_filter_failure_keeps_working() {
        let mut editor = loaded(10, 10);
        editor.filter(Filter::Pixelate(0));
        assert!(editor.has_errors());
        assert_eq!((editor.new_width(), editor.new_height()), (10, 10));
    }

    #[test]
    fn test_data_stream_unknown_extension() {
        let mut editor = loaded(10, 10);
        assert!(editor.data_stream("out.bmp").is_none());
        assert_eq!(editor.errors().len(), 1);
    }

    #[test]
    fn test_data_stream_default_is_jpeg() {
        let mut editor = loaded(10, 10);
        let bytes = editor.data_stream("").unwrap();
        assert_eq!(image::guess_format(&bytes).unwrap(), ImageFormat::Jpeg);
    }

    #[test]
    fn test_stream_carries_headers() {
        let mut editor = loaded(10, 10);
        let streamed = editor.stream("photo.png").unwrap();
        assert_eq!(streamed.format, OutputFormat::Png);
        assert_eq!(streamed.filename, "photo.png");
        assert!(streamed
            .headers()
            .contains_key(http::header::CONTENT_DISPOSITION));
    }

    #[test]
    fn test_bad_colour_skips_operation() {
        let mut editor = loaded(10, 10);
        editor.border(2, "#zzz");
        assert_eq!(editor.errors().len(), 1);
        assert!(editor.errors()[0].starts_with("Colour error"));
    }

    #[test]
    fn test_set_background_colour_invalid_keeps_previous() {
        let mut editor = ImageEditor::new();
        editor.set_background_colour("#123456");
        editor.set_background_colour("nope");
        assert_eq!(editor.config().background, [0x12, 0x34, 0x56]);
        assert!(editor.has_errors());
    }

    #[test]
    fn test_finish_reports_all_messages() {
        let mut editor = ImageEditor::new();
        editor.resize(10, 10, false).crop(0, 0, 1, 1);
        let err = editor.finish().unwrap_err();
        assert_eq!(err.messages.len(), 2);
        assert!(loaded(5, 5).finish().is_ok());
    }

    #[test]
    fn test_display_errors_wraps_each_entry() {
        let mut editor = ImageEditor::new();
        editor.rotate(10.0);
        assert_eq!(
            editor.display_errors("<p>", "</p>"),
            "<p>No main image loaded!</p>"
        );
    }

    #[test]
    fn test_clear_releases_everything() {
        let mut editor = loaded(10, 10);
        editor.crop(0, 0, 5, 5).clear();
        assert_eq!(editor.width(), 0);
        assert_eq!(editor.new_width(), 0);
        editor.rotate(90.0);
        assert!(editor.has_errors());
    }

    #[test]
    fn test_decode_garbage_logs_decode_error() {
        let mut editor = ImageEditor::new();
        editor.load_bytes(&[0u8; 16]);
        assert!(editor.has_errors());
        assert!(editor.errors()[0].starts_with("Unable to decode"));
    }
}
