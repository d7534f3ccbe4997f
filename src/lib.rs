//! Fluent, fail-soft image editing on top of the `image` and `imageproc`
//! stacks.
//!
//! [`ImageEditor`] keeps three buffers: the committed main image, a
//! working copy that transformations build up, and an optional watermark
//! overlay. Operations chain with `&mut self` and never panic; a failing
//! step records its message in the error log and the rest of the chain
//! keeps running against the last good state.
//!
//! ```no_run
//! use imagechain::ImageEditor;
//!
//! let mut editor = ImageEditor::new();
//! editor
//!     .load("photo.jpg")
//!     .resize(800, 600, false)
//!     .border(4, "#000")
//!     .save("thumb.jpg", true);
//! if editor.has_errors() {
//!     eprintln!("{}", editor.display_errors("", "\n"));
//! }
//! ```

pub mod color;
pub mod compositor;
pub mod config;
pub mod editor;
pub mod error;
pub mod filters;
pub mod geometry;
pub mod output;
pub mod watermark;

pub use color::ColorSpec;
pub use config::EditorConfig;
pub use editor::{ImageEditor, Placement};
pub use error::{ChainFailed, EditorError};
pub use filters::Filter;
pub use output::{OutputFormat, StreamedImage};
pub use watermark::{Watermark, WatermarkMode};
