//! Frame record data structures

use std::fs;
use std::io;
use std::path::{Path, PathBuf};

/// Smallest delay a frame may carry, in milliseconds
pub const MIN_DELAY_MS: u32 = 10;

/// Delay given to frames created without an explicit timing
pub const DEFAULT_DELAY_MS: u32 = 66;

/// Clamps a signed delay value to the `[MIN_DELAY_MS, u32::MAX]` range
pub fn clamp_delay(value: i64) -> u32 {
    value.clamp(i64::from(MIN_DELAY_MS), i64::from(u32::MAX)) as u32
}

/// Generates a fresh, collision-free file location inside `dir`
pub fn fresh_location(dir: &Path, extension: &str) -> PathBuf {
    dir.join(format!("{}.{}", uuid::Uuid::new_v4().simple(), extension))
}

/// Pointer glyph and click highlight recorded alongside a captured frame.
///
/// Merged into the frame image once during the initial load, after which the
/// owning record drops it for good.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CursorOverlay {
    /// Image file holding the pointer glyph
    pub glyph_location: PathBuf,
    /// X position of the glyph's top-left corner in frame pixels
    pub x: i32,
    /// Y position of the glyph's top-left corner in frame pixels
    pub y: i32,
    /// Whether a mouse button was down while the frame was captured
    pub clicked: bool,
}

/// A single animation frame backed by an image file on disk
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FrameRecord {
    /// Location of the single-frame raster file owned by this record
    pub image_location: PathBuf,
    delay_ms: u32,
    /// Pending cursor overlay, cleared after the initial load
    pub cursor_overlay: Option<CursorOverlay>,
}

impl FrameRecord {
    /// Creates a new frame record, clamping the delay to the minimum
    pub fn new(image_location: impl Into<PathBuf>, delay_ms: u32) -> Self {
        Self {
            image_location: image_location.into(),
            delay_ms: delay_ms.max(MIN_DELAY_MS),
            cursor_overlay: None,
        }
    }

    /// Attaches a cursor overlay to be merged on load
    pub fn with_cursor(mut self, overlay: CursorOverlay) -> Self {
        self.cursor_overlay = Some(overlay);
        self
    }

    /// Returns the frame delay in milliseconds
    pub fn delay_ms(&self) -> u32 {
        self.delay_ms
    }

    /// Sets the delay, clamped to the minimum. Returns the stored value.
    pub fn set_delay(&mut self, delay_ms: u32) -> u32 {
        self.delay_ms = delay_ms.max(MIN_DELAY_MS);
        self.delay_ms
    }

    /// Adds a signed delta to the delay, clamped to the minimum. Returns the stored value.
    pub fn adjust_delay(&mut self, delta_ms: i64) -> u32 {
        self.delay_ms = clamp_delay(i64::from(self.delay_ms) + delta_ms);
        self.delay_ms
    }

    /// Returns the file extension of the backing image, defaulting to `png`
    pub fn extension(&self) -> &str {
        self.image_location
            .extension()
            .and_then(|ext| ext.to_str())
            .unwrap_or("png")
    }

    /// Copies the backing file into `dir` under a fresh name and returns the new record
    pub fn copy_to(&self, dir: &Path) -> io::Result<FrameRecord> {
        let destination = fresh_location(dir, self.extension());
        fs::copy(&self.image_location, &destination)?;

        Ok(FrameRecord {
            image_location: destination,
            delay_ms: self.delay_ms,
            cursor_overlay: self.cursor_overlay.clone(),
        })
    }

    /// Deletes the backing file. A file that is already gone is not an error.
    pub fn delete(self) -> io::Result<()> {
        match fs::remove_file(&self.image_location) {
            Err(e) if e.kind() != io::ErrorKind::NotFound => Err(e),
            _ => Ok(()),
        }
    }
}
