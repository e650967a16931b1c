//! Transformation catalog
//!
//! [`validate`] checks a request against the current sequence without touching
//! any file, so callers can reject no-op or out-of-bounds requests before they
//! stage history. [`apply`] performs the request and returns the inclusive
//! range of positions it changed.

pub mod image_ops;
pub mod import;
pub mod reorder;
pub mod timing;
pub mod transition;

use crate::progress::ProgressReporter;
use crate::request::{DelayMode, Scope, TransformationRequest};
use crate::{EngineConfig, EngineError, Result};
use flipbook_codec::ImageCodec;
use flipbook_core::{AffectedRange, FrameSequence};
use image::RgbaImage;
use std::path::Path;
use std::sync::atomic::{AtomicBool, Ordering};

/// Collaborators an operation runs with
pub struct ApplyContext<'a> {
    pub codec: &'a dyn ImageCodec,
    pub config: &'a EngineConfig,
    pub progress: &'a mut ProgressReporter,
    pub cancel: &'a AtomicBool,
}

impl ApplyContext<'_> {
    pub fn is_cancelled(&self) -> bool {
        self.cancel.load(Ordering::Relaxed)
    }
}

/// Checks a request against `sequence` before anything is staged or written
pub fn validate(
    request: &TransformationRequest,
    sequence: &FrameSequence,
    codec: &dyn ImageCodec,
) -> Result<()> {
    use TransformationRequest as R;

    if sequence.is_empty() && !matches!(request, R::Import { .. }) {
        return Err(EngineError::rejected("the sequence has no frames"));
    }

    match request {
        R::Resize {
            width,
            height,
            dpi,
            keep_aspect,
        } => {
            if *width == 0 || *height == 0 || *dpi <= 0.0 {
                return Err(EngineError::rejected("size and dpi must be positive"));
            }
            let (current_width, current_height) = frame_dimensions(sequence, codec)?;
            let target = image_ops::target_size(
                (current_width, current_height),
                (*width, *height),
                *keep_aspect,
            );
            if target == (current_width, current_height) && *dpi == sequence.dpi() {
                return Err(EngineError::rejected("the new size is equal to the current size"));
            }
        }
        R::Crop(rect) => {
            let (width, height) = frame_dimensions(sequence, codec)?;
            if rect.is_full(width, height) {
                return Err(EngineError::rejected("the crop area covers the whole frame"));
            }
            if !rect.fits(width, height) {
                return Err(EngineError::OutOfRange(format!(
                    "Crop rectangle {rect:?} ({width}x{height} frame)"
                )));
            }
        }
        R::FlipRotate { op, scope } => {
            if !op.is_rotation() {
                scoped_indices(scope, sequence)?;
            }
        }
        R::Overlay { bitmap, dpi, scope } => {
            if bitmap.width() == 0 || bitmap.height() == 0 || *dpi <= 0.0 {
                return Err(EngineError::rejected("the overlay bitmap is empty"));
            }
            scoped_indices(scope, sequence)?;
        }
        R::Cinemagraph { strokes } => {
            if strokes.iter().all(|s| s.points.is_empty()) {
                return Err(EngineError::rejected("no cinemagraph strokes were drawn"));
            }
        }
        R::TitleFrame { bitmap, at, .. } => {
            if bitmap.width() == 0 || bitmap.height() == 0 {
                return Err(EngineError::rejected("the title bitmap is empty"));
            }
            sequence.check_index(*at)?;
        }
        R::Delay { mode, scope } => {
            if *mode == DelayMode::Change(0) {
                return Err(EngineError::rejected("the delay change is zero"));
            }
            scoped_indices(scope, sequence)?;
        }
        R::Transition { anchor, count, .. } => {
            sequence.check_index(*anchor)?;
            if *count == 0 {
                return Err(EngineError::rejected("a transition needs at least one frame"));
            }
        }
        R::Reverse { scope } => {
            if scoped_indices(scope, sequence)?.len() < 2 {
                return Err(EngineError::rejected("reversing needs at least two frames"));
            }
        }
        R::Yoyo { scope } => {
            if scoped_indices(scope, sequence)?.len() < 3 {
                return Err(EngineError::rejected("yoyo needs at least three frames"));
            }
        }
        R::Move { selection, .. } => {
            sequence.normalize_selection(selection)?;
        }
        R::Delete { scope } => {
            if scoped_indices(scope, sequence)?.len() == sequence.len() {
                return Err(EngineError::rejected(
                    "deleting every frame discards the sequence",
                ));
            }
        }
        R::Import { source, at } => {
            if *at > sequence.len() {
                return Err(EngineError::OutOfRange(format!(
                    "Insert position {at} (sequence has {} frames)",
                    sequence.len()
                )));
            }
            if !source.exists() {
                return Err(EngineError::import(format!(
                    "{} does not exist",
                    source.display()
                )));
            }
        }
        R::Insert { records, at } => {
            if records.is_empty() {
                return Err(EngineError::rejected("there are no frames to insert"));
            }
            if *at > sequence.len() {
                return Err(EngineError::OutOfRange(format!(
                    "Insert position {at} (sequence has {} frames)",
                    sequence.len()
                )));
            }
        }
        R::MergeCursors => {
            if sequence.iter().all(|f| f.cursor_overlay.is_none()) {
                return Err(EngineError::rejected("no frame carries a cursor overlay"));
            }
        }
    }
    Ok(())
}

/// Performs a request, returning the range of positions it changed.
///
/// A cancelled request stops before the next frame and reports only the
/// frames it completed; cancelling before the first frame is `Cancelled`.
pub fn apply(
    request: TransformationRequest,
    sequence: &mut FrameSequence,
    ctx: &mut ApplyContext<'_>,
) -> Result<AffectedRange> {
    use TransformationRequest as R;

    tracing::info!(operation = request.label(), frames = sequence.len(), "Applying");

    match request {
        R::Resize {
            width,
            height,
            dpi,
            keep_aspect,
        } => image_ops::resize(sequence, (width, height), dpi, keep_aspect, ctx),
        R::Crop(rect) => image_ops::crop(sequence, rect, ctx),
        R::FlipRotate { op, scope } => image_ops::flip_rotate(sequence, op, &scope, ctx),
        R::Overlay { bitmap, dpi, scope } => image_ops::overlay(sequence, &bitmap, dpi, &scope, ctx),
        R::Cinemagraph { strokes } => image_ops::cinemagraph(sequence, &strokes, ctx),
        R::TitleFrame {
            bitmap,
            at,
            delay_ms,
        } => image_ops::title_frame(sequence, &bitmap, at, delay_ms, ctx),
        R::Delay { mode, scope } => timing::change_delay(sequence, mode, &scope, ctx),
        R::Transition {
            anchor,
            count,
            kind,
        } => transition::insert_transition(sequence, anchor, count, kind, ctx),
        R::Reverse { scope } => reorder::reverse(sequence, &scope),
        R::Yoyo { scope } => reorder::yoyo(sequence, &scope),
        R::Move {
            selection,
            direction,
        } => Ok(sequence.move_selection(&selection, direction)?.range),
        R::Delete { scope } => reorder::delete(sequence, &scope),
        R::Import { source, at } => import::insert_import(sequence, &source, at, ctx),
        R::Insert { records, at } => Ok(sequence.insert_range(at, records)?),
        R::MergeCursors => image_ops::merge_cursors(sequence, ctx),
    }
}

/// Resolves a scope against a sequence, validating every index
pub(crate) fn scoped_indices(scope: &Scope, sequence: &FrameSequence) -> Result<Vec<usize>> {
    match scope {
        Scope::All => Ok((0..sequence.len()).collect()),
        Scope::Selected(indices) => Ok(sequence.normalize_selection(indices)?),
    }
}

/// Pixel size of the first frame
pub(crate) fn frame_dimensions(sequence: &FrameSequence, codec: &dyn ImageCodec) -> Result<(u32, u32)> {
    let first = sequence.frame(0)?;
    Ok(codec.decode(&first.image_location)?.dimensions())
}

/// Decodes a frame, transforms it and encodes it back in place
pub(crate) fn rewrite<F>(codec: &dyn ImageCodec, path: &Path, edit: F) -> Result<()>
where
    F: FnOnce(RgbaImage) -> RgbaImage,
{
    let raster = codec.decode(path)?;
    codec.encode(&edit(raster), path)?;
    Ok(())
}

/// Runs `step` for each index in order, reporting progress and honoring cancellation.
///
/// Returns the range of indices that completed.
pub(crate) fn for_each_frame<F>(
    ctx: &mut ApplyContext<'_>,
    description: &str,
    indices: &[usize],
    mut step: F,
) -> Result<AffectedRange>
where
    F: FnMut(usize) -> Result<()>,
{
    ctx.progress.restart(description, indices.len() as u64);

    let mut completed: Option<AffectedRange> = None;
    for &index in indices {
        if ctx.is_cancelled() {
            tracing::info!(description, completed = ctx.progress.processed(), "Cancelled");
            break;
        }

        step(index)?;

        let done = AffectedRange::single(index);
        completed = Some(completed.map_or(done, |range| range.union(done)));
        ctx.progress.increment_and_report();
    }

    ctx.progress.finish();
    completed.ok_or(EngineError::Cancelled)
}

#[cfg(test)]
pub(crate) mod testing {
    //! Shared fixtures for catalog tests

    use super::*;
    use flipbook_codec::ImageCrateCodec;
    use flipbook_core::FrameRecord;
    use image::Rgba;
    use std::fs;

    pub struct Fixture {
        pub dir: tempfile::TempDir,
        pub codec: ImageCrateCodec,
        pub config: EngineConfig,
        pub progress: ProgressReporter,
        pub cancel: AtomicBool,
    }

    impl Fixture {
        pub fn new() -> Self {
            Self {
                dir: tempfile::tempdir().unwrap(),
                codec: ImageCrateCodec,
                config: EngineConfig::default(),
                progress: ProgressReporter::silent(),
                cancel: AtomicBool::new(false),
            }
        }

        pub fn ctx(&mut self) -> ApplyContext<'_> {
            ApplyContext {
                codec: &self.codec,
                config: &self.config,
                progress: &mut self.progress,
                cancel: &self.cancel,
            }
        }

        /// One solid-color PNG frame per color, all `width` x `height`
        pub fn sequence(&self, colors: &[[u8; 4]], width: u32, height: u32) -> FrameSequence {
            let root = self.dir.path().join("live");
            fs::create_dir_all(&root).unwrap();
            let frames = colors
                .iter()
                .enumerate()
                .map(|(i, color)| {
                    let path = root.join(format!("{i}.png"));
                    RgbaImage::from_pixel(width, height, Rgba(*color))
                        .save(&path)
                        .unwrap();
                    FrameRecord::new(path, 100)
                })
                .collect();
            FrameSequence::from_records(root, frames)
        }

        pub fn pixel(&self, sequence: &FrameSequence, index: usize, x: u32, y: u32) -> Rgba<u8> {
            *self
                .codec
                .decode(&sequence.frames()[index].image_location)
                .unwrap()
                .get_pixel(x, y)
        }

        pub fn dimensions(&self, sequence: &FrameSequence, index: usize) -> (u32, u32) {
            self.codec
                .decode(&sequence.frames()[index].image_location)
                .unwrap()
                .dimensions()
        }
    }

    pub const RED: [u8; 4] = [255, 0, 0, 255];
    pub const GREEN: [u8; 4] = [0, 255, 0, 255];
    pub const BLUE: [u8; 4] = [0, 0, 255, 255];
}
