//! Importing project archives, images, animations and videos

use super::ApplyContext;
use crate::{EngineError, Result};
use flipbook_codec::{overlay_image, Animation, Disposal};
use flipbook_core::{load_project, AffectedRange, FrameRecord, FrameSequence};
use image::{Rgba, RgbaImage};
use std::fs;
use std::path::Path;

/// What a source file holds, judged by its extension
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SourceKind {
    /// A project archive written by project export
    Project,
    /// A multi-frame image
    Animation,
    Video,
    /// A single still image
    Image,
}

impl SourceKind {
    pub fn from_path(path: &Path) -> Self {
        let extension = path
            .extension()
            .and_then(|ext| ext.to_str())
            .map(|ext| ext.to_ascii_lowercase())
            .unwrap_or_default();

        match extension.as_str() {
            "fbk" => SourceKind::Project,
            "gif" => SourceKind::Animation,
            "mp4" | "avi" | "mkv" | "mov" | "webm" | "wmv" => SourceKind::Video,
            _ => SourceKind::Image,
        }
    }
}

/// Composites animation patches into full frames, honoring each frame's disposal.
///
/// Frames that leave their content in place become the base of the next
/// frame. Restore-background clears the frame's region, or drops the base
/// entirely when the region is the whole canvas. Restore-previous keeps the
/// base the frame was drawn on.
pub fn resolve_disposal(animation: &Animation) -> Vec<(RgbaImage, u32)> {
    let (width, height) = (animation.width, animation.height);
    let mut base: Option<RgbaImage> = None;
    let mut resolved = Vec::with_capacity(animation.frames.len());

    for frame in &animation.frames {
        let mut canvas = base
            .clone()
            .unwrap_or_else(|| RgbaImage::from_pixel(width, height, Rgba([0, 0, 0, 0])));
        overlay_image(&mut canvas, &frame.pixels, frame.left as i32, frame.top as i32);
        resolved.push((canvas.clone(), frame.delay_ms));

        match frame.disposal {
            Disposal::None | Disposal::DoNotDispose => base = Some(canvas),
            Disposal::RestoreBackground if frame.covers(width, height) => base = None,
            Disposal::RestoreBackground => {
                let right = (frame.left + frame.pixels.width()).min(width);
                let bottom = (frame.top + frame.pixels.height()).min(height);
                for y in frame.top..bottom {
                    for x in frame.left..right {
                        canvas.put_pixel(x, y, Rgba([0, 0, 0, 0]));
                    }
                }
                base = Some(canvas);
            }
            Disposal::RestorePrevious => {}
        }
    }

    resolved
}

/// Decodes `source` into a new sequence rooted at `destination`.
///
/// Any failure removes every file written so far; no partial sequence is
/// ever returned.
pub fn decode_source(source: &Path, destination: &Path, ctx: &mut ApplyContext<'_>) -> Result<FrameSequence> {
    let kind = SourceKind::from_path(source);
    tracing::info!(source = %source.display(), ?kind, "Importing");

    let created = !destination.exists();
    let mut sequence = FrameSequence::new(destination);

    let decoded = match kind {
        SourceKind::Project => import_project(source, destination, ctx),
        SourceKind::Animation => import_animation(source, &mut sequence, ctx).map(|()| None),
        SourceKind::Video => import_video(source, &mut sequence, ctx).map(|()| None),
        SourceKind::Image => import_image(source, &mut sequence, ctx).map(|()| None),
    };

    match decoded {
        Ok(Some(project)) => Ok(project),
        Ok(None) if !sequence.is_empty() => Ok(sequence),
        Ok(None) => Err(EngineError::import(format!("{} holds no frames", source.display()))),
        Err(e) => {
            let frames = sequence.frames().to_vec();
            for frame in frames {
                let _ = frame.delete();
            }
            if created {
                let _ = fs::remove_dir_all(destination);
            }
            Err(e)
        }
    }
}

fn import_failure(source: &Path, error: impl std::fmt::Display) -> EngineError {
    EngineError::import(format!("{}: {error}", source.display()))
}

fn import_project(source: &Path, destination: &Path, ctx: &mut ApplyContext<'_>) -> Result<Option<FrameSequence>> {
    ctx.progress.indeterminate("Importing project");
    load_project(source, destination)
        .map(Some)
        .map_err(|e| import_failure(source, e))
}

fn import_image(source: &Path, sequence: &mut FrameSequence, ctx: &mut ApplyContext<'_>) -> Result<()> {
    ctx.progress.indeterminate("Importing image");
    let raster = ctx
        .codec
        .decode(source)
        .map_err(|e| import_failure(source, e))?;
    push_frame(sequence, &raster, ctx.config.import_delay_ms, ctx)
}

fn import_animation(source: &Path, sequence: &mut FrameSequence, ctx: &mut ApplyContext<'_>) -> Result<()> {
    let animation = ctx
        .codec
        .decode_animation(source)
        .map_err(|e| import_failure(source, e))?;
    let frames = resolve_disposal(&animation);

    ctx.progress.restart("Importing frames", frames.len() as u64);
    for (raster, delay_ms) in frames {
        if ctx.is_cancelled() {
            return Err(EngineError::Cancelled);
        }
        push_frame(sequence, &raster, delay_ms, ctx)?;
        ctx.progress.increment_and_report();
    }
    ctx.progress.finish();
    Ok(())
}

fn import_video(source: &Path, sequence: &mut FrameSequence, ctx: &mut ApplyContext<'_>) -> Result<()> {
    ctx.progress.indeterminate("Decoding video");
    let video = ctx
        .codec
        .decode_video(source)
        .map_err(|e| import_failure(source, e))?;

    ctx.progress.restart("Importing frames", video.frames.len() as u64);
    for raster in &video.frames {
        if ctx.is_cancelled() {
            return Err(EngineError::Cancelled);
        }
        push_frame(sequence, raster, video.frame_delay_ms, ctx)?;
        ctx.progress.increment_and_report();
    }
    ctx.progress.finish();
    Ok(())
}

fn push_frame(sequence: &mut FrameSequence, raster: &RgbaImage, delay_ms: u32, ctx: &ApplyContext<'_>) -> Result<()> {
    fs::create_dir_all(sequence.root())?;
    let location = sequence.fresh_location("png");
    ctx.codec
        .encode(raster, &location)
        .map_err(EngineError::import)?;

    let at = sequence.len();
    sequence.insert_range(at, vec![FrameRecord::new(location, delay_ms)])?;
    Ok(())
}

/// Imports `source` and inserts its frames at `at`.
///
/// Frames are decoded into a staging directory first and only moved into the
/// working directory once the whole source decoded. An empty sequence takes
/// the DPI of an imported project.
pub(crate) fn insert_import(
    sequence: &mut FrameSequence,
    source: &Path,
    at: usize,
    ctx: &mut ApplyContext<'_>,
) -> Result<AffectedRange> {
    if at > sequence.len() {
        return Err(EngineError::OutOfRange(format!(
            "Insert position {at} (sequence has {} frames)",
            sequence.len()
        )));
    }

    let staging = sequence
        .root()
        .join(format!(".import-{}", uuid::Uuid::new_v4().simple()));
    let imported = decode_source(source, &staging, ctx)?;

    let mut records = Vec::with_capacity(imported.len());
    for frame in imported.iter() {
        let location = sequence.fresh_location(frame.extension());
        if let Err(e) = fs::rename(&frame.image_location, &location) {
            for moved in records {
                let _ = FrameRecord::delete(moved);
            }
            let _ = fs::remove_dir_all(&staging);
            return Err(e.into());
        }
        let mut record = frame.clone();
        record.image_location = location;
        records.push(record);
    }
    let _ = fs::remove_dir_all(&staging);

    if sequence.is_empty() {
        sequence.set_dpi(imported.dpi());
    }
    tracing::debug!(frames = records.len(), at, "Imported frames inserted");
    Ok(sequence.insert_range(at, records)?)
}
