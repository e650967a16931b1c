//! Fade and slide transition frame synthesis

use super::ApplyContext;
use crate::request::{SlideFrom, TransitionKind};
use crate::Result;
use flipbook_codec::{crossfade, slide};
use flipbook_core::{AffectedRange, FrameRecord, FrameSequence};
use image::RgbaImage;

/// Builds transition frame `step` (1-based) of `count` between two rasters
pub fn transition_frame(
    kind: TransitionKind,
    from: &RgbaImage,
    to: &RgbaImage,
    step: usize,
    count: usize,
) -> RgbaImage {
    let t = step as f32 / (count + 1) as f32;
    match kind {
        TransitionKind::Fade => crossfade(from, to, t),
        TransitionKind::Slide(side) => {
            let width = from.width() as f32;
            let travelled = (width * t).round() as i32;
            let offset = from.width() as i32 - travelled;
            match side {
                SlideFrom::Right => slide(from, to, offset, t),
                SlideFrom::Left => slide(from, to, -offset, t),
            }
        }
    }
}

/// Inserts `count` synthesized frames between `anchor` and the frame after it.
///
/// The frame after the last one is the first frame. New frames get fresh
/// file names and the configured transition delay.
pub(crate) fn insert_transition(
    sequence: &mut FrameSequence,
    anchor: usize,
    count: usize,
    kind: TransitionKind,
    ctx: &mut ApplyContext<'_>,
) -> Result<AffectedRange> {
    let codec = ctx.codec;
    let next = if Some(anchor) == sequence.last_index() {
        0
    } else {
        anchor + 1
    };

    let from = codec.decode(&sequence.frame(anchor)?.image_location)?;
    let to = codec.decode(&sequence.frame(next)?.image_location)?;

    ctx.progress.restart("Applying transition", count as u64);
    let mut inserted = 0;
    for step in 1..=count {
        if ctx.is_cancelled() {
            break;
        }

        let raster = transition_frame(kind, &from, &to, step, count);
        let location = sequence.fresh_location("png");
        codec.encode(&raster, &location)?;

        let record = FrameRecord::new(location, ctx.config.transition_delay_ms);
        sequence.insert_range(anchor + step, vec![record])?;
        inserted += 1;
        ctx.progress.increment_and_report();
    }
    ctx.progress.finish();

    if inserted == 0 {
        return Err(crate::EngineError::Cancelled);
    }
    tracing::debug!(anchor, next, inserted, "Transition frames inserted");
    Ok(AffectedRange::new(anchor, sequence.len() - 1))
}
