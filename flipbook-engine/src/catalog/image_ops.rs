//! Per-frame pixel operations: resize, crop, flip/rotate and overlays

use super::{for_each_frame, frame_dimensions, rewrite, scoped_indices, ApplyContext};
use crate::request::{Scope, Stroke};
use crate::Result;
use flipbook_codec::{blend_over, composite_masked, CropRect, FlipRotate, ImageCodec};
use flipbook_core::{AffectedRange, CursorOverlay, FrameRecord, FrameSequence};
use image::{Rgba, RgbaImage};

fn gcd(a: u32, b: u32) -> u32 {
    if b == 0 {
        a
    } else {
        gcd(b, a % b)
    }
}

/// Height matching `width` under the reduced `current` aspect ratio
pub fn aspect_locked_height(current: (u32, u32), width: u32) -> u32 {
    let divisor = gcd(current.0, current.1).max(1);
    let ratio_width = f64::from(current.0 / divisor);
    let ratio_height = f64::from(current.1 / divisor);
    ((ratio_height * f64::from(width)) / ratio_width).round().max(1.0) as u32
}

/// Final frame size for a resize request
pub fn target_size(current: (u32, u32), requested: (u32, u32), keep_aspect: bool) -> (u32, u32) {
    if keep_aspect {
        (requested.0, aspect_locked_height(current, requested.0))
    } else {
        requested
    }
}

pub(crate) fn resize(
    sequence: &mut FrameSequence,
    requested: (u32, u32),
    dpi: f64,
    keep_aspect: bool,
    ctx: &mut ApplyContext<'_>,
) -> Result<AffectedRange> {
    let codec = ctx.codec;
    let current = frame_dimensions(sequence, codec)?;
    let (width, height) = target_size(current, requested, keep_aspect);
    tracing::debug!(?current, width, height, dpi, "Resize target");

    let indices: Vec<usize> = (0..sequence.len()).collect();
    let frames = sequence.frames();
    let range = for_each_frame(ctx, "Resizing", &indices, |index| {
        rewrite(codec, &frames[index].image_location, |raster| {
            codec.resample(&raster, width, height)
        })
    })?;

    sequence.set_dpi(dpi);
    Ok(range)
}

pub(crate) fn crop(
    sequence: &mut FrameSequence,
    rect: CropRect,
    ctx: &mut ApplyContext<'_>,
) -> Result<AffectedRange> {
    let codec = ctx.codec;
    let indices: Vec<usize> = (0..sequence.len()).collect();
    let frames = sequence.frames();
    for_each_frame(ctx, "Cropping", &indices, |index| {
        rewrite(codec, &frames[index].image_location, |raster| codec.crop(&raster, rect))
    })
}

/// Flips the scoped frames; rotations always cover the whole sequence
pub(crate) fn flip_rotate(
    sequence: &mut FrameSequence,
    op: FlipRotate,
    scope: &Scope,
    ctx: &mut ApplyContext<'_>,
) -> Result<AffectedRange> {
    let codec = ctx.codec;
    let indices = if op.is_rotation() {
        scoped_indices(&Scope::All, sequence)?
    } else {
        scoped_indices(scope, sequence)?
    };

    let description = if op.is_rotation() { "Rotating" } else { "Flipping" };
    let frames = sequence.frames();
    for_each_frame(ctx, description, &indices, |index| {
        rewrite(codec, &frames[index].image_location, |raster| codec.transform(&raster, op))
    })
}

/// Composites a pre-rendered bitmap at the origin of each scoped frame.
///
/// A bitmap rendered at a different DPI is scaled to the sequence DPI first.
pub(crate) fn overlay(
    sequence: &mut FrameSequence,
    bitmap: &RgbaImage,
    dpi: f64,
    scope: &Scope,
    ctx: &mut ApplyContext<'_>,
) -> Result<AffectedRange> {
    let codec = ctx.codec;
    let indices = scoped_indices(scope, sequence)?;

    let scale = sequence.dpi() / dpi;
    let scaled;
    let bitmap = if (scale - 1.0).abs() > f64::EPSILON {
        let width = (f64::from(bitmap.width()) * scale).round().max(1.0) as u32;
        let height = (f64::from(bitmap.height()) * scale).round().max(1.0) as u32;
        scaled = codec.resample(bitmap, width, height);
        &scaled
    } else {
        bitmap
    };

    let frames = sequence.frames();
    for_each_frame(ctx, "Applying overlay", &indices, |index| {
        rewrite(codec, &frames[index].image_location, |raster| {
            codec.composite(&raster, bitmap, (0, 0))
        })
    })
}

/// Pixels outside every stroke, row-major over a `width` x `height` canvas
pub fn cinemagraph_mask(strokes: &[Stroke], width: u32, height: u32) -> Vec<bool> {
    let mut mask = Vec::with_capacity(width as usize * height as usize);
    for y in 0..height {
        for x in 0..width {
            let (cx, cy) = (x as f32 + 0.5, y as f32 + 0.5);
            mask.push(!strokes.iter().any(|stroke| stroke.covers(cx, cy)));
        }
    }
    mask
}

/// Freezes everything outside the strokes to the first frame's content
pub(crate) fn cinemagraph(
    sequence: &mut FrameSequence,
    strokes: &[Stroke],
    ctx: &mut ApplyContext<'_>,
) -> Result<AffectedRange> {
    let codec = ctx.codec;
    let first = codec.decode(&sequence.frame(0)?.image_location)?;
    let mask = cinemagraph_mask(strokes, first.width(), first.height());

    let indices: Vec<usize> = (1..sequence.len()).collect();
    if indices.is_empty() {
        return Ok(AffectedRange::single(0));
    }

    let frames = sequence.frames();
    for_each_frame(ctx, "Applying cinemagraph", &indices, |index| {
        rewrite(codec, &frames[index].image_location, |mut raster| {
            composite_masked(&mut raster, &first, &mask);
            raster
        })
    })
}

/// Inserts a title bitmap as a new frame before `at`
pub(crate) fn title_frame(
    sequence: &mut FrameSequence,
    bitmap: &RgbaImage,
    at: usize,
    delay_ms: Option<u32>,
    ctx: &mut ApplyContext<'_>,
) -> Result<AffectedRange> {
    let codec = ctx.codec;
    let (width, height) = frame_dimensions(sequence, codec)?;
    ctx.progress.indeterminate("Inserting title frame");

    let location = sequence.fresh_location("png");
    if bitmap.dimensions() == (width, height) {
        codec.encode(bitmap, &location)?;
    } else {
        codec.encode(&codec.resample(bitmap, width, height), &location)?;
    }

    let delay = delay_ms.unwrap_or(ctx.config.title_frame_delay_ms);
    let record = FrameRecord::new(location, delay);
    Ok(sequence.insert_range(at, vec![record])?)
}

/// Burns each pending cursor overlay into its frame and clears it.
///
/// Failures are logged and skipped: a frame that cannot take its cursor
/// keeps its pixels and still loses the overlay.
pub(crate) fn merge_cursors(
    sequence: &mut FrameSequence,
    ctx: &mut ApplyContext<'_>,
) -> Result<AffectedRange> {
    let codec = ctx.codec;
    let highlight = Rgba(ctx.config.click_highlight);
    let indices: Vec<usize> = sequence
        .iter()
        .enumerate()
        .filter(|(_, frame)| frame.cursor_overlay.is_some())
        .map(|(index, _)| index)
        .collect();

    for_each_frame(ctx, "Merging cursors", &indices, |index| {
        let frame = sequence.frame_mut(index)?;
        if let Some(cursor) = frame.cursor_overlay.take() {
            if let Err(e) = burn_cursor(codec, frame, &cursor, highlight) {
                tracing::warn!(index, error = %e, "Cursor overlay skipped");
            }
        }
        Ok(())
    })
}

fn burn_cursor(
    codec: &dyn ImageCodec,
    frame: &FrameRecord,
    cursor: &CursorOverlay,
    highlight: Rgba<u8>,
) -> Result<()> {
    let glyph = codec.decode(&cursor.glyph_location)?;
    rewrite(codec, &frame.image_location, |mut raster| {
        if cursor.clicked {
            draw_click(&mut raster, cursor, glyph.dimensions(), highlight);
        }
        codec.composite(&raster, &glyph, (cursor.x, cursor.y))
    })
}

/// Fills the click highlight ellipse around the cursor hotspot
fn draw_click(raster: &mut RgbaImage, cursor: &CursorOverlay, glyph: (u32, u32), color: Rgba<u8>) {
    let (glyph_width, glyph_height) = (glyph.0 as f32, glyph.1 as f32);
    let left = cursor.x as f32 - 5.0;
    let top = cursor.y as f32 - 5.0;
    let box_width = (glyph_width - 5.0).max(1.0);
    let box_height = (glyph_height - 5.0).max(1.0);

    // The outline pen is as wide as the glyph, which fills the ellipse
    let center = (left + box_width / 2.0, top + box_height / 2.0);
    let radius = (
        box_width / 2.0 + glyph_width / 2.0,
        box_height / 2.0 + glyph_width / 2.0,
    );

    let x_range = (center.0 - radius.0).floor().max(0.0) as u32
        ..((center.0 + radius.0).ceil().max(0.0) as u32).min(raster.width());
    let y_range = (center.1 - radius.1).floor().max(0.0) as u32
        ..((center.1 + radius.1).ceil().max(0.0) as u32).min(raster.height());

    for y in y_range {
        for x in x_range.clone() {
            let dx = (x as f32 + 0.5 - center.0) / radius.0;
            let dy = (y as f32 + 0.5 - center.1) / radius.1;
            if dx * dx + dy * dy <= 1.0 {
                let blended = blend_over(*raster.get_pixel(x, y), color, 1.0);
                raster.put_pixel(x, y, blended);
            }
        }
    }
}

#[cfg(test)]
mod tests {
    use super::super::testing::*;
    use super::super::apply;
    use super::*;
    use crate::request::TransformationRequest;

    #[test]
    fn test_aspect_locked_height_uses_reduced_ratio() {
        // 640x480 reduces to 4:3
        assert_eq!(aspect_locked_height((640, 480), 320), 240);
        assert_eq!(aspect_locked_height((640, 480), 101), 76);
        // 1366x768 reduces to 683:384
        assert_eq!(aspect_locked_height((1366, 768), 683), 384);
        assert_eq!(target_size((640, 480), (320, 999), false), (320, 999));
    }

    #[test]
    fn test_resize_with_aspect_lock() {
        let mut fixture = Fixture::new();
        let mut sequence = fixture.sequence(&[RED, GREEN], 8, 6);

        let request = TransformationRequest::Resize {
            width: 4,
            height: 100,
            dpi: 120.0,
            keep_aspect: true,
        };
        let range = apply(request, &mut sequence, &mut fixture.ctx()).unwrap();

        assert_eq!(range, AffectedRange::new(0, 1));
        assert_eq!(fixture.dimensions(&sequence, 0), (4, 3));
        assert_eq!(fixture.dimensions(&sequence, 1), (4, 3));
        assert_eq!(sequence.dpi(), 120.0);
    }

    #[test]
    fn test_crop_every_frame() {
        let mut fixture = Fixture::new();
        let mut sequence = fixture.sequence(&[RED, GREEN], 4, 4);

        let rect = CropRect {
            left: 1,
            top: 1,
            right: 3,
            bottom: 4,
        };
        apply(TransformationRequest::Crop(rect), &mut sequence, &mut fixture.ctx()).unwrap();
        assert_eq!(fixture.dimensions(&sequence, 0), (2, 3));
        assert_eq!(fixture.dimensions(&sequence, 1), (2, 3));
    }

    #[test]
    fn test_flip_respects_selection_but_rotation_does_not() {
        let mut fixture = Fixture::new();
        let mut sequence = fixture.sequence(&[RED, GREEN, BLUE], 4, 2);

        let flip = TransformationRequest::FlipRotate {
            op: FlipRotate::FlipHorizontal,
            scope: Scope::Selected(vec![1]),
        };
        let range = apply(flip, &mut sequence, &mut fixture.ctx()).unwrap();
        assert_eq!(range, AffectedRange::single(1));

        let rotate = TransformationRequest::FlipRotate {
            op: FlipRotate::RotateRight90,
            scope: Scope::Selected(vec![1]),
        };
        let range = apply(rotate, &mut sequence, &mut fixture.ctx()).unwrap();
        assert_eq!(range, AffectedRange::new(0, 2));
        for index in 0..3 {
            assert_eq!(fixture.dimensions(&sequence, index), (2, 4));
        }
    }

    #[test]
    fn test_overlay_selected_frames() {
        let mut fixture = Fixture::new();
        let mut sequence = fixture.sequence(&[RED, RED, RED], 4, 4);

        let mut bitmap = RgbaImage::from_pixel(4, 4, Rgba([0, 0, 0, 0]));
        bitmap.put_pixel(0, 0, Rgba(BLUE));
        let request = TransformationRequest::Overlay {
            bitmap,
            dpi: sequence.dpi(),
            scope: Scope::Selected(vec![0, 2]),
        };
        let range = apply(request, &mut sequence, &mut fixture.ctx()).unwrap();

        assert_eq!(range, AffectedRange::new(0, 2));
        assert_eq!(fixture.pixel(&sequence, 0, 0, 0), Rgba(BLUE));
        assert_eq!(fixture.pixel(&sequence, 1, 0, 0), Rgba(RED));
        assert_eq!(fixture.pixel(&sequence, 2, 0, 0), Rgba(BLUE));
        assert_eq!(fixture.pixel(&sequence, 2, 1, 1), Rgba(RED));
    }

    #[test]
    fn test_cinemagraph_freezes_outside_strokes() {
        let mut fixture = Fixture::new();
        let mut sequence = fixture.sequence(&[RED, GREEN, BLUE], 4, 1);

        let request = TransformationRequest::Cinemagraph {
            strokes: vec![Stroke {
                points: vec![(3.5, 0.5)],
                width: 1.0,
            }],
        };
        apply(request, &mut sequence, &mut fixture.ctx()).unwrap();

        // Outside the stroke every frame shows the first frame
        assert_eq!(fixture.pixel(&sequence, 1, 0, 0), Rgba(RED));
        assert_eq!(fixture.pixel(&sequence, 2, 2, 0), Rgba(RED));
        // Under the stroke each frame keeps its own content
        assert_eq!(fixture.pixel(&sequence, 1, 3, 0), Rgba(GREEN));
        assert_eq!(fixture.pixel(&sequence, 2, 3, 0), Rgba(BLUE));
    }

    #[test]
    fn test_title_frame_is_inserted_before_selection() {
        let mut fixture = Fixture::new();
        let mut sequence = fixture.sequence(&[RED, GREEN], 4, 4);

        let request = TransformationRequest::TitleFrame {
            bitmap: RgbaImage::from_pixel(2, 2, Rgba(BLUE)),
            at: 1,
            delay_ms: None,
        };
        let range = apply(request, &mut sequence, &mut fixture.ctx()).unwrap();

        assert_eq!(range, AffectedRange::new(1, 2));
        assert_eq!(sequence.len(), 3);
        assert_eq!(sequence.frames()[1].delay_ms(), 1000);
        assert_eq!(fixture.dimensions(&sequence, 1), (4, 4));
        assert_eq!(fixture.pixel(&sequence, 1, 3, 3), Rgba(BLUE));
    }

    #[test]
    fn test_merge_cursors_is_lenient() {
        let mut fixture = Fixture::new();
        let mut sequence = fixture.sequence(&[RED, RED], 8, 8);

        let glyph_path = fixture.dir.path().join("cursor.png");
        RgbaImage::from_pixel(2, 2, Rgba(BLUE)).save(&glyph_path).unwrap();

        let good = CursorOverlay {
            glyph_location: glyph_path,
            x: 4,
            y: 4,
            clicked: false,
        };
        let broken = CursorOverlay {
            glyph_location: fixture.dir.path().join("missing.png"),
            x: 0,
            y: 0,
            clicked: true,
        };
        sequence.frame_mut(0).unwrap().cursor_overlay = Some(good);
        sequence.frame_mut(1).unwrap().cursor_overlay = Some(broken);

        let range = apply(TransformationRequest::MergeCursors, &mut sequence, &mut fixture.ctx()).unwrap();
        assert_eq!(range, AffectedRange::new(0, 1));
        assert!(sequence.iter().all(|f| f.cursor_overlay.is_none()));
        assert_eq!(fixture.pixel(&sequence, 0, 4, 4), Rgba(BLUE));
        assert_eq!(fixture.pixel(&sequence, 0, 0, 0), Rgba(RED));
        assert_eq!(fixture.pixel(&sequence, 1, 0, 0), Rgba(RED));
    }

    #[test]
    fn test_click_highlight_is_drawn() {
        let mut raster = RgbaImage::from_pixel(40, 40, Rgba([0, 0, 0, 255]));
        let cursor = CursorOverlay {
            glyph_location: "unused.png".into(),
            x: 20,
            y: 20,
            clicked: true,
        };
        draw_click(&mut raster, &cursor, (16, 16), Rgba([255, 255, 0, 120]));

        let center = raster.get_pixel(20, 20);
        assert!(center[0] > 100 && center[1] > 100 && center[2] == 0);
        assert_eq!(*raster.get_pixel(0, 0), Rgba([0, 0, 0, 255]));
    }
}
