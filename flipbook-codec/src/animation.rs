//! Multi-frame image decoding

use crate::{Error, Result};
use image::codecs::gif::GifDecoder;
use image::{AnimationDecoder, RgbaImage};
use std::fs::File;
use std::io::BufReader;
use std::path::Path;

/// How the canvas is treated once a frame has been shown
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum Disposal {
    /// Leave the frame in place; it becomes the base for the next frame
    #[default]
    None,
    /// Same as `None`
    DoNotDispose,
    /// Clear the frame's region to transparent
    RestoreBackground,
    /// Put back the canvas as it was before the frame was drawn
    RestorePrevious,
}

/// One decoded frame patch of a multi-frame image
#[derive(Debug, Clone)]
pub struct AnimationFrame {
    /// Patch pixels, possibly smaller than the canvas
    pub pixels: RgbaImage,
    pub left: u32,
    pub top: u32,
    pub delay_ms: u32,
    pub disposal: Disposal,
}

impl AnimationFrame {
    /// Checks whether the patch covers the whole `width` x `height` canvas
    pub fn covers(&self, width: u32, height: u32) -> bool {
        self.left == 0 && self.top == 0 && self.pixels.width() >= width && self.pixels.height() >= height
    }
}

/// A decoded multi-frame image
#[derive(Debug, Clone)]
pub struct Animation {
    pub width: u32,
    pub height: u32,
    pub frames: Vec<AnimationFrame>,
}

/// Decodes a GIF into full-canvas frames.
///
/// The image crate composites every frame onto the logical screen, so the
/// returned patches cover the canvas and carry no pending disposal.
pub fn decode_gif(path: &Path) -> Result<Animation> {
    let reader = BufReader::new(File::open(path)?);
    let decoder = GifDecoder::new(reader)?;
    let frames = decoder.into_frames().collect_frames()?;

    let (width, height) = frames
        .first()
        .map(|f| f.buffer().dimensions())
        .ok_or_else(|| Error::Decode {
            path: path.to_path_buf(),
            reason: "no frames".to_string(),
        })?;

    let frames = frames
        .into_iter()
        .map(|frame| {
            let (numer, denom) = frame.delay().numer_denom_ms();
            let delay_ms = if denom == 0 { 0 } else { numer / denom };
            AnimationFrame {
                left: frame.left(),
                top: frame.top(),
                pixels: frame.into_buffer(),
                delay_ms,
                disposal: Disposal::None,
            }
        })
        .collect::<Vec<_>>();

    tracing::debug!(frames = frames.len(), width, height, "Decoded animation");
    Ok(Animation {
        width,
        height,
        frames,
    })
}
