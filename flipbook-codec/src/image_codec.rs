//! Codec backed by the `image` crate

use crate::animation::{decode_gif, Animation};
use crate::{Error, ImageCodec, Result, VideoFrames};
use image::{ImageFormat, RgbaImage};
use std::fs;
use std::path::Path;

/// Default codec: reads any format the `image` crate understands and writes
/// by file extension, PNG when the extension is unknown.
#[derive(Debug, Clone, Copy, Default)]
pub struct ImageCrateCodec;

impl ImageCrateCodec {
    pub fn new() -> Self {
        Self
    }
}

impl ImageCodec for ImageCrateCodec {
    fn decode(&self, path: &Path) -> Result<RgbaImage> {
        let img = image::open(path).map_err(|e| Error::Decode {
            path: path.to_path_buf(),
            reason: e.to_string(),
        })?;
        Ok(img.to_rgba8())
    }

    fn encode(&self, raster: &RgbaImage, path: &Path) -> Result<()> {
        let format = ImageFormat::from_path(path).unwrap_or(ImageFormat::Png);

        // Write next to the target, then swap it in so readers never see a partial file
        let staging = path.with_extension("partial");
        let encoded = raster
            .save_with_format(&staging, format)
            .map_err(|e| Error::Encode {
                path: path.to_path_buf(),
                reason: e.to_string(),
            });

        if let Err(e) = encoded {
            let _ = fs::remove_file(&staging);
            return Err(e);
        }
        fs::rename(&staging, path)?;
        Ok(())
    }

    fn decode_animation(&self, path: &Path) -> Result<Animation> {
        match ImageFormat::from_path(path) {
            Ok(ImageFormat::Gif) => decode_gif(path),
            _ => Err(Error::Unsupported(path.to_path_buf())),
        }
    }

    #[cfg(feature = "ffmpeg")]
    fn decode_video(&self, path: &Path) -> Result<VideoFrames> {
        let mut reader = crate::video_reader::VideoReader::open(path)?;
        let frame_delay_ms = reader.frame_delay_ms();
        let frames = reader.read_frames()?;
        Ok(VideoFrames {
            frames,
            frame_delay_ms,
        })
    }

    #[cfg(not(feature = "ffmpeg"))]
    fn decode_video(&self, path: &Path) -> Result<VideoFrames> {
        Err(Error::Unsupported(path.to_path_buf()))
    }
}
