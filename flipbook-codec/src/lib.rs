//! Flipbook Codec Library
//!
//! This library provides the image codec collaborator used by the edit engine:
//! decoding frame files to RGBA rasters, encoding them back, and the pixel
//! operations (compositing, resampling, flips and rotations) applied between.

pub mod animation;
pub mod compositor;
pub mod image_codec;
#[cfg(feature = "ffmpeg")]
pub mod video_reader;

pub use animation::{Animation, AnimationFrame, Disposal};
pub use compositor::{blend_over, composite_masked, crossfade, overlay_image, slide};
pub use image_codec::ImageCrateCodec;

use image::RgbaImage;
use std::path::{Path, PathBuf};

/// Result type for flipbook-codec operations
pub type Result<T> = std::result::Result<T, Error>;

/// Error types for flipbook-codec operations
#[derive(Debug, thiserror::Error)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Image error: {0}")]
    Image(#[from] image::ImageError),

    #[cfg(feature = "ffmpeg")]
    #[error("FFmpeg error: {0}")]
    Ffmpeg(#[from] ffmpeg_next::Error),

    #[error("Failed to decode {}: {reason}", path.display())]
    Decode { path: PathBuf, reason: String },

    #[error("Failed to encode {}: {reason}", path.display())]
    Encode { path: PathBuf, reason: String },

    #[error("Unsupported source: {}", .0.display())]
    Unsupported(PathBuf),

    #[error("No video stream found")]
    NoVideoStream,

    #[error("Invalid video frame")]
    InvalidVideo,
}

/// Geometric frame transformation
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum FlipRotate {
    FlipHorizontal,
    FlipVertical,
    RotateLeft90,
    RotateRight90,
}

impl FlipRotate {
    /// Rotations change the canvas size and always apply to every frame
    pub fn is_rotation(self) -> bool {
        matches!(self, FlipRotate::RotateLeft90 | FlipRotate::RotateRight90)
    }
}

/// Pixel rectangle given by its edges, `right` and `bottom` exclusive
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct CropRect {
    pub left: u32,
    pub top: u32,
    pub right: u32,
    pub bottom: u32,
}

impl CropRect {
    pub fn width(&self) -> u32 {
        self.right.saturating_sub(self.left)
    }

    pub fn height(&self) -> u32 {
        self.bottom.saturating_sub(self.top)
    }

    /// Checks whether the rectangle covers exactly a `width` x `height` canvas
    pub fn is_full(&self, width: u32, height: u32) -> bool {
        self.left == 0 && self.top == 0 && self.right == width && self.bottom == height
    }

    /// Checks whether the rectangle is non-empty and inside a `width` x `height` canvas
    pub fn fits(&self, width: u32, height: u32) -> bool {
        self.left < self.right && self.top < self.bottom && self.right <= width && self.bottom <= height
    }
}

/// Frames decoded from a video source
#[derive(Debug, Clone)]
pub struct VideoFrames {
    pub frames: Vec<RgbaImage>,
    /// Delay between frames derived from the source frame rate
    pub frame_delay_ms: u32,
}

/// Image codec collaborator.
///
/// The engine never touches pixel formats itself: every decode, encode and
/// raster operation goes through this trait, so hosts can substitute their own
/// codec (or a failing one in tests).
pub trait ImageCodec: Send + Sync {
    /// Decodes a single-frame raster file
    fn decode(&self, path: &Path) -> Result<RgbaImage>;

    /// Encodes a raster, replacing any file at `path`
    fn encode(&self, raster: &RgbaImage, path: &Path) -> Result<()>;

    /// Composites `overlay` over a copy of `base` at `origin`
    fn composite(&self, base: &RgbaImage, overlay: &RgbaImage, origin: (i32, i32)) -> RgbaImage {
        let mut out = base.clone();
        overlay_image(&mut out, overlay, origin.0, origin.1);
        out
    }

    /// Resamples a raster to the given size
    fn resample(&self, raster: &RgbaImage, width: u32, height: u32) -> RgbaImage {
        image::imageops::resize(raster, width, height, image::imageops::FilterType::Triangle)
    }

    /// Applies a flip or rotation
    fn transform(&self, raster: &RgbaImage, op: FlipRotate) -> RgbaImage {
        use image::imageops;
        match op {
            FlipRotate::FlipHorizontal => imageops::flip_horizontal(raster),
            FlipRotate::FlipVertical => imageops::flip_vertical(raster),
            FlipRotate::RotateLeft90 => imageops::rotate270(raster),
            FlipRotate::RotateRight90 => imageops::rotate90(raster),
        }
    }

    /// Cuts the rectangle out of a raster
    fn crop(&self, raster: &RgbaImage, rect: CropRect) -> RgbaImage {
        image::imageops::crop_imm(raster, rect.left, rect.top, rect.width(), rect.height()).to_image()
    }

    /// Decodes every frame of a multi-frame image
    fn decode_animation(&self, path: &Path) -> Result<Animation> {
        Err(Error::Unsupported(path.to_path_buf()))
    }

    /// Decodes every frame of a video file
    fn decode_video(&self, path: &Path) -> Result<VideoFrames> {
        Err(Error::Unsupported(path.to_path_buf()))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_crop_rect_bounds() {
        let rect = CropRect {
            left: 0,
            top: 0,
            right: 4,
            bottom: 3,
        };
        assert!(rect.is_full(4, 3));
        assert!(rect.fits(4, 3));
        assert!(!rect.fits(3, 3));

        let inner = CropRect {
            left: 1,
            top: 1,
            right: 3,
            bottom: 2,
        };
        assert_eq!((inner.width(), inner.height()), (2, 1));
        assert!(!inner.is_full(4, 3));
    }

    #[test]
    fn test_only_rotations_are_global() {
        assert!(FlipRotate::RotateLeft90.is_rotation());
        assert!(FlipRotate::RotateRight90.is_rotation());
        assert!(!FlipRotate::FlipHorizontal.is_rotation());
        assert!(!FlipRotate::FlipVertical.is_rotation());
    }
}
