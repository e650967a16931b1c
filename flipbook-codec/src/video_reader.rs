//! Video frame extraction using FFmpeg

use crate::{Error, Result};
use ffmpeg_next as ffmpeg;
use image::RgbaImage;
use std::path::Path;
use std::sync::OnceLock;

/// Frame delay used when the stream reports no frame rate
const FALLBACK_DELAY_MS: u32 = 66;

static FFMPEG_INIT: OnceLock<std::result::Result<(), ffmpeg::Error>> = OnceLock::new();

/// FFmpeg global setup, run at most once
fn init_ffmpeg() -> Result<()> {
    FFMPEG_INIT.get_or_init(ffmpeg::init).clone()?;
    Ok(())
}

/// Decodes the best video stream of a file into RGBA rasters
pub struct VideoReader {
    input: ffmpeg::format::context::Input,
    video_stream_index: usize,
    decoder: ffmpeg::codec::decoder::Video,
    frame_rate: (u32, u32),
}

impl VideoReader {
    /// Opens `path` and prepares a decoder for its best video stream
    pub fn open(path: &Path) -> Result<Self> {
        init_ffmpeg()?;

        let input = ffmpeg::format::input(&path)?;

        let video_stream = input
            .streams()
            .best(ffmpeg::media::Type::Video)
            .ok_or(Error::NoVideoStream)?;

        let video_stream_index = video_stream.index();
        let rate = video_stream.rate();
        let frame_rate = (rate.numerator().max(0) as u32, rate.denominator().max(0) as u32);

        let context = ffmpeg::codec::context::Context::from_parameters(video_stream.parameters())?;
        let decoder = context.decoder().video()?;

        Ok(Self {
            input,
            video_stream_index,
            decoder,
            frame_rate,
        })
    }

    pub fn width(&self) -> u32 {
        self.decoder.width()
    }

    pub fn height(&self) -> u32 {
        self.decoder.height()
    }

    /// Stream frame rate as (numerator, denominator)
    pub fn frame_rate(&self) -> (u32, u32) {
        self.frame_rate
    }

    /// Delay between consecutive frames in milliseconds
    pub fn frame_delay_ms(&self) -> u32 {
        let (numerator, denominator) = self.frame_rate;
        if numerator == 0 {
            return FALLBACK_DELAY_MS;
        }
        ((u64::from(denominator) * 1000) / u64::from(numerator)) as u32
    }

    /// Decodes every remaining frame, flushing the decoder at the end
    pub fn read_frames(&mut self) -> Result<Vec<RgbaImage>> {
        let mut scaler = ffmpeg::software::scaling::Context::get(
            self.decoder.format(),
            self.decoder.width(),
            self.decoder.height(),
            ffmpeg::format::Pixel::RGBA,
            self.decoder.width(),
            self.decoder.height(),
            ffmpeg::software::scaling::Flags::BILINEAR,
        )?;

        let mut frames = Vec::new();
        for (stream, packet) in self.input.packets() {
            if stream.index() == self.video_stream_index {
                self.decoder.send_packet(&packet)?;
                drain_decoder(&mut self.decoder, &mut scaler, &mut frames)?;
            }
        }

        self.decoder.send_eof()?;
        drain_decoder(&mut self.decoder, &mut scaler, &mut frames)?;

        tracing::debug!(frames = frames.len(), "Decoded video");
        Ok(frames)
    }
}

fn drain_decoder(
    decoder: &mut ffmpeg::decoder::Video,
    scaler: &mut ffmpeg::software::scaling::Context,
    frames: &mut Vec<RgbaImage>,
) -> Result<()> {
    let mut decoded = ffmpeg::frame::Video::empty();
    while decoder.receive_frame(&mut decoded).is_ok() {
        let mut rgba = ffmpeg::frame::Video::empty();
        scaler.run(&decoded, &mut rgba)?;

        // Rows may be padded, copy them one by one
        let width = rgba.width() as usize;
        let height = rgba.height() as usize;
        let stride = rgba.stride(0);
        let data = rgba.data(0);
        let mut pixels = Vec::with_capacity(width * height * 4);
        for row in 0..height {
            let start = row * stride;
            pixels.extend_from_slice(&data[start..start + width * 4]);
        }

        let image = RgbaImage::from_raw(rgba.width(), rgba.height(), pixels)
            .ok_or(Error::InvalidVideo)?;
        frames.push(image);
    }
    Ok(())
}
