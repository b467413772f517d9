use anyhow::{Context, Result, bail};
use image::{ExtendedColorType, RgbImage, codecs::jpeg::JpegEncoder, imageops};

use super::{settings::PixelFormat, traits::RawFrame};

pub const DEFAULT_JPEG_QUALITY: u8 = 85;

#[derive(Debug, Clone, Copy)]
pub struct FrameEncoder {
    quality: u8,
    vflip: bool,
}

impl Default for FrameEncoder {
    fn default() -> Self {
        Self::new(DEFAULT_JPEG_QUALITY, false)
    }
}

impl FrameEncoder {
    pub fn new(quality: u8, vflip: bool) -> Self {
        Self {
            quality: quality.clamp(1, 100),
            vflip,
        }
    }

    pub fn encode(&self, frame: &RawFrame) -> Result<Vec<u8>> {
        if frame.data.len() != frame.expected_len() {
            bail!(
                "{}x{} {} frame should be {} bytes, got {}",
                frame.width,
                frame.height,
                frame.format.as_str(),
                frame.expected_len(),
                frame.data.len()
            );
        }

        let mut image = RgbImage::from_raw(frame.width, frame.height, to_rgb8(frame))
            .context("frame buffer does not match its dimensions")?;
        if self.vflip {
            imageops::flip_vertical_in_place(&mut image);
        }

        let mut out = Vec::with_capacity(frame.data.len() / 8);
        JpegEncoder::new_with_quality(&mut out, self.quality)
            .encode(
                image.as_raw(),
                frame.width,
                frame.height,
                ExtendedColorType::Rgb8,
            )
            .context("jpeg encoding failed")?;
        Ok(out)
    }

    /// Encodes on the blocking pool so request tasks are not stalled.
    pub async fn encode_owned(self, frame: RawFrame) -> Result<Vec<u8>> {
        tokio::task::spawn_blocking(move || self.encode(&frame))
            .await
            .context("jpeg encoder task failed")?
    }
}

fn to_rgb8(frame: &RawFrame) -> Vec<u8> {
    if frame.format == PixelFormat::Rgb888 {
        return frame.data.clone();
    }

    let mut rgb = Vec::with_capacity(frame.width as usize * frame.height as usize * 3);
    for px in frame.data.chunks_exact(frame.format.bytes_per_pixel()) {
        match frame.format {
            PixelFormat::Rgb888 | PixelFormat::Xbgr8888 => rgb.extend_from_slice(&px[..3]),
            PixelFormat::Bgr888 | PixelFormat::Xrgb8888 => rgb.extend_from_slice(&[px[2], px[1], px[0]]),
        }
    }
    rgb
}
