use anyhow::{Result, bail};
use async_trait::async_trait;

use super::{
    settings::{PixelFormat, Settings},
    traits::{CameraDriver, RawFrame},
};

/// Synthetic camera producing a diagonal gradient that drifts one step per
/// captured frame.
#[derive(Debug, Clone, Default)]
pub struct TestPatternDriver;

#[derive(Debug, Default)]
pub struct TestPatternHandle {
    settings: Option<Settings>,
    running: bool,
    tick: u8,
}

#[async_trait]
impl CameraDriver for TestPatternDriver {
    type Handle = TestPatternHandle;

    async fn open(&self) -> Result<TestPatternHandle> {
        Ok(TestPatternHandle::default())
    }

    async fn configure(&self, handle: &mut TestPatternHandle, settings: &Settings) -> Result<()> {
        handle.settings = Some(*settings);
        Ok(())
    }

    async fn start(&self, handle: &mut TestPatternHandle) -> Result<()> {
        handle.running = true;
        Ok(())
    }

    async fn stop(&self, handle: &mut TestPatternHandle) -> Result<()> {
        handle.running = false;
        Ok(())
    }

    async fn close(&self, _handle: TestPatternHandle) -> Result<()> {
        Ok(())
    }

    async fn capture_frame(&self, handle: &mut TestPatternHandle) -> Result<RawFrame> {
        if !handle.running {
            bail!("test pattern is not started");
        }
        let Some(settings) = handle.settings else {
            bail!("test pattern is not configured");
        };
        handle.tick = handle.tick.wrapping_add(4);
        Ok(render(&settings, handle.tick))
    }
}

fn render(settings: &Settings, tick: u8) -> RawFrame {
    let width = settings.resolution.width;
    let height = settings.resolution.height;
    let format = settings.pixel_format;
    let mut data = Vec::with_capacity(width as usize * height as usize * format.bytes_per_pixel());

    for y in 0..height {
        for x in 0..width {
            let r = ((x * 255) / width.max(1)) as u8;
            let g = ((y * 255) / height.max(1)) as u8;
            let b = tick.wrapping_add(((x + y) / 4) as u8);
            match format {
                PixelFormat::Rgb888 => data.extend_from_slice(&[r, g, b]),
                PixelFormat::Bgr888 => data.extend_from_slice(&[b, g, r]),
                PixelFormat::Xrgb8888 => data.extend_from_slice(&[b, g, r, 0xFF]),
                PixelFormat::Xbgr8888 => data.extend_from_slice(&[r, g, b, 0xFF]),
            }
        }
    }

    RawFrame {
        width,
        height,
        format,
        data,
    }
}
