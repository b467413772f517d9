use anyhow::Result;
use async_trait::async_trait;

use super::settings::{PixelFormat, Settings};

/// One uncompressed frame as delivered by a driver.
#[derive(Debug, Clone)]
pub struct RawFrame {
    pub width: u32,
    pub height: u32,
    pub format: PixelFormat,
    pub data: Vec<u8>,
}

impl RawFrame {
    pub fn expected_len(&self) -> usize {
        self.width as usize * self.height as usize * self.format.bytes_per_pixel()
    }
}

/// Hardware primitives over a single camera device.
///
/// A handle returned by `open` is owned by the caller until it is passed back
/// to `close`. The session controller is the only caller.
#[async_trait]
pub trait CameraDriver: Send + Sync + 'static {
    type Handle: Send + 'static;

    async fn open(&self) -> Result<Self::Handle>;
    async fn configure(&self, handle: &mut Self::Handle, settings: &Settings) -> Result<()>;
    async fn start(&self, handle: &mut Self::Handle) -> Result<()>;
    async fn stop(&self, handle: &mut Self::Handle) -> Result<()>;
    async fn close(&self, handle: Self::Handle) -> Result<()>;
    async fn capture_frame(&self, handle: &mut Self::Handle) -> Result<RawFrame>;
}
