use std::process::Stdio;

use anyhow::{Context, Result, bail};
use async_trait::async_trait;
use tokio::process::Command;
use tracing::debug;

use super::{
    settings::{PixelFormat, Settings},
    traits::{CameraDriver, RawFrame},
};

/// V4L2 capture through one-shot ffmpeg grabs.
#[derive(Debug, Clone)]
pub struct FfmpegBackend {
    program: String,
    device: String,
    input_format: String,
}

#[derive(Debug)]
pub struct FfmpegHandle {
    device: String,
    settings: Option<Settings>,
    armed: bool,
}

impl FfmpegBackend {
    pub fn new(device: String, input_format: String) -> Self {
        Self {
            program: "ffmpeg".to_owned(),
            device,
            input_format,
        }
    }

    pub fn with_program(mut self, program: impl Into<String>) -> Self {
        self.program = program.into();
        self
    }

    fn grab_args(&self, settings: &Settings) -> Vec<String> {
        let resolution = settings.resolution.to_string();
        let framerate = settings.framerate.to_string();
        [
            "-hide_banner",
            "-loglevel",
            "error",
            "-f",
            "v4l2",
            "-input_format",
            self.input_format.as_str(),
            "-video_size",
            resolution.as_str(),
            "-framerate",
            framerate.as_str(),
            "-i",
            self.device.as_str(),
            "-frames:v",
            "1",
            "-f",
            "rawvideo",
            "-pix_fmt",
            ffmpeg_pix_fmt(settings.pixel_format),
            "pipe:1",
        ]
        .into_iter()
        .map(str::to_owned)
        .collect()
    }
}

fn ffmpeg_pix_fmt(format: PixelFormat) -> &'static str {
    match format {
        PixelFormat::Rgb888 => "rgb24",
        PixelFormat::Bgr888 => "bgr24",
        PixelFormat::Xrgb8888 => "bgr0",
        PixelFormat::Xbgr8888 => "rgb0",
    }
}

#[async_trait]
impl CameraDriver for FfmpegBackend {
    type Handle = FfmpegHandle;

    async fn open(&self) -> Result<FfmpegHandle> {
        tokio::fs::metadata(&self.device)
            .await
            .with_context(|| format!("camera device not found: {}", self.device))?;
        Ok(FfmpegHandle {
            device: self.device.clone(),
            settings: None,
            armed: false,
        })
    }

    async fn configure(&self, handle: &mut FfmpegHandle, settings: &Settings) -> Result<()> {
        handle.settings = Some(*settings);
        Ok(())
    }

    async fn start(&self, handle: &mut FfmpegHandle) -> Result<()> {
        if handle.settings.is_none() {
            bail!("camera {} started before being configured", handle.device);
        }
        handle.armed = true;
        Ok(())
    }

    async fn stop(&self, handle: &mut FfmpegHandle) -> Result<()> {
        handle.armed = false;
        Ok(())
    }

    async fn close(&self, handle: FfmpegHandle) -> Result<()> {
        debug!("released camera handle for {}", handle.device);
        Ok(())
    }

    async fn capture_frame(&self, handle: &mut FfmpegHandle) -> Result<RawFrame> {
        if !handle.armed {
            bail!("camera {} is not started", handle.device);
        }
        let Some(settings) = handle.settings else {
            bail!("camera {} is not configured", handle.device);
        };

        // A dropped capture future must not leave ffmpeg holding the device.
        let output = Command::new(&self.program)
            .args(self.grab_args(&settings))
            .stdin(Stdio::null())
            .stdout(Stdio::piped())
            .stderr(Stdio::piped())
            .kill_on_drop(true)
            .output()
            .await
            .context("failed to execute ffmpeg capture command")?;
        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            bail!("ffmpeg capture exited with {}: {}", output.status, stderr.trim());
        }

        let frame = RawFrame {
            width: settings.resolution.width,
            height: settings.resolution.height,
            format: settings.pixel_format,
            data: output.stdout,
        };
        if frame.data.len() != frame.expected_len() {
            bail!(
                "ffmpeg returned {} bytes, expected {} for {}",
                frame.data.len(),
                frame.expected_len(),
                settings.resolution
            );
        }
        Ok(frame)
    }
}
