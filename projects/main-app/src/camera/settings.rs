use std::{fmt, ops::RangeInclusive, str::FromStr};

use serde::{Deserialize, Serialize};

use super::error::{CameraError, SettingsViolation};

pub const DEFAULT_RESOLUTION: Resolution = Resolution {
    width: 1024,
    height: 768,
};
pub const DEFAULT_FRAMERATE: u32 = 30;
pub const FRAMERATE_BOUNDS: RangeInclusive<u32> = 1..=60;
pub const DEFAULT_SUPPORTED_RESOLUTIONS: [Resolution; 4] = [
    Resolution {
        width: 640,
        height: 480,
    },
    DEFAULT_RESOLUTION,
    Resolution {
        width: 1280,
        height: 720,
    },
    Resolution {
        width: 1920,
        height: 1080,
    },
];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Resolution {
    pub width: u32,
    pub height: u32,
}

impl fmt::Display for Resolution {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}x{}", self.width, self.height)
    }
}

impl FromStr for Resolution {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        let (width, height) = value
            .trim()
            .split_once(['x', 'X'])
            .ok_or_else(|| anyhow::anyhow!("resolution must look like WIDTHxHEIGHT: {value}"))?;
        let width: u32 = width.trim().parse()?;
        let height: u32 = height.trim().parse()?;
        if width == 0 || height == 0 {
            anyhow::bail!("resolution must be positive: {value}");
        }
        Ok(Self { width, height })
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub enum PixelFormat {
    #[serde(rename = "RGB888")]
    Rgb888,
    #[serde(rename = "BGR888")]
    Bgr888,
    /// Four bytes per pixel, B G R X in memory.
    #[serde(rename = "XRGB8888")]
    Xrgb8888,
    /// Four bytes per pixel, R G B X in memory.
    #[serde(rename = "XBGR8888")]
    Xbgr8888,
}

impl PixelFormat {
    pub const ALL: [PixelFormat; 4] = [
        PixelFormat::Rgb888,
        PixelFormat::Bgr888,
        PixelFormat::Xrgb8888,
        PixelFormat::Xbgr8888,
    ];

    pub fn as_str(self) -> &'static str {
        match self {
            PixelFormat::Rgb888 => "RGB888",
            PixelFormat::Bgr888 => "BGR888",
            PixelFormat::Xrgb8888 => "XRGB8888",
            PixelFormat::Xbgr8888 => "XBGR8888",
        }
    }

    pub fn bytes_per_pixel(self) -> usize {
        match self {
            PixelFormat::Rgb888 | PixelFormat::Bgr888 => 3,
            PixelFormat::Xrgb8888 | PixelFormat::Xbgr8888 => 4,
        }
    }
}

impl FromStr for PixelFormat {
    type Err = ();

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        Self::ALL
            .into_iter()
            .find(|format| format.as_str().eq_ignore_ascii_case(value.trim()))
            .ok_or(())
    }
}

/// Validated camera configuration. Replaced wholesale, never edited in place.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct Settings {
    pub resolution: Resolution,
    pub framerate: u32,
    #[serde(rename = "format")]
    pub pixel_format: PixelFormat,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            resolution: DEFAULT_RESOLUTION,
            framerate: DEFAULT_FRAMERATE,
            pixel_format: PixelFormat::Rgb888,
        }
    }
}

/// Untrusted settings as they arrive over the wire.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SettingsRequest {
    pub resolution: (i64, i64),
    pub framerate: i64,
    pub format: String,
}

impl Default for SettingsRequest {
    fn default() -> Self {
        let defaults = Settings::default();
        Self {
            resolution: (
                defaults.resolution.width.into(),
                defaults.resolution.height.into(),
            ),
            framerate: defaults.framerate.into(),
            format: defaults.pixel_format.as_str().to_owned(),
        }
    }
}

#[derive(Debug, Clone)]
pub struct SettingsManager {
    supported_resolutions: Vec<Resolution>,
    framerate_bounds: RangeInclusive<u32>,
}

impl Default for SettingsManager {
    fn default() -> Self {
        Self::new(DEFAULT_SUPPORTED_RESOLUTIONS.to_vec())
    }
}

impl SettingsManager {
    pub fn new(supported_resolutions: Vec<Resolution>) -> Self {
        Self {
            supported_resolutions,
            framerate_bounds: FRAMERATE_BOUNDS,
        }
    }

    pub fn defaults(&self) -> Settings {
        Settings::default()
    }

    /// Checks every field and reports all offending ones at once.
    pub fn validate(&self, request: &SettingsRequest) -> Result<Settings, CameraError> {
        let mut violations = Vec::new();

        let resolution = match self.check_resolution(request.resolution) {
            Ok(resolution) => Some(resolution),
            Err(reason) => {
                violations.push(SettingsViolation {
                    field: "resolution",
                    reason,
                });
                None
            }
        };

        let framerate = match u32::try_from(request.framerate) {
            Ok(fps) if self.framerate_bounds.contains(&fps) => Some(fps),
            _ => {
                violations.push(SettingsViolation {
                    field: "framerate",
                    reason: format!(
                        "{} is outside {}..={}",
                        request.framerate,
                        self.framerate_bounds.start(),
                        self.framerate_bounds.end()
                    ),
                });
                None
            }
        };

        let pixel_format = match request.format.parse::<PixelFormat>() {
            Ok(format) => Some(format),
            Err(()) => {
                let supported: Vec<&str> = PixelFormat::ALL.iter().map(|f| f.as_str()).collect();
                violations.push(SettingsViolation {
                    field: "format",
                    reason: format!(
                        "{:?} is not one of {}",
                        request.format,
                        supported.join(", ")
                    ),
                });
                None
            }
        };

        match (resolution, framerate, pixel_format) {
            (Some(resolution), Some(framerate), Some(pixel_format)) => Ok(Settings {
                resolution,
                framerate,
                pixel_format,
            }),
            _ => Err(CameraError::Validation(violations)),
        }
    }

    fn check_resolution(&self, (width, height): (i64, i64)) -> Result<Resolution, String> {
        let (Ok(width), Ok(height)) = (u32::try_from(width), u32::try_from(height)) else {
            return Err(format!("{width}x{height} must be positive"));
        };
        if width == 0 || height == 0 {
            return Err(format!("{width}x{height} must be positive"));
        }

        let resolution = Resolution { width, height };
        if !self.supported_resolutions.contains(&resolution) {
            let supported: Vec<String> = self
                .supported_resolutions
                .iter()
                .map(ToString::to_string)
                .collect();
            return Err(format!(
                "{resolution} is not supported (supported: {})",
                supported.join(", ")
            ));
        }
        Ok(resolution)
    }
}
