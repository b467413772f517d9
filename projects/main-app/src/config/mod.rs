use std::{env, net::SocketAddr, str::FromStr, time::Duration};

use anyhow::{Context, bail};

use crate::camera::{
    jpeg::DEFAULT_JPEG_QUALITY,
    settings::{DEFAULT_SUPPORTED_RESOLUTIONS, Resolution},
    stream::DEFAULT_FRAME_INTERVAL,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DriverKind {
    Ffmpeg,
    TestPattern,
}

impl FromStr for DriverKind {
    type Err = anyhow::Error;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.trim().to_ascii_lowercase().as_str() {
            "ffmpeg" => Ok(Self::Ffmpeg),
            "test-pattern" | "test_pattern" => Ok(Self::TestPattern),
            other => bail!("unknown CAMERA_DRIVER {other:?} (expected ffmpeg or test-pattern)"),
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub app_name: String,
    pub bind_addr: SocketAddr,
    pub camera_driver: DriverKind,
    pub camera_device: String,
    pub camera_input_format: String,
    pub ffmpeg_bin: String,
    pub camera_vflip: bool,
    pub jpeg_quality: u8,
    pub stream_frame_interval: Duration,
    pub supported_resolutions: Vec<Resolution>,
    pub auto_stop_seconds: u64,
    pub log_dir: String,
    pub log_level: tracing::Level,
}

impl AppConfig {
    pub fn from_env() -> anyhow::Result<Self> {
        let app_name = env::var("APP_NAME").unwrap_or_else(|_| "PiCam".to_owned());
        let bind_addr = env::var("BIND_ADDR")
            .unwrap_or_else(|_| "0.0.0.0:5000".to_owned())
            .parse()
            .context("BIND_ADDR is not a socket address")?;
        let camera_driver = env::var("CAMERA_DRIVER")
            .unwrap_or_else(|_| "ffmpeg".to_owned())
            .parse()?;

        let camera_device = env::var("CAMERA_DEVICE").unwrap_or_else(|_| "/dev/video0".to_owned());
        let camera_input_format =
            env::var("CAMERA_INPUT_FORMAT").unwrap_or_else(|_| "mjpeg".to_owned());
        let ffmpeg_bin = env::var("FFMPEG_BIN").unwrap_or_else(|_| "ffmpeg".to_owned());
        let camera_vflip = env::var("CAMERA_VFLIP")
            .ok()
            .map(|v| matches!(v.trim().to_ascii_lowercase().as_str(), "1" | "true" | "yes"))
            .unwrap_or(true);

        let jpeg_quality = parsed_or("JPEG_QUALITY", DEFAULT_JPEG_QUALITY).clamp(1, 100);
        let stream_frame_interval = Duration::from_millis(
            parsed_or("STREAM_FRAME_INTERVAL_MS", DEFAULT_FRAME_INTERVAL.as_millis() as u64).max(1),
        );
        let supported_resolutions = match env::var("SUPPORTED_RESOLUTIONS") {
            Ok(raw) if !raw.trim().is_empty() => parse_resolutions(&raw)?,
            _ => DEFAULT_SUPPORTED_RESOLUTIONS.to_vec(),
        };
        let auto_stop_seconds = parsed_or("AUTO_STOP_SECONDS", 0);

        let log_dir = env::var("LOG_DIR").unwrap_or_else(|_| "logs".to_owned());
        let log_level = parsed_or("LOG_LEVEL", tracing::Level::INFO);

        Ok(Self {
            app_name,
            bind_addr,
            camera_driver,
            camera_device,
            camera_input_format,
            ffmpeg_bin,
            camera_vflip,
            jpeg_quality,
            stream_frame_interval,
            supported_resolutions,
            auto_stop_seconds,
            log_dir,
            log_level,
        })
    }
}

fn parsed_or<T: FromStr>(key: &str, default: T) -> T {
    env::var(key)
        .ok()
        .and_then(|v| v.trim().parse::<T>().ok())
        .unwrap_or(default)
}

fn parse_resolutions(raw: &str) -> anyhow::Result<Vec<Resolution>> {
    raw.split(',')
        .filter(|item| !item.trim().is_empty())
        .map(|item| {
            item.parse::<Resolution>()
                .with_context(|| format!("invalid SUPPORTED_RESOLUTIONS entry {item:?}"))
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use std::{
        fs,
        path::PathBuf,
        sync::{Mutex, OnceLock},
        time::{Duration, SystemTime, UNIX_EPOCH},
    };

    use crate::camera::settings::Resolution;

    use super::{AppConfig, DriverKind};

    static ENV_LOCK: OnceLock<Mutex<()>> = OnceLock::new();

    const KEYS: [&str; 10] = [
        "BIND_ADDR",
        "CAMERA_DRIVER",
        "CAMERA_DEVICE",
        "CAMERA_VFLIP",
        "FFMPEG_BIN",
        "JPEG_QUALITY",
        "STREAM_FRAME_INTERVAL_MS",
        "SUPPORTED_RESOLUTIONS",
        "AUTO_STOP_SECONDS",
        "LOG_LEVEL",
    ];

    fn lock_env() -> std::sync::MutexGuard<'static, ()> {
        let guard = ENV_LOCK
            .get_or_init(|| Mutex::new(()))
            .lock()
            .expect("failed to lock env mutex");
        for key in KEYS {
            remove_env(key);
        }
        guard
    }

    fn set_env(key: &str, value: &str) {
        unsafe { std::env::set_var(key, value) }
    }

    fn remove_env(key: &str) {
        unsafe { std::env::remove_var(key) }
    }

    #[test]
    fn from_env_uses_defaults() {
        let _guard = lock_env();

        let config = AppConfig::from_env().expect("config should parse");
        assert_eq!(config.bind_addr.port(), 5000);
        assert_eq!(config.camera_driver, DriverKind::Ffmpeg);
        assert_eq!(config.camera_device, "/dev/video0");
        assert_eq!(config.ffmpeg_bin, "ffmpeg");
        assert!(config.camera_vflip, "frames are flipped unless disabled");
        assert_eq!(config.jpeg_quality, 85);
        assert_eq!(config.stream_frame_interval, Duration::from_millis(33));
        assert_eq!(config.supported_resolutions.len(), 4);
        assert_eq!(config.auto_stop_seconds, 0);
        assert_eq!(config.log_level, tracing::Level::INFO);
    }

    #[test]
    fn from_env_reads_overrides() {
        let _guard = lock_env();
        set_env("CAMERA_DRIVER", "test-pattern");
        set_env("CAMERA_VFLIP", "false");
        set_env("JPEG_QUALITY", "250");
        set_env("STREAM_FRAME_INTERVAL_MS", "0");
        set_env("SUPPORTED_RESOLUTIONS", "640x480, 320x240");
        set_env("LOG_LEVEL", "debug");

        let config = AppConfig::from_env().expect("config should parse");
        assert_eq!(config.camera_driver, DriverKind::TestPattern);
        assert!(!config.camera_vflip);
        assert_eq!(config.jpeg_quality, 100);
        assert_eq!(config.stream_frame_interval, Duration::from_millis(1));
        assert_eq!(
            config.supported_resolutions,
            vec![
                Resolution {
                    width: 640,
                    height: 480
                },
                Resolution {
                    width: 320,
                    height: 240
                },
            ]
        );
        assert_eq!(config.log_level, tracing::Level::DEBUG);
    }

    #[test]
    fn from_env_rejects_unknown_driver() {
        let _guard = lock_env();
        set_env("CAMERA_DRIVER", "gstreamer");

        let err = AppConfig::from_env().expect_err("driver should be rejected");
        assert!(err.to_string().contains("unknown CAMERA_DRIVER"));
    }

    #[test]
    fn from_env_rejects_malformed_resolutions() {
        let _guard = lock_env();
        set_env("SUPPORTED_RESOLUTIONS", "640x480,wide");

        let err = AppConfig::from_env().expect_err("resolution list should be rejected");
        assert!(err.to_string().contains("\"wide\""));
    }

    #[test]
    fn from_env_reads_device_from_dotenv_file() {
        let _guard = lock_env();

        let suffix = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .expect("time should be monotonic")
            .as_nanos();
        let path: PathBuf = std::env::temp_dir().join(format!("picam-dotenv-{suffix}.env"));
        fs::write(&path, "CAMERA_DEVICE=/dev/video7\n")
            .expect("should write temporary dotenv file");

        dotenvy::from_path_override(&path).expect("dotenv file should load");
        let config = AppConfig::from_env().expect("config should parse");
        assert_eq!(config.camera_device, "/dev/video7");

        let _ = fs::remove_file(path);
    }
}
