use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use tokio::sync::Mutex;
use tracing::{error, info};

use crate::{
    camera::{jpeg::FrameEncoder, session::CameraSession, stream::StreamingLoop, traits::CameraDriver},
    config::AppConfig,
    core::state::{SessionState, SessionStatus},
};

pub struct AppState<D: CameraDriver> {
    pub config: AppConfig,
    pub session: Arc<CameraSession<D>>,
    pub encoder: FrameEncoder,
    last_activity: Mutex<Instant>,
}

impl<D: CameraDriver> AppState<D> {
    pub fn new(config: AppConfig, session: CameraSession<D>) -> Self {
        let encoder = FrameEncoder::new(config.jpeg_quality, config.camera_vflip);
        Self {
            config,
            session: Arc::new(session),
            encoder,
            last_activity: Mutex::new(Instant::now()),
        }
    }

    pub async fn update_activity(&self) {
        let mut last_activity = self.last_activity.lock().await;
        *last_activity = Instant::now();
    }

    pub async fn idle_for(&self) -> Duration {
        let last_activity = self.last_activity.lock().await;
        last_activity.elapsed()
    }

    pub fn streaming_loop(&self) -> StreamingLoop<D> {
        StreamingLoop::new(
            self.session.clone(),
            self.encoder,
            self.config.stream_frame_interval,
        )
    }

    /// Stops an idle, non-streaming camera. Returns whether it stopped one.
    pub async fn auto_stop_if_idle(&self) -> bool {
        let idle = self.idle_for().await;
        let status = self.session.status().await;
        if !should_auto_stop(idle, self.config.auto_stop_seconds, &status) {
            return false;
        }

        info!("auto stop triggered after {} seconds idle", idle.as_secs());
        match self.session.stop().await {
            Ok(_) => true,
            Err(err) => {
                error!("failed to auto stop camera: {err}");
                false
            }
        }
    }
}

fn should_auto_stop(idle: Duration, limit_seconds: u64, status: &SessionStatus) -> bool {
    limit_seconds > 0
        && idle.as_secs() > limit_seconds
        && status.state == SessionState::Running
        && !status.streaming
}
