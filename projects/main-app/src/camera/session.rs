use std::sync::Arc;

use tokio::sync::{Mutex, watch};
use tracing::{error, info};

use crate::core::state::{SessionState, SessionStatus};

use super::{
    error::{CameraError, DeviceOp},
    recovery::{RecoveryOutcome, RecoveryPolicy, configure_and_start, open_and_start, release},
    settings::{Settings, SettingsManager, SettingsRequest},
    traits::{CameraDriver, RawFrame},
};

struct SessionInner<H> {
    state: SessionState,
    handle: Option<H>,
    /// Last settings the device accepted, or the defaults.
    settings: Settings,
}

/// Exclusive owner of the camera handle.
///
/// Every transition runs under one async mutex for the whole duration of its
/// hardware calls, so transitions never interleave. Captures hold the same
/// lock and are therefore serialized with each other and with transitions.
pub struct CameraSession<D: CameraDriver> {
    driver: D,
    settings_manager: SettingsManager,
    inner: Mutex<SessionInner<D::Handle>>,
    stream_flag: Arc<watch::Sender<bool>>,
}

/// Liveness signal held by the streaming loop. Dropping it clears the
/// session's stream flag.
pub struct StreamLease {
    flag: Arc<watch::Sender<bool>>,
    live: watch::Receiver<bool>,
}

impl StreamLease {
    pub fn is_live(&self) -> bool {
        *self.live.borrow()
    }

    /// Resolves once the stream flag has been cleared.
    pub async fn stopped(&mut self) {
        // The sender lives in `self.flag`, so the channel cannot close here.
        let _ = self.live.wait_for(|live| !*live).await;
    }
}

impl Drop for StreamLease {
    fn drop(&mut self) {
        self.flag.send_replace(false);
    }
}

impl<D: CameraDriver> CameraSession<D> {
    pub fn new(driver: D, settings_manager: SettingsManager) -> Self {
        let (stream_flag, _) = watch::channel(false);
        Self {
            inner: Mutex::new(SessionInner {
                state: SessionState::Uninitialized,
                handle: None,
                settings: settings_manager.defaults(),
            }),
            driver,
            settings_manager,
            stream_flag: Arc::new(stream_flag),
        }
    }

    pub fn settings_manager(&self) -> &SettingsManager {
        &self.settings_manager
    }

    pub async fn state(&self) -> SessionState {
        self.inner.lock().await.state
    }

    pub async fn status(&self) -> SessionStatus {
        let inner = self.inner.lock().await;
        SessionStatus {
            state: inner.state,
            settings: inner.settings,
            streaming: self.is_streaming(),
        }
    }

    /// No-op when already running, whatever `settings` says.
    pub async fn start(&self, settings: Settings) -> Result<SessionState, CameraError> {
        let mut inner = self.inner.lock().await;
        self.start_locked(&mut inner, settings).await?;
        Ok(inner.state)
    }

    /// Keeps the handle open so a later start skips device-open.
    pub async fn stop(&self) -> Result<SessionState, CameraError> {
        let mut inner = self.inner.lock().await;
        self.stream_flag.send_replace(false);
        if inner.state != SessionState::Running {
            return Ok(inner.state);
        }

        let result = match inner.handle.as_mut() {
            Some(handle) => self
                .driver
                .stop(handle)
                .await
                .map_err(|err| CameraError::device_fault(DeviceOp::Stop, &err)),
            None => Ok(()),
        };
        match result {
            Ok(()) => {
                inner.transition(SessionState::Stopped);
                Ok(inner.state)
            }
            Err(err) => {
                self.fault(&mut inner, &err).await;
                Err(err)
            }
        }
    }

    /// Drops the current handle regardless of its health and brings up a
    /// fresh one with default settings.
    pub async fn reset(&self) -> Result<SessionState, CameraError> {
        let mut inner = self.inner.lock().await;
        if let Some(handle) = inner.handle.take() {
            release(&self.driver, handle, true).await;
        }
        let defaults = self.settings_manager.defaults();
        inner.settings = defaults;
        inner.transition(SessionState::Uninitialized);

        self.start_locked(&mut inner, defaults).await?;
        Ok(inner.state)
    }

    pub async fn restart(&self) -> Result<RecoveryOutcome, CameraError> {
        let mut inner = self.inner.lock().await;
        if inner.state == SessionState::Uninitialized {
            return Err(CameraError::invalid_state("camera has never been started"));
        }

        let device_running = inner.state == SessionState::Running;
        let settings = inner.settings;
        let result = RecoveryPolicy::new(&self.driver, &settings)
            .run(&mut inner.handle, device_running)
            .await;
        match result {
            Ok(outcome) => {
                inner.transition(SessionState::Running);
                info!(?outcome, "camera recovered");
                Ok(outcome)
            }
            Err(err) => {
                inner.transition(SessionState::Faulted);
                error!("camera recovery exhausted: {err}");
                Err(err)
            }
        }
    }

    /// Validation happens before the lock is taken, so rejected settings never
    /// reach the device.
    pub async fn update_settings(&self, request: &SettingsRequest) -> Result<Settings, CameraError> {
        let settings = self.settings_manager.validate(request)?;

        let mut inner = self.inner.lock().await;
        match inner.state {
            SessionState::Uninitialized => {
                return Err(CameraError::invalid_state("camera has not been started"));
            }
            SessionState::Faulted => {
                return Err(CameraError::invalid_state(
                    "camera is faulted; restart or reset it first",
                ));
            }
            SessionState::Running | SessionState::Stopped => {}
        }

        let device_running = inner.state == SessionState::Running;
        let result = match inner.handle.as_mut() {
            Some(handle) => self.reconfigure(handle, &settings, device_running).await,
            None => Err(CameraError::invalid_state("camera has no open handle")),
        };
        match result {
            Ok(()) => {
                inner.settings = settings;
                inner.transition(SessionState::Running);
                info!(
                    resolution = %settings.resolution,
                    framerate = settings.framerate,
                    format = settings.pixel_format.as_str(),
                    "camera settings updated"
                );
                Ok(settings)
            }
            Err(err) => {
                self.fault(&mut inner, &err).await;
                Err(err)
            }
        }
    }

    /// Starts the camera with the last-known settings first if it is not
    /// running. A failed capture leaves the state untouched.
    pub async fn capture(&self) -> Result<RawFrame, CameraError> {
        let mut inner = self.inner.lock().await;
        if inner.state != SessionState::Running {
            info!(state = ?inner.state, "starting camera before capture");
            let settings = inner.settings;
            self.start_locked(&mut inner, settings).await?;
        }
        self.capture_locked(&mut inner).await
    }

    /// Capture path for the streaming loop: never starts the camera.
    pub async fn capture_live(&self) -> Result<RawFrame, CameraError> {
        let mut inner = self.inner.lock().await;
        if inner.state != SessionState::Running {
            return Err(CameraError::invalid_state("camera is not running"));
        }
        self.capture_locked(&mut inner).await
    }

    /// Raises the stream flag. A stream that is already live shares the same
    /// flag, so it keeps running until either lease ends or the flag is
    /// cleared.
    pub async fn begin_stream(&self) -> Result<StreamLease, CameraError> {
        let inner = self.inner.lock().await;
        if inner.state != SessionState::Running {
            return Err(CameraError::invalid_state("camera is not started"));
        }
        self.stream_flag.send_replace(true);
        Ok(StreamLease {
            flag: self.stream_flag.clone(),
            live: self.stream_flag.subscribe(),
        })
    }

    /// Returns whether a stream was live.
    pub fn end_stream(&self) -> bool {
        self.stream_flag.send_replace(false)
    }

    pub fn is_streaming(&self) -> bool {
        *self.stream_flag.borrow()
    }

    /// Releases the device for process exit.
    pub async fn shutdown(&self) {
        let mut inner = self.inner.lock().await;
        self.stream_flag.send_replace(false);
        let running = inner.state == SessionState::Running;
        if let Some(handle) = inner.handle.take() {
            release(&self.driver, handle, running).await;
        }
        inner.transition(SessionState::Uninitialized);
    }

    async fn start_locked(
        &self,
        inner: &mut SessionInner<D::Handle>,
        settings: Settings,
    ) -> Result<(), CameraError> {
        if inner.state == SessionState::Running {
            return Ok(());
        }

        let result = if let Some(handle) = inner.handle.as_mut() {
            configure_and_start(&self.driver, handle, &settings).await
        } else {
            open_and_start(&self.driver, &settings)
                .await
                .map(|handle| inner.handle = Some(handle))
        };
        match result {
            Ok(()) => {
                inner.settings = settings;
                inner.transition(SessionState::Running);
                Ok(())
            }
            Err(err) => {
                self.fault(inner, &err).await;
                Err(err)
            }
        }
    }

    async fn reconfigure(
        &self,
        handle: &mut D::Handle,
        settings: &Settings,
        device_running: bool,
    ) -> Result<(), CameraError> {
        if device_running {
            self.driver
                .stop(handle)
                .await
                .map_err(|err| CameraError::device_fault(DeviceOp::Stop, &err))?;
        }
        configure_and_start(&self.driver, handle, settings).await
    }

    async fn capture_locked(
        &self,
        inner: &mut SessionInner<D::Handle>,
    ) -> Result<RawFrame, CameraError> {
        let Some(handle) = inner.handle.as_mut() else {
            return Err(CameraError::invalid_state("camera has no open handle"));
        };
        self.driver
            .capture_frame(handle)
            .await
            .map_err(|err| CameraError::device_fault(DeviceOp::Capture, &err))
    }

    async fn fault(&self, inner: &mut SessionInner<D::Handle>, cause: &CameraError) {
        if let Some(handle) = inner.handle.take() {
            release(&self.driver, handle, false).await;
        }
        inner.transition(SessionState::Faulted);
        error!("camera faulted: {cause}");
    }
}

impl<H> SessionInner<H> {
    fn transition(&mut self, to: SessionState) {
        if self.state != to {
            info!(from = ?self.state, to = ?to, "camera session state changed");
        }
        self.state = to;
    }
}
