use tracing::{info, warn};

use super::{
    error::{CameraError, DeviceOp},
    settings::Settings,
    traits::CameraDriver,
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RecoveryOutcome {
    /// Device-stop then device-start on the existing handle succeeded.
    Restarted,
    /// The handle was replaced by a freshly opened and configured one.
    Reinitialized,
}

/// Two ordered fallback tiers, each attempted at most once.
pub struct RecoveryPolicy<'a, D: CameraDriver> {
    driver: &'a D,
    settings: &'a Settings,
}

impl<'a, D: CameraDriver> RecoveryPolicy<'a, D> {
    pub fn new(driver: &'a D, settings: &'a Settings) -> Self {
        Self { driver, settings }
    }

    /// On exhaustion `slot` is left empty and the error carries both causes.
    pub async fn run(
        &self,
        slot: &mut Option<D::Handle>,
        device_running: bool,
    ) -> Result<RecoveryOutcome, CameraError> {
        let lightweight = match slot.as_mut() {
            Some(handle) => self.lightweight_restart(handle, device_running).await,
            None => Err(CameraError::invalid_state("no open handle")),
        };
        let first = match lightweight {
            Ok(()) => return Ok(RecoveryOutcome::Restarted),
            Err(err) => err,
        };
        warn!("lightweight restart failed, reinitializing: {first}");

        // full_reinitialize only fills the slot on success.
        let second = match self.full_reinitialize(slot).await {
            Ok(()) => return Ok(RecoveryOutcome::Reinitialized),
            Err(err) => err,
        };
        Err(CameraError::DeviceFault {
            op: DeviceOp::Restart,
            cause: format!("lightweight restart: {first}; full reinitialize: {second}"),
        })
    }

    async fn lightweight_restart(
        &self,
        handle: &mut D::Handle,
        device_running: bool,
    ) -> Result<(), CameraError> {
        if device_running {
            self.driver
                .stop(handle)
                .await
                .map_err(|err| CameraError::device_fault(DeviceOp::Stop, &err))?;
        }
        self.driver
            .start(handle)
            .await
            .map_err(|err| CameraError::device_fault(DeviceOp::Start, &err))?;
        info!("camera restarted on existing handle");
        Ok(())
    }

    async fn full_reinitialize(&self, slot: &mut Option<D::Handle>) -> Result<(), CameraError> {
        if let Some(old) = slot.take() {
            if let Err(err) = self.driver.close(old).await {
                warn!("device-close of faulty handle failed: {err:#}");
            }
        }

        let handle = open_and_start(self.driver, self.settings).await?;
        *slot = Some(handle);
        info!("camera reinitialized with a fresh handle");
        Ok(())
    }
}

/// Opens a new handle, configures it and starts capture. A handle that fails
/// half-way is closed before returning so no orphan stays open.
pub(super) async fn open_and_start<D: CameraDriver>(
    driver: &D,
    settings: &Settings,
) -> Result<D::Handle, CameraError> {
    let mut handle = driver
        .open()
        .await
        .map_err(|err| CameraError::device_fault(DeviceOp::Open, &err))?;
    if let Err(err) = configure_and_start(driver, &mut handle, settings).await {
        release(driver, handle, false).await;
        return Err(err);
    }
    Ok(handle)
}

pub(super) async fn configure_and_start<D: CameraDriver>(
    driver: &D,
    handle: &mut D::Handle,
    settings: &Settings,
) -> Result<(), CameraError> {
    driver
        .configure(handle, settings)
        .await
        .map_err(|err| CameraError::device_fault(DeviceOp::Configure, &err))?;
    driver
        .start(handle)
        .await
        .map_err(|err| CameraError::device_fault(DeviceOp::Start, &err))
}

/// Best-effort stop and close. Failures are logged, never returned.
pub(super) async fn release<D: CameraDriver>(driver: &D, mut handle: D::Handle, running: bool) {
    if running {
        if let Err(err) = driver.stop(&mut handle).await {
            warn!("device-stop during release failed: {err:#}");
        }
    }
    if let Err(err) = driver.close(handle).await {
        warn!("device-close during release failed: {err:#}");
    }
}
