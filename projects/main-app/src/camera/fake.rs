//! Scriptable in-memory device for tests.

use std::sync::{Arc, Mutex};

use anyhow::{Result, bail};
use async_trait::async_trait;

use super::{
    settings::Settings,
    traits::{CameraDriver, RawFrame},
};

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Primitive {
    Open,
    Configure,
    Start,
    Stop,
    Close,
    Capture,
}

#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct FakeCalls {
    pub opens: usize,
    pub configures: usize,
    pub starts: usize,
    pub stops: usize,
    pub closes: usize,
    pub captures: usize,
    pub live_handles: usize,
    pub max_live_handles: usize,
}

#[derive(Debug, Default)]
struct FakeInner {
    calls: FakeCalls,
    pending_failures: Vec<Primitive>,
    next_id: u64,
}

#[derive(Debug, Clone, Default)]
pub struct FakeDriver {
    inner: Arc<Mutex<FakeInner>>,
}

#[derive(Debug)]
pub struct FakeHandle {
    pub id: u64,
    settings: Option<Settings>,
    started: bool,
}

impl FakeDriver {
    pub fn new() -> Self {
        Self::default()
    }

    /// Makes the next `times` calls of `primitive` fail.
    pub fn fail_next(&self, primitive: Primitive, times: usize) {
        let mut inner = self.lock();
        inner
            .pending_failures
            .extend(std::iter::repeat_n(primitive, times));
    }

    pub fn calls(&self) -> FakeCalls {
        self.lock().calls.clone()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, FakeInner> {
        self.inner.lock().expect("fake driver mutex poisoned")
    }

    fn record(&self, primitive: Primitive) -> Result<()> {
        let mut inner = self.lock();
        let calls = &mut inner.calls;
        match primitive {
            Primitive::Open => calls.opens += 1,
            Primitive::Configure => calls.configures += 1,
            Primitive::Start => calls.starts += 1,
            Primitive::Stop => calls.stops += 1,
            Primitive::Close => calls.closes += 1,
            Primitive::Capture => calls.captures += 1,
        }
        if let Some(index) = inner.pending_failures.iter().position(|p| *p == primitive) {
            inner.pending_failures.remove(index);
            bail!("injected {primitive:?} failure");
        }
        Ok(())
    }
}

#[async_trait]
impl CameraDriver for FakeDriver {
    type Handle = FakeHandle;

    async fn open(&self) -> Result<FakeHandle> {
        self.record(Primitive::Open)?;
        let mut inner = self.lock();
        inner.next_id += 1;
        inner.calls.live_handles += 1;
        inner.calls.max_live_handles = inner.calls.max_live_handles.max(inner.calls.live_handles);
        Ok(FakeHandle {
            id: inner.next_id,
            settings: None,
            started: false,
        })
    }

    async fn configure(&self, handle: &mut FakeHandle, settings: &Settings) -> Result<()> {
        self.record(Primitive::Configure)?;
        handle.settings = Some(*settings);
        Ok(())
    }

    async fn start(&self, handle: &mut FakeHandle) -> Result<()> {
        self.record(Primitive::Start)?;
        handle.started = true;
        Ok(())
    }

    async fn stop(&self, handle: &mut FakeHandle) -> Result<()> {
        self.record(Primitive::Stop)?;
        handle.started = false;
        Ok(())
    }

    async fn close(&self, _handle: FakeHandle) -> Result<()> {
        // The handle is gone whether or not close reports an error.
        self.lock().calls.live_handles -= 1;
        self.record(Primitive::Close)
    }

    async fn capture_frame(&self, handle: &mut FakeHandle) -> Result<RawFrame> {
        self.record(Primitive::Capture)?;
        if !handle.started {
            bail!("capture on a stopped fake device");
        }
        let Some(settings) = handle.settings else {
            bail!("capture on an unconfigured fake device");
        };
        let mut frame = RawFrame {
            width: settings.resolution.width,
            height: settings.resolution.height,
            format: settings.pixel_format,
            data: Vec::new(),
        };
        frame.data = vec![0x80; frame.expected_len()];
        Ok(frame)
    }
}
