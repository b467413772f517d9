use std::{sync::Arc, time::Duration};

use bytes::{Bytes, BytesMut};
use tokio::{
    sync::mpsc,
    time::{self, MissedTickBehavior},
};
use tracing::{info, warn};

use super::{
    error::CameraError,
    jpeg::FrameEncoder,
    session::{CameraSession, StreamLease},
    traits::CameraDriver,
};

pub const DEFAULT_FRAME_INTERVAL: Duration = Duration::from_millis(33);
pub const STREAM_CONTENT_TYPE: &str = "multipart/x-mixed-replace; boundary=frame";

const PART_HEADER: &[u8] = b"--frame\r\nContent-Type: image/jpeg\r\n\r\n";

pub fn multipart_part(jpeg: &[u8]) -> Bytes {
    let mut part = BytesMut::with_capacity(PART_HEADER.len() + jpeg.len() + 2);
    part.extend_from_slice(PART_HEADER);
    part.extend_from_slice(jpeg);
    part.extend_from_slice(b"\r\n");
    part.freeze()
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum StreamEnd {
    Stopped,
    ConsumerGone,
    CaptureFailed,
    EncodeFailed,
}

/// Background producer that captures, encodes and emits one multipart part
/// per frame interval while the session's stream flag is raised.
pub struct StreamingLoop<D: CameraDriver> {
    session: Arc<CameraSession<D>>,
    encoder: FrameEncoder,
    frame_interval: Duration,
}

impl<D: CameraDriver> StreamingLoop<D> {
    pub fn new(session: Arc<CameraSession<D>>, encoder: FrameEncoder, frame_interval: Duration) -> Self {
        Self {
            session,
            encoder,
            frame_interval,
        }
    }

    /// Fails with `InvalidState` unless the camera is running. Parts are
    /// handed over through a single-slot channel, so a slow reader throttles
    /// capture instead of queueing frames.
    pub async fn spawn(self) -> Result<mpsc::Receiver<Bytes>, CameraError> {
        let lease = self.session.begin_stream().await?;
        let (tx, rx) = mpsc::channel(1);
        tokio::spawn(self.run(lease, tx));
        Ok(rx)
    }

    async fn run(self, mut lease: StreamLease, tx: mpsc::Sender<Bytes>) {
        info!(
            interval_ms = self.frame_interval.as_millis() as u64,
            "stream session opened"
        );
        let mut ticker = time::interval(self.frame_interval);
        ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);
        let mut frames: u64 = 0;

        let end = loop {
            tokio::select! {
                biased;
                _ = lease.stopped() => break StreamEnd::Stopped,
                _ = tx.closed() => break StreamEnd::ConsumerGone,
                _ = ticker.tick() => {}
            }

            let frame = match self.session.capture_live().await {
                Ok(frame) => frame,
                Err(_) if !lease.is_live() => break StreamEnd::Stopped,
                Err(err) => {
                    warn!("stream capture failed: {err}");
                    break StreamEnd::CaptureFailed;
                }
            };
            let jpeg = match self.encoder.encode_owned(frame).await {
                Ok(jpeg) => jpeg,
                Err(err) => {
                    warn!("stream encode failed: {err:#}");
                    break StreamEnd::EncodeFailed;
                }
            };

            if !lease.is_live() {
                break StreamEnd::Stopped;
            }
            tokio::select! {
                biased;
                _ = lease.stopped() => break StreamEnd::Stopped,
                sent = tx.send(multipart_part(&jpeg)) => {
                    if sent.is_err() {
                        break StreamEnd::ConsumerGone;
                    }
                }
            }
            frames += 1;
        };

        // Clears the stream flag on every exit path.
        drop(lease);
        info!(frames, reason = ?end, "stream session closed");
    }
}

#[cfg(test)]
mod tests {
    use std::{sync::Arc, time::Duration};

    use tokio::time::{Instant, sleep, timeout};

    use crate::{
        camera::{
            error::CameraError,
            fake::{FakeDriver, Primitive},
            jpeg::FrameEncoder,
            session::CameraSession,
            settings::{Resolution, Settings, SettingsManager},
        },
        core::state::SessionState,
    };

    use super::{StreamingLoop, multipart_part};

    const INTERVAL: Duration = Duration::from_millis(10);
    const STOP_SLACK: Duration = Duration::from_millis(100);

    async fn running_session() -> (Arc<CameraSession<FakeDriver>>, FakeDriver) {
        let driver = FakeDriver::new();
        let session = Arc::new(CameraSession::new(
            driver.clone(),
            SettingsManager::default(),
        ));
        let settings = Settings {
            resolution: Resolution {
                width: 64,
                height: 48,
            },
            ..Settings::default()
        };
        session.start(settings).await.expect("start");
        (session, driver)
    }

    fn streaming_loop(session: &Arc<CameraSession<FakeDriver>>) -> StreamingLoop<FakeDriver> {
        StreamingLoop::new(session.clone(), FrameEncoder::default(), INTERVAL)
    }

    async fn wait_until_not_streaming(session: &CameraSession<FakeDriver>) {
        let deadline = Instant::now() + Duration::from_secs(5);
        while session.is_streaming() {
            assert!(Instant::now() < deadline, "stream flag was never cleared");
            sleep(Duration::from_millis(5)).await;
        }
    }

    #[test]
    fn part_uses_frame_boundary() {
        let part = multipart_part(b"JPEG");
        assert_eq!(
            &part[..],
            b"--frame\r\nContent-Type: image/jpeg\r\n\r\nJPEG\r\n"
        );
    }

    #[tokio::test]
    async fn emits_parts_until_stopped() {
        let (session, _driver) = running_session().await;
        let mut rx = streaming_loop(&session).spawn().await.expect("stream");

        for _ in 0..3 {
            let part = timeout(Duration::from_secs(5), rx.recv())
                .await
                .expect("part should arrive")
                .expect("stream should be open");
            assert!(part.starts_with(b"--frame\r\nContent-Type: image/jpeg\r\n\r\n\xFF\xD8"));
            assert!(part.ends_with(b"\xFF\xD9\r\n"));
        }

        assert!(session.end_stream());
        let stopped_at = Instant::now();

        // At most the part already sitting in the channel slot may follow.
        let mut late = 0;
        timeout(Duration::from_secs(5), async {
            while rx.recv().await.is_some() {
                late += 1;
            }
        })
        .await
        .expect("stream should close after stop");
        let closed_after = stopped_at.elapsed();
        assert!(late <= 1, "{late} parts arrived after stop");
        assert!(
            closed_after <= INTERVAL + STOP_SLACK,
            "stream closed {closed_after:?} after stop"
        );
        assert!(!session.is_streaming());
        assert_eq!(session.state().await, SessionState::Running);
    }

    #[tokio::test]
    async fn capture_failure_ends_the_stream() {
        let (session, driver) = running_session().await;
        driver.fail_next(Primitive::Capture, 1);

        let mut rx = streaming_loop(&session).spawn().await.expect("stream");

        let next = timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("stream should end");
        assert!(next.is_none());
        assert!(!session.is_streaming());
        assert_eq!(session.state().await, SessionState::Running);
    }

    #[tokio::test]
    async fn consumer_disconnect_clears_the_flag() {
        let (session, driver) = running_session().await;
        let mut rx = streaming_loop(&session).spawn().await.expect("stream");
        timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("part should arrive")
            .expect("stream should be open");

        drop(rx);

        wait_until_not_streaming(&session).await;
        let captures = driver.calls().captures;
        sleep(INTERVAL * 5).await;
        assert!(driver.calls().captures <= captures + 1);
    }

    #[tokio::test]
    async fn stopping_the_camera_ends_the_stream() {
        let (session, driver) = running_session().await;
        let mut rx = streaming_loop(&session).spawn().await.expect("stream");
        timeout(Duration::from_secs(5), rx.recv())
            .await
            .expect("part should arrive")
            .expect("stream should be open");

        session.stop().await.expect("stop");

        timeout(Duration::from_secs(5), async { while rx.recv().await.is_some() {} })
            .await
            .expect("stream should close");
        assert_eq!(session.state().await, SessionState::Stopped);
        assert_eq!(driver.calls().opens, 1, "loop must not restart the camera");
    }

    #[tokio::test]
    async fn stream_requires_a_running_camera() {
        let driver = FakeDriver::new();
        let session = Arc::new(CameraSession::new(driver, SettingsManager::default()));

        let result = streaming_loop(&session).spawn().await;

        assert!(matches!(result, Err(CameraError::InvalidState(_))));
        assert!(!session.is_streaming());
    }
}
