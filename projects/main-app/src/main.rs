mod app_state;
mod camera;
mod config;
mod core;
mod web;

use std::{sync::Arc, time::Duration};

use app_state::AppState;
use camera::{
    ffmpeg_backend::FfmpegBackend, session::CameraSession, settings::SettingsManager,
    test_pattern::TestPatternDriver, traits::CameraDriver,
};
use config::{AppConfig, DriverKind};
use tokio::time::sleep;
use tracing::{error, info};
use tracing_appender::rolling;

const IDLE_CHECK_INTERVAL: Duration = Duration::from_secs(15);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let _ = dotenvy::dotenv();
    let config = AppConfig::from_env()?;

    tokio::fs::create_dir_all(&config.log_dir).await?;
    let file_appender = rolling::daily(&config.log_dir, "picam-server.log");
    let (non_blocking, _log_guard) = tracing_appender::non_blocking(file_appender);

    tracing_subscriber::fmt()
        .with_ansi(false)
        .with_writer(non_blocking)
        .with_max_level(config.log_level)
        .init();

    let settings_manager = SettingsManager::new(config.supported_resolutions.clone());
    match config.camera_driver {
        DriverKind::Ffmpeg => {
            let backend = FfmpegBackend::new(
                config.camera_device.clone(),
                config.camera_input_format.clone(),
            )
            .with_program(config.ffmpeg_bin.clone());
            serve(config, CameraSession::new(backend, settings_manager)).await
        }
        DriverKind::TestPattern => {
            serve(config, CameraSession::new(TestPatternDriver, settings_manager)).await
        }
    }
}

async fn serve<D: CameraDriver>(config: AppConfig, session: CameraSession<D>) -> anyhow::Result<()> {
    let state = Arc::new(AppState::new(config.clone(), session));
    let app = web::routes::build_router(state.clone());

    if config.auto_stop_seconds > 0 {
        let auto_state = state.clone();
        tokio::spawn(async move {
            loop {
                sleep(IDLE_CHECK_INTERVAL).await;
                auto_state.auto_stop_if_idle().await;
            }
        });
    }

    info!(
        "{} listening on {} (driver: {:?}, device: {})",
        config.app_name, config.bind_addr, config.camera_driver, config.camera_device
    );
    let listener = tokio::net::TcpListener::bind(config.bind_addr).await?;
    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal(state.clone()))
        .await?;

    state.session.shutdown().await;
    info!("{} stopped, camera released", config.app_name);
    Ok(())
}

/// Resolves on Ctrl-C or SIGTERM and ends any live stream so open stream
/// responses finish and graceful shutdown can complete.
async fn shutdown_signal<D: CameraDriver>(state: Arc<AppState<D>>) {
    let ctrl_c = async {
        if let Err(err) = tokio::signal::ctrl_c().await {
            error!("failed to listen for ctrl-c: {err}");
            std::future::pending::<()>().await;
        }
    };

    #[cfg(unix)]
    let terminate = async {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut signal) => {
                signal.recv().await;
            }
            Err(err) => {
                error!("failed to listen for SIGTERM: {err}");
                std::future::pending::<()>().await;
            }
        }
    };
    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {}
        _ = terminate => {}
    }

    info!("shutdown requested");
    state.session.end_stream();
}
