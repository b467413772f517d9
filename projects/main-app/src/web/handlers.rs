use std::{convert::Infallible, sync::Arc};

use axum::{
    Json,
    body::Body,
    extract::{State, rejection::JsonRejection},
    http::{
        HeaderMap, HeaderValue, StatusCode,
        header::{CACHE_CONTROL, CONTENT_TYPE},
    },
    response::{IntoResponse, Response},
};
use serde::Serialize;
use tokio_stream::{StreamExt, wrappers::ReceiverStream};
use tracing::info;

use crate::{
    app_state::AppState,
    camera::{
        error::CameraError,
        recovery::RecoveryOutcome,
        settings::{Settings, SettingsRequest},
        stream::STREAM_CONTENT_TYPE,
        traits::CameraDriver,
    },
    core::{
        errors::AppError,
        state::{SessionState, SessionStatus},
    },
};

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    status: &'static str,
}

#[derive(Debug, Serialize)]
pub struct ActionResponse {
    message: &'static str,
    state: SessionState,
}

#[derive(Debug, Serialize)]
pub struct SettingsResponse {
    message: &'static str,
    settings: Settings,
}

fn action(message: &'static str, state: SessionState) -> Json<ActionResponse> {
    Json(ActionResponse { message, state })
}

pub async fn health() -> Json<HealthResponse> {
    Json(HealthResponse { status: "ok" })
}

pub async fn status<D: CameraDriver>(State(state): State<Arc<AppState<D>>>) -> Json<SessionStatus> {
    Json(state.session.status().await)
}

pub async fn start<D: CameraDriver>(
    State(state): State<Arc<AppState<D>>>,
) -> Result<Json<ActionResponse>, AppError> {
    let defaults = state.session.settings_manager().defaults();
    let session_state = state.session.start(defaults).await?;
    state.update_activity().await;
    info!("camera start requested");
    Ok(action("Camera started", session_state))
}

pub async fn stop<D: CameraDriver>(
    State(state): State<Arc<AppState<D>>>,
) -> Result<Json<ActionResponse>, AppError> {
    let session_state = state.session.stop().await?;
    state.update_activity().await;
    info!("camera stop requested");
    Ok(action("Camera stopped", session_state))
}

pub async fn restart<D: CameraDriver>(
    State(state): State<Arc<AppState<D>>>,
) -> Result<Json<ActionResponse>, AppError> {
    let outcome = state.session.restart().await?;
    state.update_activity().await;
    let message = match outcome {
        RecoveryOutcome::Restarted => "Camera restarted",
        RecoveryOutcome::Reinitialized => "Camera reinitialized",
    };
    Ok(action(message, SessionState::Running))
}

pub async fn reset<D: CameraDriver>(
    State(state): State<Arc<AppState<D>>>,
) -> Result<Json<ActionResponse>, AppError> {
    let session_state = state.session.reset().await?;
    state.update_activity().await;
    info!("camera reset requested");
    Ok(action("Camera reset", session_state))
}

pub async fn update_settings<D: CameraDriver>(
    State(state): State<Arc<AppState<D>>>,
    payload: Result<Json<SettingsRequest>, JsonRejection>,
) -> Result<Json<SettingsResponse>, AppError> {
    let Json(request) = payload.map_err(|rejection| {
        AppError::new(
            StatusCode::BAD_REQUEST,
            "validation_error",
            format!("invalid settings body: {}", rejection.body_text()),
        )
    })?;
    let settings = state.session.update_settings(&request).await?;
    state.update_activity().await;
    Ok(Json(SettingsResponse {
        message: "Settings updated",
        settings,
    }))
}

pub async fn capture<D: CameraDriver>(
    State(state): State<Arc<AppState<D>>>,
) -> Result<Response, AppError> {
    let frame = state.session.capture().await.map_err(|err| match err {
        CameraError::InvalidState(_) => AppError::bad_request(err),
        err if err.is_startup_fault() => AppError::bad_request(err),
        err => AppError::from(err),
    })?;
    let jpeg = state.encoder.encode_owned(frame).await?;
    state.update_activity().await;
    info!("frame captured ({} bytes)", jpeg.len());

    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static("image/jpeg"));
    headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-store"));

    Ok((StatusCode::OK, headers, jpeg).into_response())
}

pub async fn stream<D: CameraDriver>(
    State(state): State<Arc<AppState<D>>>,
) -> Result<Response, AppError> {
    let parts = state.streaming_loop().spawn().await?;
    state.update_activity().await;

    let mut headers = HeaderMap::new();
    headers.insert(CONTENT_TYPE, HeaderValue::from_static(STREAM_CONTENT_TYPE));
    headers.insert(CACHE_CONTROL, HeaderValue::from_static("no-store"));

    let body = Body::from_stream(ReceiverStream::new(parts).map(Ok::<_, Infallible>));
    Ok((StatusCode::OK, headers, body).into_response())
}

pub async fn stream_stop<D: CameraDriver>(
    State(state): State<Arc<AppState<D>>>,
) -> Json<ActionResponse> {
    if state.session.end_stream() {
        info!("stream stop requested");
    }
    action("Stream stopped", state.session.state().await)
}
