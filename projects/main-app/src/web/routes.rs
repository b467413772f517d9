use std::sync::Arc;

use axum::{
    Router,
    routing::{get, post},
};
use tower_http::trace::TraceLayer;

use crate::{app_state::AppState, camera::traits::CameraDriver};

use super::handlers;

pub fn build_router<D: CameraDriver>(state: Arc<AppState<D>>) -> Router {
    let camera_routes = Router::new()
        .route("/status", get(handlers::status::<D>))
        .route("/start", get(handlers::start::<D>).post(handlers::start::<D>))
        .route("/stop", get(handlers::stop::<D>).post(handlers::stop::<D>))
        .route(
            "/restart",
            get(handlers::restart::<D>).post(handlers::restart::<D>),
        )
        .route("/reset", get(handlers::reset::<D>).post(handlers::reset::<D>))
        .route("/capture", get(handlers::capture::<D>))
        .route("/update_settings", post(handlers::update_settings::<D>))
        .route("/stream", get(handlers::stream::<D>))
        .route(
            "/stream/stop",
            get(handlers::stream_stop::<D>).post(handlers::stream_stop::<D>),
        );

    Router::new()
        .route("/", get(handlers::health))
        .route("/health", get(handlers::health))
        .merge(camera_routes)
        .layer(TraceLayer::new_for_http())
        .with_state(state)
}
