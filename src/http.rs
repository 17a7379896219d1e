use crate::metrics::Metrics;
use crate::render;
use crate::snapshot::Snapshot;
use crate::stream::{client_stream, FrameHub};
use axum::body::Body;
use axum::extract::State;
use axum::http::header::{CACHE_CONTROL, CONNECTION, CONTENT_TYPE};
use axum::http::{HeaderName, HeaderValue, StatusCode};
use axum::response::sse::{KeepAlive, Sse};
use axum::response::{Html, IntoResponse, Response};
use axum::{routing::get, Json, Router};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::watch;

const X_ACCEL_BUFFERING: &str = "x-accel-buffering";

#[derive(Clone)]
pub struct HttpAppState {
    pub metrics: Arc<Metrics>,
    pub hub: Arc<FrameHub>,
    pub keep_alive: Duration,
    pub shutdown: watch::Receiver<bool>,
}

pub fn build_router(state: HttpAppState) -> Router {
    Router::new()
        .route("/", get(index_handler))
        .route("/stats", get(stats_handler))
        .route("/healthz", get(healthz))
        .route("/metrics", get(metrics_handler))
        .route("/api/snapshot", get(snapshot_handler))
        .with_state(state)
}

async fn index_handler() -> Html<&'static str> {
    Html(render::index_page())
}

async fn stats_handler(State(state): State<HttpAppState>) -> impl IntoResponse {
    let stream = client_stream(state.hub, state.metrics, state.shutdown);
    let sse = Sse::new(stream).keep_alive(KeepAlive::new().interval(state.keep_alive));
    (
        [
            (CACHE_CONTROL, "no-cache"),
            (CONNECTION, "keep-alive"),
            (HeaderName::from_static(X_ACCEL_BUFFERING), "no"),
        ],
        sse,
    )
}

async fn healthz() -> impl IntoResponse {
    (StatusCode::OK, "ok")
}

async fn metrics_handler(State(state): State<HttpAppState>) -> Response {
    state.metrics.inc_scrape_count();
    match state.metrics.encode_metrics() {
        Ok(encoded) => {
            let mut response = Response::new(Body::from(encoded));
            response.headers_mut().insert(
                CONTENT_TYPE,
                HeaderValue::from_static("text/plain; version=0.0.4"),
            );
            response
        }
        Err(err) => (
            StatusCode::INTERNAL_SERVER_ERROR,
            format!("failed to encode metrics: {err}"),
        )
            .into_response(),
    }
}

async fn snapshot_handler(State(state): State<HttpAppState>) -> Response {
    match state.hub.latest().await {
        Some(frame) => Json::<Snapshot>(frame.snapshot.clone()).into_response(),
        None => (StatusCode::SERVICE_UNAVAILABLE, "no snapshot sampled yet").into_response(),
    }
}
