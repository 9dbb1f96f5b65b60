pub mod health;

use axum::{
    extract::DefaultBodyLimit,
    routing::{get, post},
    Router,
};

use crate::cv;
use crate::letter;
use crate::state::AppState;

/// Room for multipart boundaries, headers and the `language` field on top of
/// the document itself. The handler enforces the exact document ceiling.
const MULTIPART_OVERHEAD_BYTES: usize = 64 * 1024;

pub fn build_router(state: AppState) -> Router {
    let upload_limit = state.pipeline.max_upload_bytes() + MULTIPART_OVERHEAD_BYTES;

    Router::new()
        .route("/health", get(health::health_handler))
        .route(
            "/cv/auto-fill",
            post(cv::handlers::handle_auto_fill).layer(DefaultBodyLimit::max(upload_limit)),
        )
        .route("/letter/from-url", post(letter::handlers::handle_from_url))
        .with_state(state)
}
