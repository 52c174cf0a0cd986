pub mod annotation;
pub mod health;
pub mod kanji;
pub mod schedule;
pub mod sets;
pub mod units;

use axum::extract::DefaultBodyLimit;
use axum::http::StatusCode;
use axum::response::IntoResponse;
use axum::{Json, Router};

use crate::middleware::request_id;
use crate::response::{AppError, ErrorBody};
use crate::state::AppState;

/// Maximum request body size: 256 KiB.
const MAX_BODY_SIZE: usize = 256 * 1024;

pub fn build_router(state: AppState) -> Router {
    let api_routes = Router::new()
        .nest("/annotation", annotation::router())
        .nest("/sets", sets::router())
        .nest("/units", units::router())
        .nest("/kanji", kanji::router())
        .nest("/schedule", schedule::router())
        .layer(DefaultBodyLimit::max(MAX_BODY_SIZE));

    Router::new()
        .nest("/api", api_routes)
        .nest("/health", health::router())
        .fallback(fallback_404)
        .layer(axum::middleware::from_fn(request_id::request_id_middleware))
        .with_state(state)
}

async fn fallback_404() -> impl IntoResponse {
    (
        StatusCode::NOT_FOUND,
        Json(ErrorBody {
            success: false,
            code: "NOT_FOUND".to_string(),
            message: "Not found".to_string(),
            details: None,
            trace_id: None,
        }),
    )
}

/// Shared guard for every endpoint that accepts free text.
pub(crate) fn check_text_len(text: &str) -> Result<(), AppError> {
    if text.chars().count() > crate::constants::MAX_TEXT_CHARS {
        return Err(AppError::payload_too_large(&format!(
            "Text exceeds {} characters",
            crate::constants::MAX_TEXT_CHARS
        )));
    }
    Ok(())
}
