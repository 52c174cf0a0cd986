use axum::extract::State;
use axum::routing::post;
use axum::Router;
use serde::{Deserialize, Serialize};

use crate::extractors::JsonBody;
use crate::response::{ok, AppError};
use crate::routes::check_text_len;
use crate::state::AppState;
use crate::study::annotation::{
    auto_annotate, parse_annotated, replace_reading, strip_to_plain_text, to_annotated_string, Huri,
};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/parse", post(parse))
        .route("/render", post(render))
        .route("/strip", post(strip))
        .route("/convert", post(convert))
        .route("/replace-reading", post(replace))
}

#[derive(Debug, Deserialize)]
struct TextRequest {
    text: String,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct AnnotatedResponse {
    text: String,
    segments: Vec<Huri>,
}

async fn parse(
    JsonBody(req): JsonBody<TextRequest>,
) -> Result<impl axum::response::IntoResponse, AppError> {
    check_text_len(&req.text)?;
    Ok(ok(parse_annotated(&req.text)?))
}

#[derive(Debug, Deserialize)]
struct RenderRequest {
    segments: Vec<Huri>,
}

/// Segments from the client are re-validated before rendering.
async fn render(
    JsonBody(req): JsonBody<RenderRequest>,
) -> Result<impl axum::response::IntoResponse, AppError> {
    let segments = req
        .segments
        .into_iter()
        .map(|huri| {
            let source = huri.source;
            Huri::annotated(huri.id, huri.base, huri.reading).map(|mut checked| {
                checked.source = source;
                checked
            })
        })
        .collect::<Result<Vec<_>, _>>()?;
    let text = to_annotated_string(&segments);
    check_text_len(&text)?;
    Ok(ok(AnnotatedResponse { text, segments }))
}

async fn strip(
    JsonBody(req): JsonBody<TextRequest>,
) -> Result<impl axum::response::IntoResponse, AppError> {
    check_text_len(&req.text)?;
    Ok(ok(serde_json::json!({ "text": strip_to_plain_text(&req.text)? })))
}

async fn convert(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<TextRequest>,
) -> Result<impl axum::response::IntoResponse, AppError> {
    check_text_len(&req.text)?;
    let segments = auto_annotate(&req.text, state.analyzer()).await?;
    Ok(ok(AnnotatedResponse {
        text: to_annotated_string(&segments),
        segments,
    }))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ReplaceReadingRequest {
    text: String,
    target_id: usize,
    reading: String,
}

async fn replace(
    JsonBody(req): JsonBody<ReplaceReadingRequest>,
) -> Result<impl axum::response::IntoResponse, AppError> {
    check_text_len(&req.text)?;
    let segments = parse_annotated(&req.text)?;
    let segments = replace_reading(&segments, req.target_id, &req.reading)?;
    Ok(ok(AnnotatedResponse {
        text: to_annotated_string(&segments),
        segments,
    }))
}
