use axum::extract::{Path, Query, State};
use axum::routing::get;
use axum::Router;
use serde::Deserialize;

use crate::constants::{DEFAULT_PAGE_SIZE, MAX_PAGE_SIZE};
use crate::extractors::JsonBody;
use crate::response::{created, ok, page, AppError};
use crate::state::AppState;
use crate::study::registry::KanjiRegistry;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_kanji).post(upsert_kanji))
        .route("/:id", get(get_kanji).put(update_kanji).delete(delete_kanji))
        .route("/:id/units", get(list_units))
}

#[derive(Debug, Default, Deserialize)]
struct ListKanjiQuery {
    search: Option<String>,
    after: Option<String>,
    limit: Option<usize>,
}

/// `search` wins over paging; otherwise pages walk newest to oldest from `after`.
async fn list_kanji(
    State(state): State<AppState>,
    Query(q): Query<ListKanjiQuery>,
) -> Result<axum::response::Response, AppError> {
    use axum::response::IntoResponse;

    if let Some(query) = q.search.as_deref() {
        return Ok(ok(state.registry().search(query)?).into_response());
    }

    let limit = q.limit.unwrap_or(DEFAULT_PAGE_SIZE).clamp(1, MAX_PAGE_SIZE);
    let anchor = match q.after.as_deref() {
        Some(after) => Some(state.registry().get(after)?),
        None => None,
    };
    let items = state.registry().paginate(anchor.as_ref(), limit)?;
    let next_after = if items.len() == limit {
        items.last().map(|kanji| kanji.id.clone())
    } else {
        None
    };
    let total = state.registry().count();
    Ok(page(items, next_after, total).into_response())
}

#[derive(Debug, Deserialize)]
struct UpsertKanjiRequest {
    character: String,
}

async fn upsert_kanji(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<UpsertKanjiRequest>,
) -> Result<impl axum::response::IntoResponse, AppError> {
    let character = KanjiRegistry::parse_character(&req.character)?;
    Ok(created(state.registry().upsert(character).await?))
}

async fn get_kanji(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl axum::response::IntoResponse, AppError> {
    Ok(ok(state.registry().get(&id)?))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateKanjiRequest {
    meaning: String,
    #[serde(default)]
    on_reading: String,
    #[serde(default)]
    kun_reading: String,
}

async fn update_kanji(
    State(state): State<AppState>,
    Path(id): Path<String>,
    JsonBody(req): JsonBody<UpdateKanjiRequest>,
) -> Result<impl axum::response::IntoResponse, AppError> {
    Ok(ok(state.registry().update_metadata(
        &id,
        &req.meaning,
        &req.on_reading,
        &req.kun_reading,
    )?))
}

async fn delete_kanji(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl axum::response::IntoResponse, AppError> {
    state.registry().delete(&id)?;
    Ok(ok(serde_json::json!({ "deleted": true })))
}

async fn list_units(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl axum::response::IntoResponse, AppError> {
    Ok(ok(state.graph().units_of_kanji(&id)?))
}
