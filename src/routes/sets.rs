use axum::extract::{Path, Query, State};
use axum::routing::{delete, get, post};
use axum::Router;
use serde::Deserialize;

use crate::constants::MAX_MOVE_BATCH;
use crate::extractors::JsonBody;
use crate::response::{created, ok, AppError};
use crate::state::AppState;
use crate::study::graph::{NewSet, SetPatch};

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", get(list_sets).post(create_set))
        .route("/:id", get(get_set).put(update_set).delete(delete_set))
        .route("/:id/units", get(list_units).post(link_unit))
        .route("/:id/units/:unit_id", delete(unlink_unit))
        .route("/:id/move", post(move_units))
        .route("/:id/kanji", get(list_kanji).post(link_kanji))
        .route("/:id/kanji/:kanji_id", delete(unlink_kanji))
}

#[derive(Debug, Default, Deserialize)]
#[serde(rename_all = "camelCase")]
struct ListSetsQuery {
    #[serde(default)]
    include_closed: bool,
}

async fn list_sets(
    State(state): State<AppState>,
    Query(q): Query<ListSetsQuery>,
) -> Result<impl axum::response::IntoResponse, AppError> {
    Ok(ok(state.graph().list_sets(q.include_closed)?))
}

async fn create_set(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<NewSet>,
) -> Result<impl axum::response::IntoResponse, AppError> {
    Ok(created(state.graph().create_set(req)?))
}

async fn get_set(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl axum::response::IntoResponse, AppError> {
    Ok(ok(state.graph().get_set(&id)?))
}

async fn update_set(
    State(state): State<AppState>,
    Path(id): Path<String>,
    JsonBody(patch): JsonBody<SetPatch>,
) -> Result<impl axum::response::IntoResponse, AppError> {
    Ok(ok(state.graph().update_set(&id, patch)?))
}

async fn delete_set(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl axum::response::IntoResponse, AppError> {
    state.graph().delete_set(&id)?;
    Ok(ok(serde_json::json!({ "deleted": true })))
}

async fn list_units(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl axum::response::IntoResponse, AppError> {
    Ok(ok(state.graph().units_in_set(&id)?))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LinkUnitRequest {
    unit_id: String,
}

async fn link_unit(
    State(state): State<AppState>,
    Path(id): Path<String>,
    JsonBody(req): JsonBody<LinkUnitRequest>,
) -> Result<impl axum::response::IntoResponse, AppError> {
    let linked = state.graph().link_unit_to_set(&id, &req.unit_id)?;
    Ok(ok(serde_json::json!({ "linked": linked })))
}

async fn unlink_unit(
    State(state): State<AppState>,
    Path((id, unit_id)): Path<(String, String)>,
) -> Result<impl axum::response::IntoResponse, AppError> {
    let unlinked = state.graph().unlink_unit_from_set(&id, &unit_id)?;
    Ok(ok(serde_json::json!({ "unlinked": unlinked })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct MoveUnitsRequest {
    unit_ids: Vec<String>,
    to_set_id: String,
}

async fn move_units(
    State(state): State<AppState>,
    Path(id): Path<String>,
    JsonBody(req): JsonBody<MoveUnitsRequest>,
) -> Result<impl axum::response::IntoResponse, AppError> {
    if req.unit_ids.is_empty() {
        return Err(AppError::bad_request("VALIDATION_ERROR", "unitIds must not be empty"));
    }
    if req.unit_ids.len() > MAX_MOVE_BATCH {
        return Err(AppError::bad_request(
            "VALIDATION_ERROR",
            &format!("At most {MAX_MOVE_BATCH} units can be moved at once"),
        ));
    }
    let moved = state.graph().move_units(&req.unit_ids, &id, &req.to_set_id)?;
    Ok(ok(serde_json::json!({ "moved": moved })))
}

async fn list_kanji(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl axum::response::IntoResponse, AppError> {
    Ok(ok(state.graph().kanji_in_set(&id)?))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct LinkKanjiRequest {
    kanji_id: String,
}

async fn link_kanji(
    State(state): State<AppState>,
    Path(id): Path<String>,
    JsonBody(req): JsonBody<LinkKanjiRequest>,
) -> Result<impl axum::response::IntoResponse, AppError> {
    let linked = state.graph().link_kanji_to_set(&id, &req.kanji_id)?;
    Ok(ok(serde_json::json!({ "linked": linked })))
}

async fn unlink_kanji(
    State(state): State<AppState>,
    Path((id, kanji_id)): Path<(String, String)>,
) -> Result<impl axum::response::IntoResponse, AppError> {
    let unlinked = state.graph().unlink_kanji_from_set(&id, &kanji_id)?;
    Ok(ok(serde_json::json!({ "unlinked": unlinked })))
}
