use axum::extract::{Path, State};
use axum::routing::{get, post, put};
use axum::Router;
use serde::Deserialize;

use crate::extractors::JsonBody;
use crate::response::{ok, AppError};
use crate::state::AppState;
use crate::store::operations::schedule::ScheduleState;
use crate::study::scheduler::ScheduleItem;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/today", get(today))
        .route("/state", get(get_state).put(merge_state))
        .route("/overrides", put(apply_overrides))
        .route("/reviewed/:id", post(mark_reviewed))
        .route("/clear", post(clear))
}

/// Buckets over every open set.
async fn today(State(state): State<AppState>) -> Result<impl axum::response::IntoResponse, AppError> {
    let items: Vec<ScheduleItem> = state
        .graph()
        .list_sets(false)?
        .iter()
        .map(ScheduleItem::from)
        .collect();
    Ok(ok(state.scheduler().today(&items)?))
}

async fn get_state(State(state): State<AppState>) -> Result<impl axum::response::IntoResponse, AppError> {
    Ok(ok(state.scheduler().state()?))
}

/// Last-write-wins sync of a blob written elsewhere.
async fn merge_state(
    State(state): State<AppState>,
    JsonBody(remote): JsonBody<ScheduleState>,
) -> Result<impl axum::response::IntoResponse, AppError> {
    Ok(ok(state.scheduler().merge_remote(remote)?))
}

#[derive(Debug, Deserialize)]
struct OverridesRequest {
    #[serde(default, rename = "studyIDs")]
    study_ids: Vec<String>,
    #[serde(default, rename = "reviewIDs")]
    review_ids: Vec<String>,
}

async fn apply_overrides(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<OverridesRequest>,
) -> Result<impl axum::response::IntoResponse, AppError> {
    for id in req.study_ids.iter().chain(&req.review_ids) {
        state.graph().get_set(id)?;
    }
    Ok(ok(state.scheduler().apply_overrides(&req.study_ids, &req.review_ids)?))
}

async fn mark_reviewed(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl axum::response::IntoResponse, AppError> {
    let set = state.graph().get_set(&id)?;
    Ok(ok(state.scheduler().mark_reviewed(&ScheduleItem::from(&set))?))
}

async fn clear(State(state): State<AppState>) -> Result<impl axum::response::IntoResponse, AppError> {
    Ok(ok(state.scheduler().clear()?))
}
