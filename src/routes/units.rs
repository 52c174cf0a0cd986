use axum::extract::{Path, State};
use axum::routing::{get, post, put};
use axum::Router;
use serde::{Deserialize, Serialize};

use crate::extractors::JsonBody;
use crate::response::{created, ok, AppError};
use crate::routes::check_text_len;
use crate::state::AppState;
use crate::store::operations::units::{StudyState, StudyUnit};
use crate::study::extractor::KanjiDiff;
use crate::study::graph::NewUnit;

pub fn router() -> Router<AppState> {
    Router::new()
        .route("/", post(create_unit))
        .route("/:id", get(get_unit).put(update_unit).delete(delete_unit))
        .route("/:id/study-state", put(update_study_state))
        .route("/:id/kanji", get(list_kanji))
        .route("/:id/sets", get(list_sets))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct CreateUnitRequest {
    #[serde(flatten)]
    unit: NewUnit,
    set_id: Option<String>,
}

async fn create_unit(
    State(state): State<AppState>,
    JsonBody(req): JsonBody<CreateUnitRequest>,
) -> Result<impl axum::response::IntoResponse, AppError> {
    check_text_len(&req.unit.kanji_text)?;
    let unit = state
        .graph()
        .insert_unit(req.unit, req.set_id.as_deref())
        .await?;
    state.learned_readings().learn_annotated(&unit.kanji_text);
    Ok(created(unit))
}

async fn get_unit(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl axum::response::IntoResponse, AppError> {
    Ok(ok(state.graph().get_unit(&id)?))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct UpdateUnitRequest {
    kanji_text: Option<String>,
    meaning_text: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
struct UpdateUnitResponse {
    unit: StudyUnit,
    kanji_diff: Option<KanjiDiff>,
}

async fn update_unit(
    State(state): State<AppState>,
    Path(id): Path<String>,
    JsonBody(req): JsonBody<UpdateUnitRequest>,
) -> Result<impl axum::response::IntoResponse, AppError> {
    if req.kanji_text.is_none() && req.meaning_text.is_none() {
        return Err(AppError::bad_request(
            "VALIDATION_ERROR",
            "Provide kanjiText or meaningText",
        ));
    }

    if let Some(text) = req.kanji_text.as_deref() {
        check_text_len(text)?;
    }
    let (unit, diff) = state
        .graph()
        .edit_unit(&id, req.kanji_text.as_deref(), req.meaning_text.as_deref())
        .await?;
    let kanji_diff = req.kanji_text.is_some().then_some(diff);
    if kanji_diff.is_some() {
        state.learned_readings().learn_annotated(&unit.kanji_text);
    }

    Ok(ok(UpdateUnitResponse { unit, kanji_diff }))
}

async fn delete_unit(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl axum::response::IntoResponse, AppError> {
    state.graph().delete_unit(&id)?;
    Ok(ok(serde_json::json!({ "deleted": true })))
}

#[derive(Debug, Deserialize)]
#[serde(rename_all = "camelCase")]
struct StudyStateRequest {
    study_state: StudyState,
}

async fn update_study_state(
    State(state): State<AppState>,
    Path(id): Path<String>,
    JsonBody(req): JsonBody<StudyStateRequest>,
) -> Result<impl axum::response::IntoResponse, AppError> {
    Ok(ok(state.graph().set_study_state(&id, req.study_state)?))
}

async fn list_kanji(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl axum::response::IntoResponse, AppError> {
    Ok(ok(state.graph().kanji_of_unit(&id)?))
}

async fn list_sets(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<impl axum::response::IntoResponse, AppError> {
    Ok(ok(state.graph().sets_of_unit(&id)?))
}
