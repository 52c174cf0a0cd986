mod common;

use axum::http::{Method, StatusCode};
use serde_json::json;

use common::app::spawn_test_app;
use common::fixtures::{create_set, create_unit, unit_kanji};
use common::http::{assert_json_error, assert_status_ok_json, call};

#[tokio::test]
async fn it_insert_links_every_kanji_once() {
    let app = spawn_test_app().await;
    let unit = create_unit(&app.app, "日本⟨にほん⟩␟語⟨ご⟩␟の␟日本⟨にほん⟩", None).await;
    let unit_id = unit["id"].as_str().unwrap();

    assert_eq!(unit_kanji(&app.app, unit_id).await, vec!["日", "本", "語"]);
    assert_eq!(app.state.registry().count(), 3);
}

#[tokio::test]
async fn it_text_edit_relinks_by_diff() {
    let app = spawn_test_app().await;
    let unit = create_unit(&app.app, "大丈夫⟨だいじょうぶ⟩", None).await;
    let unit_id = unit["id"].as_str().unwrap();

    let (status, body) = call(
        &app.app,
        Method::PUT,
        &format!("/api/units/{unit_id}"),
        Some(json!({ "kanjiText": "丈夫⟨じょうぶ⟩" })),
    )
    .await;
    assert_status_ok_json(status, &body);
    assert_eq!(body["data"]["unit"]["kanjiText"], "丈夫⟨じょうぶ⟩");
    assert_eq!(body["data"]["kanjiDiff"]["removed"], json!(["大"]));
    assert_eq!(body["data"]["kanjiDiff"]["kept"], json!(["丈", "夫"]));
    assert_eq!(body["data"]["kanjiDiff"]["added"], json!([]));

    assert_eq!(unit_kanji(&app.app, unit_id).await, vec!["丈", "夫"]);

    // The registry keeps the unlinked kanji.
    let (_, body) = call(&app.app, Method::GET, "/api/kanji?search=large", None).await;
    assert_eq!(body["data"][0]["character"], "大");
    assert_eq!(body["data"][0]["usageCount"], 0);
}

#[tokio::test]
async fn it_meaning_only_update_reports_no_diff() {
    let app = spawn_test_app().await;
    let unit = create_unit(&app.app, "火⟨ひ⟩", None).await;
    let unit_id = unit["id"].as_str().unwrap();

    let (status, body) = call(
        &app.app,
        Method::PUT,
        &format!("/api/units/{unit_id}"),
        Some(json!({ "meaningText": "  fire  " })),
    )
    .await;
    assert_status_ok_json(status, &body);
    assert_eq!(body["data"]["unit"]["meaningText"], "fire");
    assert!(body["data"]["kanjiDiff"].is_null());

    let (status, body) = call(&app.app, Method::PUT, &format!("/api/units/{unit_id}"), Some(json!({}))).await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_json_error(&body, "VALIDATION_ERROR");
}

#[tokio::test]
async fn it_text_and_meaning_edit_succeed_or_fail_together() {
    let app = spawn_test_app().await;
    let unit = create_unit(&app.app, "火⟨ひ⟩", None).await;
    let unit_id = unit["id"].as_str().unwrap();

    let (status, body) = call(
        &app.app,
        Method::PUT,
        &format!("/api/units/{unit_id}"),
        Some(json!({ "kanjiText": "日⟨ひ⟩", "meaningText": "sun" })),
    )
    .await;
    assert_status_ok_json(status, &body);
    assert_eq!(body["data"]["unit"]["kanjiText"], "日⟨ひ⟩");
    assert_eq!(body["data"]["unit"]["meaningText"], "sun");
    assert_eq!(body["data"]["kanjiDiff"]["added"], json!(["日"]));
    assert_eq!(body["data"]["kanjiDiff"]["removed"], json!(["火"]));

    let (status, body) = call(
        &app.app,
        Method::PUT,
        &format!("/api/units/{unit_id}"),
        Some(json!({ "kanjiText": "日⟨ひ", "meaningText": "broken" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_json_error(&body, "MALFORMED_ANNOTATION");

    let (_, body) = call(&app.app, Method::GET, &format!("/api/units/{unit_id}"), None).await;
    assert_eq!(body["data"]["kanjiText"], "日⟨ひ⟩");
    assert_eq!(body["data"]["meaningText"], "sun");
    assert_eq!(unit_kanji(&app.app, unit_id).await, vec!["日"]);
}

#[tokio::test]
async fn it_rejects_malformed_or_empty_text() {
    let app = spawn_test_app().await;

    let (status, body) = call(
        &app.app,
        Method::POST,
        "/api/units",
        Some(json!({ "type": "word", "kanjiText": "日⟨に" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_json_error(&body, "MALFORMED_ANNOTATION");

    let (status, body) = call(
        &app.app,
        Method::POST,
        "/api/units",
        Some(json!({ "type": "word", "kanjiText": "" })),
    )
    .await;
    assert_eq!(status, StatusCode::BAD_REQUEST);
    assert_json_error(&body, "VALIDATION_ERROR");
    assert_eq!(app.store.count_units(), 0);
}

#[tokio::test]
async fn it_study_state_and_delete() {
    let app = spawn_test_app().await;
    let set_id = create_set(&app.app, "Lesson 1").await;
    let unit = create_unit(&app.app, "本⟨ほん⟩", Some(&set_id)).await;
    let unit_id = unit["id"].as_str().unwrap();
    assert_eq!(unit["studyState"], "undefined");

    let (status, body) = call(
        &app.app,
        Method::PUT,
        &format!("/api/units/{unit_id}/study-state"),
        Some(json!({ "studyState": "success" })),
    )
    .await;
    assert_status_ok_json(status, &body);
    assert_eq!(body["data"]["studyState"], "success");

    let (_, body) = call(&app.app, Method::GET, &format!("/api/units/{unit_id}/sets"), None).await;
    assert_eq!(body["data"][0]["id"], set_id.as_str());

    let (status, _) = call(&app.app, Method::DELETE, &format!("/api/units/{unit_id}"), None).await;
    assert_eq!(status, StatusCode::OK);

    let (status, _) = call(&app.app, Method::GET, &format!("/api/units/{unit_id}"), None).await;
    assert_eq!(status, StatusCode::NOT_FOUND);
    let (_, body) = call(&app.app, Method::GET, &format!("/api/sets/{set_id}/units"), None).await;
    assert!(body["data"].as_array().unwrap().is_empty());
}

#[tokio::test]
async fn it_plain_text_unit_is_stored_as_one_segment() {
    let app = spawn_test_app().await;
    let unit = create_unit(&app.app, "丈夫⟨じょうぶ⟩です", None).await;
    assert_eq!(unit["kanjiText"], "丈夫⟨じょうぶ⟩␟です");
}
