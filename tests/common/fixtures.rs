use axum::http::{Method, StatusCode};
use axum::Router;
use serde_json::{json, Value};

use super::http::{assert_status_ok_json, call};

pub async fn create_set(app: &Router, title: &str) -> String {
    create_set_with(app, json!({ "title": title })).await
}

pub async fn create_set_with(app: &Router, body: Value) -> String {
    let (status, body) = call(app, Method::POST, "/api/sets", Some(body)).await;
    assert_eq!(status, StatusCode::CREATED, "{body}");
    body["data"]["id"].as_str().expect("set id").to_string()
}

pub async fn create_unit(app: &Router, kanji_text: &str, set_id: Option<&str>) -> Value {
    let mut payload = json!({
        "type": "word",
        "kanjiText": kanji_text,
        "meaningText": "",
    });
    if let Some(set_id) = set_id {
        payload["setId"] = json!(set_id);
    }
    let (status, body) = call(app, Method::POST, "/api/units", Some(payload)).await;
    assert_status_ok_json(status, &body);
    body["data"].clone()
}

/// Characters of the kanji linked to a unit, in text order.
pub async fn unit_kanji(app: &Router, unit_id: &str) -> Vec<String> {
    let (status, body) = call(app, Method::GET, &format!("/api/units/{unit_id}/kanji"), None).await;
    assert_status_ok_json(status, &body);
    body["data"]
        .as_array()
        .expect("kanji array")
        .iter()
        .map(|kanji| kanji["character"].as_str().unwrap_or_default().to_string())
        .collect()
}
