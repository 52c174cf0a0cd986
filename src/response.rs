use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};
use axum::Json;
use serde::Serialize;

use crate::study::StudyError;

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    pub data: T,
}

/// Keyset page: `next_after` is the id to pass as `after` for the next page.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PageResponse<T: Serialize> {
    pub items: Vec<T>,
    pub next_after: Option<String>,
    pub total: u64,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorBody {
    pub success: bool,
    pub code: String,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub details: Option<serde_json::Value>,
    pub trace_id: Option<String>,
}

#[derive(Debug, Clone)]
pub struct AppError {
    pub status: StatusCode,
    pub code: String,
    pub message: String,
    pub details: Option<serde_json::Value>,
    pub is_operational: bool,
}

impl AppError {
    fn operational(status: StatusCode, code: &str, message: &str) -> Self {
        Self {
            status,
            code: code.to_string(),
            message: message.to_string(),
            details: None,
            is_operational: true,
        }
    }

    pub fn bad_request(code: &str, message: &str) -> Self {
        Self::operational(StatusCode::BAD_REQUEST, code, message)
    }

    pub fn not_found(message: &str) -> Self {
        Self::operational(StatusCode::NOT_FOUND, "NOT_FOUND", message)
    }

    pub fn conflict(code: &str, message: &str) -> Self {
        Self::operational(StatusCode::CONFLICT, code, message)
    }

    pub fn payload_too_large(message: &str) -> Self {
        Self::operational(StatusCode::PAYLOAD_TOO_LARGE, "PAYLOAD_TOO_LARGE", message)
    }

    pub fn internal(message: &str) -> Self {
        Self {
            status: StatusCode::INTERNAL_SERVER_ERROR,
            code: "INTERNAL_ERROR".to_string(),
            message: message.to_string(),
            details: None,
            is_operational: false,
        }
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let exposed_message = if self.is_operational {
            self.message.clone()
        } else {
            "Could not save changes".to_string()
        };

        if self.is_operational {
            tracing::warn!(status = %self.status, code = %self.code, error = %self.message, "API error");
        } else {
            tracing::error!(status = %self.status, code = %self.code, error = %self.message, "Internal API error");
        }

        (
            self.status,
            Json(ErrorBody {
                success: false,
                code: self.code,
                message: exposed_message,
                details: if self.is_operational { self.details } else { None },
                trace_id: None,
            }),
        )
            .into_response()
    }
}

impl From<crate::store::StoreError> for AppError {
    fn from(value: crate::store::StoreError) -> Self {
        StudyError::from(value).into()
    }
}

// Storage failures and registry invariant breaks are internal: their message
// is logged and replaced by a generic one in the response.
impl From<StudyError> for AppError {
    fn from(value: StudyError) -> Self {
        match value {
            StudyError::MalformedAnnotation { position, reason } => {
                AppError::bad_request("MALFORMED_ANNOTATION", &reason)
                    .with_details(serde_json::json!({ "position": position }))
            }
            StudyError::Validation(msg) => AppError::bad_request("VALIDATION_ERROR", &msg),
            StudyError::BatchRejected { failed } => {
                AppError::bad_request("BATCH_REJECTED", "Some units do not exist")
                    .with_details(serde_json::json!({ "failed": failed }))
            }
            StudyError::NotFound { entity, key } => {
                AppError::not_found(&format!("{entity} '{key}' not found"))
            }
            err @ StudyError::DuplicateConstraintViolation { .. } => {
                tracing::error!(error = %err, "Kanji registry uniqueness violated");
                AppError {
                    status: StatusCode::CONFLICT,
                    code: "DUPLICATE_KANJI".to_string(),
                    message: err.to_string(),
                    details: None,
                    is_operational: false,
                }
            }
            err @ StudyError::StorageFailure(_) => AppError::internal(&err.to_string()),
        }
    }
}

pub fn ok<T: Serialize>(data: T) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(ApiResponse {
            success: true,
            data,
        }),
    )
}

pub fn created<T: Serialize>(data: T) -> impl IntoResponse {
    (
        StatusCode::CREATED,
        Json(ApiResponse {
            success: true,
            data,
        }),
    )
}

pub fn page<T: Serialize>(items: Vec<T>, next_after: Option<String>, total: u64) -> impl IntoResponse {
    (
        StatusCode::OK,
        Json(ApiResponse {
            success: true,
            data: PageResponse {
                items,
                next_after,
                total,
            },
        }),
    )
}

#[cfg(test)]
mod tests {
    use axum::body::to_bytes;
    use axum::response::IntoResponse;

    use super::*;
    use crate::store::StoreError;

    async fn body_json(resp: Response) -> serde_json::Value {
        let body = to_bytes(resp.into_body(), usize::MAX).await.unwrap();
        serde_json::from_slice(&body).unwrap()
    }

    #[tokio::test]
    async fn storage_failure_is_redacted() {
        let err: AppError = StudyError::StorageFailure(StoreError::Validation("disk full".to_string())).into();
        let resp = err.into_response();
        assert_eq!(resp.status(), StatusCode::INTERNAL_SERVER_ERROR);
        let json = body_json(resp).await;
        assert_eq!(json["message"], "Could not save changes");
        assert!(!json.to_string().contains("disk full"));
    }

    #[tokio::test]
    async fn malformed_annotation_reports_position() {
        let err: AppError = StudyError::malformed(3, "unterminated reading").into();
        let resp = err.into_response();
        assert_eq!(resp.status(), StatusCode::BAD_REQUEST);
        let json = body_json(resp).await;
        assert_eq!(json["code"], "MALFORMED_ANNOTATION");
        assert_eq!(json["details"]["position"], 3);
    }

    #[tokio::test]
    async fn batch_rejection_lists_failed_ids() {
        let err: AppError = StudyError::BatchRejected {
            failed: vec!["u9".to_string()],
        }
        .into();
        let json = body_json(err.into_response()).await;
        assert_eq!(json["code"], "BATCH_REJECTED");
        assert_eq!(json["details"]["failed"][0], "u9");
    }

    #[tokio::test]
    async fn not_found_code_field() {
        let err: AppError = StudyError::not_found("unit", "u1").into();
        let resp = err.into_response();
        assert_eq!(resp.status(), StatusCode::NOT_FOUND);
        let json = body_json(resp).await;
        assert_eq!(json["code"], "NOT_FOUND");
        assert!(json.get("error").is_none());
    }
}
