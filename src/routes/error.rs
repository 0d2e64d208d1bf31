/**
 * API Errors
 * Every handler error is rendered as the same JSON envelope
 */
use axum::{
    http::{StatusCode, Uri},
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::any::Any;
use thiserror::Error;

use crate::config::CONFIG;
use crate::db::models::StorySuggestion;

/// One failed input field.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FieldError {
    pub field: String,
    pub message: String,
}

impl FieldError {
    pub fn new(field: &str, message: impl Into<String>) -> Self {
        Self {
            field: field.to_string(),
            message: message.into(),
        }
    }
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("Validation failed")]
    Validation(Vec<FieldError>),

    #[error("{0}")]
    BadRequest(String),

    #[error("{0}")]
    Unauthorized(String),

    #[error("{0}")]
    Forbidden(String),

    #[error("{message}")]
    NotFound {
        message: String,
        suggestions: Vec<StorySuggestion>,
    },

    #[error("{message}")]
    Conflict {
        message: String,
        details: Option<serde_json::Value>,
    },

    #[error("Database not available")]
    DatabaseUnavailable,

    #[error("Database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("{0}")]
    Internal(String),
}

/// JSON body of every error response.
#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ErrorResponse {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub errors: Option<Vec<FieldError>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub similar_stories: Option<Vec<StorySuggestion>>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<serde_json::Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub detail: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub path: Option<String>,
}

impl ErrorResponse {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            errors: None,
            similar_stories: None,
            data: None,
            detail: None,
            path: None,
        }
    }
}

impl ApiError {
    pub fn not_found(message: impl Into<String>) -> Self {
        ApiError::NotFound {
            message: message.into(),
            suggestions: Vec::new(),
        }
    }

    pub fn bad_request(message: impl Into<String>) -> Self {
        ApiError::BadRequest(message.into())
    }

    pub fn forbidden(message: impl Into<String>) -> Self {
        ApiError::Forbidden(message.into())
    }

    pub fn unauthorized(message: impl Into<String>) -> Self {
        ApiError::Unauthorized(message.into())
    }

    pub fn conflict(message: impl Into<String>) -> Self {
        ApiError::Conflict {
            message: message.into(),
            details: None,
        }
    }

    /// Single-field validation failure.
    pub fn invalid(field: &str, message: impl Into<String>) -> Self {
        ApiError::Validation(vec![FieldError::new(field, message)])
    }

    pub fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) | ApiError::BadRequest(_) => StatusCode::BAD_REQUEST,
            ApiError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            ApiError::Forbidden(_) => StatusCode::FORBIDDEN,
            ApiError::NotFound { .. } => StatusCode::NOT_FOUND,
            ApiError::Conflict { .. } => StatusCode::CONFLICT,
            ApiError::DatabaseUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Database(e) if crate::db::is_unique_violation(e) => StatusCode::CONFLICT,
            ApiError::Database(sqlx::Error::PoolTimedOut) => StatusCode::SERVICE_UNAVAILABLE,
            ApiError::Database(_) | ApiError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let status = self.status();
        let mut body = ErrorResponse::new(self.to_string());

        match self {
            ApiError::Validation(errors) => body.errors = Some(errors),
            ApiError::NotFound { suggestions, .. } if !suggestions.is_empty() => {
                body.similar_stories = Some(suggestions)
            }
            ApiError::Conflict { details, .. } => body.data = details,
            ApiError::Database(e) if status == StatusCode::CONFLICT => {
                tracing::warn!(error = %e, "unique constraint violated");
                body.message = "A record with the same value already exists".to_string();
            }
            ApiError::Database(e) => {
                tracing::error!(error = %e, "database error");
                body.message = if status == StatusCode::SERVICE_UNAVAILABLE {
                    "Database not available".to_string()
                } else {
                    "Server error".to_string()
                };
                if CONFIG.is_development() {
                    body.detail = Some(e.to_string());
                }
            }
            ApiError::Internal(detail) => {
                tracing::error!(error = %detail, "internal error");
                body.message = "Server error".to_string();
                if CONFIG.is_development() {
                    body.detail = Some(detail);
                }
            }
            _ => {}
        }

        (status, Json(body)).into_response()
    }
}

/// Fallback for unmatched routes.
pub async fn route_not_found(uri: Uri) -> Response {
    let mut body = ErrorResponse::new("Route not found");
    body.path = Some(uri.path().to_string());
    (StatusCode::NOT_FOUND, Json(body)).into_response()
}

/// Render a caught panic as a JSON 500.
pub fn panic_response(err: Box<dyn Any + Send + 'static>) -> Response {
    let detail = if let Some(s) = err.downcast_ref::<String>() {
        s.clone()
    } else if let Some(s) = err.downcast_ref::<&str>() {
        s.to_string()
    } else {
        "unknown panic".to_string()
    };
    tracing::error!(panic = %detail, "handler panicked");

    let mut body = ErrorResponse::new("Server error");
    if CONFIG.is_development() {
        body.detail = Some(detail);
    }
    (StatusCode::INTERNAL_SERVER_ERROR, Json(body)).into_response()
}

#[cfg(test)]
mod tests {
    use super::*;
    use uuid::Uuid;

    async fn render(err: ApiError) -> (StatusCode, serde_json::Value) {
        let res = err.into_response();
        let status = res.status();
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX)
            .await
            .unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn test_validation_lists_field_errors() {
        let (status, body) = render(ApiError::Validation(vec![
            FieldError::new("title", "Title is required"),
            FieldError::new("content", "Content is too short"),
        ]))
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["success"], false);
        assert_eq!(body["errors"][0]["field"], "title");
        assert_eq!(body["errors"].as_array().unwrap().len(), 2);
    }

    #[tokio::test]
    async fn test_not_found_carries_similar_stories() {
        let (status, body) = render(ApiError::NotFound {
            message: "Story not found".to_string(),
            suggestions: vec![StorySuggestion {
                id: Uuid::nil(),
                title: "Ember Road".to_string(),
                slug: "ember-road".to_string(),
            }],
        })
        .await;
        assert_eq!(status, StatusCode::NOT_FOUND);
        assert_eq!(body["message"], "Story not found");
        assert_eq!(body["similarStories"][0]["slug"], "ember-road");
    }

    #[tokio::test]
    async fn test_plain_not_found_omits_suggestions() {
        let (_, body) = render(ApiError::not_found("Chapter not found")).await;
        assert!(body.get("similarStories").is_none());
    }

    #[tokio::test]
    async fn test_conflict_includes_details() {
        let (status, body) = render(ApiError::Conflict {
            message: "taken".to_string(),
            details: Some(serde_json::json!({ "targetNumber": 4 })),
        })
        .await;
        assert_eq!(status, StatusCode::CONFLICT);
        assert_eq!(body["data"]["targetNumber"], 4);
    }

    #[tokio::test]
    async fn test_internal_error_hides_message() {
        let (status, body) = render(ApiError::Internal("disk on fire".to_string())).await;
        assert_eq!(status, StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(body["message"], "Server error");
    }

    #[tokio::test]
    async fn test_pool_timeout_is_service_unavailable() {
        let (status, _) = render(ApiError::Database(sqlx::Error::PoolTimedOut)).await;
        assert_eq!(status, StatusCode::SERVICE_UNAVAILABLE);
    }

    #[tokio::test]
    async fn test_panic_response_is_json_500() {
        let res = panic_response(Box::new("boom"));
        assert_eq!(res.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
