/**
 * Routes Module
 * API route handlers and the shared response envelope
 */
pub mod admin;
pub mod auth;
pub mod categories;
pub mod chapters;
pub mod error;
pub mod health;
pub mod stories;
pub mod upload;
pub mod users;

use serde::Serialize;
use sqlx::PgPool;
use std::sync::Arc;
use uuid::Uuid;

use crate::db;
use crate::pagination::Pagination;
pub use error::{ApiError, ErrorResponse, FieldError};

/// Success envelope shared by every JSON endpoint.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ApiResponse<T: Serialize> {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub message: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total: Option<i64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub pagination: Option<Pagination>,
}

impl<T: Serialize> ApiResponse<T> {
    pub fn data(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            message: None,
            count: None,
            total: None,
            pagination: None,
        }
    }

    pub fn with_message(mut self, message: impl Into<String>) -> Self {
        self.message = Some(message.into());
        self
    }
}

impl<T: Serialize> ApiResponse<Vec<T>> {
    /// List response with its item count.
    pub fn list(items: Vec<T>) -> Self {
        let count = items.len();
        let mut response = Self::data(items);
        response.count = Some(count);
        response
    }

    /// Page of a larger list.
    pub fn page(items: Vec<T>, pagination: Pagination) -> Self {
        let mut response = Self::list(items);
        response.total = Some(pagination.total);
        response.pagination = Some(pagination);
        response
    }
}

impl ApiResponse<()> {
    pub fn message(message: impl Into<String>) -> Self {
        Self {
            success: true,
            data: None,
            message: Some(message.into()),
            count: None,
            total: None,
            pagination: None,
        }
    }
}

/// Database pool, or 503 when the server started without one.
pub fn pool() -> Result<Arc<PgPool>, ApiError> {
    db::get_pool().ok_or(ApiError::DatabaseUnavailable)
}

/// Parse a path segment that must be an internal id.
pub fn parse_id(raw: &str, what: &str) -> Result<Uuid, ApiError> {
    Uuid::try_parse(raw).map_err(|_| ApiError::bad_request(format!("Invalid {} id", what)))
}

/// Strip scripts and unsafe markup from user-supplied HTML.
pub fn sanitize_html(html: &str) -> String {
    ammonia::clean(html)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::pagination::Page;

    #[test]
    fn test_page_envelope_shape() {
        let pagination = Pagination::new(Page { page: 1, limit: 2 }, 5);
        let value = serde_json::to_value(ApiResponse::page(vec![1, 2], pagination)).unwrap();
        assert_eq!(value["success"], true);
        assert_eq!(value["count"], 2);
        assert_eq!(value["total"], 5);
        assert_eq!(value["pagination"]["next"]["page"], 2);
    }

    #[test]
    fn test_message_envelope_omits_data() {
        let value = serde_json::to_value(ApiResponse::message("done")).unwrap();
        assert_eq!(value["message"], "done");
        assert!(value.get("data").is_none());
    }

    #[test]
    fn test_parse_id_rejects_malformed() {
        assert!(parse_id("not-an-id", "story").is_err());
        assert!(parse_id("67e55044-10b1-426f-9247-bb680e5fe0c8", "story").is_ok());
    }

    #[test]
    fn test_sanitize_html_removes_scripts() {
        let clean = sanitize_html("<p>hi</p><script>alert(1)</script>");
        assert_eq!(clean, "<p>hi</p>");
    }

    #[test]
    fn test_pool_unavailable_without_database() {
        assert!(matches!(pool(), Err(ApiError::DatabaseUnavailable)));
    }
}
