/**
 * User Routes
 * Bookmarks and reading history for the signed-in reader, user management for admins
 */
use axum::{
    extract::Path,
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::auth::{check_email, check_password, check_username, current_user, hash_password, require_admin};
use super::{parse_id, pool, ApiError, ApiResponse, FieldError};
use crate::db::{
    self,
    models::{BookmarkEntry, HistoryEntry, NewUser, Role, User},
};

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CreateUserRequest {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
    pub role: Option<String>,
}

#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateUserRequest {
    pub username: Option<String>,
    pub email: Option<String>,
    pub role: Option<String>,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct HistoryRequest {
    pub story_id: Option<String>,
    pub chapter_id: Option<String>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct BookmarkCheck {
    pub success: bool,
    pub is_bookmarked: bool,
}

fn parse_role(raw: Option<&str>, errors: &mut Vec<FieldError>) -> Option<Role> {
    let raw = raw.map(str::trim).filter(|s| !s.is_empty())?;
    match raw.parse() {
        Ok(role) => Some(role),
        Err(_) => {
            errors.push(FieldError::new("role", "Role must be either user or admin"));
            None
        }
    }
}

pub fn validate_new_user(req: &CreateUserRequest) -> Result<(String, String, Role), ApiError> {
    let mut errors = Vec::new();
    check_username(&req.username, &mut errors);
    check_email(&req.email, &mut errors);
    check_password("password", &req.password, &mut errors);
    let role = parse_role(req.role.as_deref(), &mut errors).unwrap_or(Role::User);
    if !errors.is_empty() {
        return Err(ApiError::Validation(errors));
    }
    Ok((
        req.username.trim().to_string(),
        req.email.trim().to_lowercase(),
        role,
    ))
}

/// Validated partial user update.
#[derive(Debug, Default, PartialEq)]
pub struct UserChanges {
    pub username: Option<String>,
    pub email: Option<String>,
    pub role: Option<Role>,
}

pub fn validate_user_changes(req: &UpdateUserRequest) -> Result<UserChanges, ApiError> {
    let mut errors = Vec::new();
    let mut changes = UserChanges::default();
    if let Some(username) = req.username.as_deref() {
        check_username(username, &mut errors);
        changes.username = Some(username.trim().to_string());
    }
    if let Some(email) = req.email.as_deref() {
        check_email(email, &mut errors);
        changes.email = Some(email.trim().to_lowercase());
    }
    changes.role = parse_role(req.role.as_deref(), &mut errors);
    if !errors.is_empty() {
        return Err(ApiError::Validation(errors));
    }
    Ok(changes)
}

async fn ensure_available(
    pool: &sqlx::PgPool,
    username: Option<&str>,
    email: Option<&str>,
    excluding: Option<Uuid>,
) -> Result<(), ApiError> {
    let taken = db::users::taken(pool, username, email, excluding).await?;
    if taken.email {
        return Err(ApiError::bad_request("Email is already in use"));
    }
    if taken.username {
        return Err(ApiError::bad_request("Username is already taken"));
    }
    Ok(())
}

// ============================================================================
// Bookmarks
// ============================================================================

/// GET /api/users/bookmarks
pub async fn list_bookmarks(headers: HeaderMap) -> Result<Json<ApiResponse<Vec<BookmarkEntry>>>, ApiError> {
    let user = current_user(&headers).await?;
    let pool = pool()?;
    let bookmarks = db::users::bookmarks(&pool, user.id).await?;
    Ok(Json(ApiResponse::list(bookmarks)))
}

/// GET /api/users/bookmarks/check/{story_id}
pub async fn check_bookmark(
    headers: HeaderMap,
    Path(story_id): Path<String>,
) -> Result<Json<BookmarkCheck>, ApiError> {
    let story_id = parse_id(&story_id, "story")?;
    let user = current_user(&headers).await?;
    let pool = pool()?;
    let is_bookmarked = db::users::is_bookmarked(&pool, user.id, story_id).await?;
    Ok(Json(BookmarkCheck {
        success: true,
        is_bookmarked,
    }))
}

/// POST /api/users/bookmarks/{story_id}
pub async fn add_bookmark(
    headers: HeaderMap,
    Path(story_id): Path<String>,
) -> Result<Json<ApiResponse<()>>, ApiError> {
    let story_id = parse_id(&story_id, "story")?;
    let user = current_user(&headers).await?;
    let pool = pool()?;

    if db::stories::find_by_id(&pool, story_id).await?.is_none() {
        return Err(ApiError::not_found("Story not found"));
    }
    if !db::users::add_bookmark(&pool, user.id, story_id).await? {
        return Err(ApiError::bad_request("Story is already bookmarked"));
    }

    tracing::info!(user_id = %user.id, story_id = %story_id, "bookmark added");
    Ok(Json(ApiResponse::message("Story added to bookmarks")))
}

/// DELETE /api/users/bookmarks/{story_id}
pub async fn remove_bookmark(
    headers: HeaderMap,
    Path(story_id): Path<String>,
) -> Result<Json<ApiResponse<()>>, ApiError> {
    let story_id = parse_id(&story_id, "story")?;
    let user = current_user(&headers).await?;
    let pool = pool()?;

    if !db::users::remove_bookmark(&pool, user.id, story_id).await? {
        return Err(ApiError::not_found("Bookmark not found"));
    }
    Ok(Json(ApiResponse::message("Story removed from bookmarks")))
}

// ============================================================================
// Reading history
// ============================================================================

/// POST /api/users/history
pub async fn record_history(
    headers: HeaderMap,
    Json(payload): Json<HistoryRequest>,
) -> Result<Json<ApiResponse<()>>, ApiError> {
    let mut errors = Vec::new();
    let mut id_field = |field: &str, raw: Option<&str>| match raw.map(Uuid::try_parse) {
        Some(Ok(id)) => Some(id),
        _ => {
            errors.push(FieldError::new(field, format!("A valid {} is required", field)));
            None
        }
    };
    let story_id = id_field("storyId", payload.story_id.as_deref());
    let chapter_id = id_field("chapterId", payload.chapter_id.as_deref());
    let (Some(story_id), Some(chapter_id)) = (story_id, chapter_id) else {
        return Err(ApiError::Validation(errors));
    };

    let user = current_user(&headers).await?;
    let pool = pool()?;
    let chapter = db::chapters::find_by_id(&pool, chapter_id)
        .await?
        .filter(|c| c.story_id == story_id)
        .ok_or_else(|| ApiError::not_found("Chapter not found"))?;

    db::users::record_reading(&pool, user.id, story_id, chapter.id).await?;
    tracing::debug!(user_id = %user.id, story_id = %story_id, chapter_id = %chapter.id, "reading recorded");
    Ok(Json(ApiResponse::message("Reading history updated")))
}

/// GET /api/users/reading-history
pub async fn reading_history(headers: HeaderMap) -> Result<Json<ApiResponse<Vec<HistoryEntry>>>, ApiError> {
    let user = current_user(&headers).await?;
    let pool = pool()?;
    let history = db::users::reading_history(&pool, user.id).await?;
    Ok(Json(ApiResponse::list(history)))
}

/// DELETE /api/users/reading-history
pub async fn clear_history(headers: HeaderMap) -> Result<Json<ApiResponse<()>>, ApiError> {
    let user = current_user(&headers).await?;
    let pool = pool()?;
    let removed = db::users::clear_history(&pool, user.id).await?;
    tracing::info!(user_id = %user.id, removed, "reading history cleared");
    Ok(Json(ApiResponse::message("Reading history cleared")))
}

/// DELETE /api/users/reading-history/{id}
pub async fn remove_history_entry(
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<()>>, ApiError> {
    let id = parse_id(&id, "history entry")?;
    let user = current_user(&headers).await?;
    let pool = pool()?;
    if !db::users::remove_history_entry(&pool, user.id, id).await? {
        return Err(ApiError::not_found("History entry not found"));
    }
    Ok(Json(ApiResponse::message("History entry removed")))
}

// ============================================================================
// Admin user management
// ============================================================================

/// GET /api/users
pub async fn list_users(headers: HeaderMap) -> Result<Json<ApiResponse<Vec<User>>>, ApiError> {
    require_admin(&headers).await?;
    let pool = pool()?;
    let users = db::users::list(&pool).await?;
    Ok(Json(ApiResponse::list(users)))
}

/// GET /api/users/{id}
pub async fn get_user(headers: HeaderMap, Path(id): Path<String>) -> Result<Json<ApiResponse<User>>, ApiError> {
    require_admin(&headers).await?;
    let id = parse_id(&id, "user")?;
    let pool = pool()?;
    let user = db::users::find_by_id(&pool, id)
        .await?
        .ok_or_else(|| ApiError::not_found("User not found"))?;
    Ok(Json(ApiResponse::data(user)))
}

/// POST /api/users
pub async fn create_user(
    headers: HeaderMap,
    Json(payload): Json<CreateUserRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let admin = require_admin(&headers).await?;
    let (username, email, role) = validate_new_user(&payload)?;

    let pool = pool()?;
    ensure_available(&pool, Some(&username), Some(&email), None).await?;
    let password_hash = hash_password(payload.password).await?;
    let user = db::users::create(
        &pool,
        &NewUser {
            username,
            email,
            password_hash,
            role,
        },
    )
    .await?;

    tracing::info!(user_id = %user.id, role = %user.role, admin_id = %admin.id, "user created by admin");
    Ok((StatusCode::CREATED, Json(ApiResponse::data(user))))
}

/// PUT /api/users/{id}
pub async fn update_user(
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(payload): Json<UpdateUserRequest>,
) -> Result<Json<ApiResponse<User>>, ApiError> {
    let admin = require_admin(&headers).await?;
    let id = parse_id(&id, "user")?;
    let changes = validate_user_changes(&payload)?;

    let pool = pool()?;
    ensure_available(&pool, changes.username.as_deref(), changes.email.as_deref(), Some(id)).await?;
    let user = db::users::update(
        &pool,
        id,
        changes.username.as_deref(),
        changes.email.as_deref(),
        changes.role,
    )
    .await?
    .ok_or_else(|| ApiError::not_found("User not found"))?;

    tracing::info!(user_id = %id, admin_id = %admin.id, "user updated by admin");
    Ok(Json(ApiResponse::data(user)))
}

/// DELETE /api/users/{id}
pub async fn delete_user(
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let admin = require_admin(&headers).await?;
    let id = parse_id(&id, "user")?;
    let pool = pool()?;

    if !db::users::delete(&pool, id).await? {
        return Err(ApiError::not_found("User not found"));
    }
    tracing::info!(user_id = %id, admin_id = %admin.id, "user deleted by admin");
    Ok(Json(ApiResponse::data(serde_json::json!({}))))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::Request;
    use axum::routing::{get, post};
    use axum::Router;
    use tower::ServiceExt;

    #[test]
    fn test_new_user_defaults_to_reader_role() {
        let (username, email, role) = validate_new_user(&CreateUserRequest {
            username: " reader ".to_string(),
            email: "Reader@Example.com".to_string(),
            password: "secret1".to_string(),
            role: None,
        })
        .unwrap();
        assert_eq!(username, "reader");
        assert_eq!(email, "reader@example.com");
        assert_eq!(role, Role::User);
    }

    #[test]
    fn test_new_user_rejects_unknown_role() {
        let err = validate_new_user(&CreateUserRequest {
            username: "mod".to_string(),
            email: "mod@example.com".to_string(),
            password: "secret1".to_string(),
            role: Some("moderator".to_string()),
        })
        .unwrap_err();
        assert!(matches!(err, ApiError::Validation(ref e) if e[0].field == "role"));
    }

    #[test]
    fn test_user_changes_are_partial() {
        let changes = validate_user_changes(&UpdateUserRequest {
            role: Some("admin".to_string()),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(
            changes,
            UserChanges {
                role: Some(Role::Admin),
                ..Default::default()
            }
        );
        assert!(validate_user_changes(&UpdateUserRequest {
            email: Some("nope".to_string()),
            ..Default::default()
        })
        .is_err());
    }

    async fn status_of(app: Router, req: Request<Body>) -> (StatusCode, serde_json::Value) {
        let res = app.oneshot(req).await.unwrap();
        let status = res.status();
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX)
            .await
            .unwrap();
        (
            status,
            serde_json::from_slice(&bytes).unwrap_or(serde_json::Value::Null),
        )
    }

    #[tokio::test]
    async fn test_history_requires_both_ids() {
        let app = Router::new().route("/api/users/history", post(record_history));
        let (status, body) = status_of(
            app,
            Request::post("/api/users/history")
                .header("content-type", "application/json")
                .body(Body::from(r#"{"storyId":"nope"}"#))
                .unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["errors"][0]["field"], "storyId");
        assert_eq!(body["errors"][1]["field"], "chapterId");
    }

    #[tokio::test]
    async fn test_bookmarks_require_login() {
        let app = Router::new().route("/api/users/bookmarks", get(list_bookmarks));
        let (status, _) = status_of(
            app,
            Request::get("/api/users/bookmarks").body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_bookmark_check_rejects_malformed_story_id() {
        let app = Router::new().route("/api/users/bookmarks/check/{story_id}", get(check_bookmark));
        let (status, body) = status_of(
            app,
            Request::get("/api/users/bookmarks/check/ember-road")
                .body(Body::empty())
                .unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "Invalid story id");
    }
}
