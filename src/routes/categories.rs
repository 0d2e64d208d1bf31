/**
 * Category Routes
 * Public genre listing; create/update/delete are admin only
 */
use axum::{
    extract::{Path, Query},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};

use super::auth::require_admin;
use super::{parse_id, pool, ApiError, ApiResponse, FieldError};
use crate::db::{
    self,
    models::{Category, StoryCard},
    stories::{StoryFilter, StorySort},
};
use crate::pagination::{PageParams, Pagination};
use crate::slug;

pub const MAX_NAME_LEN: usize = 50;
pub const MAX_DESCRIPTION_LEN: usize = 500;

#[derive(Debug, Default, Deserialize, Serialize)]
pub struct CategoryRequest {
    pub name: Option<String>,
    pub description: Option<String>,
}

/// Validated category fields. `slug` follows `name`.
#[derive(Debug, Default, PartialEq)]
pub struct CategoryFields {
    pub name: Option<String>,
    pub slug: Option<String>,
    pub description: Option<String>,
}

/// Validate a category body; `require_name` is set for creation.
pub fn validate_category(req: &CategoryRequest, require_name: bool) -> Result<CategoryFields, ApiError> {
    let mut errors = Vec::new();
    let mut fields = CategoryFields::default();

    match req.name.as_deref().map(str::trim) {
        Some("") | None if require_name => {
            errors.push(FieldError::new("name", "Please enter a category name"));
        }
        Some(name) if !name.is_empty() => {
            if name.chars().count() > MAX_NAME_LEN {
                errors.push(FieldError::new(
                    "name",
                    format!("Name cannot exceed {} characters", MAX_NAME_LEN),
                ));
            }
            let generated = slug::slugify(name);
            if generated.is_empty() {
                errors.push(FieldError::new(
                    "name",
                    "Name must contain at least one letter or digit",
                ));
            }
            fields.name = Some(name.to_string());
            fields.slug = Some(generated);
        }
        _ => {}
    }

    if let Some(description) = req.description.as_deref().map(str::trim) {
        if description.chars().count() > MAX_DESCRIPTION_LEN {
            errors.push(FieldError::new(
                "description",
                format!("Description cannot exceed {} characters", MAX_DESCRIPTION_LEN),
            ));
        }
        fields.description = Some(description.to_string());
    }

    if !errors.is_empty() {
        return Err(ApiError::Validation(errors));
    }
    Ok(fields)
}

fn name_in_use() -> ApiError {
    ApiError::bad_request("A category with this name already exists")
}

/// A concurrent write can still trip the name or slug constraint after the
/// availability check.
fn write_error(err: sqlx::Error) -> ApiError {
    if db::is_unique_violation(&err) {
        name_in_use()
    } else {
        ApiError::Database(err)
    }
}

/// GET /api/categories
pub async fn list_categories() -> Result<Json<ApiResponse<Vec<Category>>>, ApiError> {
    let pool = pool()?;
    let categories = db::categories::list(&pool).await?;
    Ok(Json(ApiResponse::list(categories)))
}

/// GET /api/categories/{id}
pub async fn get_category(Path(id): Path<String>) -> Result<Json<ApiResponse<Category>>, ApiError> {
    let id = parse_id(&id, "category")?;
    let pool = pool()?;
    let category = db::categories::find_by_id(&pool, id)
        .await?
        .ok_or_else(|| ApiError::not_found("Category not found"))?;
    Ok(Json(ApiResponse::data(category)))
}

/// GET /api/categories/{id}/stories
pub async fn category_stories(
    Path(id): Path<String>,
    Query(params): Query<PageParams>,
) -> Result<Json<ApiResponse<Vec<StoryCard>>>, ApiError> {
    let id = parse_id(&id, "category")?;
    let page = params.resolve();
    let pool = pool()?;

    if db::categories::find_by_id(&pool, id).await?.is_none() {
        return Err(ApiError::not_found("Category not found"));
    }
    let filter = StoryFilter {
        category_id: Some(id),
        ..Default::default()
    };
    let (stories, total) = db::stories::list(&pool, &filter, StorySort::default(), page).await?;
    Ok(Json(ApiResponse::page(stories, Pagination::new(page, total))))
}

/// POST /api/categories
pub async fn create_category(
    headers: HeaderMap,
    Json(payload): Json<CategoryRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let admin = require_admin(&headers).await?;
    let fields = validate_category(&payload, true)?;
    let (Some(name), Some(slug)) = (fields.name.as_deref(), fields.slug.as_deref()) else {
        return Err(ApiError::invalid("name", "Please enter a category name"));
    };

    let pool = pool()?;
    if db::categories::taken(&pool, name, slug, None).await? {
        return Err(name_in_use());
    }
    let category = db::categories::create(&pool, name, slug, fields.description.as_deref())
        .await
        .map_err(write_error)?;

    tracing::info!(category_id = %category.id, name = %category.name, admin_id = %admin.id, "category created");
    Ok((StatusCode::CREATED, Json(ApiResponse::data(category))))
}

/// PUT /api/categories/{id}
pub async fn update_category(
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(payload): Json<CategoryRequest>,
) -> Result<Json<ApiResponse<Category>>, ApiError> {
    let admin = require_admin(&headers).await?;
    let id = parse_id(&id, "category")?;
    let fields = validate_category(&payload, false)?;

    let pool = pool()?;
    if let (Some(name), Some(slug)) = (fields.name.as_deref(), fields.slug.as_deref()) {
        if db::categories::taken(&pool, name, slug, Some(id)).await? {
            return Err(name_in_use());
        }
    }
    let category = db::categories::update(
        &pool,
        id,
        fields.name.as_deref(),
        fields.slug.as_deref(),
        fields.description.as_deref(),
    )
    .await
    .map_err(write_error)?
    .ok_or_else(|| ApiError::not_found("Category not found"))?;

    tracing::info!(category_id = %id, admin_id = %admin.id, "category updated");
    Ok(Json(ApiResponse::data(category)))
}

/// DELETE /api/categories/{id}
pub async fn delete_category(
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let admin = require_admin(&headers).await?;
    let id = parse_id(&id, "category")?;
    let pool = pool()?;

    if !db::categories::delete(&pool, id).await? {
        return Err(ApiError::not_found("Category not found"));
    }

    tracing::info!(category_id = %id, admin_id = %admin.id, "category deleted");
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

    fn req(name: Option<&str>, description: Option<&str>) -> CategoryRequest {
        CategoryRequest {
            name: name.map(str::to_string),
            description: description.map(str::to_string),
        }
    }

    #[test]
    fn test_create_requires_name() {
        assert!(validate_category(&req(None, None), true).is_err());
        assert!(validate_category(&req(Some("   "), None), true).is_err());
    }

    #[test]
    fn test_name_produces_slug() {
        let fields = validate_category(&req(Some(" Kiếm Hiệp "), Some("Martial heroes")), true).unwrap();
        assert_eq!(fields.name.as_deref(), Some("Kiếm Hiệp"));
        assert_eq!(fields.slug.as_deref(), Some("kiem-hiep"));
        assert_eq!(fields.description.as_deref(), Some("Martial heroes"));
    }

    #[test]
    fn test_names_differing_in_punctuation_share_a_slug() {
        let spaced = validate_category(&req(Some("Sci Fi"), None), true).unwrap();
        let hyphenated = validate_category(&req(Some("Sci-Fi"), None), true).unwrap();
        assert_eq!(spaced.slug, hyphenated.slug);
        assert_ne!(spaced.name, hyphenated.name);
    }

    #[test]
    fn test_other_write_errors_are_not_reported_as_duplicates() {
        let err = write_error(sqlx::Error::RowNotFound);
        assert_eq!(err.status(), StatusCode::INTERNAL_SERVER_ERROR);
        assert_eq!(name_in_use().status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_update_may_omit_name() {
        let fields = validate_category(&req(None, Some("new text")), false).unwrap();
        assert!(fields.name.is_none());
        assert!(fields.slug.is_none());
    }

    #[test]
    fn test_name_without_letters_is_rejected() {
        assert!(validate_category(&req(Some("!!!"), None), true).is_err());
        assert!(validate_category(&req(Some(&"n".repeat(MAX_NAME_LEN + 1)), None), true).is_err());
    }

    #[tokio::test]
    async fn test_create_category_requires_admin_token() {
        let app = Router::new().route("/api/categories", post(create_category));
        let res = app
            .oneshot(
                Request::post("/api/categories")
                    .header("content-type", "application/json")
                    .body(Body::from(r#"{"name":"Fantasy"}"#))
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::UNAUTHORIZED);
    }

    #[tokio::test]
    async fn test_get_category_rejects_malformed_id() {
        let app = Router::new().route("/api/categories/{id}", get(get_category));
        let res = app
            .oneshot(Request::get("/api/categories/fantasy").body(Body::empty()).unwrap())
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::BAD_REQUEST);
    }
}
