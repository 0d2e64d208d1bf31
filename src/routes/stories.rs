/**
 * Story Routes
 * Catalogue listing, lookup by id/slug/title, create/update/delete, ratings
 */
use axum::{
    extract::{Multipart, Path, Query},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use std::path::Path as FsPath;
use uuid::Uuid;

use super::auth::current_user;
use super::upload::{self, CoverUpload};
use super::{parse_id, pool, sanitize_html, ApiError, ApiResponse, FieldError};
use crate::config::CONFIG;
use crate::db::{
    self,
    models::{Category, ChapterSummary, NewStory, Story, StoryCard, StoryChanges, StoryStatus, User},
    stories::{PgStoryLookup, Ranking, StoryFilter, StorySort},
};
use crate::pagination::{PageParams, Pagination};
use crate::rating::{self, RatingAggregate};
use crate::resolve::{self, Resolution, ResolveOptions, StoryLookup};
use crate::slug;

pub const MAX_TITLE_LEN: usize = 200;
pub const MAX_DESCRIPTION_LEN: usize = 5000;
const DEFAULT_RAIL_LIMIT: i64 = 5;

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Default, Deserialize)]
pub struct ListQuery {
    pub page: Option<i64>,
    pub limit: Option<i64>,
    pub status: Option<String>,
    pub title: Option<String>,
    pub author: Option<String>,
    pub category: Option<String>,
    pub sort: Option<String>,
}

#[derive(Debug, Default, Deserialize)]
pub struct RailQuery {
    pub limit: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct SearchQuery {
    pub q: Option<String>,
    pub page: Option<i64>,
    pub limit: Option<i64>,
}

#[derive(Debug, Default, Deserialize)]
pub struct ViewQuery {
    pub noview: Option<String>,
}

impl ViewQuery {
    pub fn count_view(&self) -> bool {
        !self.noview.as_deref().is_some_and(|v| !v.is_empty())
    }
}

#[derive(Debug, Deserialize, Serialize)]
pub struct RateRequest {
    pub rating: Option<i32>,
}

#[derive(Debug, Serialize)]
pub struct RatingData {
    pub ratings: RatingAggregate,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct UserRatingResponse {
    pub success: bool,
    pub rating: Option<i32>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct FixAuthorResponse {
    pub success: bool,
    pub message: String,
    pub fixed_count: u64,
}

/// Story with everything a detail page shows.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoryDetail {
    #[serde(flatten)]
    pub story: StoryCard,
    pub categories: Vec<Category>,
    pub chapters: Vec<ChapterSummary>,
}

// ============================================================================
// Multipart story form
// ============================================================================

/// Fields of the create/update story form. Absent fields are `None`.
#[derive(Debug, Default)]
pub struct StoryForm {
    pub title: Option<String>,
    pub description: Option<String>,
    pub status: Option<String>,
    pub categories: Option<String>,
    pub cover: Option<CoverUpload>,
}

pub async fn read_story_form(mut multipart: Multipart) -> Result<StoryForm, ApiError> {
    let mut form = StoryForm::default();
    let malformed = |e: axum::extract::multipart::MultipartError| {
        tracing::debug!(error = %e, "malformed story form");
        ApiError::bad_request("Invalid multipart data")
    };

    while let Some(field) = multipart.next_field().await.map_err(malformed)? {
        let name = field.name().unwrap_or_default().to_string();
        match name.as_str() {
            "coverImage" => {
                let file_name = field.file_name().map(str::to_string);
                let bytes = field.bytes().await.map_err(malformed)?;
                if !bytes.is_empty() {
                    form.cover = Some(CoverUpload {
                        file_name,
                        bytes: bytes.to_vec(),
                    });
                }
            }
            "title" | "description" | "status" | "categories" => {
                let value = field.text().await.map_err(malformed)?;
                let slot = match name.as_str() {
                    "title" => &mut form.title,
                    "description" => &mut form.description,
                    "status" => &mut form.status,
                    _ => &mut form.categories,
                };
                *slot = Some(value);
            }
            other => tracing::debug!(field = %other, "ignoring unknown story form field"),
        }
    }
    Ok(form)
}

/// Parse the `categories` field: a JSON array of category ids. Blank
/// entries are skipped; a blank field means "leave unchanged".
pub fn parse_category_ids(raw: Option<&str>) -> Result<Option<Vec<Uuid>>, FieldError> {
    let Some(raw) = raw.map(str::trim).filter(|s| !s.is_empty()) else {
        return Ok(None);
    };
    let invalid = || FieldError::new("categories", "Categories must be a JSON array of ids");
    let values: Vec<String> = serde_json::from_str(raw).map_err(|_| invalid())?;
    values
        .iter()
        .map(|v| v.trim())
        .filter(|v| !v.is_empty())
        .map(|v| Uuid::try_parse(v).map_err(|_| invalid()))
        .collect::<Result<Vec<_>, _>>()
        .map(Some)
}

fn check_title(title: &str, errors: &mut Vec<FieldError>) {
    if title.is_empty() {
        errors.push(FieldError::new("title", "Please enter a story title"));
    } else if title.chars().count() > MAX_TITLE_LEN {
        errors.push(FieldError::new(
            "title",
            format!("Title cannot exceed {} characters", MAX_TITLE_LEN),
        ));
    }
}

fn check_description(description: &str, errors: &mut Vec<FieldError>) {
    if description.is_empty() {
        errors.push(FieldError::new("description", "Please enter a description"));
    } else if description.chars().count() > MAX_DESCRIPTION_LEN {
        errors.push(FieldError::new(
            "description",
            format!("Description cannot exceed {} characters", MAX_DESCRIPTION_LEN),
        ));
    }
}

fn parse_status(raw: Option<&str>, errors: &mut Vec<FieldError>) -> Option<StoryStatus> {
    let raw = raw.map(str::trim).filter(|s| !s.is_empty())?;
    match raw.parse() {
        Ok(status) => Some(status),
        Err(_) => {
            errors.push(FieldError::new(
                "status",
                "Status must be one of ongoing, completed, dropped",
            ));
            None
        }
    }
}

/// Slug for a title; titles without any sluggable character fall back to
/// the story id.
pub fn story_slug(title: &str, id: Uuid) -> String {
    let generated = slug::slugify(title);
    if generated.is_empty() {
        id.to_string()
    } else {
        generated
    }
}

/// Validate a create form. The cover is handled separately.
pub fn validate_new_story(form: &StoryForm, author_id: Uuid) -> Result<NewStory, ApiError> {
    let mut errors = Vec::new();
    let title = form.title.as_deref().unwrap_or_default().trim().to_string();
    let description = sanitize_html(form.description.as_deref().unwrap_or_default().trim());
    check_title(&title, &mut errors);
    check_description(&description, &mut errors);
    let status = parse_status(form.status.as_deref(), &mut errors).unwrap_or(StoryStatus::Ongoing);
    let category_ids = parse_category_ids(form.categories.as_deref())
        .unwrap_or_else(|e| {
            errors.push(e);
            None
        })
        .unwrap_or_default();

    if !errors.is_empty() {
        return Err(ApiError::Validation(errors));
    }

    let id = Uuid::new_v4();
    Ok(NewStory {
        id,
        slug: story_slug(&title, id),
        title,
        author_id,
        description,
        cover_image: None,
        status,
        category_ids,
    })
}

/// Validate an update form; only the fields present are checked.
pub fn validate_story_changes(form: &StoryForm, id: Uuid) -> Result<StoryChanges, ApiError> {
    let mut errors = Vec::new();
    let mut changes = StoryChanges::default();

    if let Some(title) = form.title.as_deref().map(str::trim) {
        check_title(title, &mut errors);
        changes.slug = Some(story_slug(title, id));
        changes.title = Some(title.to_string());
    }
    if let Some(description) = form.description.as_deref() {
        let description = sanitize_html(description.trim());
        check_description(&description, &mut errors);
        changes.description = Some(description);
    }
    changes.status = parse_status(form.status.as_deref(), &mut errors);
    match parse_category_ids(form.categories.as_deref()) {
        Ok(ids) => changes.category_ids = ids,
        Err(e) => errors.push(e),
    }

    if !errors.is_empty() {
        return Err(ApiError::Validation(errors));
    }
    Ok(changes)
}

/// Authors may edit their own stories; admins may edit any.
pub fn ensure_can_edit(user: &User, story: &Story, action: &str) -> Result<(), ApiError> {
    if user.is_admin() || story.author_id == Some(user.id) {
        Ok(())
    } else {
        Err(ApiError::forbidden(format!(
            "You are not allowed to {} this story",
            action
        )))
    }
}

// ============================================================================
// Shared lookups
// ============================================================================

/// Resolve a story id, slug or title; 404 with suggestions on a miss.
pub async fn resolve_or_404(
    pool: &PgPool,
    input: &str,
    options: ResolveOptions,
) -> Result<Story, ApiError> {
    let input = input.trim();
    if input.is_empty() {
        return Err(ApiError::bad_request("Story id or slug is required"));
    }
    match resolve::resolve_story(&PgStoryLookup::new(pool), input, options).await? {
        Resolution::Found { story, .. } => Ok(story),
        Resolution::NotFound { suggestions } => Err(ApiError::NotFound {
            message: "Story not found".to_string(),
            suggestions,
        }),
    }
}

async fn detail(pool: &PgPool, story: Story) -> Result<StoryDetail, ApiError> {
    let card = db::stories::find_card_by_id(pool, story.id)
        .await?
        .unwrap_or(StoryCard {
            story,
            author_username: None,
        });
    let categories = db::stories::categories_of(pool, card.story.id).await?;
    let chapters = db::chapters::summaries_for_story(pool, card.story.id).await?;
    Ok(StoryDetail {
        story: card,
        categories,
        chapters,
    })
}

fn upload_dir() -> &'static FsPath {
    FsPath::new(&CONFIG.upload_dir)
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /api/stories
pub async fn list_stories(
    Query(query): Query<ListQuery>,
) -> Result<Json<ApiResponse<Vec<StoryCard>>>, ApiError> {
    let sort = match query.sort.as_deref().filter(|s| !s.is_empty()) {
        Some(raw) => StorySort::parse(raw).map_err(|e| ApiError::invalid("sort", e))?,
        None => StorySort::default(),
    };
    let author_id = match query.author.as_deref().filter(|s| !s.is_empty()) {
        Some(raw) => Some(parse_id(raw, "author")?),
        None => None,
    };
    let category_id = match query.category.as_deref().filter(|s| !s.is_empty()) {
        Some(raw) => Some(parse_id(raw, "category")?),
        None => None,
    };
    let filter = StoryFilter {
        // Unknown statuses are ignored rather than rejected.
        status: query.status.as_deref().and_then(|s| s.parse().ok()),
        title: query.title.clone(),
        author_id,
        category_id,
    };
    let page = PageParams {
        page: query.page,
        limit: query.limit,
    }
    .resolve();

    let pool = pool()?;
    let (stories, total) = db::stories::list(&pool, &filter, sort, page).await?;
    Ok(Json(ApiResponse::page(stories, Pagination::new(page, total))))
}

async fn rail(ranking: Ranking, query: RailQuery) -> Result<Json<ApiResponse<Vec<StoryCard>>>, ApiError> {
    let limit = PageParams {
        page: None,
        limit: query.limit,
    }
    .resolve_with_default(DEFAULT_RAIL_LIMIT)
    .limit;
    let pool = pool()?;
    let stories = db::stories::ranked(&pool, ranking, limit).await?;
    Ok(Json(ApiResponse::list(stories)))
}

/// GET /api/stories/featured
pub async fn featured_stories(
    Query(query): Query<RailQuery>,
) -> Result<Json<ApiResponse<Vec<StoryCard>>>, ApiError> {
    rail(Ranking::Featured, query).await
}

/// GET /api/stories/trending
pub async fn trending_stories(
    Query(query): Query<RailQuery>,
) -> Result<Json<ApiResponse<Vec<StoryCard>>>, ApiError> {
    rail(Ranking::Trending, query).await
}

/// GET /api/stories/latest
pub async fn latest_stories(
    Query(query): Query<RailQuery>,
) -> Result<Json<ApiResponse<Vec<StoryCard>>>, ApiError> {
    rail(Ranking::Latest, query).await
}

/// GET /api/stories/completed
pub async fn completed_stories(
    Query(query): Query<RailQuery>,
) -> Result<Json<ApiResponse<Vec<StoryCard>>>, ApiError> {
    rail(Ranking::Completed, query).await
}

/// GET /api/stories/search
pub async fn search_stories(
    Query(query): Query<SearchQuery>,
) -> Result<Json<ApiResponse<Vec<StoryCard>>>, ApiError> {
    let q = query.q.as_deref().map(str::trim).unwrap_or_default();
    if q.is_empty() {
        return Ok(Json(ApiResponse::list(Vec::new())));
    }
    let page = PageParams {
        page: query.page,
        limit: query.limit,
    }
    .resolve();

    let pool = pool()?;
    let (stories, total) = db::stories::search(&pool, q, page).await?;
    Ok(Json(ApiResponse::page(stories, Pagination::new(page, total))))
}

/// GET /api/stories/{id}
pub async fn get_story(
    Path(id): Path<String>,
    Query(view): Query<ViewQuery>,
) -> Result<Json<ApiResponse<StoryDetail>>, ApiError> {
    let id = parse_id(&id, "story")?;
    let pool = pool()?;
    let lookup = PgStoryLookup::new(&pool);

    let mut story = lookup
        .by_id(id)
        .await?
        .ok_or_else(|| ApiError::not_found("Story not found"))?;
    if view.count_view() {
        if let Some(views) = lookup.record_view(id).await? {
            story.views = views;
        }
    }
    Ok(Json(ApiResponse::data(detail(&pool, story).await?)))
}

/// GET /api/stories/by-slug-or-id/{id}
pub async fn get_story_by_slug_or_id(
    Path(id_or_slug): Path<String>,
    Query(view): Query<ViewQuery>,
) -> Result<Json<ApiResponse<StoryDetail>>, ApiError> {
    let pool = pool()?;
    let options = ResolveOptions {
        count_view: view.count_view(),
        suggest: true,
    };
    let story = resolve_or_404(&pool, &id_or_slug, options).await?;
    Ok(Json(ApiResponse::data(detail(&pool, story).await?)))
}

/// POST /api/stories
pub async fn create_story(
    headers: HeaderMap,
    multipart: Multipart,
) -> Result<impl IntoResponse, ApiError> {
    let user = current_user(&headers).await?;
    let form = read_story_form(multipart).await?;
    let mut new_story = validate_new_story(&form, user.id)?;

    if let Some(cover) = &form.cover {
        new_story.cover_image = Some(upload::save_cover(upload_dir(), cover).await?);
    }

    let pool = pool()?;
    let story = match db::stories::create(&pool, &new_story).await {
        Ok(story) => story,
        Err(e) => {
            if let Some(url) = &new_story.cover_image {
                upload::remove_cover(upload_dir(), url).await;
            }
            return Err(e.into());
        }
    };

    tracing::info!(story_id = %story.id, slug = %story.slug, author_id = %user.id, "story created");
    Ok((StatusCode::CREATED, Json(ApiResponse::data(story))))
}

/// PUT /api/stories/{id}
pub async fn update_story(
    headers: HeaderMap,
    Path(id): Path<String>,
    multipart: Multipart,
) -> Result<Json<ApiResponse<Story>>, ApiError> {
    let user = current_user(&headers).await?;
    let id = parse_id(&id, "story")?;
    let pool = pool()?;

    let existing = db::stories::find_by_id(&pool, id)
        .await?
        .ok_or_else(|| ApiError::not_found("Story not found"))?;
    ensure_can_edit(&user, &existing, "update")?;

    let form = read_story_form(multipart).await?;
    let mut changes = validate_story_changes(&form, id)?;
    if let Some(cover) = &form.cover {
        changes.cover_image = Some(upload::save_cover(upload_dir(), cover).await?);
    }

    let updated = db::stories::update(&pool, id, &changes)
        .await?
        .ok_or_else(|| ApiError::not_found("Story not found"))?;

    if changes.cover_image.is_some() && existing.cover_image != updated.cover_image {
        upload::remove_cover(upload_dir(), &existing.cover_image).await;
    }

    tracing::info!(story_id = %id, user_id = %user.id, "story updated");
    Ok(Json(ApiResponse::data(updated)))
}

/// DELETE /api/stories/{id}
pub async fn delete_story(
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let user = current_user(&headers).await?;
    let id = parse_id(&id, "story")?;
    let pool = pool()?;

    let story = db::stories::find_by_id(&pool, id)
        .await?
        .ok_or_else(|| ApiError::not_found("Story not found"))?;
    ensure_can_edit(&user, &story, "delete")?;

    db::stories::delete(&pool, id).await?;
    upload::remove_cover(upload_dir(), &story.cover_image).await;

    tracing::info!(story_id = %id, user_id = %user.id, "story deleted");
    Ok(Json(ApiResponse::data(serde_json::json!({}))))
}

/// GET /api/stories/migration/fix-author
pub async fn fix_missing_authors(headers: HeaderMap) -> Result<Json<FixAuthorResponse>, ApiError> {
    let admin = super::auth::require_admin(&headers).await?;
    let pool = pool()?;
    let fixed_count = db::stories::fix_missing_authors(&pool, admin.id).await?;

    tracing::info!(fixed_count, admin_id = %admin.id, "assigned authorless stories");
    Ok(Json(FixAuthorResponse {
        success: true,
        message: format!("Fixed {} stories without an author", fixed_count),
        fixed_count,
    }))
}

/// GET /api/stories/{id}/rating
pub async fn get_rating(
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<UserRatingResponse>, ApiError> {
    let id = parse_id(&id, "story")?;
    let user = current_user(&headers).await?;
    let pool = pool()?;
    let story = db::stories::find_by_id(&pool, id)
        .await?
        .ok_or_else(|| ApiError::not_found("Story not found"))?;
    let rating = db::stories::user_rating(&pool, story.id, user.id).await?;
    Ok(Json(UserRatingResponse {
        success: true,
        rating,
    }))
}

/// POST /api/stories/{id}/rating
pub async fn rate_story(
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(payload): Json<RateRequest>,
) -> Result<Json<ApiResponse<RatingData>>, ApiError> {
    let id = parse_id(&id, "story")?;
    let value = rating::validate(payload.rating.unwrap_or_default())
        .map_err(|e| ApiError::invalid("rating", e))?;

    let user = current_user(&headers).await?;
    let pool = pool()?;

    let ratings = db::stories::rate(&pool, id, user.id, value)
        .await?
        .ok_or_else(|| ApiError::not_found("Story not found"))?;

    tracing::info!(story_id = %id, user_id = %user.id, value, average = ratings.average, "story rated");
    Ok(Json(ApiResponse::data(RatingData { ratings })))
}
