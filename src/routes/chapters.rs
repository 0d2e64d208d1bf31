/**
 * Chapter Routes
 * Chapters nested under stories, reading view with prev/next, reordering
 */
use axum::{
    extract::{Path, Query},
    http::{HeaderMap, StatusCode},
    response::IntoResponse,
    Json,
};
use serde::{Deserialize, Serialize};
use sqlx::PgPool;
use uuid::Uuid;

use super::auth::current_user;
use super::stories::{ensure_can_edit, resolve_or_404, ViewQuery};
use super::{parse_id, pool, sanitize_html, ApiError, ApiResponse, FieldError};
use crate::db::{
    self,
    chapters::MoveOutcome,
    models::{Chapter, ChapterChanges, ChapterLink, ChapterStatus, ChapterSummary, NewChapter, Story, User},
};
use crate::ordering::{Direction, MovePlan, MoveRejection, MIN_CHAPTER_NUMBER};
use crate::pagination::{PageParams, Pagination};
use crate::resolve::ResolveOptions;

pub const MAX_TITLE_LEN: usize = 200;
pub const MIN_CONTENT_LEN: usize = 10;
const DEFAULT_PAGE_SIZE: i64 = 20;

// ============================================================================
// Request/Response Types
// ============================================================================

#[derive(Debug, Default, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChapterRequest {
    pub title: Option<String>,
    pub content: Option<String>,
    #[serde(alias = "chapter_number")]
    pub chapter_number: Option<i32>,
    pub status: Option<String>,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveRequest {
    pub direction: Direction,
    #[serde(default)]
    pub confirm_swap: bool,
}

/// Parent story fields shown above a chapter.
#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StoryRef {
    pub id: Uuid,
    pub title: String,
    pub slug: String,
    pub author_id: Option<Uuid>,
}

impl From<&Story> for StoryRef {
    fn from(story: &Story) -> Self {
        Self {
            id: story.id,
            title: story.title.clone(),
            slug: story.slug.clone(),
            author_id: story.author_id,
        }
    }
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ChapterView {
    #[serde(flatten)]
    pub chapter: Chapter,
    pub story: Option<StoryRef>,
    pub prev_chapter: Option<ChapterLink>,
    pub next_chapter: Option<ChapterLink>,
}

#[derive(Debug, Serialize)]
pub struct NavigationResponse {
    pub success: bool,
    pub prev: Option<ChapterLink>,
    pub next: Option<ChapterLink>,
}

#[derive(Debug, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MoveResult {
    pub id: Uuid,
    pub chapter_number: i32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub swapped_with: Option<Uuid>,
}

impl From<MovePlan> for MoveResult {
    fn from(plan: MovePlan) -> Self {
        match plan {
            MovePlan::Renumber { id, to } => Self {
                id,
                chapter_number: to,
                swapped_with: None,
            },
            MovePlan::Swap { mover, other } => Self {
                id: mover.id,
                chapter_number: mover.chapter_number,
                swapped_with: Some(other.id),
            },
        }
    }
}

// ============================================================================
// Validation
// ============================================================================

fn check_title(title: &str, errors: &mut Vec<FieldError>) {
    if title.is_empty() {
        errors.push(FieldError::new("title", "Please enter a chapter title"));
    } else if title.chars().count() > MAX_TITLE_LEN {
        errors.push(FieldError::new(
            "title",
            format!("Title cannot exceed {} characters", MAX_TITLE_LEN),
        ));
    }
}

fn check_content(content: &str, errors: &mut Vec<FieldError>) {
    if content.chars().count() < MIN_CONTENT_LEN {
        errors.push(FieldError::new(
            "content",
            format!("Content must be at least {} characters", MIN_CONTENT_LEN),
        ));
    }
}

fn check_number(number: i32, errors: &mut Vec<FieldError>) {
    if number < MIN_CHAPTER_NUMBER {
        errors.push(FieldError::new(
            "chapterNumber",
            format!("Chapter number must be at least {}", MIN_CHAPTER_NUMBER),
        ));
    }
}

fn parse_status(raw: Option<&str>, errors: &mut Vec<FieldError>) -> Option<ChapterStatus> {
    match raw.map(str::trim).filter(|s| !s.is_empty())? {
        "published" => Some(ChapterStatus::Published),
        "draft" => Some(ChapterStatus::Draft),
        _ => {
            errors.push(FieldError::new(
                "status",
                "Status must be either published or draft",
            ));
            None
        }
    }
}

pub fn validate_new_chapter(
    req: &ChapterRequest,
    story_id: Uuid,
    created_by: Uuid,
) -> Result<NewChapter, ApiError> {
    let mut errors = Vec::new();
    let title = req.title.as_deref().unwrap_or_default().trim().to_string();
    let content = sanitize_html(req.content.as_deref().unwrap_or_default().trim());
    check_title(&title, &mut errors);
    check_content(&content, &mut errors);
    match req.chapter_number {
        Some(n) => check_number(n, &mut errors),
        None => errors.push(FieldError::new(
            "chapterNumber",
            "Please enter a valid chapter number",
        )),
    }
    let status = parse_status(req.status.as_deref(), &mut errors).unwrap_or(ChapterStatus::Published);

    if !errors.is_empty() {
        return Err(ApiError::Validation(errors));
    }
    Ok(NewChapter {
        story_id,
        title,
        content,
        chapter_number: req.chapter_number.unwrap_or(MIN_CHAPTER_NUMBER),
        status,
        created_by,
    })
}

pub fn validate_chapter_changes(req: &ChapterRequest) -> Result<ChapterChanges, ApiError> {
    let mut errors = Vec::new();
    let mut changes = ChapterChanges::default();

    if let Some(title) = req.title.as_deref().map(str::trim) {
        check_title(title, &mut errors);
        changes.title = Some(title.to_string());
    }
    if let Some(content) = req.content.as_deref() {
        let content = sanitize_html(content.trim());
        check_content(&content, &mut errors);
        changes.content = Some(content);
    }
    if let Some(n) = req.chapter_number {
        check_number(n, &mut errors);
        changes.chapter_number = Some(n);
    }
    changes.status = parse_status(req.status.as_deref(), &mut errors);

    if !errors.is_empty() {
        return Err(ApiError::Validation(errors));
    }
    Ok(changes)
}

/// 409 body for a move onto an occupied number.
pub fn move_rejection(rejection: MoveRejection) -> ApiError {
    match rejection {
        MoveRejection::NeedsSwapConfirmation { target, occupant } => ApiError::Conflict {
            message: rejection.to_string(),
            details: Some(serde_json::json!({
                "targetNumber": target,
                "occupant": occupant,
                "requiresConfirmation": true,
            })),
        },
        MoveRejection::BelowMinimum | MoveRejection::OutOfRange => {
            ApiError::invalid("direction", rejection.to_string())
        }
    }
}

fn duplicate_number() -> ApiError {
    ApiError::invalid("chapterNumber", "This chapter number already exists")
}

fn duplicate_or(e: sqlx::Error) -> ApiError {
    if db::is_unique_violation(&e) {
        duplicate_number()
    } else {
        e.into()
    }
}

/// Load a chapter and its story, and check the caller may modify it.
async fn editable_chapter(
    pool: &PgPool,
    user: &User,
    id: Uuid,
    action: &str,
) -> Result<(Chapter, Story), ApiError> {
    let chapter = db::chapters::find_by_id(pool, id)
        .await?
        .ok_or_else(|| ApiError::not_found("Chapter not found"))?;
    let story = db::stories::find_by_id(pool, chapter.story_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Story not found"))?;
    ensure_can_edit(user, &story, action)?;
    Ok((chapter, story))
}

// ============================================================================
// Handlers
// ============================================================================

/// GET /api/stories/{id}/chapters
pub async fn list_chapters(
    Path(story): Path<String>,
    Query(params): Query<PageParams>,
) -> Result<Json<ApiResponse<Vec<ChapterSummary>>>, ApiError> {
    let page = params.resolve_with_default(DEFAULT_PAGE_SIZE);
    let pool = pool()?;
    let story = resolve_or_404(&pool, &story, ResolveOptions::quiet()).await?;

    let (chapters, total) = db::chapters::list_for_story(&pool, story.id, page).await?;
    Ok(Json(ApiResponse::page(chapters, Pagination::new(page, total))))
}

/// POST /api/stories/{id}/chapters
pub async fn create_chapter(
    headers: HeaderMap,
    Path(story): Path<String>,
    Json(payload): Json<ChapterRequest>,
) -> Result<impl IntoResponse, ApiError> {
    let user = current_user(&headers).await?;
    let pool = pool()?;
    let story = resolve_or_404(&pool, &story, ResolveOptions::quiet()).await?;
    ensure_can_edit(&user, &story, "add chapters to")?;

    let new_chapter = validate_new_chapter(&payload, story.id, user.id)?;
    if db::chapters::find_by_number(&*pool, story.id, new_chapter.chapter_number, None)
        .await?
        .is_some()
    {
        return Err(duplicate_number());
    }

    let chapter = db::chapters::create(&pool, &new_chapter)
        .await
        .map_err(duplicate_or)?;

    tracing::info!(chapter_id = %chapter.id, story_id = %story.id, number = chapter.chapter_number, "chapter created");
    Ok((StatusCode::CREATED, Json(ApiResponse::data(chapter))))
}

/// GET /api/chapters/{id}
pub async fn get_chapter(
    Path(id): Path<String>,
    Query(view): Query<ViewQuery>,
) -> Result<Json<ApiResponse<ChapterView>>, ApiError> {
    let id = parse_id(&id, "chapter")?;
    let pool = pool()?;

    let mut chapter = db::chapters::find_by_id(&pool, id)
        .await?
        .ok_or_else(|| ApiError::not_found("Chapter not found"))?;
    if view.count_view() {
        if let Some(views) = db::chapters::record_view(&pool, id).await? {
            chapter.views = views;
        }
    }

    let story = db::stories::find_by_id(&pool, chapter.story_id).await?;
    let (prev_chapter, next_chapter) =
        db::chapters::neighbours(&pool, chapter.story_id, chapter.chapter_number).await?;

    Ok(Json(ApiResponse::data(ChapterView {
        story: story.as_ref().map(StoryRef::from),
        chapter,
        prev_chapter,
        next_chapter,
    })))
}

/// GET /api/stories/{id}/chapters/navigation/{chapter_id}
pub async fn chapter_navigation(
    Path((story, chapter_id)): Path<(String, String)>,
) -> Result<Json<NavigationResponse>, ApiError> {
    let chapter_id = parse_id(&chapter_id, "chapter")?;
    let pool = pool()?;

    let chapter = db::chapters::find_by_id(&pool, chapter_id)
        .await?
        .ok_or_else(|| ApiError::not_found("Chapter not found"))?;
    let story = resolve_or_404(&pool, &story, ResolveOptions::quiet()).await?;
    if story.id != chapter.story_id {
        return Err(ApiError::not_found("Chapter not found"));
    }

    let (prev, next) = db::chapters::neighbours(&pool, story.id, chapter.chapter_number).await?;
    Ok(Json(NavigationResponse {
        success: true,
        prev,
        next,
    }))
}

/// PUT /api/chapters/{id}
pub async fn update_chapter(
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(payload): Json<ChapterRequest>,
) -> Result<Json<ApiResponse<Chapter>>, ApiError> {
    let id = parse_id(&id, "chapter")?;
    let changes = validate_chapter_changes(&payload)?;
    let user = current_user(&headers).await?;
    let pool = pool()?;
    let (chapter, _) = editable_chapter(&pool, &user, id, "update chapters of").await?;

    if let Some(number) = changes.chapter_number.filter(|n| *n != chapter.chapter_number) {
        if db::chapters::find_by_number(&*pool, chapter.story_id, number, Some(id))
            .await?
            .is_some()
        {
            return Err(duplicate_number());
        }
    }

    let updated = db::chapters::update(&pool, id, &changes)
        .await
        .map_err(duplicate_or)?
        .ok_or_else(|| ApiError::not_found("Chapter not found"))?;

    tracing::info!(chapter_id = %id, user_id = %user.id, "chapter updated");
    Ok(Json(ApiResponse::data(updated)))
}

/// DELETE /api/chapters/{id}
pub async fn delete_chapter(
    headers: HeaderMap,
    Path(id): Path<String>,
) -> Result<Json<ApiResponse<serde_json::Value>>, ApiError> {
    let id = parse_id(&id, "chapter")?;
    let user = current_user(&headers).await?;
    let pool = pool()?;
    editable_chapter(&pool, &user, id, "delete chapters of").await?;

    db::chapters::delete(&pool, id)
        .await?
        .ok_or_else(|| ApiError::not_found("Chapter not found"))?;

    tracing::info!(chapter_id = %id, user_id = %user.id, "chapter deleted");
    Ok(Json(ApiResponse::data(serde_json::json!({}))))
}

/// POST /api/chapters/{id}/move
pub async fn move_chapter(
    headers: HeaderMap,
    Path(id): Path<String>,
    Json(payload): Json<MoveRequest>,
) -> Result<Json<ApiResponse<MoveResult>>, ApiError> {
    let id = parse_id(&id, "chapter")?;
    let user = current_user(&headers).await?;
    let pool = pool()?;
    editable_chapter(&pool, &user, id, "reorder chapters of").await?;

    match db::chapters::move_chapter(&pool, id, payload.direction, payload.confirm_swap).await? {
        MoveOutcome::NotFound => Err(ApiError::not_found("Chapter not found")),
        MoveOutcome::Rejected(rejection) => {
            tracing::debug!(chapter_id = %id, %rejection, "chapter move rejected");
            Err(move_rejection(rejection))
        }
        MoveOutcome::Applied(plan) => {
            let message = match plan {
                MovePlan::Swap { .. } => "Chapters swapped",
                MovePlan::Renumber { .. } => "Chapter moved",
            };
            tracing::info!(chapter_id = %id, ?plan, "chapter moved");
            Ok(Json(ApiResponse::data(MoveResult::from(plan)).with_message(message)))
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::ordering::ChapterSlot;
    use axum::body::Body;
    use axum::http::Request;
    use axum::routing::{get, post};
    use axum::Router;
    use tower::ServiceExt;

    fn request(title: &str, content: &str, number: Option<i32>) -> ChapterRequest {
        ChapterRequest {
            title: Some(title.to_string()),
            content: Some(content.to_string()),
            chapter_number: number,
            status: None,
        }
    }

    fn fields(err: ApiError) -> Vec<String> {
        match err {
            ApiError::Validation(errors) => errors.into_iter().map(|e| e.field).collect(),
            other => panic!("expected validation error, got {:?}", other),
        }
    }

    #[test]
    fn test_new_chapter_defaults_to_published() {
        let story = Uuid::new_v4();
        let chapter =
            validate_new_chapter(&request("Chapter 1", "It was a dark night.", Some(1)), story, Uuid::new_v4())
                .unwrap();
        assert_eq!(chapter.status, ChapterStatus::Published);
        assert_eq!(chapter.story_id, story);
        assert_eq!(chapter.chapter_number, 1);
    }

    #[test]
    fn test_new_chapter_rejects_short_content_and_bad_number() {
        let err = validate_new_chapter(&request("T", "too short", Some(0)), Uuid::new_v4(), Uuid::new_v4())
            .unwrap_err();
        assert_eq!(fields(err), vec!["content", "chapterNumber"]);

        let err = validate_new_chapter(&request("", "long enough content", None), Uuid::new_v4(), Uuid::new_v4())
            .unwrap_err();
        assert_eq!(fields(err), vec!["title", "chapterNumber"]);
    }

    #[test]
    fn test_content_is_sanitized_before_length_check() {
        let err = validate_new_chapter(
            &request("T", "<script>alert('xss-payload')</script>", Some(1)),
            Uuid::new_v4(),
            Uuid::new_v4(),
        )
        .unwrap_err();
        assert_eq!(fields(err), vec!["content"]);
    }

    #[test]
    fn test_changes_accept_partial_update() {
        let changes = validate_chapter_changes(&ChapterRequest {
            status: Some("draft".to_string()),
            ..Default::default()
        })
        .unwrap();
        assert_eq!(changes.status, Some(ChapterStatus::Draft));
        assert!(changes.title.is_none() && changes.content.is_none());

        let err = validate_chapter_changes(&ChapterRequest {
            status: Some("hidden".to_string()),
            ..Default::default()
        })
        .unwrap_err();
        assert_eq!(fields(err), vec!["status"]);
    }

    #[test]
    fn test_snake_case_chapter_number_is_accepted() {
        let req: ChapterRequest = serde_json::from_str(r#"{"chapter_number": 7}"#).unwrap();
        assert_eq!(req.chapter_number, Some(7));
        let req: ChapterRequest = serde_json::from_str(r#"{"chapterNumber": 8}"#).unwrap();
        assert_eq!(req.chapter_number, Some(8));
    }

    #[tokio::test]
    async fn test_swap_without_confirmation_is_conflict_naming_occupant() {
        let occupant = ChapterSlot {
            id: Uuid::nil(),
            chapter_number: 4,
        };
        let res = move_rejection(MoveRejection::NeedsSwapConfirmation {
            target: 4,
            occupant,
        })
        .into_response();
        assert_eq!(res.status(), StatusCode::CONFLICT);
        let bytes = axum::body::to_bytes(res.into_body(), usize::MAX).await.unwrap();
        let body: serde_json::Value = serde_json::from_slice(&bytes).unwrap();
        assert_eq!(body["data"]["targetNumber"], 4);
        assert_eq!(body["data"]["occupant"]["chapterNumber"], 4);
        assert_eq!(body["data"]["occupant"]["id"], Uuid::nil().to_string());
    }

    #[test]
    fn test_move_below_first_chapter_is_validation_error() {
        assert_eq!(move_rejection(MoveRejection::BelowMinimum).status(), StatusCode::BAD_REQUEST);
    }

    #[test]
    fn test_move_result_reports_swap_partner() {
        let mover = ChapterSlot {
            id: Uuid::new_v4(),
            chapter_number: 4,
        };
        let other = ChapterSlot {
            id: Uuid::new_v4(),
            chapter_number: 3,
        };
        let result = MoveResult::from(MovePlan::Swap { mover, other });
        assert_eq!(result.chapter_number, 4);
        assert_eq!(result.swapped_with, Some(other.id));
    }

    async fn call(app: Router, req: Request<Body>) -> (StatusCode, serde_json::Value) {
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
    async fn test_get_chapter_rejects_malformed_id() {
        let app = Router::new().route("/api/chapters/{id}", get(get_chapter));
        let (status, body) = call(
            app,
            Request::get("/api/chapters/abc").body(Body::empty()).unwrap(),
        )
        .await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert_eq!(body["message"], "Invalid chapter id");
    }

    #[tokio::test]
    async fn test_move_requires_login() {
        let app = Router::new().route("/api/chapters/{id}/move", post(move_chapter));
        let req = Request::post(format!("/api/chapters/{}/move", Uuid::new_v4()))
            .header("content-type", "application/json")
            .body(Body::from(r#"{"direction":"down"}"#))
            .unwrap();
        let (status, _) = call(app, req).await;
        assert_eq!(status, StatusCode::UNAUTHORIZED);
    }
}
