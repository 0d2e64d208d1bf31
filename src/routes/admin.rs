/**
 * Admin Routes
 * Back-office dashboard: site totals and the newest stories and users
 */
use axum::{http::HeaderMap, Json};

use super::auth::require_admin;
use super::{pool, ApiError, ApiResponse};
use crate::db::{
    self,
    models::{SiteStats, Story, User},
};

const RECENT_LIMIT: i64 = 5;

/// GET /api/admin/stats
pub async fn stats(headers: HeaderMap) -> Result<Json<ApiResponse<SiteStats>>, ApiError> {
    require_admin(&headers).await?;
    let pool = pool()?;
    Ok(Json(ApiResponse::data(db::users::stats(&pool).await?)))
}

/// GET /api/admin/stories/recent
pub async fn recent_stories(headers: HeaderMap) -> Result<Json<ApiResponse<Vec<Story>>>, ApiError> {
    require_admin(&headers).await?;
    let pool = pool()?;
    let stories = db::users::recent_stories(&pool, RECENT_LIMIT).await?;
    Ok(Json(ApiResponse::data(stories)))
}

/// GET /api/admin/users/recent
pub async fn recent_users(headers: HeaderMap) -> Result<Json<ApiResponse<Vec<User>>>, ApiError> {
    require_admin(&headers).await?;
    let pool = pool()?;
    let users = db::users::recent_users(&pool, RECENT_LIMIT).await?;
    Ok(Json(ApiResponse::data(users)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::body::Body;
    use axum::http::{Request, StatusCode};
    use axum::routing::get;
    use axum::Router;
    use tower::ServiceExt;

    fn admin_router() -> Router {
        Router::new()
            .route("/api/admin/stats", get(stats))
            .route("/api/admin/stories/recent", get(recent_stories))
            .route("/api/admin/users/recent", get(recent_users))
    }

    #[tokio::test]
    async fn test_back_office_requires_token() {
        for uri in [
            "/api/admin/stats",
            "/api/admin/stories/recent",
            "/api/admin/users/recent",
        ] {
            let res = admin_router()
                .oneshot(Request::get(uri).body(Body::empty()).unwrap())
                .await
                .unwrap();
            assert_eq!(res.status(), StatusCode::UNAUTHORIZED, "{}", uri);
        }
    }

    #[tokio::test]
    async fn test_valid_token_without_database_is_unavailable() {
        let token = crate::routes::auth::create_token(uuid::Uuid::new_v4(), "admin").unwrap();
        let res = admin_router()
            .oneshot(
                Request::get("/api/admin/stats")
                    .header("authorization", format!("Bearer {}", token))
                    .body(Body::empty())
                    .unwrap(),
            )
            .await
            .unwrap();
        assert_eq!(res.status(), StatusCode::SERVICE_UNAVAILABLE);
    }
}
