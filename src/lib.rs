//! NovelRead Backend - library for app logic and testing

pub mod config;
pub mod db;
pub mod logging;
pub mod ordering;
pub mod pagination;
pub mod rating;
pub mod resolve;
pub mod routes;
pub mod slug;

use axum::{
    extract::DefaultBodyLimit,
    http::{header, HeaderValue, Method},
    middleware,
    routing::{get, post},
    Router,
};
use std::net::SocketAddr;
use tower_http::{
    catch_panic::CatchPanicLayer, compression::CompressionLayer, cors::CorsLayer,
    limit::RequestBodyLimitLayer, services::ServeDir, trace::TraceLayer,
};

use config::CONFIG;
use routes::{admin, auth, categories, chapters, health, stories, users};

/// Cover uploads plus the rest of a multipart form.
pub const MAX_BODY_SIZE: usize = routes::upload::MAX_FILE_SIZE + 1024 * 1024;

/// CORS for the configured frontend origins.
pub fn configure_cors(origins: &[String]) -> CorsLayer {
    let allowed: Vec<HeaderValue> = origins
        .iter()
        .filter_map(|origin| match origin.parse() {
            Ok(value) => Some(value),
            Err(_) => {
                tracing::warn!(origin = %origin, "ignoring unparsable CORS origin");
                None
            }
        })
        .collect();

    CorsLayer::new()
        .allow_origin(allowed)
        .allow_methods([Method::GET, Method::POST, Method::PUT, Method::DELETE])
        .allow_headers([header::CONTENT_TYPE, header::AUTHORIZATION])
        .allow_credentials(true)
}

fn auth_routes() -> Router {
    Router::new()
        .route("/register", post(auth::register))
        .route("/login", post(auth::login))
        .route("/me", get(auth::me))
        .route("/updatepassword", axum::routing::put(auth::update_password))
        .route("/logout", get(auth::logout))
}

fn story_routes() -> Router {
    Router::new()
        .route("/", get(stories::list_stories).post(stories::create_story))
        .route("/featured", get(stories::featured_stories))
        .route("/trending", get(stories::trending_stories))
        .route("/latest", get(stories::latest_stories))
        .route("/completed", get(stories::completed_stories))
        .route("/search", get(stories::search_stories))
        .route("/migration/fix-author", get(stories::fix_missing_authors))
        .route("/by-slug-or-id/{id}", get(stories::get_story_by_slug_or_id))
        .route(
            "/{id}",
            get(stories::get_story)
                .put(stories::update_story)
                .delete(stories::delete_story),
        )
        .route("/{id}/rating", get(stories::get_rating).post(stories::rate_story))
        .route(
            "/{id}/chapters",
            get(chapters::list_chapters).post(chapters::create_chapter),
        )
        .route(
            "/{id}/chapters/navigation/{chapter_id}",
            get(chapters::chapter_navigation),
        )
}

fn chapter_routes() -> Router {
    Router::new()
        .route(
            "/{id}",
            get(chapters::get_chapter)
                .put(chapters::update_chapter)
                .delete(chapters::delete_chapter),
        )
        .route("/{id}/move", post(chapters::move_chapter))
}

fn category_routes() -> Router {
    Router::new()
        .route(
            "/",
            get(categories::list_categories).post(categories::create_category),
        )
        .route(
            "/{id}",
            get(categories::get_category)
                .put(categories::update_category)
                .delete(categories::delete_category),
        )
        .route("/{id}/stories", get(categories::category_stories))
}

fn user_routes() -> Router {
    Router::new()
        .route("/", get(users::list_users).post(users::create_user))
        .route("/bookmarks", get(users::list_bookmarks))
        .route("/bookmarks/check/{story_id}", get(users::check_bookmark))
        .route(
            "/bookmarks/{story_id}",
            post(users::add_bookmark).delete(users::remove_bookmark),
        )
        .route("/history", post(users::record_history))
        .route(
            "/reading-history",
            get(users::reading_history).delete(users::clear_history),
        )
        .route(
            "/reading-history/{id}",
            axum::routing::delete(users::remove_history_entry),
        )
        .route(
            "/{id}",
            get(users::get_user)
                .put(users::update_user)
                .delete(users::delete_user),
        )
}

fn admin_routes() -> Router {
    Router::new()
        .route("/stats", get(admin::stats))
        .route("/stories/recent", get(admin::recent_stories))
        .route("/users/recent", get(admin::recent_users))
}

/// Create and configure the application router.
pub fn create_app() -> Router {
    let cors = configure_cors(&CONFIG.allowed_origins);
    tracing::info!(origins = ?CONFIG.allowed_origins, "CORS configured");

    Router::new()
        .nest("/api/auth", auth_routes())
        .nest("/api/stories", story_routes())
        .nest("/api/chapters", chapter_routes())
        .nest("/api/categories", category_routes())
        .nest("/api/users", user_routes())
        .nest("/api/admin", admin_routes())
        .route("/health", get(health::health_ping))
        .route("/health/ready", get(health::health_ready))
        .route("/health/database", get(health::health_database))
        .nest_service("/uploads", ServeDir::new(&CONFIG.upload_dir))
        .fallback(routes::error::route_not_found)
        .layer(DefaultBodyLimit::max(MAX_BODY_SIZE))
        .layer(CatchPanicLayer::custom(routes::error::panic_response))
        .layer(logging::middleware::propagate_request_id_layer())
        .layer(middleware::from_fn(logging::middleware::log_request))
        .layer(logging::middleware::request_id_layer())
        .layer(TraceLayer::new_for_http())
        .layer(CompressionLayer::new())
        .layer(RequestBodyLimitLayer::new(MAX_BODY_SIZE))
        .layer(cors)
}

/// Run the server (used by main).
pub async fn run() -> std::io::Result<()> {
    dotenvy::dotenv().ok();

    // Dropping the guards stops the background log writers.
    let _log_guards = logging::init(&logging::LogConfig::from_env());

    health::init_start_time();

    if CONFIG.uses_default_secret() {
        if CONFIG.is_production() {
            tracing::error!("JWT_SECRET is not set; refusing to start in production");
            return Err(std::io::Error::other(
                "JWT_SECRET must be set to a unique value in production",
            ));
        }
        tracing::warn!("JWT_SECRET is not set; using the development default");
    }

    if std::env::var("DATABASE_URL").is_ok() {
        match db::init_pool(None).await {
            Ok(pool) => {
                if let Err(e) = db::run_migrations(&pool).await {
                    tracing::error!(error = %e, "failed to run database migrations");
                }
            }
            Err(e) => {
                tracing::warn!(error = %e, "failed to initialize database pool; continuing without database");
            }
        }
    } else {
        tracing::warn!("DATABASE_URL not set; data endpoints will answer 503");
    }

    let app = create_app();

    let addr = CONFIG
        .bind_addr()
        .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidInput, e))?;
    tracing::info!(%addr, environment = %CONFIG.environment, "starting server");

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
}
