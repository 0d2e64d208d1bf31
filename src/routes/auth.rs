/**
 * Authentication Routes
 * JWT bearer tokens: register, login, current user, password change, logout
 */
use axum::{http::HeaderMap, http::StatusCode, response::IntoResponse, Json};
use bcrypt::{hash, verify, DEFAULT_COST};
use chrono::{Duration, Utc};
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use regex::Regex;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use super::{pool, ApiError, ApiResponse, FieldError};
use crate::config::CONFIG;
use crate::db::{
    self,
    models::{NewUser, Role, User},
};

pub const MIN_PASSWORD_LEN: usize = 6;
pub const MAX_USERNAME_LEN: usize = 50;

lazy_static::lazy_static! {
    static ref EMAIL_REGEX: Regex =
        Regex::new(r"^[^\s@]+@[^\s@]+\.[^\s@]+$").expect("email pattern is valid");
}

// ============================================================================
// Types
// ============================================================================

/// JWT Claims structure
#[derive(Debug, Serialize, Deserialize, Clone)]
pub struct Claims {
    pub sub: String,
    pub role: String,
    pub exp: i64,
    pub iat: i64,
}

/// Public part of a user returned on login.
#[derive(Debug, Serialize, Deserialize, Clone, PartialEq)]
#[serde(rename_all = "camelCase")]
pub struct UserInfo {
    pub id: Uuid,
    pub username: String,
    pub email: String,
    pub role: String,
}

impl From<&User> for UserInfo {
    fn from(user: &User) -> Self {
        Self {
            id: user.id,
            username: user.username.clone(),
            email: user.email.clone(),
            role: user.role.clone(),
        }
    }
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct RegisterRequest {
    #[serde(default)]
    pub username: String,
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LoginRequest {
    #[serde(default)]
    pub email: String,
    #[serde(default)]
    pub password: String,
}

#[derive(Debug, Deserialize, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdatePasswordRequest {
    #[serde(default)]
    pub current_password: String,
    #[serde(default)]
    pub new_password: String,
}

#[derive(Debug, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TokenResponse {
    pub success: bool,
    pub token: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<UserInfo>,
}

// ============================================================================
// Tokens
// ============================================================================

pub fn create_token(user_id: Uuid, role: &str) -> Result<String, jsonwebtoken::errors::Error> {
    let now = Utc::now();
    let claims = Claims {
        sub: user_id.to_string(),
        role: role.to_string(),
        exp: (now + Duration::days(CONFIG.jwt_expire_days)).timestamp(),
        iat: now.timestamp(),
    };
    encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(CONFIG.jwt_secret.as_bytes()),
    )
}

pub fn verify_token(token: &str) -> Result<Claims, jsonwebtoken::errors::Error> {
    let data = decode::<Claims>(
        token,
        &DecodingKey::from_secret(CONFIG.jwt_secret.as_bytes()),
        &Validation::default(),
    )?;
    Ok(data.claims)
}

pub fn extract_bearer_token(headers: &HeaderMap) -> Option<&str> {
    headers
        .get("authorization")
        .and_then(|v| v.to_str().ok())
        .and_then(|v| v.strip_prefix("Bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
}

/// Verify the bearer token and return the user id it was issued for.
pub fn token_subject(headers: &HeaderMap) -> Result<Uuid, ApiError> {
    let token = extract_bearer_token(headers)
        .ok_or_else(|| ApiError::unauthorized("Not authorized, please log in"))?;
    let claims = verify_token(token).map_err(|e| {
        tracing::debug!(error = %e, "rejected bearer token");
        ApiError::unauthorized("Not authorized, please log in again")
    })?;
    Uuid::try_parse(&claims.sub)
        .map_err(|_| ApiError::unauthorized("Not authorized, please log in again"))
}

/// The user behind the request's bearer token.
pub async fn current_user(headers: &HeaderMap) -> Result<User, ApiError> {
    let user_id = token_subject(headers)?;
    let pool = pool()?;
    db::users::find_by_id(&pool, user_id)
        .await?
        .ok_or_else(|| ApiError::unauthorized("Not authorized, please log in again"))
}

/// Like [`current_user`] but only admins pass.
pub async fn require_admin(headers: &HeaderMap) -> Result<User, ApiError> {
    let user = current_user(headers).await?;
    if !user.is_admin() {
        return Err(ApiError::forbidden(format!(
            "Role '{}' is not allowed to access this resource",
            user.role
        )));
    }
    Ok(user)
}

// ============================================================================
// Validation and hashing
// ============================================================================

pub fn is_valid_email(email: &str) -> bool {
    EMAIL_REGEX.is_match(email)
}

pub fn check_username(username: &str, errors: &mut Vec<FieldError>) {
    let username = username.trim();
    if username.is_empty() {
        errors.push(FieldError::new("username", "Username is required"));
    } else if username.chars().count() > MAX_USERNAME_LEN {
        errors.push(FieldError::new(
            "username",
            format!("Username cannot exceed {} characters", MAX_USERNAME_LEN),
        ));
    }
}

pub fn check_email(email: &str, errors: &mut Vec<FieldError>) {
    if !is_valid_email(email.trim()) {
        errors.push(FieldError::new("email", "Please provide a valid email"));
    }
}

pub fn check_password(field: &str, password: &str, errors: &mut Vec<FieldError>) {
    if password.chars().count() < MIN_PASSWORD_LEN {
        errors.push(FieldError::new(
            field,
            format!("Password must be at least {} characters", MIN_PASSWORD_LEN),
        ));
    }
}

/// bcrypt is CPU-bound, so it runs off the async executor.
pub async fn hash_password(password: String) -> Result<String, ApiError> {
    tokio::task::spawn_blocking(move || hash(password, DEFAULT_COST))
        .await
        .map_err(|e| ApiError::Internal(format!("hash task failed: {}", e)))?
        .map_err(|e| ApiError::Internal(format!("failed to hash password: {}", e)))
}

pub async fn verify_password(password: String, password_hash: String) -> Result<bool, ApiError> {
    tokio::task::spawn_blocking(move || verify(password, &password_hash))
        .await
        .map_err(|e| ApiError::Internal(format!("verify task failed: {}", e)))?
        .or_else(|e| {
            tracing::warn!(error = %e, "stored password hash is unreadable");
            Ok(false)
        })
}

fn issue(user: &User) -> Result<String, ApiError> {
    create_token(user.id, &user.role)
        .map_err(|e| ApiError::Internal(format!("failed to create token: {}", e)))
}

// ============================================================================
// Handlers
// ============================================================================

/// POST /api/auth/register
pub async fn register(Json(payload): Json<RegisterRequest>) -> Result<impl IntoResponse, ApiError> {
    let mut errors = Vec::new();
    check_username(&payload.username, &mut errors);
    check_email(&payload.email, &mut errors);
    check_password("password", &payload.password, &mut errors);
    if !errors.is_empty() {
        return Err(ApiError::Validation(errors));
    }

    let pool = pool()?;
    let username = payload.username.trim().to_string();
    let email = payload.email.trim().to_lowercase();

    let taken = db::users::taken(&pool, Some(&username), Some(&email), None).await?;
    if taken.email {
        return Err(ApiError::bad_request("Email is already in use"));
    }
    if taken.username {
        return Err(ApiError::bad_request("Username is already taken"));
    }

    let password_hash = hash_password(payload.password).await?;
    let user = db::users::create(
        &pool,
        &NewUser {
            username,
            email,
            password_hash,
            role: Role::User,
        },
    )
    .await?;

    tracing::info!(user_id = %user.id, username = %user.username, "user registered");
    let token = issue(&user)?;
    Ok((
        StatusCode::CREATED,
        Json(TokenResponse {
            success: true,
            token,
            user: Some(UserInfo::from(&user)),
        }),
    ))
}

/// POST /api/auth/login
pub async fn login(Json(payload): Json<LoginRequest>) -> Result<Json<TokenResponse>, ApiError> {
    let mut errors = Vec::new();
    check_email(&payload.email, &mut errors);
    if payload.password.is_empty() {
        errors.push(FieldError::new("password", "Password is required"));
    }
    if !errors.is_empty() {
        return Err(ApiError::Validation(errors));
    }

    let pool = pool()?;
    let invalid = || ApiError::unauthorized("Invalid credentials");

    let user = db::users::find_by_email(&pool, payload.email.trim())
        .await?
        .ok_or_else(invalid)?;
    if !verify_password(payload.password, user.password_hash.clone()).await? {
        tracing::warn!(user_id = %user.id, "login failed: wrong password");
        return Err(invalid());
    }

    tracing::info!(user_id = %user.id, "user logged in");
    Ok(Json(TokenResponse {
        success: true,
        token: issue(&user)?,
        user: Some(UserInfo::from(&user)),
    }))
}

/// GET /api/auth/me
pub async fn me(headers: HeaderMap) -> Result<Json<ApiResponse<User>>, ApiError> {
    let user = current_user(&headers).await?;
    Ok(Json(ApiResponse::data(user)))
}

/// PUT /api/auth/updatepassword
pub async fn update_password(
    headers: HeaderMap,
    Json(payload): Json<UpdatePasswordRequest>,
) -> Result<Json<TokenResponse>, ApiError> {
    let mut errors = Vec::new();
    if payload.current_password.is_empty() {
        errors.push(FieldError::new(
            "currentPassword",
            "Current password is required",
        ));
    }
    check_password("newPassword", &payload.new_password, &mut errors);
    if !errors.is_empty() {
        return Err(ApiError::Validation(errors));
    }

    let user = current_user(&headers).await?;
    if !verify_password(payload.current_password, user.password_hash.clone()).await? {
        return Err(ApiError::unauthorized("Current password is incorrect"));
    }

    let pool = pool()?;
    let password_hash = hash_password(payload.new_password).await?;
    db::users::set_password(&pool, user.id, &password_hash).await?;

    tracing::info!(user_id = %user.id, "password changed");
    Ok(Json(TokenResponse {
        success: true,
        token: issue(&user)?,
        user: None,
    }))
}

/// GET /api/auth/logout
///
/// Tokens are stateless; the client discards its copy.
pub async fn logout(headers: HeaderMap) -> Result<Json<ApiResponse<()>>, ApiError> {
    let user_id = token_subject(&headers)?;
    tracing::info!(user_id = %user_id, "user logged out");
    Ok(Json(ApiResponse::message("Logged out successfully")))
}
