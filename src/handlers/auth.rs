// src/handlers/auth.rs

use axum::{Json, extract::State, http::StatusCode, response::IntoResponse};
use validator::Validate;

use crate::{
    config::Config,
    error::{AppError, Rule},
    models::user::{LoginRequest, LoginResponse, MeResponse, NewUser, RegisterRequest, RegisterResponse},
    repository::DynRepository,
    utils::{
        hash::{hash_password, verify_password},
        html::clean_required,
        jwt::{AuthUser, sign_jwt},
    },
};

/// Emails are compared case-insensitively.
fn normalize_email(email: &str) -> String {
    email.trim().to_lowercase()
}

/// Registers a new teacher or student account.
///
/// Hashes the password using Argon2 before storing it.
/// Returns 201 Created with an access token so the client is signed in immediately.
pub async fn register(
    State(repo): State<DynRepository>,
    State(config): State<Config>,
    Json(payload): Json<RegisterRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let display_name = clean_required(&payload.display_name, "Display name", 100)?;

    let user = repo
        .create_user(NewUser {
            email: normalize_email(&payload.email),
            password_hash: hash_password(&payload.password)?,
            display_name,
            role: payload.role,
        })
        .await?;

    tracing::info!("Registered {} account {}", user.role, user.id);

    let access_token = sign_jwt(user.id, user.role, &config.jwt_secret, config.jwt_expiration)?;

    Ok((
        StatusCode::CREATED,
        Json(RegisterResponse {
            id: user.id,
            email: user.email,
            role: user.role,
            access_token,
        }),
    ))
}

/// Authenticates a user and returns a JWT.
///
/// Every failure (unknown email, disabled account, wrong password) yields the
/// same `INVALID_CREDENTIALS` response.
pub async fn login(
    State(repo): State<DynRepository>,
    State(config): State<Config>,
    Json(payload): Json<LoginRequest>,
) -> Result<impl IntoResponse, AppError> {
    payload.validate()?;

    let user = repo
        .find_user_by_email(&normalize_email(&payload.email))
        .await?
        .filter(|user| user.is_active)
        .ok_or(Rule::InvalidCredentials)?;

    let hash = user
        .password_hash
        .as_deref()
        .ok_or(Rule::InvalidCredentials)?;

    if !verify_password(&payload.password, hash)? {
        tracing::debug!("Rejected login for user {}", user.id);
        return Err(Rule::InvalidCredentials.into());
    }

    let access_token = sign_jwt(user.id, user.role, &config.jwt_secret, config.jwt_expiration)?;

    Ok(Json(LoginResponse { access_token }))
}

/// Profile of the bearer of the token.
pub async fn me(
    State(repo): State<DynRepository>,
    user: AuthUser,
) -> Result<impl IntoResponse, AppError> {
    let user = repo
        .find_user_by_id(user.id)
        .await?
        .ok_or(AppError::NotFound("User not found".to_string()))?;

    Ok(Json(MeResponse::from(user)))
}
