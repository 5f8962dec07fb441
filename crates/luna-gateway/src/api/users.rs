use axum::Json;
use axum::extract::State;
use axum::http::StatusCode;
use luna_db::{NewUser, User, UserUpdate};
use luna_security::{InputValidator, TokenPair};
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::auth::AuthUser;
use crate::error::{ApiError, ApiResult};
use crate::state::{PlanStatus, SharedState};

#[derive(Deserialize)]
pub struct RegisterRequest {
    pub email: String,
    pub password: String,
    pub name: Option<String>,
}

#[derive(Deserialize)]
pub struct LoginRequest {
    pub email: String,
    pub password: String,
}

#[derive(Deserialize)]
pub struct RefreshRequest {
    pub refresh_token: String,
}

#[derive(Deserialize)]
pub struct UpdateMeRequest {
    pub name: Option<String>,
    pub password: Option<String>,
    pub current_password: Option<String>,
}

#[derive(Serialize)]
pub struct AuthResponse {
    pub user: User,
    pub tokens: TokenPair,
}

#[derive(Serialize)]
pub struct MeResponse {
    pub user: User,
    pub subscription: PlanStatus,
}

fn invalid_credentials() -> ApiError {
    ApiError::new(StatusCode::UNAUTHORIZED, "invalid email or password")
}

/// POST /api/users/register
pub async fn register(
    State(state): State<SharedState>,
    Json(body): Json<RegisterRequest>,
) -> ApiResult<(StatusCode, Json<AuthResponse>)> {
    let email = InputValidator::email(&body.email)?;
    InputValidator::password(&body.password)?;
    let name = match body.name.as_deref() {
        Some(name) => InputValidator::name("name", name)?,
        None => email.split('@').next().unwrap_or_default().to_string(),
    };

    let user = state.db.create_user(NewUser {
        email,
        name,
        password_hash: state.passwords.hash(&body.password)?,
    })?;
    let tokens = state.tokens.issue_pair(&user.id, &user.email)?;

    Ok((StatusCode::CREATED, Json(AuthResponse { user, tokens })))
}

/// POST /api/users/login
pub async fn login(
    State(state): State<SharedState>,
    Json(body): Json<LoginRequest>,
) -> ApiResult<Json<AuthResponse>> {
    let email = InputValidator::email(&body.email).map_err(|_| invalid_credentials())?;
    let user = state
        .db
        .find_user_by_email(&email)?
        .ok_or_else(invalid_credentials)?;

    if !state.passwords.verify(&body.password, &user.password_hash)? {
        return Err(invalid_credentials());
    }

    let user = if state.passwords.needs_rehash(&user.password_hash) {
        info!("upgrading password hash for user {}", user.id);
        state.db.update_user(
            &user.id,
            UserUpdate {
                password_hash: Some(state.passwords.hash(&body.password)?),
                ..UserUpdate::default()
            },
        )?
    } else {
        user
    };

    let tokens = state.tokens.issue_pair(&user.id, &user.email)?;
    Ok(Json(AuthResponse { user, tokens }))
}

/// POST /api/users/refresh
pub async fn refresh(
    State(state): State<SharedState>,
    Json(body): Json<RefreshRequest>,
) -> ApiResult<Json<TokenPair>> {
    let claims = state.tokens.verify_refresh(&body.refresh_token)?;
    let user = state
        .db
        .get_user(&claims.user_id())?
        .ok_or_else(|| ApiError::new(StatusCode::UNAUTHORIZED, "account no longer exists"))?;
    Ok(Json(state.tokens.issue_pair(&user.id, &user.email)?))
}

/// GET /api/users/me
pub async fn me(State(state): State<SharedState>, AuthUser(user): AuthUser) -> ApiResult<Json<MeResponse>> {
    let subscription = state.plan_status(&user.id)?;
    Ok(Json(MeResponse { user, subscription }))
}

/// PATCH /api/users/me
pub async fn update_me(
    State(state): State<SharedState>,
    AuthUser(user): AuthUser,
    Json(body): Json<UpdateMeRequest>,
) -> ApiResult<Json<User>> {
    let name = body
        .name
        .as_deref()
        .map(|n| InputValidator::name("name", n))
        .transpose()?;

    let password_hash = match body.password.as_deref() {
        Some(password) => {
            let current = body
                .current_password
                .as_deref()
                .ok_or_else(|| ApiError::bad_request("current_password is required to change the password"))?;
            if !state.passwords.verify(current, &user.password_hash)? {
                return Err(ApiError::new(StatusCode::UNAUTHORIZED, "current password is incorrect"));
            }
            InputValidator::password(password)?;
            Some(state.passwords.hash(password)?)
        }
        None => None,
    };

    let updated = state.db.update_user(&user.id, UserUpdate { name, password_hash })?;
    Ok(Json(updated))
}

/// DELETE /api/users/me
pub async fn delete_me(State(state): State<SharedState>, AuthUser(user): AuthUser) -> ApiResult<StatusCode> {
    state.db.delete_user(&user.id)?;
    Ok(StatusCode::NO_CONTENT)
}
