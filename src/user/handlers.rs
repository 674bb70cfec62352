use axum::{
    extract::{Path, State},
    http::StatusCode,
    Extension, Json,
};
use std::sync::Arc;
use tracing::{info, instrument};

use super::{
    service::UserService,
    types::{
        ChangePasswordRequest, LoginRequest, LoginResponse, RegisterRequest,
        UpdateProfileRequest, UserResponse,
    },
};
use crate::auth::types::CurrentUser;
use crate::shared::{AppError, AppState};

/// HTTP handler for registering a new user
///
/// POST /api/users/register
/// Returns the created user (without credential material)
#[instrument(name = "register", skip(state, request))]
pub async fn register(
    State(state): State<AppState>,
    Json(request): Json<RegisterRequest>,
) -> Result<(StatusCode, Json<UserResponse>), AppError> {
    info!(email = %request.email, "Registering user");

    let service = UserService::new(
        Arc::clone(&state.user_repository),
        state.token_config.clone(),
    );
    let user = service.register(request).await?;

    info!(user_id = %user.id, "User registered successfully");

    Ok((StatusCode::CREATED, Json(user)))
}

/// HTTP handler for logging in
///
/// POST /api/users/login
/// Returns a bearer token plus the authenticated user
#[instrument(name = "login", skip(state, request))]
pub async fn login(
    State(state): State<AppState>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, AppError> {
    info!(email = %request.email, "Logging in user");

    let service = UserService::new(
        Arc::clone(&state.user_repository),
        state.token_config.clone(),
    );
    let response = service.login(request).await?;

    info!(user_id = %response.user.id, "Login successful");

    Ok(Json(response))
}

/// HTTP handler for updating username/email
///
/// PATCH /api/users/:id/profile
#[instrument(name = "update_profile", skip(state, actor, request))]
pub async fn update_profile(
    State(state): State<AppState>,
    Extension(CurrentUser(actor)): Extension<CurrentUser>,
    Path(user_id): Path<String>,
    Json(request): Json<UpdateProfileRequest>,
) -> Result<Json<UserResponse>, AppError> {
    info!(actor_id = %actor.id, target_id = %user_id, "Updating profile");

    let service = UserService::new(
        Arc::clone(&state.user_repository),
        state.token_config.clone(),
    );
    let user = service.update_profile(&actor, &user_id, request).await?;

    Ok(Json(user))
}

/// HTTP handler for changing the password
///
/// PATCH /api/users/:id/password
#[instrument(name = "change_password", skip(state, actor, request))]
pub async fn change_password(
    State(state): State<AppState>,
    Extension(CurrentUser(actor)): Extension<CurrentUser>,
    Path(user_id): Path<String>,
    Json(request): Json<ChangePasswordRequest>,
) -> Result<Json<UserResponse>, AppError> {
    info!(actor_id = %actor.id, target_id = %user_id, "Changing password");

    let service = UserService::new(
        Arc::clone(&state.user_repository),
        state.token_config.clone(),
    );
    let user = service.change_password(&actor, &user_id, request).await?;

    Ok(Json(user))
}
