use std::sync::Arc;

use axum::{
    extract::{Extension, Path, Query, State},
    Json,
};
use serde::Deserialize;
use serde_json::{json, Value};
use tracing::info;

use shared_config::AppConfig;
use shared_models::auth::{AuthUser, Role, TokenResponse};
use shared_models::error::AppError;
use shared_utils::extractor::require_any_role;
use shared_utils::jwt::issue_token;

use crate::models::{AccountError, CreateUserRequest, LoginRequest};
use crate::services::directory::UserDirectoryService;

const TOKEN_TTL_HOURS: i64 = 24;

fn map_account_error(e: AccountError) -> AppError {
    match e {
        AccountError::NotFound => AppError::NotFound("Account not found".to_string()),
        AccountError::EmailTaken | AccountError::UsernameTaken => AppError::Conflict(e.to_string()),
        AccountError::InvalidCredentials => AppError::Auth(e.to_string()),
        AccountError::AccountDisabled => AppError::Auth(e.to_string()),
        AccountError::AdminImmutable => AppError::Forbidden(e.to_string()),
        AccountError::ValidationError(msg) => AppError::ValidationError(msg),
        AccountError::DatabaseError(msg) => AppError::Database(msg),
    }
}

#[derive(Debug, Deserialize)]
pub struct DoctorListQuery {
    pub department: Option<String>,
}

#[axum::debug_handler]
pub async fn login(
    State(state): State<Arc<AppConfig>>,
    Json(request): Json<LoginRequest>,
) -> Result<Json<TokenResponse>, AppError> {
    let directory = UserDirectoryService::new(&state);

    let account = directory
        .authenticate(&request.username, &request.password)
        .await
        .map_err(map_account_error)?;

    let token = issue_token(
        account.id,
        &account.username,
        Some(&account.email),
        account.role,
        &state.jwt_secret,
        TOKEN_TTL_HOURS,
    )
    .map_err(AppError::Internal)?;

    info!("Login successful for user: {}", account.username);

    Ok(Json(TokenResponse {
        token,
        user_id: account.id,
        username: account.username,
        role: account.role,
    }))
}

#[axum::debug_handler]
pub async fn me(
    State(state): State<Arc<AppConfig>>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<Value>, AppError> {
    let directory = UserDirectoryService::new(&state);
    let account = directory
        .find_by_id(user.id)
        .await
        .map_err(map_account_error)?;

    Ok(Json(json!(account)))
}

#[axum::debug_handler]
pub async fn create_user(
    State(state): State<Arc<AppConfig>>,
    Extension(user): Extension<AuthUser>,
    Json(request): Json<CreateUserRequest>,
) -> Result<Json<Value>, AppError> {
    require_any_role(&user, &[Role::Admin])?;

    let directory = UserDirectoryService::new(&state);
    let account = directory.create(request).await.map_err(map_account_error)?;

    Ok(Json(json!({
        "message": "Account created successfully",
        "user": account,
    })))
}

#[axum::debug_handler]
pub async fn deactivate_user(
    State(state): State<Arc<AppConfig>>,
    Path(user_id): Path<i64>,
    Extension(user): Extension<AuthUser>,
) -> Result<Json<Value>, AppError> {
    require_any_role(&user, &[Role::Admin])?;

    let directory = UserDirectoryService::new(&state);
    let account = directory
        .deactivate(user_id)
        .await
        .map_err(map_account_error)?;

    Ok(Json(json!({
        "message": "Account deactivated",
        "user": account,
    })))
}

#[axum::debug_handler]
pub async fn list_doctors(
    State(state): State<Arc<AppConfig>>,
    Extension(user): Extension<AuthUser>,
    Query(query): Query<DoctorListQuery>,
) -> Result<Json<Value>, AppError> {
    require_any_role(&user, &[Role::Admin, Role::Staff])?;

    let directory = UserDirectoryService::new(&state);
    let doctors = directory
        .list_doctors(query.department.as_deref())
        .await
        .map_err(map_account_error)?;

    Ok(Json(json!(doctors)))
}
