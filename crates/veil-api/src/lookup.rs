use axum::{
    Json,
    extract::{Path, Query, State},
};

use veil_types::api::{ApiResponse, UsernameQuery};

use crate::auth::{AppState, run_blocking};
use crate::error::{ApiError, ApiResult};
use crate::validation;

/// Signup-time availability probe. Only a *verified* holder makes a
/// username unavailable; an unverified squatter is displaced on signup.
pub async fn username_available(
    State(state): State<AppState>,
    Query(query): Query<UsernameQuery>,
) -> ApiResult<Json<ApiResponse>> {
    let username = validation::normalize_username(&query.username);
    validation::validate_username(&username)?;

    let taken = run_blocking(state.clone(), move |db| db.verified_account_exists(&username)).await?;

    if taken {
        Err(ApiError::Conflict("username is already taken".into()))
    } else {
        Ok(Json(ApiResponse::ok("username is available")))
    }
}

/// Pre-send probe used by the public profile page: does this recipient
/// exist and hold a verified account?
pub async fn recipient_exists(
    State(state): State<AppState>,
    Path(username): Path<String>,
) -> ApiResult<Json<ApiResponse>> {
    let username = validation::normalize_username(&username);

    let exists = run_blocking(state.clone(), move |db| db.verified_account_exists(&username)).await?;

    if exists {
        Ok(Json(ApiResponse::ok("user found")))
    } else {
        Err(ApiError::NotFound("user not found".into()))
    }
}
