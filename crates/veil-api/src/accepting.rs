use axum::{Extension, Json, extract::State};

use veil_types::api::{AcceptingResponse, ApiResponse, Claims, SetAcceptingRequest};

use crate::auth::{AppState, issue_session, run_blocking};
use crate::error::{ApiError, ApiResult};

/// Current acceptance flag, read from the store rather than the token;
/// the claims may predate a toggle in another tab.
pub async fn get_accepting(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<Json<ApiResponse<AcceptingResponse>>> {
    let id = claims.sub.to_string();
    let flag = run_blocking(state.clone(), move |db| db.get_accepting(&id)).await?;

    // A valid token for a vanished account gets the generic auth rejection.
    let flag = flag.ok_or(ApiError::Unauthenticated)?;

    Ok(Json(ApiResponse::with_data(
        "acceptance state retrieved",
        AcceptingResponse {
            is_accepting_messages: flag,
            token: None,
        },
    )))
}

/// Unconditional overwrite of the flag. The toggle changes
/// session-relevant state, so the response carries a re-signed token.
pub async fn set_accepting(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
    Json(req): Json<SetAcceptingRequest>,
) -> ApiResult<Json<ApiResponse<AcceptingResponse>>> {
    let id = claims.sub.to_string();
    let accepting = req.accepting;
    let updated = run_blocking(state.clone(), move |db| db.set_accepting(&id, accepting)).await?;

    if !updated {
        return Err(ApiError::Unauthenticated);
    }

    let session = issue_session(&state, &claims.sub.to_string()).await?;

    Ok(Json(ApiResponse::with_data(
        "acceptance state updated",
        AcceptingResponse {
            is_accepting_messages: req.accepting,
            token: Some(session.token),
        },
    )))
}
