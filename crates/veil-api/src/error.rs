use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;
use tracing::error;

use veil_types::api::ApiResponse;

pub type ApiResult<T> = Result<T, ApiError>;

/// Internal detail of a credential-auth rejection. Logged at the raise
/// site, never surfaced: the boundary message stays generic so callers
/// cannot enumerate accounts.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AuthFailure {
    NotFound,
    NotVerified,
    BadCredentials,
    ProviderExchange,
}

#[derive(Debug, Error)]
pub enum ApiError {
    #[error("{0}")]
    Validation(String),

    #[error("{0}")]
    NotFound(String),

    #[error("{0}")]
    Conflict(String),

    #[error("invalid identifier or password")]
    Credentials(AuthFailure),

    #[error("not authenticated")]
    Unauthenticated,

    #[error("user is not accepting messages")]
    NotAccepting,

    #[error("failed to send verification email")]
    Delivery,

    #[error("internal server error")]
    Store,
}

impl ApiError {
    fn status(&self) -> StatusCode {
        match self {
            ApiError::Validation(_) => StatusCode::BAD_REQUEST,
            ApiError::NotFound(_) => StatusCode::NOT_FOUND,
            ApiError::Conflict(_) => StatusCode::CONFLICT,
            ApiError::Credentials(_) | ApiError::Unauthenticated => StatusCode::UNAUTHORIZED,
            ApiError::NotAccepting => StatusCode::FORBIDDEN,
            ApiError::Delivery => StatusCode::BAD_GATEWAY,
            ApiError::Store => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status(), Json(ApiResponse::failure(self.to_string()))).into_response()
    }
}

/// Unexpected store or infrastructure failures collapse to the generic
/// 500 shape; the detail goes to the server log only.
impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        error!("internal error: {:#}", err);
        ApiError::Store
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn credential_failures_share_one_boundary_message() {
        let not_found = ApiError::Credentials(AuthFailure::NotFound).to_string();
        let unverified = ApiError::Credentials(AuthFailure::NotVerified).to_string();
        let bad_password = ApiError::Credentials(AuthFailure::BadCredentials).to_string();
        assert_eq!(not_found, unverified);
        assert_eq!(unverified, bad_password);
    }

    #[test]
    fn statuses_follow_the_taxonomy() {
        assert_eq!(ApiError::Validation("x".into()).status(), StatusCode::BAD_REQUEST);
        assert_eq!(ApiError::NotFound("x".into()).status(), StatusCode::NOT_FOUND);
        assert_eq!(ApiError::Conflict("x".into()).status(), StatusCode::CONFLICT);
        assert_eq!(ApiError::NotAccepting.status(), StatusCode::FORBIDDEN);
        assert_eq!(ApiError::Store.status(), StatusCode::INTERNAL_SERVER_ERROR);
    }
}
