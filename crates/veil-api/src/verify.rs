//! Email-ownership verification: code issuance and the three-way check.

use axum::{Json, extract::State};
use chrono::{DateTime, Utc};
use tracing::warn;

use veil_types::api::{ApiResponse, ResendCodeRequest, VerifyCodeRequest};

use crate::auth::{AppState, run_blocking};
use crate::error::{ApiError, ApiResult};
use crate::validation;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CodeCheck {
    AlreadyVerified,
    Expired,
    Valid,
    Invalid,
}

/// Decide a verification attempt. Precedence is fixed: already-verified,
/// then expiry, then equality. A re-verify on a verified account never
/// leaks expiry state, and an expired code is reported as expired
/// whether or not it matches.
pub fn evaluate_code(
    is_verified: bool,
    stored: Option<&str>,
    expires_at: Option<DateTime<Utc>>,
    submitted: &str,
    now: DateTime<Utc>,
) -> CodeCheck {
    if is_verified {
        return CodeCheck::AlreadyVerified;
    }
    let (Some(stored), Some(expires_at)) = (stored, expires_at) else {
        return CodeCheck::Invalid;
    };
    if now > expires_at {
        return CodeCheck::Expired;
    }
    if stored == submitted {
        CodeCheck::Valid
    } else {
        CodeCheck::Invalid
    }
}

pub async fn verify_code(
    State(state): State<AppState>,
    Json(req): Json<VerifyCodeRequest>,
) -> ApiResult<Json<ApiResponse>> {
    let username = validation::normalize_username(&req.username);
    let submitted = req.code.trim().to_string();

    let uname = username.clone();
    let account = run_blocking(state.clone(), move |db| db.get_account_by_username(&uname)).await?;

    // Unknown accounts get the same rejection as a wrong code.
    let Some(account) = account else {
        return Err(ApiError::Validation("invalid verification code".into()));
    };

    let expires_at = account
        .verify_code_expires_at
        .as_deref()
        .and_then(parse_expiry);

    match evaluate_code(
        account.is_verified,
        account.verify_code.as_deref(),
        expires_at,
        &submitted,
        Utc::now(),
    ) {
        CodeCheck::AlreadyVerified => Ok(Json(ApiResponse::ok("account is already verified"))),
        CodeCheck::Expired => Err(ApiError::Validation(
            "verification code has expired; request a new one".into(),
        )),
        CodeCheck::Valid => {
            let id = account.id.clone();
            run_blocking(state.clone(), move |db| db.mark_verified(&id)).await?;
            Ok(Json(ApiResponse::ok("account verified")))
        }
        CodeCheck::Invalid => Err(ApiError::Validation("invalid verification code".into())),
    }
}

/// The one user-facing recovery path for a failed delivery. Responds
/// generically whether or not the account exists or still needs a code.
pub async fn resend_code(
    State(state): State<AppState>,
    Json(req): Json<ResendCodeRequest>,
) -> ApiResult<Json<ApiResponse>> {
    const GENERIC: &str = "if the account needs verification, a new code is on its way";

    let username = validation::normalize_username(&req.username);

    let uname = username.clone();
    let account = run_blocking(state.clone(), move |db| db.get_account_by_username(&uname)).await?;

    let Some(account) = account.filter(|a| !a.is_verified) else {
        return Ok(Json(ApiResponse::ok(GENERIC)));
    };

    let code = veil_email::generate_verify_code();
    let expires_at = (Utc::now() + chrono::Duration::hours(1)).to_rfc3339();

    let id = account.id.clone();
    let stored_code = code.clone();
    run_blocking(state.clone(), move |db| {
        db.set_verify_code(&id, &stored_code, &expires_at)
    })
    .await?;

    state
        .mailer
        .send_verification(&account.email, &account.username, &code)
        .await
        .map_err(|e| {
            warn!("verification email to {} failed: {}", account.email, e);
            ApiError::Delivery
        })?;

    Ok(Json(ApiResponse::ok(GENERIC)))
}

fn parse_expiry(raw: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(raw)
        .map(|dt| dt.with_timezone(&Utc))
        .ok()
}
