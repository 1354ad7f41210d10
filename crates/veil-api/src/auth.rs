use std::sync::Arc;

use argon2::{
    Argon2, PasswordHash, PasswordHasher, PasswordVerifier,
    password_hash::{SaltString, rand_core::OsRng},
};
use axum::{Json, extract::State, http::StatusCode};
use jsonwebtoken::{EncodingKey, Header, encode};
use tracing::{error, warn};
use uuid::Uuid;

use veil_db::Database;
use veil_email::VerificationMailer;
use veil_types::api::{ApiResponse, Claims, LoginRequest, SessionResponse, SignupRequest};
use veil_types::models::AccountProfile;

use crate::error::{ApiError, ApiResult, AuthFailure};
use crate::federated::IdentityVerifier;
use crate::validation;

pub type AppState = Arc<AppStateInner>;

pub struct AppStateInner {
    pub db: Database,
    pub jwt_secret: String,
    pub mailer: Box<dyn VerificationMailer>,
    pub identity: Box<dyn IdentityVerifier>,
}

/// Register a new credentials account, or refresh an unverified one.
///
/// The account row (including the verification code) is persisted before
/// the email goes out, so a delivery failure leaves a resend path open
/// rather than forcing a re-signup.
pub async fn signup(
    State(state): State<AppState>,
    Json(req): Json<SignupRequest>,
) -> ApiResult<(StatusCode, Json<ApiResponse>)> {
    let username = validation::normalize_username(&req.username);
    validation::validate_username(&username)?;
    let email = req.email.trim().to_lowercase();
    validation::validate_email(&email)?;
    validation::validate_password(&req.password)?;

    let password_hash = hash_password(&req.password)?;
    let code = veil_email::generate_verify_code();
    let expires_at = (chrono::Utc::now() + chrono::Duration::hours(1)).to_rfc3339();

    let db = state.clone();
    let uname = username.clone();
    let addr = email.clone();
    let stored_code = code.clone();
    tokio::task::spawn_blocking(move || -> Result<(), ApiError> {
        if db.db.verified_account_exists(&uname)? {
            return Err(ApiError::Conflict("username is already taken".into()));
        }

        match db.db.get_account_by_email(&addr)? {
            Some(existing) if existing.is_verified => {
                Err(ApiError::Conflict("an account with this email already exists".into()))
            }
            Some(existing) => {
                db.db
                    .reset_unverified_credentials(&existing.id, &password_hash, &stored_code, &expires_at)?;
                Ok(())
            }
            None => {
                // An unverified squatter under a different email still
                // holds the unique username row.
                if db.db.username_taken(&uname)? {
                    return Err(ApiError::Conflict("username is already taken".into()));
                }
                let id = Uuid::new_v4().to_string();
                db.db
                    .create_credential_account(&id, &uname, &addr, &password_hash, &stored_code, &expires_at)?;
                Ok(())
            }
        }
    })
    .await
    .map_err(|e| {
        error!("spawn_blocking join error: {}", e);
        ApiError::Store
    })??;

    state
        .mailer
        .send_verification(&email, &username, &code)
        .await
        .map_err(|e| {
            warn!("verification email to {} failed: {}", email, e);
            ApiError::Delivery
        })?;

    Ok((
        StatusCode::CREATED,
        Json(ApiResponse::ok("registered; check your email for the verification code")),
    ))
}

/// Credential sign-in. The three rejection reasons are logged apart but
/// collapse to one generic message at the boundary.
pub async fn login(
    State(state): State<AppState>,
    Json(req): Json<LoginRequest>,
) -> ApiResult<Json<ApiResponse<SessionResponse>>> {
    let identifier = req.identifier.trim().to_string();

    let db = state.clone();
    let ident = identifier.clone();
    let account = tokio::task::spawn_blocking(move || db.db.get_account_by_identifier(&ident))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            ApiError::Store
        })??;

    let Some(account) = account else {
        warn!("login rejected for {:?}: no such account", identifier);
        return Err(ApiError::Credentials(AuthFailure::NotFound));
    };
    if !account.is_verified {
        warn!("login rejected for {:?}: account not verified", identifier);
        return Err(ApiError::Credentials(AuthFailure::NotVerified));
    }
    // Federation-only accounts have no password to check against.
    let Some(stored_hash) = account.password_hash.as_deref() else {
        warn!("login rejected for {:?}: no credentials on account", identifier);
        return Err(ApiError::Credentials(AuthFailure::BadCredentials));
    };

    let parsed_hash = PasswordHash::new(stored_hash).map_err(|e| {
        error!("corrupt password hash on account {}: {}", account.id, e);
        ApiError::Store
    })?;
    if Argon2::default()
        .verify_password(req.password.as_bytes(), &parsed_hash)
        .is_err()
    {
        warn!("login rejected for {:?}: password mismatch", identifier);
        return Err(ApiError::Credentials(AuthFailure::BadCredentials));
    }

    let session = issue_session(&state, &account.id).await?;
    Ok(Json(ApiResponse::with_data("signed in", session)))
}

/// Build the canonical session payload. Always re-reads the account row
/// and provider set, so a token issued now reflects toggles made since
/// the last one; sessions are not caches of authorization state.
pub async fn issue_session(state: &AppState, account_id: &str) -> Result<SessionResponse, ApiError> {
    let db = state.clone();
    let id = account_id.to_string();
    let (account, providers) = tokio::task::spawn_blocking(move || -> anyhow::Result<_> {
        let account = db.db.get_account_by_id(&id)?;
        let providers = db.db.providers_for_account(&id)?;
        Ok((account, providers))
    })
    .await
    .map_err(|e| {
        error!("spawn_blocking join error: {}", e);
        ApiError::Store
    })??;

    let account = account.ok_or(ApiError::Unauthenticated)?;
    let account_id: Uuid = account.id.parse().map_err(|e| {
        error!("corrupt account id {:?}: {}", account.id, e);
        ApiError::Store
    })?;

    let claims = Claims {
        sub: account_id,
        username: account.username.clone(),
        email: account.email.clone(),
        is_verified: account.is_verified,
        is_accepting_messages: account.is_accepting,
        providers: providers.clone(),
        exp: (chrono::Utc::now() + chrono::Duration::days(30)).timestamp() as usize,
    };

    let token = encode(
        &Header::default(),
        &claims,
        &EncodingKey::from_secret(state.jwt_secret.as_bytes()),
    )
    .map_err(|e| {
        error!("failed to sign session token: {}", e);
        ApiError::Store
    })?;

    Ok(SessionResponse {
        token,
        account: AccountProfile {
            id: account_id,
            username: account.username,
            email: account.email,
            is_verified: account.is_verified,
            is_accepting_messages: account.is_accepting,
            providers,
        },
    })
}

pub(crate) fn hash_password(plain: &str) -> Result<String, ApiError> {
    let salt = SaltString::generate(&mut OsRng);
    Argon2::default()
        .hash_password(plain.as_bytes(), &salt)
        .map(|hash| hash.to_string())
        .map_err(|e| {
            error!("password hashing failed: {}", e);
            ApiError::Store
        })
}

/// Run a store call on the blocking pool, collapsing join failures to
/// the generic store error.
pub(crate) async fn run_blocking<T, F>(state: AppState, f: F) -> Result<T, ApiError>
where
    T: Send + 'static,
    F: FnOnce(&Database) -> anyhow::Result<T> + Send + 'static,
{
    tokio::task::spawn_blocking(move || f(&state.db))
        .await
        .map_err(|e| {
            error!("spawn_blocking join error: {}", e);
            ApiError::Store
        })?
        .map_err(ApiError::from)
}
