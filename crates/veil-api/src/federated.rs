//! Federated sign-in: an opaque provider exchange yields a stable
//! subject id and verified email, which resolve to an account by
//! subject, by email link, or by creation under a derived username.

use async_trait::async_trait;
use axum::{Json, extract::State};
use serde::Deserialize;
use thiserror::Error;
use tracing::{info, warn};
use uuid::Uuid;

use veil_db::Database;
use veil_types::api::{ApiResponse, FederatedLoginRequest, SessionResponse};

use crate::auth::{AppState, issue_session, run_blocking};
use crate::error::{ApiError, ApiResult, AuthFailure};

/// What the provider exchange proves: a stable subject id and an email
/// the provider has verified.
#[derive(Debug, Clone)]
pub struct FederatedIdentity {
    pub subject: String,
    pub email: String,
}

#[derive(Debug, Error)]
pub enum IdentityError {
    #[error("unsupported provider: {0}")]
    UnsupportedProvider(String),

    #[error("provider exchange failed: {0}")]
    Exchange(String),
}

#[async_trait]
pub trait IdentityVerifier: Send + Sync {
    async fn verify(
        &self,
        provider: &str,
        credential: &str,
    ) -> Result<FederatedIdentity, IdentityError>;
}

/// Validates Google ID tokens against the tokeninfo endpoint.
pub struct GoogleVerifier {
    http: reqwest::Client,
    client_id: String,
}

impl GoogleVerifier {
    pub fn new(client_id: String) -> Self {
        Self {
            http: reqwest::Client::new(),
            client_id,
        }
    }
}

#[derive(Debug, Deserialize)]
struct TokenInfo {
    sub: String,
    email: String,
    #[serde(default)]
    email_verified: String,
    aud: String,
}

#[async_trait]
impl IdentityVerifier for GoogleVerifier {
    async fn verify(
        &self,
        provider: &str,
        credential: &str,
    ) -> Result<FederatedIdentity, IdentityError> {
        if provider != "google" {
            return Err(IdentityError::UnsupportedProvider(provider.to_string()));
        }

        let info: TokenInfo = self
            .http
            .get("https://oauth2.googleapis.com/tokeninfo")
            .query(&[("id_token", credential)])
            .send()
            .await
            .map_err(|e| IdentityError::Exchange(e.to_string()))?
            .error_for_status()
            .map_err(|e| IdentityError::Exchange(e.to_string()))?
            .json()
            .await
            .map_err(|e| IdentityError::Exchange(e.to_string()))?;

        if info.aud != self.client_id {
            return Err(IdentityError::Exchange("token audience mismatch".into()));
        }
        if info.email_verified != "true" {
            return Err(IdentityError::Exchange("email not verified by provider".into()));
        }

        Ok(FederatedIdentity {
            subject: info.sub,
            email: info.email.to_lowercase(),
        })
    }
}

pub async fn federated_login(
    State(state): State<AppState>,
    Json(req): Json<FederatedLoginRequest>,
) -> ApiResult<Json<ApiResponse<SessionResponse>>> {
    let identity = state
        .identity
        .verify(&req.provider, &req.credential)
        .await
        .map_err(|e| {
            warn!("federated exchange rejected for provider {:?}: {}", req.provider, e);
            ApiError::Credentials(AuthFailure::ProviderExchange)
        })?;

    let provider = req.provider.clone();
    let account_id = run_blocking(state.clone(), move |db| {
        resolve_federated(db, &provider, &identity)
    })
    .await?;

    let session = issue_session(&state, &account_id).await?;
    Ok(Json(ApiResponse::with_data("signed in", session)))
}

/// Resolution order: (1) provider+subject reuses the account; (2) email
/// match links the provider onto it, leaving password and verified flag
/// untouched; (3) otherwise create a verified account under a derived
/// username with no password.
pub fn resolve_federated(
    db: &Database,
    provider: &str,
    identity: &FederatedIdentity,
) -> anyhow::Result<String> {
    if let Some(account) = db.get_account_by_provider_subject(provider, &identity.subject)? {
        return Ok(account.id);
    }

    if let Some(account) = db.get_account_by_email(&identity.email)? {
        db.link_provider(&account.id, provider, &identity.subject)?;
        info!("linked {} to account {}", provider, account.username);
        return Ok(account.id);
    }

    let username = db.next_free_username(&username_base(&identity.email))?;
    let id = Uuid::new_v4().to_string();
    db.create_federated_account(&id, &username, &identity.email, provider, &identity.subject)?;
    info!("created federated account {}", username);
    Ok(id)
}

/// Base username for a federated account: the email local-part reduced
/// to the allowed charset. Collisions get a numeric suffix appended by
/// the store lookup.
pub fn username_base(email: &str) -> String {
    let local = email.split('@').next().unwrap_or("");
    let base: String = local
        .chars()
        .filter(|c| c.is_ascii_alphanumeric() || *c == '_')
        .take(20)
        .collect();
    if base.chars().count() < 2 {
        "member".to_string()
    } else {
        base
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use veil_db::Database;

    fn identity(subject: &str, email: &str) -> FederatedIdentity {
        FederatedIdentity {
            subject: subject.to_string(),
            email: email.to_string(),
        }
    }

    #[test]
    fn base_strips_disallowed_characters() {
        assert_eq!(username_base("alice@x.com"), "alice");
        assert_eq!(username_base("a.b+tag@x.com"), "abtag");
        assert_eq!(username_base("under_score@x.com"), "under_score");
    }

    #[test]
    fn degenerate_local_part_falls_back() {
        assert_eq!(username_base("+@x.com"), "member");
        assert_eq!(username_base("@x.com"), "member");
    }

    #[test]
    fn subject_match_reuses_account() {
        let db = Database::open_in_memory().unwrap();
        let first = resolve_federated(&db, "google", &identity("sub-1", "alice@x.com")).unwrap();
        let second = resolve_federated(&db, "google", &identity("sub-1", "alice@x.com")).unwrap();
        assert_eq!(first, second);
    }

    #[test]
    fn email_match_links_without_touching_credentials() {
        let db = Database::open_in_memory().unwrap();
        let id = uuid::Uuid::new_v4().to_string();
        db.create_credential_account(&id, "bob", "bob@x.com", "hash", "123456", "2099-01-01T00:00:00+00:00")
            .unwrap();
        db.mark_verified(&id).unwrap();

        let resolved = resolve_federated(&db, "google", &identity("sub-9", "bob@x.com")).unwrap();
        assert_eq!(resolved, id);

        let row = db.get_account_by_id(&id).unwrap().unwrap();
        assert_eq!(row.password_hash.as_deref(), Some("hash"));
        assert!(row.is_verified);
        assert_eq!(db.providers_for_account(&id).unwrap(), vec!["credentials", "google"]);
    }

    #[test]
    fn identical_local_parts_derive_distinct_usernames() {
        let db = Database::open_in_memory().unwrap();
        let a = resolve_federated(&db, "google", &identity("sub-1", "alice@x.com")).unwrap();
        let b = resolve_federated(&db, "google", &identity("sub-2", "alice@y.com")).unwrap();
        assert_ne!(a, b);

        let first = db.get_account_by_id(&a).unwrap().unwrap();
        let second = db.get_account_by_id(&b).unwrap().unwrap();
        assert_eq!(first.username, "alice");
        assert_eq!(second.username, "alice1");
        assert!(second.is_verified);
        assert!(second.password_hash.is_none());
    }
}
