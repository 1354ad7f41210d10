//! End-to-end handler flows over an in-memory store, with recording
//! doubles standing in for the email and identity collaborators.

use std::sync::{Arc, Mutex};

use async_trait::async_trait;
use axum::{
    Extension, Json, Router,
    body::Body,
    extract::{Path, Query, State},
    http::{Request, StatusCode, header},
    middleware,
    routing::get,
};
use http_body_util::BodyExt;
use tower::ServiceExt;

use veil_db::Database;
use veil_email::{EmailError, VerificationMailer};
use veil_types::api::{
    ApiResponse, Claims, FederatedLoginRequest, LoginRequest, ResendCodeRequest,
    SendMessageRequest, SessionResponse, SetAcceptingRequest, SignupRequest, UsernameQuery,
    VerifyCodeRequest,
};

use crate::accepting;
use crate::auth::{self, AppState, AppStateInner};
use crate::error::ApiError;
use crate::federated::{self, FederatedIdentity, IdentityError, IdentityVerifier};
use crate::gate;
use crate::lookup;
use crate::messages;
use crate::middleware::{decode_session, require_auth};
use crate::verify;

type SentMail = Arc<Mutex<Vec<(String, String, String)>>>;

struct RecordingMailer {
    sent: SentMail,
    fail: bool,
}

#[async_trait]
impl VerificationMailer for RecordingMailer {
    async fn send_verification(
        &self,
        to: &str,
        username: &str,
        code: &str,
    ) -> Result<(), EmailError> {
        if self.fail {
            return Err(EmailError::SendFailed("smtp unreachable".into()));
        }
        self.sent
            .lock()
            .unwrap()
            .push((to.to_string(), username.to_string(), code.to_string()));
        Ok(())
    }
}

/// Accepts credentials of the form `<subject>:<email>` for the google
/// provider, standing in for the opaque provider exchange.
struct StubVerifier;

#[async_trait]
impl IdentityVerifier for StubVerifier {
    async fn verify(
        &self,
        provider: &str,
        credential: &str,
    ) -> Result<FederatedIdentity, IdentityError> {
        if provider != "google" {
            return Err(IdentityError::UnsupportedProvider(provider.to_string()));
        }
        let (subject, email) = credential
            .split_once(':')
            .ok_or_else(|| IdentityError::Exchange("malformed credential".into()))?;
        Ok(FederatedIdentity {
            subject: subject.to_string(),
            email: email.to_lowercase(),
        })
    }
}

fn test_state(fail_mail: bool) -> (AppState, SentMail) {
    let sent: SentMail = Arc::new(Mutex::new(Vec::new()));
    let state = Arc::new(AppStateInner {
        db: Database::open_in_memory().unwrap(),
        jwt_secret: "test-secret".to_string(),
        mailer: Box::new(RecordingMailer {
            sent: sent.clone(),
            fail: fail_mail,
        }),
        identity: Box::new(StubVerifier),
    });
    (state, sent)
}

async fn signup(state: &AppState, username: &str, email: &str, password: &str) -> Result<StatusCode, ApiError> {
    auth::signup(
        State(state.clone()),
        Json(SignupRequest {
            username: username.into(),
            email: email.into(),
            password: password.into(),
        }),
    )
    .await
    .map(|(status, _)| status)
}

async fn submit_code(state: &AppState, username: &str, code: &str) -> Result<String, ApiError> {
    verify::verify_code(
        State(state.clone()),
        Json(VerifyCodeRequest {
            username: username.into(),
            code: code.into(),
        }),
    )
    .await
    .map(|resp| resp.0.message)
}

fn latest_code(sent: &SentMail) -> String {
    sent.lock().unwrap().last().unwrap().2.clone()
}

fn a_wrong_code(right: &str) -> String {
    if right == "000000" { "000001".into() } else { "000000".into() }
}

/// Signup, verify, and sign in bob@x.com; returns the live session.
async fn bootstrap_bob(state: &AppState, sent: &SentMail) -> SessionResponse {
    assert_eq!(signup(state, "bob", "bob@x.com", "secret1").await.unwrap(), StatusCode::CREATED);
    submit_code(state, "bob", &latest_code(sent)).await.unwrap();

    auth::login(
        State(state.clone()),
        Json(LoginRequest {
            identifier: "bob".into(),
            password: "secret1".into(),
        }),
    )
    .await
    .unwrap()
    .0
    .data
    .unwrap()
}

fn claims_of(state: &AppState, session: &SessionResponse) -> Claims {
    decode_session(&session.token, &state.jwt_secret).unwrap()
}

async fn send(state: &AppState, username: &str, content: &str) -> Result<(), ApiError> {
    messages::send_message(
        State(state.clone()),
        Json(SendMessageRequest {
            username: username.into(),
            content: content.into(),
        }),
    )
    .await
    .map(|_| ())
}

async fn list(state: &AppState, claims: &Claims) -> Vec<veil_types::models::Message> {
    messages::get_messages(State(state.clone()), Extension(claims.clone()))
        .await
        .unwrap()
        .0
        .data
        .unwrap()
        .messages
}

#[tokio::test]
async fn signup_verify_login_flow() {
    let (state, sent) = test_state(false);
    assert_eq!(signup(&state, "bob", "Bob@X.com", "secret1").await.unwrap(), StatusCode::CREATED);

    // Email address is lowercased before storage and delivery.
    assert_eq!(sent.lock().unwrap()[0].0, "bob@x.com");

    // Unverified accounts cannot sign in; the rejection is generic.
    let err = auth::login(
        State(state.clone()),
        Json(LoginRequest { identifier: "bob".into(), password: "secret1".into() }),
    )
    .await
    .err()
    .unwrap();
    assert!(matches!(err, ApiError::Credentials(_)));

    let right = latest_code(&sent);
    let err = submit_code(&state, "bob", &a_wrong_code(&right)).await.err().unwrap();
    assert!(matches!(err, ApiError::Validation(_)));

    assert_eq!(submit_code(&state, "bob", &right).await.unwrap(), "account verified");

    // Re-verify flips nothing and leaks nothing.
    assert_eq!(submit_code(&state, "bob", &right).await.unwrap(), "account is already verified");
    assert_eq!(
        submit_code(&state, "bob", &a_wrong_code(&right)).await.unwrap(),
        "account is already verified"
    );

    // The email works as the identifier too.
    let session = auth::login(
        State(state.clone()),
        Json(LoginRequest { identifier: "bob@x.com".into(), password: "secret1".into() }),
    )
    .await
    .unwrap()
    .0
    .data
    .unwrap();

    let claims = claims_of(&state, &session);
    assert_eq!(claims.username, "bob");
    assert!(claims.is_verified);
    assert!(claims.is_accepting_messages);
    assert_eq!(claims.providers, vec!["credentials"]);
}

#[tokio::test]
async fn verify_rejects_unknown_account_generically() {
    let (state, _sent) = test_state(false);
    let err = submit_code(&state, "ghost", "123456").await.err().unwrap();
    match err {
        ApiError::Validation(msg) => assert_eq!(msg, "invalid verification code"),
        other => panic!("expected generic rejection, got {:?}", other),
    }
}

#[tokio::test]
async fn signup_conflicts_on_verified_username_and_email() {
    let (state, sent) = test_state(false);
    bootstrap_bob(&state, &sent).await;

    let err = signup(&state, "bob", "other@x.com", "secret2").await.err().unwrap();
    assert!(matches!(err, ApiError::Conflict(_)));

    let err = signup(&state, "bobby", "bob@x.com", "secret2").await.err().unwrap();
    assert!(matches!(err, ApiError::Conflict(_)));
}

#[tokio::test]
async fn unverified_resignup_overwrites_password_and_code() {
    let (state, sent) = test_state(false);
    signup(&state, "bob", "bob@x.com", "secret1").await.unwrap();
    let first_code = latest_code(&sent);

    // Same email, not yet verified: fresh password, fresh code.
    signup(&state, "bob", "bob@x.com", "secret2").await.unwrap();
    assert_eq!(sent.lock().unwrap().len(), 2);
    let second_code = latest_code(&sent);

    if first_code != second_code {
        let err = submit_code(&state, "bob", &first_code).await.err().unwrap();
        assert!(matches!(err, ApiError::Validation(_)));
    }
    assert_eq!(submit_code(&state, "bob", &second_code).await.unwrap(), "account verified");

    let err = auth::login(
        State(state.clone()),
        Json(LoginRequest { identifier: "bob".into(), password: "secret1".into() }),
    )
    .await
    .err()
    .unwrap();
    assert!(matches!(err, ApiError::Credentials(_)));

    auth::login(
        State(state.clone()),
        Json(LoginRequest { identifier: "bob".into(), password: "secret2".into() }),
    )
    .await
    .unwrap();
}

#[tokio::test]
async fn delivery_failure_keeps_the_stored_code() {
    let (state, _sent) = test_state(true);
    let err = signup(&state, "bob", "bob@x.com", "secret1").await.err().unwrap();
    assert!(matches!(err, ApiError::Delivery));

    // The account and its code survive, so resend can recover later.
    let account = state.db.get_account_by_username("bob").unwrap().unwrap();
    assert!(account.verify_code.is_some());
    assert!(account.verify_code_expires_at.is_some());
}

#[tokio::test]
async fn resend_code_reissues_and_stays_generic() {
    let (state, sent) = test_state(false);
    signup(&state, "bob", "bob@x.com", "secret1").await.unwrap();

    let resend = |username: &str| {
        let state = state.clone();
        let username = username.to_string();
        async move {
            verify::resend_code(State(state), Json(ResendCodeRequest { username })).await
        }
    };

    resend("bob").await.unwrap();
    assert_eq!(sent.lock().unwrap().len(), 2);
    assert_eq!(submit_code(&state, "bob", &latest_code(&sent)).await.unwrap(), "account verified");

    // Unknown accounts and verified accounts get the same response and
    // trigger no delivery.
    let msg = resend("ghost").await.unwrap().0.message;
    assert_eq!(sent.lock().unwrap().len(), 2);
    assert_eq!(msg, resend("bob").await.unwrap().0.message);
    assert_eq!(sent.lock().unwrap().len(), 2);
}

#[tokio::test]
async fn send_list_delete_flow() {
    let (state, sent) = test_state(false);
    let session = bootstrap_bob(&state, &sent).await;
    let claims = claims_of(&state, &session);

    // Empty ledger is a success, not a 404.
    assert!(list(&state, &claims).await.is_empty());

    send(&state, "bob", "first").await.unwrap();
    send(&state, "bob", "second").await.unwrap();

    let listed = list(&state, &claims).await;
    assert_eq!(listed.len(), 2);

    let target = listed[0].id;
    messages::delete_message(State(state.clone()), Path(target), Extension(claims.clone()))
        .await
        .unwrap();
    assert_eq!(list(&state, &claims).await.len(), 1);

    // Repeating the delete is a not-found, never a silent success.
    let err = messages::delete_message(State(state.clone()), Path(target), Extension(claims.clone()))
        .await
        .err()
        .unwrap();
    assert!(matches!(err, ApiError::NotFound(_)));
}

#[tokio::test]
async fn acceptance_gate_blocks_and_releases() {
    let (state, sent) = test_state(false);
    let session = bootstrap_bob(&state, &sent).await;
    let claims = claims_of(&state, &session);

    let resp = accepting::set_accepting(
        State(state.clone()),
        Extension(claims.clone()),
        Json(SetAcceptingRequest { accepting: false }),
    )
    .await
    .unwrap();
    let data = resp.0.data.unwrap();
    assert!(!data.is_accepting_messages);

    // The re-signed token already reflects the new flag.
    let refreshed = decode_session(data.token.as_deref().unwrap(), &state.jwt_secret).unwrap();
    assert!(!refreshed.is_accepting_messages);

    let err = send(&state, "bob", "hello").await.err().unwrap();
    assert!(matches!(err, ApiError::NotAccepting));
    assert!(list(&state, &claims).await.is_empty());

    let resp = accepting::get_accepting(State(state.clone()), Extension(claims.clone()))
        .await
        .unwrap();
    assert!(!resp.0.data.unwrap().is_accepting_messages);

    accepting::set_accepting(
        State(state.clone()),
        Extension(claims.clone()),
        Json(SetAcceptingRequest { accepting: true }),
    )
    .await
    .unwrap();

    send(&state, "bob", "hello").await.unwrap();
    assert_eq!(list(&state, &claims).await.len(), 1);
}

#[tokio::test]
async fn send_validates_before_touching_the_recipient() {
    let (state, sent) = test_state(false);
    bootstrap_bob(&state, &sent).await;

    let err = send(&state, "ghost", "hi").await.err().unwrap();
    assert!(matches!(err, ApiError::NotFound(_)));

    // Content checks fire even for a valid, accepting recipient, and
    // identically for an unknown one.
    let err = send(&state, "bob", "").await.err().unwrap();
    assert!(matches!(err, ApiError::Validation(_)));
    let err = send(&state, "bob", "   ").await.err().unwrap();
    assert!(matches!(err, ApiError::Validation(_)));
    let err = send(&state, "ghost", "").await.err().unwrap();
    assert!(matches!(err, ApiError::Validation(_)));
    let err = send(&state, "bob", &"x".repeat(401)).await.err().unwrap();
    assert!(matches!(err, ApiError::Validation(_)));
}

#[tokio::test]
async fn federated_login_creates_links_and_reuses() {
    let (state, sent) = test_state(false);

    let sign_in = |provider: &str, credential: &str| {
        let state = state.clone();
        let (provider, credential) = (provider.to_string(), credential.to_string());
        async move {
            federated::federated_login(
                State(state),
                Json(FederatedLoginRequest { provider, credential }),
            )
            .await
        }
    };

    // First sign-in creates a verified, passwordless account.
    let session = sign_in("google", "sub-1:Alice@X.com").await.unwrap().0.data.unwrap();
    assert_eq!(session.account.username, "alice");
    assert!(session.account.is_verified);
    assert!(session.account.providers.contains(&"google".to_string()));

    // Same subject on a later sign-in resolves to the same account.
    let again = sign_in("google", "sub-1:alice@x.com").await.unwrap().0.data.unwrap();
    assert_eq!(again.account.id, session.account.id);

    // A credentials account with a matching email gets linked, not duplicated.
    bootstrap_bob(&state, &sent).await;
    let linked = sign_in("google", "sub-2:bob@x.com").await.unwrap().0.data.unwrap();
    assert_eq!(linked.account.username, "bob");
    assert_eq!(linked.account.providers, vec!["credentials", "google"]);

    // Unsupported providers surface the generic auth failure.
    let err = sign_in("github", "sub-3:carol@x.com").await.err().unwrap();
    assert!(matches!(err, ApiError::Credentials(_)));
}

#[tokio::test]
async fn lookup_endpoints_report_availability_and_existence() {
    let (state, sent) = test_state(false);

    let available = |name: &str| {
        let state = state.clone();
        let username = name.to_string();
        async move {
            lookup::username_available(State(state), Query(UsernameQuery { username })).await
        }
    };

    available("bob").await.unwrap();
    let err = available("x").await.err().unwrap();
    assert!(matches!(err, ApiError::Validation(_)));

    // An unverified signup does not reserve the name for lookups.
    signup(&state, "bob", "bob@x.com", "secret1").await.unwrap();
    available("bob").await.unwrap();
    let err = lookup::recipient_exists(State(state.clone()), Path("bob".to_string()))
        .await
        .err()
        .unwrap();
    assert!(matches!(err, ApiError::NotFound(_)));

    submit_code(&state, "bob", &latest_code(&sent)).await.unwrap();
    let err = available("bob").await.err().unwrap();
    assert!(matches!(err, ApiError::Conflict(_)));
    lookup::recipient_exists(State(state.clone()), Path("bob".to_string()))
        .await
        .unwrap();
}

#[tokio::test]
async fn bearer_middleware_guards_protected_routes() {
    let (state, sent) = test_state(false);
    let session = bootstrap_bob(&state, &sent).await;

    let app = Router::new()
        .route("/api/messages", get(messages::get_messages))
        .layer(middleware::from_fn_with_state(state.clone(), require_auth))
        .with_state(state.clone());

    let resp = app
        .clone()
        .oneshot(Request::builder().uri("/api/messages").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);

    let body = resp.into_body().collect().await.unwrap().to_bytes();
    let envelope: ApiResponse = serde_json::from_slice(&body).unwrap();
    assert!(!envelope.success);

    let resp = app
        .oneshot(
            Request::builder()
                .uri("/api/messages")
                .header(header::AUTHORIZATION, format!("Bearer {}", session.token))
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
}

#[tokio::test]
async fn page_gate_redirects_by_route_class() {
    let (state, sent) = test_state(false);
    let session = bootstrap_bob(&state, &sent).await;

    async fn page() -> &'static str {
        "ok"
    }

    let app = Router::new()
        .fallback(page)
        .layer(middleware::from_fn_with_state(state.clone(), gate::page_gate));

    let request = |uri: &str, token: Option<&str>| {
        let mut builder = Request::builder().uri(uri);
        if let Some(token) = token {
            builder = builder.header(header::AUTHORIZATION, format!("Bearer {}", token));
        }
        builder.body(Body::empty()).unwrap()
    };

    // Unauthenticated visitors bounce off the dashboard.
    let resp = app.clone().oneshot(request("/dashboard", None)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    assert_eq!(resp.headers()[header::LOCATION], "/sign-in");

    // Signed-in users bounce off the auth pages.
    let resp = app
        .clone()
        .oneshot(request("/sign-in", Some(&session.token)))
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);
    assert_eq!(resp.headers()[header::LOCATION], "/dashboard");

    // A garbage token does not count as a session.
    let resp = app.clone().oneshot(request("/dashboard", Some("not-a-jwt"))).await.unwrap();
    assert_eq!(resp.status(), StatusCode::SEE_OTHER);

    // Everything else passes through.
    let resp = app.clone().oneshot(request("/dashboard", Some(&session.token))).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
    let resp = app.oneshot(request("/u/bob", None)).await.unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
}

#[tokio::test]
async fn sessions_refresh_from_the_store_on_issue() {
    let (state, sent) = test_state(false);
    let session = bootstrap_bob(&state, &sent).await;
    let claims = claims_of(&state, &session);
    assert!(claims.is_accepting_messages);

    // Flip the flag behind the session's back, then sign in again: the
    // fresh token must reflect the store, not the old payload.
    let account = state.db.get_account_by_username("bob").unwrap().unwrap();
    state.db.set_accepting(&account.id, false).unwrap();

    let session = auth::login(
        State(state.clone()),
        Json(LoginRequest { identifier: "bob".into(), password: "secret1".into() }),
    )
    .await
    .unwrap()
    .0
    .data
    .unwrap();
    assert!(!claims_of(&state, &session).is_accepting_messages);
}
