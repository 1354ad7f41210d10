//! Page-level authorization gate. A pure decision over (valid session
//! present, route class), applied as middleware ahead of every handler
//! that trusts session identity.

use axum::{
    extract::{Request, State},
    middleware::Next,
    response::{IntoResponse, Redirect, Response},
};
use axum_extra::extract::cookie::CookieJar;

use crate::auth::AppState;
use crate::middleware::{bearer_token, decode_session};

/// Cookie consulted for browser navigation, where no Authorization
/// header is available.
pub const SESSION_COOKIE: &str = "veil_session";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum RouteClass {
    /// Sign-in, sign-up, and verify pages.
    AuthOnly,
    /// Dashboard and its sub-resources.
    Protected,
    Open,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GateDecision {
    Pass,
    ToDashboard,
    ToSignIn,
}

fn has_prefix(path: &str, prefix: &str) -> bool {
    path == prefix || path.strip_prefix(prefix).is_some_and(|rest| rest.starts_with('/'))
}

pub fn classify(path: &str) -> RouteClass {
    if has_prefix(path, "/sign-in") || has_prefix(path, "/sign-up") || has_prefix(path, "/verify") {
        RouteClass::AuthOnly
    } else if has_prefix(path, "/dashboard") {
        RouteClass::Protected
    } else {
        RouteClass::Open
    }
}

pub fn decide(authenticated: bool, class: RouteClass) -> GateDecision {
    match (authenticated, class) {
        (true, RouteClass::AuthOnly) => GateDecision::ToDashboard,
        (false, RouteClass::Protected) => GateDecision::ToSignIn,
        _ => GateDecision::Pass,
    }
}

pub async fn page_gate(
    State(state): State<AppState>,
    jar: CookieJar,
    req: Request,
    next: Next,
) -> Response {
    let token = bearer_token(req.headers())
        .map(str::to_string)
        .or_else(|| jar.get(SESSION_COOKIE).map(|c| c.value().to_string()));

    let authenticated = token
        .as_deref()
        .is_some_and(|t| decode_session(t, &state.jwt_secret).is_some());

    match decide(authenticated, classify(req.uri().path())) {
        GateDecision::Pass => next.run(req).await,
        GateDecision::ToDashboard => Redirect::to("/dashboard").into_response(),
        GateDecision::ToSignIn => Redirect::to("/sign-in").into_response(),
    }
}
