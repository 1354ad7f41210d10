use std::net::SocketAddr;
use std::path::PathBuf;
use std::sync::Arc;

use axum::{
    Json, Router,
    http::StatusCode,
    middleware,
    response::IntoResponse,
    routing::{delete, get, post},
};
use tower_http::cors::CorsLayer;
use tower_http::trace::TraceLayer;
use tracing::info;

use veil_api::auth::{self, AppState, AppStateInner};
use veil_api::federated::{self, GoogleVerifier};
use veil_api::gate;
use veil_api::middleware::require_auth;
use veil_api::{accepting, lookup, messages, verify};
use veil_email::SmtpMailer;
use veil_types::api::ApiResponse;

mod config;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Load .env if present
    let _ = dotenvy::dotenv();

    // Init logging
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "veil=debug,tower_http=debug".into()),
        )
        .init();

    let config = config::Config::from_env()?;

    // Store handle and external collaborators, established once.
    let db = veil_db::Database::open(&PathBuf::from(&config.db_path))?;
    let mailer = SmtpMailer::new(config.smtp.clone())?;
    let identity = GoogleVerifier::new(config.google_client_id.clone());

    let state: AppState = Arc::new(AppStateInner {
        db,
        jwt_secret: config.jwt_secret.clone(),
        mailer: Box::new(mailer),
        identity: Box::new(identity),
    });

    let public_routes = Router::new()
        .route("/api/username-available", get(lookup::username_available))
        .route("/api/recipients/{username}", get(lookup::recipient_exists))
        .route("/api/auth/signup", post(auth::signup))
        .route("/api/auth/verify", post(verify::verify_code))
        .route("/api/auth/resend-code", post(verify::resend_code))
        .route("/api/auth/login", post(auth::login))
        .route("/api/auth/federated", post(federated::federated_login))
        .route("/api/send", post(messages::send_message))
        .with_state(state.clone());

    let protected_routes = Router::new()
        .route(
            "/api/accepting",
            get(accepting::get_accepting).put(accepting::set_accepting),
        )
        .route("/api/messages", get(messages::get_messages))
        .route("/api/messages/{message_id}", delete(messages::delete_message))
        .layer(middleware::from_fn_with_state(state.clone(), require_auth))
        .with_state(state.clone());

    let app = Router::new()
        .merge(public_routes)
        .merge(protected_routes)
        .fallback(not_found)
        .layer(middleware::from_fn_with_state(state.clone(), gate::page_gate))
        .layer(CorsLayer::permissive())
        .layer(TraceLayer::new_for_http());

    let addr: SocketAddr = format!("{}:{}", config.host, config.port).parse()?;
    info!("Veil server listening on {}", addr);

    let listener = tokio::net::TcpListener::bind(addr).await?;
    axum::serve(listener, app).await?;

    Ok(())
}

async fn not_found() -> impl IntoResponse {
    (StatusCode::NOT_FOUND, Json(ApiResponse::failure("resource not found")))
}
