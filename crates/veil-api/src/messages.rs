use axum::{
    Extension, Json,
    extract::{Path, State},
};
use tracing::warn;
use uuid::Uuid;

use veil_types::api::{ApiResponse, Claims, MessagesResponse, SendMessageRequest};
use veil_types::models::Message;

use crate::auth::{AppState, run_blocking};
use crate::error::{ApiError, ApiResult};
use crate::validation;

/// Anonymous send. Content checks run before any store access so
/// malformed input is rejected uniformly regardless of recipient state;
/// the acceptance gate is enforced inside the append statement itself.
pub async fn send_message(
    State(state): State<AppState>,
    Json(req): Json<SendMessageRequest>,
) -> ApiResult<Json<ApiResponse>> {
    let content = req.content.trim().to_string();
    validation::validate_message_content(&content)?;
    let username = validation::normalize_username(&req.username);

    let message_id = Uuid::new_v4().to_string();
    let created_at = chrono::Utc::now().to_rfc3339();

    let landed = run_blocking(state.clone(), move |db| {
        if db.get_account_by_username(&username)?.is_none() {
            return Ok(None);
        }
        let landed = db.append_message_if_accepting(&message_id, &username, &content, &created_at)?;
        Ok(Some(landed))
    })
    .await?;

    match landed {
        None => Err(ApiError::NotFound("recipient not found".into())),
        Some(false) => Err(ApiError::NotAccepting),
        Some(true) => Ok(Json(ApiResponse::ok("message sent"))),
    }
}

/// The owner's ledger, most recent first. An empty ledger is a success,
/// not a 404.
pub async fn get_messages(
    State(state): State<AppState>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<Json<ApiResponse<MessagesResponse>>> {
    let owner = claims.sub.to_string();
    let rows = run_blocking(state.clone(), move |db| db.list_messages(&owner)).await?;

    let messages: Vec<Message> = rows
        .into_iter()
        .map(|row| Message {
            id: row.id.parse().unwrap_or_else(|e| {
                warn!("Corrupt message id '{}': {}", row.id, e);
                Uuid::default()
            }),
            created_at: row
                .created_at
                .parse::<chrono::DateTime<chrono::Utc>>()
                .or_else(|_| {
                    // Older rows may carry SQLite's "YYYY-MM-DD HH:MM:SS"
                    // shape without a timezone; treat those as UTC.
                    chrono::NaiveDateTime::parse_from_str(&row.created_at, "%Y-%m-%d %H:%M:%S")
                        .map(|ndt| ndt.and_utc())
                })
                .unwrap_or_else(|e| {
                    warn!("Corrupt created_at '{}' on message '{}': {}", row.created_at, row.id, e);
                    chrono::DateTime::default()
                }),
            content: row.content,
        })
        .collect();

    Ok(Json(ApiResponse::with_data(
        "messages retrieved",
        MessagesResponse { messages },
    )))
}

/// Owner-scoped delete. Repeating a delete, or aiming at another
/// account's message id, affects nothing and reports not-found.
pub async fn delete_message(
    State(state): State<AppState>,
    Path(message_id): Path<Uuid>,
    Extension(claims): Extension<Claims>,
) -> ApiResult<Json<ApiResponse>> {
    let owner = claims.sub.to_string();
    let id = message_id.to_string();
    let deleted = run_blocking(state.clone(), move |db| db.delete_message(&owner, &id)).await?;

    if deleted {
        Ok(Json(ApiResponse::ok("message deleted")))
    } else {
        Err(ApiError::NotFound("message not found or already deleted".into()))
    }
}
