use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::models::{AccountProfile, Message};

// -- Response envelope --

/// Uniform envelope returned by every endpoint. `data` is omitted from
/// the JSON when there is nothing to carry.
#[derive(Debug, Serialize, Deserialize)]
pub struct ApiResponse<T = serde_json::Value> {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub data: Option<T>,
}

impl ApiResponse {
    pub fn ok(message: impl Into<String>) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: None,
        }
    }

    pub fn failure(message: impl Into<String>) -> Self {
        Self {
            success: false,
            message: message.into(),
            data: None,
        }
    }
}

impl<T> ApiResponse<T> {
    pub fn with_data(message: impl Into<String>, data: T) -> Self {
        Self {
            success: true,
            message: message.into(),
            data: Some(data),
        }
    }
}

// -- Session claims --

/// JWT claims carried by the session token. Decoded by the API
/// middleware and by the page gate; signed fresh on every issuance from
/// the current account row, never from a previous token.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Claims {
    pub sub: Uuid,
    pub username: String,
    pub email: String,
    pub is_verified: bool,
    pub is_accepting_messages: bool,
    pub providers: Vec<String>,
    pub exp: usize,
}

// -- Auth --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SignupRequest {
    pub username: String,
    pub email: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct VerifyCodeRequest {
    pub username: String,
    pub code: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct ResendCodeRequest {
    pub username: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct LoginRequest {
    /// Username or email, caller's choice.
    pub identifier: String,
    pub password: String,
}

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct FederatedLoginRequest {
    pub provider: String,
    /// Opaque credential from the provider exchange (an ID token).
    pub credential: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct SessionResponse {
    pub token: String,
    pub account: AccountProfile,
}

// -- Messages --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SendMessageRequest {
    pub username: String,
    pub content: String,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct MessagesResponse {
    pub messages: Vec<Message>,
}

// -- Acceptance toggle --

#[derive(Debug, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct SetAcceptingRequest {
    pub accepting: bool,
}

#[derive(Debug, Serialize, Deserialize)]
pub struct AcceptingResponse {
    pub is_accepting_messages: bool,
    /// Present when the toggle changed session-relevant state; the
    /// client should replace its stored token with this one.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token: Option<String>,
}

// -- Lookups --

#[derive(Debug, Deserialize)]
pub struct UsernameQuery {
    pub username: String,
}
