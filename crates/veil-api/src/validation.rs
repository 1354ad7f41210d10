//! Input checks shared by the handlers. Everything here runs before any
//! store access so malformed requests are rejected uniformly.

use crate::error::ApiError;

pub const USERNAME_MIN_CHARS: usize = 2;
pub const USERNAME_MAX_CHARS: usize = 20;
pub const PASSWORD_MIN_CHARS: usize = 6;
pub const MESSAGE_MAX_CHARS: usize = 400;

pub fn normalize_username(raw: &str) -> String {
    raw.trim().to_string()
}

pub fn validate_username(username: &str) -> Result<(), ApiError> {
    let len = username.chars().count();
    if len < USERNAME_MIN_CHARS || len > USERNAME_MAX_CHARS {
        return Err(ApiError::Validation(format!(
            "username must be {}-{} characters",
            USERNAME_MIN_CHARS, USERNAME_MAX_CHARS
        )));
    }
    if !username.chars().all(|c| c.is_ascii_alphanumeric() || c == '_') {
        return Err(ApiError::Validation(
            "username may only contain letters, digits, and underscores".into(),
        ));
    }
    Ok(())
}

/// Syntactic check only; ownership is proven by the verification code.
pub fn validate_email(email: &str) -> Result<(), ApiError> {
    let invalid = || ApiError::Validation("invalid email address".into());

    let (local, domain) = email.rsplit_once('@').ok_or_else(invalid)?;
    if local.is_empty() || domain.is_empty() {
        return Err(invalid());
    }
    if email.chars().any(char::is_whitespace) {
        return Err(invalid());
    }
    let (host, tld) = domain.rsplit_once('.').ok_or_else(invalid)?;
    if host.is_empty() || tld.len() < 2 {
        return Err(invalid());
    }
    Ok(())
}

pub fn validate_password(password: &str) -> Result<(), ApiError> {
    if password.chars().count() < PASSWORD_MIN_CHARS {
        return Err(ApiError::Validation(format!(
            "password must be at least {} characters",
            PASSWORD_MIN_CHARS
        )));
    }
    Ok(())
}

/// Content is checked on the trimmed text the caller intends to store.
pub fn validate_message_content(content: &str) -> Result<(), ApiError> {
    if content.is_empty() {
        return Err(ApiError::Validation("message content must not be empty".into()));
    }
    if content.chars().count() > MESSAGE_MAX_CHARS {
        return Err(ApiError::Validation(format!(
            "message content must be no longer than {} characters",
            MESSAGE_MAX_CHARS
        )));
    }
    Ok(())
}
