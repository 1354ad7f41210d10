//! Environment-driven configuration, loaded once at startup.
//!
//! ```bash
//! VEIL_HOST=0.0.0.0
//! VEIL_PORT=3000
//! VEIL_DB_PATH=veil.db
//! VEIL_JWT_SECRET=...
//! VEIL_GOOGLE_CLIENT_ID=...apps.googleusercontent.com
//!
//! SMTP_HOST=smtp.example.com
//! SMTP_PORT=587
//! SMTP_USERNAME=user@example.com
//! SMTP_PASSWORD=app_password
//! SMTP_USE_TLS=true
//! VEIL_EMAIL_FROM=no-reply@veil.example
//! VEIL_EMAIL_FROM_NAME="Veil"
//! ```

use anyhow::{Context, Result};

use veil_email::SmtpConfig;

#[derive(Debug, Clone)]
pub struct Config {
    pub host: String,
    pub port: u16,
    pub db_path: String,
    pub jwt_secret: String,
    pub google_client_id: String,
    pub smtp: SmtpConfig,
}

impl Config {
    pub fn from_env() -> Result<Self> {
        let host = env_or("VEIL_HOST", "0.0.0.0");
        let port = env_or("VEIL_PORT", "3000")
            .parse()
            .context("VEIL_PORT must be a port number")?;
        let db_path = env_or("VEIL_DB_PATH", "veil.db");
        let jwt_secret = env_or("VEIL_JWT_SECRET", "dev-secret-change-me");
        let google_client_id = std::env::var("VEIL_GOOGLE_CLIENT_ID").unwrap_or_default();

        let smtp = SmtpConfig {
            host: env_or("SMTP_HOST", "localhost"),
            port: env_or("SMTP_PORT", "587")
                .parse()
                .context("SMTP_PORT must be a port number")?,
            username: std::env::var("SMTP_USERNAME").ok(),
            password: std::env::var("SMTP_PASSWORD").ok(),
            use_tls: env_or("SMTP_USE_TLS", "true")
                .parse()
                .context("SMTP_USE_TLS must be true or false")?,
            from_address: env_or("VEIL_EMAIL_FROM", "no-reply@veil.local"),
            from_name: std::env::var("VEIL_EMAIL_FROM_NAME").ok(),
        };

        Ok(Self {
            host,
            port,
            db_path,
            jwt_secret,
            google_client_id,
            smtp,
        })
    }
}

fn env_or(key: &str, default: &str) -> String {
    std::env::var(key).unwrap_or_else(|_| default.into())
}
