use anyhow::Result;
use rusqlite::Connection;
use tracing::info;

pub fn run(conn: &Connection) -> Result<()> {
    conn.execute_batch(
        "
        CREATE TABLE IF NOT EXISTS accounts (
            id                      TEXT PRIMARY KEY,
            username                TEXT NOT NULL UNIQUE,
            email                   TEXT NOT NULL UNIQUE,
            password_hash           TEXT,
            verify_code             TEXT,
            verify_code_expires_at  TEXT,
            is_verified             INTEGER NOT NULL DEFAULT 0,
            is_accepting            INTEGER NOT NULL DEFAULT 1,
            created_at              TEXT NOT NULL DEFAULT (datetime('now'))
        );

        CREATE TABLE IF NOT EXISTS messages (
            id          TEXT PRIMARY KEY,
            owner_id    TEXT NOT NULL REFERENCES accounts(id),
            content     TEXT NOT NULL,
            created_at  TEXT NOT NULL
        );

        CREATE INDEX IF NOT EXISTS idx_messages_owner
            ON messages(owner_id, created_at);

        -- Provider set for an account. subject_id is NULL for the local
        -- credentials provider, which has no external subject.
        CREATE TABLE IF NOT EXISTS account_providers (
            account_id  TEXT NOT NULL REFERENCES accounts(id),
            provider    TEXT NOT NULL,
            subject_id  TEXT,
            UNIQUE(account_id, provider)
        );

        CREATE UNIQUE INDEX IF NOT EXISTS idx_providers_subject
            ON account_providers(provider, subject_id)
            WHERE subject_id IS NOT NULL;
        ",
    )?;

    info!("Database migrations complete");
    Ok(())
}
