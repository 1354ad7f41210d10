use crate::Database;
use crate::models::{AccountRow, MessageRow};
use anyhow::Result;
use rusqlite::Connection;

impl Database {
    // -- Accounts --

    /// Insert a fresh unverified account from the credentials signup
    /// path, together with its `credentials` provider row.
    pub fn create_credential_account(
        &self,
        id: &str,
        username: &str,
        email: &str,
        password_hash: &str,
        verify_code: &str,
        expires_at: &str,
    ) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO accounts (id, username, email, password_hash, verify_code, verify_code_expires_at, is_verified, is_accepting)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, 0, 1)",
                rusqlite::params![id, username, email, password_hash, verify_code, expires_at],
            )?;
            conn.execute(
                "INSERT INTO account_providers (account_id, provider, subject_id) VALUES (?1, 'credentials', NULL)",
                [id],
            )?;
            Ok(())
        })
    }

    /// Insert an account created by a first federated sign-in. Verified
    /// from birth, no password.
    pub fn create_federated_account(
        &self,
        id: &str,
        username: &str,
        email: &str,
        provider: &str,
        subject_id: &str,
    ) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO accounts (id, username, email, is_verified, is_accepting)
                 VALUES (?1, ?2, ?3, 1, 1)",
                rusqlite::params![id, username, email],
            )?;
            conn.execute(
                "INSERT INTO account_providers (account_id, provider, subject_id) VALUES (?1, ?2, ?3)",
                rusqlite::params![id, provider, subject_id],
            )?;
            Ok(())
        })
    }

    pub fn get_account_by_username(&self, username: &str) -> Result<Option<AccountRow>> {
        self.with_conn(|conn| query_account(conn, "username = ?1", &[&username]))
    }

    pub fn get_account_by_email(&self, email: &str) -> Result<Option<AccountRow>> {
        self.with_conn(|conn| query_account(conn, "email = ?1", &[&email]))
    }

    pub fn get_account_by_id(&self, id: &str) -> Result<Option<AccountRow>> {
        self.with_conn(|conn| query_account(conn, "id = ?1", &[&id]))
    }

    /// Credential sign-in accepts either username or email.
    pub fn get_account_by_identifier(&self, identifier: &str) -> Result<Option<AccountRow>> {
        self.with_conn(|conn| {
            query_account(conn, "username = ?1 OR email = ?1", &[&identifier])
        })
    }

    pub fn get_account_by_provider_subject(
        &self,
        provider: &str,
        subject_id: &str,
    ) -> Result<Option<AccountRow>> {
        self.with_conn(|conn| {
            query_account(
                conn,
                "id = (SELECT account_id FROM account_providers WHERE provider = ?1 AND subject_id = ?2)",
                &[&provider, &subject_id],
            )
        })
    }

    /// A username is taken for signup purposes only when a *verified*
    /// account holds it; unverified squatters can be displaced.
    pub fn verified_account_exists(&self, username: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let n: i64 = conn.query_row(
                "SELECT COUNT(*) FROM accounts WHERE username = ?1 AND is_verified = 1",
                [username],
                |row| row.get(0),
            )?;
            Ok(n > 0)
        })
    }

    pub fn username_taken(&self, username: &str) -> Result<bool> {
        self.with_conn(|conn| username_exists(conn, username))
    }

    /// Re-signup while unverified overwrites the password and issues a
    /// fresh code; everything else on the row is left alone.
    pub fn reset_unverified_credentials(
        &self,
        id: &str,
        password_hash: &str,
        verify_code: &str,
        expires_at: &str,
    ) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE accounts
                 SET password_hash = ?2, verify_code = ?3, verify_code_expires_at = ?4
                 WHERE id = ?1 AND is_verified = 0",
                rusqlite::params![id, password_hash, verify_code, expires_at],
            )?;
            Ok(())
        })
    }

    pub fn set_verify_code(&self, id: &str, verify_code: &str, expires_at: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "UPDATE accounts SET verify_code = ?2, verify_code_expires_at = ?3 WHERE id = ?1",
                rusqlite::params![id, verify_code, expires_at],
            )?;
            Ok(())
        })
    }

    pub fn mark_verified(&self, id: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute("UPDATE accounts SET is_verified = 1 WHERE id = ?1", [id])?;
            Ok(())
        })
    }

    /// Record a federated provider on an existing account. A single
    /// upsert, so a failure leaves no partial link behind.
    pub fn link_provider(&self, account_id: &str, provider: &str, subject_id: &str) -> Result<()> {
        self.with_conn(|conn| {
            conn.execute(
                "INSERT INTO account_providers (account_id, provider, subject_id)
                 VALUES (?1, ?2, ?3)
                 ON CONFLICT(account_id, provider) DO UPDATE SET subject_id = excluded.subject_id",
                rusqlite::params![account_id, provider, subject_id],
            )?;
            Ok(())
        })
    }

    pub fn providers_for_account(&self, account_id: &str) -> Result<Vec<String>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT provider FROM account_providers WHERE account_id = ?1 ORDER BY provider",
            )?;
            let rows = stmt
                .query_map([account_id], |row| row.get(0))?
                .collect::<std::result::Result<Vec<String>, _>>()?;
            Ok(rows)
        })
    }

    /// Derive a free username from a base: the base itself, else the
    /// base with the first free numeric suffix appended.
    pub fn next_free_username(&self, base: &str) -> Result<String> {
        self.with_conn(|conn| {
            if !username_exists(conn, base)? {
                return Ok(base.to_string());
            }
            let mut counter = 1u32;
            loop {
                let candidate = format!("{}{}", base, counter);
                if !username_exists(conn, &candidate)? {
                    return Ok(candidate);
                }
                counter += 1;
            }
        })
    }

    /// Returns false when no such account exists.
    pub fn set_accepting(&self, id: &str, accepting: bool) -> Result<bool> {
        self.with_conn(|conn| {
            let changed = conn.execute(
                "UPDATE accounts SET is_accepting = ?2 WHERE id = ?1",
                rusqlite::params![id, accepting],
            )?;
            Ok(changed > 0)
        })
    }

    pub fn get_accepting(&self, id: &str) -> Result<Option<bool>> {
        self.with_conn(|conn| {
            let flag = conn
                .query_row(
                    "SELECT is_accepting FROM accounts WHERE id = ?1",
                    [id],
                    |row| row.get(0),
                )
                .optional()?;
            Ok(flag)
        })
    }

    // -- Messages --

    /// Append gated on the acceptance flag in the same statement, so a
    /// concurrent pause cannot let a message slip through between check
    /// and insert. Returns false when the flag was off (or the account
    /// vanished).
    pub fn append_message_if_accepting(
        &self,
        message_id: &str,
        target_username: &str,
        content: &str,
        created_at: &str,
    ) -> Result<bool> {
        self.with_conn(|conn| {
            let inserted = conn.execute(
                "INSERT INTO messages (id, owner_id, content, created_at)
                 SELECT ?1, id, ?3, ?4 FROM accounts
                 WHERE username = ?2 AND is_accepting = 1",
                rusqlite::params![message_id, target_username, content, created_at],
            )?;
            Ok(inserted > 0)
        })
    }

    /// Owner's messages, most recent first. Timestamps are RFC 3339 in
    /// UTC, so the lexicographic sort matches chronological order.
    pub fn list_messages(&self, owner_id: &str) -> Result<Vec<MessageRow>> {
        self.with_conn(|conn| {
            let mut stmt = conn.prepare(
                "SELECT id, owner_id, content, created_at FROM messages
                 WHERE owner_id = ?1
                 ORDER BY created_at DESC",
            )?;
            let rows = stmt
                .query_map([owner_id], |row| {
                    Ok(MessageRow {
                        id: row.get(0)?,
                        owner_id: row.get(1)?,
                        content: row.get(2)?,
                        created_at: row.get(3)?,
                    })
                })?
                .collect::<std::result::Result<Vec<_>, _>>()?;
            Ok(rows)
        })
    }

    /// Delete scoped to the owner; an id belonging to someone else, or
    /// one already deleted, affects zero rows and reports false.
    pub fn delete_message(&self, owner_id: &str, message_id: &str) -> Result<bool> {
        self.with_conn(|conn| {
            let deleted = conn.execute(
                "DELETE FROM messages WHERE id = ?1 AND owner_id = ?2",
                rusqlite::params![message_id, owner_id],
            )?;
            Ok(deleted > 0)
        })
    }
}

fn query_account(
    conn: &Connection,
    predicate: &str,
    params: &[&dyn rusqlite::types::ToSql],
) -> Result<Option<AccountRow>> {
    let sql = format!(
        "SELECT id, username, email, password_hash, verify_code, verify_code_expires_at,
                is_verified, is_accepting, created_at
         FROM accounts WHERE {}",
        predicate
    );
    let mut stmt = conn.prepare(&sql)?;

    let row = stmt
        .query_row(params, |row| {
            Ok(AccountRow {
                id: row.get(0)?,
                username: row.get(1)?,
                email: row.get(2)?,
                password_hash: row.get(3)?,
                verify_code: row.get(4)?,
                verify_code_expires_at: row.get(5)?,
                is_verified: row.get(6)?,
                is_accepting: row.get(7)?,
                created_at: row.get(8)?,
            })
        })
        .optional()?;

    Ok(row)
}

fn username_exists(conn: &Connection, username: &str) -> Result<bool> {
    let n: i64 = conn.query_row(
        "SELECT COUNT(*) FROM accounts WHERE username = ?1",
        [username],
        |row| row.get(0),
    )?;
    Ok(n > 0)
}

/// Extension trait for optional query results
trait OptionalExt<T> {
    fn optional(self) -> Result<Option<T>>;
}

impl<T> OptionalExt<T> for std::result::Result<T, rusqlite::Error> {
    fn optional(self) -> Result<Option<T>> {
        match self {
            Ok(val) => Ok(Some(val)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }
}
