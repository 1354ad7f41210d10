/// Database row types — these map directly to SQLite rows.
/// Distinct from veil-types API models to keep the DB layer independent.

pub struct AccountRow {
    pub id: String,
    pub username: String,
    pub email: String,
    pub password_hash: Option<String>,
    pub verify_code: Option<String>,
    pub verify_code_expires_at: Option<String>,
    pub is_verified: bool,
    pub is_accepting: bool,
    pub created_at: String,
}

pub struct MessageRow {
    pub id: String,
    pub owner_id: String,
    pub content: String,
    pub created_at: String,
}
