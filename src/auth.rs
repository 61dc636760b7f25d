// Email/password authentication with database-backed sessions
//
// Passwords are stored as "salt$sha256hex". Sessions are opaque UUID tokens
// with a fixed lifetime; expiry is checked on every lookup and expired rows
// are deleted on touch.

use anyhow::Result;
use chrono::{DateTime, Duration, Utc};
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};

use crate::categories;
use crate::users::{self, User};

/// Session lifetime: 30 days
const SESSION_DAYS: i64 = 30;

/// Minimum accepted password length
const MIN_PASSWORD_LEN: usize = 6;

/// Result of a signup or login attempt, mirrored into the API response
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AuthOutcome {
    pub success: bool,
    pub message: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub user: Option<User>,
}

impl AuthOutcome {
    fn ok(message: &str, user: User) -> Self {
        Self {
            success: true,
            message: message.to_string(),
            user: Some(user),
        }
    }

    fn failed(message: &str) -> Self {
        Self {
            success: false,
            message: message.to_string(),
            user: None,
        }
    }
}

/// An issued session token
#[derive(Debug, Clone, Serialize)]
pub struct Session {
    pub token: String,
    pub user_id: String,
    pub expires_at: DateTime<Utc>,
}

// ============================================================================
// Password hashing
// ============================================================================

fn digest(salt: &str, password: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(salt.as_bytes());
    hasher.update(b"$");
    hasher.update(password.as_bytes());
    format!("{:x}", hasher.finalize())
}

/// Hash a password with a fresh random salt ("salt$digest")
pub fn hash_password(password: &str) -> String {
    let salt = uuid::Uuid::new_v4().simple().to_string();
    format!("{}${}", salt, digest(&salt, password))
}

/// Verify a password against a stored "salt$digest" value
pub fn verify_password(password: &str, stored: &str) -> bool {
    match stored.split_once('$') {
        Some((salt, expected)) => digest(salt, password) == expected,
        None => false,
    }
}

// ============================================================================
// Signup / login
// ============================================================================

/// Create an account: credentials, profile row, and the stock category set.
/// Duplicate email or weak input is a failed outcome, not an error.
pub fn signup(conn: &Connection, email: &str, password: &str, name: &str) -> Result<AuthOutcome> {
    let email = email.trim();
    if email.is_empty() || !email.contains('@') {
        return Ok(AuthOutcome::failed("Invalid email address"));
    }
    if password.len() < MIN_PASSWORD_LEN {
        return Ok(AuthOutcome::failed("Password must be at least 6 characters"));
    }
    if name.trim().is_empty() {
        return Ok(AuthOutcome::failed("Name is required"));
    }

    if users::get_by_email(conn, email)?.is_some() {
        return Ok(AuthOutcome::failed("Email is already registered"));
    }

    let user = users::create_profile(conn, email, name, &hash_password(password))?;
    categories::create_defaults(conn, &user.id)?;

    Ok(AuthOutcome::ok("Signed up successfully", user))
}

/// Verify credentials. Unknown email and wrong password produce the same
/// client-facing message.
pub fn login(conn: &Connection, email: &str, password: &str) -> Result<AuthOutcome> {
    let user = match users::get_by_email(conn, email)? {
        Some(user) => user,
        None => return Ok(AuthOutcome::failed("Invalid email or password")),
    };

    let stored: String = conn.query_row(
        "SELECT password_hash FROM users WHERE id = ?1",
        params![user.id],
        |row| row.get(0),
    )?;

    if !verify_password(password, &stored) {
        return Ok(AuthOutcome::failed("Invalid email or password"));
    }

    Ok(AuthOutcome::ok("Logged in successfully", user))
}

// ============================================================================
// Sessions
// ============================================================================

/// Issue a session token for a user
pub fn create_session(conn: &Connection, user_id: &str) -> Result<Session> {
    let now = Utc::now();
    let session = Session {
        token: uuid::Uuid::new_v4().to_string(),
        user_id: user_id.to_string(),
        expires_at: now + Duration::days(SESSION_DAYS),
    };

    conn.execute(
        "INSERT INTO sessions (token, user_id, created_at, expires_at)
         VALUES (?1, ?2, ?3, ?4)",
        params![
            session.token,
            session.user_id,
            now.to_rfc3339(),
            session.expires_at.to_rfc3339(),
        ],
    )?;

    Ok(session)
}

/// Delete a session. Unknown tokens are a no-op.
pub fn destroy_session(conn: &Connection, token: &str) -> Result<()> {
    conn.execute("DELETE FROM sessions WHERE token = ?1", params![token])?;
    Ok(())
}

/// Resolve a token to its user. Expired or unknown tokens yield None; an
/// expired row is deleted on the way out.
pub fn session_user(conn: &Connection, token: &str) -> Result<Option<User>> {
    let result = conn.query_row(
        "SELECT user_id, expires_at FROM sessions WHERE token = ?1",
        params![token],
        |row| {
            let user_id: String = row.get(0)?;
            let expires_at: String = row.get(1)?;
            Ok((user_id, expires_at))
        },
    );

    let (user_id, expires_at) = match result {
        Ok(pair) => pair,
        Err(rusqlite::Error::QueryReturnedNoRows) => return Ok(None),
        Err(e) => return Err(e.into()),
    };

    let expired = DateTime::parse_from_rfc3339(&expires_at)
        .map(|dt| dt.with_timezone(&Utc) <= Utc::now())
        .unwrap_or(true);

    if expired {
        destroy_session(conn, token)?;
        return Ok(None);
    }

    users::get_profile(conn, &user_id)
}
