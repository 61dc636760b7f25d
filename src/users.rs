// User profiles - the client-facing slice of the users table
// Credentials live in the same table but never leave auth.rs

use anyhow::Result;
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};

/// User profile, safe for API responses (no password hash)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: String,
    pub name: String,
    pub created_at: DateTime<Utc>,
}

fn parse_timestamp(s: &str) -> rusqlite::Result<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| rusqlite::Error::InvalidQuery)
}

fn row_to_user(row: &rusqlite::Row) -> rusqlite::Result<User> {
    let created_at_str: String = row.get(3)?;

    Ok(User {
        id: row.get(0)?,
        email: row.get(1)?,
        name: row.get(2)?,
        created_at: parse_timestamp(&created_at_str)?,
    })
}

/// Insert a new profile row. The email is normalized to lowercase so logins
/// are case-insensitive.
pub fn create_profile(
    conn: &Connection,
    email: &str,
    name: &str,
    password_hash: &str,
) -> Result<User> {
    let user = User {
        id: uuid::Uuid::new_v4().to_string(),
        email: email.trim().to_lowercase(),
        name: name.trim().to_string(),
        created_at: Utc::now(),
    };

    conn.execute(
        "INSERT INTO users (id, email, name, password_hash, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            user.id,
            user.email,
            user.name,
            password_hash,
            user.created_at.to_rfc3339(),
        ],
    )?;

    Ok(user)
}

/// Look up a profile by id
pub fn get_profile(conn: &Connection, user_id: &str) -> Result<Option<User>> {
    let result = conn.query_row(
        "SELECT id, email, name, created_at FROM users WHERE id = ?1",
        params![user_id],
        row_to_user,
    );

    match result {
        Ok(user) => Ok(Some(user)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Look up a profile by email (normalized to lowercase)
pub fn get_by_email(conn: &Connection, email: &str) -> Result<Option<User>> {
    let result = conn.query_row(
        "SELECT id, email, name, created_at FROM users WHERE email = ?1",
        params![email.trim().to_lowercase()],
        row_to_user,
    );

    match result {
        Ok(user) => Ok(Some(user)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Update the display name. Returns false when the user does not exist.
pub fn update_profile(conn: &Connection, user_id: &str, name: &str) -> Result<bool> {
    let changed = conn.execute(
        "UPDATE users SET name = ?1 WHERE id = ?2",
        params![name.trim(), user_id],
    )?;

    Ok(changed > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::setup_database;

    fn test_conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();
        conn
    }

    #[test]
    fn test_create_and_get_profile() {
        let conn = test_conn();

        let user = create_profile(&conn, "Ada@Example.com", "Ada", "hash").unwrap();
        assert_eq!(user.email, "ada@example.com");

        let found = get_profile(&conn, &user.id).unwrap().unwrap();
        assert_eq!(found.email, "ada@example.com");
        assert_eq!(found.name, "Ada");

        let by_email = get_by_email(&conn, "ADA@example.com").unwrap().unwrap();
        assert_eq!(by_email.id, user.id);
    }

    #[test]
    fn test_duplicate_email_rejected() {
        let conn = test_conn();

        create_profile(&conn, "ada@example.com", "Ada", "hash").unwrap();
        let second = create_profile(&conn, "ada@example.com", "Other", "hash");

        assert!(second.is_err(), "Email uniqueness comes from the schema");
    }

    #[test]
    fn test_update_profile() {
        let conn = test_conn();

        let user = create_profile(&conn, "ada@example.com", "Ada", "hash").unwrap();
        assert!(update_profile(&conn, &user.id, "Ada Lovelace").unwrap());
        assert!(!update_profile(&conn, "nobody", "X").unwrap());

        let found = get_profile(&conn, &user.id).unwrap().unwrap();
        assert_eq!(found.name, "Ada Lovelace");
    }

    #[test]
    fn test_get_missing_profile() {
        let conn = test_conn();
        assert!(get_profile(&conn, "nobody").unwrap().is_none());
        assert!(get_by_email(&conn, "nobody@example.com").unwrap().is_none());
    }
}
