// Per-user category store
//
// A category is a user-defined label with a display color. Listing order is
// creation order, matching the dashboard's category panel.

use anyhow::{bail, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Category {
    pub id: String,
    pub user_id: String,
    pub name: String,
    pub color: String,
    pub created_at: DateTime<Utc>,
}

/// Palette used when a category is created without an explicit color,
/// cycled by the user's existing category count
pub const COLOR_PALETTE: [&str; 8] = [
    "#FF6B6B", "#4ECDC4", "#FFD166", "#6A0572", "#1A535C", "#06D6A0", "#118AB2", "#EF476F",
];

/// Stock categories seeded into every new account (name, color)
const DEFAULT_CATEGORIES: [(&str, &str); 6] = [
    ("Food & Dining", "#FF6B6B"),
    ("Transportation", "#4ECDC4"),
    ("Shopping", "#FFD166"),
    ("Entertainment", "#6A0572"),
    ("Utilities", "#1A535C"),
    ("Salary", "#06D6A0"),
];

fn row_to_category(row: &rusqlite::Row) -> rusqlite::Result<Category> {
    let created_at_str: String = row.get(4)?;
    let created_at = DateTime::parse_from_rfc3339(&created_at_str)
        .map(|dt| dt.with_timezone(&Utc))
        .map_err(|_| rusqlite::Error::InvalidQuery)?;

    Ok(Category {
        id: row.get(0)?,
        user_id: row.get(1)?,
        name: row.get(2)?,
        color: row.get(3)?,
        created_at,
    })
}

/// All categories for a user, oldest first
pub fn list(conn: &Connection, user_id: &str) -> Result<Vec<Category>> {
    let mut stmt = conn.prepare(
        "SELECT id, user_id, name, color, created_at
         FROM categories
         WHERE user_id = ?1
         ORDER BY created_at ASC, rowid ASC",
    )?;

    let categories = stmt
        .query_map(params![user_id], row_to_category)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(categories)
}

/// Fetch one category, scoped to its owner
pub fn get(conn: &Connection, user_id: &str, id: &str) -> Result<Option<Category>> {
    let result = conn.query_row(
        "SELECT id, user_id, name, color, created_at
         FROM categories
         WHERE id = ?1 AND user_id = ?2",
        params![id, user_id],
        row_to_category,
    );

    match result {
        Ok(category) => Ok(Some(category)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Create a category. Without an explicit color one is assigned from the
/// palette.
pub fn create(
    conn: &Connection,
    user_id: &str,
    name: &str,
    color: Option<&str>,
) -> Result<Category> {
    let name = name.trim();
    if name.is_empty() {
        bail!("Category name cannot be empty");
    }

    let color = match color {
        Some(c) if !c.trim().is_empty() => c.trim().to_string(),
        _ => {
            let count: i64 = conn.query_row(
                "SELECT COUNT(*) FROM categories WHERE user_id = ?1",
                params![user_id],
                |row| row.get(0),
            )?;
            COLOR_PALETTE[count as usize % COLOR_PALETTE.len()].to_string()
        }
    };

    let category = Category {
        id: uuid::Uuid::new_v4().to_string(),
        user_id: user_id.to_string(),
        name: name.to_string(),
        color,
        created_at: Utc::now(),
    };

    conn.execute(
        "INSERT INTO categories (id, user_id, name, color, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5)",
        params![
            category.id,
            category.user_id,
            category.name,
            category.color,
            category.created_at.to_rfc3339(),
        ],
    )?;

    Ok(category)
}

/// Seed the stock category set for a new account
pub fn create_defaults(conn: &Connection, user_id: &str) -> Result<()> {
    for (name, color) in DEFAULT_CATEGORIES {
        create(conn, user_id, name, Some(color))?;
    }
    Ok(())
}

/// Update name and/or color. Returns false when the category does not exist
/// or belongs to someone else.
pub fn update(
    conn: &Connection,
    user_id: &str,
    id: &str,
    name: Option<&str>,
    color: Option<&str>,
) -> Result<bool> {
    let existing = match get(conn, user_id, id)? {
        Some(category) => category,
        None => return Ok(false),
    };

    let name = match name.map(str::trim) {
        Some("") => bail!("Category name cannot be empty"),
        Some(n) => n.to_string(),
        None => existing.name,
    };
    let color = color
        .map(|c| c.trim().to_string())
        .filter(|c| !c.is_empty())
        .unwrap_or(existing.color);

    let changed = conn.execute(
        "UPDATE categories SET name = ?1, color = ?2 WHERE id = ?3 AND user_id = ?4",
        params![name, color, id, user_id],
    )?;

    Ok(changed > 0)
}

/// Delete a category. Transactions that referenced it become uncategorized
/// through the schema's ON DELETE SET NULL.
pub fn delete(conn: &Connection, user_id: &str, id: &str) -> Result<bool> {
    let changed = conn.execute(
        "DELETE FROM categories WHERE id = ?1 AND user_id = ?2",
        params![id, user_id],
    )?;

    Ok(changed > 0)
}
