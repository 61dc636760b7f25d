// Uploaded statement files
//
// The bytes live on disk under <storage_root>/<user_id>/<millis>_<name>;
// the database keeps a metadata row per file with the path recorded
// relative to the storage root.

use anyhow::{bail, Context, Result};
use chrono::{DateTime, Utc};
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UploadedFile {
    pub id: String,
    pub user_id: String,
    pub file_name: String,
    /// Relative to the storage root
    pub file_path: String,
    pub file_size: i64,
    pub file_type: String,
    pub uploaded_at: DateTime<Utc>,
}

/// Reduce a client-supplied name to a safe character set. Anything outside
/// [A-Za-z0-9._-] becomes '_', so the stored name can never contain a path
/// separator.
pub fn sanitize_file_name(name: &str) -> String {
    let cleaned: String = name
        .chars()
        .map(|c| {
            if c.is_ascii_alphanumeric() || c == '.' || c == '_' || c == '-' {
                c
            } else {
                '_'
            }
        })
        .collect();

    let trimmed = cleaned.trim_matches('.').to_string();
    if trimmed.is_empty() {
        "statement".to_string()
    } else {
        trimmed
    }
}

fn row_to_file(row: &rusqlite::Row) -> rusqlite::Result<UploadedFile> {
    let uploaded_at_str: String = row.get(6)?;

    Ok(UploadedFile {
        id: row.get(0)?,
        user_id: row.get(1)?,
        file_name: row.get(2)?,
        file_path: row.get(3)?,
        file_size: row.get(4)?,
        file_type: row.get(5)?,
        uploaded_at: DateTime::parse_from_rfc3339(&uploaded_at_str)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|_| rusqlite::Error::InvalidQuery)?,
    })
}

const SELECT_COLUMNS: &str =
    "id, user_id, file_name, file_path, file_size, file_type, uploaded_at";

/// Write the bytes to disk and record the metadata row
pub fn store(
    conn: &Connection,
    storage_root: &Path,
    user_id: &str,
    file_name: &str,
    content_type: &str,
    bytes: &[u8],
) -> Result<UploadedFile> {
    if bytes.is_empty() {
        bail!("Uploaded file is empty");
    }

    let uploaded_at = Utc::now();
    let safe_name = sanitize_file_name(file_name);
    let relative = format!("{}/{}_{}", user_id, uploaded_at.timestamp_millis(), safe_name);

    let absolute = storage_root.join(&relative);
    if let Some(parent) = absolute.parent() {
        fs::create_dir_all(parent)
            .with_context(|| format!("Failed to create storage directory {:?}", parent))?;
    }
    fs::write(&absolute, bytes)
        .with_context(|| format!("Failed to write statement file {:?}", absolute))?;

    let file = UploadedFile {
        id: uuid::Uuid::new_v4().to_string(),
        user_id: user_id.to_string(),
        file_name: file_name.to_string(),
        file_path: relative,
        file_size: bytes.len() as i64,
        file_type: content_type.to_string(),
        uploaded_at,
    };

    conn.execute(
        "INSERT INTO uploaded_files (id, user_id, file_name, file_path, file_size, file_type, uploaded_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
        params![
            file.id,
            file.user_id,
            file.file_name,
            file.file_path,
            file.file_size,
            file.file_type,
            file.uploaded_at.to_rfc3339(),
        ],
    )?;

    Ok(file)
}

/// All files for a user, newest upload first
pub fn list(conn: &Connection, user_id: &str) -> Result<Vec<UploadedFile>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {SELECT_COLUMNS} FROM uploaded_files
         WHERE user_id = ?1
         ORDER BY uploaded_at DESC",
    ))?;

    let files = stmt
        .query_map(params![user_id], row_to_file)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(files)
}

/// Fetch one file record, scoped to its owner
pub fn get(conn: &Connection, user_id: &str, id: &str) -> Result<Option<UploadedFile>> {
    let result = conn.query_row(
        &format!("SELECT {SELECT_COLUMNS} FROM uploaded_files WHERE id = ?1 AND user_id = ?2"),
        params![id, user_id],
        row_to_file,
    );

    match result {
        Ok(file) => Ok(Some(file)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

/// Read the stored bytes back
pub fn read_contents(storage_root: &Path, file: &UploadedFile) -> Result<Vec<u8>> {
    let absolute = storage_root.join(&file.file_path);
    fs::read(&absolute).with_context(|| format!("Failed to read statement file {:?}", absolute))
}

/// Remove the disk file, then the row. A blob already missing from disk is
/// logged and the row still goes away.
pub fn delete(conn: &Connection, storage_root: &Path, user_id: &str, id: &str) -> Result<bool> {
    let file = match get(conn, user_id, id)? {
        Some(file) => file,
        None => return Ok(false),
    };

    let absolute = storage_root.join(&file.file_path);
    if let Err(e) = fs::remove_file(&absolute) {
        log::warn!("Statement blob {:?} missing or unremovable: {}", absolute, e);
    }

    let changed = conn.execute(
        "DELETE FROM uploaded_files WHERE id = ?1 AND user_id = ?2",
        params![id, user_id],
    )?;

    Ok(changed > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::db::setup_database;
    use crate::users;

    struct TempStorage(PathBuf);

    impl TempStorage {
        fn new() -> Self {
            let dir = std::env::temp_dir().join(format!("finwise-test-{}", uuid::Uuid::new_v4()));
            fs::create_dir_all(&dir).unwrap();
            TempStorage(dir)
        }
    }

    impl Drop for TempStorage {
        fn drop(&mut self) {
            let _ = fs::remove_dir_all(&self.0);
        }
    }

    fn test_conn() -> Connection {
        let conn = Connection::open_in_memory().unwrap();
        setup_database(&conn).unwrap();
        conn
    }

    fn test_user(conn: &Connection) -> String {
        users::create_profile(conn, "ada@example.com", "Ada", "hash")
            .unwrap()
            .id
    }

    #[test]
    fn test_sanitize_file_name() {
        assert_eq!(sanitize_file_name("statement (1).csv"), "statement__1_.csv");
        assert_eq!(sanitize_file_name("../../etc/passwd"), "_.._etc_passwd");
        assert_eq!(sanitize_file_name("..."), "statement");
        assert_eq!(sanitize_file_name("plain.csv"), "plain.csv");
    }

    #[test]
    fn test_store_writes_blob_and_row() {
        let storage = TempStorage::new();
        let conn = test_conn();
        let user_id = test_user(&conn);

        let file = store(&conn, &storage.0, &user_id, "jan.csv", "text/csv", b"a,b\n1,2\n").unwrap();

        assert_eq!(file.file_size, 8);
        assert!(file.file_path.starts_with(&user_id));
        assert_eq!(read_contents(&storage.0, &file).unwrap(), b"a,b\n1,2\n");

        let listed = list(&conn, &user_id).unwrap();
        assert_eq!(listed.len(), 1);
        assert_eq!(listed[0].file_name, "jan.csv");
    }

    #[test]
    fn test_store_rejects_empty() {
        let storage = TempStorage::new();
        let conn = test_conn();
        let user_id = test_user(&conn);

        assert!(store(&conn, &storage.0, &user_id, "empty.csv", "text/csv", b"").is_err());
    }

    #[test]
    fn test_delete_removes_blob_then_row() {
        let storage = TempStorage::new();
        let conn = test_conn();
        let user_id = test_user(&conn);

        let file = store(&conn, &storage.0, &user_id, "jan.csv", "text/csv", b"data").unwrap();
        let absolute = storage.0.join(&file.file_path);
        assert!(absolute.exists());

        assert!(delete(&conn, &storage.0, &user_id, &file.id).unwrap());
        assert!(!absolute.exists());
        assert!(list(&conn, &user_id).unwrap().is_empty());

        // Second delete is a clean false
        assert!(!delete(&conn, &storage.0, &user_id, &file.id).unwrap());
    }

    #[test]
    fn test_delete_survives_missing_blob() {
        let storage = TempStorage::new();
        let conn = test_conn();
        let user_id = test_user(&conn);

        let file = store(&conn, &storage.0, &user_id, "jan.csv", "text/csv", b"data").unwrap();
        fs::remove_file(storage.0.join(&file.file_path)).unwrap();

        assert!(delete(&conn, &storage.0, &user_id, &file.id).unwrap());
        assert!(list(&conn, &user_id).unwrap().is_empty());
    }

    #[test]
    fn test_scoped_to_owner() {
        let storage = TempStorage::new();
        let conn = test_conn();
        let ada = test_user(&conn);
        let eve = users::create_profile(&conn, "eve@example.com", "Eve", "hash")
            .unwrap()
            .id;

        let file = store(&conn, &storage.0, &ada, "jan.csv", "text/csv", b"data").unwrap();

        assert!(get(&conn, &eve, &file.id).unwrap().is_none());
        assert!(!delete(&conn, &storage.0, &eve, &file.id).unwrap());
        assert!(get(&conn, &ada, &file.id).unwrap().is_some());
    }
}
