// Per-user transaction store
//
// A transaction is a dated monetary record typed as income or expense, with
// an optional category. Amounts are stored as non-negative values; the type
// carries the direction.

use anyhow::{bail, Result};
use chrono::{DateTime, NaiveDate, Utc};
use rusqlite::{params, Connection};
use serde::{Deserialize, Serialize};

// ============================================================================
// TRANSACTION TYPE
// ============================================================================

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TransactionType {
    Income,
    Expense,
}

impl TransactionType {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionType::Income => "income",
            TransactionType::Expense => "expense",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "income" => Some(TransactionType::Income),
            "expense" => Some(TransactionType::Expense),
            _ => None,
        }
    }
}

// ============================================================================
// TRANSACTION
// ============================================================================

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Transaction {
    pub id: String,
    pub user_id: String,
    /// ISO date, YYYY-MM-DD
    pub date: String,
    pub description: String,
    /// Always non-negative; direction lives in `tx_type`
    pub amount: f64,
    #[serde(rename = "type")]
    pub tx_type: TransactionType,
    pub category_id: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Fields the client supplies when creating or replacing a transaction
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct NewTransaction {
    pub date: String,
    pub description: String,
    pub amount: f64,
    #[serde(rename = "type")]
    pub tx_type: TransactionType,
    #[serde(default)]
    pub category_id: Option<String>,
}

fn validate(new: &NewTransaction) -> Result<()> {
    if NaiveDate::parse_from_str(&new.date, "%Y-%m-%d").is_err() {
        bail!("Invalid date '{}', expected YYYY-MM-DD", new.date);
    }
    if !new.amount.is_finite() || new.amount < 0.0 {
        bail!("Amount must be a non-negative number");
    }
    Ok(())
}

fn row_to_transaction(row: &rusqlite::Row) -> rusqlite::Result<Transaction> {
    let tx_type_str: String = row.get(5)?;
    let created_at_str: String = row.get(7)?;

    Ok(Transaction {
        id: row.get(0)?,
        user_id: row.get(1)?,
        date: row.get(2)?,
        description: row.get(3)?,
        amount: row.get(4)?,
        tx_type: TransactionType::parse(&tx_type_str).ok_or(rusqlite::Error::InvalidQuery)?,
        category_id: row.get(6)?,
        created_at: DateTime::parse_from_rfc3339(&created_at_str)
            .map(|dt| dt.with_timezone(&Utc))
            .map_err(|_| rusqlite::Error::InvalidQuery)?,
    })
}

const SELECT_COLUMNS: &str =
    "id, user_id, date, description, amount, tx_type, category_id, created_at";

/// All transactions for a user, newest date first
pub fn list(conn: &Connection, user_id: &str) -> Result<Vec<Transaction>> {
    let mut stmt = conn.prepare(&format!(
        "SELECT {SELECT_COLUMNS} FROM transactions
         WHERE user_id = ?1
         ORDER BY date DESC, created_at DESC",
    ))?;

    let transactions = stmt
        .query_map(params![user_id], row_to_transaction)?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(transactions)
}

/// Fetch one transaction, scoped to its owner
pub fn get(conn: &Connection, user_id: &str, id: &str) -> Result<Option<Transaction>> {
    let result = conn.query_row(
        &format!("SELECT {SELECT_COLUMNS} FROM transactions WHERE id = ?1 AND user_id = ?2"),
        params![id, user_id],
        row_to_transaction,
    );

    match result {
        Ok(tx) => Ok(Some(tx)),
        Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
        Err(e) => Err(e.into()),
    }
}

pub fn create(conn: &Connection, user_id: &str, new: &NewTransaction) -> Result<Transaction> {
    validate(new)?;

    let tx = Transaction {
        id: uuid::Uuid::new_v4().to_string(),
        user_id: user_id.to_string(),
        date: new.date.clone(),
        description: new.description.trim().to_string(),
        amount: new.amount,
        tx_type: new.tx_type,
        category_id: new.category_id.clone(),
        created_at: Utc::now(),
    };

    conn.execute(
        "INSERT INTO transactions (id, user_id, date, description, amount, tx_type, category_id, created_at)
         VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)",
        params![
            tx.id,
            tx.user_id,
            tx.date,
            tx.description,
            tx.amount,
            tx.tx_type.as_str(),
            tx.category_id,
            tx.created_at.to_rfc3339(),
        ],
    )?;

    Ok(tx)
}

/// Replace a transaction's fields. Returns false when it does not exist or
/// belongs to someone else.
pub fn update(conn: &Connection, user_id: &str, id: &str, new: &NewTransaction) -> Result<bool> {
    validate(new)?;

    let changed = conn.execute(
        "UPDATE transactions
         SET date = ?1, description = ?2, amount = ?3, tx_type = ?4, category_id = ?5
         WHERE id = ?6 AND user_id = ?7",
        params![
            new.date,
            new.description.trim(),
            new.amount,
            new.tx_type.as_str(),
            new.category_id,
            id,
            user_id,
        ],
    )?;

    Ok(changed > 0)
}

/// Assign or clear the category on one transaction (the table's per-row
/// category picker)
pub fn set_category(
    conn: &Connection,
    user_id: &str,
    id: &str,
    category_id: Option<&str>,
) -> Result<bool> {
    let changed = conn.execute(
        "UPDATE transactions SET category_id = ?1 WHERE id = ?2 AND user_id = ?3",
        params![category_id, id, user_id],
    )?;

    Ok(changed > 0)
}

pub fn delete(conn: &Connection, user_id: &str, id: &str) -> Result<bool> {
    let changed = conn.execute(
        "DELETE FROM transactions WHERE id = ?1 AND user_id = ?2",
        params![id, user_id],
    )?;

    Ok(changed > 0)
}

/// Insert a parsed statement batch. Rows are validated individually; the
/// whole batch fails on the first invalid row so imports are all-or-nothing.
pub fn insert_batch(conn: &Connection, user_id: &str, batch: &[NewTransaction]) -> Result<usize> {
    for new in batch {
        validate(new)?;
    }

    let mut inserted = 0;
    for new in batch {
        create(conn, user_id, new)?;
        inserted += 1;
    }

    Ok(inserted)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::categories;
    use crate::db::setup_database;
    use crate::users;

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

    fn new_tx(date: &str, description: &str, amount: f64, tx_type: TransactionType) -> NewTransaction {
        NewTransaction {
            date: date.to_string(),
            description: description.to_string(),
            amount,
            tx_type,
            category_id: None,
        }
    }

    #[test]
    fn test_create_and_list_newest_first() {
        let conn = test_conn();
        let user_id = test_user(&conn);

        create(&conn, &user_id, &new_tx("2024-03-01", "Rent", 900.0, TransactionType::Expense)).unwrap();
        create(&conn, &user_id, &new_tx("2024-03-15", "Salary", 3200.0, TransactionType::Income)).unwrap();
        create(&conn, &user_id, &new_tx("2024-03-10", "Groceries", 85.3, TransactionType::Expense)).unwrap();

        let txs = list(&conn, &user_id).unwrap();
        let dates: Vec<&str> = txs.iter().map(|t| t.date.as_str()).collect();
        assert_eq!(dates, vec!["2024-03-15", "2024-03-10", "2024-03-01"]);
    }

    #[test]
    fn test_validation() {
        let conn = test_conn();
        let user_id = test_user(&conn);

        assert!(create(&conn, &user_id, &new_tx("03/15/2024", "x", 1.0, TransactionType::Expense)).is_err());
        assert!(create(&conn, &user_id, &new_tx("2024-03-15", "x", -1.0, TransactionType::Expense)).is_err());
        assert!(create(&conn, &user_id, &new_tx("2024-03-15", "x", f64::NAN, TransactionType::Expense)).is_err());
    }

    #[test]
    fn test_update_replaces_fields() {
        let conn = test_conn();
        let user_id = test_user(&conn);
        let tx = create(&conn, &user_id, &new_tx("2024-03-01", "Rent", 900.0, TransactionType::Expense)).unwrap();

        let replacement = new_tx("2024-03-02", "March rent", 950.0, TransactionType::Expense);
        assert!(update(&conn, &user_id, &tx.id, &replacement).unwrap());

        let updated = get(&conn, &user_id, &tx.id).unwrap().unwrap();
        assert_eq!(updated.date, "2024-03-02");
        assert_eq!(updated.description, "March rent");
        assert_eq!(updated.amount, 950.0);
    }

    #[test]
    fn test_set_category_and_schema_null_on_delete() {
        let conn = test_conn();
        let user_id = test_user(&conn);
        let cat = categories::create(&conn, &user_id, "Housing", None).unwrap();
        let tx = create(&conn, &user_id, &new_tx("2024-03-01", "Rent", 900.0, TransactionType::Expense)).unwrap();

        assert!(set_category(&conn, &user_id, &tx.id, Some(&cat.id)).unwrap());
        assert_eq!(
            get(&conn, &user_id, &tx.id).unwrap().unwrap().category_id,
            Some(cat.id.clone())
        );

        // Deleting the category leaves the transaction uncategorized
        categories::delete(&conn, &user_id, &cat.id).unwrap();
        assert_eq!(get(&conn, &user_id, &tx.id).unwrap().unwrap().category_id, None);
    }

    #[test]
    fn test_scoped_to_owner() {
        let conn = test_conn();
        let ada = test_user(&conn);
        let eve = users::create_profile(&conn, "eve@example.com", "Eve", "hash")
            .unwrap()
            .id;
        let tx = create(&conn, &ada, &new_tx("2024-03-01", "Rent", 900.0, TransactionType::Expense)).unwrap();

        assert!(get(&conn, &eve, &tx.id).unwrap().is_none());
        assert!(!delete(&conn, &eve, &tx.id).unwrap());
        assert!(list(&conn, &eve).unwrap().is_empty());
    }

    #[test]
    fn test_insert_batch_counts() {
        let conn = test_conn();
        let user_id = test_user(&conn);

        let batch = vec![
            new_tx("2024-01-05", "Coffee", 4.5, TransactionType::Expense),
            new_tx("2024-01-06", "Salary", 3000.0, TransactionType::Income),
        ];

        assert_eq!(insert_batch(&conn, &user_id, &batch).unwrap(), 2);
        assert_eq!(list(&conn, &user_id).unwrap().len(), 2);
    }

    #[test]
    fn test_insert_batch_rejects_bad_row_up_front() {
        let conn = test_conn();
        let user_id = test_user(&conn);

        let batch = vec![
            new_tx("2024-01-05", "Coffee", 4.5, TransactionType::Expense),
            new_tx("bad-date", "Broken", 1.0, TransactionType::Expense),
        ];

        assert!(insert_batch(&conn, &user_id, &batch).is_err());
        assert!(list(&conn, &user_id).unwrap().is_empty(), "Nothing inserted");
    }
}
