// Statement parsing - CSV bank exports into transactions
//
// Banks disagree on everything: header names, date formats, whether amounts
// are signed or split into debit/credit columns. The parser normalizes all
// of that into dated, typed rows ready for the transactions table. Rows that
// cannot be parsed are skipped and counted, never fatal on their own.

use anyhow::{bail, Result};
use chrono::NaiveDate;
use rusqlite::Connection;

use crate::transactions::{self, NewTransaction, TransactionType};

// ============================================================================
// CORE TYPES
// ============================================================================

/// One normalized statement row
#[derive(Debug, Clone, PartialEq)]
pub struct ParsedRow {
    /// ISO date, YYYY-MM-DD
    pub date: String,
    pub description: String,
    /// Absolute value; direction lives in `tx_type`
    pub amount: f64,
    pub tx_type: TransactionType,
}

/// Outcome of importing a statement for a user
#[derive(Debug, Clone, PartialEq)]
pub struct StatementImport {
    pub inserted: usize,
    pub skipped: usize,
}

/// Where the money columns live in this statement
#[derive(Debug, Clone, Copy)]
enum AmountColumns {
    /// One signed column: negative = expense, positive = income
    Signed(usize),
    /// Separate debit / credit columns
    Split { debit: usize, credit: usize },
}

#[derive(Debug, Clone, Copy)]
struct ColumnMap {
    date: usize,
    description: Option<usize>,
    amounts: AmountColumns,
}

// ============================================================================
// HEADER DETECTION
// ============================================================================

const DATE_HEADERS: [&str; 4] = ["date", "transaction date", "posted", "posting date"];
const DESCRIPTION_HEADERS: [&str; 5] = ["description", "payee", "memo", "details", "name"];

fn find_column(headers: &csv::StringRecord, candidates: &[&str]) -> Option<usize> {
    headers
        .iter()
        .position(|h| candidates.contains(&h.trim().to_lowercase().as_str()))
}

fn detect_columns(headers: &csv::StringRecord) -> Option<ColumnMap> {
    let date = find_column(headers, &DATE_HEADERS)?;
    let description = find_column(headers, &DESCRIPTION_HEADERS);

    let amounts = if let Some(amount) = find_column(headers, &["amount"]) {
        AmountColumns::Signed(amount)
    } else {
        let debit = find_column(headers, &["debit", "withdrawal"])?;
        let credit = find_column(headers, &["credit", "deposit"])?;
        AmountColumns::Split { debit, credit }
    };

    Some(ColumnMap { date, description, amounts })
}

// ============================================================================
// FIELD NORMALIZATION
// ============================================================================

/// Accepted statement date formats, normalized to YYYY-MM-DD
const DATE_FORMATS: [&str; 3] = ["%Y-%m-%d", "%m/%d/%Y", "%d-%m-%Y"];

fn normalize_date(raw: &str) -> Option<String> {
    let raw = raw.trim();
    for format in DATE_FORMATS {
        if let Ok(date) = NaiveDate::parse_from_str(raw, format) {
            return Some(date.format("%Y-%m-%d").to_string());
        }
    }
    None
}

/// Parse a statement amount: currency symbols and thousands separators are
/// dropped, parentheses mean negative.
fn parse_amount(raw: &str) -> Option<f64> {
    let mut cleaned = raw.trim().to_string();

    let mut negative = false;
    if cleaned.starts_with('(') && cleaned.ends_with(')') {
        negative = true;
        cleaned = cleaned[1..cleaned.len() - 1].to_string();
    }

    cleaned.retain(|c| !matches!(c, '$' | '€' | '£' | ',' | ' '));
    if cleaned.is_empty() {
        return None;
    }

    let value: f64 = cleaned.parse().ok()?;
    if !value.is_finite() {
        return None;
    }

    Some(if negative { -value } else { value })
}

// ============================================================================
// STATEMENT PARSING
// ============================================================================

fn parse_row(record: &csv::StringRecord, columns: &ColumnMap) -> Option<ParsedRow> {
    let date = normalize_date(record.get(columns.date)?)?;

    let description = columns
        .description
        .and_then(|i| record.get(i))
        .map(str::trim)
        .unwrap_or("")
        .to_string();

    let (amount, tx_type) = match columns.amounts {
        AmountColumns::Signed(i) => {
            let value = parse_amount(record.get(i)?)?;
            if value == 0.0 {
                return None;
            }
            let tx_type = if value < 0.0 {
                TransactionType::Expense
            } else {
                TransactionType::Income
            };
            (value.abs(), tx_type)
        }
        AmountColumns::Split { debit, credit } => {
            let debit_value = record.get(debit).and_then(parse_amount);
            let credit_value = record.get(credit).and_then(parse_amount);
            match (debit_value, credit_value) {
                (Some(value), _) if value != 0.0 => (value.abs(), TransactionType::Expense),
                (_, Some(value)) if value != 0.0 => (value.abs(), TransactionType::Income),
                _ => return None,
            }
        }
    };

    Some(ParsedRow { date, description, amount, tx_type })
}

/// Parse a CSV statement into normalized rows plus a skipped-row count.
/// Unrecognizable headers, or data rows of which none parse, are errors.
pub fn parse_statement(bytes: &[u8]) -> Result<(Vec<ParsedRow>, usize)> {
    let mut reader = csv::ReaderBuilder::new().flexible(true).from_reader(bytes);

    let headers = reader.headers()?.clone();
    let columns = match detect_columns(&headers) {
        Some(columns) => columns,
        None => bail!("Unrecognized statement format: no date/amount columns found"),
    };

    let mut rows = Vec::new();
    let mut skipped = 0;
    let mut total = 0;

    for record in reader.records() {
        let record = match record {
            Ok(record) => record,
            Err(_) => {
                total += 1;
                skipped += 1;
                continue;
            }
        };
        total += 1;

        match parse_row(&record, &columns) {
            Some(row) => rows.push(row),
            None => skipped += 1,
        }
    }

    if rows.is_empty() && total > 0 {
        bail!("No transactions could be parsed from the statement");
    }

    Ok((rows, skipped))
}

/// Parse a statement and insert the rows for a user, uncategorized
pub fn import_statement(
    conn: &Connection,
    user_id: &str,
    bytes: &[u8],
) -> Result<StatementImport> {
    let (rows, skipped) = parse_statement(bytes)?;

    let batch: Vec<NewTransaction> = rows
        .into_iter()
        .map(|row| NewTransaction {
            date: row.date,
            description: row.description,
            amount: row.amount,
            tx_type: row.tx_type,
            category_id: None,
        })
        .collect();

    let inserted = transactions::insert_batch(conn, user_id, &batch)?;

    Ok(StatementImport { inserted, skipped })
}

/// Whether an upload looks like a CSV statement worth parsing
pub fn is_csv(file_name: &str, content_type: &str) -> bool {
    file_name.to_lowercase().ends_with(".csv") || content_type.to_lowercase().contains("csv")
}
