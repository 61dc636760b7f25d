// Aggregate reports over a user's transactions
//
// Everything here is a single-pass reshaping of the transactions table:
// summary totals for the dashboard cards, spending grouped by category for
// the pie chart, and per-month income/expense sums for the cash-flow chart.

use anyhow::Result;
use rusqlite::{params, Connection};
use serde::Serialize;

/// Totals for the dashboard summary cards
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct Summary {
    pub total_income: f64,
    pub total_expenses: f64,
    pub net_savings: f64,
}

/// One slice of the spending-by-category chart
#[derive(Debug, Clone, Serialize)]
pub struct CategorySpend {
    pub name: String,
    pub value: f64,
    pub color: String,
}

/// One bar pair of the monthly cash-flow chart
#[derive(Debug, Clone, Serialize)]
pub struct MonthlyFlow {
    /// YYYY-MM
    pub month: String,
    pub income: f64,
    pub expenses: f64,
}

/// Total income, total expenses, and their difference
pub fn summary(conn: &Connection, user_id: &str) -> Result<Summary> {
    let (total_income, total_expenses) = conn.query_row(
        "SELECT
            IFNULL(SUM(CASE WHEN tx_type = 'income' THEN amount ELSE 0 END), 0),
            IFNULL(SUM(CASE WHEN tx_type = 'expense' THEN amount ELSE 0 END), 0)
         FROM transactions
         WHERE user_id = ?1",
        params![user_id],
        |row| Ok((row.get::<_, f64>(0)?, row.get::<_, f64>(1)?)),
    )?;

    Ok(Summary {
        total_income,
        total_expenses,
        net_savings: total_income - total_expenses,
    })
}

/// Expense totals grouped by category name, largest first. Spend on deleted
/// or never-assigned categories lands in "Uncategorized".
pub fn spending_by_category(conn: &Connection, user_id: &str) -> Result<Vec<CategorySpend>> {
    let mut stmt = conn.prepare(
        "SELECT
            IFNULL(c.name, 'Uncategorized') AS name,
            SUM(t.amount) AS value,
            IFNULL(c.color, '#9E9E9E') AS color
         FROM transactions t
         LEFT JOIN categories c ON t.category_id = c.id
         WHERE t.user_id = ?1 AND t.tx_type = 'expense'
         GROUP BY c.name, c.color
         ORDER BY value DESC",
    )?;

    let spending = stmt
        .query_map(params![user_id], |row| {
            Ok(CategorySpend {
                name: row.get(0)?,
                value: row.get(1)?,
                color: row.get(2)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(spending)
}

/// Income and expense sums bucketed by month (the first 7 chars of the
/// date), in chronological order
pub fn monthly_cash_flow(conn: &Connection, user_id: &str) -> Result<Vec<MonthlyFlow>> {
    let mut stmt = conn.prepare(
        "SELECT
            substr(date, 1, 7) AS month,
            IFNULL(SUM(CASE WHEN tx_type = 'income' THEN amount ELSE 0 END), 0),
            IFNULL(SUM(CASE WHEN tx_type = 'expense' THEN amount ELSE 0 END), 0)
         FROM transactions
         WHERE user_id = ?1
         GROUP BY month
         ORDER BY month ASC",
    )?;

    let flow = stmt
        .query_map(params![user_id], |row| {
            Ok(MonthlyFlow {
                month: row.get(0)?,
                income: row.get(1)?,
                expenses: row.get(2)?,
            })
        })?
        .collect::<Result<Vec<_>, _>>()?;

    Ok(flow)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::categories;
    use crate::db::setup_database;
    use crate::transactions::{self, NewTransaction, TransactionType};
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

    fn add_tx(
        conn: &Connection,
        user_id: &str,
        date: &str,
        amount: f64,
        tx_type: TransactionType,
        category_id: Option<String>,
    ) {
        transactions::create(
            conn,
            user_id,
            &NewTransaction {
                date: date.to_string(),
                description: "test".to_string(),
                amount,
                tx_type,
                category_id,
            },
        )
        .unwrap();
    }

    #[test]
    fn test_summary_matches_filtered_sums() {
        let conn = test_conn();
        let user_id = test_user(&conn);

        add_tx(&conn, &user_id, "2024-01-05", 3200.0, TransactionType::Income, None);
        add_tx(&conn, &user_id, "2024-01-08", 85.25, TransactionType::Expense, None);
        add_tx(&conn, &user_id, "2024-01-12", 45.00, TransactionType::Expense, None);

        let report = summary(&conn, &user_id).unwrap();
        assert_eq!(report.total_income, 3200.0);
        assert_eq!(report.total_expenses, 130.25);
        assert_eq!(report.net_savings, 3200.0 - 130.25);

        // The reported totals must equal re-summing the rows directly
        let txs = transactions::list(&conn, &user_id).unwrap();
        let income: f64 = txs
            .iter()
            .filter(|t| t.tx_type == TransactionType::Income)
            .map(|t| t.amount)
            .sum();
        assert_eq!(report.total_income, income);
    }

    #[test]
    fn test_summary_empty() {
        let conn = test_conn();
        let user_id = test_user(&conn);

        let report = summary(&conn, &user_id).unwrap();
        assert_eq!(
            report,
            Summary { total_income: 0.0, total_expenses: 0.0, net_savings: 0.0 }
        );
    }

    #[test]
    fn test_spending_groups_and_sorts() {
        let conn = test_conn();
        let user_id = test_user(&conn);
        let food = categories::create(&conn, &user_id, "Food", Some("#FF6B6B")).unwrap();
        let fuel = categories::create(&conn, &user_id, "Fuel", Some("#4ECDC4")).unwrap();

        add_tx(&conn, &user_id, "2024-01-05", 60.0, TransactionType::Expense, Some(food.id.clone()));
        add_tx(&conn, &user_id, "2024-01-06", 40.0, TransactionType::Expense, Some(food.id.clone()));
        add_tx(&conn, &user_id, "2024-01-07", 30.0, TransactionType::Expense, Some(fuel.id.clone()));
        add_tx(&conn, &user_id, "2024-01-08", 12.5, TransactionType::Expense, None);
        // Income never shows up in spending
        add_tx(&conn, &user_id, "2024-01-09", 999.0, TransactionType::Income, Some(food.id.clone()));

        let spending = spending_by_category(&conn, &user_id).unwrap();
        let names: Vec<&str> = spending.iter().map(|s| s.name.as_str()).collect();
        assert_eq!(names, vec!["Food", "Fuel", "Uncategorized"]);
        assert_eq!(spending[0].value, 100.0);
        assert_eq!(spending[0].color, "#FF6B6B");
        assert_eq!(spending[2].value, 12.5);
    }

    #[test]
    fn test_monthly_cash_flow_buckets() {
        let conn = test_conn();
        let user_id = test_user(&conn);

        add_tx(&conn, &user_id, "2024-01-05", 3000.0, TransactionType::Income, None);
        add_tx(&conn, &user_id, "2024-01-20", 500.0, TransactionType::Expense, None);
        add_tx(&conn, &user_id, "2024-02-03", 3100.0, TransactionType::Income, None);
        add_tx(&conn, &user_id, "2024-02-14", 650.0, TransactionType::Expense, None);
        add_tx(&conn, &user_id, "2024-02-28", 50.0, TransactionType::Expense, None);

        let flow = monthly_cash_flow(&conn, &user_id).unwrap();
        assert_eq!(flow.len(), 2);

        assert_eq!(flow[0].month, "2024-01");
        assert_eq!(flow[0].income, 3000.0);
        assert_eq!(flow[0].expenses, 500.0);

        assert_eq!(flow[1].month, "2024-02");
        assert_eq!(flow[1].income, 3100.0);
        assert_eq!(flow[1].expenses, 700.0);
    }

    #[test]
    fn test_reports_are_per_user() {
        let conn = test_conn();
        let ada = test_user(&conn);
        let eve = users::create_profile(&conn, "eve@example.com", "Eve", "hash")
            .unwrap()
            .id;

        add_tx(&conn, &ada, "2024-01-05", 100.0, TransactionType::Expense, None);

        assert_eq!(summary(&conn, &eve).unwrap().total_expenses, 0.0);
        assert!(spending_by_category(&conn, &eve).unwrap().is_empty());
        assert!(monthly_cash_flow(&conn, &eve).unwrap().is_empty());
    }
}
