// FinWise CLI - database initialization and offline statement import
// The dashboard itself is served by the finwise-server binary.

use anyhow::{bail, Context, Result};
use std::env;
use std::fs;

use finwise::{db, parser, reports, users};

fn main() -> Result<()> {
    env_logger::init();

    let args: Vec<String> = env::args().collect();

    match args.get(1).map(String::as_str) {
        Some("init") => run_init(),
        Some("import") => run_import(&args[2..]),
        Some("stats") => run_stats(&args[2..]),
        _ => {
            print_usage();
            Ok(())
        }
    }
}

fn print_usage() {
    println!("FinWise {}", finwise::VERSION);
    println!();
    println!("Usage:");
    println!("  finwise init                     Create or upgrade the database");
    println!("  finwise import <csv> <email>     Import a statement for a user");
    println!("  finwise stats <email>            Print summary totals for a user");
    println!();
    println!("Environment:");
    println!("  FINWISE_DB        Database path (default: finwise.db)");
    println!("  FINWISE_STORAGE   Statement storage directory (default: statements)");
}

fn run_init() -> Result<()> {
    let db_path = db::database_path();

    println!("🔧 Setting up database at {:?}...", db_path);
    let conn = db::open_database(&db_path)?;
    db::setup_database(&conn)?;
    println!("✓ Database ready");

    Ok(())
}

fn run_import(args: &[String]) -> Result<()> {
    let (csv_path, email) = match args {
        [csv_path, email] => (csv_path, email),
        _ => bail!("Usage: finwise import <csv> <email>"),
    };

    let db_path = db::database_path();
    let conn = db::open_database(&db_path)?;
    db::setup_database(&conn)?;

    let user = users::get_by_email(&conn, email)?
        .with_context(|| format!("No account with email '{}'", email))?;

    println!("📂 Loading statement {}...", csv_path);
    let bytes = fs::read(csv_path)
        .with_context(|| format!("Failed to read statement file '{}'", csv_path))?;

    let summary = parser::import_statement(&conn, &user.id, &bytes)?;

    println!("✓ Imported: {} transactions", summary.inserted);
    if summary.skipped > 0 {
        println!("✓ Skipped unparsable rows: {}", summary.skipped);
    }

    Ok(())
}

fn run_stats(args: &[String]) -> Result<()> {
    let email = match args {
        [email] => email,
        _ => bail!("Usage: finwise stats <email>"),
    };

    let db_path = db::database_path();
    let conn = db::open_database(&db_path)?;
    db::setup_database(&conn)?;

    let user = users::get_by_email(&conn, email)?
        .with_context(|| format!("No account with email '{}'", email))?;

    let summary = reports::summary(&conn, &user.id)?;

    println!("📊 Totals for {}", user.email);
    println!("   Income:   {:>12.2}", summary.total_income);
    println!("   Expenses: {:>12.2}", summary.total_expenses);
    println!("   Net:      {:>12.2}", summary.net_savings);

    let spending = reports::spending_by_category(&conn, &user.id)?;
    if !spending.is_empty() {
        println!();
        println!("   Spending by category:");
        for entry in spending {
            println!("   {:<24} {:>12.2}", entry.name, entry.value);
        }
    }

    Ok(())
}
