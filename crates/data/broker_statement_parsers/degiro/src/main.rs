use anyhow::{Context, Result};
use degiro::{load_statement_file, ExchangeRates};
use std::collections::BTreeMap;
use std::env;

fn main() -> Result<()> {
    // Usage:
    //   degiro <Account.csv> [currency_conversion_rates.csv]
    //
    // Parses a cash-account export and prints what was loaded, for a quick
    // look at a statement before running the full pipeline.

    let args: Vec<String> = env::args().collect();
    let statement = args
        .get(1)
        .context("Usage: degiro <Account.csv> [rates.csv]")?;

    let rates = match args.get(2) {
        Some(path) => ExchangeRates::from_path(path)?,
        None => {
            println!("⚠️  No rates file given; USD amounts will not convert to EUR");
            ExchangeRates::empty()
        }
    };

    let records = load_statement_file(statement, &rates)?;

    let mut by_currency: BTreeMap<String, usize> = BTreeMap::new();
    let mut with_isin = 0usize;
    for r in &records {
        if let Some(cur) = &r.amount_currency {
            *by_currency.entry(cur.clone()).or_insert(0) += 1;
        }
        if r.isin.is_some() {
            with_isin += 1;
        }
    }

    println!("✅ Loaded {} ledger records from {}", records.len(), statement);
    println!("   - Rows with an ISIN: {}", with_isin);
    for (cur, n) in &by_currency {
        println!("   - {}: {} rows", cur, n);
    }

    if let (Some(first), Some(last)) = (records.first(), records.last()) {
        println!("   - Date range: {} .. {}", first.date, last.date);
    }

    Ok(())
}
