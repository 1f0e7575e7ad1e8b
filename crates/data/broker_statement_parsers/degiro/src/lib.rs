use anyhow::{anyhow, Context, Result};
use chrono::{Datelike, NaiveDate};
use regex::Regex;
use std::collections::{HashMap, HashSet};
use std::io::Read;
use std::path::Path;
use std::sync::OnceLock;

use models::LedgerRecord;
use utils::{extract_isin, looks_like_isin, parse_eu_decimal, strip_isin};

pub mod rates;

pub use rates::ExchangeRates;

pub const PARSER_NAME: &str = "degiro";

/// Administrative columns the export sometimes carries; ignored when present.
pub const DROPPED_COLUMNS: [&str; 3] = ["Fecha valor", "ID Orden", "Tipo"];

const ACCEPTED_CURRENCIES: [&str; 3] = ["EUR", "USD", "GBP"];

// Known corporate renames, applied to the display name after loading so the
// same security groups under one name across statement vintages.
const PRODUCT_RENAMES: [(&str, &str); 1] =
    [("JACOBS ENGINEERING GROUP INC", "JACOBS SOLUTIONS INC")];

#[derive(Debug, Clone)]
struct HeaderIndex {
    idx: HashMap<String, usize>,
}

impl HeaderIndex {
    fn new(headers: &csv::StringRecord) -> Self {
        let mut idx = HashMap::new();
        for (i, c) in headers.iter().enumerate() {
            let k = c.trim().to_string();
            if !k.is_empty() {
                idx.insert(k, i);
            }
        }
        Self { idx }
    }

    fn position(&self, col: &str) -> Option<usize> {
        self.idx.get(col).copied()
    }

    fn get<'a>(&self, row: &'a csv::StringRecord, col: &str) -> Option<&'a str> {
        let i = self.position(col)?;
        row.get(i)
    }
}

fn amount_currency_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| {
        Regex::new(r"([\d\.,\-]+)\s*(EUR|USD|GBP)").expect("valid amount regex")
    })
}

/// Parse a day-first date as the export writes it ("29-07-2025").
fn parse_day_first(s: &str) -> Option<NaiveDate> {
    let s = s.trim();
    NaiveDate::parse_from_str(s, "%d-%m-%Y")
        .or_else(|_| NaiveDate::parse_from_str(s, "%d/%m/%Y"))
        .ok()
}

/// The export transmits each money field as a numeric column plus a
/// currency-code column; concatenate them and pull the pair back out.
///
/// A malformed numeric half degrades to `None` while the stated currency
/// is kept, so the row can still pass the currency filter.
fn split_money(value: &str, currency: &str) -> (Option<f64>, Option<String>) {
    let combined = format!("{} {}", value.trim(), currency.trim());
    if let Some(caps) = amount_currency_re().captures(&combined) {
        return (parse_eu_decimal(&caps[1]), Some(caps[2].to_string()));
    }

    let cur = currency.trim();
    if ACCEPTED_CURRENCIES.contains(&cur) {
        (None, Some(cur.to_string()))
    } else {
        (None, None)
    }
}

fn to_eur(
    amount: Option<f64>,
    currency: Option<&str>,
    date: NaiveDate,
    rates: &ExchangeRates,
) -> Option<f64> {
    let amount = amount?;
    match currency? {
        "EUR" => Some(models::round2(amount)),
        "USD" => rates
            .eur_to_usd(date)
            .map(|rate| models::round2(amount / rate)),
        // No GBP rate series is carried; the raw amount stays available.
        _ => None,
    }
}

fn rename_product(name: &str) -> String {
    for (from, to) in PRODUCT_RENAMES {
        if name == from {
            return to.to_string();
        }
    }
    name.to_string()
}

/// Signature of a row with the time field left out, for exact-duplicate
/// removal across re-exports.
fn dedup_signature(r: &LedgerRecord) -> String {
    format!(
        "{}|{:?}|{:?}|{}|{:?}|{:?}|{:?}|{:?}",
        r.date,
        r.product,
        r.isin,
        r.original_description,
        r.amount,
        r.amount_currency,
        r.balance,
        r.balance_currency,
    )
}

/// Parse the cash-account export into normalized ledger records.
///
/// Rows without a parseable date are dropped; rows whose amount currency is
/// not EUR/USD/GBP are excluded entirely. Malformed numeric fields degrade
/// to `None` instead of failing the load.
pub fn load_statement<R: Read>(reader: R, rates: &ExchangeRates) -> Result<Vec<LedgerRecord>> {
    let mut csvr = csv::ReaderBuilder::new()
        .has_headers(true)
        .flexible(true)
        .from_reader(reader);

    let headers = csvr.headers().context("Statement is not parseable CSV")?.clone();
    let h = HeaderIndex::new(&headers);

    for col in ["Fecha", "Descripción", "Variación", "Saldo"] {
        if h.position(col).is_none() {
            return Err(anyhow!("Statement is missing the '{}' column", col));
        }
    }

    for col in DROPPED_COLUMNS {
        if h.position(col).is_some() {
            tracing::debug!(column = col, "Ignoring administrative column");
        }
    }

    // The numeric halves sit in the unlabeled columns right after the
    // currency-code columns.
    let amount_value_idx = h.position("Variación").unwrap_or(0) + 1;
    let balance_value_idx = h.position("Saldo").unwrap_or(0) + 1;

    let mut records: Vec<LedgerRecord> = Vec::new();
    let mut seen: HashSet<String> = HashSet::new();
    let mut dropped_dateless = 0usize;
    let mut dropped_currency = 0usize;
    let mut dropped_duplicates = 0usize;

    for rec in csvr.records() {
        let rec = match rec {
            Ok(r) => r,
            Err(e) => {
                eprintln!("Skipping unreadable row: {}", e);
                continue;
            }
        };

        let Some(date) = h.get(&rec, "Fecha").and_then(parse_day_first) else {
            dropped_dateless += 1;
            continue;
        };

        let time = h
            .get(&rec, "Hora")
            .map(str::trim)
            .filter(|s| !s.is_empty())
            .map(str::to_string);

        let product_raw = h.get(&rec, "Producto").unwrap_or("").trim();
        let isin = h
            .get(&rec, "ISIN")
            .map(str::trim)
            .filter(|s| looks_like_isin(s))
            .map(str::to_string)
            .or_else(|| extract_isin(product_raw));
        let product = {
            let name = rename_product(&strip_isin(product_raw));
            if name.is_empty() { None } else { Some(name) }
        };

        let original_description = h.get(&rec, "Descripción").unwrap_or("").trim().to_string();

        let (amount, amount_currency) = split_money(
            rec.get(amount_value_idx).unwrap_or(""),
            h.get(&rec, "Variación").unwrap_or(""),
        );
        let (balance, balance_currency) = split_money(
            rec.get(balance_value_idx).unwrap_or(""),
            h.get(&rec, "Saldo").unwrap_or(""),
        );

        match amount_currency.as_deref() {
            Some(cur) if ACCEPTED_CURRENCIES.contains(&cur) => {}
            _ => {
                dropped_currency += 1;
                continue;
            }
        }

        let amount_eur = to_eur(amount, amount_currency.as_deref(), date, rates);
        let balance_eur = to_eur(balance, balance_currency.as_deref(), date, rates);

        let record = LedgerRecord {
            date,
            time,
            product,
            isin,
            original_description,
            amount,
            amount_currency,
            balance,
            balance_currency,
            amount_eur,
            balance_eur,
            year: date.year(),
            year_month: date.format("%Y-%m").to_string(),
        };

        if seen.insert(dedup_signature(&record)) {
            records.push(record);
        } else {
            dropped_duplicates += 1;
        }
    }

    tracing::info!(
        loaded = records.len(),
        dropped_dateless,
        dropped_currency,
        dropped_duplicates,
        "Loaded ledger records from statement"
    );

    Ok(records)
}

pub fn load_statement_file<P: AsRef<Path>>(
    path: P,
    rates: &ExchangeRates,
) -> Result<Vec<LedgerRecord>> {
    let file = std::fs::File::open(path.as_ref())
        .with_context(|| format!("Cannot open {}", path.as_ref().display()))?;
    load_statement(file, rates)
}

#[cfg(test)]
mod tests {
    use super::*;

    const HEADER: &str =
        "Fecha,Hora,Fecha valor,Producto,ISIN,Descripción,TC,Variación,,Saldo,,ID Orden";

    fn rates() -> ExchangeRates {
        ExchangeRates::from_reader(
            "Date,EUR_to_USD\n2023-12-29,1.1050\n2024-01-02,1.0950\n".as_bytes(),
        )
        .unwrap()
    }

    fn load(rows: &str) -> Vec<LedgerRecord> {
        let csv = format!("{}\n{}", HEADER, rows);
        load_statement(csv.as_bytes(), &rates()).unwrap()
    }

    #[test]
    fn test_loads_basic_buy_row() {
        let rows = "01-01-2024,15:30,01-01-2024,APPLE INC (US0378331005),,\
\"Compra 10 APPLE@150.25 USD (US0378331005)\",1.1050,USD,\"-1502,50\",USD,\"1000,00\",o1";
        let recs = load(rows);
        assert_eq!(recs.len(), 1);
        let r = &recs[0];
        assert_eq!(r.date, NaiveDate::from_ymd_opt(2024, 1, 1).unwrap());
        assert_eq!(r.product.as_deref(), Some("APPLE INC"));
        assert_eq!(r.isin.as_deref(), Some("US0378331005"));
        assert_eq!(r.amount, Some(-1502.5));
        assert_eq!(r.amount_currency.as_deref(), Some("USD"));
        assert_eq!(r.year, 2024);
        assert_eq!(r.year_month, "2024-01");
        // 2024-01-01 is a non-trading day: the 2023-12-29 rate carries forward
        assert_eq!(r.amount_eur, Some(models::round2(-1502.5 / 1.1050)));
    }

    #[test]
    fn test_isin_column_wins_over_product_token() {
        let rows = "02-01-2024,,,\"BLOCK INC (US8522341036)\",US8522341036,\
\"Venta 1 Block Inc.@61,82 USD (US8522341036)\",,USD,\"61,82\",USD,\"100,00\",o2";
        let recs = load(rows);
        assert_eq!(recs[0].isin.as_deref(), Some("US8522341036"));
        assert_eq!(recs[0].product.as_deref(), Some("BLOCK INC"));
        assert_eq!(recs[0].amount, Some(61.82));
        assert_eq!(recs[0].amount_eur, Some(models::round2(61.82 / 1.0950)));
    }

    #[test]
    fn test_drops_rows_without_date_or_accepted_currency() {
        let rows = "\
,,,X,,no date here,,EUR,\"1,00\",EUR,\"1,00\",\n\
03-01-2024,,,Y,,swiss row,,CHF,\"5,00\",CHF,\"5,00\",\n\
03-01-2024,,,Z,,kept,,EUR,\"2,00\",EUR,\"2,00\",";
        let recs = load(rows);
        assert_eq!(recs.len(), 1);
        assert_eq!(recs[0].original_description, "kept");
        assert_eq!(recs[0].amount_eur, Some(2.0));
    }

    #[test]
    fn test_gbp_rows_kept_without_eur_conversion() {
        let rows = "03-01-2024,,,LSE STOCK,,stamp duty,,GBP,\"-3,10\",GBP,\"10,00\",";
        let recs = load(rows);
        assert_eq!(recs.len(), 1);
        assert_eq!(recs[0].amount, Some(-3.1));
        assert_eq!(recs[0].amount_eur, None);
    }

    #[test]
    fn test_malformed_amount_degrades_to_none() {
        let rows = "03-01-2024,,,W,,odd row,,EUR,not-a-number EUR,EUR,\"1,00\",";
        let recs = load(rows);
        assert_eq!(recs.len(), 1);
        assert_eq!(recs[0].amount, None);
        assert_eq!(recs[0].amount_currency.as_deref(), Some("EUR"));
        assert_eq!(recs[0].amount_eur, None);
    }

    #[test]
    fn test_exact_duplicates_ignoring_time_are_removed() {
        let rows = "\
04-01-2024,09:00,,P (US0378331005),,Dividendo,,USD,\"10,00\",USD,\"50,00\",\n\
04-01-2024,17:45,,P (US0378331005),,Dividendo,,USD,\"10,00\",USD,\"50,00\",\n\
04-01-2024,09:00,,P (US0378331005),,Dividendo,,USD,\"11,00\",USD,\"61,00\",";
        let recs = load(rows);
        assert_eq!(recs.len(), 2);
    }

    #[test]
    fn test_product_rename_applied() {
        let rows = "05-01-2024,,,JACOBS ENGINEERING GROUP INC (US4698141078),,\
\"Compra 2 JACOBS@100 USD (US4698141078)\",,USD,\"-200,00\",USD,\"0,00\",";
        let recs = load(rows);
        assert_eq!(recs[0].product.as_deref(), Some("JACOBS SOLUTIONS INC"));
    }

    #[test]
    fn test_missing_required_column_is_an_error() {
        let csv = "Fecha,Hora\n01-01-2024,";
        assert!(load_statement(csv.as_bytes(), &rates()).is_err());
    }
}
