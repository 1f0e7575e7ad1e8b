use regex::Regex;
use std::sync::OnceLock;

use models::{Category, ClassifiedTransaction};
use utils::parse_eu_decimal;

fn compra_shares_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"Compra (\d+)").expect("valid shares regex"))
}

fn venta_shares_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"Venta (\d+)").expect("valid shares regex"))
}

// Price is the token after "@", up to the currency code that closes it.
fn price_re() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"@([\d,\.]+)\s+(?:USD|EUR|GBP)").expect("valid price regex"))
}

/// Share count from a narrative like "Compra 4 Procter & Gamble@155 USD".
pub fn extract_shares(description: &str, category: Category) -> Option<u32> {
    let re = match category {
        Category::Compra => compra_shares_re(),
        Category::Venta => venta_shares_re(),
        _ => return None,
    };
    re.captures(description)
        .and_then(|c| c[1].parse::<u32>().ok())
}

/// Per-share price in the stated currency, e.g. "...@61,82 USD" -> 61.82.
pub fn extract_price(description: &str) -> Option<f64> {
    price_re()
        .captures(description)
        .and_then(|c| parse_eu_decimal(&c[1]))
}

/// Fill `shares`/`price`/`is_valid` on buy and sell rows.
///
/// A buy only counts toward holdings and invested totals when its shares
/// parsed, its ISIN literally appears in the raw narrative, and its EUR
/// amount is negative; narrative lookalikes from corporate actions fail at
/// least one of these. Sells get the looser shares-only check.
pub fn enrich_trades(rows: &mut [ClassifiedTransaction]) {
    for row in rows {
        match row.category {
            Category::Compra => {
                row.shares = extract_shares(&row.record.original_description, Category::Compra);
                row.price = extract_price(&row.record.original_description);
                let isin_in_description = row
                    .record
                    .isin
                    .as_deref()
                    .map(|isin| row.record.original_description.contains(isin))
                    .unwrap_or(false);
                row.is_valid = row.shares.map_or(false, |s| s > 0)
                    && isin_in_description
                    && row.record.amount_eur.map_or(false, |a| a < 0.0);
            }
            Category::Venta => {
                row.shares = extract_shares(&row.record.original_description, Category::Venta);
                row.price = extract_price(&row.record.original_description);
                row.is_valid = row.shares.map_or(false, |s| s > 0);
            }
            _ => {}
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_extract_shares() {
        assert_eq!(
            extract_shares("Compra 10 APPLE@150.25 USD (US0378331005)", Category::Compra),
            Some(10)
        );
        assert_eq!(
            extract_shares("Venta 1 Block Inc.@61,82 USD (US8522341036)", Category::Venta),
            Some(1)
        );
        assert_eq!(extract_shares("Dividendo", Category::Compra), None);
        assert_eq!(extract_shares("Compra 10", Category::Venta), None);
    }

    #[test]
    fn test_extract_price_locale_conventions() {
        assert_eq!(extract_price("Compra 10 APPLE@150.25 USD"), Some(150.25));
        assert_eq!(extract_price("Venta 1 Block Inc.@61,82 USD"), Some(61.82));
        assert_eq!(extract_price("Compra 1 ASML@1.208,88 EUR"), Some(1208.88));
        assert_eq!(extract_price("Compra 4 Procter & Gamble@155 USD"), Some(155.0));
        assert_eq!(extract_price("no price here"), None);
        // a price without a closing currency code does not parse
        assert_eq!(extract_price("Compra 2 ACME@99,50"), None);
    }
}
