use chrono::Utc;
use std::collections::BTreeMap;
use std::time::Duration;

use models::{round2, Category, ClassifiedTransaction, Holding};
use quotes::QuoteSource;

/// Sentinel price provenance for positions whose lookup did not succeed.
pub const FAILED_SOURCE: &str = "failed";

/// Maps a security to the ticker the quote service understands.
///
/// No authoritative ISIN→ticker table is carried; callers that need a
/// reliable mapping plug their own resolver in here.
pub trait SymbolResolver: Send + Sync {
    fn resolve(&self, isin: &str, company_name: &str) -> Option<String>;
}

/// Best-effort default: the leading run of uppercase letters in the display
/// name, capped at five characters.
pub struct HeuristicSymbolResolver;

impl SymbolResolver for HeuristicSymbolResolver {
    fn resolve(&self, _isin: &str, company_name: &str) -> Option<String> {
        let symbol: String = company_name
            .chars()
            .take_while(|c| c.is_ascii_uppercase())
            .take(5)
            .collect();
        if symbol.is_empty() {
            None
        } else {
            Some(symbol)
        }
    }
}

/// Net position in one security before any market price is attached.
#[derive(Debug, Clone, PartialEq)]
pub struct NetPosition {
    pub isin: String,
    pub company_name: String,
    pub shares: i64,
    pub invested_eur: f64,
}

/// Net valid buys against all sells, per ISIN.
///
/// Grouping is by ISIN rather than product name: the same security shows up
/// under inconsistent name variants across statement vintages. Positions
/// that net to zero or below do not exist.
pub fn net_positions(
    buys: &[ClassifiedTransaction],
    sells: &[ClassifiedTransaction],
) -> Vec<NetPosition> {
    let mut by_isin: BTreeMap<String, NetPosition> = BTreeMap::new();

    for buy in buys.iter().filter(|b| b.category == Category::Compra && b.is_valid) {
        let Some(isin) = buy.record.isin.clone() else { continue };
        let entry = by_isin.entry(isin.clone()).or_insert_with(|| NetPosition {
            isin,
            company_name: buy
                .record
                .product
                .clone()
                .unwrap_or_else(|| "UNKNOWN".to_string()),
            shares: 0,
            invested_eur: 0.0,
        });
        entry.shares += i64::from(buy.shares.unwrap_or(0));
        entry.invested_eur += buy.record.amount_eur.unwrap_or(0.0);
    }

    for sell in sells.iter().filter(|s| s.category == Category::Venta) {
        let Some(isin) = sell.record.isin.as_deref() else { continue };
        if let Some(entry) = by_isin.get_mut(isin) {
            entry.shares -= i64::from(sell.shares.unwrap_or(0));
        }
    }

    let mut positions: Vec<NetPosition> =
        by_isin.into_values().filter(|p| p.shares > 0).collect();
    positions.sort_by(|a, b| a.company_name.cmp(&b.company_name).then(a.isin.cmp(&b.isin)));
    positions
}

/// Attach latest market prices to net positions, one lookup per symbol.
///
/// Lookups are spaced by `delay` to respect third-party quotas. A failed or
/// impossible lookup degrades that holding to a zero-valued entry marked
/// `source = "failed"`; it never aborts the rest of the batch.
pub async fn value_positions(
    positions: Vec<NetPosition>,
    source: &dyn QuoteSource,
    resolver: &dyn SymbolResolver,
    delay: Duration,
) -> Vec<Holding> {
    let mut holdings = Vec::with_capacity(positions.len());

    for (i, pos) in positions.into_iter().enumerate() {
        if i > 0 && !delay.is_zero() {
            tokio::time::sleep(delay).await;
        }

        let symbol = resolver.resolve(&pos.isin, &pos.company_name);
        let quote = match symbol.as_deref() {
            Some(s) => match source.latest(s).await {
                Ok(q) => Some(q),
                Err(e) => {
                    tracing::warn!(symbol = s, isin = %pos.isin, error = %e, "Price lookup failed");
                    None
                }
            },
            None => {
                tracing::warn!(isin = %pos.isin, company = %pos.company_name, "No symbol derived");
                None
            }
        };

        let holding = match quote {
            Some(q) => {
                let fetch_date = chrono::DateTime::parse_from_rfc3339(&q.timestamp)
                    .map(|dt| dt.date_naive())
                    .unwrap_or_else(|_| Utc::now().date_naive());
                Holding {
                    isin: pos.isin,
                    company_name: pos.company_name,
                    symbol,
                    shares_held: pos.shares,
                    current_price: Some(q.price),
                    currency: Some(q.currency),
                    position_value: round2(pos.shares as f64 * q.price),
                    fetch_date,
                    fetch_timestamp: q.timestamp,
                    source: q.source,
                }
            }
            None => Holding {
                isin: pos.isin,
                company_name: pos.company_name,
                symbol,
                shares_held: pos.shares,
                current_price: None,
                currency: None,
                position_value: 0.0,
                fetch_date: Utc::now().date_naive(),
                fetch_timestamp: Utc::now().to_rfc3339(),
                source: FAILED_SOURCE.to_string(),
            },
        };

        holdings.push(holding);
    }

    holdings
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::NaiveDate;
    use models::LedgerRecord;
    use quotes::{Quote, StaticQuotes};

    fn trade(
        category: Category,
        isin: &str,
        product: &str,
        shares: u32,
        amount_eur: f64,
        is_valid: bool,
    ) -> ClassifiedTransaction {
        let date = NaiveDate::from_ymd_opt(2024, 1, 1).unwrap();
        ClassifiedTransaction {
            record: LedgerRecord {
                date,
                time: None,
                product: Some(product.to_string()),
                isin: Some(isin.to_string()),
                original_description: String::new(),
                amount: Some(amount_eur),
                amount_currency: Some("EUR".to_string()),
                balance: None,
                balance_currency: None,
                amount_eur: Some(amount_eur),
                balance_eur: None,
                year: 2024,
                year_month: "2024-01".to_string(),
            },
            description: category.label().to_string(),
            category,
            country: isin[..2].to_string(),
            shares: Some(shares),
            price: None,
            is_valid,
            status: None,
        }
    }

    #[test]
    fn test_netting_buys_against_sells() {
        let buys = vec![
            trade(Category::Compra, "US0378331005", "APPLE INC", 10, -1502.50, true),
            trade(Category::Compra, "US0378331005", "APPLE INC", 5, -700.0, true),
            // invalid buys never count
            trade(Category::Compra, "US0378331005", "APPLE INC", 99, -1.0, false),
            trade(Category::Compra, "US8522341036", "BLOCK INC", 3, -200.0, true),
        ];
        let sells = vec![
            trade(Category::Venta, "US0378331005", "APPLE INC", 4, 650.0, true),
            trade(Category::Venta, "US8522341036", "BLOCK INC", 3, 210.0, true),
        ];

        let positions = net_positions(&buys, &sells);
        // BLOCK netted to zero and must not exist
        assert_eq!(positions.len(), 1);
        assert_eq!(positions[0].isin, "US0378331005");
        assert_eq!(positions[0].shares, 11);
        assert_eq!(positions[0].invested_eur, -2202.5);
    }

    #[test]
    fn test_oversold_position_disappears() {
        let buys = vec![trade(Category::Compra, "US0378331005", "APPLE INC", 2, -300.0, true)];
        let sells = vec![trade(Category::Venta, "US0378331005", "APPLE INC", 5, 800.0, true)];
        assert!(net_positions(&buys, &sells).is_empty());
    }

    #[test]
    fn test_symbol_heuristic() {
        let resolver = HeuristicSymbolResolver;
        assert_eq!(resolver.resolve("US0378331005", "APPLE INC"), Some("APPLE".to_string()));
        assert_eq!(resolver.resolve("US4698141078", "JACOBS SOLUTIONS INC"), Some("JACOB".to_string()));
        assert_eq!(resolver.resolve("US8522341036", "Block Inc"), Some("B".to_string()));
        assert_eq!(resolver.resolve("XX0000000000", "lowercase name"), None);
    }

    #[tokio::test]
    async fn test_value_positions_isolates_failures() {
        let positions = vec![
            NetPosition {
                isin: "US0378331005".to_string(),
                company_name: "APPLE INC".to_string(),
                shares: 6,
                invested_eur: -900.0,
            },
            NetPosition {
                isin: "US9999999990".to_string(),
                company_name: "OBSCURE CORP".to_string(),
                shares: 2,
                invested_eur: -50.0,
            },
        ];
        let source = StaticQuotes::new().with(Quote {
            symbol: "APPLE".to_string(),
            price: 150.25,
            currency: "USD".to_string(),
            timestamp: "2024-06-03T15:30:00+00:00".to_string(),
            source: "finnhub".to_string(),
        });

        let holdings = value_positions(
            positions,
            &source,
            &HeuristicSymbolResolver,
            Duration::ZERO,
        )
        .await;

        assert_eq!(holdings.len(), 2);

        let apple = &holdings[0];
        assert_eq!(apple.current_price, Some(150.25));
        assert_eq!(apple.position_value, 901.5);
        assert_eq!(apple.source, "finnhub");
        assert_eq!(apple.fetch_date, NaiveDate::from_ymd_opt(2024, 6, 3).unwrap());

        let obscure = &holdings[1];
        assert_eq!(obscure.current_price, None);
        assert_eq!(obscure.position_value, 0.0);
        assert_eq!(obscure.source, FAILED_SOURCE);
        assert_eq!(obscure.shares_held, 2);
    }
}
