use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

pub mod finnhub;

pub use finnhub::FinnhubClient;

/// Latest traded price for one symbol, as the lookup service reports it.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Quote {
    pub symbol: String,
    pub price: f64,
    pub currency: String,
    pub timestamp: String,
    pub source: String,
}

/// One daily bar of a historical price series.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OhlcvBar {
    pub date: NaiveDate,
    pub open: Option<f64>,
    pub high: Option<f64>,
    pub low: Option<f64>,
    pub close: f64,
    pub volume: Option<i64>,
}

/// Latest-price lookup. Implementations may fail or rate-limit; callers
/// treat every call as unreliable I/O.
#[async_trait]
pub trait QuoteSource: Send + Sync {
    async fn latest(&self, symbol: &str) -> Result<Quote>;
}

/// Historical price cache: an ordered OHLCV series per symbol.
#[async_trait]
pub trait HistoricalPrices: Send + Sync {
    async fn series(&self, symbol: &str, from: NaiveDate, to: NaiveDate)
        -> Result<Vec<OhlcvBar>>;
}

/// Fixed in-memory quote table. Useful for tests and offline runs.
#[derive(Debug, Default)]
pub struct StaticQuotes {
    quotes: HashMap<String, Quote>,
}

impl StaticQuotes {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, quote: Quote) -> Self {
        self.quotes.insert(quote.symbol.clone(), quote);
        self
    }
}

#[async_trait]
impl QuoteSource for StaticQuotes {
    async fn latest(&self, symbol: &str) -> Result<Quote> {
        self.quotes
            .get(symbol)
            .cloned()
            .ok_or_else(|| anyhow!("No quote available for {}", symbol))
    }
}

/// In-memory OHLCV store keyed by symbol.
#[derive(Debug, Default)]
pub struct MemoryHistory {
    bars: HashMap<String, Vec<OhlcvBar>>,
}

impl MemoryHistory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn insert(&mut self, symbol: &str, mut bars: Vec<OhlcvBar>) {
        bars.sort_by_key(|b| b.date);
        self.bars.insert(symbol.to_string(), bars);
    }
}

#[async_trait]
impl HistoricalPrices for MemoryHistory {
    async fn series(
        &self,
        symbol: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<OhlcvBar>> {
        let bars = self
            .bars
            .get(symbol)
            .ok_or_else(|| anyhow!("No historical data for {}", symbol))?;

        Ok(bars
            .iter()
            .filter(|b| b.date >= from && b.date <= to)
            .cloned()
            .collect())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn bar(y: i32, m: u32, d: u32, close: f64) -> OhlcvBar {
        OhlcvBar {
            date: NaiveDate::from_ymd_opt(y, m, d).unwrap(),
            open: None,
            high: None,
            low: None,
            close,
            volume: None,
        }
    }

    #[tokio::test]
    async fn test_static_quotes_hit_and_miss() {
        let quotes = StaticQuotes::new().with(Quote {
            symbol: "AAPL".to_string(),
            price: 150.25,
            currency: "USD".to_string(),
            timestamp: "2024-01-01T00:00:00Z".to_string(),
            source: "static".to_string(),
        });

        let q = quotes.latest("AAPL").await.unwrap();
        assert_eq!(q.price, 150.25);
        assert!(quotes.latest("MSFT").await.is_err());
    }

    #[tokio::test]
    async fn test_memory_history_orders_and_filters() {
        let mut history = MemoryHistory::new();
        history.insert(
            "AAPL",
            vec![bar(2024, 1, 3, 3.0), bar(2024, 1, 1, 1.0), bar(2024, 1, 2, 2.0)],
        );

        let from = NaiveDate::from_ymd_opt(2024, 1, 2).unwrap();
        let to = NaiveDate::from_ymd_opt(2024, 1, 3).unwrap();
        let series = history.series("AAPL", from, to).await.unwrap();

        assert_eq!(series.len(), 2);
        assert_eq!(series[0].close, 2.0);
        assert_eq!(series[1].close, 3.0);
        assert!(history.series("MSFT", from, to).await.is_err());
    }
}
