use anyhow::{anyhow, Result};
use async_trait::async_trait;
use chrono::{NaiveDate, Utc};
use reqwest::header::{HeaderMap, HeaderValue};
use serde::Deserialize;

use crate::{HistoricalPrices, OhlcvBar, Quote, QuoteSource};

const BASE_URL: &str = "https://finnhub.io/api/v1";

pub const SOURCE_NAME: &str = "finnhub";

/// Response from the Finnhub quote endpoint.
#[derive(Debug, Deserialize)]
struct QuoteResponse {
    /// Current price
    c: f64,
    /// High price of the day
    h: f64,
    /// Low price of the day
    l: f64,
    /// Timestamp (Unix)
    t: Option<i64>,
}

/// Response from the Finnhub stock-candle endpoint.
#[derive(Debug, Deserialize)]
struct CandleResponse {
    c: Option<Vec<f64>>,
    h: Option<Vec<f64>>,
    l: Option<Vec<f64>>,
    o: Option<Vec<f64>>,
    t: Option<Vec<i64>>,
    v: Option<Vec<i64>>,
    /// "ok" or "no_data"
    s: String,
}

/// Finnhub price-lookup client. Quotes come back in USD.
pub struct FinnhubClient {
    client: reqwest::Client,
    base_url: String,
}

impl FinnhubClient {
    pub fn new(api_key: &str) -> Result<Self> {
        if api_key.is_empty() {
            return Err(anyhow!("Finnhub API key required"));
        }

        let mut headers = HeaderMap::new();
        headers.insert(
            "X-Finnhub-Token",
            HeaderValue::from_str(api_key).map_err(|e| anyhow!("Invalid API key format: {}", e))?,
        );

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .build()
            .map_err(|e| anyhow!("Failed to create HTTP client: {}", e))?;

        Ok(Self {
            client,
            base_url: BASE_URL.to_string(),
        })
    }

    async fn get_json<T: serde::de::DeserializeOwned>(&self, url: &str, symbol: &str) -> Result<T> {
        let response = self
            .client
            .get(url)
            .send()
            .await
            .map_err(|e| anyhow!("Request failed for {}: {}", symbol, e))?;

        let status = response.status();
        if !status.is_success() {
            let body = response.text().await.unwrap_or_default();
            tracing::warn!(%symbol, %status, "Finnhub API error");
            return Err(anyhow!("HTTP error for {}: {} - {}", symbol, status, body));
        }

        response
            .json::<T>()
            .await
            .map_err(|e| anyhow!("Failed to parse JSON for {}: {}", symbol, e))
    }
}

#[async_trait]
impl QuoteSource for FinnhubClient {
    async fn latest(&self, symbol: &str) -> Result<Quote> {
        let url = format!("{}/quote?symbol={}", self.base_url, symbol);
        let data: QuoteResponse = self.get_json(&url, symbol).await?;

        // c=0 with empty highs/lows means the symbol is unknown
        if data.c == 0.0 && data.h == 0.0 && data.l == 0.0 {
            return Err(anyhow!("No quote data available for {}", symbol));
        }

        let timestamp = match data.t {
            Some(ts) => chrono::DateTime::from_timestamp(ts, 0)
                .unwrap_or_else(Utc::now)
                .to_rfc3339(),
            None => Utc::now().to_rfc3339(),
        };

        Ok(Quote {
            symbol: symbol.to_string(),
            price: data.c,
            currency: "USD".to_string(),
            timestamp,
            source: SOURCE_NAME.to_string(),
        })
    }
}

#[async_trait]
impl HistoricalPrices for FinnhubClient {
    async fn series(
        &self,
        symbol: &str,
        from: NaiveDate,
        to: NaiveDate,
    ) -> Result<Vec<OhlcvBar>> {
        let from_ts = from
            .and_hms_opt(0, 0, 0)
            .map(|dt| dt.and_utc().timestamp())
            .unwrap_or(0);
        let to_ts = to
            .and_hms_opt(23, 59, 59)
            .map(|dt| dt.and_utc().timestamp())
            .unwrap_or(0);

        let url = format!(
            "{}/stock/candle?symbol={}&resolution=D&from={}&to={}",
            self.base_url, symbol, from_ts, to_ts
        );
        let data: CandleResponse = self.get_json(&url, symbol).await?;

        if data.s != "ok" {
            return Err(anyhow!(
                "No historical data available for {} (status: {})",
                symbol,
                data.s
            ));
        }

        let timestamps = data.t.ok_or_else(|| anyhow!("Missing timestamps"))?;
        let closes = data.c.ok_or_else(|| anyhow!("Missing close prices"))?;
        let highs = data.h;
        let lows = data.l;
        let opens = data.o;
        let volumes = data.v;

        let mut bars = Vec::new();
        for (i, ts) in timestamps.iter().enumerate() {
            let Some(date) = chrono::DateTime::from_timestamp(*ts, 0).map(|dt| dt.date_naive())
            else {
                continue;
            };
            let Some(&close) = closes.get(i) else { continue };

            bars.push(OhlcvBar {
                date,
                open: opens.as_ref().and_then(|o| o.get(i).copied()),
                high: highs.as_ref().and_then(|h| h.get(i).copied()),
                low: lows.as_ref().and_then(|l| l.get(i).copied()),
                close,
                volume: volumes.as_ref().and_then(|v| v.get(i).copied()),
            });
        }

        Ok(bars)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    // These tests hit the live API; set FINNHUB_API_KEY to run them.

    #[tokio::test]
    #[ignore]
    async fn test_fetch_live_quote() {
        let api_key = std::env::var("FINNHUB_API_KEY").unwrap_or_default();
        if api_key.is_empty() {
            return;
        }

        let client = FinnhubClient::new(&api_key).unwrap();
        let quote = client.latest("AAPL").await.unwrap();
        assert_eq!(quote.symbol, "AAPL");
        assert!(quote.price > 0.0);
        assert_eq!(quote.source, "finnhub");
    }

    #[test]
    fn test_empty_api_key_is_rejected() {
        assert!(FinnhubClient::new("").is_err());
    }
}
