use anyhow::{Context, Result};
use chrono::NaiveDate;
use std::io::Read;
use std::path::Path;

/// Day-matched EUR→USD rate table.
///
/// Lookups forward-fill: a date between two published rates gets the last
/// published one, so weekend and holiday ledger lines still convert.
#[derive(Debug, Clone, Default)]
pub struct ExchangeRates {
    // sorted by date ascending
    days: Vec<(NaiveDate, f64)>,
}

impl ExchangeRates {
    pub fn empty() -> Self {
        Self::default()
    }

    /// Load from a rates CSV with `Date` (ISO) and `EUR_to_USD` columns.
    /// Rows with unparsable fields are skipped.
    pub fn from_reader<R: Read>(reader: R) -> Result<Self> {
        let mut csvr = csv::ReaderBuilder::new()
            .has_headers(true)
            .flexible(true)
            .from_reader(reader);

        let headers = csvr
            .headers()
            .context("Exchange-rate file is not parseable CSV")?
            .clone();
        let date_idx = headers
            .iter()
            .position(|c| c.trim() == "Date")
            .context("Exchange-rate file is missing the 'Date' column")?;
        let rate_idx = headers
            .iter()
            .position(|c| c.trim() == "EUR_to_USD")
            .context("Exchange-rate file is missing the 'EUR_to_USD' column")?;

        let mut days: Vec<(NaiveDate, f64)> = Vec::new();
        for rec in csvr.records() {
            let Ok(rec) = rec else { continue };
            let Some(date) = rec
                .get(date_idx)
                .and_then(|s| NaiveDate::parse_from_str(s.trim(), "%Y-%m-%d").ok())
            else {
                continue;
            };
            let Some(rate) = rec.get(rate_idx).and_then(|s| s.trim().parse::<f64>().ok())
            else {
                continue;
            };
            if rate > 0.0 {
                days.push((date, rate));
            }
        }

        days.sort_by_key(|(d, _)| *d);
        days.dedup_by_key(|(d, _)| *d);

        Ok(Self { days })
    }

    pub fn from_path<P: AsRef<Path>>(path: P) -> Result<Self> {
        let file = std::fs::File::open(path.as_ref())
            .with_context(|| format!("Cannot open {}", path.as_ref().display()))?;
        Self::from_reader(file)
    }

    /// EUR→USD rate effective on `date`: the last published rate at or
    /// before it. `None` before the first published day.
    pub fn eur_to_usd(&self, date: NaiveDate) -> Option<f64> {
        match self.days.binary_search_by_key(&date, |(d, _)| *d) {
            Ok(i) => Some(self.days[i].1),
            Err(0) => None,
            Err(i) => Some(self.days[i - 1].1),
        }
    }

    /// Most recently published rate, if any.
    pub fn latest(&self) -> Option<f64> {
        self.days.last().map(|(_, r)| *r)
    }

    pub fn is_empty(&self) -> bool {
        self.days.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn table() -> ExchangeRates {
        ExchangeRates::from_reader(
            "Date,EUR_to_USD\n2024-01-05,1.0950\n2024-01-02,1.1050\nbad-date,1.0\n2024-01-08,x\n"
                .as_bytes(),
        )
        .unwrap()
    }

    #[test]
    fn test_forward_fill_lookup() {
        let rates = table();
        let d = |y, m, d| NaiveDate::from_ymd_opt(y, m, d).unwrap();

        assert_eq!(rates.eur_to_usd(d(2024, 1, 2)), Some(1.1050));
        // weekend gap: 2024-01-06/07 fall back to the Friday rate
        assert_eq!(rates.eur_to_usd(d(2024, 1, 7)), Some(1.0950));
        assert_eq!(rates.eur_to_usd(d(2024, 1, 1)), None);
    }

    #[test]
    fn test_bad_rows_are_skipped_and_latest_wins() {
        let rates = table();
        assert_eq!(rates.latest(), Some(1.0950));
        assert!(!rates.is_empty());
        assert!(ExchangeRates::empty().is_empty());
        assert_eq!(ExchangeRates::empty().latest(), None);
    }
}
