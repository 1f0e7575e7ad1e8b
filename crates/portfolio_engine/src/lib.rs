use anyhow::Result;
use chrono::Utc;
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use degiro::ExchangeRates;
use models::{round2, Category, ClassifiedTransaction, Holding, IngestReport, PortfolioSummary};
use quotes::QuoteSource;
use store::PortfolioStore;

pub mod classify;
pub mod extract;
pub mod holdings;
pub mod summary;

pub use holdings::{HeuristicSymbolResolver, SymbolResolver};

/// The classified transaction set, partitioned by category. Partitions are
/// disjoint; every kept row lives in exactly one of them.
pub struct Partitions {
    by_category: BTreeMap<Category, Vec<ClassifiedTransaction>>,
}

impl Partitions {
    pub fn from_rows(rows: Vec<ClassifiedTransaction>) -> Self {
        let mut by_category: BTreeMap<Category, Vec<ClassifiedTransaction>> =
            Category::ALL.iter().map(|c| (*c, Vec::new())).collect();
        for row in rows {
            by_category.entry(row.category).or_default().push(row);
        }
        Self { by_category }
    }

    pub fn of(&self, category: Category) -> &[ClassifiedTransaction] {
        self.by_category.get(&category).map(Vec::as_slice).unwrap_or(&[])
    }

    fn of_mut(&mut self, category: Category) -> &mut Vec<ClassifiedTransaction> {
        self.by_category.entry(category).or_default()
    }

    pub fn iter(&self) -> impl Iterator<Item = (Category, &[ClassifiedTransaction])> + '_ {
        self.by_category.iter().map(|(c, rows)| (*c, rows.as_slice()))
    }

    pub fn all(&self) -> impl Iterator<Item = &ClassifiedTransaction> + '_ {
        self.by_category.values().flatten()
    }

    pub fn total(&self) -> usize {
        self.by_category.values().map(Vec::len).sum()
    }

    /// Non-empty categories with their row counts.
    pub fn breakdown(&self) -> BTreeMap<String, usize> {
        self.by_category
            .iter()
            .filter(|(_, rows)| !rows.is_empty())
            .map(|(c, rows)| (c.label().to_string(), rows.len()))
            .collect()
    }
}

/// The pure half of an ingestion: load, classify, extract trade fields and
/// tag dividend groups. Safe to run repeatedly on the same payload.
pub fn process_statement(csv: &str, rates: &ExchangeRates) -> Result<Partitions> {
    let records = degiro::load_statement(csv.as_bytes(), rates)?;
    let mut rows = classify::classify(records);
    extract::enrich_trades(&mut rows);

    let mut parts = Partitions::from_rows(rows);
    summary::verify_dividends(parts.of_mut(Category::Dividendo));

    for (category, rows) in parts.iter() {
        if !rows.is_empty() {
            tracing::info!(%category, count = rows.len(), "Classified transactions");
        }
    }

    Ok(parts)
}

/// Lifetime summary plus cash, and position valuation when holdings and a
/// current rate are at hand.
pub fn full_summary(
    parts: &Partitions,
    holdings: Option<&[Holding]>,
    latest_eur_to_usd: Option<f64>,
) -> PortfolioSummary {
    let mut s = summary::summarize(parts);
    let cash = summary::cash_report(parts);
    s.totals.current_cash_eur = Some(cash.current_cash_eur);

    if let (Some(holdings), Some(rate)) = (holdings, latest_eur_to_usd) {
        let valuation = summary::portfolio_valuation(holdings, rate);
        s.totals.current_portfolio_value_eur = Some(valuation.current_portfolio_value_eur);
        s.totals.total_portfolio_value_eur =
            Some(round2(valuation.current_portfolio_value_eur + cash.current_cash_eur));
    }

    s
}

/// The reconciliation engine with its collaborators injected. Stateless per
/// call; one instance serves any number of users and uploads.
pub struct Engine {
    quotes: Arc<dyn QuoteSource>,
    store: Arc<dyn PortfolioStore>,
    resolver: Arc<dyn SymbolResolver>,
    quote_delay: Duration,
}

impl Engine {
    pub fn new(quotes: Arc<dyn QuoteSource>, store: Arc<dyn PortfolioStore>) -> Self {
        Self {
            quotes,
            store,
            resolver: Arc::new(HeuristicSymbolResolver),
            quote_delay: Duration::from_secs(1),
        }
    }

    pub fn with_resolver(mut self, resolver: Arc<dyn SymbolResolver>) -> Self {
        self.resolver = resolver;
        self
    }

    pub fn with_quote_delay(mut self, delay: Duration) -> Self {
        self.quote_delay = delay;
        self
    }

    pub fn store(&self) -> &Arc<dyn PortfolioStore> {
        &self.store
    }

    /// Net the classified trades into holdings and attach market prices.
    pub async fn reconcile(&self, parts: &Partitions) -> Vec<Holding> {
        let positions =
            holdings::net_positions(parts.of(Category::Compra), parts.of(Category::Venta));
        holdings::value_positions(
            positions,
            self.quotes.as_ref(),
            self.resolver.as_ref(),
            self.quote_delay,
        )
        .await
    }

    /// Full ingestion: recompute everything from the CSV payload, then
    /// replace the user's stored transactions and holdings.
    ///
    /// Store writes only start once the whole computation has succeeded, so
    /// a failing payload leaves previous data untouched.
    pub async fn ingest(
        &self,
        user_id: &str,
        csv: &str,
        rates: &ExchangeRates,
    ) -> Result<IngestReport> {
        let parts = process_statement(csv, rates)?;
        let holdings = self.reconcile(&parts).await;
        let summary = full_summary(&parts, Some(holdings.as_slice()), rates.latest());

        for (category, rows) in parts.iter() {
            self.store.replace_transactions(user_id, category, rows).await?;
        }
        self.store.replace_holdings(user_id, &holdings).await?;

        let report = IngestReport {
            user_id: user_id.to_string(),
            transactions_count: parts.total(),
            holdings_count: holdings.len(),
            transaction_breakdown: parts.breakdown(),
            processing_timestamp: Utc::now().to_rfc3339(),
            summary,
        };

        tracing::info!(
            user_id,
            transactions = report.transactions_count,
            holdings = report.holdings_count,
            "Ingestion complete"
        );
        Ok(report)
    }
}
