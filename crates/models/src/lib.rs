use chrono::NaiveDate;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;

// Ledger models

/// One normalized row of the broker's cash-account export.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct LedgerRecord {
    pub date: NaiveDate,
    pub time: Option<String>,
    pub product: Option<String>,
    pub isin: Option<String>,
    pub original_description: String,
    pub amount: Option<f64>,
    pub amount_currency: Option<String>,
    pub balance: Option<f64>,
    pub balance_currency: Option<String>,
    pub amount_eur: Option<f64>,
    pub balance_eur: Option<f64>,
    pub year: i32,
    pub year_month: String,
}

/// Semantic category of a ledger line. Labels are the lower-case Spanish
/// strings the export itself speaks.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub enum Category {
    #[serde(rename = "compra")]
    Compra,
    #[serde(rename = "venta")]
    Venta,
    #[serde(rename = "dividendo")]
    Dividendo,
    #[serde(rename = "ingreso")]
    Ingreso,
    #[serde(rename = "retiro")]
    Retiro,
    #[serde(rename = "comisión")]
    Comision,
    #[serde(rename = "impuesto")]
    Impuesto,
    #[serde(rename = "cambio corporativo")]
    CambioCorporativo,
    #[serde(rename = "cambio de divisa")]
    CambioDivisa,
    #[serde(rename = "transferencia interna")]
    TransferenciaInterna,
    #[serde(rename = "otro")]
    Otro,
}

impl Category {
    pub const ALL: [Category; 11] = [
        Category::Compra,
        Category::Venta,
        Category::Dividendo,
        Category::Ingreso,
        Category::Retiro,
        Category::Comision,
        Category::Impuesto,
        Category::CambioCorporativo,
        Category::CambioDivisa,
        Category::TransferenciaInterna,
        Category::Otro,
    ];

    pub fn label(&self) -> &'static str {
        match self {
            Category::Compra => "compra",
            Category::Venta => "venta",
            Category::Dividendo => "dividendo",
            Category::Ingreso => "ingreso",
            Category::Retiro => "retiro",
            Category::Comision => "comisión",
            Category::Impuesto => "impuesto",
            Category::CambioCorporativo => "cambio corporativo",
            Category::CambioDivisa => "cambio de divisa",
            Category::TransferenciaInterna => "transferencia interna",
            Category::Otro => "otro",
        }
    }

    pub fn from_label(label: &str) -> Option<Category> {
        Category::ALL.iter().copied().find(|c| c.label() == label)
    }
}

impl fmt::Display for Category {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.label())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum DividendStatus {
    Verified,
    Unverified,
}

/// A ledger record after classification and trade-field extraction.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ClassifiedTransaction {
    #[serde(flatten)]
    pub record: LedgerRecord,
    /// Normalized lower-case narrative label.
    pub description: String,
    pub category: Category,
    /// First two ISIN characters, or "None" when no ISIN is known.
    pub country: String,
    pub shares: Option<u32>,
    pub price: Option<f64>,
    pub is_valid: bool,
    /// Set on dividend rows only.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub status: Option<DividendStatus>,
}

// Holdings models

/// A reconciled net position in a security.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Holding {
    pub isin: String,
    pub company_name: String,
    pub symbol: Option<String>,
    pub shares_held: i64,
    pub current_price: Option<f64>,
    pub currency: Option<String>,
    pub position_value: f64,
    pub fetch_date: NaiveDate,
    pub fetch_timestamp: String,
    /// Price provenance; "failed" when the lookup did not succeed.
    pub source: String,
}

// Summary models

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SummaryTotals {
    pub total_invested: f64,
    pub total_proceeds: f64,
    pub net_invested: f64,
    pub total_deposits: f64,
    pub total_dividends: f64,
    pub total_fees: f64,
    pub portfolio_return: f64,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_cash_eur: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub current_portfolio_value_eur: Option<f64>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub total_portfolio_value_eur: Option<f64>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RawDataStats {
    pub total_buy_transactions: usize,
    pub valid_buy_transactions: usize,
    pub sell_transactions: usize,
    pub dividend_transactions: usize,
    pub verified_dividend_transactions: usize,
    pub deposit_transactions: usize,
    pub fee_transactions: usize,
}

/// Aggregate view over the classified transaction set. Always recomputed,
/// never persisted as state.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioSummary {
    pub totals: SummaryTotals,
    pub dividend_by_year: BTreeMap<i32, f64>,
    pub investment_by_year: BTreeMap<i32, f64>,
    pub proceeds_by_year: BTreeMap<i32, f64>,
    pub investment_by_month: BTreeMap<String, f64>,
    pub deposit_by_month: BTreeMap<String, f64>,
    pub stats: RawDataStats,
}

/// Cash position derived from every classified row except internal
/// transfers between cash sub-accounts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CashReport {
    pub current_cash_eur: f64,
    pub total_deposits: f64,
    pub total_withdrawals: f64,
    pub cash_by_category: BTreeMap<String, f64>,
    pub total_transactions_used: usize,
    pub excluded_internal_transfers: usize,
}

/// EUR valuation of the currently held positions.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PortfolioValuation {
    pub current_portfolio_value_eur: f64,
    pub current_portfolio_value_usd: f64,
    pub successful_valuations: usize,
    pub failed_valuations: usize,
    pub total_stocks: usize,
    pub usd_to_eur_rate: f64,
}

// Ingestion output

/// What one full ingestion produced, as handed to the presentation layer.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IngestReport {
    pub user_id: String,
    pub transactions_count: usize,
    pub holdings_count: usize,
    pub transaction_breakdown: BTreeMap<String, usize>,
    pub processing_timestamp: String,
    pub summary: PortfolioSummary,
}

/// Round to two decimals the way money fields are reported.
pub fn round2(v: f64) -> f64 {
    (v * 100.0).round() / 100.0
}
