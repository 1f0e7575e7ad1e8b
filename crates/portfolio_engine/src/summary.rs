use chrono::NaiveDate;
use std::collections::{BTreeMap, HashMap, HashSet};

use models::{
    round2, CashReport, Category, ClassifiedTransaction, DividendStatus, Holding,
    PortfolioSummary, PortfolioValuation, RawDataStats, SummaryTotals,
};

use crate::holdings::FAILED_SOURCE;
use crate::Partitions;

/// What a dividend group must look like, per withholding jurisdiction.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ExpectedRows {
    /// Gross dividend plus its withholding-tax leg on the same day.
    PairedWithholding,
    /// A single net row; the jurisdiction withholds nothing extra.
    SingleRow,
}

pub struct WithholdingRule {
    pub country: &'static str,
    pub expect: ExpectedRows,
}

pub const WITHHOLDING_RULES: &[WithholdingRule] = &[
    WithholdingRule { country: "US", expect: ExpectedRows::PairedWithholding },
    WithholdingRule { country: "LR", expect: ExpectedRows::SingleRow },
];

/// Products that pay out ADR-style with a single row no matter what their
/// ISIN country says.
pub const ADR_EXCEPTIONS: &[&str] = &["alibaba"];

const DIVIDEND_LABEL: &str = "dividendo";
const WITHHOLDING_LABEL: &str = "retención del dividendo";

/// Label each (date, product) dividend group verified or unverified.
///
/// Verification is informational data-quality tagging only; no sum ever
/// filters on it.
pub fn verify_dividends(dividends: &mut [ClassifiedTransaction]) {
    let mut groups: HashMap<(NaiveDate, String), Vec<usize>> = HashMap::new();
    for (i, row) in dividends.iter().enumerate() {
        let product = row.record.product.clone().unwrap_or_default();
        groups.entry((row.record.date, product)).or_default().push(i);
    }

    for ((_, product), indexes) in groups {
        let product_lower = product.to_lowercase();
        let adr_exception = ADR_EXCEPTIONS.iter().any(|e| product_lower.contains(e));
        let country = &dividends[indexes[0]].country;

        let expect = if adr_exception {
            Some(ExpectedRows::SingleRow)
        } else {
            WITHHOLDING_RULES
                .iter()
                .find(|r| r.country == country)
                .map(|r| r.expect)
        };

        let verified = match expect {
            Some(ExpectedRows::PairedWithholding) => {
                let labels: HashSet<&str> = indexes
                    .iter()
                    .map(|&i| dividends[i].description.as_str())
                    .collect();
                indexes.len() == 2
                    && labels.contains(DIVIDEND_LABEL)
                    && labels.contains(WITHHOLDING_LABEL)
            }
            Some(ExpectedRows::SingleRow) => indexes.len() == 1,
            None => false,
        };

        let status = if verified {
            DividendStatus::Verified
        } else {
            DividendStatus::Unverified
        };
        for i in indexes {
            dividends[i].status = Some(status);
        }
    }
}

fn sum_eur<'a, I: IntoIterator<Item = &'a ClassifiedTransaction>>(rows: I) -> f64 {
    rows.into_iter().filter_map(|t| t.record.amount_eur).sum()
}

fn by_year<'a, I: IntoIterator<Item = &'a ClassifiedTransaction>>(
    rows: I,
    sign: f64,
) -> BTreeMap<i32, f64> {
    let mut map: BTreeMap<i32, f64> = BTreeMap::new();
    for row in rows {
        if let Some(v) = row.record.amount_eur {
            *map.entry(row.record.year).or_insert(0.0) += v * sign;
        }
    }
    map.values_mut().for_each(|v| *v = round2(*v));
    map
}

fn by_month<'a, I: IntoIterator<Item = &'a ClassifiedTransaction>>(
    rows: I,
    sign: f64,
) -> BTreeMap<String, f64> {
    let mut map: BTreeMap<String, f64> = BTreeMap::new();
    for row in rows {
        if let Some(v) = row.record.amount_eur {
            *map.entry(row.record.year_month.clone()).or_insert(0.0) += v * sign;
        }
    }
    map.values_mut().for_each(|v| *v = round2(*v));
    map
}

/// Aggregate the classified partitions into lifetime and time-bucketed
/// totals. Invested capital counts valid buys only; dividends count every
/// dividend row, verified or not.
pub fn summarize(parts: &Partitions) -> PortfolioSummary {
    let buys = parts.of(Category::Compra);
    let sells = parts.of(Category::Venta);
    let dividends = parts.of(Category::Dividendo);
    let deposits = parts.of(Category::Ingreso);
    let fees = parts.of(Category::Comision);

    let valid_buys = || buys.iter().filter(|b| b.is_valid);

    let total_invested = round2(-sum_eur(valid_buys()));
    let total_proceeds = round2(sum_eur(sells));
    let total_deposits = round2(sum_eur(deposits));
    let total_dividends = round2(sum_eur(dividends));
    let total_fees = round2(-sum_eur(fees));

    let verified_dividends = dividends
        .iter()
        .filter(|d| d.status == Some(DividendStatus::Verified))
        .count();

    PortfolioSummary {
        totals: SummaryTotals {
            total_invested,
            total_proceeds,
            net_invested: round2(total_invested - total_proceeds),
            total_deposits,
            total_dividends,
            total_fees,
            portfolio_return: round2(total_dividends + total_proceeds - total_fees),
            current_cash_eur: None,
            current_portfolio_value_eur: None,
            total_portfolio_value_eur: None,
        },
        dividend_by_year: by_year(dividends, 1.0),
        investment_by_year: by_year(valid_buys(), -1.0),
        proceeds_by_year: by_year(sells, 1.0),
        investment_by_month: by_month(valid_buys(), -1.0),
        deposit_by_month: by_month(deposits, 1.0),
        stats: RawDataStats {
            total_buy_transactions: buys.len(),
            valid_buy_transactions: valid_buys().count(),
            sell_transactions: sells.len(),
            dividend_transactions: dividends.len(),
            verified_dividend_transactions: verified_dividends,
            deposit_transactions: deposits.len(),
            fee_transactions: fees.len(),
        },
    }
}

/// Current cash from every classified row except internal transfers
/// between cash sub-accounts, which never move money externally.
pub fn cash_report(parts: &Partitions) -> CashReport {
    let mut total = 0.0;
    let mut by_category: BTreeMap<String, f64> = BTreeMap::new();
    let mut used = 0usize;
    let mut excluded = 0usize;

    for row in parts.all() {
        if row.category == Category::TransferenciaInterna {
            excluded += 1;
            continue;
        }
        used += 1;
        if let Some(v) = row.record.amount_eur {
            total += v;
            *by_category.entry(row.category.label().to_string()).or_insert(0.0) += v;
        }
    }
    by_category.values_mut().for_each(|v| *v = round2(*v));

    CashReport {
        current_cash_eur: round2(total),
        total_deposits: by_category.get(Category::Ingreso.label()).copied().unwrap_or(0.0),
        total_withdrawals: by_category.get(Category::Retiro.label()).copied().unwrap_or(0.0),
        cash_by_category: by_category,
        total_transactions_used: used,
        excluded_internal_transfers: excluded,
    }
}

/// EUR value of the held positions. Position values arrive in USD from the
/// quote service; `"failed"` entries count as failures, not as zero-priced
/// successes.
pub fn portfolio_valuation(holdings: &[Holding], latest_eur_to_usd: f64) -> PortfolioValuation {
    let successful: Vec<&Holding> =
        holdings.iter().filter(|h| h.source != FAILED_SOURCE).collect();
    let failed = holdings.len() - successful.len();

    let total_usd: f64 = successful.iter().map(|h| h.position_value).sum();
    let usd_to_eur = 1.0 / latest_eur_to_usd;

    PortfolioValuation {
        current_portfolio_value_eur: round2(total_usd * usd_to_eur),
        current_portfolio_value_usd: round2(total_usd),
        successful_valuations: successful.len(),
        failed_valuations: failed,
        total_stocks: holdings.len(),
        usd_to_eur_rate: (usd_to_eur * 10_000.0).round() / 10_000.0,
    }
}
