use axum::{
    extract::{Path, Query, State},
    Json,
};
use chrono::Utc;
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::sync::Arc;

use degiro::ExchangeRates;
use models::{Category, ClassifiedTransaction, Holding, IngestReport, PortfolioSummary};
use portfolio_engine::{full_summary, Engine, Partitions};
use store::PortfolioStore;

use crate::{error::ApiError, Result};

/// Shared application state: the engine with its collaborators, plus the
/// exchange-rate table loaded at startup.
pub struct AppState {
    pub engine: Engine,
    pub rates: ExchangeRates,
}

pub type SharedState = Arc<AppState>;

/// GET /health
pub async fn health_check() -> Json<serde_json::Value> {
    Json(json!({
        "status": "healthy",
        "timestamp": Utc::now().to_rfc3339(),
    }))
}

/// POST /api/users/:user_id/statement
/// Body is the raw CSV export; runs a full ingestion for the user.
pub async fn upload_statement(
    State(state): State<SharedState>,
    Path(user_id): Path<String>,
    body: String,
) -> Result<Json<IngestReport>> {
    let report = state
        .engine
        .ingest(&user_id, &body, &state.rates)
        .await
        .map_err(|e| ApiError::Ingestion(e.to_string()))?;

    Ok(Json(report))
}

/// GET /api/users/:user_id/portfolio
/// Summary recomputed from the stored transaction set.
pub async fn get_portfolio(
    State(state): State<SharedState>,
    Path(user_id): Path<String>,
) -> Result<Json<PortfolioSummary>> {
    let rows = state.engine.store().transactions(&user_id, None).await?;
    let holdings = state.engine.store().holdings(&user_id).await?;

    let parts = Partitions::from_rows(rows);
    let summary = full_summary(&parts, Some(holdings.as_slice()), state.rates.latest());

    Ok(Json(summary))
}

/// GET /api/users/:user_id/holdings
pub async fn get_holdings(
    State(state): State<SharedState>,
    Path(user_id): Path<String>,
) -> Result<Json<Vec<Holding>>> {
    let holdings = state.engine.store().holdings(&user_id).await?;
    Ok(Json(holdings))
}

#[derive(Debug, Deserialize)]
pub struct TransactionsQuery {
    pub category: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct TransactionsResponse {
    pub user_id: String,
    pub count: usize,
    pub transactions: Vec<ClassifiedTransaction>,
}

/// GET /api/users/:user_id/transactions?category=compra
pub async fn get_transactions(
    State(state): State<SharedState>,
    Path(user_id): Path<String>,
    Query(query): Query<TransactionsQuery>,
) -> Result<Json<TransactionsResponse>> {
    let category = match &query.category {
        Some(label) => Some(
            Category::from_label(label)
                .ok_or_else(|| ApiError::UnknownCategory(label.clone()))?,
        ),
        None => None,
    };

    let transactions = state.engine.store().transactions(&user_id, category).await?;

    Ok(Json(TransactionsResponse {
        user_id,
        count: transactions.len(),
        transactions,
    }))
}
