use anyhow::{Context, Result};
use clap::Parser;
use std::fs;
use std::path::PathBuf;
use std::sync::Arc;

use degiro::ExchangeRates;
use models::Category;
use portfolio_engine::{full_summary, process_statement, Engine};
use quotes::FinnhubClient;
use store::MemoryStore;

/// Process a cash-account export into portfolio datasets on disk.
#[derive(Parser, Debug)]
#[command(name = "process_statement")]
struct Args {
    /// Cash-account CSV export
    #[arg(long)]
    statement: PathBuf,

    /// EUR/USD rates CSV with Date and EUR_to_USD columns
    #[arg(long)]
    rates: Option<PathBuf>,

    /// Output directory for the generated JSON datasets
    #[arg(long, default_value = "output")]
    output: PathBuf,

    /// Fetch current prices and write holdings.json (needs FINNHUB_API_KEY)
    #[arg(long)]
    fetch_prices: bool,
}

#[tokio::main]
async fn main() -> Result<()> {
    dotenvy::dotenv().ok();
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "portfolio_engine=info,degiro=info".into()),
        )
        .init();

    let args = Args::parse();

    println!("🚀 Processing {}...", args.statement.display());

    let csv = fs::read_to_string(&args.statement)
        .with_context(|| format!("Cannot read {}", args.statement.display()))?;
    let rates = match &args.rates {
        Some(path) => ExchangeRates::from_path(path)?,
        None => {
            println!("⚠️  No rates file given; USD amounts will not convert to EUR");
            ExchangeRates::empty()
        }
    };

    let parts = process_statement(&csv, &rates)?;

    fs::create_dir_all(&args.output)
        .with_context(|| format!("Cannot create {}", args.output.display()))?;

    let datasets = [
        (Category::Compra, "buys.json"),
        (Category::Venta, "sells.json"),
        (Category::Dividendo, "dividends.json"),
        (Category::Ingreso, "deposits.json"),
        (Category::Comision, "fees.json"),
    ];
    for (category, filename) in datasets {
        let path = args.output.join(filename);
        fs::write(&path, serde_json::to_string_pretty(parts.of(category))?)
            .with_context(|| format!("Cannot write {}", path.display()))?;
    }

    let holdings = if args.fetch_prices {
        let api_key = std::env::var("FINNHUB_API_KEY").unwrap_or_default();
        let quotes = Arc::new(FinnhubClient::new(&api_key)?);
        let engine = Engine::new(quotes, Arc::new(MemoryStore::new()));

        println!("\n📈 Fetching current stock prices from API...");
        let holdings = engine.reconcile(&parts).await;

        let path = args.output.join("holdings.json");
        fs::write(&path, serde_json::to_string_pretty(&holdings)?)
            .with_context(|| format!("Cannot write {}", path.display()))?;
        Some(holdings)
    } else {
        None
    };

    let summary = full_summary(&parts, holdings.as_deref(), rates.latest());
    let summary_path = args.output.join("portfolio_summary.json");
    fs::write(&summary_path, serde_json::to_string_pretty(&summary)?)
        .with_context(|| format!("Cannot write {}", summary_path.display()))?;

    println!("\n✅ Generated datasets in {}:", args.output.display());
    println!(
        "   - Buys: {} transactions ({} valid)",
        summary.stats.total_buy_transactions, summary.stats.valid_buy_transactions
    );
    println!("   - Sells: {} transactions", summary.stats.sell_transactions);
    println!(
        "   - Dividends: {} transactions ({} verified)",
        summary.stats.dividend_transactions, summary.stats.verified_dividend_transactions
    );
    println!("   - Deposits: {} transactions", summary.stats.deposit_transactions);
    println!("   - Fees: {} transactions", summary.stats.fee_transactions);

    if let Some(holdings) = &holdings {
        let failed = holdings.iter().filter(|h| h.source == "failed").count();
        println!("   - Holdings: {} positions ({} without a price)", holdings.len(), failed);
    }

    println!("\n📊 Portfolio Summary:");
    println!("   - Total Invested: €{:.2}", summary.totals.total_invested);
    println!("   - Total Dividends: €{:.2}", summary.totals.total_dividends);
    println!("   - Total Fees: €{:.2}", summary.totals.total_fees);
    println!("   - Portfolio Return: €{:.2}", summary.totals.portfolio_return);
    if let Some(cash) = summary.totals.current_cash_eur {
        println!("   - Current Cash: €{:.2}", cash);
    }
    if let Some(value) = summary.totals.current_portfolio_value_eur {
        println!("   - Current Portfolio Value: €{:.2}", value);
    }
    if let Some(total) = summary.totals.total_portfolio_value_eur {
        println!("   - Total Portfolio Value: €{:.2}", total);
    }

    Ok(())
}
