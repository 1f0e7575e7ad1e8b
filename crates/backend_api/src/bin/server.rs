use std::sync::Arc;
use std::{env, path::PathBuf};

use backend_api::{run_server, AppState};
use degiro::ExchangeRates;
use portfolio_engine::Engine;
use quotes::{FinnhubClient, QuoteSource, StaticQuotes};
use store::FileStore;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // Environment-driven configuration (with sane defaults):
    //   DATA_DIR          directory for per-user JSON documents
    //   RATES_PATH        EUR/USD rates CSV (Date,EUR_to_USD)
    //   FINNHUB_API_KEY   price-lookup key; holdings degrade without it
    //   HOST / PORT       bind address
    dotenvy::dotenv().ok();

    let data_dir = env::var("DATA_DIR").unwrap_or_else(|_| "data".to_string());
    let rates_path = env::var("RATES_PATH")
        .unwrap_or_else(|_| "currency_conversion_rates.csv".to_string());
    let host = env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());
    let port: u16 = env::var("PORT")
        .unwrap_or_else(|_| "3000".to_string())
        .parse()
        .unwrap_or(3000);

    println!("Portfolio API Server");
    println!("====================");
    println!("Data dir: {}", data_dir);
    println!("Rates file: {}", rates_path);
    println!("Listening on: {}:{}", host, port);
    println!();

    let rates = if PathBuf::from(&rates_path).exists() {
        ExchangeRates::from_path(&rates_path)?
    } else {
        eprintln!("[WARN] rates file not found at {}; USD amounts will not convert", rates_path);
        ExchangeRates::empty()
    };

    let quotes: Arc<dyn QuoteSource> = match env::var("FINNHUB_API_KEY") {
        Ok(key) if !key.is_empty() => Arc::new(FinnhubClient::new(&key)?),
        _ => {
            eprintln!("[WARN] FINNHUB_API_KEY not set; holdings will carry no market prices");
            Arc::new(StaticQuotes::new())
        }
    };

    let store = Arc::new(FileStore::new(&data_dir));
    let engine = Engine::new(quotes, store);

    let state = Arc::new(AppState { engine, rates });
    run_server(state, &host, port).await?;

    Ok(())
}
