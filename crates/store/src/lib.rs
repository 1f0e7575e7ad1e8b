use anyhow::{Context, Result};
use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha256};
use std::collections::{BTreeMap, HashMap};
use std::path::{Path, PathBuf};
use tokio::sync::Mutex;

use models::{Category, ClassifiedTransaction, Holding};

/// Persistence contract for the reconciliation engine's outputs.
///
/// Transaction writes replace every row of the given category for the user;
/// holdings writes replace the user's whole position set. Nothing appends.
#[async_trait]
pub trait PortfolioStore: Send + Sync {
    async fn replace_transactions(
        &self,
        user_id: &str,
        category: Category,
        rows: &[ClassifiedTransaction],
    ) -> Result<()>;

    async fn replace_holdings(&self, user_id: &str, holdings: &[Holding]) -> Result<()>;

    /// All stored transactions, optionally restricted to one category.
    async fn transactions(
        &self,
        user_id: &str,
        category: Option<Category>,
    ) -> Result<Vec<ClassifiedTransaction>>;

    /// Holdings ordered by company name.
    async fn holdings(&self, user_id: &str) -> Result<Vec<Holding>>;

    /// Distinct symbols across the user's holdings.
    async fn symbols(&self, user_id: &str) -> Result<Vec<String>>;
}

/// Content-derived row id: re-ingesting the same statement yields the same
/// ids, so downstream consumers can diff across ingestions.
pub fn record_id(txn: &ClassifiedTransaction) -> String {
    let key = format!(
        "{}|{}|{:?}|{:?}|{}",
        txn.record.date,
        txn.category,
        txn.record.amount,
        txn.record.isin,
        txn.record.original_description,
    );
    let mut hasher = Sha256::new();
    hasher.update(key.as_bytes());
    let hash = hex::encode(hasher.finalize());
    format!("TXN-{}", &hash[..24])
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct StoredTransaction {
    pub record_id: String,
    #[serde(flatten)]
    pub txn: ClassifiedTransaction,
}

#[derive(Debug, Default, Serialize, Deserialize)]
struct UserDocument {
    #[serde(default)]
    transactions: BTreeMap<String, Vec<StoredTransaction>>,
    #[serde(default)]
    holdings: Vec<Holding>,
}

impl UserDocument {
    fn collect_transactions(&self, category: Option<Category>) -> Vec<ClassifiedTransaction> {
        match category {
            Some(c) => self
                .transactions
                .get(c.label())
                .map(|rows| rows.iter().map(|r| r.txn.clone()).collect())
                .unwrap_or_default(),
            None => self
                .transactions
                .values()
                .flat_map(|rows| rows.iter().map(|r| r.txn.clone()))
                .collect(),
        }
    }

    fn sorted_holdings(&self) -> Vec<Holding> {
        let mut holdings = self.holdings.clone();
        holdings.sort_by(|a, b| a.company_name.cmp(&b.company_name));
        holdings
    }

    fn symbols(&self) -> Vec<String> {
        let mut symbols: Vec<String> = self
            .holdings
            .iter()
            .filter_map(|h| h.symbol.clone())
            .collect();
        symbols.sort();
        symbols.dedup();
        symbols
    }
}

/// JSON-file store: one document per user under a data directory.
///
/// Writes are replace-style and serialized behind one lock, so two
/// concurrent ingestions of the same user cannot interleave their rows.
pub struct FileStore {
    root: PathBuf,
    write_lock: Mutex<()>,
}

impl FileStore {
    pub fn new<P: AsRef<Path>>(root: P) -> Self {
        Self {
            root: root.as_ref().to_path_buf(),
            write_lock: Mutex::new(()),
        }
    }

    fn user_path(&self, user_id: &str) -> PathBuf {
        let safe: String = user_id
            .chars()
            .map(|c| if c.is_ascii_alphanumeric() || c == '-' || c == '_' { c } else { '_' })
            .collect();
        self.root.join(format!("{}.json", safe))
    }

    async fn load(&self, user_id: &str) -> Result<UserDocument> {
        let path = self.user_path(user_id);
        if !tokio::fs::try_exists(&path).await.unwrap_or(false) {
            return Ok(UserDocument::default());
        }

        let content = tokio::fs::read_to_string(&path)
            .await
            .with_context(|| format!("Cannot read {}", path.display()))?;
        let doc = serde_json::from_str(&content)
            .with_context(|| format!("Corrupt user document {}", path.display()))?;
        Ok(doc)
    }

    async fn save(&self, user_id: &str, doc: &UserDocument) -> Result<()> {
        tokio::fs::create_dir_all(&self.root)
            .await
            .with_context(|| format!("Cannot create {}", self.root.display()))?;

        let path = self.user_path(user_id);
        let content = serde_json::to_string_pretty(doc)?;
        tokio::fs::write(&path, content)
            .await
            .with_context(|| format!("Cannot write {}", path.display()))?;
        Ok(())
    }
}

#[async_trait]
impl PortfolioStore for FileStore {
    async fn replace_transactions(
        &self,
        user_id: &str,
        category: Category,
        rows: &[ClassifiedTransaction],
    ) -> Result<()> {
        let _guard = self.write_lock.lock().await;

        let mut doc = self.load(user_id).await?;
        if rows.is_empty() {
            doc.transactions.remove(category.label());
        } else {
            let stored: Vec<StoredTransaction> = rows
                .iter()
                .map(|txn| StoredTransaction {
                    record_id: record_id(txn),
                    txn: txn.clone(),
                })
                .collect();
            doc.transactions.insert(category.label().to_string(), stored);
        }
        self.save(user_id, &doc).await?;

        tracing::debug!(user_id, category = %category, rows = rows.len(), "Replaced transactions");
        Ok(())
    }

    async fn replace_holdings(&self, user_id: &str, holdings: &[Holding]) -> Result<()> {
        let _guard = self.write_lock.lock().await;

        let mut doc = self.load(user_id).await?;
        doc.holdings = holdings.to_vec();
        self.save(user_id, &doc).await
    }

    async fn transactions(
        &self,
        user_id: &str,
        category: Option<Category>,
    ) -> Result<Vec<ClassifiedTransaction>> {
        Ok(self.load(user_id).await?.collect_transactions(category))
    }

    async fn holdings(&self, user_id: &str) -> Result<Vec<Holding>> {
        Ok(self.load(user_id).await?.sorted_holdings())
    }

    async fn symbols(&self, user_id: &str) -> Result<Vec<String>> {
        Ok(self.load(user_id).await?.symbols())
    }
}

/// In-memory store with the same replace semantics. Used in tests and as a
/// stand-in when nothing should touch disk.
#[derive(Default)]
pub struct MemoryStore {
    users: Mutex<HashMap<String, UserDocument>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }
}

#[async_trait]
impl PortfolioStore for MemoryStore {
    async fn replace_transactions(
        &self,
        user_id: &str,
        category: Category,
        rows: &[ClassifiedTransaction],
    ) -> Result<()> {
        let mut users = self.users.lock().await;
        let doc = users.entry(user_id.to_string()).or_default();
        if rows.is_empty() {
            doc.transactions.remove(category.label());
        } else {
            let stored: Vec<StoredTransaction> = rows
                .iter()
                .map(|txn| StoredTransaction {
                    record_id: record_id(txn),
                    txn: txn.clone(),
                })
                .collect();
            doc.transactions.insert(category.label().to_string(), stored);
        }
        Ok(())
    }

    async fn replace_holdings(&self, user_id: &str, holdings: &[Holding]) -> Result<()> {
        let mut users = self.users.lock().await;
        users.entry(user_id.to_string()).or_default().holdings = holdings.to_vec();
        Ok(())
    }

    async fn transactions(
        &self,
        user_id: &str,
        category: Option<Category>,
    ) -> Result<Vec<ClassifiedTransaction>> {
        let users = self.users.lock().await;
        Ok(users
            .get(user_id)
            .map(|doc| doc.collect_transactions(category))
            .unwrap_or_default())
    }

    async fn holdings(&self, user_id: &str) -> Result<Vec<Holding>> {
        let users = self.users.lock().await;
        Ok(users
            .get(user_id)
            .map(|doc| doc.sorted_holdings())
            .unwrap_or_default())
    }

    async fn symbols(&self, user_id: &str) -> Result<Vec<String>> {
        let users = self.users.lock().await;
        Ok(users
            .get(user_id)
            .map(|doc| doc.symbols())
            .unwrap_or_default())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::{Datelike, NaiveDate};
    use models::LedgerRecord;

    fn txn(date: (i32, u32, u32), description: &str, category: Category) -> ClassifiedTransaction {
        let date = NaiveDate::from_ymd_opt(date.0, date.1, date.2).unwrap();
        ClassifiedTransaction {
            record: LedgerRecord {
                date,
                time: None,
                product: Some("APPLE INC".to_string()),
                isin: Some("US0378331005".to_string()),
                original_description: description.to_string(),
                amount: Some(-100.0),
                amount_currency: Some("EUR".to_string()),
                balance: None,
                balance_currency: None,
                amount_eur: Some(-100.0),
                balance_eur: None,
                year: date.year(),
                year_month: date.format("%Y-%m").to_string(),
            },
            description: description.to_lowercase(),
            category,
            country: "US".to_string(),
            shares: None,
            price: None,
            is_valid: false,
            status: None,
        }
    }

    fn holding(name: &str, symbol: Option<&str>) -> Holding {
        Holding {
            isin: "US0378331005".to_string(),
            company_name: name.to_string(),
            symbol: symbol.map(str::to_string),
            shares_held: 6,
            current_price: None,
            currency: None,
            position_value: 0.0,
            fetch_date: NaiveDate::from_ymd_opt(2024, 1, 1).unwrap(),
            fetch_timestamp: "2024-01-01T00:00:00Z".to_string(),
            source: "failed".to_string(),
        }
    }

    #[tokio::test]
    async fn test_memory_store_replace_semantics() {
        let store = MemoryStore::new();

        store
            .replace_transactions("u1", Category::Compra, &[txn((2024, 1, 1), "Compra 10", Category::Compra)])
            .await
            .unwrap();
        store
            .replace_transactions(
                "u1",
                Category::Compra,
                &[txn((2024, 2, 1), "Compra 5", Category::Compra)],
            )
            .await
            .unwrap();

        let rows = store.transactions("u1", Some(Category::Compra)).await.unwrap();
        assert_eq!(rows.len(), 1);
        assert_eq!(rows[0].record.original_description, "Compra 5");

        // replacing with nothing clears the category
        store
            .replace_transactions("u1", Category::Compra, &[])
            .await
            .unwrap();
        assert!(store
            .transactions("u1", Some(Category::Compra))
            .await
            .unwrap()
            .is_empty());
    }

    #[tokio::test]
    async fn test_memory_store_holdings_ordered_by_name() {
        let store = MemoryStore::new();
        store
            .replace_holdings("u1", &[holding("ZOOM", Some("ZM")), holding("APPLE", Some("AAPL"))])
            .await
            .unwrap();

        let holdings = store.holdings("u1").await.unwrap();
        assert_eq!(holdings[0].company_name, "APPLE");
        assert_eq!(holdings[1].company_name, "ZOOM");
        assert_eq!(store.symbols("u1").await.unwrap(), vec!["AAPL", "ZM"]);
    }

    #[tokio::test]
    async fn test_file_store_round_trip() {
        let dir = std::env::temp_dir().join(format!(
            "cartera_store_test_{}_{}",
            std::process::id(),
            "round_trip"
        ));
        let _ = std::fs::remove_dir_all(&dir);

        let store = FileStore::new(&dir);
        store
            .replace_transactions(
                "user one",
                Category::Venta,
                &[txn((2024, 3, 1), "Venta 4", Category::Venta)],
            )
            .await
            .unwrap();
        store.replace_holdings("user one", &[holding("APPLE INC", None)]).await.unwrap();

        let rows = store.transactions("user one", None).await.unwrap();
        assert_eq!(rows.len(), 1);
        let holdings = store.holdings("user one").await.unwrap();
        assert_eq!(holdings.len(), 1);
        // no symbol on the only holding
        assert!(store.symbols("user one").await.unwrap().is_empty());

        // unknown user reads as empty, not as an error
        assert!(store.transactions("nobody", None).await.unwrap().is_empty());

        let _ = std::fs::remove_dir_all(&dir);
    }

    #[test]
    fn test_record_id_is_stable_and_content_sensitive() {
        let a = txn((2024, 1, 1), "Compra 10", Category::Compra);
        let b = txn((2024, 1, 1), "Compra 10", Category::Compra);
        let c = txn((2024, 1, 2), "Compra 10", Category::Compra);

        assert_eq!(record_id(&a), record_id(&b));
        assert_ne!(record_id(&a), record_id(&c));
        assert!(record_id(&a).starts_with("TXN-"));
    }
}
