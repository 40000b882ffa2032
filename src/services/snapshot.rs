use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use tokio::sync::{Mutex, RwLock};

use crate::error::AppResult;
use crate::models::{Owner, Receipt};
use crate::services::sheets::SheetsClient;

/// One fetch of both sheets. Never mutated; a refetch replaces it wholesale.
#[derive(Debug, Clone, PartialEq)]
pub struct RecordSnapshot {
    pub version: u64,
    pub owners: Vec<Owner>,
    pub receipts: Vec<Receipt>,
    /// Rows dropped or coerced while decoding the sheets.
    pub warnings: Vec<String>,
    pub fetched_at: DateTime<Utc>,
}

#[derive(Debug, Clone)]
pub struct CachedSnapshot {
    pub value: Arc<RecordSnapshot>,
    pub stored_at: Instant,
    pub ttl: Duration,
}

impl CachedSnapshot {
    pub fn age(&self) -> Duration {
        self.stored_at.elapsed()
    }

    pub fn is_fresh(&self) -> bool {
        self.age() < self.ttl
    }
}

/// Holds the latest snapshot for the freshness window and refetches on
/// demand. Concurrent misses share a single fetch.
#[derive(Debug)]
pub struct SnapshotStore {
    ttl: Duration,
    current: RwLock<Option<CachedSnapshot>>,
    refresh_lock: Mutex<()>,
    next_version: AtomicU64,
}

impl SnapshotStore {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            current: RwLock::new(None),
            refresh_lock: Mutex::new(()),
            next_version: AtomicU64::new(1),
        }
    }

    pub fn ttl(&self) -> Duration {
        self.ttl
    }

    pub async fn cached(&self) -> Option<CachedSnapshot> {
        self.current.read().await.clone()
    }

    async fn fresh(&self) -> Option<Arc<RecordSnapshot>> {
        self.cached()
            .await
            .filter(CachedSnapshot::is_fresh)
            .map(|cached| cached.value)
    }

    /// Fresh snapshot if there is one, otherwise fetch. A failed fetch falls
    /// back to the stale snapshot when one exists.
    pub async fn get_or_refresh(&self, sheets: &SheetsClient) -> AppResult<Arc<RecordSnapshot>> {
        if let Some(snapshot) = self.fresh().await {
            return Ok(snapshot);
        }

        let _guard = self.refresh_lock.lock().await;
        if let Some(snapshot) = self.fresh().await {
            return Ok(snapshot);
        }

        match self.fetch_and_install(sheets).await {
            Ok(snapshot) => Ok(snapshot),
            Err(error) => match self.cached().await {
                Some(stale) => {
                    tracing::warn!(
                        error = %error,
                        version = stale.value.version,
                        age_seconds = stale.age().as_secs(),
                        "Spreadsheet refetch failed, serving stale snapshot"
                    );
                    Ok(stale.value)
                }
                None => Err(error),
            },
        }
    }

    /// Unconditional refetch.
    pub async fn refresh(&self, sheets: &SheetsClient) -> AppResult<Arc<RecordSnapshot>> {
        let _guard = self.refresh_lock.lock().await;
        self.fetch_and_install(sheets).await
    }

    async fn fetch_and_install(&self, sheets: &SheetsClient) -> AppResult<Arc<RecordSnapshot>> {
        let (owners, receipts) = tokio::try_join!(sheets.fetch_owners(), sheets.fetch_receipts())?;
        let mut warnings = owners.warnings;
        warnings.extend(receipts.warnings);
        Ok(self.install(owners.records, receipts.records, warnings).await)
    }

    pub async fn install(
        &self,
        owners: Vec<Owner>,
        receipts: Vec<Receipt>,
        warnings: Vec<String>,
    ) -> Arc<RecordSnapshot> {
        let snapshot = Arc::new(RecordSnapshot {
            version: self.next_version.fetch_add(1, Ordering::Relaxed),
            owners,
            receipts,
            warnings,
            fetched_at: Utc::now(),
        });
        tracing::info!(
            version = snapshot.version,
            owners = snapshot.owners.len(),
            receipts = snapshot.receipts.len(),
            warnings = snapshot.warnings.len(),
            "Record snapshot loaded"
        );

        *self.current.write().await = Some(CachedSnapshot {
            value: snapshot.clone(),
            stored_at: Instant::now(),
            ttl: self.ttl,
        });
        snapshot
    }
}

#[cfg(test)]
mod tests {
    use super::SnapshotStore;
    use crate::config::AppConfig;
    use crate::models::Owner;
    use crate::services::sheets::SheetsClient;
    use std::time::Duration;

    fn unconfigured_sheets() -> SheetsClient {
        let mut config = AppConfig::from_env();
        config.spreadsheet_id = None;
        SheetsClient::from_config(reqwest::Client::new(), &config)
    }

    #[tokio::test]
    async fn serves_fresh_snapshot_without_fetching() {
        let store = SnapshotStore::new(Duration::from_secs(300));
        let installed = store.install(vec![Owner::default()], Vec::new(), Vec::new()).await;

        let served = store
            .get_or_refresh(&unconfigured_sheets())
            .await
            .expect("fresh snapshot");
        assert_eq!(served.version, installed.version);
        assert_eq!(served.owners.len(), 1);
    }

    #[tokio::test]
    async fn versions_increase_per_install() {
        let store = SnapshotStore::new(Duration::from_secs(300));
        let first = store.install(Vec::new(), Vec::new(), Vec::new()).await;
        let second = store.install(Vec::new(), Vec::new(), Vec::new()).await;
        assert!(second.version > first.version);
    }

    #[tokio::test]
    async fn stale_snapshot_is_served_when_refetch_fails() {
        let store = SnapshotStore::new(Duration::ZERO);
        let installed = store.install(Vec::new(), Vec::new(), Vec::new()).await;
        assert!(!store.cached().await.expect("cached").is_fresh());

        let served = store
            .get_or_refresh(&unconfigured_sheets())
            .await
            .expect("stale fallback");
        assert_eq!(served.version, installed.version);
    }

    #[tokio::test]
    async fn empty_store_propagates_fetch_errors() {
        let store = SnapshotStore::new(Duration::from_secs(300));
        assert!(store.get_or_refresh(&unconfigured_sheets()).await.is_err());
    }
}
