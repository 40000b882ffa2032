use std::sync::Arc;
use std::time::Duration;

use moka::future::Cache;
use serde_json::Value;

use crate::config::AppConfig;
use crate::error::AppResult;
use crate::services::sheets::SheetsClient;
use crate::services::snapshot::{RecordSnapshot, SnapshotStore};

#[derive(Clone)]
pub struct AppState {
    pub config: Arc<AppConfig>,
    pub sheets: Arc<SheetsClient>,
    pub snapshots: Arc<SnapshotStore>,
    /// Built matrix payloads keyed by kind, snapshot version and year.
    pub matrix_cache: Cache<String, Arc<Value>>,
}

impl AppState {
    pub fn build(config: AppConfig) -> Result<Self, reqwest::Error> {
        let http_client = reqwest::Client::builder()
            .user_agent(format!("{}/{}", env!("CARGO_PKG_NAME"), env!("CARGO_PKG_VERSION")))
            .connect_timeout(Duration::from_secs(10))
            .build()?;

        let ttl = Duration::from_secs(config.snapshot_cache_ttl_seconds);
        let matrix_cache = Cache::builder()
            .max_capacity(config.matrix_cache_max_entries)
            .time_to_live(ttl.max(Duration::from_secs(1)))
            .build();

        Ok(Self {
            sheets: Arc::new(SheetsClient::from_config(http_client, &config)),
            snapshots: Arc::new(SnapshotStore::new(ttl)),
            matrix_cache,
            config: Arc::new(config),
        })
    }

    pub async fn snapshot(&self) -> AppResult<Arc<RecordSnapshot>> {
        self.snapshots.get_or_refresh(&self.sheets).await
    }
}
