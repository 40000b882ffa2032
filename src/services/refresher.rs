use std::time::Duration;

use tokio::time::{interval, MissedTickBehavior};

use crate::state::AppState;

/// Refetch the record snapshot on a fixed interval so dashboards never wait
/// on the spreadsheet. Failures are logged and the previous snapshot stays.
pub async fn run_auto_refresh(state: AppState) {
    let period = Duration::from_secs(state.config.auto_refresh_interval_seconds.max(30));
    tracing::info!(interval_seconds = period.as_secs(), "Snapshot auto-refresh started");

    let mut ticker = interval(period);
    ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

    loop {
        ticker.tick().await;
        match state.snapshots.refresh(&state.sheets).await {
            Ok(snapshot) => {
                state.matrix_cache.invalidate_all();
                tracing::debug!(version = snapshot.version, "Snapshot auto-refreshed");
            }
            Err(error) => {
                tracing::warn!(error = %error, "Snapshot auto-refresh failed");
            }
        }
    }
}
