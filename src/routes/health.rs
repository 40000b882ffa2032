use axum::extract::State;
use axum::Json;
use chrono::Utc;
use serde_json::{json, Value};

use crate::state::AppState;

pub async fn health(State(state): State<AppState>) -> Json<Value> {
    let cached = state.snapshots.cached().await;
    let sheets_configured = state.config.sheets_configured();

    // No spreadsheet and nothing cached means every data route will fail.
    let status = if sheets_configured || cached.is_some() {
        "ok"
    } else {
        "degraded"
    };
    let snapshot = match cached {
        Some(cached) => json!({
            "loaded": true,
            "version": cached.value.version,
            "ageSeconds": cached.age().as_secs(),
            "fresh": cached.is_fresh(),
        }),
        None => json!({ "loaded": false }),
    };

    Json(json!({
        "status": status,
        "now": Utc::now().to_rfc3339(),
        "sheetsConfigured": sheets_configured,
        "snapshotTtlSeconds": state.snapshots.ttl().as_secs(),
        "snapshot": snapshot,
    }))
}
