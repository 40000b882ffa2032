use axum::{extract::State, http::HeaderMap, Json};
use serde_json::{json, Value};

use crate::{
    config::AppConfig,
    error::{AppError, AppResult},
    state::AppState,
};

pub const API_KEY_HEADER: &str = "x-api-key";

pub fn router() -> axum::Router<AppState> {
    axum::Router::new().route("/cache/refresh", axum::routing::post(refresh_cache))
}

async fn refresh_cache(State(state): State<AppState>, headers: HeaderMap) -> AppResult<Json<Value>> {
    authorize_refresh(&state.config, &headers)?;

    let snapshot = state.snapshots.refresh(&state.sheets).await?;
    state.matrix_cache.invalidate_all();
    tracing::info!(version = snapshot.version, "Record snapshot refreshed on request");

    Ok(Json(json!({
        "version": snapshot.version,
        "owners": snapshot.owners.len(),
        "receipts": snapshot.receipts.len(),
        "warnings": snapshot.warnings.len(),
        "fetchedAt": snapshot.fetched_at.to_rfc3339(),
    })))
}

fn authorize_refresh(config: &AppConfig, headers: &HeaderMap) -> AppResult<()> {
    let Some(expected) = config.internal_api_key.as_deref() else {
        if config.is_production() {
            return Err(AppError::Unauthorized(
                "Cache refresh is disabled until INTERNAL_API_KEY is set.".to_string(),
            ));
        }
        return Ok(());
    };

    let provided = headers
        .get(API_KEY_HEADER)
        .and_then(|value| value.to_str().ok())
        .map(str::trim)
        .unwrap_or_default();
    if provided.is_empty() || provided != expected {
        return Err(AppError::Unauthorized("Invalid or missing API key.".to_string()));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::{authorize_refresh, API_KEY_HEADER};
    use crate::config::AppConfig;
    use axum::http::{HeaderMap, HeaderValue};

    fn config(environment: &str, key: Option<&str>) -> AppConfig {
        let mut config = AppConfig::from_env();
        config.environment = environment.to_string();
        config.internal_api_key = key.map(ToOwned::to_owned);
        config
    }

    #[test]
    fn open_outside_production_without_a_key() {
        assert!(authorize_refresh(&config("development", None), &HeaderMap::new()).is_ok());
        assert!(authorize_refresh(&config("production", None), &HeaderMap::new()).is_err());
    }

    #[test]
    fn requires_matching_key_when_configured() {
        let config = config("production", Some("s3cret"));
        assert!(authorize_refresh(&config, &HeaderMap::new()).is_err());

        let mut headers = HeaderMap::new();
        headers.insert(API_KEY_HEADER, HeaderValue::from_static("wrong"));
        assert!(authorize_refresh(&config, &headers).is_err());

        headers.insert(API_KEY_HEADER, HeaderValue::from_static("s3cret"));
        assert!(authorize_refresh(&config, &headers).is_ok());
    }
}
