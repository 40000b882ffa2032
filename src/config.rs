use std::env;

use crate::services::dates::SlashDateOrder;

#[derive(Debug, Clone)]
pub struct AppConfig {
    pub app_name: String,
    pub environment: String,
    pub api_prefix: String,
    pub host: String,
    pub port: u16,
    pub cors_origins: Vec<String>,
    pub rate_limit_enabled: bool,
    pub rate_limit_per_second: u64,
    pub rate_limit_burst_size: u32,
    pub request_timeout_seconds: u64,
    pub google_sheets_api_key: Option<String>,
    pub spreadsheet_id: Option<String>,
    pub sheets_api_base_url: String,
    pub owners_range: String,
    pub receipts_range: String,
    pub receipts_date_order: SlashDateOrder,
    pub sheets_fetch_timeout_seconds: u64,
    pub sheets_fetch_max_attempts: u32,
    pub sheets_retry_backoff_ms: u64,
    pub snapshot_cache_ttl_seconds: u64,
    pub matrix_cache_max_entries: u64,
    pub auto_refresh_interval_seconds: u64,
    pub internal_api_key: Option<String>,
}

impl AppConfig {
    pub fn from_env() -> Self {
        Self {
            app_name: env_or("APP_NAME", "Society Dashboard API"),
            environment: env_or("ENVIRONMENT", "development"),
            api_prefix: normalize_prefix(&env_or("API_PREFIX", "/v1")),
            host: env_or("HOST", "0.0.0.0"),
            port: env_parse_or("PORT", 8000),
            cors_origins: parse_csv(&env_or("CORS_ORIGINS", "http://localhost:3000")),
            rate_limit_enabled: env_parse_bool_or("RATE_LIMIT_ENABLED", true),
            rate_limit_per_second: env_parse_or("RATE_LIMIT_PER_SECOND", 10),
            rate_limit_burst_size: env_parse_or("RATE_LIMIT_BURST_SIZE", 100),
            request_timeout_seconds: env_parse_or("REQUEST_TIMEOUT_SECONDS", 30),
            google_sheets_api_key: env_opt("GOOGLE_SHEETS_API_KEY"),
            spreadsheet_id: env_opt("SPREADSHEET_ID"),
            sheets_api_base_url: env_or("SHEETS_API_BASE_URL", "https://sheets.googleapis.com"),
            owners_range: env_or("OWNERS_RANGE", "Owners!A:Z"),
            receipts_range: env_or("RECEIPTS_RANGE", "Receipts!A:Z"),
            receipts_date_order: SlashDateOrder::from_env(env_opt("RECEIPTS_DATE_ORDER")),
            sheets_fetch_timeout_seconds: env_parse_or("SHEETS_FETCH_TIMEOUT_SECONDS", 15),
            sheets_fetch_max_attempts: env_parse_or("SHEETS_FETCH_MAX_ATTEMPTS", 3),
            sheets_retry_backoff_ms: env_parse_or("SHEETS_RETRY_BACKOFF_MS", 500),
            snapshot_cache_ttl_seconds: env_parse_or("SNAPSHOT_CACHE_TTL_SECONDS", 300),
            matrix_cache_max_entries: env_parse_or("MATRIX_CACHE_MAX_ENTRIES", 256),
            auto_refresh_interval_seconds: env_parse_or("AUTO_REFRESH_INTERVAL_SECONDS", 0),
            internal_api_key: env_opt("INTERNAL_API_KEY"),
        }
    }

    pub fn is_production(&self) -> bool {
        self.environment.trim().eq_ignore_ascii_case("production")
    }

    pub fn sheets_configured(&self) -> bool {
        self.spreadsheet_id.is_some()
    }

    pub fn auto_refresh_enabled(&self) -> bool {
        self.auto_refresh_interval_seconds > 0
    }
}

fn env_opt(key: &str) -> Option<String> {
    env::var(key)
        .ok()
        .map(|value| value.trim().to_string())
        .filter(|value| !value.is_empty())
}

fn env_or(key: &str, default: &str) -> String {
    env_opt(key).unwrap_or_else(|| default.to_string())
}

fn env_parse_or<T>(key: &str, default: T) -> T
where
    T: std::str::FromStr + Copy,
{
    env_opt(key)
        .and_then(|raw| raw.parse::<T>().ok())
        .unwrap_or(default)
}

fn env_parse_bool_or(key: &str, default: bool) -> bool {
    match env_opt(key).as_deref().map(str::to_ascii_lowercase) {
        Some(value) if value == "1" || value == "true" || value == "yes" || value == "on" => true,
        Some(value) if value == "0" || value == "false" || value == "no" || value == "off" => false,
        Some(_) => default,
        None => default,
    }
}

fn parse_csv(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(str::trim)
        .filter(|value| !value.is_empty())
        .map(ToOwned::to_owned)
        .collect()
}

fn normalize_prefix(raw: &str) -> String {
    let mut prefix = raw.trim().to_string();
    if prefix.is_empty() {
        return "/v1".to_string();
    }
    if !prefix.starts_with('/') {
        prefix.insert(0, '/');
    }
    while prefix.ends_with('/') && prefix.len() > 1 {
        prefix.pop();
    }
    prefix
}

#[cfg(test)]
mod tests {
    use super::{normalize_prefix, parse_csv};

    #[test]
    fn normalizes_prefix() {
        assert_eq!(normalize_prefix("v1"), "/v1");
        assert_eq!(normalize_prefix("/v1/"), "/v1");
        assert_eq!(normalize_prefix(""), "/v1");
    }

    #[test]
    fn parses_csv_lists() {
        assert_eq!(
            parse_csv(" http://a.test , ,http://b.test"),
            vec!["http://a.test", "http://b.test"]
        );
        assert!(parse_csv("").is_empty());
    }
}
