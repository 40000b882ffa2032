use axum::{routing::get, Router};

use crate::error::AppError;
use crate::state::AppState;

pub mod cache;
pub mod health;
pub mod matrix;
pub mod records;

pub fn v1_router() -> Router<AppState> {
    Router::new()
        .route("/health", get(health::health))
        .merge(records::router())
        .merge(matrix::router())
        .merge(cache::router())
        .fallback(route_not_found)
}

async fn route_not_found() -> AppError {
    AppError::NotFound("Route not found.".to_string())
}

#[cfg(test)]
mod tests {
    use super::v1_router;
    use crate::config::AppConfig;
    use crate::models::{Owner, Receipt};
    use crate::state::AppState;
    use axum::body::{to_bytes, Body};
    use axum::http::{Request, StatusCode};
    use serde_json::Value;
    use tower::ServiceExt;

    fn owner(block: &str, flat: &str, name: &str, stickers: &str) -> Owner {
        Owner {
            block_number: block.to_string(),
            flat_number: flat.to_string(),
            member_name: name.to_string(),
            sticker_nos: stickers.to_string(),
            is_owner: true,
            ..Owner::default()
        }
    }

    fn receipt(no: &str, block: &str, flat: &str, amount: i64, date: &str) -> Receipt {
        Receipt {
            receipt_no: no.to_string(),
            block_number: block.to_string(),
            flat_number: flat.to_string(),
            payment_amount: Some(amount),
            payment_date: Some(date.to_string()),
            ..Receipt::default()
        }
    }

    async fn seeded_state() -> AppState {
        let mut config = AppConfig::from_env();
        config.snapshot_cache_ttl_seconds = 300;
        let state = AppState::build(config).expect("state");
        state
            .snapshots
            .install(
                vec![
                    owner("A", "101", "Asha Rao", "S1"),
                    owner("A", "102", "Ravi Kumar", ""),
                    owner("B", "101", "Meera Iyer", "S2, S3"),
                ],
                vec![
                    receipt("R1", "A", "101", 1000, "2024-05-10"),
                    receipt("R2", "A", "101", 500, "2025-02-01"),
                    receipt("R3", "B", "101", 700, "2025-04-01"),
                ],
                Vec::new(),
            )
            .await;
        state
    }

    async fn get_json(state: &AppState, uri: &str) -> (StatusCode, Value) {
        let response = v1_router()
            .with_state(state.clone())
            .oneshot(Request::builder().uri(uri).body(Body::empty()).unwrap())
            .await
            .unwrap();
        let status = response.status();
        let bytes = to_bytes(response.into_body(), usize::MAX).await.unwrap();
        (status, serde_json::from_slice(&bytes).unwrap())
    }

    #[tokio::test]
    async fn payment_matrix_sums_the_requested_fiscal_year() {
        let state = seeded_state().await;
        let (status, body) = get_json(&state, "/matrix/payments?year=2024").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["blocks"], serde_json::json!(["A", "B"]));
        assert_eq!(body["flats"], serde_json::json!(["101", "102"]));
        assert_eq!(body["cells"][0][0]["value"], 1500);
        assert_eq!(body["cells"][0][0]["metadata"]["receiptNumber"], "R2");
        assert!(body["cells"][1][0]["value"].is_null());
        assert_eq!(body["grandTotal"], 1500);
        assert_eq!(body["yearLabel"], "2024-25");
        assert_eq!(body["availableYears"][0], 2025);
    }

    #[tokio::test]
    async fn payment_matrix_rejects_malformed_years() {
        let state = seeded_state().await;
        let (status, body) = get_json(&state, "/matrix/payments?year=twenty").await;
        assert_eq!(status, StatusCode::BAD_REQUEST);
        assert!(body["detail"].as_str().unwrap().contains("twenty"));
    }

    #[tokio::test]
    async fn sticker_matrix_reports_assignment_groups() {
        let state = seeded_state().await;
        let (status, body) = get_json(&state, "/matrix/stickers").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["totalStickers"], 3);
        assert_eq!(body["singleCount"], 1);
        assert_eq!(body["unassignedFlats"], serde_json::json!(["A-102", "B-102"]));
        assert_eq!(body["multipleStickers"], serde_json::json!(["B-101"]));
    }

    #[tokio::test]
    async fn owners_search_filters_by_text() {
        let state = seeded_state().await;
        let (status, body) = get_json(&state, "/owners?q=meera").await;

        assert_eq!(status, StatusCode::OK);
        assert_eq!(body["total"], 1);
        assert_eq!(body["data"][0]["blockNumber"], "B");
    }

    #[tokio::test]
    async fn unknown_routes_return_not_found() {
        let state = seeded_state().await;
        let (status, _) = get_json(&state, "/nope").await;
        assert_eq!(status, StatusCode::NOT_FOUND);
    }
}
