use std::sync::Arc;

use axum::{
    extract::{Query, State},
    Json,
};
use serde::Serialize;
use serde_json::{json, Value};

use crate::{
    error::{AppError, AppResult},
    schemas::PaymentMatrixQuery,
    services::{
        dates::{current_calendar_year, fiscal_year_label},
        dimensions::extract_available_fiscal_years_with,
        payment_matrix::{
            build_payment_matrix_with, default_fiscal_year, parse_fiscal_year, MatrixOptions,
        },
        sticker_matrix::build_sticker_matrix,
    },
    state::AppState,
};

pub fn router() -> axum::Router<AppState> {
    axum::Router::new()
        .route("/matrix/years", axum::routing::get(available_years))
        .route("/matrix/payments", axum::routing::get(payment_matrix))
        .route("/matrix/stickers", axum::routing::get(sticker_matrix))
}

fn matrix_options(state: &AppState) -> MatrixOptions {
    MatrixOptions {
        date_order: state.config.receipts_date_order,
        current_year: current_calendar_year(),
    }
}

async fn available_years(State(state): State<AppState>) -> AppResult<Json<Value>> {
    let snapshot = state.snapshot().await?;
    let options = matrix_options(&state);
    let key = format!("years:{}", snapshot.version);

    cached_payload(&state, key, || {
        let years = extract_available_fiscal_years_with(
            &snapshot.receipts,
            options.date_order,
            options.current_year,
        );
        let labels = years
            .years
            .iter()
            .map(|year| fiscal_year_label(*year))
            .collect::<Vec<_>>();
        let mut payload = to_json(&years)?;
        payload["labels"] = json!(labels);
        Ok(payload)
    })
    .await
}

async fn payment_matrix(
    State(state): State<AppState>,
    Query(query): Query<PaymentMatrixQuery>,
) -> AppResult<Json<Value>> {
    let snapshot = state.snapshot().await?;
    let options = matrix_options(&state);

    let fiscal_year = match non_empty_opt(query.year.as_deref()) {
        Some(raw) => parse_fiscal_year(&raw)?,
        None => default_fiscal_year(
            &extract_available_fiscal_years_with(
                &snapshot.receipts,
                options.date_order,
                options.current_year,
            )
            .years,
        ),
    };
    let key = format!("payments:{}:{fiscal_year}", snapshot.version);

    cached_payload(&state, key, || {
        let data =
            build_payment_matrix_with(&snapshot.owners, &snapshot.receipts, fiscal_year, options)?;
        if !data.warnings.is_empty() {
            tracing::warn!(
                fiscal_year,
                warnings = data.warnings.len(),
                "Payment matrix built with data-quality warnings"
            );
        }
        let mut payload = to_json(&data)?;
        payload["yearLabel"] = json!(fiscal_year_label(fiscal_year));
        payload["snapshotVersion"] = json!(snapshot.version);
        Ok(payload)
    })
    .await
}

async fn sticker_matrix(State(state): State<AppState>) -> AppResult<Json<Value>> {
    let snapshot = state.snapshot().await?;
    let key = format!("stickers:{}", snapshot.version);

    cached_payload(&state, key, || {
        let data = build_sticker_matrix(&snapshot.owners);
        if !data.warnings.is_empty() {
            tracing::warn!(
                warnings = data.warnings.len(),
                "Sticker matrix built with data-quality warnings"
            );
        }
        let mut payload = to_json(&data)?;
        payload["snapshotVersion"] = json!(snapshot.version);
        Ok(payload)
    })
    .await
}

async fn cached_payload<F>(state: &AppState, key: String, build: F) -> AppResult<Json<Value>>
where
    F: FnOnce() -> AppResult<Value>,
{
    if let Some(cached) = state.matrix_cache.get(&key).await {
        return Ok(Json(cached.as_ref().clone()));
    }
    let payload = Arc::new(build()?);
    state.matrix_cache.insert(key, payload.clone()).await;
    Ok(Json(payload.as_ref().clone()))
}

fn to_json<T: Serialize>(value: &T) -> AppResult<Value> {
    serde_json::to_value(value)
        .map_err(|error| AppError::Internal(format!("Could not serialize matrix: {error}")))
}

fn non_empty_opt(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(ToOwned::to_owned)
}
