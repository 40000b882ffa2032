use axum::{
    extract::{Query, State},
    Json,
};
use serde_json::{json, Value};

use crate::{
    error::AppResult,
    models::{Owner, Receipt},
    schemas::{clamp_limit_in_range, OwnersQuery, ReceiptsQuery},
    services::{
        dates::{fiscal_year_for_raw, SlashDateOrder},
        payment_matrix::parse_fiscal_year,
        sticker_matrix::split_sticker_codes,
    },
    state::AppState,
};

const MAX_RECORD_LIMIT: i64 = 5000;

pub fn router() -> axum::Router<AppState> {
    axum::Router::new()
        .route("/owners", axum::routing::get(list_owners))
        .route("/receipts", axum::routing::get(list_receipts))
}

async fn list_owners(
    State(state): State<AppState>,
    Query(query): Query<OwnersQuery>,
) -> AppResult<Json<Value>> {
    let snapshot = state.snapshot().await?;
    let needle = search_needle(query.q.as_deref());
    let block = non_empty_opt(query.block.as_deref());
    let flat = non_empty_opt(query.flat.as_deref());

    let matching = snapshot
        .owners
        .iter()
        .filter(|owner| same_id(&owner.block_number, block.as_deref()))
        .filter(|owner| same_id(&owner.flat_number, flat.as_deref()))
        .filter(|owner| {
            needle
                .as_deref()
                .map_or(true, |needle| owner_matches(owner, needle))
        })
        .collect::<Vec<_>>();
    let total = matching.len();
    let data = matching
        .into_iter()
        .take(clamp_limit_in_range(query.limit, 1, MAX_RECORD_LIMIT))
        .collect::<Vec<_>>();

    Ok(Json(json!({
        "data": data,
        "count": data.len(),
        "total": total,
        "warnings": snapshot.warnings,
        "fetchedAt": snapshot.fetched_at.to_rfc3339(),
        "snapshotVersion": snapshot.version,
    })))
}

async fn list_receipts(
    State(state): State<AppState>,
    Query(query): Query<ReceiptsQuery>,
) -> AppResult<Json<Value>> {
    let snapshot = state.snapshot().await?;
    let needle = search_needle(query.q.as_deref());
    let block = non_empty_opt(query.block.as_deref());
    let flat = non_empty_opt(query.flat.as_deref());
    let fiscal_year = match non_empty_opt(query.year.as_deref()) {
        Some(raw) => Some(parse_fiscal_year(&raw)?),
        None => None,
    };
    let order = state.config.receipts_date_order;

    let matching = snapshot
        .receipts
        .iter()
        .filter(|receipt| same_id(&receipt.block_number, block.as_deref()))
        .filter(|receipt| same_id(&receipt.flat_number, flat.as_deref()))
        .filter(|receipt| {
            fiscal_year.map_or(true, |year| receipt_in_fiscal_year(receipt, year, order))
        })
        .filter(|receipt| {
            needle
                .as_deref()
                .map_or(true, |needle| receipt_matches(receipt, needle))
        })
        .collect::<Vec<_>>();
    let total = matching.len();
    let data = matching
        .into_iter()
        .take(clamp_limit_in_range(query.limit, 1, MAX_RECORD_LIMIT))
        .collect::<Vec<_>>();

    Ok(Json(json!({
        "data": data,
        "count": data.len(),
        "total": total,
        "warnings": snapshot.warnings,
        "fetchedAt": snapshot.fetched_at.to_rfc3339(),
        "snapshotVersion": snapshot.version,
    })))
}

fn search_needle(raw: Option<&str>) -> Option<String> {
    non_empty_opt(raw).map(|value| value.to_lowercase())
}

fn contains_needle(haystack: &str, needle: &str) -> bool {
    haystack.to_lowercase().contains(needle)
}

fn owner_matches(owner: &Owner, needle: &str) -> bool {
    [
        owner.member_name.as_str(),
        owner.block_number.as_str(),
        owner.flat_number.as_str(),
        owner.phone_primary.as_deref().unwrap_or_default(),
        owner.phone_secondary.as_deref().unwrap_or_default(),
    ]
    .iter()
    .any(|field| contains_needle(field, needle))
        || split_sticker_codes(&owner.sticker_nos)
            .iter()
            .any(|code| contains_needle(code, needle))
}

fn receipt_matches(receipt: &Receipt, needle: &str) -> bool {
    [
        receipt.receipt_no.as_str(),
        receipt.name.as_str(),
        receipt.block_number.as_str(),
        receipt.flat_number.as_str(),
        receipt.remarks.as_str(),
    ]
    .iter()
    .any(|field| contains_needle(field, needle))
}

fn receipt_in_fiscal_year(receipt: &Receipt, fiscal_year: i32, order: SlashDateOrder) -> bool {
    receipt
        .payment_date
        .as_deref()
        .and_then(|raw| fiscal_year_for_raw(raw, order))
        == Some(fiscal_year)
}

fn same_id(value: &str, filter: Option<&str>) -> bool {
    filter.map_or(true, |wanted| value.trim().eq_ignore_ascii_case(wanted))
}

fn non_empty_opt(value: Option<&str>) -> Option<String> {
    value
        .map(str::trim)
        .filter(|item| !item.is_empty())
        .map(ToOwned::to_owned)
}

#[cfg(test)]
mod tests {
    use super::{owner_matches, receipt_in_fiscal_year, receipt_matches, same_id};
    use crate::models::{Owner, Receipt};
    use crate::services::dates::SlashDateOrder;

    #[test]
    fn owner_search_covers_names_phones_and_stickers() {
        let owner = Owner {
            member_name: "Asha Rao".to_string(),
            block_number: "A".to_string(),
            flat_number: "101".to_string(),
            phone_primary: Some("98450 11111".to_string()),
            sticker_nos: "KA-01|KA-77".to_string(),
            ..Owner::default()
        };
        assert!(owner_matches(&owner, "asha"));
        assert!(owner_matches(&owner, "11111"));
        assert!(owner_matches(&owner, "ka-77"));
        assert!(!owner_matches(&owner, "ravi"));
    }

    #[test]
    fn receipt_search_covers_numbers_and_remarks() {
        let receipt = Receipt {
            receipt_no: "R-2024-17".to_string(),
            remarks: "AMC first half".to_string(),
            ..Receipt::default()
        };
        assert!(receipt_matches(&receipt, "2024-17"));
        assert!(receipt_matches(&receipt, "amc"));
        assert!(!receipt_matches(&receipt, "penalty"));
    }

    #[test]
    fn filters_receipts_by_payment_fiscal_year() {
        let receipt = Receipt {
            payment_date: Some("15/02/2025".to_string()),
            ..Receipt::default()
        };
        assert!(receipt_in_fiscal_year(&receipt, 2024, SlashDateOrder::Auto));
        assert!(!receipt_in_fiscal_year(&receipt, 2025, SlashDateOrder::Auto));
        assert!(!receipt_in_fiscal_year(
            &Receipt::default(),
            2024,
            SlashDateOrder::Auto
        ));
    }

    #[test]
    fn identifier_filters_ignore_case_and_padding() {
        assert!(same_id(" b ", Some("B")));
        assert!(same_id("B", None));
        assert!(!same_id("A", Some("B")));
    }
}
