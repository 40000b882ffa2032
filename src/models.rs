use std::collections::BTreeMap;

use serde::Serialize;

use crate::services::integrity::IntegrityReport;

/// One membership row from the owner roster.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Owner {
    pub id: String,
    pub block_number: String,
    pub flat_number: String,
    pub member_name: String,
    pub is_owner: bool,
    pub phone_primary: Option<String>,
    pub phone_secondary: Option<String>,
    pub two_wheeler_count: String,
    pub four_wheeler_count: String,
    pub sticker_nos: String,
}

/// One payment event from the receipts sheet.
///
/// `payment_date` drives fiscal-year bucketing; `receipt_date` is only the
/// issuance date and is never used for aggregation. `payment_amount` is in
/// whole rupees and is `None` when the sheet value is unreadable or fractional.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct Receipt {
    pub id: String,
    pub receipt_no: String,
    pub receipt_date: String,
    pub block_number: String,
    pub flat_number: String,
    pub name: String,
    pub payment_amount: Option<i64>,
    pub payment_date: Option<String>,
    pub remarks: String,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(untagged)]
pub enum CellValue {
    Amount(i64),
    Text(String),
}

impl CellValue {
    pub fn as_amount(&self) -> Option<i64> {
        match self {
            Self::Amount(amount) => Some(*amount),
            Self::Text(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            Self::Amount(_) => None,
            Self::Text(text) => Some(text),
        }
    }
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CellMetadata {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub payment_date: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub receipt_number: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub receipt_count: Option<usize>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sticker_count: Option<usize>,
}

/// A single (block, flat) intersection of a grid.
///
/// `value` is `None` exactly when nothing contributed to the pair.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct MatrixCell {
    pub block_number: String,
    pub flat_number: String,
    pub value: Option<CellValue>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metadata: Option<CellMetadata>,
}

impl MatrixCell {
    pub fn empty(block_number: &str, flat_number: &str) -> Self {
        Self {
            block_number: block_number.to_string(),
            flat_number: flat_number.to_string(),
            value: None,
            metadata: None,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct PaymentMatrixData {
    pub blocks: Vec<String>,
    pub flats: Vec<String>,
    /// Row per block, column per flat.
    pub cells: Vec<Vec<MatrixCell>>,
    pub available_years: Vec<i32>,
    pub selected_year: i32,
    pub total_by_block: BTreeMap<String, i64>,
    pub total_by_flat: BTreeMap<String, i64>,
    pub grand_total: i64,
    pub unmatched_keys: Vec<String>,
    pub warnings: Vec<String>,
    pub integrity: IntegrityReport,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct StickerMatrixData {
    pub blocks: Vec<String>,
    pub flats: Vec<String>,
    pub cells: Vec<Vec<MatrixCell>>,
    pub unassigned_flats: Vec<String>,
    pub multiple_stickers: Vec<String>,
    pub single_count: usize,
    pub total_stickers: usize,
    pub warnings: Vec<String>,
}

/// Trimmed (block, flat) pair. Builders group on this, never on the label,
/// since identifiers such as `A-1` may themselves contain `-`.
pub type FlatId = (String, String);

pub fn flat_id(block_number: &str, flat_number: &str) -> FlatId {
    (
        block_number.trim().to_string(),
        flat_number.trim().to_string(),
    )
}

/// Display label `"{block}-{flat}"` on trimmed ids.
pub fn flat_key(block_number: &str, flat_number: &str) -> String {
    format!("{}-{}", block_number.trim(), flat_number.trim())
}
