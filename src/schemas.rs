use serde::Deserialize;
use validator::Validate;

use crate::models::{Owner, Receipt};

pub const DEFAULT_RECORD_LIMIT: i64 = 1000;

pub fn clamp_limit_in_range(limit: Option<i64>, min: i64, max: i64) -> usize {
    limit.unwrap_or(DEFAULT_RECORD_LIMIT).clamp(min, max) as usize
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct OwnersQuery {
    pub q: Option<String>,
    pub block: Option<String>,
    pub flat: Option<String>,
    pub limit: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ReceiptsQuery {
    pub q: Option<String>,
    pub block: Option<String>,
    pub flat: Option<String>,
    /// Fiscal year of `paymentDate`, e.g. `2024` or `2024-25`.
    pub year: Option<String>,
    pub limit: Option<i64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct PaymentMatrixQuery {
    pub year: Option<String>,
}

/// An owner-sheet row after header mapping and scalar coercion.
#[derive(Debug, Clone, Default, Validate)]
pub struct OwnerRow {
    #[validate(length(max = 32, message = "blockNumber is longer than 32 characters"))]
    pub block_number: String,
    #[validate(length(max = 32, message = "flatNumber is longer than 32 characters"))]
    pub flat_number: String,
    #[validate(length(max = 200, message = "memberName is longer than 200 characters"))]
    pub member_name: String,
    pub role: String,
    #[validate(length(max = 32))]
    pub phone_primary: String,
    #[validate(length(max = 32))]
    pub phone_secondary: String,
    #[validate(length(max = 8))]
    pub two_wheeler_count: String,
    #[validate(length(max = 8))]
    pub four_wheeler_count: String,
    #[validate(length(max = 1000, message = "stickerNos is longer than 1000 characters"))]
    pub sticker_nos: String,
}

impl OwnerRow {
    pub fn into_owner(self, id: String) -> Owner {
        Owner {
            id,
            is_owner: is_owner_role(&self.role),
            block_number: self.block_number,
            flat_number: self.flat_number,
            member_name: self.member_name,
            phone_primary: non_empty(self.phone_primary),
            phone_secondary: non_empty(self.phone_secondary),
            two_wheeler_count: self.two_wheeler_count,
            four_wheeler_count: self.four_wheeler_count,
            sticker_nos: self.sticker_nos,
        }
    }
}

/// A receipts-sheet row after header mapping and scalar coercion.
#[derive(Debug, Clone, Default, Validate)]
pub struct ReceiptRow {
    #[validate(length(max = 64, message = "receiptNo is longer than 64 characters"))]
    pub receipt_no: String,
    #[validate(length(max = 64))]
    pub receipt_date: String,
    #[validate(length(max = 32, message = "blockNumber is longer than 32 characters"))]
    pub block_number: String,
    #[validate(length(max = 32, message = "flatNumber is longer than 32 characters"))]
    pub flat_number: String,
    #[validate(length(max = 200))]
    pub name: String,
    pub payment_amount: String,
    #[validate(length(max = 64))]
    pub payment_date: String,
    #[validate(length(max = 2000))]
    pub remarks: String,
}

impl ReceiptRow {
    pub fn into_receipt(self, id: String) -> Receipt {
        Receipt {
            id,
            payment_amount: parse_amount(&self.payment_amount),
            payment_date: non_empty(self.payment_date),
            receipt_no: self.receipt_no,
            receipt_date: self.receipt_date,
            block_number: self.block_number,
            flat_number: self.flat_number,
            name: self.name,
            remarks: self.remarks,
        }
    }
}

/// Whole-rupee amounts as typed into the sheet (`₹ 1,500`, `Rs. 2000/-`,
/// `1500.00`). Unreadable or fractional values give `None`, which the matrix
/// builder reports and drops.
pub fn parse_amount(raw: &str) -> Option<i64> {
    let mut cleaned = raw.trim().to_string();
    for token in ["₹", "INR", "Rs.", "Rs", "/-"] {
        cleaned = cleaned.replace(token, "");
    }
    cleaned.retain(|c| c != ',' && !c.is_whitespace());

    let whole = match cleaned.split_once('.') {
        Some((whole, paise)) if paise.chars().all(|c| c == '0') => whole,
        Some(_) => return None,
        None => cleaned.as_str(),
    };
    whole.parse::<i64>().ok()
}

/// Missing role columns count as owners; only explicit tenant markers do not.
fn is_owner_role(raw: &str) -> bool {
    !matches!(
        raw.trim().to_ascii_lowercase().as_str(),
        "tenant" | "no" | "n" | "false" | "0" | "renter"
    )
}

fn non_empty(value: String) -> Option<String> {
    let trimmed = value.trim();
    if trimmed.is_empty() {
        None
    } else {
        Some(trimmed.to_string())
    }
}
