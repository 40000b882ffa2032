use std::cmp::Ordering;
use std::collections::BTreeSet;

use serde::Serialize;

use crate::models::{Owner, Receipt};
use crate::services::dates::{current_calendar_year, fiscal_year_for_raw, SlashDateOrder};

pub const MIN_FISCAL_YEAR: i32 = 1900;
const FUTURE_FISCAL_YEAR_ALLOWANCE: i32 = 10;

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct BlocksAndFlats {
    pub blocks: Vec<String>,
    pub flats: Vec<String>,
    pub warnings: Vec<String>,
}

#[derive(Debug, Clone, Default, PartialEq, Serialize)]
pub struct AvailableYears {
    /// Newest first.
    pub years: Vec<i32>,
    pub warnings: Vec<String>,
}

/// Grid axes from the owner roster. Owners without a block or flat are left
/// out and reported; they never abort extraction.
pub fn extract_blocks_and_flats(owners: &[Owner]) -> BlocksAndFlats {
    let mut blocks = BTreeSet::new();
    let mut flats = BTreeSet::new();
    let mut warnings = Vec::new();

    for (index, owner) in owners.iter().enumerate() {
        let block = owner.block_number.trim();
        let flat = owner.flat_number.trim();
        let missing = match (block.is_empty(), flat.is_empty()) {
            (true, true) => Some("missing blockNumber and flatNumber"),
            (true, false) => Some("missing blockNumber"),
            (false, true) => Some("missing flatNumber"),
            (false, false) => None,
        };
        if let Some(reason) = missing {
            warnings.push(format!("Owner at index {index} skipped: {reason}"));
            continue;
        }
        blocks.insert(block.to_string());
        flats.insert(flat.to_string());
    }

    BlocksAndFlats {
        blocks: sort_identifiers(blocks),
        flats: sort_identifiers(flats),
        warnings,
    }
}

pub fn extract_available_fiscal_years(receipts: &[Receipt]) -> AvailableYears {
    extract_available_fiscal_years_with(receipts, SlashDateOrder::Auto, current_calendar_year())
}

/// Distinct fiscal years across receipts, bounded to
/// `[1900, current_year + 10]`.
pub fn extract_available_fiscal_years_with(
    receipts: &[Receipt],
    order: SlashDateOrder,
    current_year: i32,
) -> AvailableYears {
    let max_year = current_year.saturating_add(FUTURE_FISCAL_YEAR_ALLOWANCE);
    let mut years = BTreeSet::new();
    let mut warnings = Vec::new();

    for (index, receipt) in receipts.iter().enumerate() {
        let label = receipt_label(index, receipt);
        let Some(raw) = receipt
            .payment_date
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
        else {
            warnings.push(format!("{label} skipped: missing paymentDate"));
            continue;
        };
        let Some(fiscal_year) = fiscal_year_for_raw(raw, order) else {
            warnings.push(format!("{label} skipped: unparseable paymentDate '{raw}'"));
            continue;
        };
        if !(MIN_FISCAL_YEAR..=max_year).contains(&fiscal_year) {
            warnings.push(format!(
                "{label} skipped: fiscal year {fiscal_year} outside {MIN_FISCAL_YEAR}..={max_year}"
            ));
            continue;
        }
        years.insert(fiscal_year);
    }

    AvailableYears {
        years: years.into_iter().rev().collect(),
        warnings,
    }
}

/// Numeric order where the identifier starts with an integer (non-numeric ids
/// count as 0), lexical order to break ties.
pub fn compare_identifiers(left: &str, right: &str) -> Ordering {
    leading_integer(left)
        .cmp(&leading_integer(right))
        .then_with(|| left.cmp(right))
}

fn sort_identifiers(values: BTreeSet<String>) -> Vec<String> {
    let mut sorted = values.into_iter().collect::<Vec<_>>();
    sorted.sort_by(|left, right| compare_identifiers(left, right));
    sorted
}

fn leading_integer(value: &str) -> i64 {
    let trimmed = value.trim();
    let (sign, digits) = match trimmed.strip_prefix('-') {
        Some(rest) => (-1, rest),
        None => (1, trimmed.strip_prefix('+').unwrap_or(trimmed)),
    };
    let end = digits
        .find(|c: char| !c.is_ascii_digit())
        .unwrap_or(digits.len());
    digits[..end]
        .parse::<i64>()
        .map(|number| sign * number)
        .unwrap_or(0)
}

pub(crate) fn receipt_label(index: usize, receipt: &Receipt) -> String {
    let receipt_no = receipt.receipt_no.trim();
    if receipt_no.is_empty() {
        format!("Receipt at index {index}")
    } else {
        format!("Receipt {receipt_no} (index {index})")
    }
}
