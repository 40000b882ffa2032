use std::collections::{BTreeMap, HashSet};

use chrono::{DateTime, Utc};

use crate::error::MatrixError;
use crate::models::{
    flat_id, flat_key, CellMetadata, CellValue, FlatId, MatrixCell, Owner, PaymentMatrixData,
    Receipt,
};
use crate::services::dates::{
    current_calendar_year, current_fiscal_year, fiscal_year_of, fiscal_year_start,
    normalize_date_with, SlashDateOrder,
};
use crate::services::dimensions::{
    extract_available_fiscal_years_with, extract_blocks_and_flats, receipt_label,
};
use crate::services::integrity::{audit_payment_cells, log_integrity_findings};

/// Inputs that are not part of the data itself.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct MatrixOptions {
    pub date_order: SlashDateOrder,
    pub current_year: i32,
}

impl Default for MatrixOptions {
    fn default() -> Self {
        Self {
            date_order: SlashDateOrder::Auto,
            current_year: current_calendar_year(),
        }
    }
}

/// In-year receipts sharing one (block, flat) pair.
#[derive(Debug, Default)]
struct FlatGroup<'a> {
    total: i64,
    contributing: usize,
    latest: Option<(&'a Receipt, DateTime<Utc>)>,
}

impl<'a> FlatGroup<'a> {
    fn observe(&mut self, receipt: &'a Receipt, paid_at: DateTime<Utc>) {
        // Strictly later only, so the first-seen receipt wins ties.
        let is_later = match self.latest {
            Some((_, current)) => paid_at > current,
            None => true,
        };
        if is_later {
            self.latest = Some((receipt, paid_at));
        }
    }
}

pub fn build_payment_matrix(
    owners: &[Owner],
    receipts: &[Receipt],
    fiscal_year: i32,
) -> Result<PaymentMatrixData, MatrixError> {
    build_payment_matrix_with(owners, receipts, fiscal_year, MatrixOptions::default())
}

/// Dense block x flat grid of payments received in `fiscal_year`.
///
/// Only a year that cannot name a calendar date is rejected; every data
/// problem is reported in `warnings` and the grid is still produced.
pub fn build_payment_matrix_with(
    owners: &[Owner],
    receipts: &[Receipt],
    fiscal_year: i32,
    options: MatrixOptions,
) -> Result<PaymentMatrixData, MatrixError> {
    if fiscal_year_start(fiscal_year).is_none() {
        return Err(MatrixError::InvalidFiscalYear(fiscal_year));
    }

    let axes = extract_blocks_and_flats(owners);
    let mut warnings = axes.warnings;
    let available =
        extract_available_fiscal_years_with(receipts, options.date_order, options.current_year);

    let mut groups: BTreeMap<FlatId, FlatGroup<'_>> = BTreeMap::new();
    for (index, receipt) in receipts.iter().enumerate() {
        let label = receipt_label(index, receipt);
        let Some(raw) = receipt
            .payment_date
            .as_deref()
            .map(str::trim)
            .filter(|value| !value.is_empty())
        else {
            warnings.push(format!("{label} excluded: missing paymentDate"));
            continue;
        };
        let Some(paid_at) = normalize_date_with(raw, options.date_order) else {
            warnings.push(format!("{label} excluded: unparseable paymentDate '{raw}'"));
            continue;
        };
        if fiscal_year_of(&paid_at) != fiscal_year {
            continue;
        }

        let group = groups
            .entry(flat_id(&receipt.block_number, &receipt.flat_number))
            .or_default();
        group.observe(receipt, paid_at);

        match receipt.payment_amount {
            Some(amount) if amount >= 0 => {
                group.total = group.total.saturating_add(amount);
                group.contributing += 1;
            }
            Some(amount) => {
                warnings.push(format!(
                    "{label} excluded from totals: negative paymentAmount {amount}"
                ));
            }
            None => {
                warnings.push(format!(
                    "{label} excluded from totals: paymentAmount is not a whole rupee amount"
                ));
            }
        }
    }

    let mut total_by_block = axes
        .blocks
        .iter()
        .map(|block| (block.clone(), 0_i64))
        .collect::<BTreeMap<_, _>>();
    let mut total_by_flat = axes
        .flats
        .iter()
        .map(|flat| (flat.clone(), 0_i64))
        .collect::<BTreeMap<_, _>>();

    let mut cells = Vec::with_capacity(axes.blocks.len());
    for block in &axes.blocks {
        let mut row = Vec::with_capacity(axes.flats.len());
        for flat in &axes.flats {
            let cell = groups
                .get(&flat_id(block, flat))
                .and_then(|group| payment_cell(block, flat, group))
                .unwrap_or_else(|| MatrixCell::empty(block, flat));

            if let Some(amount) = cell.value.as_ref().and_then(CellValue::as_amount) {
                if amount > 0 {
                    let by_block = total_by_block.entry(block.clone()).or_insert(0);
                    *by_block = by_block.saturating_add(amount);
                    let by_flat = total_by_flat.entry(flat.clone()).or_insert(0);
                    *by_flat = by_flat.saturating_add(amount);
                }
            }
            row.push(cell);
        }
        cells.push(row);
    }

    let known_blocks = axes.blocks.iter().map(String::as_str).collect::<HashSet<_>>();
    let known_flats = axes.flats.iter().map(String::as_str).collect::<HashSet<_>>();
    let unmatched_keys = groups
        .keys()
        .filter(|(block, flat)| {
            !known_blocks.contains(block.as_str()) || !known_flats.contains(flat.as_str())
        })
        .map(|(block, flat)| flat_key(block, flat))
        .collect::<Vec<_>>();
    if !unmatched_keys.is_empty() {
        tracing::warn!(
            fiscal_year,
            unmatched = unmatched_keys.len(),
            keys = %unmatched_keys.join(", "),
            "Receipts reference flats that are not in the owner roster"
        );
    }

    let integrity = audit_payment_cells(&cells, fiscal_year, options.date_order);
    log_integrity_findings(&integrity);

    let grand_total = total_by_block
        .values()
        .fold(0_i64, |sum, amount| sum.saturating_add(*amount));
    Ok(PaymentMatrixData {
        blocks: axes.blocks,
        flats: axes.flats,
        cells,
        available_years: available.years,
        selected_year: fiscal_year,
        total_by_block,
        total_by_flat,
        grand_total,
        unmatched_keys,
        warnings,
        integrity,
    })
}

fn payment_cell(block: &str, flat: &str, group: &FlatGroup<'_>) -> Option<MatrixCell> {
    if group.total <= 0 {
        return None;
    }
    let (latest, _) = group.latest?;
    Some(MatrixCell {
        block_number: block.to_string(),
        flat_number: flat.to_string(),
        value: Some(CellValue::Amount(group.total)),
        metadata: Some(CellMetadata {
            payment_date: latest.payment_date.as_deref().map(|date| date.trim().to_string()),
            receipt_number: Some(latest.receipt_no.trim().to_string()),
            receipt_count: Some(group.contributing),
            sticker_count: None,
        }),
    })
}

/// Accepts `"2024"` or a label naming the following year, `"2024-25"` or
/// `"2024-2025"`.
pub fn parse_fiscal_year(raw: &str) -> Result<i32, MatrixError> {
    let trimmed = raw.trim();
    let (start, end) = match trimmed.split_once('-') {
        Some((start, end)) if !start.is_empty() => (start, Some(end)),
        _ => (trimmed, None),
    };
    let year = start
        .parse::<i32>()
        .map_err(|_| MatrixError::NonNumericFiscalYear(trimmed.to_string()))?;

    let Some(end) = end else {
        return Ok(year);
    };
    let next = year.checked_add(1);
    let follows = end.chars().all(|c| c.is_ascii_digit())
        && match end.len() {
            2 => next.map(|next| next.rem_euclid(100)) == end.parse::<i32>().ok(),
            4 => next == end.parse::<i32>().ok(),
            _ => false,
        };
    if !follows {
        return Err(MatrixError::InvalidFiscalYearLabel(trimmed.to_string()));
    }
    Ok(year)
}

/// Newest year with data, otherwise the running fiscal year.
pub fn default_fiscal_year(available_years: &[i32]) -> i32 {
    available_years
        .first()
        .copied()
        .unwrap_or_else(current_fiscal_year)
}
