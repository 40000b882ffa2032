use serde::Serialize;

use crate::models::MatrixCell;
use crate::services::dates::{fiscal_year_for_raw, SlashDateOrder};

/// Outcome of re-checking a built payment grid against its fiscal year.
#[derive(Debug, Clone, Default, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IntegrityReport {
    pub selected_year: i32,
    pub checked_cells: usize,
    pub mismatches: Vec<IntegrityMismatch>,
}

#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct IntegrityMismatch {
    pub block_number: String,
    pub flat_number: String,
    pub payment_date: String,
    /// `None` when the stored date no longer parses.
    pub derived_year: Option<i32>,
}

impl IntegrityReport {
    pub fn is_clean(&self) -> bool {
        self.mismatches.is_empty()
    }
}

/// Walk every cell carrying a payment date and collect the ones whose date
/// does not fall in `selected_year`. Read-only: the grid is never touched.
pub fn audit_payment_cells(
    cells: &[Vec<MatrixCell>],
    selected_year: i32,
    order: SlashDateOrder,
) -> IntegrityReport {
    let mut report = IntegrityReport {
        selected_year,
        ..IntegrityReport::default()
    };

    for cell in cells.iter().flatten() {
        let Some(payment_date) = cell
            .metadata
            .as_ref()
            .and_then(|metadata| metadata.payment_date.as_deref())
        else {
            continue;
        };
        report.checked_cells += 1;

        let derived_year = fiscal_year_for_raw(payment_date, order);
        if derived_year != Some(selected_year) {
            report.mismatches.push(IntegrityMismatch {
                block_number: cell.block_number.clone(),
                flat_number: cell.flat_number.clone(),
                payment_date: payment_date.to_string(),
                derived_year,
            });
        }
    }

    report
}

/// Emit all mismatches as one diagnostic batch.
pub fn log_integrity_findings(report: &IntegrityReport) {
    if report.is_clean() {
        tracing::debug!(
            selected_year = report.selected_year,
            checked_cells = report.checked_cells,
            "Payment matrix integrity check passed"
        );
        return;
    }

    let details = report
        .mismatches
        .iter()
        .map(|mismatch| {
            format!(
                "{}-{} paymentDate={} derivedYear={}",
                mismatch.block_number,
                mismatch.flat_number,
                mismatch.payment_date,
                mismatch
                    .derived_year
                    .map(|year| year.to_string())
                    .unwrap_or_else(|| "invalid".to_string())
            )
        })
        .collect::<Vec<_>>()
        .join("; ");

    tracing::error!(
        selected_year = report.selected_year,
        checked_cells = report.checked_cells,
        mismatch_count = report.mismatches.len(),
        mismatches = %details,
        "Payment matrix integrity check found cells outside the selected fiscal year"
    );
}

#[cfg(test)]
mod tests {
    use super::audit_payment_cells;
    use crate::models::{CellMetadata, CellValue, MatrixCell};
    use crate::services::dates::SlashDateOrder;

    fn paid_cell(block: &str, flat: &str, payment_date: &str) -> MatrixCell {
        MatrixCell {
            block_number: block.to_string(),
            flat_number: flat.to_string(),
            value: Some(CellValue::Amount(1000)),
            metadata: Some(CellMetadata {
                payment_date: Some(payment_date.to_string()),
                receipt_number: Some("R1".to_string()),
                ..CellMetadata::default()
            }),
        }
    }

    #[test]
    fn clean_grid_passes() {
        let cells = vec![vec![
            paid_cell("A", "101", "2024-04-01"),
            MatrixCell::empty("A", "102"),
            paid_cell("A", "103", "2025-03-31"),
        ]];
        let report = audit_payment_cells(&cells, 2024, SlashDateOrder::Auto);
        assert!(report.is_clean());
        assert_eq!(report.checked_cells, 2);
    }

    #[test]
    fn reports_every_out_of_year_cell_without_touching_the_grid() {
        let cells = vec![
            vec![paid_cell("A", "101", "2024-03-31")],
            vec![paid_cell("B", "101", "garbage")],
        ];
        let before = cells.clone();
        let report = audit_payment_cells(&cells, 2024, SlashDateOrder::Auto);
        assert_eq!(report.mismatches.len(), 2);
        assert_eq!(report.mismatches[0].derived_year, Some(2023));
        assert_eq!(report.mismatches[1].block_number, "B");
        assert_eq!(report.mismatches[1].derived_year, None);
        assert_eq!(cells, before);
    }

    #[test]
    fn empty_grid_has_nothing_to_check() {
        let report = audit_payment_cells(&[], 2024, SlashDateOrder::Auto);
        assert!(report.is_clean());
        assert_eq!(report.checked_cells, 0);
        assert_eq!(report.selected_year, 2024);
    }
}
