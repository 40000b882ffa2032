use std::collections::{BTreeSet, HashMap};

use crate::models::{
    flat_id, flat_key, CellMetadata, CellValue, FlatId, MatrixCell, Owner, StickerMatrixData,
};
use crate::services::dimensions::extract_blocks_and_flats;

const STICKER_SEPARATORS: &[char] = &[',', ';', '|'];
const MAX_STICKER_CODE_LEN: usize = 64;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StickerAssignment {
    Unassigned,
    Single,
    Multiple,
}

impl StickerAssignment {
    pub fn from_count(count: usize) -> Self {
        match count {
            0 => Self::Unassigned,
            1 => Self::Single,
            _ => Self::Multiple,
        }
    }
}

#[derive(Debug, thiserror::Error)]
enum StickerError {
    #[error("sticker code {0:?} contains control characters")]
    ControlCharacters(String),
    #[error("sticker code is {0} characters long (limit {limit})", limit = MAX_STICKER_CODE_LEN)]
    TooLong(usize),
}

/// Split a `stickerNos` field on `,` `;` `|`, trimming and dropping blanks.
pub fn split_sticker_codes(raw: &str) -> Vec<String> {
    raw.split(STICKER_SEPARATORS)
        .map(str::trim)
        .filter(|code| !code.is_empty())
        .map(ToOwned::to_owned)
        .collect()
}

/// Stickers per (block, flat), merged across every member of the flat.
///
/// A flat whose codes cannot be read falls back to an empty cell and a
/// warning; the rest of the grid is still built.
pub fn build_sticker_matrix(owners: &[Owner]) -> StickerMatrixData {
    let axes = extract_blocks_and_flats(owners);
    let mut warnings = axes.warnings;

    let mut members: HashMap<FlatId, Vec<&Owner>> = HashMap::new();
    for owner in owners {
        if owner.block_number.trim().is_empty() || owner.flat_number.trim().is_empty() {
            continue;
        }
        members
            .entry(flat_id(&owner.block_number, &owner.flat_number))
            .or_default()
            .push(owner);
    }

    let mut unassigned_flats = Vec::new();
    let mut multiple_stickers = Vec::new();
    let mut single_count = 0;
    let mut total_stickers = 0;

    let mut cells = Vec::with_capacity(axes.blocks.len());
    for block in &axes.blocks {
        let mut row = Vec::with_capacity(axes.flats.len());
        for flat in &axes.flats {
            let key = flat_key(block, flat);
            let flat_members = members
                .get(&flat_id(block, flat))
                .map(Vec::as_slice)
                .unwrap_or_default();

            let codes = match collect_flat_stickers(flat_members) {
                Ok(codes) => codes,
                Err(error) => {
                    tracing::warn!(flat = %key, error = %error, "Falling back to empty sticker cell");
                    warnings.push(format!("Stickers for {key} ignored: {error}"));
                    BTreeSet::new()
                }
            };

            let count = codes.len();
            total_stickers += count;
            match StickerAssignment::from_count(count) {
                StickerAssignment::Unassigned => unassigned_flats.push(key),
                StickerAssignment::Single => single_count += 1,
                StickerAssignment::Multiple => multiple_stickers.push(key),
            }
            row.push(sticker_cell(block, flat, codes));
        }
        cells.push(row);
    }

    StickerMatrixData {
        blocks: axes.blocks,
        flats: axes.flats,
        cells,
        unassigned_flats,
        multiple_stickers,
        single_count,
        total_stickers,
        warnings,
    }
}

fn collect_flat_stickers(members: &[&Owner]) -> Result<BTreeSet<String>, StickerError> {
    let mut codes = BTreeSet::new();
    for member in members {
        for code in split_sticker_codes(&member.sticker_nos) {
            if code.chars().any(char::is_control) {
                return Err(StickerError::ControlCharacters(code));
            }
            let length = code.chars().count();
            if length > MAX_STICKER_CODE_LEN {
                return Err(StickerError::TooLong(length));
            }
            codes.insert(code);
        }
    }
    Ok(codes)
}

fn sticker_cell(block: &str, flat: &str, codes: BTreeSet<String>) -> MatrixCell {
    let count = codes.len();
    let value = match count {
        0 => None,
        _ => Some(CellValue::Text(
            codes.into_iter().collect::<Vec<_>>().join(", "),
        )),
    };
    MatrixCell {
        block_number: block.to_string(),
        flat_number: flat.to_string(),
        value,
        metadata: Some(CellMetadata {
            sticker_count: Some(count),
            ..CellMetadata::default()
        }),
    }
}

#[cfg(test)]
mod tests {
    use super::{build_sticker_matrix, split_sticker_codes, StickerAssignment};
    use crate::models::{CellValue, Owner};

    fn owner(block: &str, flat: &str, stickers: &str) -> Owner {
        Owner {
            block_number: block.to_string(),
            flat_number: flat.to_string(),
            sticker_nos: stickers.to_string(),
            ..Owner::default()
        }
    }

    fn text_at(data: &crate::models::StickerMatrixData, row: usize, col: usize) -> Option<&str> {
        data.cells[row][col].value.as_ref().and_then(CellValue::as_text)
    }

    fn count_at(data: &crate::models::StickerMatrixData, row: usize, col: usize) -> Option<usize> {
        data.cells[row][col]
            .metadata
            .as_ref()
            .and_then(|metadata| metadata.sticker_count)
    }

    #[test]
    fn splits_on_every_separator() {
        assert_eq!(
            split_sticker_codes(" S1, S2;S3 | S4,, ;"),
            vec!["S1", "S2", "S3", "S4"]
        );
        assert!(split_sticker_codes("").is_empty());
    }

    #[test]
    fn multiple_codes_are_sorted_and_flagged() {
        let data = build_sticker_matrix(&[owner("B", "404", "S2,S1")]);
        assert_eq!(text_at(&data, 0, 0), Some("S1, S2"));
        assert_eq!(count_at(&data, 0, 0), Some(2));
        assert_eq!(data.multiple_stickers, vec!["B-404"]);
        assert!(data.unassigned_flats.is_empty());
        assert_eq!(data.total_stickers, 2);
    }

    #[test]
    fn merges_and_dedupes_across_members_of_a_flat() {
        let owners = vec![
            owner("A", "101", "K-9|K-1"),
            owner("A", "101", "K-1; K-7"),
            owner("A", "102", "Z-1"),
        ];
        let data = build_sticker_matrix(&owners);
        assert_eq!(text_at(&data, 0, 0), Some("K-1, K-7, K-9"));
        assert_eq!(count_at(&data, 0, 0), Some(3));
        assert_eq!(text_at(&data, 0, 1), Some("Z-1"));
        assert_eq!(data.single_count, 1);
    }

    #[test]
    fn classification_partitions_the_grid() {
        let owners = vec![
            owner("1", "101", ""),
            owner("1", "102", "S1"),
            owner("2", "101", "S2,S3"),
            owner("3", "103", "S4"),
        ];
        let data = build_sticker_matrix(&owners);
        let cells = data.blocks.len() * data.flats.len();
        assert_eq!(
            data.unassigned_flats.len() + data.single_count + data.multiple_stickers.len(),
            cells
        );
        for key in &data.unassigned_flats {
            assert!(!data.multiple_stickers.contains(key));
        }
        assert!(data.unassigned_flats.contains(&"2-103".to_string()));
        assert_eq!(data.cells[0][0].value, None);
    }

    #[test]
    fn malformed_codes_fall_back_to_an_empty_cell() {
        let owners = vec![
            owner("A", "101", "S1\u{7}"),
            owner("A", "102", "S2"),
            owner("A", "103", &"X".repeat(80)),
        ];
        let data = build_sticker_matrix(&owners);
        assert_eq!(data.cells[0][0].value, None);
        assert_eq!(count_at(&data, 0, 0), Some(0));
        assert_eq!(text_at(&data, 0, 1), Some("S2"));
        assert_eq!(data.cells[0][2].value, None);
        assert_eq!(data.unassigned_flats, vec!["A-101", "A-103"]);
        assert_eq!(data.warnings.len(), 2);
    }

    #[test]
    fn owners_without_a_flat_are_skipped() {
        let data = build_sticker_matrix(&[owner("", "101", "S1"), owner("A", "101", "")]);
        assert_eq!(data.blocks, vec!["A"]);
        assert_eq!(data.unassigned_flats, vec!["A-101"]);
        assert_eq!(data.warnings.len(), 1);
    }

    #[test]
    fn empty_roster_builds_an_empty_grid() {
        let data = build_sticker_matrix(&[]);
        assert!(data.cells.is_empty());
        assert!(data.unassigned_flats.is_empty());
        assert_eq!(data.total_stickers, 0);
    }

    #[test]
    fn classifies_counts() {
        assert_eq!(StickerAssignment::from_count(0), StickerAssignment::Unassigned);
        assert_eq!(StickerAssignment::from_count(1), StickerAssignment::Single);
        assert_eq!(StickerAssignment::from_count(5), StickerAssignment::Multiple);
    }

    #[test]
    fn hyphenated_identifiers_do_not_share_stickers() {
        let data = build_sticker_matrix(&[owner("A-1", "01", "S1"), owner("A", "1-01", "S2")]);
        assert_eq!(data.blocks, vec!["A", "A-1"]);
        assert_eq!(data.flats, vec!["01", "1-01"]);
        assert_eq!(text_at(&data, 0, 1), Some("S2"));
        assert_eq!(text_at(&data, 1, 0), Some("S1"));
        assert_eq!(data.cells[0][0].value, None);
        assert_eq!(data.cells[1][1].value, None);
        assert_eq!(data.total_stickers, 2);
        assert_eq!(data.single_count, 2);
        assert_eq!(data.unassigned_flats, vec!["A-01", "A-1-1-01"]);
    }
}
