use std::collections::HashMap;
use std::time::Duration;

use reqwest::{Client, StatusCode};
use serde_json::Value;
use url::Url;
use uuid::Uuid;
use validator::Validate;

use crate::config::AppConfig;
use crate::error::{AppError, AppResult};
use crate::models::{Owner, Receipt};
use crate::schemas::{parse_amount, OwnerRow, ReceiptRow};

const MAX_RETRY_BACKOFF_MS: u64 = 5_000;

const BLOCK_ALIASES: &[&str] = &["blocknumber", "blockno", "block", "wing"];
const FLAT_ALIASES: &[&str] = &["flatnumber", "flatno", "flat", "unit"];
const MEMBER_NAME_ALIASES: &[&str] = &["membername", "ownername", "name"];
const ROLE_ALIASES: &[&str] = &["isowner", "ownertenant", "role", "type"];
const PHONE_PRIMARY_ALIASES: &[&str] = &["phone1", "phone", "mobile", "mobileno", "contactno"];
const PHONE_SECONDARY_ALIASES: &[&str] = &["phone2", "alternatephone", "alternatemobile"];
const TWO_WHEELER_ALIASES: &[&str] = &["twowheelers", "2wheelers", "twowheeler", "2wheeler"];
const FOUR_WHEELER_ALIASES: &[&str] = &["fourwheelers", "4wheelers", "fourwheeler", "4wheeler"];
const STICKER_ALIASES: &[&str] = &["stickernos", "stickerno", "stickers", "stickernumbers"];

const RECEIPT_NO_ALIASES: &[&str] = &["receiptno", "receiptnumber", "receipt"];
const RECEIPT_DATE_ALIASES: &[&str] = &["receiptdate", "date"];
const PAYER_NAME_ALIASES: &[&str] = &["name", "membername", "paidby"];
const AMOUNT_ALIASES: &[&str] = &["paymentamount", "amount", "amountpaid"];
const PAYMENT_DATE_ALIASES: &[&str] = &["paymentdate", "paiddate", "dateofpayment"];
const REMARKS_ALIASES: &[&str] = &["remarks", "remark", "notes"];

/// Records decoded from one sheet plus whatever had to be dropped.
#[derive(Debug, Clone, Default)]
pub struct Decoded<T> {
    pub records: Vec<T>,
    pub warnings: Vec<String>,
}

#[derive(Debug)]
enum FetchError {
    Retryable(String),
    Fatal(String),
}

/// Read-only client for the spreadsheet values API.
#[derive(Debug, Clone)]
pub struct SheetsClient {
    http: Client,
    base_url: String,
    api_key: Option<String>,
    spreadsheet_id: Option<String>,
    owners_range: String,
    receipts_range: String,
    timeout: Duration,
    max_attempts: u32,
    retry_backoff_ms: u64,
}

impl SheetsClient {
    pub fn from_config(http: Client, config: &AppConfig) -> Self {
        Self {
            http,
            base_url: config.sheets_api_base_url.clone(),
            api_key: config.google_sheets_api_key.clone(),
            spreadsheet_id: config.spreadsheet_id.clone(),
            owners_range: config.owners_range.clone(),
            receipts_range: config.receipts_range.clone(),
            timeout: Duration::from_secs(config.sheets_fetch_timeout_seconds.max(1)),
            max_attempts: config.sheets_fetch_max_attempts.max(1),
            retry_backoff_ms: config.sheets_retry_backoff_ms,
        }
    }

    pub async fn fetch_owners(&self) -> AppResult<Decoded<Owner>> {
        let values = self.fetch_values(&self.owners_range).await?;
        Ok(decode_owners(&self.owners_range, &values))
    }

    pub async fn fetch_receipts(&self) -> AppResult<Decoded<Receipt>> {
        let values = self.fetch_values(&self.receipts_range).await?;
        Ok(decode_receipts(&self.receipts_range, &values))
    }

    async fn fetch_values(&self, range: &str) -> AppResult<Vec<Vec<Value>>> {
        let url = self.values_url(range)?;
        let mut attempt = 1;
        loop {
            match self.fetch_once(&url).await {
                Ok(payload) => return Ok(values_from_payload(&payload)),
                Err(FetchError::Fatal(message)) => {
                    tracing::error!(range, error = %message, "Spreadsheet fetch failed");
                    return Err(AppError::Dependency(message));
                }
                Err(FetchError::Retryable(message)) if attempt < self.max_attempts => {
                    let backoff = retry_backoff(attempt, self.retry_backoff_ms);
                    tracing::warn!(
                        range,
                        attempt,
                        backoff_ms = backoff.as_millis() as u64,
                        error = %message,
                        "Spreadsheet fetch failed, retrying"
                    );
                    tokio::time::sleep(backoff).await;
                    attempt += 1;
                }
                Err(FetchError::Retryable(message)) => {
                    tracing::error!(range, attempt, error = %message, "Spreadsheet fetch gave up");
                    return Err(AppError::Dependency(message));
                }
            }
        }
    }

    async fn fetch_once(&self, url: &Url) -> Result<Value, FetchError> {
        let response = self
            .http
            .get(url.clone())
            .timeout(self.timeout)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|error| {
                if error.is_timeout() {
                    FetchError::Retryable("Spreadsheet request timed out.".to_string())
                } else {
                    FetchError::Retryable(format!("Spreadsheet request failed: {error}"))
                }
            })?;

        let status = response.status();
        if !status.is_success() {
            let message = format!("Spreadsheet API returned {status}.");
            return Err(if is_retryable_status(status) {
                FetchError::Retryable(message)
            } else {
                FetchError::Fatal(message)
            });
        }

        response
            .json::<Value>()
            .await
            .map_err(|error| FetchError::Retryable(format!("Spreadsheet response unreadable: {error}")))
    }

    fn values_url(&self, range: &str) -> AppResult<Url> {
        let spreadsheet_id = self.spreadsheet_id.as_deref().ok_or_else(|| {
            AppError::ServiceUnavailable("Spreadsheet is not configured. Set SPREADSHEET_ID.".to_string())
        })?;
        let mut url = Url::parse(&self.base_url).map_err(|error| {
            AppError::Internal(format!("Invalid SHEETS_API_BASE_URL: {error}"))
        })?;
        url.path_segments_mut()
            .map_err(|_| AppError::Internal("SHEETS_API_BASE_URL cannot be a base.".to_string()))?
            .pop_if_empty()
            .extend(["v4", "spreadsheets", spreadsheet_id, "values", range]);
        {
            let mut query = url.query_pairs_mut();
            query.append_pair("valueRenderOption", "FORMATTED_VALUE");
            if let Some(key) = self.api_key.as_deref() {
                query.append_pair("key", key);
            }
        }
        Ok(url)
    }
}

fn is_retryable_status(status: StatusCode) -> bool {
    status == StatusCode::TOO_MANY_REQUESTS || status.is_server_error()
}

fn retry_backoff(attempt: u32, base_ms: u64) -> Duration {
    let exponent = attempt.saturating_sub(1).min(10);
    let millis = base_ms.saturating_mul(1_u64 << exponent);
    Duration::from_millis(millis.min(MAX_RETRY_BACKOFF_MS))
}

fn values_from_payload(payload: &Value) -> Vec<Vec<Value>> {
    payload
        .get("values")
        .and_then(Value::as_array)
        .map(|rows| {
            rows.iter()
                .map(|row| row.as_array().cloned().unwrap_or_default())
                .collect()
        })
        .unwrap_or_default()
}

/// Column lookup keyed by normalized header text.
struct SheetTable<'a> {
    columns: HashMap<String, usize>,
    rows: &'a [Vec<Value>],
}

impl<'a> SheetTable<'a> {
    fn new(values: &'a [Vec<Value>]) -> Self {
        let Some((header, rows)) = values.split_first() else {
            return Self {
                columns: HashMap::new(),
                rows: &[],
            };
        };
        let mut columns = HashMap::new();
        for (index, cell) in header.iter().enumerate() {
            let name = normalize_header(&scalar_text(cell).unwrap_or_default());
            if !name.is_empty() {
                columns.entry(name).or_insert(index);
            }
        }
        Self { columns, rows }
    }

    fn column(&self, aliases: &[&str]) -> Option<usize> {
        aliases
            .iter()
            .find_map(|alias| self.columns.get(*alias).copied())
    }
}

/// Reads one row, recording cells that are not plain scalars.
struct RowReader<'a> {
    row: &'a [Value],
    problems: Vec<String>,
}

impl<'a> RowReader<'a> {
    fn text(&mut self, column: Option<usize>, field: &str) -> String {
        let Some(cell) = column.and_then(|index| self.row.get(index)) else {
            return String::new();
        };
        match scalar_text(cell) {
            Some(text) => text,
            None => {
                self.problems.push(format!("{field} is not a plain value"));
                String::new()
            }
        }
    }
}

pub fn decode_owners(sheet: &str, values: &[Vec<Value>]) -> Decoded<Owner> {
    let table = SheetTable::new(values);
    let block = table.column(BLOCK_ALIASES);
    let flat = table.column(FLAT_ALIASES);
    let member_name = table.column(MEMBER_NAME_ALIASES);
    let role = table.column(ROLE_ALIASES);
    let phone_primary = table.column(PHONE_PRIMARY_ALIASES);
    let phone_secondary = table.column(PHONE_SECONDARY_ALIASES);
    let two_wheelers = table.column(TWO_WHEELER_ALIASES);
    let four_wheelers = table.column(FOUR_WHEELER_ALIASES);
    let stickers = table.column(STICKER_ALIASES);

    let mut decoded = Decoded::default();
    if !values.is_empty() && (block.is_none() || flat.is_none()) {
        decoded
            .warnings
            .push(format!("{sheet}: block or flat column not found in header row"));
    }

    for (offset, row) in table.rows.iter().enumerate() {
        if is_blank_row(row) {
            continue;
        }
        let row_number = offset + 2;
        let mut reader = RowReader {
            row,
            problems: Vec::new(),
        };
        let owner_row = OwnerRow {
            block_number: reader.text(block, "blockNumber"),
            flat_number: reader.text(flat, "flatNumber"),
            member_name: reader.text(member_name, "memberName"),
            role: reader.text(role, "isOwner"),
            phone_primary: reader.text(phone_primary, "phone"),
            phone_secondary: reader.text(phone_secondary, "alternatePhone"),
            two_wheeler_count: reader.text(two_wheelers, "twoWheelers"),
            four_wheeler_count: reader.text(four_wheelers, "fourWheelers"),
            sticker_nos: reader.text(stickers, "stickerNos"),
        };
        for problem in reader.problems {
            decoded
                .warnings
                .push(format!("{sheet} row {row_number}: {problem}, treated as empty"));
        }
        if let Err(errors) = owner_row.validate() {
            decoded
                .warnings
                .push(format!("{sheet} row {row_number} dropped: {errors}"));
            continue;
        }
        let id = record_id(
            sheet,
            row_number,
            &owner_row.block_number,
            &owner_row.flat_number,
        );
        decoded.records.push(owner_row.into_owner(id));
    }
    decoded
}

pub fn decode_receipts(sheet: &str, values: &[Vec<Value>]) -> Decoded<Receipt> {
    let table = SheetTable::new(values);
    let receipt_no = table.column(RECEIPT_NO_ALIASES);
    let receipt_date = table.column(RECEIPT_DATE_ALIASES);
    let block = table.column(BLOCK_ALIASES);
    let flat = table.column(FLAT_ALIASES);
    let name = table.column(PAYER_NAME_ALIASES);
    let amount = table.column(AMOUNT_ALIASES);
    let payment_date = table.column(PAYMENT_DATE_ALIASES);
    let remarks = table.column(REMARKS_ALIASES);

    let mut decoded = Decoded::default();
    if !values.is_empty() && payment_date.is_none() {
        decoded
            .warnings
            .push(format!("{sheet}: payment date column not found in header row"));
    }

    for (offset, row) in table.rows.iter().enumerate() {
        if is_blank_row(row) {
            continue;
        }
        let row_number = offset + 2;
        let mut reader = RowReader {
            row,
            problems: Vec::new(),
        };
        let receipt_row = ReceiptRow {
            receipt_no: reader.text(receipt_no, "receiptNo"),
            receipt_date: reader.text(receipt_date, "receiptDate"),
            block_number: reader.text(block, "blockNumber"),
            flat_number: reader.text(flat, "flatNumber"),
            name: reader.text(name, "name"),
            payment_amount: reader.text(amount, "paymentAmount"),
            payment_date: reader.text(payment_date, "paymentDate"),
            remarks: reader.text(remarks, "remarks"),
        };
        for problem in reader.problems {
            decoded
                .warnings
                .push(format!("{sheet} row {row_number}: {problem}, treated as empty"));
        }
        if let Err(errors) = receipt_row.validate() {
            decoded
                .warnings
                .push(format!("{sheet} row {row_number} dropped: {errors}"));
            continue;
        }
        let raw_amount = receipt_row.payment_amount.as_str();
        if !raw_amount.is_empty() && parse_amount(raw_amount).is_none() {
            decoded.warnings.push(format!(
                "{sheet} row {row_number}: paymentAmount '{raw_amount}' is not a whole rupee amount"
            ));
        }
        let id = record_id(
            sheet,
            row_number,
            &receipt_row.block_number,
            &receipt_row.flat_number,
        );
        decoded.records.push(receipt_row.into_receipt(id));
    }
    decoded
}

/// Stable per-row id; the same sheet position always yields the same id.
fn record_id(sheet: &str, row_number: usize, block: &str, flat: &str) -> String {
    let source_key = format!("{sheet}:{row_number}:{}:{}", block.trim(), flat.trim());
    Uuid::new_v5(&Uuid::NAMESPACE_OID, source_key.as_bytes()).to_string()
}

fn normalize_header(raw: &str) -> String {
    raw.chars()
        .filter(char::is_ascii_alphanumeric)
        .map(|c| c.to_ascii_lowercase())
        .collect()
}

fn scalar_text(value: &Value) -> Option<String> {
    match value {
        Value::Null => Some(String::new()),
        Value::String(text) => Some(text.trim().to_string()),
        Value::Bool(flag) => Some(flag.to_string()),
        Value::Number(number) => Some(match number.as_f64() {
            Some(float) if float.fract() == 0.0 && float.abs() < 1e15 => {
                format!("{}", float as i64)
            }
            _ => number.to_string(),
        }),
        Value::Array(_) | Value::Object(_) => None,
    }
}

fn is_blank_row(row: &[Value]) -> bool {
    row.iter()
        .all(|cell| scalar_text(cell).is_some_and(|text| text.is_empty()))
}

#[cfg(test)]
mod tests {
    use super::{decode_owners, decode_receipts, normalize_header, retry_backoff, SheetsClient};
    use crate::config::AppConfig;
    use serde_json::{json, Value};
    use std::time::Duration;

    fn rows(value: Value) -> Vec<Vec<Value>> {
        serde_json::from_value(value).expect("rows")
    }

    #[test]
    fn normalizes_headers() {
        assert_eq!(normalize_header("Block No."), "blockno");
        assert_eq!(normalize_header(" Sticker Nos "), "stickernos");
        assert_eq!(normalize_header("2 Wheelers"), "2wheelers");
    }

    #[test]
    fn decodes_owner_rows_by_header_name() {
        let values = rows(json!([
            ["Flat No", "Block", "Member Name", "Owner/Tenant", "Phone", "Sticker Nos"],
            ["101", "A", "Asha", "Owner", "98450", "S1, S2"],
            [],
            ["", "", "", "", "", ""],
            [102, "A", "Ravi", "Tenant"]
        ]));
        let decoded = decode_owners("Owners", &values);
        assert_eq!(decoded.records.len(), 2);
        assert!(decoded.warnings.is_empty());

        let first = &decoded.records[0];
        assert_eq!(first.block_number, "A");
        assert_eq!(first.flat_number, "101");
        assert_eq!(first.sticker_nos, "S1, S2");
        assert!(first.is_owner);
        assert_eq!(first.phone_primary.as_deref(), Some("98450"));

        let second = &decoded.records[1];
        assert_eq!(second.flat_number, "102");
        assert!(!second.is_owner);
        assert_ne!(first.id, second.id);
    }

    #[test]
    fn record_ids_are_deterministic() {
        let values = rows(json!([["Block", "Flat"], ["A", "101"]]));
        let first = decode_owners("Owners", &values);
        let second = decode_owners("Owners", &values);
        assert_eq!(first.records[0].id, second.records[0].id);
    }

    #[test]
    fn non_scalar_cells_and_invalid_rows_become_warnings() {
        let long_block = "B".repeat(40);
        let values = rows(json!([
            ["Block", "Flat", "Sticker Nos"],
            ["A", "101", ["S1"]],
            [long_block, "102", "S2"]
        ]));
        let decoded = decode_owners("Owners", &values);
        assert_eq!(decoded.records.len(), 1);
        assert_eq!(decoded.records[0].sticker_nos, "");
        assert_eq!(decoded.warnings.len(), 2);
        assert!(decoded.warnings[0].contains("row 2"));
        assert!(decoded.warnings[1].contains("row 3 dropped"));
    }

    #[test]
    fn decodes_receipts_and_amounts() {
        let values = rows(json!([
            ["Receipt No", "Receipt Date", "Block", "Flat", "Name", "Amount", "Payment Date", "Remarks"],
            ["R-1", "02/05/2024", "A", "101", "Asha", "₹ 1,500", "2024-05-01", "AMC"],
            ["R-2", "02/05/2024", "A", "102", "Ravi", "", "", ""],
            ["R-3", "03/05/2024", "A", "103", "Meera", 1500.5, "2024-05-03", ""]
        ]));
        let decoded = decode_receipts("Receipts", &values);
        assert_eq!(decoded.records.len(), 3);
        assert_eq!(decoded.records[0].payment_amount, Some(1500));
        assert_eq!(decoded.records[0].payment_date.as_deref(), Some("2024-05-01"));
        assert_eq!(decoded.records[1].payment_amount, None);
        assert_eq!(decoded.records[1].payment_date, None);
        assert_eq!(decoded.records[2].payment_amount, None);
        assert_eq!(decoded.warnings.len(), 1);
        assert!(decoded.warnings[0].contains("row 4"));
        assert!(decoded.warnings[0].contains("1500.5"));
    }

    #[test]
    fn missing_key_columns_are_reported() {
        let values = rows(json!([["Name"], ["Asha"]]));
        let decoded = decode_owners("Owners", &values);
        assert_eq!(decoded.warnings.len(), 1);
        assert!(decode_owners("Owners", &[]).warnings.is_empty());
    }

    #[test]
    fn backoff_doubles_and_caps() {
        assert_eq!(retry_backoff(1, 500), Duration::from_millis(500));
        assert_eq!(retry_backoff(2, 500), Duration::from_millis(1000));
        assert_eq!(retry_backoff(3, 500), Duration::from_millis(2000));
        assert_eq!(retry_backoff(9, 500), Duration::from_millis(5000));
    }

    #[test]
    fn builds_values_url_with_encoded_range() {
        let mut config = AppConfig::from_env();
        config.sheets_api_base_url = "https://sheets.example.test".to_string();
        config.spreadsheet_id = Some("sheet-1".to_string());
        config.google_sheets_api_key = Some("key-1".to_string());
        let client = SheetsClient::from_config(reqwest::Client::new(), &config);

        let url = client.values_url("Owners List!A:Z").expect("url");
        assert_eq!(url.host_str(), Some("sheets.example.test"));
        assert!(url
            .path()
            .starts_with("/v4/spreadsheets/sheet-1/values/Owners%20List"));
        assert!(url.query().unwrap_or_default().contains("key=key-1"));
    }

    #[test]
    fn unconfigured_spreadsheet_is_unavailable() {
        let mut config = AppConfig::from_env();
        config.spreadsheet_id = None;
        let client = SheetsClient::from_config(reqwest::Client::new(), &config);
        assert!(client.values_url("Owners!A:Z").is_err());
    }
}
