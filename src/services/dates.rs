use chrono::{DateTime, Datelike, NaiveDate, NaiveDateTime, NaiveTime, Utc};
use chrono_tz::Asia::Kolkata;

/// Formats tried, in order, once the structured strategies have failed.
const FALLBACK_DATE_FORMATS: &[&str] = &[
    "%d-%m-%Y", "%d.%m.%Y", "%d %b %Y", "%d-%b-%Y", "%b %d, %Y", "%B %d, %Y", "%d %B %Y",
    "%Y/%m/%d",
];
const FALLBACK_DATETIME_FORMATS: &[&str] = &["%Y-%m-%d %H:%M:%S", "%Y-%m-%d %H:%M"];
const ISO_LOCAL_DATETIME_FORMATS: &[&str] = &[
    "%Y-%m-%dT%H:%M:%S",
    "%Y-%m-%dT%H:%M:%S%.f",
    "%Y-%m-%dT%H:%M",
];

/// How `a/b/yyyy` dates from a given sheet are read.
///
/// `Auto` is month-first and only flips to day-first when the first component
/// cannot be a month. Genuinely ambiguous dates such as `03/04/2024` are read
/// month-first, so a sheet known to be day-first should be configured as such.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SlashDateOrder {
    #[default]
    Auto,
    MonthFirst,
    DayFirst,
}

impl SlashDateOrder {
    pub fn from_env(value: Option<String>) -> Self {
        match value
            .as_deref()
            .map(str::trim)
            .unwrap_or_default()
            .to_ascii_lowercase()
            .as_str()
        {
            "mdy" | "month_first" => Self::MonthFirst,
            "dmy" | "day_first" => Self::DayFirst,
            _ => Self::Auto,
        }
    }

    pub fn as_str(self) -> &'static str {
        match self {
            Self::Auto => "auto",
            Self::MonthFirst => "mdy",
            Self::DayFirst => "dmy",
        }
    }
}

/// Parse a sheet date using the default slash order.
pub fn normalize_date(raw: &str) -> Option<DateTime<Utc>> {
    normalize_date_with(raw, SlashDateOrder::Auto)
}

/// Parse a loosely formatted date. Returns `None` instead of failing; callers
/// must branch on it before bucketing.
pub fn normalize_date_with(raw: &str, order: SlashDateOrder) -> Option<DateTime<Utc>> {
    let value = raw.trim();
    if value.is_empty() {
        return None;
    }

    if value.contains('T') || value.contains('Z') {
        if let Some(parsed) = parse_iso_datetime(value) {
            return Some(parsed);
        }
    }
    if let Some(date) = parse_plain_iso_date(value) {
        return Some(midnight_utc(date));
    }
    if let Some(date) = parse_slash_date(value, order) {
        return Some(midnight_utc(date));
    }
    parse_fallback(value)
}

/// Indian financial year (April to March), labelled by its starting year.
pub fn fiscal_year_of(date: &DateTime<Utc>) -> i32 {
    if date.month() >= 4 {
        date.year()
    } else {
        date.year() - 1
    }
}

pub fn fiscal_year_for_raw(raw: &str, order: SlashDateOrder) -> Option<i32> {
    normalize_date_with(raw, order).map(|date| fiscal_year_of(&date))
}

/// First day of the fiscal year, or `None` when the year is outside the
/// representable calendar.
pub fn fiscal_year_start(fiscal_year: i32) -> Option<NaiveDate> {
    NaiveDate::from_ymd_opt(fiscal_year, 4, 1)
}

/// `2024` -> `"2024-25"`.
pub fn fiscal_year_label(fiscal_year: i32) -> String {
    format!("{}-{:02}", fiscal_year, (fiscal_year + 1).rem_euclid(100))
}

pub fn current_calendar_year() -> i32 {
    Utc::now().with_timezone(&Kolkata).year()
}

pub fn current_fiscal_year() -> i32 {
    let today = Utc::now().with_timezone(&Kolkata);
    if today.month() >= 4 {
        today.year()
    } else {
        today.year() - 1
    }
}

fn parse_iso_datetime(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc3339(value) {
        return Some(parsed.with_timezone(&Utc));
    }
    ISO_LOCAL_DATETIME_FORMATS.iter().find_map(|format| {
        NaiveDateTime::parse_from_str(value.trim_end_matches('Z'), format)
            .ok()
            .map(|naive| naive.and_utc())
    })
}

fn parse_plain_iso_date(value: &str) -> Option<NaiveDate> {
    let parts = value.split('-').collect::<Vec<_>>();
    let [year, month, day] = parts.as_slice() else {
        return None;
    };
    if year.len() != 4 || !is_short_number(month) || !is_short_number(day) {
        return None;
    }
    NaiveDate::from_ymd_opt(
        year.parse().ok()?,
        month.parse().ok()?,
        day.parse().ok()?,
    )
}

fn parse_slash_date(value: &str, order: SlashDateOrder) -> Option<NaiveDate> {
    let parts = value.split('/').collect::<Vec<_>>();
    let [first, second, year] = parts.as_slice() else {
        return None;
    };
    if year.len() != 4 || !is_short_number(first) || !is_short_number(second) {
        return None;
    }
    let first: u32 = first.parse().ok()?;
    let second: u32 = second.parse().ok()?;
    let year: i32 = year.parse().ok()?;

    let (month, day) = match order {
        SlashDateOrder::MonthFirst => (first, second),
        SlashDateOrder::DayFirst => (second, first),
        SlashDateOrder::Auto if first > 12 => (second, first),
        SlashDateOrder::Auto => (first, second),
    };
    NaiveDate::from_ymd_opt(year, month, day)
}

fn parse_fallback(value: &str) -> Option<DateTime<Utc>> {
    if let Ok(parsed) = DateTime::parse_from_rfc2822(value) {
        return Some(parsed.with_timezone(&Utc));
    }
    if let Some(parsed) = FALLBACK_DATETIME_FORMATS.iter().find_map(|format| {
        NaiveDateTime::parse_from_str(value, format)
            .ok()
            .map(|naive| naive.and_utc())
    }) {
        return Some(parsed);
    }
    FALLBACK_DATE_FORMATS
        .iter()
        .find_map(|format| NaiveDate::parse_from_str(value, format).ok())
        .map(midnight_utc)
}

fn is_short_number(value: &str) -> bool {
    !value.is_empty() && value.len() <= 2 && value.bytes().all(|b| b.is_ascii_digit())
}

fn midnight_utc(date: NaiveDate) -> DateTime<Utc> {
    date.and_time(NaiveTime::MIN).and_utc()
}
