use time::format_description::well_known::Rfc3339;
use time::format_description::FormatItem;
use time::macros::format_description;
use time::{Date, OffsetDateTime, PrimitiveDateTime, Time};

const DAY: i64 = 86_400;

const ISO_COMPACT: &[FormatItem<'static>] =
    format_description!("[year][month][day]T[hour][minute][second]Z");
const DISPLAY: &[FormatItem<'static>] = format_description!("[year]-[month]-[day]");

const DURATION_UNITS: &[(&str, i64)] = &[
    ("seconds", 1),
    ("second", 1),
    ("secs", 1),
    ("sec", 1),
    ("s", 1),
    ("minutes", 60),
    ("minute", 60),
    ("mins", 60),
    ("min", 60),
    ("hours", 3_600),
    ("hour", 3_600),
    ("hrs", 3_600),
    ("hr", 3_600),
    ("h", 3_600),
    ("days", DAY),
    ("day", DAY),
    ("d", DAY),
    ("weeks", 7 * DAY),
    ("week", 7 * DAY),
    ("wks", 7 * DAY),
    ("wk", 7 * DAY),
    ("w", 7 * DAY),
    ("months", 30 * DAY),
    ("month", 30 * DAY),
    ("mths", 30 * DAY),
    ("mth", 30 * DAY),
    ("mo", 30 * DAY),
    ("quarters", 91 * DAY),
    ("quarter", 91 * DAY),
    ("qtrs", 91 * DAY),
    ("qtr", 91 * DAY),
    ("q", 91 * DAY),
    ("years", 365 * DAY),
    ("year", 365 * DAY),
    ("yrs", 365 * DAY),
    ("yr", 365 * DAY),
    ("y", 365 * DAY),
];

const NAMED_PERIODS: &[(&str, i64)] = &[
    ("hourly", 3_600),
    ("daily", DAY),
    ("weekly", 7 * DAY),
    ("biweekly", 14 * DAY),
    ("fortnight", 14 * DAY),
    ("monthly", 30 * DAY),
    ("quarterly", 91 * DAY),
    ("semiannual", 183 * DAY),
    ("annual", 365 * DAY),
    ("yearly", 365 * DAY),
];

pub fn now_epoch() -> i64 {
    OffsetDateTime::now_utc().unix_timestamp()
}

/// Parses any supported date form into epoch seconds (UTC).
pub fn parse(text: &str) -> Option<i64> {
    parse_at(text, OffsetDateTime::now_utc())
}

pub fn parse_at(text: &str, now: OffsetDateTime) -> Option<i64> {
    let text = text.trim();
    if text.is_empty() {
        return None;
    }
    if let Some(epoch) = parse_named(text, now) {
        return Some(epoch);
    }
    if (9..=10).contains(&text.len()) && text.bytes().all(|b| b.is_ascii_digit()) {
        return text.parse().ok();
    }
    parse_iso(text).or_else(|| parse_compact_date(text))
}

fn parse_named(text: &str, now: OffsetDateTime) -> Option<i64> {
    let start_of_day = now.replace_time(Time::MIDNIGHT).unix_timestamp();
    match text.to_ascii_lowercase().as_str() {
        "now" => Some(now.unix_timestamp()),
        "today" | "sod" => Some(start_of_day),
        "eod" => Some(start_of_day + DAY - 1),
        "tomorrow" => Some(start_of_day + DAY),
        "yesterday" => Some(start_of_day - DAY),
        _ => None,
    }
}

/// Strict ISO-8601 forms only; named dates and bare digits are not accepted here.
pub fn parse_iso(text: &str) -> Option<i64> {
    if let Ok(parsed) = OffsetDateTime::parse(text, &Rfc3339) {
        return Some(parsed.unix_timestamp());
    }
    if let Ok(parsed) = PrimitiveDateTime::parse(text, ISO_COMPACT) {
        return Some(parsed.assume_utc().unix_timestamp());
    }

    let body = text.strip_suffix('Z').unwrap_or(text);
    let extended: [&[FormatItem<'static>]; 2] = [
        format_description!("[year]-[month]-[day]T[hour]:[minute]:[second]"),
        format_description!("[year]-[month]-[day]T[hour]:[minute]"),
    ];
    for format in extended {
        if let Ok(parsed) = PrimitiveDateTime::parse(body, format) {
            return Some(parsed.assume_utc().unix_timestamp());
        }
    }
    Date::parse(text, format_description!("[year]-[month]-[day]"))
        .ok()
        .map(|date| date.midnight().assume_utc().unix_timestamp())
}

/// `YYYYMMDD`, only meaningful when the caller accepts ambiguous digits as a date.
pub fn parse_compact_date(text: &str) -> Option<i64> {
    if text.len() != 8 || !text.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    Date::parse(text, format_description!("[year][month][day]"))
        .ok()
        .map(|date| date.midnight().assume_utc().unix_timestamp())
}

pub fn parse_duration(text: &str) -> Option<i64> {
    let text = text.trim().to_ascii_lowercase();
    if let Some((_, seconds)) = NAMED_PERIODS.iter().find(|(name, _)| *name == text) {
        return Some(*seconds);
    }

    let split = text
        .find(|c: char| !(c.is_ascii_digit() || c == '.'))
        .unwrap_or(text.len());
    let (amount, unit) = text.split_at(split);
    if unit.is_empty() {
        return None;
    }
    let seconds = unit_seconds(unit)?;
    if amount.is_empty() {
        return Some(seconds);
    }
    let amount: f64 = amount.parse().ok()?;
    Some((amount * seconds as f64).round() as i64)
}

pub fn is_named_period(text: &str) -> bool {
    NAMED_PERIODS.iter().any(|(name, _)| *name == text)
}

pub fn unit_seconds(unit: &str) -> Option<i64> {
    DURATION_UNITS
        .iter()
        .find(|(name, _)| *name == unit)
        .map(|(_, seconds)| *seconds)
}

pub fn format_iso(epoch: i64) -> String {
    OffsetDateTime::from_unix_timestamp(epoch)
        .ok()
        .and_then(|value| value.format(ISO_COMPACT).ok())
        .unwrap_or_else(|| epoch.to_string())
}

pub fn format_display(epoch: i64) -> String {
    OffsetDateTime::from_unix_timestamp(epoch)
        .ok()
        .and_then(|value| value.format(DISPLAY).ok())
        .unwrap_or_else(|| epoch.to_string())
}

pub fn same_day(left: i64, right: i64) -> bool {
    left.div_euclid(DAY) == right.div_euclid(DAY)
}
