use std::{fmt::Display, sync::LazyLock};

use jiff::civil::Date;
use regex::Regex;
use serde::Serialize;

use crate::common::Record;

/// Composite key recognizing the same entity across runs: normalized title,
/// group and date, joined by `|`.
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize)]
#[serde(transparent)]
pub struct IdentityKey(String);

impl IdentityKey {
    /// Returns `None` when the record has no usable title.
    pub fn of(record: &Record) -> Option<IdentityKey> {
        if !record.has_title() {
            return None;
        }
        Some(IdentityKey(format!(
            "{}|{}|{}",
            normalize(Some(&record.title)),
            normalize(record.group.as_deref()),
            date_component(record.temporal.as_deref()),
        )))
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl Display for IdentityKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

pub(crate) fn normalize(field: Option<&str>) -> String {
    field.unwrap_or_default().trim().to_lowercase()
}

fn date_component(temporal: Option<&str>) -> String {
    match temporal.and_then(parse_date) {
        Some(date) => date.to_string(),
        None => normalize(temporal),
    }
}

static FOOTNOTE: LazyLock<Regex> = LazyLock::new(|| Regex::new(r"\[[^\]]*\]").unwrap());
static SEGMENT_SPLIT: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r";|[–—]|\s-\s").unwrap());

static ISO: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\d{4})-(\d{1,2})-(\d{1,2})\b").unwrap());
static SLASHED: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\d{1,2})/(\d{1,2})/(\d{4})\b").unwrap());
static MONTH_DAY_YEAR: LazyLock<Regex> = LazyLock::new(|| {
    Regex::new(r"\b([A-Za-z]{3,9})\.?\s+(\d{1,2})(?:st|nd|rd|th)?,?\s+(\d{4})\b").unwrap()
});
static DAY_MONTH_YEAR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b(\d{1,2})\s+([A-Za-z]{3,9})\.?,?\s+(\d{4})\b").unwrap());
static MONTH_YEAR: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"\b([A-Za-z]{3,9})\.?,?\s+(\d{4})\b").unwrap());
// a bare year, not part of a numeric date
static YEAR_ONLY: LazyLock<Regex> =
    LazyLock::new(|| Regex::new(r"(?:^|[^\d/-])(\d{4})(?:$|[^\d/-])").unwrap());

/// Parses the first calendar date found in free text.
///
/// Multiple dates or ranges (split on `;` or a dash) resolve to the first
/// segment that holds a valid date. Within a segment the earliest match
/// wins; a longer form wins over a shorter one at the same position. A bare
/// year is the last resort and maps to January 1.
pub fn parse_date(text: &str) -> Option<Date> {
    let cleaned = FOOTNOTE.replace_all(text, " ");
    SEGMENT_SPLIT
        .split(&cleaned)
        .find_map(|segment| first_date_in(segment.trim()))
}

fn first_date_in(segment: &str) -> Option<Date> {
    if segment.is_empty() {
        return None;
    }
    let mut best: Option<(usize, Date)> = None;
    let mut consider = |start: usize, date: Option<Date>| {
        if let Some(date) = date {
            if best.map_or(true, |(at, _)| start < at) {
                best = Some((start, date));
            }
        }
    };

    for c in ISO.captures_iter(segment) {
        consider(
            c.get(0).map_or(0, |m| m.start()),
            ymd(&c[1], Some(&c[2]), Some(&c[3])),
        );
    }
    for c in SLASHED.captures_iter(segment) {
        consider(
            c.get(0).map_or(0, |m| m.start()),
            ymd(&c[3], Some(&c[1]), Some(&c[2])),
        );
    }
    for c in MONTH_DAY_YEAR.captures_iter(segment) {
        let month = month_number(&c[1]).map(|m| m.to_string());
        consider(
            c.get(0).map_or(0, |m| m.start()),
            month.and_then(|m| ymd(&c[3], Some(m.as_str()), Some(&c[2]))),
        );
    }
    for c in DAY_MONTH_YEAR.captures_iter(segment) {
        let month = month_number(&c[2]).map(|m| m.to_string());
        consider(
            c.get(0).map_or(0, |m| m.start()),
            month.and_then(|m| ymd(&c[3], Some(m.as_str()), Some(&c[1]))),
        );
    }
    for c in MONTH_YEAR.captures_iter(segment) {
        let month = month_number(&c[1]).map(|m| m.to_string());
        consider(
            c.get(0).map_or(0, |m| m.start()),
            month.and_then(|m| ymd(&c[2], Some(m.as_str()), None)),
        );
    }

    best.map(|(_, date)| date).or_else(|| {
        YEAR_ONLY
            .captures(segment)
            .and_then(|c| ymd(&c[1], None, None))
    })
}

fn ymd(year: &str, month: Option<&str>, day: Option<&str>) -> Option<Date> {
    let year: i16 = year.parse().ok()?;
    let month: i8 = month.unwrap_or("1").parse().ok()?;
    let day: i8 = day.unwrap_or("1").parse().ok()?;
    Date::new(year, month, day).ok()
}

fn month_number(name: &str) -> Option<i8> {
    const MONTHS: [&str; 12] = [
        "january",
        "february",
        "march",
        "april",
        "may",
        "june",
        "july",
        "august",
        "september",
        "october",
        "november",
        "december",
    ];
    let name = name.to_ascii_lowercase();
    if name == "sept" {
        return Some(9);
    }
    MONTHS
        .iter()
        .position(|full| *full == name || (name.len() == 3 && full.starts_with(&name)))
        .map(|i| i as i8 + 1)
}
