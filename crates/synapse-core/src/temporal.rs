//! Temporal expression parsing and time-based score boosting.
//!
//! [`parse_at`] scans a free-text query for a date reference and returns a
//! [`TimeIntent`]. Recognizers run in a fixed order and the first one that
//! yields a valid date wins:
//!
//! 1. Ordinal day with month name, either order (`8th november`, `november 8th`).
//! 2. Numeric dates (`2024-11-08`, `2024/11/08`, `11/08/2024`, `11-08-2024`).
//! 3. Bare day with month name (`8 november`).
//! 4. Relative keywords (`today`, `yesterday`, `last week`, `last month`,
//!    `this month`, `this week`).
//! 5. Weekday expressions (`next friday`, `last monday`, `this sunday`).
//!
//! Month-name dates resolve into the year of `now`. Weeks start on Sunday.
//! All dates are UTC.
//!
//! [`time_boost`] turns an intent into a multiplicative weight for a
//! content item. It never filters: an item outside the window is demoted,
//! not dropped.

use chrono::{DateTime, Datelike, Duration, Months, NaiveDate, TimeZone, Utc};
use once_cell::sync::Lazy;
use regex::Regex;
use serde::Serialize;

use crate::models::ContentItem;

/// Weight for an item created on the exact day a query names.
pub const EXACT_MATCH_BOOST: f64 = 2.5;
/// Weight for an item outside the exact day a query names.
pub const EXACT_MISS_BOOST: f64 = 0.3;
/// Weight for an item inside a named range.
pub const RANGE_MATCH_BOOST: f64 = 2.0;
/// Weight for an item outside a named range.
pub const RANGE_MISS_BOOST: f64 = 0.4;
/// Extra factor applied to matches when the query says "saved on", "from", etc.
pub const CONTEXT_MULTIPLIER: f64 = 1.5;

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

const WEEKDAYS: [&str; 7] = [
    "sunday",
    "monday",
    "tuesday",
    "wednesday",
    "thursday",
    "friday",
    "saturday",
];

const CONTEXT_WORDS: [&str; 7] = ["saved", "created", "added", "from", "on", "at", "in"];

const MONTH_ALTERNATION: &str =
    "january|february|march|april|may|june|july|august|september|october|november|december";

static ORDINAL_MONTH: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(
        r"\b(\d{{1,2}})(?:st|nd|rd|th)?\s+(?:of\s+)?({m})\b|\b({m})\s+(\d{{1,2}})(?:st|nd|rd|th)?\b",
        m = MONTH_ALTERNATION
    ))
    .expect("Failed to compile ordinal month regex")
});

static NUMERIC_DATE: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(\d{4})[-/](\d{1,2})[-/](\d{1,2})\b|\b(\d{1,2})[-/](\d{1,2})[-/](\d{4})\b")
        .expect("Failed to compile numeric date regex")
});

static DAY_MONTH: Lazy<Regex> = Lazy::new(|| {
    Regex::new(&format!(r"\b(\d{{1,2}})\s+({})\b", MONTH_ALTERNATION))
        .expect("Failed to compile day month regex")
});

static WEEKDAY_EXPR: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"\b(next|last|this)\s+(sunday|monday|tuesday|wednesday|thursday|friday|saturday)\b")
        .expect("Failed to compile weekday regex")
});

/// The time window a query refers to.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(tag = "kind", rename_all = "lowercase")]
pub enum TimeWindow {
    /// A single calendar day.
    Exact { date: DateTime<Utc> },
    /// An inclusive interval.
    Range {
        start: DateTime<Utc>,
        end: DateTime<Utc>,
    },
}

/// A parsed temporal reference.
#[derive(Debug, Clone, PartialEq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct TimeIntent {
    #[serde(flatten)]
    pub window: TimeWindow,
    /// The query frames the date as a capture time ("saved on", "from", ...).
    pub has_explicit_date_context: bool,
}

impl TimeIntent {
    /// Multiplicative weight for content created at `created_at`.
    pub fn boost_for(&self, created_at: DateTime<Utc>) -> f64 {
        let context = if self.has_explicit_date_context {
            CONTEXT_MULTIPLIER
        } else {
            1.0
        };
        match &self.window {
            TimeWindow::Exact { date } => {
                if date.date_naive() == created_at.date_naive() {
                    EXACT_MATCH_BOOST * context
                } else {
                    EXACT_MISS_BOOST
                }
            }
            TimeWindow::Range { start, end } => {
                if created_at >= *start && created_at <= *end {
                    RANGE_MATCH_BOOST * context
                } else {
                    RANGE_MISS_BOOST
                }
            }
        }
    }
}

/// Boost for `item` under `intent`; `1.0` when there is no intent.
pub fn time_boost(item: &ContentItem, intent: Option<&TimeIntent>) -> f64 {
    match intent {
        Some(intent) => intent.boost_for(item.created_at),
        None => 1.0,
    }
}

/// Parse `query` relative to the current time.
pub fn parse(query: &str) -> Option<TimeIntent> {
    parse_at(query, Utc::now())
}

/// Parse `query` relative to `now`.
pub fn parse_at(query: &str, now: DateTime<Utc>) -> Option<TimeIntent> {
    let lower = query.to_lowercase();
    let window = ordinal_month(&lower, now)
        .or_else(|| numeric_date(query))
        .or_else(|| day_month(&lower, now))
        .or_else(|| relative_keyword(&lower, now))
        .or_else(|| weekday_expression(&lower, now))?;

    Some(TimeIntent {
        window,
        has_explicit_date_context: has_date_context(&lower),
    })
}

fn has_date_context(lower: &str) -> bool {
    lower
        .split(|c: char| !c.is_alphanumeric())
        .any(|word| CONTEXT_WORDS.contains(&word))
}

fn month_number(name: &str) -> Option<u32> {
    MONTHS.iter().position(|m| *m == name).map(|i| i as u32 + 1)
}

fn start_of_day(date: NaiveDate) -> Option<DateTime<Utc>> {
    date.and_hms_opt(0, 0, 0)
        .map(|naive| Utc.from_utc_datetime(&naive))
}

fn exact_day(year: i32, month: u32, day: u32) -> Option<TimeWindow> {
    if !(1..=31).contains(&day) {
        return None;
    }
    let date = NaiveDate::from_ymd_opt(year, month, day)?;
    start_of_day(date).map(|date| TimeWindow::Exact { date })
}

fn ordinal_month(lower: &str, now: DateTime<Utc>) -> Option<TimeWindow> {
    let caps = ORDINAL_MONTH.captures(lower)?;
    let (day, month) = match (caps.get(1), caps.get(2)) {
        (Some(day), Some(month)) => (day.as_str(), month.as_str()),
        _ => (caps.get(4)?.as_str(), caps.get(3)?.as_str()),
    };
    exact_day(now.year(), month_number(month)?, day.parse().ok()?)
}

fn numeric_date(raw: &str) -> Option<TimeWindow> {
    let caps = NUMERIC_DATE.captures(raw)?;
    let field = |i: usize| caps.get(i).and_then(|m| m.as_str().parse::<u32>().ok());
    if let (Some(year), Some(month), Some(day)) = (field(1), field(2), field(3)) {
        return exact_day(year as i32, month, day);
    }
    let (month, day, year) = (field(4)?, field(5)?, field(6)?);
    exact_day(year as i32, month, day)
}

fn day_month(lower: &str, now: DateTime<Utc>) -> Option<TimeWindow> {
    let caps = DAY_MONTH.captures(lower)?;
    let day: u32 = caps.get(1)?.as_str().parse().ok()?;
    exact_day(now.year(), month_number(caps.get(2)?.as_str())?, day)
}

fn relative_keyword(lower: &str, now: DateTime<Utc>) -> Option<TimeWindow> {
    if lower.contains("today") {
        return Some(TimeWindow::Exact { date: now });
    }
    if lower.contains("yesterday") {
        return Some(TimeWindow::Exact {
            date: now - Duration::days(1),
        });
    }
    if lower.contains("last week") {
        return Some(TimeWindow::Exact {
            date: now - Duration::days(7),
        });
    }
    if lower.contains("last month") {
        let date = now
            .checked_sub_months(Months::new(1))
            .unwrap_or(now - Duration::days(30));
        return Some(TimeWindow::Exact { date });
    }
    if lower.contains("this month") {
        let start = start_of_day(now.date_naive().with_day(1)?)?;
        return Some(TimeWindow::Range { start, end: now });
    }
    if lower.contains("this week") {
        let back = now.weekday().num_days_from_sunday() as i64;
        let start = start_of_day(now.date_naive() - Duration::days(back))?;
        return Some(TimeWindow::Range { start, end: now });
    }
    None
}

fn weekday_expression(lower: &str, now: DateTime<Utc>) -> Option<TimeWindow> {
    let caps = WEEKDAY_EXPR.captures(lower)?;
    let name = caps.get(2)?.as_str();
    let target = WEEKDAYS.iter().position(|d| *d == name)? as i64;
    let current = now.weekday().num_days_from_sunday() as i64;

    let offset = match caps.get(1)?.as_str() {
        "next" => match (target - current).rem_euclid(7) {
            0 => 7,
            ahead => ahead,
        },
        "last" => match (current - target).rem_euclid(7) {
            0 => -7,
            back => -back,
        },
        _ => target - current,
    };

    Some(TimeWindow::Exact {
        date: now + Duration::days(offset),
    })
}
