//! Reset phrase resolution.
//!
//! A phrase such as `6:59pm (Europe/Paris)` or `Jan 29 at 6pm` is cleaned,
//! parsed into a candidate instant, then projected forward so that it lands
//! inside its usage window. A phrase that cannot be placed inside the window
//! resolves to nothing rather than to a wrong instant.

use chrono::format::{parse, Parsed, StrftimeItems};
use chrono::{Datelike, Duration, Months, NaiveDate, NaiveDateTime, NaiveTime};
use once_cell::sync::Lazy;
use regex::Regex;

use crate::config::{FormatList, FormatTunables};

/// How far in the past a candidate may lie before it is rolled forward
pub const PAST_GRACE_MINUTES: i64 = 15;

/// Slack past the window length a resolved instant may lie
pub const WINDOW_TOLERANCE_HOURS: i64 = 1;

static PARENTHETICAL: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s*\(.*?\)").unwrap());
static WHITESPACE: Lazy<Regex> = Lazy::new(|| Regex::new(r"\s+").unwrap());
static TRAILING_MERIDIEM: Lazy<Regex> = Lazy::new(|| Regex::new(r"(?i)(am|pm)$").unwrap());
static SPACED_MERIDIEM: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"(?i)\b(\d{1,2}(?::\d{2})?)\s+(am|pm)\b").unwrap());
static TIME_12H: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{1,2})(?::(\d{2}))?(am|pm)$").unwrap());
static TIME_24H: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\d{1,2}):(\d{2})$").unwrap());
static ISO_DATE: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\d{4})-(\d{1,2})-(\d{1,2})$").unwrap());
static DAY_NUMBER: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"^(\d{1,2})(?:st|nd|rd|th)?$").unwrap());
static YEAR_NUMBER: Lazy<Regex> = Lazy::new(|| Regex::new(r"^(\d{4})$").unwrap());
/// Relative durations ("in 30 min", "2h") are not calendar positions
static RELATIVE_UNIT: Lazy<Regex> = Lazy::new(|| {
    Regex::new(r"^\d*(?:s|secs?|seconds?|m|mins?|minutes?|h|hrs?|hours?|d|days?|w|wks?|weeks?)$")
        .unwrap()
});

const MONTHS: [&str; 12] = [
    "jan", "feb", "mar", "apr", "may", "jun", "jul", "aug", "sep", "oct", "nov", "dec",
];

/// What a parsed candidate actually pinned down
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CandidateKind {
    /// Only a time of day; the date is today's
    TimeOfDay,
    /// Full calendar date with an explicit year
    Calendar,
    /// Month and day given, year taken from "now"
    YearInferred,
}

/// A parsed but not yet projected reset instant
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct Candidate {
    pub at: NaiveDateTime,
    pub kind: CandidateKind,
}

/// Why a phrase did not resolve
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Unresolved {
    /// No parser understood the phrase
    Unparseable,
    /// The phrase parsed, but no projection of it fits the window
    Stale(NaiveDateTime),
}

/// Normalize a raw phrase for parsing.
///
/// Drops parenthetical notes such as time zones, commas and non-printable
/// characters, collapses whitespace and upper-cases a trailing am/pm.
pub fn clean_phrase(phrase: &str) -> String {
    let text = PARENTHETICAL.replace_all(phrase, "");
    let text: String = text
        .chars()
        .filter(|c| *c != ',' && (c.is_whitespace() || !c.is_control()))
        .collect();
    let text = WHITESPACE.replace_all(text.trim(), " ");
    TRAILING_MERIDIEM
        .replace(&text, |caps: &regex::Captures| caps[1].to_uppercase())
        .into_owned()
}

/// Resolve a phrase to an absolute instant inside its window
pub fn resolve(
    phrase: &str,
    window_hours: i64,
    now: NaiveDateTime,
    formats: &FormatTunables,
) -> Option<NaiveDateTime> {
    resolve_detailed(phrase, window_hours, now, formats).ok()
}

/// Like [`resolve`], but says whether the phrase was unparseable or stale
pub fn resolve_detailed(
    phrase: &str,
    window_hours: i64,
    now: NaiveDateTime,
    formats: &FormatTunables,
) -> Result<NaiveDateTime, Unresolved> {
    let clean = clean_phrase(phrase);
    if clean.is_empty() {
        return Err(Unresolved::Unparseable);
    }

    let candidate = fuzzy_parse(&clean, now)
        .or_else(|| parse_with_formats(&clean, now, formats))
        .ok_or(Unresolved::Unparseable)?;

    project_forward(candidate, window_hours, now).ok_or(Unresolved::Stale(candidate.at))
}

/// Place a candidate inside `(now - 15min, now + window + 1h]`.
///
/// Candidates more than the grace period in the past are rolled forward: one
/// day for windows up to 24h, otherwise by the following year (year-inferred
/// dates only) and then one to seven days.
pub fn project_forward(
    candidate: Candidate,
    window_hours: i64,
    now: NaiveDateTime,
) -> Option<NaiveDateTime> {
    let limit = now + Duration::hours(window_hours + WINDOW_TOLERANCE_HOURS);
    let at = candidate.at;

    if at >= now - Duration::minutes(PAST_GRACE_MINUTES) {
        return (at <= limit).then_some(at);
    }

    let fits = |c: &NaiveDateTime| *c > now && *c <= limit;

    if window_hours <= 24 {
        return Some(at + Duration::days(1)).filter(fits);
    }

    if candidate.kind == CandidateKind::YearInferred {
        if let Some(next_year) = at.checked_add_months(Months::new(12)).filter(fits) {
            return Some(next_year);
        }
    }

    (1..=7)
        .map(|days| at + Duration::days(days))
        .find(fits)
}

/// Lenient parser: picks month names, day numbers, years, ISO dates and
/// times out of the phrase and ignores every other word.
///
/// Missing date parts default to `now`, a missing time to midnight. Returns
/// `None` when nothing date-like is found, when a part appears twice, or
/// when the parts do not form a valid date.
pub fn fuzzy_parse(clean: &str, now: NaiveDateTime) -> Option<Candidate> {
    let joined = SPACED_MERIDIEM.replace_all(clean, "$1$2").to_lowercase();

    let mut year: Option<i32> = None;
    let mut month: Option<u32> = None;
    let mut day: Option<u32> = None;
    let mut time: Option<NaiveTime> = None;

    for raw in joined.split_whitespace() {
        let token = raw.trim_matches(|c: char| c == '.' || c == ';');
        if RELATIVE_UNIT.is_match(token) {
            return None;
        }

        if let Some(t) = parse_time_token(token) {
            set_once(&mut time, t)?;
        } else if let Some(caps) = ISO_DATE.captures(token) {
            set_once(&mut year, caps[1].parse().ok()?)?;
            set_once(&mut month, caps[2].parse().ok()?)?;
            set_once(&mut day, caps[3].parse().ok()?)?;
        } else if let Some(m) = month_number(token) {
            set_once(&mut month, m)?;
        } else if let Some(caps) = YEAR_NUMBER.captures(token) {
            set_once(&mut year, caps[1].parse().ok()?)?;
        } else if let Some(caps) = DAY_NUMBER.captures(token) {
            let d: u32 = caps[1].parse().ok()?;
            if (1..=31).contains(&d) {
                set_once(&mut day, d)?;
            }
        }
    }

    if year.is_none() && month.is_none() && day.is_none() && time.is_none() {
        return None;
    }

    let kind = if year.is_none() && month.is_none() && day.is_none() {
        CandidateKind::TimeOfDay
    } else if year.is_some() {
        CandidateKind::Calendar
    } else {
        CandidateKind::YearInferred
    };

    let date = NaiveDate::from_ymd_opt(
        year.unwrap_or_else(|| now.year()),
        month.unwrap_or_else(|| now.month()),
        day.unwrap_or_else(|| now.day()),
    )?;

    Some(Candidate {
        at: date.and_time(time.unwrap_or(NaiveTime::MIN)),
        kind,
    })
}

/// Try the explicit format lists: dated formats first, then time-only
pub fn parse_with_formats(
    clean: &str,
    now: NaiveDateTime,
    formats: &FormatTunables,
) -> Option<Candidate> {
    let dated = [
        (FormatList::DateWithYear, CandidateKind::Calendar),
        (FormatList::DateNoYear, CandidateKind::YearInferred),
    ];
    for (list, kind) in dated {
        for fmt in formats.list(list) {
            if let Some(at) = parse_dated(clean, fmt, now.year()) {
                return Some(Candidate { at, kind });
            }
        }
    }

    formats
        .list(FormatList::TimeOnly)
        .iter()
        .find_map(|fmt| parse_time_only(clean, fmt))
        .map(|t| Candidate {
            at: now.date().and_time(t),
            kind: CandidateKind::TimeOfDay,
        })
}

/// Parse a dated format, filling a missing year and minute
pub fn parse_dated(text: &str, fmt: &str, default_year: i32) -> Option<NaiveDateTime> {
    let mut parsed = Parsed::new();
    parse(&mut parsed, text, StrftimeItems::new(fmt)).ok()?;
    // set_* keeps an already parsed value
    let _ = parsed.set_year(i64::from(default_year));
    let _ = parsed.set_minute(0);
    let date = parsed.to_naive_date().ok()?;
    let time = parsed.to_naive_time().ok()?;
    Some(date.and_time(time))
}

/// Parse a time-only format, filling a missing minute
pub fn parse_time_only(text: &str, fmt: &str) -> Option<NaiveTime> {
    let mut parsed = Parsed::new();
    parse(&mut parsed, text, StrftimeItems::new(fmt)).ok()?;
    let _ = parsed.set_minute(0);
    parsed.to_naive_time().ok()
}

fn parse_time_token(token: &str) -> Option<NaiveTime> {
    if let Some(caps) = TIME_12H.captures(token) {
        let hour: u32 = caps[1].parse().ok()?;
        let minute: u32 = caps.get(2).map_or(Some(0), |m| m.as_str().parse().ok())?;
        if !(1..=12).contains(&hour) {
            return None;
        }
        let hour = match (&caps[3], hour) {
            ("am", 12) => 0,
            ("am", h) => h,
            ("pm", 12) => 12,
            (_, h) => h + 12,
        };
        return NaiveTime::from_hms_opt(hour, minute, 0);
    }
    if let Some(caps) = TIME_24H.captures(token) {
        return NaiveTime::from_hms_opt(caps[1].parse().ok()?, caps[2].parse().ok()?, 0);
    }
    None
}

fn month_number(token: &str) -> Option<u32> {
    if token.len() < 3 || !token.chars().all(|c| c.is_ascii_alphabetic()) {
        return None;
    }
    let idx = MONTHS.iter().position(|m| token.starts_with(m))?;
    let full = chrono::Month::try_from(u8::try_from(idx + 1).ok()?)
        .ok()?
        .name()
        .to_lowercase();
    let accepted = token.len() == 3 || full.starts_with(token) || token == "sept";
    accepted.then_some(idx as u32 + 1)
}

fn set_once<T>(slot: &mut Option<T>, value: T) -> Option<()> {
    if slot.is_some() {
        return None;
    }
    *slot = Some(value);
    Some(())
}
