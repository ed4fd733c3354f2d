//! Semantic checks on a [`ParseResult`].

use chrono::{Duration, NaiveDateTime};

use crate::config::ValidationTunables;
use crate::error::UsageError;
use crate::parse::{ParseResult, UsageWindow};

/// Reject results that are incomplete, out of range or temporally impossible.
///
/// A result carrying a parse error fails with that error before any other
/// check runs.
pub fn validate(
    result: &ParseResult,
    now: NaiveDateTime,
    tunables: &ValidationTunables,
) -> Result<(), UsageError> {
    if let Some(ref error) = result.error {
        return Err(UsageError::Parse(error.clone()));
    }

    for window in [UsageWindow::Session, UsageWindow::Week] {
        if result.reading(window).percent.is_none() {
            return Err(UsageError::Validation(format!(
                "{} percentage missing",
                window
            )));
        }
    }

    for window in [UsageWindow::Session, UsageWindow::Week] {
        if let Some(percent) = result.reading(window).percent {
            if percent > 100 {
                return Err(UsageError::Validation(format!(
                    "{} percent {} out of range",
                    window, percent
                )));
            }
        }
    }

    for window in [UsageWindow::Session, UsageWindow::Week] {
        if let Some(reset_at) = result.reading(window).reset_at {
            check_reset(window, reset_at, now, tunables)?;
        }
    }

    Ok(())
}

fn check_reset(
    window: UsageWindow,
    reset_at: NaiveDateTime,
    now: NaiveDateTime,
    tunables: &ValidationTunables,
) -> Result<(), UsageError> {
    if reset_at < now - Duration::minutes(tunables.past_tolerance_mins) {
        return Err(UsageError::Validation(format!(
            "{} reset {} is in past",
            window, reset_at
        )));
    }

    let hours_away = (reset_at - now).num_seconds() as f64 / 3600.0;
    let max_hours = (window.hours() + tunables.window_buffer_hours) as f64;
    if hours_away > max_hours {
        return Err(UsageError::Validation(format!(
            "{} reset {:.1}h away exceeds window",
            window, hours_away
        )));
    }
    Ok(())
}
