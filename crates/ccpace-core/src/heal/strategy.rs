//! Fix catalog: which strategies answer which failure category, and how each
//! one turns the current tunables into a [`Fix`].

use std::fmt;

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use tracing::debug;

use super::classify::FailureCategory;
use super::fix::{Fix, Patch};
use super::infer::infer_date_format;
use crate::config::{TunableKey, TunableValue, Tunables};
use crate::parse::{normalize, Unresolved, UsageParser, UsageWindow};

const TIMEOUT_STEP_SECS: i64 = 5;
const RETRY_STEP: i64 = 1;
const MIN_SECTION_SETTLE_MS: i64 = 500;
const MARKER_SETTLE_STEP_MS: i64 = 1000;
const VALIDATION_BUFFER_STEP_HOURS: i64 = 1;

/// Reset token tolerant of heavier corruption ("Rest", "Rsets", ...)
pub const RELAXED_RESET_TOKEN: &str = r"Rese[ts]*|R\w{2,4}s";

/// Percent patterns tolerant of spacing around the percent sign
pub const BROAD_PERCENT_USED: &str = r"(\d+)\s*%\s*used";
pub const BROAD_PERCENT_TOKEN: &str = r"(\d+)\s*%";

/// What a strategy may look at besides the tunables
#[derive(Debug, Clone, Copy)]
pub struct FailureContext<'a> {
    /// Raw output of the failed sample
    pub raw: &'a str,
    pub now: NaiveDateTime,
}

/// A named healing strategy
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Strategy {
    IncrementTimeout,
    AddRetryAttempt,
    ExtendWaitTime,
    AddSectionWait,
    RelaxResetPattern,
    BroadenPercentagePattern,
    AddDateFormat,
    IncreaseValidationBuffer,
}

/// Ordered strategies for a category
pub fn strategies_for(category: FailureCategory) -> &'static [Strategy] {
    use Strategy::*;

    match category {
        FailureCategory::CaptureTimeout => &[IncrementTimeout, AddRetryAttempt],
        FailureCategory::CaptureIncomplete => &[ExtendWaitTime, AddSectionWait],
        FailureCategory::SectionMissing => &[RelaxResetPattern, AddSectionWait],
        FailureCategory::PercentageUnparseable => &[BroadenPercentagePattern],
        FailureCategory::DateUnparseable => &[AddDateFormat],
        FailureCategory::ValidationFailed => &[IncreaseValidationBuffer],
        FailureCategory::Unknown => &[],
    }
}

impl Strategy {
    pub fn name(&self) -> &'static str {
        match self {
            Strategy::IncrementTimeout => "increment_timeout",
            Strategy::AddRetryAttempt => "add_retry_attempt",
            Strategy::ExtendWaitTime => "extend_wait_time",
            Strategy::AddSectionWait => "add_section_wait",
            Strategy::RelaxResetPattern => "relax_reset_pattern",
            Strategy::BroadenPercentagePattern => "broaden_percentage_pattern",
            Strategy::AddDateFormat => "add_date_format",
            Strategy::IncreaseValidationBuffer => "increase_validation_buffer",
        }
    }

    /// Build the fix this strategy would apply to `tunables`.
    ///
    /// `None` means the strategy has nothing to change (the tunables already
    /// carry its adjustment, or the failure gives it nothing to learn from).
    pub fn materialize(&self, tunables: &Tunables, ctx: &FailureContext<'_>) -> Option<Fix> {
        match self {
            Strategy::IncrementTimeout => step(
                tunables,
                *self,
                TunableKey::CaptureTimeoutSecs,
                |v| v + TIMEOUT_STEP_SECS,
                |from, to| format!("Increase capture timeout from {}s to {}s", from, to),
            ),
            Strategy::AddRetryAttempt => step(
                tunables,
                *self,
                TunableKey::CaptureMaxRetries,
                |v| v + RETRY_STEP,
                |from, to| format!("Increase capture retries from {} to {}", from, to),
            ),
            Strategy::ExtendWaitTime => step(
                tunables,
                *self,
                TunableKey::SectionSettleMs,
                |v| v.saturating_mul(2).max(MIN_SECTION_SETTLE_MS),
                |from, to| format!("Extend section settle delay from {}ms to {}ms", from, to),
            ),
            Strategy::AddSectionWait => step(
                tunables,
                *self,
                TunableKey::MarkerSettleMs,
                |v| v + MARKER_SETTLE_STEP_MS,
                |from, to| format!("Extend marker settle delay from {}ms to {}ms", from, to),
            ),
            Strategy::IncreaseValidationBuffer => step(
                tunables,
                *self,
                TunableKey::WindowBufferHours,
                |v| v + VALIDATION_BUFFER_STEP_HOURS,
                |from, to| format!("Widen validation window buffer from {}h to {}h", from, to),
            ),
            Strategy::RelaxResetPattern => {
                let patch = replace_text(tunables, TunableKey::ResetToken, RELAXED_RESET_TOKEN)?;
                Some(Fix::new(
                    self.name(),
                    "Relax reset token pattern",
                    vec![patch],
                ))
            }
            Strategy::BroadenPercentagePattern => {
                let patches: Vec<Patch> = [
                    (TunableKey::PercentUsedPattern, BROAD_PERCENT_USED),
                    (TunableKey::PercentTokenPattern, BROAD_PERCENT_TOKEN),
                ]
                .into_iter()
                .filter_map(|(key, to)| replace_text(tunables, key, to))
                .collect();
                if patches.is_empty() {
                    return None;
                }
                Some(Fix::new(
                    self.name(),
                    "Broaden percentage patterns to allow spaces around %",
                    patches,
                ))
            }
            Strategy::AddDateFormat => learn_date_format(tunables, ctx),
        }
    }
}

impl fmt::Display for Strategy {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Integer tunable moved by `next`; `None` when it would not change
fn step(
    tunables: &Tunables,
    strategy: Strategy,
    key: TunableKey,
    next: impl Fn(i64) -> i64,
    describe: impl Fn(i64, i64) -> String,
) -> Option<Fix> {
    let from = tunables.get(key).as_integer()?;
    let to = next(from);
    if to == from {
        return None;
    }
    Some(Fix::new(
        strategy.name(),
        describe(from, to),
        vec![Patch::Set {
            key,
            from: TunableValue::Integer(from),
            to: TunableValue::Integer(to),
        }],
    ))
}

fn replace_text(tunables: &Tunables, key: TunableKey, to: &str) -> Option<Patch> {
    let from = tunables.get(key);
    if from.as_text() == Some(to) {
        return None;
    }
    Some(Patch::Set {
        key,
        from,
        to: TunableValue::Text(to.to_string()),
    })
}

/// Learn a format from the first reset phrase nothing can parse
fn learn_date_format(tunables: &Tunables, ctx: &FailureContext<'_>) -> Option<Fix> {
    let parser = UsageParser::new(tunables).ok()?;
    let text = normalize(ctx.raw);
    let phrases = parser.reset_phrases(&text);

    // A phrase that already parses gains nothing from a new format
    let phrase = phrases.iter().find(|p| {
        matches!(
            parser.resolve(p, UsageWindow::Session, ctx.now),
            Err(Unresolved::Unparseable)
        )
    })?;
    format_fix(tunables, phrase)
}

/// Fix adding the inferred format for `phrase`, unless already known
fn format_fix(tunables: &Tunables, phrase: &str) -> Option<Fix> {
    let Some((list, format)) = infer_date_format(phrase) else {
        debug!("No known shape for reset phrase '{}'", phrase);
        return None;
    };
    if tunables.formats.contains(list, &format) {
        debug!("Format '{}' already known", format);
        return None;
    }

    Some(Fix::new(
        Strategy::AddDateFormat.name(),
        format!("Add date format '{}' for '{}'", format, phrase),
        vec![Patch::AddFormat { list, format }],
    ))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::{FormatList, TunablesStore};
    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;

    fn ctx(raw: &str) -> FailureContext<'_> {
        FailureContext {
            raw,
            now: NaiveDate::from_ymd_opt(2026, 1, 29)
                .unwrap()
                .and_hms_opt(14, 0, 0)
                .unwrap(),
        }
    }

    #[test]
    fn test_catalog_order() {
        assert_eq!(
            strategies_for(FailureCategory::CaptureTimeout),
            &[Strategy::IncrementTimeout, Strategy::AddRetryAttempt]
        );
        assert_eq!(
            strategies_for(FailureCategory::SectionMissing),
            &[Strategy::RelaxResetPattern, Strategy::AddSectionWait]
        );
        assert!(strategies_for(FailureCategory::Unknown).is_empty());
    }

    #[test]
    fn test_numeric_steps() {
        let t = Tunables::default();
        let c = ctx("");

        let fix = Strategy::IncrementTimeout.materialize(&t, &c).unwrap();
        assert_eq!(fix.name, "increment_timeout");
        assert_eq!(fix.description, "Increase capture timeout from 20s to 25s");

        let mut patched = t.clone();
        Strategy::AddRetryAttempt
            .materialize(&t, &c)
            .unwrap()
            .apply(&mut patched)
            .unwrap();
        Strategy::ExtendWaitTime
            .materialize(&t, &c)
            .unwrap()
            .apply(&mut patched)
            .unwrap();
        Strategy::AddSectionWait
            .materialize(&t, &c)
            .unwrap()
            .apply(&mut patched)
            .unwrap();
        Strategy::IncreaseValidationBuffer
            .materialize(&t, &c)
            .unwrap()
            .apply(&mut patched)
            .unwrap();

        assert_eq!(patched.capture.max_retries, 4);
        assert_eq!(patched.capture.section_settle_ms, 1000);
        assert_eq!(patched.capture.marker_settle_ms, 3000);
        assert_eq!(patched.validation.window_buffer_hours, 2);
    }

    const ALL: [Strategy; 8] = [
        Strategy::IncrementTimeout,
        Strategy::AddRetryAttempt,
        Strategy::ExtendWaitTime,
        Strategy::AddSectionWait,
        Strategy::RelaxResetPattern,
        Strategy::BroadenPercentagePattern,
        Strategy::AddDateFormat,
        Strategy::IncreaseValidationBuffer,
    ];

    /// A fix from every strategy; date formats need a phrase that fits a shape
    fn fix_for(strategy: Strategy, t: &Tunables) -> Fix {
        match strategy {
            Strategy::AddDateFormat => format_fix(t, "Feb 3 2026 at 9:30 am"),
            Strategy::IncrementTimeout
            | Strategy::AddRetryAttempt
            | Strategy::ExtendWaitTime
            | Strategy::AddSectionWait
            | Strategy::RelaxResetPattern
            | Strategy::BroadenPercentagePattern
            | Strategy::IncreaseValidationBuffer => strategy.materialize(t, &ctx("")),
        }
        .unwrap_or_else(|| panic!("{} produced no fix", strategy))
    }

    #[test]
    fn test_every_fix_rolls_back_exactly() {
        let mut tuned = Tunables::default();
        tuned.capture.timeout_secs = 40;
        tuned.capture.section_settle_ms = 0;
        tuned.formats.time_only.push("%H:%M".into());

        for original in [Tunables::default(), tuned] {
            let rendered = TunablesStore::render(&original).unwrap();
            for strategy in ALL {
                let fix = fix_for(strategy, &original);
                let mut t = original.clone();
                fix.apply(&mut t).unwrap();
                assert_ne!(t, original, "{} changed nothing", strategy);

                fix.rollback(&mut t).unwrap();
                assert_eq!(t, original, "{}", strategy);
                assert_eq!(TunablesStore::render(&t).unwrap(), rendered, "{}", strategy);
            }
        }
    }

    #[test]
    fn test_extend_wait_from_zero() {
        let mut t = Tunables::default();
        t.capture.section_settle_ms = 0;
        let fix = Strategy::ExtendWaitTime.materialize(&t, &ctx("")).unwrap();
        fix.apply(&mut t).unwrap();
        assert_eq!(t.capture.section_settle_ms, 500);
    }

    #[test]
    fn test_pattern_fixes_skip_when_already_applied() {
        let mut t = Tunables::default();
        let relax = Strategy::RelaxResetPattern.materialize(&t, &ctx("")).unwrap();
        relax.apply(&mut t).unwrap();
        assert_eq!(t.patterns.reset_token, RELAXED_RESET_TOKEN);
        assert!(Strategy::RelaxResetPattern.materialize(&t, &ctx("")).is_none());

        let broaden = Strategy::BroadenPercentagePattern
            .materialize(&t, &ctx(""))
            .unwrap();
        assert_eq!(broaden.patches.len(), 2);
        broaden.apply(&mut t).unwrap();
        assert!(Strategy::BroadenPercentagePattern
            .materialize(&t, &ctx(""))
            .is_none());
    }

    #[test]
    fn test_relaxed_token_matches_corruption() {
        let mut t = Tunables::default();
        Strategy::RelaxResetPattern
            .materialize(&t, &ctx(""))
            .unwrap()
            .apply(&mut t)
            .unwrap();
        let parser = UsageParser::new(&t).unwrap();
        assert_eq!(
            parser.extract_reset_phrase("Current session\nRsts 6pm\n", "Current session"),
            Some("6pm".to_string())
        );
    }

    #[test]
    fn test_add_date_format_skips_unknown_shape() {
        // Two times in one phrase: the resolver gives up, and no shape fits
        let raw = "Current session\n42% used\nResets 6pm\n\
                   Current week (all models)\n10% used\nResets 3 Feb at 9:30am 9:45am\n";
        let t = Tunables::default();
        assert!(Strategy::AddDateFormat.materialize(&t, &ctx(raw)).is_none());
    }

    #[test]
    fn test_add_date_format_skips_resolvable_phrases() {
        let raw = "Current session\n42% used\nResets 18:59\n\
                   Current week (all models)\n10% used\nResets Jan 31 at 9am\n";
        assert!(Strategy::AddDateFormat
            .materialize(&Tunables::default(), &ctx(raw))
            .is_none());
    }

    #[test]
    fn test_format_fix() {
        let mut t = Tunables::default();
        let fix = format_fix(&t, "18:59").unwrap();
        assert_eq!(fix.name, "add_date_format");
        assert_eq!(
            fix.patches,
            vec![Patch::AddFormat {
                list: FormatList::TimeOnly,
                format: "%H:%M".into()
            }]
        );
        assert_eq!(fix.description, "Add date format '%H:%M' for '18:59'");

        fix.apply(&mut t).unwrap();
        assert!(format_fix(&t, "18:59").is_none());
    }

    #[test]
    fn test_add_date_format_without_phrases() {
        let t = Tunables::default();
        assert!(Strategy::AddDateFormat
            .materialize(&t, &ctx("Current session\n42% used\n"))
            .is_none());
    }
}
