//! Majority verification of a freshly applied fix.

use std::thread;
use std::time::Duration;

use tracing::debug;

use crate::capture::UsageSource;
use crate::config::Tunables;
use crate::pipeline::{sample, Clock, Strictness};

/// Tally of repeated samples
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct VerifyOutcome {
    pub successes: u32,
    pub attempts: u32,
    pub threshold: u32,
}

impl VerifyOutcome {
    pub fn accepted(&self) -> bool {
        self.successes >= self.threshold
    }
}

/// Verification parameters
#[derive(Debug, Clone, Copy)]
pub struct VerifyPlan {
    pub attempts: u32,
    pub threshold: u32,
    pub delay: Duration,
}

/// Run `plan.attempts` strict samples and count the passes.
///
/// Stops early once the threshold is reached or can no longer be reached.
pub fn verify<S: UsageSource + ?Sized>(
    source: &mut S,
    tunables: &Tunables,
    plan: &VerifyPlan,
    clock: Clock,
) -> VerifyOutcome {
    let mut outcome = VerifyOutcome {
        successes: 0,
        attempts: 0,
        threshold: plan.threshold,
    };

    for attempt in 1..=plan.attempts {
        outcome.attempts = attempt;
        match sample(source, tunables, clock, Strictness::Strict) {
            Ok(_) => outcome.successes += 1,
            Err(failure) => debug!(attempt, error = %failure.error, "Verification sample failed"),
        }

        let remaining = plan.attempts - attempt;
        if outcome.accepted() || outcome.successes + remaining < plan.threshold {
            break;
        }
        if !plan.delay.is_zero() {
            thread::sleep(plan.delay);
        }
    }

    debug!(
        "Verification: {}/{} passed (need {})",
        outcome.successes, outcome.attempts, outcome.threshold
    );
    outcome
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::error::CaptureError;
    use chrono::{NaiveDate, NaiveDateTime};
    use std::collections::VecDeque;

    const GOOD: &str = "Current session\n42% used\nResets 6:59pm\n\
                        Current week (all models)\n10% used\nResets Jan 31 at 9am\n";

    fn fixed_now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 1, 29)
            .unwrap()
            .and_hms_opt(14, 0, 0)
            .unwrap()
    }

    /// Replays a script of pass/fail captures
    struct Script(VecDeque<bool>);

    impl UsageSource for Script {
        fn capture(&mut self, _tunables: &Tunables) -> Result<String, CaptureError> {
            match self.0.pop_front() {
                Some(true) => Ok(GOOD.to_string()),
                _ => Err(CaptureError::Incomplete { attempts: 1 }),
            }
        }
    }

    fn run(script: &[bool]) -> VerifyOutcome {
        let plan = VerifyPlan {
            attempts: 3,
            threshold: 2,
            delay: Duration::ZERO,
        };
        verify(
            &mut Script(script.iter().copied().collect()),
            &Tunables::default(),
            &plan,
            fixed_now,
        )
    }

    #[test]
    fn test_two_of_three_accepted() {
        let outcome = run(&[true, false, true]);
        assert!(outcome.accepted());
        assert_eq!(outcome.successes, 2);
        assert_eq!(outcome.attempts, 3);
    }

    #[test]
    fn test_one_of_three_rejected() {
        let outcome = run(&[false, true, false]);
        assert!(!outcome.accepted());
        assert_eq!(outcome.successes, 1);
    }

    #[test]
    fn test_stops_early() {
        let outcome = run(&[true, true, false]);
        assert!(outcome.accepted());
        assert_eq!(outcome.attempts, 2);

        let outcome = run(&[false, false, true]);
        assert!(!outcome.accepted());
        assert_eq!(outcome.attempts, 2);
    }
}
