//! The healing loop.
//!
//! `check → classify → (materialize → apply → verify → keep | roll back)*`,
//! re-probing and re-classifying after each pass over a category's
//! strategies, bounded by `max_iterations`.
//!
//! Candidate fixes are verified against an in-memory copy of the tunables.
//! Only an accepted fix is written to disk, so an interrupted or rejected
//! verification never leaves a patch behind.

use std::path::PathBuf;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use tracing::{debug, info, warn};

use super::classify::{classify, FailureCategory};
use super::commit::{commit_message, Committer};
use super::fix::Fix;
use super::fixture::{ExpectedValues, FixturePair, FixtureWriter};
use super::history::{HistoryEntry, HistoryLog};
use super::strategy::{strategies_for, FailureContext};
use super::verify::{verify, VerifyPlan};
use crate::capture::UsageSource;
use crate::config::{HealSettings, TunablesStore};
use crate::error::{HealError, UsageError};
use crate::pipeline::{local_now, sample, Clock, SampleFailure, Strictness};

/// Knobs of one healing run
#[derive(Debug, Clone, Copy)]
pub struct HealOptions {
    pub max_iterations: u32,
    pub verify: VerifyPlan,
    /// Commit verified fixes without asking
    pub auto_commit: bool,
}

impl HealOptions {
    pub fn from_settings(heal: &HealSettings, auto_commit: bool) -> Self {
        Self {
            max_iterations: heal.max_iterations.max(1),
            verify: VerifyPlan {
                attempts: heal.verify_attempts,
                threshold: heal.verify_threshold,
                delay: Duration::from_millis(heal.verify_delay_ms),
            },
            auto_commit,
        }
    }
}

/// Outcome of [`Healer::run`]
#[derive(Debug, Clone)]
pub struct HealResult {
    pub success: bool,
    pub message: String,
    /// Iterations used (0 when the parser was already healthy)
    pub iterations: u32,
    /// Last classified failure, if any
    pub category: Option<FailureCategory>,
    /// The verified fix, if one was kept
    pub fix: Option<Fix>,
    pub fixture: Option<FixturePair>,
    pub committed: bool,
    /// Stopped early by [`Healer::with_cancel`]'s flag
    pub interrupted: bool,
}

impl HealResult {
    fn new(success: bool, message: impl Into<String>, iterations: u32) -> Self {
        Self {
            success,
            message: message.into(),
            iterations,
            category: None,
            fix: None,
            fixture: None,
            committed: false,
            interrupted: false,
        }
    }

    fn stopped(iterations: u32, category: FailureCategory) -> Self {
        let mut result = Self::new(false, "Interrupted", iterations);
        result.category = Some(category);
        result.interrupted = true;
        result
    }
}

/// Drives the healing loop against a usage source
pub struct Healer<S, C> {
    source: S,
    committer: C,
    store: TunablesStore,
    history: HistoryLog,
    fixtures: FixtureWriter,
    options: HealOptions,
    clock: Clock,
    cancel: Option<Arc<AtomicBool>>,
}

impl<S: UsageSource, C: Committer> Healer<S, C> {
    pub fn new(
        source: S,
        committer: C,
        store: TunablesStore,
        history: HistoryLog,
        fixtures: FixtureWriter,
        options: HealOptions,
    ) -> Self {
        Self {
            source,
            committer,
            store,
            history,
            fixtures,
            options,
            clock: local_now,
            cancel: None,
        }
    }

    /// Stop between strategies once `flag` is set
    pub fn with_cancel(mut self, flag: Arc<AtomicBool>) -> Self {
        self.cancel = Some(flag);
        self
    }

    fn cancelled(&self) -> bool {
        self.cancel
            .as_ref()
            .is_some_and(|flag| flag.load(Ordering::SeqCst))
    }

    /// Replace the wall clock
    pub fn with_clock(mut self, clock: Clock) -> Self {
        self.clock = clock;
        self
    }

    pub fn history(&self) -> &HistoryLog {
        &self.history
    }

    pub fn committer(&self) -> &C {
        &self.committer
    }

    /// Sample once with the strict healer pipeline, no mutation
    pub fn check(&mut self) -> Result<(), UsageError> {
        let tunables = self.store.load()?;
        sample(&mut self.source, &tunables, self.clock, Strictness::Strict)
            .map(|_| ())
            .map_err(|failure| failure.error)
    }

    /// Run the healing loop until a fix is verified, the parser recovers on
    /// its own, or every iteration is used up.
    pub fn run(&mut self) -> Result<HealResult, HealError> {
        let tunables = self.store.load()?;

        let mut failure = match sample(&mut self.source, &tunables, self.clock, Strictness::Strict) {
            Ok(_) => {
                info!("Parser working, nothing to heal");
                return Ok(HealResult::new(true, "Parser working", 0));
            }
            Err(failure) => failure,
        };

        let max = self.options.max_iterations;
        let mut category = FailureCategory::Unknown;

        for iteration in 1..=max {
            if self.cancelled() {
                warn!("Healing interrupted");
                return Ok(HealResult::stopped(iteration - 1, category));
            }

            let classification = classify(&failure.error, &failure.raw);
            category = classification.category;
            info!(
                "Iteration {}/{}: {} (confidence {:.2}): {}",
                iteration, max, category, classification.confidence, failure.error
            );

            let ctx = FailureContext {
                raw: &failure.raw,
                now: (self.clock)(),
            };

            for strategy in strategies_for(category) {
                if self.cancelled() {
                    warn!("Healing interrupted before {}", strategy);
                    return Ok(HealResult::stopped(iteration, category));
                }

                let Some(fix) = strategy.materialize(&tunables, &ctx) else {
                    debug!("Strategy {} has nothing to change, skipping", strategy);
                    continue;
                };
                info!("Trying {}: {}", fix.name, fix.description);

                let mut patched = tunables.clone();
                fix.apply(&mut patched)?;

                let outcome = verify(&mut self.source, &patched, &self.options.verify, self.clock);
                if outcome.accepted() {
                    info!(
                        "Fix {} verified ({}/{})",
                        fix.name, outcome.successes, outcome.attempts
                    );
                    self.store.save(&patched)?;
                    return Ok(self.keep(fix, category, iteration));
                }

                warn!(
                    "Fix {} rejected ({}/{} passed), rolling back",
                    fix.name, outcome.successes, outcome.attempts
                );
                fix.rollback(&mut patched)?;
                debug_assert_eq!(patched, tunables);
            }

            // Conditions drift between iterations; look again before retrying
            match sample(&mut self.source, &tunables, self.clock, Strictness::Strict) {
                Ok(_) => {
                    info!("Parser recovered without a fix");
                    self.record(true, category, None, "Parser recovered");
                    let mut result = HealResult::new(true, "Parser recovered", iteration);
                    result.category = Some(category);
                    return Ok(result);
                }
                Err(next) => failure = next,
            }
        }

        warn!("All strategies exhausted after {} iterations", max);
        self.record(false, category, None, "All strategies exhausted");
        let mut result = HealResult::new(false, "All strategies exhausted", max);
        result.category = Some(category);
        Ok(result)
    }

    /// Stage the tunables file plus `extra` paths and commit them for `fix`.
    ///
    /// Returns `false` without committing when the committer has nowhere to
    /// commit to (e.g. the state dir is not a repository).
    pub fn commit(&mut self, fix: &Fix, extra: &[PathBuf]) -> Result<bool, HealError> {
        if !self.committer.available() {
            warn!(
                "{:?} is not under version control, skipping commit",
                self.store.path()
            );
            return Ok(false);
        }
        let mut paths = vec![self.store.path().to_path_buf()];
        paths.extend(extra.iter().cloned());
        self.committer.commit(&paths, &commit_message(fix))?;
        Ok(true)
    }

    fn keep(&mut self, fix: Fix, category: FailureCategory, iteration: u32) -> HealResult {
        let message = format!("Fixed with {}", fix.name);
        let fixture = self.capture_fixture();

        let mut committed = false;
        if self.options.auto_commit {
            let extra: Vec<PathBuf> = fixture
                .iter()
                .flat_map(|p| [p.text.clone(), p.expected.clone()])
                .collect();
            match self.commit(&fix, &extra) {
                Ok(done) => committed = done,
                Err(e) => warn!("Failed to commit fix: {}", e),
            }
        }

        self.record(true, category, Some(fix.name.clone()), &message);

        HealResult {
            success: true,
            message,
            iterations: iteration,
            category: Some(category),
            fix: Some(fix),
            fixture,
            committed,
            interrupted: false,
        }
    }

    /// Capture once more with the kept tunables and save it as a fixture
    fn capture_fixture(&mut self) -> Option<FixturePair> {
        let tunables = match self.store.load() {
            Ok(t) => t,
            Err(e) => {
                warn!("Skipping fixture capture: {}", e);
                return None;
            }
        };

        let captured = sample(&mut self.source, &tunables, self.clock, Strictness::Lenient);
        let sample = match captured {
            Ok(p) => p,
            Err(SampleFailure { error, .. }) => {
                warn!("Skipping fixture capture: {}", error);
                return None;
            }
        };

        let expected = ExpectedValues::from_result(&sample.result, sample.now, true);
        match self.fixtures.write(&sample.raw, &expected) {
            Ok(pair) => Some(pair),
            Err(e) => {
                warn!("Failed to write fixture: {}", e);
                None
            }
        }
    }

    fn record(&self, success: bool, category: FailureCategory, fix: Option<String>, message: &str) {
        let entry = HistoryEntry {
            timestamp: (self.clock)(),
            success,
            failure_type: category,
            fix_applied: fix,
            message: message.to_string(),
        };
        if let Err(e) = self.history.append(entry) {
            warn!("Failed to record heal history: {}", e);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::Tunables;
    use crate::error::CaptureError;
    use crate::heal::strategy::BROAD_PERCENT_USED;
    use chrono::{NaiveDate, NaiveDateTime};
    use std::path::Path;

    const SPACED: &str = "Current session\n42 % used\nResets 6:59pm\n\
                          Current week (all models)\n10 % used\nResets Jan 31 at 9am\n";

    const GOOD: &str = "Current session\n42% used\nResets 6:59pm\n\
                        Current week (all models)\n10% used\nResets Jan 31 at 9am\n";

    fn fixed_now() -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 1, 29)
            .unwrap()
            .and_hms_opt(14, 0, 0)
            .unwrap()
    }

    /// Always prints the same screen
    struct Screen(&'static str);

    impl UsageSource for Screen {
        fn capture(&mut self, _tunables: &Tunables) -> Result<String, CaptureError> {
            Ok(self.0.to_string())
        }
    }

    /// Times out until the capture timeout reaches `needed_secs`
    struct SlowCli {
        needed_secs: u64,
    }

    impl UsageSource for SlowCli {
        fn capture(&mut self, tunables: &Tunables) -> Result<String, CaptureError> {
            if tunables.capture.timeout_secs >= self.needed_secs {
                Ok(GOOD.to_string())
            } else {
                Err(CaptureError::Timeout {
                    secs: tunables.capture.timeout_secs,
                    attempts: 1,
                })
            }
        }
    }

    /// Fails the first `failures` captures, then works
    struct Flaky {
        failures: u32,
    }

    impl UsageSource for Flaky {
        fn capture(&mut self, _tunables: &Tunables) -> Result<String, CaptureError> {
            if self.failures > 0 {
                self.failures -= 1;
                Err(CaptureError::Incomplete { attempts: 1 })
            } else {
                Ok(GOOD.to_string())
            }
        }
    }

    /// Times out once, then notes whether the tunables file exists at each
    /// later capture
    struct DiskWatcher {
        path: PathBuf,
        calls: u32,
        on_disk: Vec<bool>,
    }

    impl UsageSource for DiskWatcher {
        fn capture(&mut self, tunables: &Tunables) -> Result<String, CaptureError> {
            self.calls += 1;
            if self.calls == 1 {
                return Err(CaptureError::Timeout {
                    secs: tunables.capture.timeout_secs,
                    attempts: 1,
                });
            }
            self.on_disk.push(self.path.exists());
            Ok(GOOD.to_string())
        }
    }

    #[derive(Default)]
    struct Recorder {
        commits: Vec<(Vec<PathBuf>, String)>,
        outside_repo: bool,
    }

    impl Committer for Recorder {
        fn available(&self) -> bool {
            !self.outside_repo
        }

        fn commit(&mut self, paths: &[PathBuf], message: &str) -> Result<(), HealError> {
            self.commits.push((paths.to_vec(), message.to_string()));
            Ok(())
        }
    }

    fn healer<S: UsageSource>(source: S, dir: &Path, auto_commit: bool) -> Healer<S, Recorder> {
        let options = HealOptions {
            max_iterations: 3,
            verify: VerifyPlan {
                attempts: 3,
                threshold: 2,
                delay: Duration::ZERO,
            },
            auto_commit,
        };
        Healer::new(
            source,
            Recorder::default(),
            TunablesStore::new(dir.join("tunables.toml")),
            HistoryLog::new(dir.join("heal_history.json"), 100),
            FixtureWriter::new(dir.join("fixtures")),
            options,
        )
        .with_clock(fixed_now)
    }

    #[test]
    fn test_healthy_parser_is_left_alone() {
        let dir = tempfile::tempdir().unwrap();
        let mut h = healer(Screen(GOOD), dir.path(), true);
        let result = h.run().unwrap();
        assert!(result.success);
        assert_eq!(result.message, "Parser working");
        assert_eq!(result.iterations, 0);
        assert!(!dir.path().join("tunables.toml").exists());
        assert!(h.history().load().is_empty());
        assert!(h.check().is_ok());
    }

    #[test]
    fn test_spaced_percent_is_healed_and_committed() {
        let dir = tempfile::tempdir().unwrap();
        let mut h = healer(Screen(SPACED), dir.path(), true);
        assert!(h.check().is_err());

        let result = h.run().unwrap();
        assert!(result.success, "{}", result.message);
        assert_eq!(result.message, "Fixed with broaden_percentage_pattern");
        assert_eq!(result.iterations, 1);
        assert_eq!(result.category, Some(FailureCategory::PercentageUnparseable));
        assert!(result.committed);

        let saved = TunablesStore::new(dir.path().join("tunables.toml"))
            .load()
            .unwrap();
        assert_eq!(saved.patterns.percent_used, BROAD_PERCENT_USED);

        let fixture = result.fixture.expect("fixture written");
        assert!(fixture.text.starts_with(dir.path().join("fixtures")));
        assert_eq!(std::fs::read_to_string(&fixture.text).unwrap(), SPACED);

        let commits = &h.committer().commits;
        assert_eq!(commits.len(), 1);
        let (paths, message) = &commits[0];
        assert_eq!(paths[0], dir.path().join("tunables.toml"));
        assert_eq!(paths.len(), 3);
        assert!(message.starts_with("fix(parser): Broaden percentage patterns"));

        let history = h.history().load();
        assert_eq!(history.len(), 1);
        assert!(history[0].success);
        assert_eq!(
            history[0].fix_applied.as_deref(),
            Some("broaden_percentage_pattern")
        );

        assert!(h.check().is_ok());
    }

    #[test]
    fn test_without_auto_commit_nothing_is_committed() {
        let dir = tempfile::tempdir().unwrap();
        let mut h = healer(Screen(SPACED), dir.path(), false);
        let result = h.run().unwrap();
        assert!(result.success);
        assert!(!result.committed);
        assert!(h.committer().commits.is_empty());
    }

    #[test]
    fn test_commit_skipped_outside_repository() {
        let dir = tempfile::tempdir().unwrap();
        let mut h = healer(Screen(SPACED), dir.path(), true);
        h.committer.outside_repo = true;

        let result = h.run().unwrap();
        assert!(result.success);
        assert!(!result.committed);
        assert!(h.committer().commits.is_empty());
        assert_eq!(h.history().load().len(), 1);

        let fix = result.fix.unwrap();
        assert!(!h.commit(&fix, &[]).unwrap());
    }

    #[test]
    fn test_timeout_healed_by_first_strategy() {
        let dir = tempfile::tempdir().unwrap();
        let mut h = healer(SlowCli { needed_secs: 25 }, dir.path(), false);
        let result = h.run().unwrap();
        assert!(result.success);
        assert_eq!(result.message, "Fixed with increment_timeout");
        assert_eq!(result.iterations, 1);
        assert_eq!(result.category, Some(FailureCategory::CaptureTimeout));

        let saved = TunablesStore::new(dir.path().join("tunables.toml"))
            .load()
            .unwrap();
        assert_eq!(saved.capture.timeout_secs, 25);
    }

    #[test]
    fn test_fix_is_persisted_only_after_verification() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tunables.toml");
        let source = DiskWatcher {
            path: path.clone(),
            calls: 0,
            on_disk: Vec::new(),
        };
        let mut h = healer(source, dir.path(), false);
        let result = h.run().unwrap();
        assert!(result.success);
        assert_eq!(result.message, "Fixed with increment_timeout");

        // Two verify captures ran before the file existed; the fixture
        // capture afterwards sees it
        assert_eq!(h.source.on_disk, vec![false, false, true]);
        let saved = TunablesStore::new(&path).load().unwrap();
        assert_eq!(saved.capture.timeout_secs, 25);
    }

    #[test]
    fn test_cancel_flag_stops_before_any_strategy() {
        let dir = tempfile::tempdir().unwrap();
        let flag = Arc::new(AtomicBool::new(true));
        let mut h = healer(SlowCli { needed_secs: 25 }, dir.path(), true).with_cancel(flag);
        let result = h.run().unwrap();
        assert!(!result.success);
        assert!(result.interrupted);
        assert_eq!(result.iterations, 0);
        assert!(!dir.path().join("tunables.toml").exists());
        assert!(h.history().load().is_empty());
    }

    #[test]
    fn test_rejected_fix_restores_file_bytes() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("tunables.toml");
        let original = "# hand edited\n[capture]\ntimeout_secs = 20\n";
        std::fs::write(&path, original).unwrap();

        let mut h = healer(SlowCli { needed_secs: 999 }, dir.path(), true);
        let result = h.run().unwrap();
        assert!(!result.success);
        assert_eq!(result.message, "All strategies exhausted");
        assert_eq!(result.iterations, 3);
        assert_eq!(result.category, Some(FailureCategory::CaptureTimeout));
        assert_eq!(std::fs::read_to_string(&path).unwrap(), original);

        let history = h.history().load();
        assert_eq!(history.len(), 1);
        assert!(!history[0].success);
        assert_eq!(history[0].failure_type, FailureCategory::CaptureTimeout);
        assert!(h.committer().commits.is_empty());
    }

    #[test]
    fn test_transient_failure_kept_first_fix() {
        let dir = tempfile::tempdir().unwrap();
        let mut h = healer(Flaky { failures: 1 }, dir.path(), false);
        let result = h.run().unwrap();
        assert!(result.success);
        assert_eq!(result.message, "Fixed with extend_wait_time");
        assert_eq!(result.category, Some(FailureCategory::CaptureIncomplete));
    }

    #[test]
    fn test_recovery_seen_on_recheck() {
        let dir = tempfile::tempdir().unwrap();
        // initial sample, two rejected verifications of two fixes each, then
        // the re-check succeeds
        let mut h = healer(Flaky { failures: 5 }, dir.path(), false);
        let result = h.run().unwrap();
        assert!(result.success);
        assert_eq!(result.message, "Parser recovered");
        assert_eq!(result.iterations, 1);
        assert!(result.fix.is_none());
        assert!(!dir.path().join("tunables.toml").exists());

        let history = h.history().load();
        assert_eq!(history.len(), 1);
        assert!(history[0].success);
        assert_eq!(history[0].fix_applied, None);
        assert_eq!(history[0].message, "Parser recovered");
    }

    #[test]
    fn test_unknown_failure_exhausts() {
        let dir = tempfile::tempdir().unwrap();
        // A broken pattern is neither a capture, section, date, range nor
        // percentage problem
        std::fs::write(
            dir.path().join("tunables.toml"),
            "[patterns]\nreset_token = \"(\"\n",
        )
        .unwrap();
        let mut h = healer(Screen(GOOD), dir.path(), false);
        let result = h.run().unwrap();
        assert!(!result.success);
        assert_eq!(result.category, Some(FailureCategory::Unknown));
        assert_eq!(result.iterations, 3);
    }
}
