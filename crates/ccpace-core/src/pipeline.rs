//! capture → parse → validate, as one sample.

use chrono::NaiveDateTime;
use tracing::debug;

use crate::capture::UsageSource;
use crate::config::Tunables;
use crate::error::UsageError;
use crate::parse::{ParseResult, ParseWarning, UsageParser};
use crate::validate::validate;

/// Source of "now"; injected so runs are reproducible in tests
pub type Clock = fn() -> NaiveDateTime;

/// Wall-clock local time
pub fn local_now() -> NaiveDateTime {
    chrono::Local::now().naive_local()
}

/// A successful sample
#[derive(Debug, Clone)]
pub struct Sample {
    pub raw: String,
    pub result: ParseResult,
    /// Instant the result was resolved against
    pub now: NaiveDateTime,
}

/// A failed sample, keeping whatever was captured for classification
#[derive(Debug)]
pub struct SampleFailure {
    pub error: UsageError,
    /// Raw output (empty when capture itself failed)
    pub raw: String,
}

impl SampleFailure {
    pub fn exit_code(&self) -> i32 {
        self.error.exit_code()
    }
}

/// Whether unparseable reset phrases fail the sample
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Strictness {
    /// Monitor behavior: unresolved phrases stay warnings
    Lenient,
    /// Healer behavior: an unparseable phrase is a parse failure
    Strict,
}

/// Parse and validate already captured output
pub fn parse_and_validate(
    raw: &str,
    tunables: &Tunables,
    now: NaiveDateTime,
    strictness: Strictness,
) -> Result<ParseResult, UsageError> {
    let parser = UsageParser::new(tunables)?;
    let result = parser.parse(raw, now);
    validate(&result, now, &tunables.validation)?;

    if strictness == Strictness::Strict {
        if let Some(warning) = result
            .warnings
            .iter()
            .find(|w| matches!(w, ParseWarning::UnparseableReset { .. }))
        {
            return Err(UsageError::Parse(warning.to_string()));
        }
    }
    Ok(result)
}

/// One full run against a source
pub fn sample<S: UsageSource + ?Sized>(
    source: &mut S,
    tunables: &Tunables,
    clock: Clock,
    strictness: Strictness,
) -> Result<Sample, SampleFailure> {
    let raw = source.capture(tunables).map_err(|e| SampleFailure {
        error: e.into(),
        raw: String::new(),
    })?;

    let now = clock();
    match parse_and_validate(&raw, tunables, now, strictness) {
        Ok(result) => Ok(Sample { raw, result, now }),
        Err(error) => {
            debug!("Sample failed: {}", error);
            Err(SampleFailure { error, raw })
        }
    }
}
