//! Runtime-adjustable parameters of the capture and parse layers.
//!
//! This record is the only state the healing layer mutates. Every field the
//! healer can touch is addressable through [`TunableKey`], and the date-format
//! lists through [`FormatList`].

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::ConfigError;

/// Complete tunables record, persisted as `tunables.toml`
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct Tunables {
    #[serde(default)]
    pub capture: CaptureTunables,
    #[serde(default)]
    pub patterns: PatternTunables,
    #[serde(default)]
    pub validation: ValidationTunables,
    #[serde(default)]
    pub formats: FormatTunables,
}

/// Timing and retry parameters of the scripted terminal session
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CaptureTunables {
    /// Seconds to wait for a known section before giving up on an attempt
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,

    /// Capture attempts before surfacing a capture error
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Backoff step; attempt `n` sleeps `n * backoff_ms` before the next one
    #[serde(default = "default_backoff_ms")]
    pub backoff_ms: u64,

    /// Delay before answering a confirmation prompt
    #[serde(default = "default_prompt_settle_ms")]
    pub prompt_settle_ms: u64,

    /// Delay after the last section header appears
    #[serde(default = "default_section_settle_ms")]
    pub section_settle_ms: u64,

    /// Delay after the first percentage marker appears
    #[serde(default = "default_marker_settle_ms")]
    pub marker_settle_ms: u64,

    /// Delay before tearing the session down
    #[serde(default = "default_final_settle_ms")]
    pub final_settle_ms: u64,

    /// Screen polling interval while waiting
    #[serde(default = "default_poll_ms")]
    pub poll_ms: u64,
}

fn default_timeout_secs() -> u64 {
    20
}

fn default_max_retries() -> u32 {
    3
}

fn default_backoff_ms() -> u64 {
    500
}

fn default_prompt_settle_ms() -> u64 {
    300
}

fn default_section_settle_ms() -> u64 {
    500
}

fn default_marker_settle_ms() -> u64 {
    2000
}

fn default_final_settle_ms() -> u64 {
    200
}

fn default_poll_ms() -> u64 {
    100
}

impl Default for CaptureTunables {
    fn default() -> Self {
        Self {
            timeout_secs: default_timeout_secs(),
            max_retries: default_max_retries(),
            backoff_ms: default_backoff_ms(),
            prompt_settle_ms: default_prompt_settle_ms(),
            section_settle_ms: default_section_settle_ms(),
            marker_settle_ms: default_marker_settle_ms(),
            final_settle_ms: default_final_settle_ms(),
            poll_ms: default_poll_ms(),
        }
    }
}

/// Regex fragments used by the extractors
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PatternTunables {
    /// Matches the "Resets" word, tolerating corruption
    #[serde(default = "default_reset_token")]
    pub reset_token: String,

    /// Number immediately preceding the "% used" marker (group 1 = number)
    #[serde(default = "default_percent_used")]
    pub percent_used: String,

    /// Bare "N%" token (group 1 = number)
    #[serde(default = "default_percent_token")]
    pub percent_token: String,
}

pub(crate) fn default_reset_token() -> String {
    r"Rese[ts]*".to_string()
}

pub(crate) fn default_percent_used() -> String {
    r"(\d+)%\s*used".to_string()
}

pub(crate) fn default_percent_token() -> String {
    r"(\d+)%".to_string()
}

impl Default for PatternTunables {
    fn default() -> Self {
        Self {
            reset_token: default_reset_token(),
            percent_used: default_percent_used(),
            percent_token: default_percent_token(),
        }
    }
}

/// Tolerances applied by the validator
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ValidationTunables {
    /// A reset instant this many minutes in the past is still accepted
    #[serde(default = "default_past_tolerance_mins")]
    pub past_tolerance_mins: i64,

    /// Hours beyond the window length a reset instant may lie
    #[serde(default = "default_window_buffer_hours")]
    pub window_buffer_hours: i64,
}

fn default_past_tolerance_mins() -> i64 {
    5
}

fn default_window_buffer_hours() -> i64 {
    1
}

impl Default for ValidationTunables {
    fn default() -> Self {
        Self {
            past_tolerance_mins: default_past_tolerance_mins(),
            window_buffer_hours: default_window_buffer_hours(),
        }
    }
}

/// Explicit strftime formats tried after the fuzzy parser
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct FormatTunables {
    /// e.g. `4:30PM`, `4PM`
    #[serde(default = "default_time_only")]
    pub time_only: Vec<String>,

    /// e.g. `Jan 29 at 6:59PM`
    #[serde(default = "default_date_no_year")]
    pub date_no_year: Vec<String>,

    /// e.g. `Jan 29 2026 at 6:59PM`
    #[serde(default = "default_date_with_year")]
    pub date_with_year: Vec<String>,
}

fn default_time_only() -> Vec<String> {
    vec!["%I:%M%p".to_string(), "%I%p".to_string()]
}

fn default_date_no_year() -> Vec<String> {
    vec!["%b %d at %I:%M%p".to_string(), "%b %d at %I%p".to_string()]
}

fn default_date_with_year() -> Vec<String> {
    vec![
        "%b %d %Y at %I:%M%p".to_string(),
        "%b %d %Y at %I%p".to_string(),
    ]
}

impl Default for FormatTunables {
    fn default() -> Self {
        Self {
            time_only: default_time_only(),
            date_no_year: default_date_no_year(),
            date_with_year: default_date_with_year(),
        }
    }
}

/// Which format list a learned format belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FormatList {
    TimeOnly,
    DateNoYear,
    DateWithYear,
}

impl FormatList {
    pub fn as_str(&self) -> &'static str {
        match self {
            FormatList::TimeOnly => "time_only",
            FormatList::DateNoYear => "date_no_year",
            FormatList::DateWithYear => "date_with_year",
        }
    }
}

impl fmt::Display for FormatList {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FormatTunables {
    pub fn list(&self, list: FormatList) -> &[String] {
        match list {
            FormatList::TimeOnly => &self.time_only,
            FormatList::DateNoYear => &self.date_no_year,
            FormatList::DateWithYear => &self.date_with_year,
        }
    }

    pub fn list_mut(&mut self, list: FormatList) -> &mut Vec<String> {
        match list {
            FormatList::TimeOnly => &mut self.time_only,
            FormatList::DateNoYear => &mut self.date_no_year,
            FormatList::DateWithYear => &mut self.date_with_year,
        }
    }

    pub fn contains(&self, list: FormatList, format: &str) -> bool {
        self.list(list).iter().any(|f| f == format)
    }
}

/// Addressable scalar tunables
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TunableKey {
    CaptureTimeoutSecs,
    CaptureMaxRetries,
    SectionSettleMs,
    MarkerSettleMs,
    ResetToken,
    PercentUsedPattern,
    PercentTokenPattern,
    WindowBufferHours,
}

impl TunableKey {
    pub fn as_str(&self) -> &'static str {
        match self {
            TunableKey::CaptureTimeoutSecs => "capture.timeout_secs",
            TunableKey::CaptureMaxRetries => "capture.max_retries",
            TunableKey::SectionSettleMs => "capture.section_settle_ms",
            TunableKey::MarkerSettleMs => "capture.marker_settle_ms",
            TunableKey::ResetToken => "patterns.reset_token",
            TunableKey::PercentUsedPattern => "patterns.percent_used",
            TunableKey::PercentTokenPattern => "patterns.percent_token",
            TunableKey::WindowBufferHours => "validation.window_buffer_hours",
        }
    }
}

impl fmt::Display for TunableKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A scalar tunable value
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum TunableValue {
    Integer(i64),
    Text(String),
}

impl TunableValue {
    pub fn as_integer(&self) -> Option<i64> {
        match self {
            TunableValue::Integer(v) => Some(*v),
            TunableValue::Text(_) => None,
        }
    }

    pub fn as_text(&self) -> Option<&str> {
        match self {
            TunableValue::Text(s) => Some(s),
            TunableValue::Integer(_) => None,
        }
    }
}

impl fmt::Display for TunableValue {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            TunableValue::Integer(v) => write!(f, "{}", v),
            TunableValue::Text(s) => write!(f, "'{}'", s),
        }
    }
}

impl Tunables {
    /// Read a scalar tunable
    pub fn get(&self, key: TunableKey) -> TunableValue {
        match key {
            TunableKey::CaptureTimeoutSecs => {
                TunableValue::Integer(saturating_i64(self.capture.timeout_secs))
            }
            TunableKey::CaptureMaxRetries => {
                TunableValue::Integer(i64::from(self.capture.max_retries))
            }
            TunableKey::SectionSettleMs => {
                TunableValue::Integer(saturating_i64(self.capture.section_settle_ms))
            }
            TunableKey::MarkerSettleMs => {
                TunableValue::Integer(saturating_i64(self.capture.marker_settle_ms))
            }
            TunableKey::ResetToken => TunableValue::Text(self.patterns.reset_token.clone()),
            TunableKey::PercentUsedPattern => {
                TunableValue::Text(self.patterns.percent_used.clone())
            }
            TunableKey::PercentTokenPattern => {
                TunableValue::Text(self.patterns.percent_token.clone())
            }
            TunableKey::WindowBufferHours => {
                TunableValue::Integer(self.validation.window_buffer_hours)
            }
        }
    }

    /// Overwrite a scalar tunable
    pub fn set(&mut self, key: TunableKey, value: &TunableValue) -> Result<(), ConfigError> {
        let mismatch = |expected| ConfigError::TypeMismatch {
            key: key.as_str(),
            expected,
        };

        match key {
            TunableKey::CaptureTimeoutSecs => {
                self.capture.timeout_secs = unsigned(value).ok_or(mismatch("a non-negative integer"))?;
            }
            TunableKey::CaptureMaxRetries => {
                let v = unsigned(value).ok_or(mismatch("a non-negative integer"))?;
                self.capture.max_retries =
                    u32::try_from(v).map_err(|_| mismatch("an integer below 2^32"))?;
            }
            TunableKey::SectionSettleMs => {
                self.capture.section_settle_ms =
                    unsigned(value).ok_or(mismatch("a non-negative integer"))?;
            }
            TunableKey::MarkerSettleMs => {
                self.capture.marker_settle_ms =
                    unsigned(value).ok_or(mismatch("a non-negative integer"))?;
            }
            TunableKey::ResetToken => {
                self.patterns.reset_token = text(value).ok_or(mismatch("text"))?;
            }
            TunableKey::PercentUsedPattern => {
                self.patterns.percent_used = text(value).ok_or(mismatch("text"))?;
            }
            TunableKey::PercentTokenPattern => {
                self.patterns.percent_token = text(value).ok_or(mismatch("text"))?;
            }
            TunableKey::WindowBufferHours => {
                self.validation.window_buffer_hours =
                    value.as_integer().ok_or(mismatch("an integer"))?;
            }
        }
        Ok(())
    }
}

fn saturating_i64(v: u64) -> i64 {
    i64::try_from(v).unwrap_or(i64::MAX)
}

fn unsigned(value: &TunableValue) -> Option<u64> {
    value.as_integer().and_then(|v| u64::try_from(v).ok())
}

fn text(value: &TunableValue) -> Option<String> {
    value.as_text().map(str::to_string)
}
