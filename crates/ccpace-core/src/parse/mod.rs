//! Turn captured terminal output into a [`ParseResult`].

mod normalize;
mod percentage;
mod reset;
mod resolve;

pub use normalize::normalize;
pub use percentage::{
    extract_percentage, DirectPattern, PercentPatterns, PercentStrategy, SegmentedScan,
    StructuralScan, STRATEGIES,
};
pub use reset::{all_reset_phrases, extract_reset_phrase, reset_pattern};
pub use resolve::{
    clean_phrase, fuzzy_parse, parse_dated, parse_time_only, parse_with_formats,
    project_forward, resolve, resolve_detailed, Candidate, CandidateKind, Unresolved,
};

use std::fmt;

use chrono::NaiveDateTime;
use regex::{Regex, RegexBuilder};
use serde::{Deserialize, Serialize};
use tracing::debug;

use crate::config::{FormatTunables, Tunables};
use crate::error::ConfigError;

/// Boundary between the session section and the week sections
const WEEK_BOUNDARY: &str = "Current week";

/// The two rolling quota windows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum UsageWindow {
    /// 5-hour rolling session
    Session,
    /// 168-hour rolling week
    Week,
}

impl UsageWindow {
    pub fn hours(&self) -> i64 {
        match self {
            UsageWindow::Session => 5,
            UsageWindow::Week => 168,
        }
    }

    /// Section header as printed by the CLI
    pub fn label(&self) -> &'static str {
        match self {
            UsageWindow::Session => "Current session",
            UsageWindow::Week => "Current week (all models)",
        }
    }

    pub fn name(&self) -> &'static str {
        match self {
            UsageWindow::Session => "Session",
            UsageWindow::Week => "Week",
        }
    }
}

impl fmt::Display for UsageWindow {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.name())
    }
}

/// Extracted values for one window
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct WindowReading {
    /// Used percentage, always within 0..=100 when present
    pub percent: Option<u32>,
    /// Raw reset phrase as it appeared on screen
    pub reset_phrase: Option<String>,
    /// Resolved reset instant
    pub reset_at: Option<NaiveDateTime>,
}

/// Non-fatal problem noticed while parsing
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum ParseWarning {
    /// No parser understood the reset phrase
    UnparseableReset { window: UsageWindow, phrase: String },
    /// The reset phrase cannot be placed inside its window
    StaleReset { window: UsageWindow, phrase: String },
}

impl fmt::Display for ParseWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ParseWarning::UnparseableReset { window, phrase } => write!(
                f,
                "{} reset '{}' does not match any known date format",
                window, phrase
            ),
            ParseWarning::StaleReset { window, phrase } => {
                write!(f, "{} reset '{}' is stale", window, phrase)
            }
        }
    }
}

/// Outcome of parsing one capture
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ParseResult {
    pub session: WindowReading,
    pub week: WindowReading,
    /// Set when a required percentage could not be extracted
    pub error: Option<String>,
    pub warnings: Vec<ParseWarning>,
}

impl ParseResult {
    pub fn reading(&self, window: UsageWindow) -> &WindowReading {
        match window {
            UsageWindow::Session => &self.session,
            UsageWindow::Week => &self.week,
        }
    }
}

/// Parser compiled from the current pattern and format tunables
#[derive(Debug, Clone)]
pub struct UsageParser {
    percent: PercentPatterns,
    reset: Regex,
    formats: FormatTunables,
}

impl UsageParser {
    /// Compile the pattern tunables; an invalid pattern is a config error
    pub fn new(tunables: &Tunables) -> Result<Self, ConfigError> {
        let patterns = &tunables.patterns;
        let compile = |name: &'static str, pattern: &str| {
            RegexBuilder::new(pattern)
                .case_insensitive(true)
                .build()
                .map_err(|source| ConfigError::Pattern {
                    name,
                    pattern: pattern.to_string(),
                    source,
                })
        };

        let used = compile("percent_used", &patterns.percent_used)?;
        let token = compile("percent_token", &patterns.percent_token)?;
        let reset = reset_pattern(&patterns.reset_token).map_err(|source| ConfigError::Pattern {
            name: "reset_token",
            pattern: patterns.reset_token.clone(),
            source,
        })?;

        Ok(Self {
            percent: PercentPatterns { used, token },
            reset,
            formats: tunables.formats.clone(),
        })
    }

    pub fn extract_percentage(&self, text: &str, label: &str) -> Option<u32> {
        extract_percentage(text, label, &self.percent)
    }

    pub fn extract_reset_phrase(&self, text: &str, label: &str) -> Option<String> {
        extract_reset_phrase(text, label, &self.reset)
    }

    /// Every reset phrase in already normalized text
    pub fn reset_phrases(&self, text: &str) -> Vec<String> {
        all_reset_phrases(text, &self.reset)
    }

    pub fn resolve(
        &self,
        phrase: &str,
        window: UsageWindow,
        now: NaiveDateTime,
    ) -> Result<NaiveDateTime, Unresolved> {
        resolve_detailed(phrase, window.hours(), now, &self.formats)
    }

    /// Normalize raw output and extract both windows
    pub fn parse(&self, raw: &str, now: NaiveDateTime) -> ParseResult {
        let text = normalize(raw);
        let mut warnings = Vec::new();

        // Session values only come from before the first week section
        let session_text = text
            .find(WEEK_BOUNDARY)
            .map_or(text.as_str(), |idx| &text[..idx]);

        let session = self.read_window(session_text, UsageWindow::Session, now, &mut warnings);
        let week = self.read_window(&text, UsageWindow::Week, now, &mut warnings);

        let error = if session.percent.is_none() {
            Some("Failed to extract session percentage".to_string())
        } else if week.percent.is_none() {
            Some("Failed to extract week percentage".to_string())
        } else {
            None
        };

        if let Some(ref e) = error {
            debug!("Parse error: {}", e);
        }

        ParseResult {
            session,
            week,
            error,
            warnings,
        }
    }

    fn read_window(
        &self,
        text: &str,
        window: UsageWindow,
        now: NaiveDateTime,
        warnings: &mut Vec<ParseWarning>,
    ) -> WindowReading {
        let label = window.label();
        let percent = self.extract_percentage(text, label);
        let reset_phrase = self.extract_reset_phrase(text, label);

        let reset_at = reset_phrase.as_deref().and_then(|phrase| {
            match self.resolve(phrase, window, now) {
                Ok(at) => Some(at),
                Err(Unresolved::Unparseable) => {
                    warnings.push(ParseWarning::UnparseableReset {
                        window,
                        phrase: phrase.to_string(),
                    });
                    None
                }
                Err(Unresolved::Stale(candidate)) => {
                    debug!(%window, phrase, %candidate, "Reset phrase is stale");
                    warnings.push(ParseWarning::StaleReset {
                        window,
                        phrase: phrase.to_string(),
                    });
                    None
                }
            }
        });

        WindowReading {
            percent,
            reset_phrase,
            reset_at,
        }
    }
}
