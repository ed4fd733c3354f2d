//! Failure classification.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::{CaptureError, UsageError};
use crate::parse::normalize;

/// What kind of breakage a failed sample shows
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FailureCategory {
    CaptureTimeout,
    CaptureIncomplete,
    SectionMissing,
    PercentageUnparseable,
    DateUnparseable,
    ValidationFailed,
    Unknown,
}

impl FailureCategory {
    pub fn as_str(&self) -> &'static str {
        match self {
            FailureCategory::CaptureTimeout => "capture_timeout",
            FailureCategory::CaptureIncomplete => "capture_incomplete",
            FailureCategory::SectionMissing => "section_missing",
            FailureCategory::PercentageUnparseable => "percentage_unparseable",
            FailureCategory::DateUnparseable => "date_unparseable",
            FailureCategory::ValidationFailed => "validation_failed",
            FailureCategory::Unknown => "unknown",
        }
    }
}

impl fmt::Display for FailureCategory {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// A category plus how sure the classifier is about it
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Classification {
    pub category: FailureCategory,
    /// Fixed per branch, only used for logging
    pub confidence: f32,
}

impl Classification {
    fn new(category: FailureCategory, confidence: f32) -> Self {
        Self {
            category,
            confidence,
        }
    }
}

/// Classify a failed sample from its error and the raw capture.
///
/// Pure: the same inputs always give the same classification. Branches are
/// checked in priority order and the first match wins.
pub fn classify(error: &UsageError, raw: &str) -> Classification {
    use FailureCategory::*;

    let message = error.to_string().to_lowercase();

    if let UsageError::Capture(capture) = error {
        let timed_out = matches!(capture, CaptureError::Timeout { .. })
            || message.contains("timeout")
            || message.contains("timed out");
        return if timed_out {
            Classification::new(CaptureTimeout, 0.95)
        } else {
            Classification::new(CaptureIncomplete, 0.85)
        };
    }

    let text = normalize(raw).to_lowercase();

    if !text.contains("current session") || !text.contains("current week") {
        return Classification::new(SectionMissing, 0.90);
    }

    if message.contains("does not match") || message.contains("date format") {
        return Classification::new(DateUnparseable, 0.95);
    }

    if message.contains("out of range")
        || message.contains("exceeds window")
        || message.contains("in past")
    {
        return Classification::new(ValidationFailed, 0.90);
    }

    if !text.contains("% used") {
        return Classification::new(PercentageUnparseable, 0.85);
    }

    if message.contains("percentage") {
        return Classification::new(PercentageUnparseable, 0.80);
    }

    Classification::new(Unknown, 0.50)
}
