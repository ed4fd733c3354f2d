//! Cascading percentage extraction.
//!
//! Each strategy survives a different kind of layout damage. They run in a
//! fixed order of decreasing specificity and the first in-range value wins.

use regex::{Regex, RegexBuilder};
use tracing::debug;

/// Compiled percentage patterns shared by every strategy
#[derive(Debug, Clone)]
pub struct PercentPatterns {
    /// Number immediately preceding "% used" (group 1)
    pub used: Regex,
    /// Bare "N%" token (group 1)
    pub token: Regex,
}

/// One independent way of locating a section's usage percentage
pub trait PercentStrategy: Send + Sync {
    /// Stable name used in logs
    fn name(&self) -> &'static str;

    /// Return the section's percentage, or `None` if this strategy cannot tell
    fn extract(&self, text: &str, label: &str, patterns: &PercentPatterns) -> Option<u32>;
}

/// Label followed anywhere later in the text by "N% used"
pub struct DirectPattern;

/// Line holding the label, then the first "N%" on the following lines
/// before another "Current ..." header
pub struct StructuralScan;

/// Text split at every "Current " boundary; first in-range "N%" in the
/// segment whose header matches the label
pub struct SegmentedScan;

/// Strategies in precedence order
pub const STRATEGIES: [&dyn PercentStrategy; 3] = [&DirectPattern, &StructuralScan, &SegmentedScan];

impl PercentStrategy for DirectPattern {
    fn name(&self) -> &'static str {
        "direct_pattern"
    }

    fn extract(&self, text: &str, label: &str, patterns: &PercentPatterns) -> Option<u32> {
        let label_end = find_label(text, label)?.1;
        let caps = patterns.used.captures(&text[label_end..])?;
        parse_percent(caps.get(1)?.as_str())
    }
}

impl PercentStrategy for StructuralScan {
    fn name(&self) -> &'static str {
        "structural_scan"
    }

    fn extract(&self, text: &str, label: &str, patterns: &PercentPatterns) -> Option<u32> {
        let label = label.to_lowercase();
        let mut in_section = false;

        for line in text.lines() {
            let lower = line.to_lowercase();
            if lower.contains(&label) {
                in_section = true;
                continue;
            }
            if !in_section {
                continue;
            }
            // Another section's header ends the search before its numbers are read
            if lower.contains("current") {
                break;
            }
            if let Some(value) = first_in_range(line, &patterns.token) {
                return Some(value);
            }
        }
        None
    }
}

impl PercentStrategy for SegmentedScan {
    fn name(&self) -> &'static str {
        "segmented_scan"
    }

    fn extract(&self, text: &str, label: &str, patterns: &PercentPatterns) -> Option<u32> {
        let label = label.to_lowercase();
        split_at_boundaries(text)
            .into_iter()
            .filter(|segment| segment.to_lowercase().contains(&label))
            .find_map(|segment| first_in_range(segment, &patterns.token))
    }
}

/// Run the cascade; the result is always within 0..=100 or absent
pub fn extract_percentage(text: &str, label: &str, patterns: &PercentPatterns) -> Option<u32> {
    for strategy in STRATEGIES {
        if let Some(value) = strategy.extract(text, label, patterns) {
            if value <= 100 {
                debug!(
                    strategy = strategy.name(),
                    label, value, "Extracted percentage"
                );
                return Some(value);
            }
        }
    }
    debug!(label, "No strategy found a percentage");
    None
}

/// Byte range of the first case-insensitive occurrence of `label`
pub(crate) fn find_label(text: &str, label: &str) -> Option<(usize, usize)> {
    let re = RegexBuilder::new(&regex::escape(label))
        .case_insensitive(true)
        .build()
        .ok()?;
    re.find(text).map(|m| (m.start(), m.end()))
}

/// Split before every case-insensitive "Current" followed by whitespace
fn split_at_boundaries(text: &str) -> Vec<&str> {
    let Ok(boundary) = RegexBuilder::new(r"current\s+")
        .case_insensitive(true)
        .build()
    else {
        return vec![text];
    };

    let mut segments = Vec::new();
    let mut start = 0;
    for m in boundary.find_iter(text) {
        if m.start() > start {
            segments.push(&text[start..m.start()]);
        }
        start = m.start();
    }
    segments.push(&text[start..]);
    segments
}

fn first_in_range(text: &str, token: &Regex) -> Option<u32> {
    token
        .captures_iter(text)
        .filter_map(|caps| caps.get(1).and_then(|m| parse_percent(m.as_str())))
        .find(|v| *v <= 100)
}

fn parse_percent(digits: &str) -> Option<u32> {
    digits.parse::<u32>().ok()
}
