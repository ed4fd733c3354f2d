//! Reset phrase extraction.

use regex::{Regex, RegexBuilder};

use super::percentage::find_label;

/// Build the phrase pattern around a reset-token fragment.
///
/// The phrase runs from after the token to the next gap of two or more
/// whitespace characters, the end of the line, or the end of the text.
pub fn reset_pattern(reset_token: &str) -> Result<Regex, regex::Error> {
    RegexBuilder::new(&format!(r"(?:{reset_token})\s+(.+?)(?:\s{{2,}}|\n|$)"))
        .case_insensitive(true)
        .build()
}

/// Reset phrase of the section introduced by `label`
pub fn extract_reset_phrase(text: &str, label: &str, pattern: &Regex) -> Option<String> {
    let label_end = find_label(text, label)?.1;
    let caps = pattern.captures(&text[label_end..])?;
    let phrase = caps.get(1)?.as_str().trim();
    (!phrase.is_empty()).then(|| phrase.to_string())
}

/// Every reset phrase in the text, in order of appearance
pub fn all_reset_phrases(text: &str, pattern: &Regex) -> Vec<String> {
    pattern
        .captures_iter(text)
        .filter_map(|caps| caps.get(1))
        .map(|m| m.as_str().trim().to_string())
        .filter(|p| !p.is_empty())
        .collect()
}
