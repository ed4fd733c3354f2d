//! Terminal output normalization.
//!
//! Captured output is a raw PTY stream. The CLI draws its columns with
//! cursor-forward sequences, so those become literal spaces before any other
//! escape sequence is removed.

use std::borrow::Cow;

use once_cell::sync::Lazy;
use regex::{Captures, Regex};

/// Upper bound on spaces emitted for a single cursor-forward sequence
const MAX_CURSOR_FORWARD: usize = 512;

/// `ESC [ n C` (cursor forward n columns, n defaults to 1)
static CURSOR_FORWARD: Lazy<Regex> = Lazy::new(|| Regex::new(r"\x1B\[(\d*)C").unwrap());

/// OSC sequences such as window title updates, terminated by BEL or ST.
/// An unterminated sequence runs to the end of the line.
static OSC_SEQUENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\x1B\][^\x07\x1B\n]*(?:\x07|\x1B\\)?").unwrap());

/// Any other escape sequence (CSI with parameters, or a two-byte escape)
static ESCAPE_SEQUENCE: Lazy<Regex> =
    Lazy::new(|| Regex::new(r"\x1B(?:[@-Z\\-_]|\[[0-?]*[ -/]*[@-~])").unwrap());

/// Strip terminal control sequences while preserving column spacing.
///
/// Never fails; text without escape sequences passes through unchanged apart
/// from line-ending normalization.
pub fn normalize(text: &str) -> String {
    let text = text.replace("\r\n", "\n").replace('\r', "\n");

    let text = CURSOR_FORWARD.replace_all(&text, |caps: &Captures| {
        let count = caps
            .get(1)
            .and_then(|m| m.as_str().parse::<usize>().ok())
            .unwrap_or(1)
            .clamp(1, MAX_CURSOR_FORWARD);
        " ".repeat(count)
    });
    let text = OSC_SEQUENCE.replace_all(&text, "");
    let text = ESCAPE_SEQUENCE.replace_all(&text, "");

    strip_control_chars(text).into_owned()
}

fn strip_control_chars(text: Cow<'_, str>) -> Cow<'_, str> {
    if !text.chars().any(is_stripped) {
        return text;
    }
    Cow::Owned(text.chars().filter(|c| !is_stripped(*c)).collect())
}

fn is_stripped(c: char) -> bool {
    c.is_control() && c != '\n' && c != '\t'
}
