//! Date format inference from a failing reset phrase.

use once_cell::sync::Lazy;
use regex::Regex;

use crate::config::FormatList;
use crate::parse::clean_phrase;

/// A phrase shape and the format it implies
struct Shape {
    pattern: Regex,
    list: FormatList,
    /// `{sep}` is replaced by the whitespace seen before am/pm
    format: &'static str,
}

fn shape(pattern: &str, list: FormatList, format: &'static str) -> Shape {
    Shape {
        pattern: Regex::new(&format!("(?i){}", pattern)).unwrap(),
        list,
        format,
    }
}

static SHAPES: Lazy<Vec<Shape>> = Lazy::new(|| {
    use FormatList::*;
    vec![
        // Jan 29 2026 at 6:59pm
        shape(r"^[a-z]{3,9} \d{1,2} \d{4} at \d{1,2}:\d{2}(\s*)[ap]m$", DateWithYear, "%b %d %Y at %I:%M{sep}%p"),
        shape(r"^[a-z]{3,9} \d{1,2} \d{4} at \d{1,2}(\s*)[ap]m$", DateWithYear, "%b %d %Y at %I{sep}%p"),
        // 2026-01-29 18:59
        shape(r"^\d{4}-\d{2}-\d{2} \d{1,2}:\d{2}()$", DateWithYear, "%Y-%m-%d %H:%M"),
        // Jan 29 at 6:59pm
        shape(r"^[a-z]{3,9} \d{1,2} at \d{1,2}:\d{2}(\s*)[ap]m$", DateNoYear, "%b %d at %I:%M{sep}%p"),
        shape(r"^[a-z]{3,9} \d{1,2} at \d{1,2}(\s*)[ap]m$", DateNoYear, "%b %d at %I{sep}%p"),
        // 29 Jan at 6:59pm
        shape(r"^\d{1,2} [a-z]{3,9} at \d{1,2}:\d{2}(\s*)[ap]m$", DateNoYear, "%d %b at %I:%M{sep}%p"),
        shape(r"^\d{1,2} [a-z]{3,9} at \d{1,2}(\s*)[ap]m$", DateNoYear, "%d %b at %I{sep}%p"),
        // 6:59pm, 6pm, 18:59
        shape(r"^\d{1,2}:\d{2}(\s*)[ap]m$", TimeOnly, "%I:%M{sep}%p"),
        shape(r"^\d{1,2}(\s*)[ap]m$", TimeOnly, "%I{sep}%p"),
        shape(r"^\d{1,2}:\d{2}()$", TimeOnly, "%H:%M"),
    ]
});

/// Synthesize a strftime format for a reset phrase.
///
/// The phrase is cleaned the same way the resolver cleans it, so the
/// returned format parses exactly what the resolver will see. Returns
/// `None` when the phrase matches no known shape.
pub fn infer_date_format(phrase: &str) -> Option<(FormatList, String)> {
    let clean = clean_phrase(phrase);
    SHAPES.iter().find_map(|shape| {
        let caps = shape.pattern.captures(&clean)?;
        let sep = if caps.get(1).map_or("", |m| m.as_str()).is_empty() {
            ""
        } else {
            " "
        };
        Some((shape.list, shape.format.replace("{sep}", sep)))
    })
}
