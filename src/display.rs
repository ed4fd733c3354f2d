//! Terminal rendering of a usage reading.

use std::fmt::Write;
use std::time::Duration;

use chrono::NaiveDateTime;

use ccpace_core::pace::PaceReport;
use ccpace_core::parse::{ParseResult, UsageWindow};

const BAR_WIDTH: usize = 40;
const BLOCK_FULL: char = '█';
const BLOCK_EMPTY: char = '░';

/// Check if color output should be used
fn use_color() -> bool {
    use std::io::IsTerminal;
    std::io::stdout().is_terminal() && std::env::var_os("NO_COLOR").is_none()
}

/// ANSI color codes container (empty strings when color is disabled)
#[derive(Debug, Clone, Copy)]
pub struct Colors {
    bold: &'static str,
    dim: &'static str,
    reset: &'static str,
    green: &'static str,
    red: &'static str,
}

impl Colors {
    pub fn new() -> Self {
        if use_color() {
            Self {
                bold: "\x1b[1m",
                dim: "\x1b[2m",
                reset: "\x1b[0m",
                green: "\x1b[32m",
                red: "\x1b[31m",
            }
        } else {
            Self::plain()
        }
    }

    pub fn plain() -> Self {
        Self {
            bold: "",
            dim: "",
            reset: "",
            green: "",
            red: "",
        }
    }
}

impl Default for Colors {
    fn default() -> Self {
        Self::new()
    }
}

/// Fixed-width block bar for a percentage (clamped to 0..=100)
pub fn bar(percent: f64) -> String {
    let p = percent.clamp(0.0, 100.0);
    let fill = ((p / 100.0) * BAR_WIDTH as f64) as usize;
    let mut s = String::with_capacity(BAR_WIDTH * 3);
    s.extend(std::iter::repeat_n(BLOCK_FULL, fill));
    s.extend(std::iter::repeat_n(BLOCK_EMPTY, BAR_WIDTH - fill));
    s
}

fn section_title(window: UsageWindow) -> &'static str {
    match window {
        UsageWindow::Week => "Weekly Usage (168h)",
        UsageWindow::Session => "Session Usage (5h)",
    }
}

fn render_section(
    out: &mut String,
    result: &ParseResult,
    window: UsageWindow,
    now: NaiveDateTime,
    c: &Colors,
) {
    let reading = result.reading(window);
    let used = reading.percent.unwrap_or(0);

    let _ = writeln!(out, "  {}{}{}", c.bold, section_title(window), c.reset);

    let Some(reset_at) = reading.reset_at else {
        let _ = writeln!(out, "  Usage:  {}  {}% used", bar(f64::from(used)), used);
        let _ = writeln!(out, "  {}Warning: Could not parse reset time{}", c.red, c.reset);
        return;
    };

    let report = PaceReport::compute(used, reset_at, window, now);
    let color = if report.is_above() { c.red } else { c.green };

    let _ = writeln!(
        out,
        "  Time:   {}  {}% time",
        bar(report.elapsed_percent),
        report.elapsed_percent.round()
    );
    let _ = writeln!(
        out,
        "  Usage:  {}{}{}  {}% used",
        color,
        bar(f64::from(used)),
        c.reset,
        used
    );
    let _ = writeln!(
        out,
        "  Status: {}{}{} | Resets in {}",
        color,
        report.status_label(),
        c.reset,
        report.remaining_label()
    );
}

/// Full usage report: weekly section, then session section
pub fn render_usage(
    result: &ParseResult,
    now: NaiveDateTime,
    took: Duration,
    debug: bool,
    c: &Colors,
) -> String {
    let mut out = String::new();
    let _ = writeln!(
        out,
        "\n{}Usage Analysis - {} (took {:.2}s){}\n",
        c.bold,
        now.format("%A %B %d at %H:%M"),
        took.as_secs_f64(),
        c.reset
    );

    render_section(&mut out, result, UsageWindow::Week, now, c);
    let _ = writeln!(out, "\n  {}---{}\n", c.dim, c.reset);
    render_section(&mut out, result, UsageWindow::Session, now, c);

    if debug {
        let _ = writeln!(
            out,
            "\n  {}Raw: week='{}' session='{}'{}",
            c.dim,
            result.week.reset_phrase.as_deref().unwrap_or(""),
            result.session.reset_phrase.as_deref().unwrap_or(""),
            c.reset
        );
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use ccpace_core::parse::WindowReading;
    use chrono::NaiveDate;
    use pretty_assertions::assert_eq;

    fn at(d: u32, h: u32) -> NaiveDateTime {
        NaiveDate::from_ymd_opt(2026, 1, d)
            .unwrap()
            .and_hms_opt(h, 0, 0)
            .unwrap()
    }

    fn sample() -> ParseResult {
        ParseResult {
            session: WindowReading {
                percent: Some(60),
                reset_phrase: Some("6pm".into()),
                reset_at: Some(at(29, 18)),
            },
            week: WindowReading {
                percent: Some(10),
                reset_phrase: Some("Feb 3 at 9am".into()),
                reset_at: None,
            },
            ..ParseResult::default()
        }
    }

    #[test]
    fn test_bar() {
        assert_eq!(bar(0.0).chars().filter(|c| *c == BLOCK_FULL).count(), 0);
        assert_eq!(bar(50.0).chars().filter(|c| *c == BLOCK_FULL).count(), 20);
        assert_eq!(bar(150.0).chars().filter(|c| *c == BLOCK_EMPTY).count(), 0);
        assert_eq!(bar(33.0).chars().count(), BAR_WIDTH);
    }

    #[test]
    fn test_render_sections() {
        let out = render_usage(
            &sample(),
            at(29, 15),
            Duration::from_millis(2340),
            false,
            &Colors::plain(),
        );
        assert!(out.contains("Usage Analysis - Thursday January 29 at 15:00 (took 2.34s)"));

        let week = out.find("Weekly Usage (168h)").unwrap();
        let session = out.find("Session Usage (5h)").unwrap();
        assert!(week < session);

        assert!(out.contains("Warning: Could not parse reset time"));
        assert!(out.contains("40% time"));
        assert!(out.contains("Status: Above pace (20pp) | Resets in 3h 0m"));
        assert!(!out.contains("Raw:"));
    }

    #[test]
    fn test_render_debug_phrases() {
        let out = render_usage(&sample(), at(29, 15), Duration::ZERO, true, &Colors::plain());
        assert!(out.contains("Raw: week='Feb 3 at 9am' session='6pm'"));
    }
}
