//! Pace of consumption against the elapsed share of a window.

use chrono::{Duration, NaiveDateTime};

use crate::parse::UsageWindow;

/// Whether usage runs ahead of or behind the clock
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PaceStatus {
    OnPace,
    /// Percentage points ahead of the clock
    Above(u32),
    /// Percentage points behind the clock
    Below(u32),
}

/// Pace figures for one window
#[derive(Debug, Clone, PartialEq)]
pub struct PaceReport {
    pub used_percent: u32,
    /// Share of the window already elapsed, clamped to 0..=100
    pub elapsed_percent: f64,
    /// `used - elapsed`; positive means consuming faster than the window allows
    pub pace: f64,
    pub status: PaceStatus,
    /// Time left until the reset, never negative
    pub remaining: Duration,
}

impl PaceReport {
    pub fn compute(
        used_percent: u32,
        reset_at: NaiveDateTime,
        window: UsageWindow,
        now: NaiveDateTime,
    ) -> Self {
        let length = Duration::hours(window.hours());
        let start = reset_at - length;
        let elapsed = (now - start).num_seconds() as f64;
        let elapsed_percent = (elapsed / length.num_seconds() as f64 * 100.0).clamp(0.0, 100.0);
        let pace = f64::from(used_percent) - elapsed_percent;

        let rounded = pace.round() as i64;
        let status = match rounded {
            0 => PaceStatus::OnPace,
            p if p > 0 => PaceStatus::Above(p.unsigned_abs() as u32),
            p => PaceStatus::Below(p.unsigned_abs() as u32),
        };

        Self {
            used_percent,
            elapsed_percent,
            pace,
            status,
            remaining: (reset_at - now).max(Duration::zero()),
        }
    }

    /// Whether usage is ahead of elapsed time
    pub fn is_above(&self) -> bool {
        f64::from(self.used_percent) > self.elapsed_percent
    }

    /// `"{d}d {h}h"` with at least a day left, otherwise `"{h}h {m}m"`
    pub fn remaining_label(&self) -> String {
        let days = self.remaining.num_days();
        let hours = self.remaining.num_hours() % 24;
        let minutes = self.remaining.num_minutes() % 60;
        if days > 0 {
            format!("{}d {}h", days, hours)
        } else {
            format!("{}h {}m", hours, minutes)
        }
    }

    pub fn status_label(&self) -> String {
        match self.status {
            PaceStatus::OnPace => "On pace".to_string(),
            PaceStatus::Above(p) => format!("Above pace ({}pp)", p),
            PaceStatus::Below(p) => format!("Below pace ({}pp)", p),
        }
    }
}
