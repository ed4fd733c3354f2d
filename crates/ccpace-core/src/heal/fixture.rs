//! Regression fixtures captured after a verified fix.

use std::fs;
use std::path::{Path, PathBuf};

use chrono::NaiveDateTime;
use serde::{Deserialize, Serialize};
use tracing::info;

use crate::error::HealError;
use crate::parse::ParseResult;

/// Values a fixture's raw text is expected to parse to
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ExpectedValues {
    pub session_percent: Option<u32>,
    pub session_reset_str: Option<String>,
    pub week_percent: Option<u32>,
    pub week_reset_str: Option<String>,
    pub captured_at: NaiveDateTime,
    #[serde(default)]
    pub auto_healed: bool,
}

impl ExpectedValues {
    pub fn from_result(result: &ParseResult, captured_at: NaiveDateTime, auto_healed: bool) -> Self {
        Self {
            session_percent: result.session.percent,
            session_reset_str: result.session.reset_phrase.clone(),
            week_percent: result.week.percent,
            week_reset_str: result.week.reset_phrase.clone(),
            captured_at,
            auto_healed,
        }
    }
}

/// Paths of one written fixture pair
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct FixturePair {
    pub text: PathBuf,
    pub expected: PathBuf,
}

/// Writes `<timestamp>.txt` / `<timestamp>.expected.json` pairs
#[derive(Debug, Clone)]
pub struct FixtureWriter {
    dir: PathBuf,
}

impl FixtureWriter {
    pub fn new(dir: impl Into<PathBuf>) -> Self {
        Self { dir: dir.into() }
    }

    pub fn dir(&self) -> &Path {
        &self.dir
    }

    pub fn write(&self, raw: &str, expected: &ExpectedValues) -> Result<FixturePair, HealError> {
        let err = |path: &Path| {
            let path = path.to_path_buf();
            move |source| HealError::Fixture { path, source }
        };

        fs::create_dir_all(&self.dir).map_err(err(&self.dir))?;

        let stamp = expected.captured_at.format("%Y%m%d_%H%M%S").to_string();
        let pair = FixturePair {
            text: self.dir.join(format!("{}.txt", stamp)),
            expected: self.dir.join(format!("{}.expected.json", stamp)),
        };

        fs::write(&pair.text, raw).map_err(err(&pair.text))?;
        let json = serde_json::to_string_pretty(expected)?;
        fs::write(&pair.expected, json).map_err(err(&pair.expected))?;

        info!("Captured fixture {:?}", pair.text);
        Ok(pair)
    }
}
