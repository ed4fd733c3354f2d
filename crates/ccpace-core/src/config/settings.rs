use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

use super::read_toml;
use crate::error::ConfigError;

/// Application settings (from config file)
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Settings {
    /// Usage CLI to drive; `None` auto-discovers `claude`, then `cc`
    #[serde(default)]
    pub command: Option<String>,

    /// Loop mode refresh interval in seconds
    #[serde(default = "default_loop_interval")]
    pub loop_interval_secs: u64,

    /// Virtual terminal geometry for the scripted session
    #[serde(default)]
    pub terminal: TerminalSettings,

    /// Lock file settings
    #[serde(default)]
    pub lock: LockSettings,

    /// File location overrides
    #[serde(default)]
    pub paths: PathSettings,

    /// Self-healing settings
    #[serde(default)]
    pub heal: HealSettings,
}

fn default_loop_interval() -> u64 {
    300
}

/// Virtual terminal geometry
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TerminalSettings {
    #[serde(default = "default_rows")]
    pub rows: u16,

    #[serde(default = "default_cols")]
    pub cols: u16,
}

fn default_rows() -> u16 {
    50
}

fn default_cols() -> u16 {
    160
}

impl Default for TerminalSettings {
    fn default() -> Self {
        Self {
            rows: default_rows(),
            cols: default_cols(),
        }
    }
}

/// Lock file settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LockSettings {
    /// A lock untouched for this long is considered abandoned
    #[serde(default = "default_stale_after")]
    pub stale_after_secs: u64,
}

fn default_stale_after() -> u64 {
    300
}

impl Default for LockSettings {
    fn default() -> Self {
        Self {
            stale_after_secs: default_stale_after(),
        }
    }
}

impl LockSettings {
    pub fn stale_after(&self) -> Duration {
        Duration::from_secs(self.stale_after_secs)
    }
}

/// Optional overrides for where state lives
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct PathSettings {
    /// Directory for the lock file and default history/fixture locations
    #[serde(default)]
    pub state_dir: Option<PathBuf>,

    /// Tunables record location
    #[serde(default)]
    pub tunables_file: Option<PathBuf>,

    /// Where verified fixes drop their fixture pairs
    #[serde(default)]
    pub fixture_dir: Option<PathBuf>,

    /// Healing audit log
    #[serde(default)]
    pub history_file: Option<PathBuf>,
}

/// Self-healing settings
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct HealSettings {
    /// Outer iteration bound of the healing loop
    #[serde(default = "default_max_iterations")]
    pub max_iterations: u32,

    /// Live trials per verification (kept odd)
    #[serde(default = "default_verify_attempts")]
    pub verify_attempts: u32,

    /// Trials that must pass (kept a strict majority)
    #[serde(default = "default_verify_threshold")]
    pub verify_threshold: u32,

    /// Pause between verification trials in milliseconds
    #[serde(default = "default_verify_delay")]
    pub verify_delay_ms: u64,

    /// Entries retained in the history log
    #[serde(default = "default_history_cap")]
    pub history_cap: usize,
}

fn default_max_iterations() -> u32 {
    3
}

fn default_verify_attempts() -> u32 {
    3
}

fn default_verify_threshold() -> u32 {
    2
}

fn default_verify_delay() -> u64 {
    1000
}

fn default_history_cap() -> usize {
    100
}

impl Default for HealSettings {
    fn default() -> Self {
        Self {
            max_iterations: default_max_iterations(),
            verify_attempts: default_verify_attempts(),
            verify_threshold: default_verify_threshold(),
            verify_delay_ms: default_verify_delay(),
            history_cap: default_history_cap(),
        }
    }
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            command: None,
            loop_interval_secs: default_loop_interval(),
            terminal: TerminalSettings::default(),
            lock: LockSettings::default(),
            paths: PathSettings::default(),
            heal: HealSettings::default(),
        }
    }
}

/// Values given on the command line, applied over the config file
#[derive(Debug, Clone, Default)]
pub struct SettingsOverrides {
    pub command: Option<String>,
    pub loop_interval_secs: Option<u64>,
    pub state_dir: Option<PathBuf>,
    pub tunables_file: Option<PathBuf>,
}

impl Settings {
    /// Load settings from config file or use defaults
    pub fn load(path: Option<&Path>) -> Result<Self, ConfigError> {
        // Try custom path first
        if let Some(p) = path {
            if p.exists() {
                return read_toml(p);
            }
        }

        let default_paths = [
            dirs::config_dir().map(|p| p.join("ccpace/config.toml")),
            dirs::home_dir().map(|p| p.join(".config/ccpace/config.toml")),
            dirs::home_dir().map(|p| p.join(".ccpace.toml")),
        ];

        for path in default_paths.iter().flatten() {
            if path.exists() {
                return read_toml(path);
            }
        }

        Ok(Self::default())
    }

    /// Merge CLI overrides into settings
    pub fn merge_cli(&mut self, cli: &SettingsOverrides) {
        if let Some(ref command) = cli.command {
            self.command = Some(command.clone());
        }
        if let Some(interval) = cli.loop_interval_secs {
            self.loop_interval_secs = interval;
        }
        if let Some(ref dir) = cli.state_dir {
            self.paths.state_dir = Some(dir.clone());
        }
        if let Some(ref file) = cli.tunables_file {
            self.paths.tunables_file = Some(file.clone());
        }
    }

    /// Validate and normalize settings values
    pub fn validate(&mut self) {
        if self.loop_interval_secs == 0 {
            self.loop_interval_secs = 1;
        }
        if self.terminal.rows == 0 {
            self.terminal.rows = default_rows();
        }
        if self.terminal.cols == 0 {
            self.terminal.cols = default_cols();
        }

        let heal = &mut self.heal;
        if heal.max_iterations == 0 {
            heal.max_iterations = 1;
        }
        if heal.verify_attempts == 0 {
            heal.verify_attempts = 1;
        }
        if heal.verify_attempts % 2 == 0 {
            heal.verify_attempts += 1;
        }
        let majority = heal.verify_attempts / 2 + 1;
        heal.verify_threshold = heal.verify_threshold.clamp(majority, heal.verify_attempts);
        if heal.history_cap == 0 {
            heal.history_cap = default_history_cap();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_settings() {
        let settings = Settings::default();
        assert_eq!(settings.loop_interval_secs, 300);
        assert_eq!(settings.terminal.rows, 50);
        assert_eq!(settings.terminal.cols, 160);
        assert_eq!(settings.lock.stale_after(), Duration::from_secs(300));
        assert_eq!(settings.heal.verify_attempts, 3);
        assert_eq!(settings.heal.verify_threshold, 2);
        assert!(settings.command.is_none());
    }

    #[test]
    fn test_parse_toml() {
        let toml = r#"
            command = "cc"
            loop_interval_secs = 60

            [heal]
            max_iterations = 5
        "#;

        let settings: Settings = toml::from_str(toml).expect("Should parse TOML");
        assert_eq!(settings.command.as_deref(), Some("cc"));
        assert_eq!(settings.loop_interval_secs, 60);
        assert_eq!(settings.heal.max_iterations, 5);
        assert_eq!(settings.heal.verify_attempts, 3);
    }

    #[test]
    fn test_validate_keeps_strict_majority() {
        let mut settings = Settings::default();
        settings.heal.verify_attempts = 4;
        settings.heal.verify_threshold = 1;
        settings.validate();
        assert_eq!(settings.heal.verify_attempts, 5);
        assert_eq!(settings.heal.verify_threshold, 3);

        settings.heal.verify_threshold = 9;
        settings.validate();
        assert_eq!(settings.heal.verify_threshold, 5);
    }

    #[test]
    fn test_merge_cli() {
        let mut settings = Settings {
            command: Some("claude".into()),
            ..Settings::default()
        };
        settings.merge_cli(&SettingsOverrides {
            loop_interval_secs: Some(0),
            state_dir: Some(PathBuf::from("/tmp/ccpace-test")),
            ..SettingsOverrides::default()
        });
        assert_eq!(settings.command.as_deref(), Some("claude"));
        assert_eq!(settings.paths.state_dir, Some(PathBuf::from("/tmp/ccpace-test")));

        settings.validate();
        assert_eq!(settings.loop_interval_secs, 1);
    }

    #[test]
    fn test_load_explicit_path() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("config.toml");
        std::fs::write(&path, "loop_interval_secs = 42\n").unwrap();
        let settings = Settings::load(Some(&path)).unwrap();
        assert_eq!(settings.loop_interval_secs, 42);
    }
}
