mod settings;
mod store;
mod tunables;

pub use settings::{
    HealSettings, LockSettings, PathSettings, Settings, SettingsOverrides, TerminalSettings,
};
pub use store::TunablesStore;
pub use tunables::{
    CaptureTunables, FormatList, FormatTunables, PatternTunables, TunableKey, TunableValue,
    Tunables, ValidationTunables,
};

use std::fs;
use std::path::{Path, PathBuf};

use serde::de::DeserializeOwned;

use crate::error::ConfigError;

/// Environment variable overriding the state directory
pub const STATE_DIR_ENV: &str = "CCPACE_STATE_DIR";

/// Resolved on-disk locations for one run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StatePaths {
    pub state_dir: PathBuf,
    pub lock_file: PathBuf,
    pub tunables_file: PathBuf,
    pub history_file: PathBuf,
    pub fixture_dir: PathBuf,
}

impl StatePaths {
    /// Resolve paths from settings overrides, the environment and platform defaults
    pub fn resolve(paths: &PathSettings) -> Self {
        let state_dir = paths.state_dir.clone().unwrap_or_else(default_state_dir);
        Self {
            lock_file: state_dir.join("usage.lock"),
            tunables_file: paths
                .tunables_file
                .clone()
                .unwrap_or_else(|| state_dir.join("tunables.toml")),
            history_file: paths
                .history_file
                .clone()
                .unwrap_or_else(|| state_dir.join("heal_history.json")),
            fixture_dir: paths
                .fixture_dir
                .clone()
                .unwrap_or_else(|| state_dir.join("fixtures")),
            state_dir,
        }
    }
}

/// `$CCPACE_STATE_DIR`, else the platform cache dir, else the temp dir
pub fn default_state_dir() -> PathBuf {
    if let Some(dir) = std::env::var_os(STATE_DIR_ENV).filter(|v| !v.is_empty()) {
        return PathBuf::from(dir);
    }
    dirs::cache_dir()
        .unwrap_or_else(std::env::temp_dir)
        .join("ccpace")
}

pub(crate) fn read_toml<T: DeserializeOwned>(path: &Path) -> Result<T, ConfigError> {
    let content = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.to_path_buf(),
        source,
    })?;
    toml::from_str(&content).map_err(|source| ConfigError::Parse {
        path: path.to_path_buf(),
        source,
    })
}
