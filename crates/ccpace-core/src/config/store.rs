//! File-backed persistence for [`Tunables`].

use std::fs::{self, OpenOptions};
use std::io::Write;
use std::path::{Path, PathBuf};

use tracing::debug;

use super::read_toml;
use super::tunables::Tunables;
use crate::error::ConfigError;

/// Loads and saves the tunables record
#[derive(Debug, Clone)]
pub struct TunablesStore {
    path: PathBuf,
}

impl TunablesStore {
    pub fn new(path: impl Into<PathBuf>) -> Self {
        Self { path: path.into() }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    /// Load the record, falling back to defaults when the file does not exist
    pub fn load(&self) -> Result<Tunables, ConfigError> {
        if !self.path.exists() {
            debug!("No tunables file at {:?}, using defaults", self.path);
            return Ok(Tunables::default());
        }
        read_toml(&self.path)
    }

    /// Deterministic TOML rendering of a record
    pub fn render(tunables: &Tunables) -> Result<String, ConfigError> {
        Ok(toml::to_string_pretty(tunables)?)
    }

    /// Write the record atomically (temp file + rename)
    pub fn save(&self, tunables: &Tunables) -> Result<(), ConfigError> {
        let rendered = Self::render(tunables)?;
        self.write_bytes(rendered.as_bytes())
    }

    fn write_bytes(&self, bytes: &[u8]) -> Result<(), ConfigError> {
        let write_err = |source: std::io::Error| ConfigError::Write {
            path: self.path.clone(),
            source,
        };

        if let Some(dir) = self.path.parent() {
            if !dir.as_os_str().is_empty() {
                fs::create_dir_all(dir).map_err(write_err)?;
            }
        }

        let temp_path = self.path.with_extension("toml.tmp");
        let _ = fs::remove_file(&temp_path);

        let mut file = OpenOptions::new()
            .write(true)
            .create_new(true)
            .open(&temp_path)
            .map_err(write_err)?;
        file.write_all(bytes).map_err(write_err)?;
        file.sync_all().map_err(write_err)?;
        fs::rename(&temp_path, &self.path).map_err(write_err)?;
        Ok(())
    }
}
