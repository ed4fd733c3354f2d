//! Reversible patch records over [`Tunables`].

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::config::{FormatList, TunableKey, TunableValue, Tunables};
use crate::error::ConfigError;

/// One delta plus enough information to invert it
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Patch {
    /// Assign `to`; reverting assigns `from`
    Set {
        key: TunableKey,
        from: TunableValue,
        to: TunableValue,
    },
    /// Put `format` at the head of a format list; reverting removes it
    AddFormat { list: FormatList, format: String },
}

impl Patch {
    pub fn apply(&self, tunables: &mut Tunables) -> Result<(), ConfigError> {
        match self {
            Patch::Set { key, to, .. } => tunables.set(*key, to),
            Patch::AddFormat { list, format } => {
                if !tunables.formats.contains(*list, format) {
                    tunables.formats.list_mut(*list).insert(0, format.clone());
                }
                Ok(())
            }
        }
    }

    pub fn revert(&self, tunables: &mut Tunables) -> Result<(), ConfigError> {
        match self {
            Patch::Set { key, from, .. } => tunables.set(*key, from),
            Patch::AddFormat { list, format } => {
                tunables.formats.list_mut(*list).retain(|f| f != format);
                Ok(())
            }
        }
    }
}

impl fmt::Display for Patch {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Patch::Set { key, from, to } => write!(f, "{}: {} -> {}", key, from, to),
            Patch::AddFormat { list, format } => write!(f, "formats.{} += '{}'", list, format),
        }
    }
}

/// A named, reversible adjustment produced by a healing strategy
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Fix {
    /// Strategy that produced it
    pub name: String,
    pub description: String,
    pub patches: Vec<Patch>,
}

impl Fix {
    pub fn new(name: impl Into<String>, description: impl Into<String>, patches: Vec<Patch>) -> Self {
        Self {
            name: name.into(),
            description: description.into(),
            patches,
        }
    }

    /// Apply every patch in order
    pub fn apply(&self, tunables: &mut Tunables) -> Result<(), ConfigError> {
        for patch in &self.patches {
            patch.apply(tunables)?;
        }
        Ok(())
    }

    /// Revert every patch in reverse order
    pub fn rollback(&self, tunables: &mut Tunables) -> Result<(), ConfigError> {
        for patch in self.patches.iter().rev() {
            patch.revert(tunables)?;
        }
        Ok(())
    }
}
