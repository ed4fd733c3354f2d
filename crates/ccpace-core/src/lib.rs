//! ccpace-core: capture, parse, validate and self-heal Claude CLI usage readings
//!
//! The pipeline runs capture → normalize → extract → resolve → validate.
//! When a run fails, the [`heal`] layer classifies the failure, applies
//! reversible patches to the [`config::Tunables`] record and keeps only the
//! patches that pass majority verification against live output.

pub mod capture;
pub mod config;
pub mod error;
pub mod heal;
pub mod lock;
pub mod pace;
pub mod parse;
pub mod pipeline;
pub mod validate;

pub use error::{CaptureError, ConfigError, HealError, LockError, UsageError};
