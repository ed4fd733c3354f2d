//! Error types shared across the capture, parse and healing layers.

use std::path::PathBuf;

use thiserror::Error;

/// Exit code: parse or validation failure
pub const EXIT_PARSE: i32 = 1;
/// Exit code: lock held by another instance
pub const EXIT_LOCKED: i32 = 2;
/// Exit code: capture failure
pub const EXIT_CAPTURE: i32 = 3;
/// Exit code: healer exhausted every strategy
pub const EXIT_EXHAUSTED: i32 = 4;

/// The driven CLI did not produce recognizable output in time
#[derive(Debug, Error)]
pub enum CaptureError {
    /// Neither the configured command nor any known fallback answered `--version`
    #[error("usage CLI not found (tried: {tried})")]
    CommandNotFound { tried: String },

    /// The pseudo-terminal or child process could not be created
    #[error("failed to spawn capture session: {0}")]
    Spawn(String),

    /// Every attempt ran into the capture timeout
    #[error("capture timed out after {secs}s ({attempts} attempts)")]
    Timeout { secs: u64, attempts: u32 },

    /// Attempts finished but none passed the structural check
    #[error("failed to capture complete output after {attempts} attempts")]
    Incomplete { attempts: u32 },

    /// I/O while talking to the session
    #[error("capture i/o error: {0}")]
    Io(#[from] std::io::Error),
}

/// Failure to read, write or interpret configuration
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path:?}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse {path:?}: {source}")]
    Parse {
        path: PathBuf,
        source: toml::de::Error,
    },

    #[error("failed to serialize tunables: {0}")]
    Serialize(#[from] toml::ser::Error),

    #[error("failed to write {path:?}: {source}")]
    Write {
        path: PathBuf,
        source: std::io::Error,
    },

    /// A pattern tunable does not compile
    #[error("invalid {name} pattern '{pattern}': {source}")]
    Pattern {
        name: &'static str,
        pattern: String,
        source: regex::Error,
    },

    /// A patch tried to store a value of the wrong kind
    #[error("tunable {key} expects {expected}")]
    TypeMismatch {
        key: &'static str,
        expected: &'static str,
    },
}

/// Top-level error for one capture → parse → validate run
#[derive(Debug, Error)]
pub enum UsageError {
    #[error(transparent)]
    Capture(#[from] CaptureError),

    /// Normalized output could not yield required fields
    #[error("{0}")]
    Parse(String),

    /// Fields were extracted but are semantically inconsistent
    #[error("{0}")]
    Validation(String),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

impl UsageError {
    /// Process exit code for this failure
    pub fn exit_code(&self) -> i32 {
        match self {
            UsageError::Capture(_) => EXIT_CAPTURE,
            UsageError::Parse(_) | UsageError::Validation(_) | UsageError::Config(_) => {
                EXIT_PARSE
            }
        }
    }

    /// Whether this failure came from the capture layer
    pub fn is_capture(&self) -> bool {
        matches!(self, UsageError::Capture(_))
    }
}

/// Failure to acquire the single-instance lock
#[derive(Debug, Error)]
pub enum LockError {
    #[error("another instance is running (lock: {path:?})")]
    Held { path: PathBuf },

    #[error("lock file error at {path:?}: {source}")]
    Io {
        path: PathBuf,
        source: std::io::Error,
    },
}

impl LockError {
    /// Only contention means "busy"; I/O failures are general errors
    pub fn exit_code(&self) -> i32 {
        match self {
            LockError::Held { .. } => EXIT_LOCKED,
            LockError::Io { .. } => EXIT_PARSE,
        }
    }
}

/// Persistence failures inside the healing layer
#[derive(Debug, Error)]
pub enum HealError {
    #[error(transparent)]
    Config(#[from] ConfigError),

    #[error("history log {path:?}: {source}")]
    History {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("fixture {path:?}: {source}")]
    Fixture {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to encode json: {0}")]
    Json(#[from] serde_json::Error),

    #[error("commit failed: {0}")]
    Commit(String),
}
