use clap::Parser;
use std::path::PathBuf;

use ccpace_core::config::SettingsOverrides;

/// Options shared by both binaries
#[derive(clap::Args, Debug, Clone, Default)]
pub struct CommonArgs {
    /// Enable debug logging
    #[arg(short, long)]
    pub debug: bool,

    /// Path to config file
    #[arg(short, long)]
    pub config: Option<PathBuf>,

    /// Usage CLI to drive (default: claude, then cc)
    #[arg(long)]
    pub command: Option<String>,

    /// Directory for the lock file, tunables and heal history
    #[arg(long)]
    pub state_dir: Option<PathBuf>,

    /// Tunables file location
    #[arg(long)]
    pub tunables: Option<PathBuf>,
}

/// Monitor command line
#[derive(Parser, Debug)]
#[command(
    name = "ccpace",
    version,
    about = "Pace-aware usage monitor for the Claude CLI",
    after_help = "Exit codes:\n  0 - Success\n  1 - Parse/validation failure\n  2 - Lock held by another instance\n  3 - Capture failure (CLI not responding)"
)]
pub struct MonitorArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    /// Run continuously
    #[arg(long = "loop")]
    pub run_loop: bool,

    /// Loop interval in seconds
    #[arg(short, long)]
    pub interval: Option<u64>,

    /// Print the captured output unprocessed
    #[arg(long)]
    pub raw: bool,

    /// Suppress output, exit code only
    #[arg(short, long)]
    pub quiet: bool,
}

impl MonitorArgs {
    pub fn overrides(&self) -> SettingsOverrides {
        SettingsOverrides {
            loop_interval_secs: self.interval,
            ..self.common.overrides()
        }
    }
}

/// Healer command line
#[derive(Parser, Debug)]
#[command(
    name = "ccpace-heal",
    version,
    about = "Self-healing for the ccpace usage parser",
    after_help = "Exit codes:\n  0 - Healed or already working\n  1 - Check failed\n  2 - Lock held by another instance\n  4 - All strategies exhausted\n  130 - Interrupted"
)]
pub struct HealArgs {
    #[command(flatten)]
    pub common: CommonArgs,

    /// Sample once and report, without changing anything
    #[arg(long, conflicts_with_all = ["auto", "history"])]
    pub check: bool,

    /// Heal and commit verified fixes without asking
    #[arg(long)]
    pub auto: bool,

    /// Show the last 10 healing attempts
    #[arg(long, conflicts_with = "auto")]
    pub history: bool,
}

impl HealArgs {
    pub fn overrides(&self) -> SettingsOverrides {
        self.common.overrides()
    }
}

impl CommonArgs {
    pub fn overrides(&self) -> SettingsOverrides {
        SettingsOverrides {
            command: self.command.clone(),
            loop_interval_secs: None,
            state_dir: self.state_dir.clone(),
            tunables_file: self.tunables.clone(),
        }
    }
}
