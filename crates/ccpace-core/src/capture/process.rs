//! Stray process cleanup.
//!
//! A hung `/usage` child keeps the CLI's session busy and corrupts the next
//! capture, so matching processes are force-killed before and after every
//! attempt.

use std::path::Path;
use std::process::{Command, Stdio};

use nix::sys::signal::{self, Signal};
use nix::unistd::Pid;
use tracing::debug;

const PROC_DIR: &str = "/proc";

/// Read a process command line from /proc with NUL separators as spaces
fn read_cmdline(proc_dir: &Path, pid: u32) -> Option<String> {
    std::fs::read_to_string(proc_dir.join(pid.to_string()).join("cmdline"))
        .ok()
        .map(|s| s.replace('\0', " ").trim().to_string())
}

/// PIDs under `proc_dir` whose command line contains `pattern`
fn matching_pids(proc_dir: &Path, pattern: &str, exclude: u32) -> Vec<u32> {
    let Ok(entries) = std::fs::read_dir(proc_dir) else {
        return Vec::new();
    };

    entries
        .flatten()
        .filter_map(|entry| entry.file_name().to_str()?.parse::<u32>().ok())
        .filter(|pid| *pid != exclude)
        .filter(|pid| {
            read_cmdline(proc_dir, *pid)
                .map(|cmdline| cmdline.contains(pattern))
                .unwrap_or(false)
        })
        .collect()
}

/// SIGKILL every process whose command line contains `pattern`.
///
/// Scans /proc where available and falls back to `pkill -f` elsewhere.
/// Returns the number of processes signalled (unknown for the fallback).
pub fn kill_matching(pattern: &str) -> usize {
    let proc_dir = Path::new(PROC_DIR);
    if !proc_dir.is_dir() {
        let status = Command::new("pkill")
            .args(["-9", "-f", pattern])
            .stdout(Stdio::null())
            .stderr(Stdio::null())
            .status();
        debug!("pkill -f {:?}: {:?}", pattern, status);
        return 0;
    }

    let mut killed = 0;
    for pid in matching_pids(proc_dir, pattern, std::process::id()) {
        let Ok(raw) = i32::try_from(pid) else {
            continue;
        };
        match signal::kill(Pid::from_raw(raw), Signal::SIGKILL) {
            Ok(()) => {
                debug!("Killed stray process {} matching {:?}", pid, pattern);
                killed += 1;
            }
            Err(e) => debug!("Failed to kill {}: {}", pid, e),
        }
    }
    killed
}
