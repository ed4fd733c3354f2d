use std::io::{BufRead, IsTerminal, Write};
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::atomic::AtomicBool;
use std::sync::Arc;

use anyhow::{Context, Result};
use clap::Parser;
use tracing::{debug, info, warn};

use ccpace::cli::HealArgs;
use ccpace::interrupt::Interrupt;
use ccpace::logging::setup_logging;
use ccpace_core::capture::CaptureDriver;
use ccpace_core::config::{Settings, StatePaths, TunablesStore};
use ccpace_core::error::{EXIT_EXHAUSTED, EXIT_PARSE};
use ccpace_core::heal::{
    Committer, FixtureWriter, GitCommitter, HealOptions, HealResult, Healer, HistoryLog,
};
use ccpace_core::lock::{LockedSource, UsageLock};
use ccpace_core::LockError;

const HISTORY_SHOWN: usize = 10;

/// Conventional exit status after SIGINT
const EXIT_INTERRUPTED: u8 = 130;

#[tokio::main]
async fn main() -> ExitCode {
    let args = HealArgs::parse();
    setup_logging(args.common.debug, "info");

    // The healer blocks; the listener runs on a worker and the healer stops
    // between strategies once the flag is set
    let outcome = match Interrupt::install() {
        Ok(interrupt) => {
            let cancel = interrupt.flag();
            tokio::task::spawn_blocking(move || run(args, cancel))
                .await
                .unwrap_or_else(|e| Err(anyhow::anyhow!("healer task failed: {}", e)))
        }
        Err(e) => Err(e.into()),
    };

    match outcome {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::from(EXIT_PARSE as u8)
        }
    }
}

fn run(args: HealArgs, cancel: Arc<AtomicBool>) -> Result<u8> {
    let mut settings = Settings::load(args.common.config.as_deref())?;
    settings.merge_cli(&args.overrides());
    settings.validate();
    let paths = StatePaths::resolve(&settings.paths);

    let history = HistoryLog::new(&paths.history_file, settings.heal.history_cap);
    if args.history {
        print_history(&history);
        return Ok(0);
    }

    let lock = match UsageLock::acquire(&paths.lock_file, settings.lock.stale_after()) {
        Ok(lock) => lock,
        Err(e @ LockError::Held { .. }) => {
            eprintln!("Another instance is running");
            debug!("{}", e);
            return Ok(e.exit_code() as u8);
        }
        Err(e) => return Err(e.into()),
    };

    let store = TunablesStore::new(&paths.tunables_file);
    let committer = GitCommitter::for_file(store.path());
    let mut healer = Healer::new(
        LockedSource::new(CaptureDriver::new(&settings), &lock),
        committer,
        store,
        history,
        FixtureWriter::new(&paths.fixture_dir),
        HealOptions::from_settings(&settings.heal, args.auto),
    )
    .with_cancel(cancel);

    if args.check {
        return Ok(match healer.check() {
            Ok(()) => {
                println!("Parser OK");
                0
            }
            Err(e) => {
                println!("Parser FAILED: {}", e);
                1
            }
        });
    }

    info!("Starting self-heal");
    let result = healer.run().context("healing run failed")?;
    print_result(&result);
    if result.interrupted {
        return Ok(EXIT_INTERRUPTED);
    }

    let can_commit = healer.committer().available();
    if result.success && !result.committed && !args.auto && can_commit {
        if let Some(ref fix) = result.fix {
            if confirm("Commit this fix?")? {
                let extra: Vec<PathBuf> = result
                    .fixture
                    .iter()
                    .flat_map(|p| [p.text.clone(), p.expected.clone()])
                    .collect();
                match healer.commit(fix, &extra) {
                    Ok(true) => println!("Committed."),
                    Ok(false) => println!("Not committed: no repository"),
                    Err(e) => warn!("Failed to commit fix: {}", e),
                }
            }
        }
    }

    Ok(if result.success { 0 } else { EXIT_EXHAUSTED as u8 })
}

fn print_result(result: &HealResult) {
    let status = if result.success { "SUCCESS" } else { "FAILED" };
    println!("\n{}: {}", status, result.message);
    if let Some(ref fix) = result.fix {
        println!("  Fix: {} ({})", fix.name, fix.description);
        for patch in &fix.patches {
            println!("    {}", patch);
        }
    }
    if let Some(ref fixture) = result.fixture {
        println!("  Fixture: {}", fixture.text.display());
    }
    if result.iterations > 0 {
        println!("  Iterations: {}", result.iterations);
    }
}

fn print_history(history: &HistoryLog) {
    let entries = history.last(HISTORY_SHOWN);
    if entries.is_empty() {
        println!("No healing history");
        return;
    }
    println!("Recent healing attempts:");
    for entry in entries {
        println!("  {}", entry.summary());
    }
}

/// Ask a yes/no question; non-interactive runs answer no
fn confirm(question: &str) -> Result<bool> {
    if !std::io::stdin().is_terminal() {
        debug!("Not a terminal, skipping commit prompt");
        return Ok(false);
    }

    print!("{} [y/N] ", question);
    std::io::stdout().flush()?;

    let mut answer = String::new();
    std::io::stdin().lock().read_line(&mut answer)?;
    Ok(matches!(answer.trim().to_lowercase().as_str(), "y" | "yes"))
}
