use std::io::Write;
use std::process::ExitCode;
use std::time::{Duration, Instant};

use anyhow::Result;
use clap::Parser;
use crossterm::{cursor::MoveTo, execute, terminal::Clear, terminal::ClearType};
use tracing::{debug, warn};

use ccpace::cli::MonitorArgs;
use ccpace::display::{render_usage, Colors};
use ccpace::interrupt::Interrupt;
use ccpace::logging::setup_logging;
use ccpace_core::capture::{CaptureDriver, UsageSource};
use ccpace_core::config::{Settings, StatePaths, TunablesStore};
use ccpace_core::error::{EXIT_CAPTURE, EXIT_PARSE};
use ccpace_core::lock::{LockedSource, UsageLock};
use ccpace_core::pipeline::{local_now, sample, Strictness};
use ccpace_core::LockError;

#[tokio::main(flavor = "current_thread")]
async fn main() -> ExitCode {
    let args = MonitorArgs::parse();
    setup_logging(args.common.debug, "warn");

    match run(args).await {
        Ok(code) => ExitCode::from(code),
        Err(e) => {
            eprintln!("Error: {:#}", e);
            ExitCode::from(EXIT_PARSE as u8)
        }
    }
}

async fn run(args: MonitorArgs) -> Result<u8> {
    let mut settings = Settings::load(args.common.config.as_deref())?;
    settings.merge_cli(&args.overrides());
    settings.validate();

    let paths = StatePaths::resolve(&settings.paths);
    // Ctrl+C from here on waits for the current capture so guards unwind
    let interrupt = Interrupt::install()?;

    let lock = match UsageLock::acquire(&paths.lock_file, settings.lock.stale_after()) {
        Ok(lock) => lock,
        Err(e @ LockError::Held { .. }) => {
            eprintln!("Another instance is running");
            debug!("{}", e);
            return Ok(e.exit_code() as u8);
        }
        Err(e) => return Err(e.into()),
    };

    let mut monitor = Monitor {
        lock,
        driver: CaptureDriver::new(&settings),
        store: TunablesStore::new(&paths.tunables_file),
        colors: Colors::new(),
        raw: args.raw,
        quiet: args.quiet,
        debug: args.common.debug,
    };

    if args.run_loop {
        monitor.run_loop(interrupt, settings.loop_interval_secs).await?;
        Ok(0)
    } else {
        Ok(monitor.run_once())
    }
}

struct Monitor {
    lock: UsageLock,
    driver: CaptureDriver,
    store: TunablesStore,
    colors: Colors,
    raw: bool,
    quiet: bool,
    debug: bool,
}

impl Monitor {
    /// One capture and report; returns the exit code
    fn run_once(&mut self) -> u8 {
        let start = Instant::now();

        let tunables = match self.store.load() {
            Ok(t) => t,
            Err(e) => {
                self.report_error("Config Error", &e);
                return EXIT_PARSE as u8;
            }
        };

        let mut source = LockedSource::new(&mut self.driver, &self.lock);

        if self.raw {
            return match source.capture(&tunables) {
                Ok(output) => {
                    println!("{}", output);
                    0
                }
                Err(e) => {
                    self.report_error("Capture Error", &e);
                    EXIT_CAPTURE as u8
                }
            };
        }

        match sample(&mut source, &tunables, local_now, Strictness::Lenient) {
            Ok(p) => {
                for warning in &p.result.warnings {
                    warn!("{}", warning);
                }
                if !self.quiet {
                    print!(
                        "{}",
                        render_usage(&p.result, p.now, start.elapsed(), self.debug, &self.colors)
                    );
                    println!();
                }
                0
            }
            Err(failure) => {
                let label = if failure.error.is_capture() {
                    "Capture Error"
                } else {
                    "Parse Error"
                };
                self.report_error(label, &failure.error);
                failure.exit_code() as u8
            }
        }
    }

    fn report_error(&self, label: &str, error: &dyn std::fmt::Display) {
        if !self.quiet {
            eprintln!("{}: {}", label, error);
        }
    }

    fn touch_lock(&self) {
        if let Err(e) = self.lock.touch() {
            warn!("Failed to refresh lock: {}", e);
        }
    }

    /// Refresh every `interval` seconds until Ctrl+C
    async fn run_loop(&mut self, mut interrupt: Interrupt, interval: u64) -> Result<()> {
        let mut stdout = std::io::stdout();
        loop {
            execute!(stdout, Clear(ClearType::All), MoveTo(0, 0))?;

            // Capture blocks the runtime; an interrupt is seen once it returns
            self.run_once();
            if interrupt.is_set() {
                println!("\nExiting...");
                return Ok(());
            }

            for i in (1..=interval).rev() {
                self.touch_lock();
                print!("\rNext refresh in {:3} seconds... (Ctrl+C to exit)", i);
                stdout.flush()?;

                tokio::select! {
                    _ = tokio::time::sleep(Duration::from_secs(1)) => {}
                    _ = interrupt.wait() => {
                        println!("\nExiting...");
                        return Ok(());
                    }
                }
            }
        }
    }
}
