//! Scripted pseudo-terminal session.
//!
//! Runs one command inside a PTY of fixed geometry and accumulates its output
//! in a shared buffer fed by a reader thread. Dropping the session kills and
//! reaps the child and joins the reader, on every exit path.

use std::io::{Read, Write};
use std::path::PathBuf;
use std::sync::Arc;
use std::thread::{self, JoinHandle};
use std::time::{Duration, Instant};

use parking_lot::Mutex;
use portable_pty::{native_pty_system, Child, ChildKiller, CommandBuilder, MasterPty, PtySize};
use tracing::debug;

use crate::error::CaptureError;

/// What to run and how big the virtual terminal is
#[derive(Debug, Clone)]
pub struct SessionConfig {
    pub command: String,
    pub args: Vec<String>,
    pub rows: u16,
    pub cols: u16,
    /// Working directory (the home directory by default)
    pub cwd: Option<PathBuf>,
}

/// A running PTY session
pub struct TerminalSession {
    child: Box<dyn Child + Send + Sync>,
    writer: Box<dyn Write + Send>,
    output: Arc<Mutex<Vec<u8>>>,
    reader: Option<JoinHandle<()>>,
    _master: Box<dyn MasterPty + Send>,
}

impl TerminalSession {
    /// Open a PTY and spawn the command in it
    pub fn spawn(config: &SessionConfig) -> Result<Self, CaptureError> {
        let pair = native_pty_system()
            .openpty(PtySize {
                rows: config.rows,
                cols: config.cols,
                pixel_width: 0,
                pixel_height: 0,
            })
            .map_err(|e| CaptureError::Spawn(format!("failed to open PTY: {}", e)))?;

        let mut cmd = CommandBuilder::new(&config.command);
        cmd.args(&config.args);
        cmd.env("LINES", config.rows.to_string());
        cmd.env("COLUMNS", config.cols.to_string());
        if let Some(cwd) = config.cwd.clone().or_else(dirs::home_dir) {
            cmd.cwd(cwd);
        }

        let child = pair
            .slave
            .spawn_command(cmd)
            .map_err(|e| CaptureError::Spawn(format!("failed to spawn {}: {}", config.command, e)))?;
        // Only the child keeps the slave side open, so the reader sees EOF when it exits
        drop(pair.slave);

        debug!(
            "Spawned {} {:?} with PID {:?}",
            config.command,
            config.args,
            child.process_id()
        );

        let pty_io = pair
            .master
            .try_clone_reader()
            .and_then(|reader| Ok((reader, pair.master.take_writer()?)));
        let (mut reader, writer) = match pty_io {
            Ok(io) => io,
            Err(e) => {
                let mut child = child;
                kill_and_reap(child.as_mut());
                return Err(CaptureError::Spawn(format!("failed to attach to PTY: {}", e)));
            }
        };

        let output = Arc::new(Mutex::new(Vec::new()));
        let output_reader = output.clone();
        let reader_thread = thread::spawn(move || {
            let mut buf = [0u8; 4096];
            loop {
                match reader.read(&mut buf) {
                    Ok(0) => break, // EOF
                    Ok(n) => output_reader.lock().extend_from_slice(&buf[..n]),
                    Err(e) if e.kind() == std::io::ErrorKind::Interrupted => continue,
                    Err(e) => {
                        debug!("PTY read ended: {}", e);
                        break;
                    }
                }
            }
        });

        Ok(Self {
            child,
            writer,
            output,
            reader: Some(reader_thread),
            _master: pair.master,
        })
    }

    /// Everything the child has written so far (lossy UTF-8)
    pub fn output(&self) -> String {
        String::from_utf8_lossy(&self.output.lock()).into_owned()
    }

    /// Type into the session
    pub fn send(&mut self, input: &str) -> std::io::Result<()> {
        self.writer.write_all(input.as_bytes())?;
        self.writer.flush()
    }

    /// Whether the child is still alive
    pub fn is_running(&mut self) -> bool {
        matches!(self.child.try_wait(), Ok(None))
    }

    pub fn pid(&self) -> Option<u32> {
        self.child.process_id()
    }
}

impl Drop for TerminalSession {
    fn drop(&mut self) {
        kill_and_reap(self.child.as_mut());

        if let Some(handle) = self.reader.take() {
            join_thread_with_timeout(handle, Duration::from_secs(1));
        }
    }
}

/// Kill the child if it is still running, then wait for it
fn kill_and_reap(child: &mut (dyn Child + Send + Sync)) {
    if matches!(child.try_wait(), Ok(None)) {
        if let Err(e) = child.kill() {
            debug!("Failed to kill session child: {}", e);
        }
    }
    let _ = child.wait();
}

/// Join a thread with a timeout, abandoning it if it doesn't finish in time
fn join_thread_with_timeout<T>(handle: JoinHandle<T>, timeout: Duration) {
    let start = Instant::now();
    loop {
        if handle.is_finished() {
            let _ = handle.join();
            return;
        }
        if start.elapsed() >= timeout {
            debug!("Reader join timed out, abandoning thread");
            return;
        }
        thread::sleep(Duration::from_millis(10));
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn shell(script: &str) -> SessionConfig {
        SessionConfig {
            command: "sh".into(),
            args: vec!["-c".into(), script.into()],
            rows: 50,
            cols: 160,
            cwd: Some(std::env::temp_dir()),
        }
    }

    fn wait_for(session: &mut TerminalSession, needle: &str) -> bool {
        let deadline = Instant::now() + Duration::from_secs(5);
        while Instant::now() < deadline {
            if session.output().contains(needle) {
                return true;
            }
            thread::sleep(Duration::from_millis(20));
        }
        false
    }

    #[test]
    fn test_captures_output_and_geometry() {
        let mut session = TerminalSession::spawn(&shell("echo \"size $COLUMNS x $LINES\"")).unwrap();
        assert!(wait_for(&mut session, "size 160 x 50"));
    }

    #[test]
    fn test_send_reaches_child() {
        let mut session =
            TerminalSession::spawn(&shell("printf 'Yes, proceed? '; read answer; echo answered")).unwrap();
        assert!(wait_for(&mut session, "Yes, proceed"));
        session.send("\r").unwrap();
        assert!(wait_for(&mut session, "answered"));
    }

    #[test]
    fn test_drop_kills_running_child() {
        let mut session = TerminalSession::spawn(&shell("sleep 30")).unwrap();
        assert!(session.is_running());
        let started = Instant::now();
        drop(session);
        assert!(started.elapsed() < Duration::from_secs(5));
    }

    #[test]
    fn test_kill_and_reap_leaves_no_child() {
        let pair = native_pty_system()
            .openpty(PtySize {
                rows: 24,
                cols: 80,
                pixel_width: 0,
                pixel_height: 0,
            })
            .unwrap();
        let mut cmd = CommandBuilder::new("sleep");
        cmd.arg("30");
        let mut child = pair.slave.spawn_command(cmd).unwrap();
        let pid = child.process_id().unwrap() as i32;

        kill_and_reap(child.as_mut());
        assert!(matches!(child.try_wait(), Ok(Some(_))));
        assert!(nix::sys::signal::kill(nix::unistd::Pid::from_raw(pid), None).is_err());
    }

    #[test]
    fn test_spawn_failure_is_typed() {
        let config = SessionConfig {
            command: "/nonexistent/ccpace-test-binary".into(),
            ..shell("")
        };
        assert!(matches!(
            TerminalSession::spawn(&config),
            Err(CaptureError::Spawn(_))
        ));
    }
}
