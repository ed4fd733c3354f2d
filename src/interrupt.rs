use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;

use tokio::signal::unix::{signal, SignalKind};
use tokio::sync::watch;
use tracing::{info, warn};

/// Latched Ctrl+C.
///
/// Installing it replaces the default SIGINT action, so an interrupt no
/// longer kills the process mid-capture: blocking work polls [`flag`] and
/// async code awaits [`Interrupt::wait`], and the lock and PTY guards drop
/// normally on the way out.
///
/// [`flag`]: Interrupt::flag
#[derive(Debug, Clone)]
pub struct Interrupt {
    flag: Arc<AtomicBool>,
    notify: watch::Receiver<bool>,
}

impl Interrupt {
    /// Register the handler immediately and latch it from a background task.
    /// Must run inside a tokio runtime.
    pub fn install() -> std::io::Result<Self> {
        let mut sigint = signal(SignalKind::interrupt())?;
        let flag = Arc::new(AtomicBool::new(false));
        let (tx, notify) = watch::channel(false);

        let latch = flag.clone();
        tokio::spawn(async move {
            if sigint.recv().await.is_some() {
                info!("Interrupt received, finishing current step");
                latch.store(true, Ordering::SeqCst);
                let _ = tx.send(true);
            }
        });

        Ok(Self { flag, notify })
    }

    pub fn flag(&self) -> Arc<AtomicBool> {
        self.flag.clone()
    }

    pub fn is_set(&self) -> bool {
        self.flag.load(Ordering::SeqCst)
    }

    /// Resolve once Ctrl+C has been pressed
    pub async fn wait(&mut self) {
        if self.notify.wait_for(|stopped| *stopped).await.is_err() {
            warn!("Interrupt listener ended");
            std::future::pending::<()>().await;
        }
    }
}
