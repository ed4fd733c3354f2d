//! Terminal capture of the usage screen.

mod driver;
mod process;
mod session;

pub use driver::{is_complete_capture, Attempt, CaptureDriver, WaitOutcome};
pub use process::kill_matching;
pub use session::{SessionConfig, TerminalSession};

use crate::config::Tunables;
use crate::error::CaptureError;

/// Something that can produce raw usage-screen output.
///
/// The live implementation is [`CaptureDriver`]; the healing layer only
/// depends on this trait so it can be driven by scripted sources.
pub trait UsageSource {
    /// Capture raw output using the current tunables
    fn capture(&mut self, tunables: &Tunables) -> Result<String, CaptureError>;
}

impl<S: UsageSource + ?Sized> UsageSource for &mut S {
    fn capture(&mut self, tunables: &Tunables) -> Result<String, CaptureError> {
        (**self).capture(tunables)
    }
}
