//! System status reporting.
//!
//! The link reports coarse progress (module initialising, radio ready, peers
//! connected) to whatever the host uses as a status channel. On a board this
//! is usually an LED; the CLI logs it.

use log::info;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum LinkStatus {
    /// The radio module is being reset and configured.
    Initializing,
    /// The radio module is in MUX mode and no peer is connected.
    Ready,
    /// At least one peer is connected.
    Operating,
}

pub trait StatusIndicator {
    fn set_status(&mut self, status: LinkStatus);
}

/// Writes status changes to the log, skipping repeats.
#[derive(Debug, Default)]
pub struct LogStatus {
    current: Option<LinkStatus>,
}
impl LogStatus {
    pub fn current(&self) -> Option<LinkStatus> {
        self.current
    }
}
impl StatusIndicator for LogStatus {
    fn set_status(&mut self, status: LinkStatus) {
        if self.current != Some(status) {
            info!("status: {:?}", status);
            self.current = Some(status);
        }
    }
}
