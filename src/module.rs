//! Session with a Stollmann Bluemod+SR radio module.
//!
//! The module is driven through its AT command interface: after a reset it is
//! configured in plain AT mode, then switched to the multiplexing mode where
//! AT commands, unsolicited responses and peer data share the serial link in
//! length-prefixed frames. See [`ModuleSession`] for the public interface.
//!
//! ```ignore
//! let mut session = ModuleSession::new(0, &settings, transport, reset, clock);
//! loop {
//!     for notification in session.tick() {
//!         // ...
//!     }
//! }
//! ```

mod commands;
mod events;
mod link;
mod state_machine;
mod states;

pub use commands::{AtCommand, CommandEntry, Retry};
pub use link::{Notification, SendRecvState};
pub use state_machine::{ModulePhase, ModuleSession};

/// The MUX channel of the first serial port profile connection.
pub const SPP_CHANNEL: u8 = 0x00;
