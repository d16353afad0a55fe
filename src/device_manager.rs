//! Serial port lifecycle of the `bluemod` host.
//!
//! Finds the serial port the radio module is attached to, opens it, and runs
//! the [`Gateway`](crate::gateway::Gateway) over it until the link fails or a
//! shutdown is requested. A failed link sends the device manager back to
//! waiting for the port, so the USB adapter can be unplugged and plugged
//! again without restarting.
//!
//! **Example** - Executing the state machine event loop:
//! ```no_run
//! use bluemod as bm;
//!
//! let settings = bm::SettingsBuilder::default().finalize();
//! let mut dm = bm::factory(settings);
//! let status = dm.run(); // status code returned after the `Exit` event
//! println!("status: {}", status);
//! std::process::exit(0);
//! ```

mod console;
mod events;
mod state_machine;
mod states;

pub use state_machine::{factory, DeviceManager};
