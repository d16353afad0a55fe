//! Bluemod drives a Stollmann Bluemod+SR radio module over a serial link and
//! serves a small CRC framed application protocol to the Bluetooth peers
//! connecting to it.
//!
//! The radio module is reset, configured with a handful of AT commands and
//! switched to its MUX mode, where AT commands and the data of every radio
//! channel share the serial line as `0xCC` framed packets. Incoming calls are
//! accepted, connected peers are tracked and dropped when silent, and the
//! bytes of the serial port profile channel are reassembled into application
//! frames that are answered with an `Ack` or a `Nack`.
//!
//! The layers, bottom-up:
//!
//! * [`ring`] and [`scanner`]: the receive buffer and the token parsers run
//!   over it.
//! * [`module`]: the session with the radio module, a typed state machine
//!   going through reset, boot, AT initialisation and MUX operation.
//! * [`peers`]: the registry of connected peers.
//! * [`frame`]: the application frame codec.
//! * [`gateway`]: the glue between the above and the application.
//!
//! The module session is implemented as a state machine the same way as the
//! serial port management of the CLI:
//!
//! * It can only be in one state at any time and each state can carry its own
//!   data, next to data shared by all states.
//! * Transitions are triggered by typed **events**. A transition consumes the
//!   original state; going back creates a new one.
//! * Only transitions for which a `From<Event>` implementation exists are
//!   possible, so most illegal transitions are caught at **compile-time**.
//!
//! All protocol code is single threaded and driven by periodic `tick()`
//! calls. Time comes from a [`Clock`](clock::Clock) counting ticks, bytes from
//! a [`Transport`](transport::Transport). In-memory versions of both make the
//! whole stack scriptable in tests:
//!
//! ```no_run
//! use std::sync::Arc;
//! use bluemod::clock::ManualClock;
//! use bluemod::module::ModuleSession;
//! use bluemod::transport::MemoryTransport;
//! use bluemod::SettingsBuilder;
//!
//! let settings = SettingsBuilder::new().device_name("Kitchen").finalize();
//! let transport = MemoryTransport::new();
//! let clock = Arc::new(ManualClock::new(0));
//! let mut session = ModuleSession::new(
//!     0,
//!     &settings,
//!     Box::new(transport.clone()),
//!     Box::new(transport.reset_line()),
//!     clock.clone(),
//! );
//! session.tick();
//! ```

pub mod clock;
pub mod crc;
pub mod frame;
pub mod gateway;
pub mod module;
pub mod peers;
pub mod ring;
pub mod scanner;
pub mod status;
pub mod transport;

mod device_manager;
mod settings;
mod utils;

pub use device_manager::{factory, DeviceManager};
pub use gateway::{ClientHandler, Gateway, Outbox};
pub use settings::{DataBits, FlowControl, Parity, Settings, SettingsBuilder, StopBits};
