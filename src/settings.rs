//! Settings related to the serial port, the radio module session, the peer
//! registry and the host loop.
//!
//! Use the [builder](https://doc.rust-lang.org/1.0.0/style/ownership/builders.html)
//! pattern to set the configurable values.

pub use serialport::{DataBits, FlowControl, Parity, StopBits};

use crate::clock::Tick;
use crate::frame::ConfigEntry;

// =============================================================================
// Public Interface
// =============================================================================

/// Groups all settings used by `bluemod` and acts as a
/// [builder](https://doc.rust-lang.org/1.0.0/style/ownership/builders.html)
/// for the settings.
#[derive(Debug, Clone, Eq, PartialEq)]
pub struct Settings {
    /// The port name, usually the device path.
    pub path: Option<String>,
    /// The baud rate in symbols-per-second.
    pub baud_rate: u32,
    /// Number of bits used to represent a character sent on the line.
    pub data_bits: DataBits,
    /// The type of signalling to use for controlling data transfer.
    pub flow_control: FlowControl,
    /// The type of parity to use for error checking.
    pub parity: Parity,
    /// Number of bits to use to signal the end of a character.
    pub stop_bits: StopBits,

    /// The Bluetooth name advertised by the radio module.
    pub device_name: String,
    /// How many times a command is sent in MUX mode before it is dropped.
    pub retry_limit: u8,
    /// Ticks to wait for a command response before sending it again.
    pub send_timeout: Tick,
    /// Ticks the module is given to boot after the reset line is released.
    pub boot_time: Tick,
    /// Maximum number of pending module commands.
    pub command_queue_size: usize,
    /// Size of the buffer receiving bytes from the module.
    pub receive_buffer_size: usize,
    /// The interface channel handed to the transport.
    pub interface_channel: u8,

    /// Maximum number of simultaneously connected peers.
    pub peer_capacity: usize,
    /// Ticks without sign of life after which a peer is disconnected.
    pub connection_timeout: Tick,

    /// Milliseconds between two ticks of the host loop.
    pub tick_interval_ms: u64,
    /// Records answered to configuration requests.
    pub config_entries: Vec<ConfigEntry>,

    /// Restrict creation of `Settings` instances unless through the
    /// `SettingsBuilder`.
    #[doc(hidden)]
    _private_use_builder: (),
}

/// The builder for the `Settings` values.
///
/// All values are optional and have default values that will be used if not
/// explicitly set.
///
/// **Example**
///
/// ```ignore
/// let settings = SettingsBuilder::new()
///     .path("/dev/ttyUSB0")
///     .device_name("Kitchen")
///     .finalize();
/// ```
pub struct SettingsBuilder {
    settings: Settings,
}
impl SettingsBuilder {
    /// Start building the settings using default values and no path for the
    /// port.
    pub fn new() -> Self {
        SettingsBuilder {
            settings: Settings {
                path: None,
                baud_rate: 115_200,
                data_bits: DataBits::Eight,
                flow_control: FlowControl::None,
                parity: Parity::None,
                stop_bits: StopBits::One,
                device_name: "Bluemod".to_owned(),
                retry_limit: 5,
                send_timeout: 2000,
                boot_time: 1200,
                command_queue_size: 16,
                receive_buffer_size: 128,
                interface_channel: 0,
                peer_capacity: 8,
                connection_timeout: Tick::MAX,
                tick_interval_ms: 1,
                config_entries: Vec::new(),
                _private_use_builder: (),
            },
        }
    }

    /// Set the path to the serial port
    pub fn path<'a>(mut self, path: impl Into<std::borrow::Cow<'a, str>>) -> Self {
        self.settings.path = Some(path.into().as_ref().to_owned());
        self
    }

    /// Set the baud rate in symbols-per-second
    pub fn baud_rate(mut self, baud_rate: u32) -> Self {
        self.settings.baud_rate = baud_rate;
        self
    }

    /// Set the number of bits used to represent a character sent on the line
    pub fn data_bits(mut self, data_bits: DataBits) -> Self {
        self.settings.data_bits = data_bits;
        self
    }

    /// Set the type of signalling to use for controlling data transfer
    pub fn flow_control(mut self, flow_control: FlowControl) -> Self {
        self.settings.flow_control = flow_control;
        self
    }

    /// Set the type of parity to use for error checking
    pub fn parity(mut self, parity: Parity) -> Self {
        self.settings.parity = parity;
        self
    }

    /// Set the number of bits to use to signal the end of a character
    pub fn stop_bits(mut self, stop_bits: StopBits) -> Self {
        self.settings.stop_bits = stop_bits;
        self
    }

    /// Set the advertised Bluetooth name
    pub fn device_name<'a>(mut self, name: impl Into<std::borrow::Cow<'a, str>>) -> Self {
        self.settings.device_name = name.into().as_ref().to_owned();
        self
    }

    pub fn retry_limit(mut self, retry_limit: u8) -> Self {
        self.settings.retry_limit = retry_limit;
        self
    }

    pub fn send_timeout(mut self, send_timeout: Tick) -> Self {
        self.settings.send_timeout = send_timeout;
        self
    }

    pub fn boot_time(mut self, boot_time: Tick) -> Self {
        self.settings.boot_time = boot_time;
        self
    }

    /// Set the command queue depth. A depth of zero is raised to one.
    pub fn command_queue_size(mut self, size: usize) -> Self {
        self.settings.command_queue_size = size.max(1);
        self
    }

    /// Set the receive buffer size. A size of zero is raised to one.
    pub fn receive_buffer_size(mut self, size: usize) -> Self {
        self.settings.receive_buffer_size = size.max(1);
        self
    }

    pub fn interface_channel(mut self, channel: u8) -> Self {
        self.settings.interface_channel = channel;
        self
    }

    pub fn peer_capacity(mut self, capacity: usize) -> Self {
        self.settings.peer_capacity = capacity;
        self
    }

    pub fn connection_timeout(mut self, timeout: Tick) -> Self {
        self.settings.connection_timeout = timeout;
        self
    }

    pub fn tick_interval_ms(mut self, interval: u64) -> Self {
        self.settings.tick_interval_ms = interval;
        self
    }

    /// Add a record to the configuration answered to peers
    pub fn config_entry(mut self, entry: ConfigEntry) -> Self {
        self.settings.config_entries.push(entry);
        self
    }

    pub fn finalize(self) -> Settings {
        self.settings
    }
}
impl Default for SettingsBuilder {
    fn default() -> Self {
        Self::new()
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[test]
fn all_default() {
    let settings = SettingsBuilder::new().finalize();
    assert_eq!(
        settings,
        Settings {
            path: None,
            baud_rate: 115_200,
            data_bits: DataBits::Eight,
            flow_control: FlowControl::None,
            parity: Parity::None,
            stop_bits: StopBits::One,
            device_name: "Bluemod".to_owned(),
            retry_limit: 5,
            send_timeout: 2000,
            boot_time: 1200,
            command_queue_size: 16,
            receive_buffer_size: 128,
            interface_channel: 0,
            peer_capacity: 8,
            connection_timeout: u32::MAX,
            tick_interval_ms: 1,
            config_entries: vec![],
            _private_use_builder: (),
        }
    )
}

#[test]
fn path() {
    let settings = SettingsBuilder::new().path("/dev/ttyUSB0").finalize();
    assert_eq!(settings.path.unwrap(), "/dev/ttyUSB0");
}

#[test]
fn serial_line() {
    let settings = SettingsBuilder::new()
        .baud_rate(9_600)
        .data_bits(DataBits::Seven)
        .flow_control(FlowControl::Hardware)
        .parity(Parity::Even)
        .stop_bits(StopBits::Two)
        .finalize();
    assert_eq!(settings.baud_rate, 9_600);
    assert_eq!(settings.data_bits, DataBits::Seven);
    assert_eq!(settings.flow_control, FlowControl::Hardware);
    assert_eq!(settings.parity, Parity::Even);
    assert_eq!(settings.stop_bits, StopBits::Two);
}

#[test]
fn device_name() {
    let settings = SettingsBuilder::new().device_name("Thermocollect").finalize();
    assert_eq!(settings.device_name, "Thermocollect");
}

#[test]
fn module_timing() {
    let settings = SettingsBuilder::new()
        .retry_limit(3)
        .send_timeout(50)
        .boot_time(10)
        .finalize();
    assert_eq!(settings.retry_limit, 3);
    assert_eq!(settings.send_timeout, 50);
    assert_eq!(settings.boot_time, 10);
}

#[test]
fn buffer_sizes_are_never_zero() {
    let settings = SettingsBuilder::new()
        .command_queue_size(0)
        .receive_buffer_size(0)
        .finalize();
    assert_eq!(settings.command_queue_size, 1);
    assert_eq!(settings.receive_buffer_size, 1);
}

#[test]
fn peers() {
    let settings = SettingsBuilder::new()
        .peer_capacity(2)
        .connection_timeout(30_000)
        .finalize();
    assert_eq!(settings.peer_capacity, 2);
    assert_eq!(settings.connection_timeout, 30_000);
}

#[test]
fn config_entries() {
    let entry = ConfigEntry {
        room_id: 1,
        motor_id: 2,
        sensor_id: 3,
    };
    let settings = SettingsBuilder::new().config_entry(entry).config_entry(entry).finalize();
    assert_eq!(settings.config_entries, vec![entry, entry]);
}
