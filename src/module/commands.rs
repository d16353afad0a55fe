//! AT commands understood by the radio module and the bounded queue holding
//! them until they are acknowledged.

use std::collections::VecDeque;

/// Every command of the module's AT command set this crate can send.
///
/// The command text is sent as-is, immediately followed by the command data
/// (if any) and a carriage return.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AtCommand {
    Attention,
    Information,
    Echo,
    AcceptCall,
    Multiplexing,
    DeviceName,
    DeleteBonding,
    FactoryDefaults,
    CloseConnection,
    Reset,
    Register,
    DeviceClass,
    Encryption,
    Inquiry,
    Pin,
    ServiceName,
    AdvertisingIntervalMin,
    AdvertisingIntervalMax,
    ConnectionIntervalMin,
    ConnectionIntervalMax,
    LeRole,
    LeTimeout,
    AdvertisingData,
    AdvertisingEnable,
    AdvertisingParameters,
    AdvertisingAttributes,
    ScanResponseData,
}
impl AtCommand {
    pub fn text(self) -> &'static str {
        match self {
            AtCommand::Attention => "AT",
            AtCommand::Information => "ATI",
            AtCommand::Echo => "ATE",
            AtCommand::AcceptCall => "ATA ",
            AtCommand::Multiplexing => "AT+BMUX=",
            AtCommand::DeviceName => "AT+BNAME=",
            AtCommand::DeleteBonding => "AT+BNDDEL=",
            AtCommand::FactoryDefaults => "AT+BOAD",
            AtCommand::CloseConnection => "ATH ",
            AtCommand::Reset => "RESET",
            AtCommand::Register => "ATS",
            AtCommand::DeviceClass => "AT+BCLASS=",
            AtCommand::Encryption => "AT+BCRYPT=",
            AtCommand::Inquiry => "AT+BINQ",
            AtCommand::Pin => "AT+BPIN",
            AtCommand::ServiceName => "AT+BSNAME=",
            AtCommand::AdvertisingIntervalMin => "AT+LEADINTMIN=",
            AtCommand::AdvertisingIntervalMax => "AT+LEADINTMAX=",
            AtCommand::ConnectionIntervalMin => "AT+LECONINTMIN=",
            AtCommand::ConnectionIntervalMax => "AT+LECONINTMAX=",
            AtCommand::LeRole => "AT+LEROLE=",
            AtCommand::LeTimeout => "AT+LETIO=",
            AtCommand::AdvertisingData => "AT+LEADDATA=",
            AtCommand::AdvertisingEnable => "AT+LEADE=",
            AtCommand::AdvertisingParameters => "AT+LEADPAR=",
            AtCommand::AdvertisingAttributes => "AT+LEADATTRIB=",
            AtCommand::ScanResponseData => "AT+LESCDATA=",
        }
    }
}

/// How hard the session tries to get a command acknowledged.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Retry {
    /// Resent until acknowledged (in MUX mode, until the retry limit).
    Forever,
    /// Sent a single time.
    Once,
}

/// A queued command with its data and the number of times it was sent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CommandEntry {
    pub command: AtCommand,
    pub data: Vec<u8>,
    pub try_count: u8,
}
impl CommandEntry {
    pub fn new(command: AtCommand, data: &[u8], retry: Retry, retry_limit: u8) -> Self {
        let try_count = match retry {
            Retry::Forever => 0,
            Retry::Once => retry_limit.saturating_sub(1),
        };
        CommandEntry {
            command,
            data: data.to_vec(),
            try_count,
        }
    }

    /// Command text followed by the command data, without terminator.
    pub fn encode(&self) -> Vec<u8> {
        let text = self.command.text().as_bytes();
        let mut line = Vec::with_capacity(text.len() + self.data.len());
        line.extend_from_slice(text);
        line.extend_from_slice(&self.data);
        line
    }
}

/// Fixed capacity FIFO of commands. The head entry is the one in flight.
#[derive(Debug, Clone)]
pub struct CommandQueue {
    entries: VecDeque<CommandEntry>,
    capacity: usize,
}
impl CommandQueue {
    pub fn new(capacity: usize) -> Self {
        CommandQueue {
            entries: VecDeque::with_capacity(capacity),
            capacity,
        }
    }

    /// Appends `entry` unless the queue is full. Returns whether it was queued.
    pub fn push(&mut self, entry: CommandEntry) -> bool {
        if self.is_full() {
            return false;
        }
        self.entries.push_back(entry);
        true
    }

    pub fn front(&self) -> Option<&CommandEntry> {
        self.entries.front()
    }

    pub fn front_mut(&mut self) -> Option<&mut CommandEntry> {
        self.entries.front_mut()
    }

    pub fn pop_front(&mut self) -> Option<CommandEntry> {
        self.entries.pop_front()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_full(&self) -> bool {
        self.entries.len() >= self.capacity
    }
}

// =============================================================================
// Unit Tests
// =============================================================================
