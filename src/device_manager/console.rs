//! The application run by the CLI: prints what peers do and accepts whatever
//! they ask.

use console::style;
use log::info;

use crate::frame::{ConfigEntry, ValueId};
use crate::gateway::{ClientHandler, Outbox};
use crate::peers::PeerHandle;

pub(crate) struct ConsoleClient {
    config_entries: Vec<ConfigEntry>,
}
impl ConsoleClient {
    pub fn new(config_entries: Vec<ConfigEntry>) -> Self {
        ConsoleClient { config_entries }
    }
}

impl ClientHandler for ConsoleClient {
    fn on_client_connected(&mut self, handle: PeerHandle, _outbox: &mut Outbox) {
        println!("[BM] 🔗 peer {} connected", style(handle).green());
    }

    fn on_client_disconnected(&mut self, handle: PeerHandle, _outbox: &mut Outbox) {
        println!("[BM] ❌ peer {} disconnected", style(handle).red());
    }

    fn on_subscribe(
        &mut self,
        handle: PeerHandle,
        message_id: u32,
        value_id: ValueId,
        _outbox: &mut Outbox,
    ) -> bool {
        info!("{} subscribes to {:?} (message {})", handle, value_id, message_id);
        true
    }

    fn on_unsubscribe(
        &mut self,
        handle: PeerHandle,
        message_id: u32,
        value_id: ValueId,
        _outbox: &mut Outbox,
    ) -> bool {
        info!("{} unsubscribes from {:?} (message {})", handle, value_id, message_id);
        true
    }

    fn on_command(
        &mut self,
        handle: PeerHandle,
        value_id: ValueId,
        value: i32,
        _outbox: &mut Outbox,
    ) -> bool {
        println!(
            "[BM] {} sets group {} value {} to {}",
            handle,
            style(value_id.motor_group).cyan(),
            style(value_id.id).cyan(),
            style(value).bold()
        );
        true
    }

    fn on_configuration_requested(
        &mut self,
        handle: PeerHandle,
        message_id: u32,
        outbox: &mut Outbox,
    ) -> bool {
        info!("{} requests the configuration ({} records)", handle, self.config_entries.len());
        outbox.send_configuration(handle, message_id, &self.config_entries);
        true
    }

    fn on_is_alive(&mut self, _handle: PeerHandle, _message_id: u32, _outbox: &mut Outbox) -> bool {
        true
    }
}

// =============================================================================
// Unit Tests
// =============================================================================

#[test]
fn configuration_requests_queue_the_records() {
    let entry = ConfigEntry {
        room_id: 1,
        motor_id: 2,
        sensor_id: 3,
    };
    let mut client = ConsoleClient::new(vec![entry]);
    let mut outbox = Outbox::default();
    assert!(client.on_configuration_requested(PeerHandle(1), 5, &mut outbox));
    assert!(!outbox.is_empty());
}

#[test]
fn requests_are_accepted() {
    let mut client = ConsoleClient::new(vec![]);
    let mut outbox = Outbox::default();
    assert!(client.on_is_alive(PeerHandle(1), 1, &mut outbox));
    assert!(client.on_command(PeerHandle(1), ValueId::default(), 21, &mut outbox));
    assert!(client.on_subscribe(PeerHandle(1), 2, ValueId::default(), &mut outbox));
    assert!(outbox.is_empty());
}
