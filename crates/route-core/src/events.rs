//! Notifications emitted by the coordinator

use serde::{Deserialize, Serialize};
use tokio::sync::broadcast;
use tokio_stream::wrappers::BroadcastStream;

use crate::device::{AudioDevice, DeviceSet};
use crate::provider::ProviderKind;

/// Name of the device-list-changed notification exported to the host
pub const DEVICE_CHANGE_EVENT: &str = "audio-mode#devices-update";

/// One entry of the device list shown to the user
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceEntry {
    #[serde(rename = "type")]
    pub device: AudioDevice,
    pub selected: bool,
}

/// Events emitted by the route coordinator
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RouteEvent {
    /// The available devices or the selection changed
    DevicesUpdated {
        /// Every presentable device, in declaration order
        devices: Vec<DeviceEntry>,
    },

    /// A different provider strategy was installed
    ProviderSwitched { kind: ProviderKind },
}

/// Stream of coordinator events
pub type EventStream = BroadcastStream<RouteEvent>;

/// Build the user-facing device list.
///
/// With `hide_earpiece` set, the earpiece is left out while headphones are
/// plugged in. It stays selectable; it is only hidden from the list.
pub fn device_entries(
    available: &DeviceSet,
    selected: Option<AudioDevice>,
    hide_earpiece: bool,
) -> Vec<DeviceEntry> {
    let has_headphones = available.contains(AudioDevice::Headphones);
    available
        .iter()
        .filter(|device| !(hide_earpiece && has_headphones && *device == AudioDevice::Earpiece))
        .map(|device| DeviceEntry {
            device,
            selected: Some(device) == selected,
        })
        .collect()
}

/// Fan-out of [`RouteEvent`]s to any number of subscribers
#[derive(Debug, Clone)]
pub(crate) struct EventBroadcaster {
    tx: broadcast::Sender<RouteEvent>,
}

impl EventBroadcaster {
    pub(crate) fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity);
        Self { tx }
    }

    pub(crate) fn subscribe(&self) -> broadcast::Receiver<RouteEvent> {
        self.tx.subscribe()
    }

    /// Publish an event; having no subscribers is not an error
    pub(crate) fn publish(&self, event: RouteEvent) {
        let _ = self.tx.send(event);
    }
}
