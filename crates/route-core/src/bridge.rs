//! Host application boundary
//!
//! Adapts the coordinator to a loosely typed embedding shell: raw integer
//! modes, string device ids, exported constants and JSON notification
//! payloads keyed by event name.

use futures::stream::{BoxStream, StreamExt};
use serde::{Deserialize, Serialize};
use serde_json::Value;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tracing::warn;

use crate::coordinator::RouteCoordinator;
use crate::device::AudioMode;
use crate::error::RouteResult;
use crate::events::{RouteEvent, DEVICE_CHANGE_EVENT};
use crate::provider::ProviderKind;

/// Constants the host queries once at startup
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub struct ExportedConstants {
    pub device_change_event: String,
    pub default: i32,
    pub audio_call: i32,
    pub video_call: i32,
}

impl Default for ExportedConstants {
    fn default() -> Self {
        Self {
            device_change_event: DEVICE_CHANGE_EVENT.to_string(),
            default: AudioMode::Default.as_raw(),
            audio_call: AudioMode::AudioCall.as_raw(),
            video_call: AudioMode::VideoCall.as_raw(),
        }
    }
}

/// Named notification for the host
#[derive(Debug, Clone, PartialEq, Serialize)]
pub struct HostEvent {
    pub name: String,
    pub payload: Value,
}

/// Command/notification adapter between the host shell and the coordinator
#[derive(Debug, Clone)]
pub struct HostBridge {
    coordinator: RouteCoordinator,
}

impl HostBridge {
    pub fn new(coordinator: RouteCoordinator) -> Self {
        Self { coordinator }
    }

    pub fn coordinator(&self) -> &RouteCoordinator {
        &self.coordinator
    }

    pub fn constants(&self) -> ExportedConstants {
        ExportedConstants::default()
    }

    /// Set the audio mode from its raw value
    pub async fn set_mode(&self, mode: i32) -> RouteResult<()> {
        self.coordinator.set_mode_raw(mode).await
    }

    /// Select an output device by id. Unknown or unavailable ids are ignored.
    pub fn set_audio_device(&self, device: &str) -> RouteResult<()> {
        self.coordinator.request_device_id(device)
    }

    pub async fn set_use_connection_service(&self, use_service: bool) -> RouteResult<ProviderKind> {
        self.coordinator.set_provider_strategy(use_service).await
    }

    /// Device-list notifications in host form. Lagged subscribers skip the
    /// missed events with a warning; the next event carries the full list.
    pub fn events(&self) -> BoxStream<'static, HostEvent> {
        self.coordinator
            .events()
            .filter_map(|event| async move {
                match event {
                    Ok(event) => host_event(&event),
                    Err(BroadcastStreamRecvError::Lagged(missed)) => {
                        warn!(missed, "Host event stream lagged");
                        None
                    }
                }
            })
            .boxed()
    }
}

/// Convert a coordinator event into its host notification, if it has one
pub fn host_event(event: &RouteEvent) -> Option<HostEvent> {
    match event {
        RouteEvent::DevicesUpdated { devices } => match serde_json::to_value(devices) {
            Ok(payload) => Some(HostEvent {
                name: DEVICE_CHANGE_EVENT.to_string(),
                payload,
            }),
            Err(e) => {
                warn!("Failed to serialize device list: {}", e);
                None
            }
        },
        RouteEvent::ProviderSwitched { .. } => None,
    }
}
