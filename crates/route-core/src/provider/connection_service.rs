//! Connection-service provider: routing owned by the platform
//!
//! On platforms with managed call routing the telephony subsystem decides
//! which devices exist and carries out route switches. This provider only
//! translates between its route bit masks and [`AudioDevice`]s, and watches
//! for externally driven route changes.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, error, info, warn};

use super::{ProviderEvent, ProviderEventSink, ProviderKind, ProviderUpdate, RouteProvider};
use crate::coordinator::RouteSnapshot;
use crate::device::{AudioDevice, AudioMode, DeviceSet};
use crate::error::{RouteError, RouteResult};
use crate::platform::{AudioSystem, CallAudioService, CallAudioState, CallRoute};

/// Route bit for a device. No selection maps to the speaker.
pub fn route_for_device(device: Option<AudioDevice>) -> CallRoute {
    match device {
        Some(AudioDevice::Bluetooth) => CallRoute::BLUETOOTH,
        Some(AudioDevice::Earpiece) => CallRoute::EARPIECE,
        Some(AudioDevice::Headphones) => CallRoute::WIRED_HEADSET,
        Some(AudioDevice::Speaker) | None => CallRoute::SPEAKER,
    }
}

/// Devices advertised by a supported-route mask
pub fn devices_from_route_mask(mask: u32) -> DeviceSet {
    let mask = CallRoute(mask);
    [
        (CallRoute::EARPIECE, AudioDevice::Earpiece),
        (CallRoute::BLUETOOTH, AudioDevice::Bluetooth),
        (CallRoute::SPEAKER, AudioDevice::Speaker),
        (CallRoute::WIRED_HEADSET, AudioDevice::Headphones),
    ]
    .into_iter()
    .filter(|(route, _)| mask.contains(*route))
    .map(|(_, device)| device)
    .collect()
}

/// Provider for platforms with managed call routing
#[derive(Debug)]
pub struct ConnectionServiceRouteProvider {
    audio: Arc<dyn AudioSystem>,
    service: Option<Arc<dyn CallAudioService>>,
    /// Most recently reported supported-route mask
    supported_route_mask: Option<u32>,
}

impl ConnectionServiceRouteProvider {
    pub fn new(audio: Arc<dyn AudioSystem>, service: Option<Arc<dyn CallAudioService>>) -> Self {
        Self {
            audio,
            service,
            supported_route_mask: None,
        }
    }

    fn on_call_audio_state(&mut self, state: CallAudioState, snapshot: &RouteSnapshot) -> Vec<ProviderUpdate> {
        let route_changed = route_for_device(snapshot.selected) != state.route;
        let devices_changed = self.supported_route_mask != Some(state.supported_route_mask);

        if devices_changed {
            self.supported_route_mask = Some(state.supported_route_mask);
            let devices = devices_from_route_mask(state.supported_route_mask);
            debug!(?devices, "Supported routes changed");
            // Replacing the set drops the selection, so the route is recomputed anyway
            return vec![ProviderUpdate::ReplaceDevices(devices)];
        }

        if route_changed {
            // A route picked outside the app invalidates the user's choice
            info!(route = ?state.route, selected = ?snapshot.selected, "Platform route diverged, resetting selection");
            return vec![ProviderUpdate::ResetSelection];
        }

        Vec::new()
    }
}

#[async_trait]
impl RouteProvider for ConnectionServiceRouteProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::ConnectionService
    }

    async fn start(&mut self, sink: ProviderEventSink) -> RouteResult<()> {
        self.supported_route_mask = None;
        match &self.service {
            Some(service) => {
                service.set_call_audio_state_listener(Some(sink));
                Ok(())
            }
            None => {
                error!("Couldn't set call audio state listener, call audio service not found");
                Err(RouteError::provider_unavailable("call audio service not found"))
            }
        }
    }

    async fn stop(&mut self) {
        if let Some(service) = &self.service {
            service.set_call_audio_state_listener(None);
        }
    }

    async fn set_audio_route(&mut self, device: AudioDevice) {
        let Some(service) = &self.service else {
            warn!(%device, "No call audio service, route not applied");
            return;
        };
        let route = route_for_device(Some(device));
        if let Err(e) = service.set_audio_route(route) {
            warn!(%device, "Failed to set call audio route: {}", e);
        }
    }

    async fn set_mode(&mut self, mode: AudioMode) -> RouteResult<()> {
        // The platform owns routing, but some devices have been observed
        // leaving the microphone muted when a call starts.
        if mode.is_call() {
            if let Err(e) = self.audio.set_microphone_mute(false) {
                error!("Failed to unmute the microphone: {}", e);
            }
        }
        Ok(())
    }

    async fn handle_event(&mut self, event: ProviderEvent, state: &RouteSnapshot) -> Vec<ProviderUpdate> {
        match event {
            ProviderEvent::CallAudioStateChanged(audio_state) => self.on_call_audio_state(audio_state, state),
            other => {
                debug!(?other, "Ignoring event on connection-service provider");
                Vec::new()
            }
        }
    }
}

#[cfg(all(test, feature = "platform-mock"))]
mod tests {
    use super::*;
    use crate::platform::mock::{MockAudioSystem, MockCallAudioService, PlatformCall};

    fn provider() -> (Arc<MockAudioSystem>, Arc<MockCallAudioService>, ConnectionServiceRouteProvider) {
        let audio = Arc::new(MockAudioSystem::new());
        let service = Arc::new(MockCallAudioService::new());
        let provider = ConnectionServiceRouteProvider::new(audio.clone(), Some(service.clone()));
        (audio, service, provider)
    }

    #[test]
    fn test_mask_to_devices() {
        let devices = devices_from_route_mask((CallRoute::EARPIECE | CallRoute::WIRED_HEADSET).bits());
        assert_eq!(devices, DeviceSet::from([AudioDevice::Earpiece, AudioDevice::Headphones]));
        assert!(devices_from_route_mask(0).is_empty());
    }

    #[test]
    fn test_route_for_device() {
        assert_eq!(route_for_device(None), CallRoute::SPEAKER);
        assert_eq!(route_for_device(Some(AudioDevice::Headphones)), CallRoute::WIRED_HEADSET);
    }

    #[tokio::test]
    async fn test_state_changes() {
        let (_audio, _service, mut provider) = provider();
        let supported = CallRoute::SPEAKER | CallRoute::BLUETOOTH;
        let mut snapshot = RouteSnapshot::default();

        // First report always carries a new mask
        let updates = provider
            .handle_event(
                ProviderEvent::CallAudioStateChanged(CallAudioState::new(CallRoute::SPEAKER, supported)),
                &snapshot,
            )
            .await;
        assert_eq!(
            updates,
            vec![ProviderUpdate::ReplaceDevices(DeviceSet::from([
                AudioDevice::Speaker,
                AudioDevice::Bluetooth
            ]))]
        );

        // Same mask, route matches selection: nothing to do
        snapshot.selected = Some(AudioDevice::Bluetooth);
        let updates = provider
            .handle_event(
                ProviderEvent::CallAudioStateChanged(CallAudioState::new(CallRoute::BLUETOOTH, supported)),
                &snapshot,
            )
            .await;
        assert!(updates.is_empty());

        // Same mask, platform moved the route elsewhere
        let updates = provider
            .handle_event(
                ProviderEvent::CallAudioStateChanged(CallAudioState::new(CallRoute::SPEAKER, supported)),
                &snapshot,
            )
            .await;
        assert_eq!(updates, vec![ProviderUpdate::ResetSelection]);
    }

    #[tokio::test]
    async fn test_start_without_service_is_degraded() {
        let audio = Arc::new(MockAudioSystem::new());
        let mut provider = ConnectionServiceRouteProvider::new(audio, None);
        let (tx, _rx) = tokio::sync::mpsc::unbounded_channel();

        let result = provider.start(ProviderEventSink::new(1, tx.downgrade())).await;
        assert!(matches!(result, Err(RouteError::ProviderUnavailable { .. })));

        // Still usable, just inert
        provider.set_audio_route(AudioDevice::Speaker).await;
        assert!(provider.set_mode(AudioMode::AudioCall).await.is_ok());
    }

    #[tokio::test]
    async fn test_set_mode_unmutes_only_for_calls() {
        let (audio, service, mut provider) = provider();

        provider.set_mode(AudioMode::Default).await.unwrap();
        assert!(audio.take_calls().is_empty());

        provider.set_mode(AudioMode::AudioCall).await.unwrap();
        assert_eq!(audio.take_calls(), vec![PlatformCall::SetMicrophoneMute(false)]);

        provider.set_audio_route(AudioDevice::Earpiece).await;
        assert_eq!(service.routes(), vec![CallRoute::EARPIECE]);
    }
}
