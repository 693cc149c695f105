//! Generic provider: drives hardware routing toggles directly
//!
//! Devices are discovered by querying the OS device registry on start and on
//! every add/remove callback. Routing is a pair of independent toggles
//! (speakerphone, Bluetooth SCO); the platform applies them separately.

use std::sync::Arc;

use async_trait::async_trait;
use tracing::{debug, info, warn};

use super::{ProviderEvent, ProviderEventSink, ProviderKind, ProviderUpdate, RouteProvider};
use crate::coordinator::RouteSnapshot;
use crate::device::{AudioDevice, AudioMode, DeviceSet};
use crate::error::{PlatformResult, RouteError, RouteResult};
use crate::platform::{
    AudioSystem, FocusChange, FocusRequestResult, PlatformAudioMode, PlatformDeviceInfo,
    PlatformDeviceKind,
};

/// Map an OS endpoint to the device category it routes to
pub fn classify_device(kind: PlatformDeviceKind) -> Option<AudioDevice> {
    match kind {
        PlatformDeviceKind::BluetoothSco => Some(AudioDevice::Bluetooth),
        PlatformDeviceKind::BuiltinEarpiece => Some(AudioDevice::Earpiece),
        PlatformDeviceKind::BuiltinSpeaker => Some(AudioDevice::Speaker),
        PlatformDeviceKind::WiredHeadphones
        | PlatformDeviceKind::WiredHeadset
        | PlatformDeviceKind::UsbHeadset => Some(AudioDevice::Headphones),
        PlatformDeviceKind::Other(_) => None,
    }
}

/// Collapse an endpoint listing into the set of routable devices
pub fn devices_from_platform(infos: &[PlatformDeviceInfo]) -> DeviceSet {
    infos.iter().filter_map(|info| classify_device(info.kind)).collect()
}

/// Provider for platforms without managed call routing
#[derive(Debug)]
pub struct GenericRouteProvider {
    audio: Arc<dyn AudioSystem>,
    sink: Option<ProviderEventSink>,
    /// Set when another client took audio focus from us
    focus_lost: bool,
}

impl GenericRouteProvider {
    pub fn new(audio: Arc<dyn AudioSystem>) -> Self {
        Self {
            audio,
            sink: None,
            focus_lost: false,
        }
    }

    /// Whether focus is currently considered lost
    pub fn focus_lost(&self) -> bool {
        self.focus_lost
    }

    fn set_bluetooth_route(&self, enabled: bool) {
        let result = if enabled {
            self.audio
                .start_bluetooth_sco()
                .and_then(|_| self.audio.set_bluetooth_sco_on(true))
        } else {
            self.audio
                .set_bluetooth_sco_on(false)
                .and_then(|_| self.audio.stop_bluetooth_sco())
        };
        log_toggle("bluetooth sco", enabled, result);
    }

    fn set_speakerphone(&self, enabled: bool) {
        log_toggle("speakerphone", enabled, self.audio.set_speakerphone_on(enabled));
    }

    fn handle_focus_change(&mut self, change: FocusChange) -> Vec<ProviderUpdate> {
        match change {
            FocusChange::Gain => {
                let regained = self.focus_lost;
                self.focus_lost = false;
                if regained {
                    // The OS may have reset routing while someone else held focus.
                    info!("Audio focus regained, forcing reconciliation");
                    vec![ProviderUpdate::Reconcile { force: true }]
                } else {
                    Vec::new()
                }
            }
            loss => {
                debug!(?loss, "Audio focus lost");
                self.focus_lost = true;
                Vec::new()
            }
        }
    }
}

fn log_toggle(what: &str, enabled: bool, result: PlatformResult<()>) {
    if let Err(e) = result {
        warn!("Failed to turn {} {}: {}", what, if enabled { "on" } else { "off" }, e);
    }
}

#[async_trait]
impl RouteProvider for GenericRouteProvider {
    fn kind(&self) -> ProviderKind {
        ProviderKind::Generic
    }

    async fn start(&mut self, sink: ProviderEventSink) -> RouteResult<()> {
        self.audio.set_device_listener(Some(sink.clone()));

        // Initial detection runs on the worker like any other callback
        sink.hardware_devices_changed();
        self.sink = Some(sink);
        Ok(())
    }

    async fn stop(&mut self) {
        self.audio.set_device_listener(None);
        self.sink = None;
    }

    async fn set_audio_route(&mut self, device: AudioDevice) {
        debug!(%device, "Applying hardware route");
        self.set_speakerphone(device == AudioDevice::Speaker);
        self.set_bluetooth_route(device == AudioDevice::Bluetooth);
    }

    async fn set_mode(&mut self, mode: AudioMode) -> RouteResult<()> {
        if !mode.is_call() {
            self.focus_lost = false;
            if let Err(e) = self.audio.set_audio_mode(PlatformAudioMode::Normal) {
                warn!("Failed to restore normal audio mode: {}", e);
            }
            self.audio.abandon_audio_focus();
            self.set_speakerphone(false);
            self.set_bluetooth_route(false);
            return Ok(());
        }

        self.audio
            .set_audio_mode(PlatformAudioMode::InCommunication)
            .map_err(|e| RouteError::route_activation(mode, e.to_string()))?;
        if let Err(e) = self.audio.set_microphone_mute(false) {
            warn!("Failed to unmute the microphone: {}", e);
        }

        let sink = self
            .sink
            .clone()
            .ok_or_else(|| RouteError::route_activation(mode, "provider not started"))?;
        match self.audio.request_audio_focus(sink) {
            FocusRequestResult::Failed => {
                Err(RouteError::route_activation(mode, "audio focus request failed"))
            }
            result => {
                debug!(?result, "Audio focus requested");
                Ok(())
            }
        }
    }

    async fn handle_event(&mut self, event: ProviderEvent, _state: &RouteSnapshot) -> Vec<ProviderUpdate> {
        match event {
            ProviderEvent::HardwareDevicesChanged => {
                let devices = devices_from_platform(&self.audio.list_devices());
                debug!(?devices, "Hardware devices changed");
                vec![ProviderUpdate::ReplaceDevices(devices)]
            }
            ProviderEvent::FocusChanged(change) => self.handle_focus_change(change),
            ProviderEvent::CallAudioStateChanged(_) => {
                debug!("Ignoring call audio state on generic provider");
                Vec::new()
            }
        }
    }
}

#[cfg(all(test, feature = "platform-mock"))]
mod tests {
    use super::*;
    use crate::platform::mock::{MockAudioSystem, PlatformCall};
    use tokio::sync::mpsc;
    use tokio_test::{assert_err, assert_ok};
    use tracing_test::traced_test;

    fn provider() -> (Arc<MockAudioSystem>, GenericRouteProvider) {
        let audio = Arc::new(MockAudioSystem::new());
        let provider = GenericRouteProvider::new(audio.clone());
        (audio, provider)
    }

    #[test]
    fn test_classify_device() {
        assert_eq!(classify_device(PlatformDeviceKind::UsbHeadset), Some(AudioDevice::Headphones));
        assert_eq!(classify_device(PlatformDeviceKind::WiredHeadset), Some(AudioDevice::Headphones));
        assert_eq!(classify_device(PlatformDeviceKind::BluetoothSco), Some(AudioDevice::Bluetooth));
        assert_eq!(classify_device(PlatformDeviceKind::Other(9)), None);
    }

    #[tokio::test]
    async fn test_route_toggles() {
        let (audio, mut provider) = provider();

        provider.set_audio_route(AudioDevice::Bluetooth).await;
        assert_eq!(
            audio.take_calls(),
            vec![
                PlatformCall::SetSpeakerphoneOn(false),
                PlatformCall::StartBluetoothSco,
                PlatformCall::SetBluetoothScoOn(true),
            ]
        );

        provider.set_audio_route(AudioDevice::Speaker).await;
        assert_eq!(
            audio.take_calls(),
            vec![
                PlatformCall::SetSpeakerphoneOn(true),
                PlatformCall::SetBluetoothScoOn(false),
                PlatformCall::StopBluetoothSco,
            ]
        );
    }

    #[tokio::test]
    async fn test_focus_regain_forces_only_after_loss() {
        let (_audio, mut provider) = provider();
        let snapshot = RouteSnapshot::default();

        let updates = provider
            .handle_event(ProviderEvent::FocusChanged(FocusChange::Gain), &snapshot)
            .await;
        assert!(updates.is_empty());

        provider
            .handle_event(ProviderEvent::FocusChanged(FocusChange::LossTransient), &snapshot)
            .await;
        assert!(provider.focus_lost());

        let updates = provider
            .handle_event(ProviderEvent::FocusChanged(FocusChange::Gain), &snapshot)
            .await;
        assert_eq!(updates, vec![ProviderUpdate::Reconcile { force: true }]);
        assert!(!provider.focus_lost());
    }

    #[tokio::test]
    async fn test_set_mode_fails_when_focus_denied() {
        let (audio, mut provider) = provider();
        let (tx, _rx) = mpsc::unbounded_channel();
        provider.start(ProviderEventSink::new(1, tx.downgrade())).await.unwrap();
        audio.deny_focus(true);

        let result = provider.set_mode(AudioMode::VideoCall).await;
        assert!(matches!(result, Err(RouteError::RouteActivationFailed { mode: 2, .. })));

        audio.deny_focus(false);
        assert_ok!(provider.set_mode(AudioMode::VideoCall).await);
    }

    #[tokio::test]
    async fn test_set_mode_requires_start() {
        let (audio, mut provider) = provider();
        assert_err!(provider.set_mode(AudioMode::AudioCall).await);
        assert!(!audio.calls().contains(&PlatformCall::RequestAudioFocus));
    }

    #[tokio::test]
    #[traced_test]
    async fn test_toggle_failures_are_logged() {
        let (audio, mut provider) = provider();
        audio.fail_toggles(true);

        provider.set_audio_route(AudioDevice::Speaker).await;
        // The Bluetooth teardown is still attempted after the speaker failed
        assert_eq!(audio.take_calls().len(), 2);
        assert!(logs_contain("Failed to turn speakerphone on"));
        assert!(logs_contain("Failed to turn bluetooth sco off"));
    }

    #[tokio::test]
    async fn test_default_mode_releases_platform() {
        let (audio, mut provider) = provider();
        provider.focus_lost = true;

        provider.set_mode(AudioMode::Default).await.unwrap();
        assert!(!provider.focus_lost());
        assert_eq!(
            audio.take_calls(),
            vec![
                PlatformCall::SetAudioMode(PlatformAudioMode::Normal),
                PlatformCall::AbandonAudioFocus,
                PlatformCall::SetSpeakerphoneOn(false),
                PlatformCall::SetBluetoothScoOn(false),
                PlatformCall::StopBluetoothSco,
            ]
        );
    }
}
