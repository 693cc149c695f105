//! In-memory platform
//!
//! Stands in for the OS audio manager and the managed call-routing service.
//! Every command is recorded so callers can assert on exactly what the
//! providers asked of the platform, and hardware/focus/route changes can be
//! injected from any thread, just like real OS callbacks.

use std::sync::atomic::{AtomicBool, AtomicU32, Ordering};

use parking_lot::Mutex;
use tracing::debug;

use super::{
    AudioSystem, CallAudioService, CallAudioState, CallRoute, FocusChange, FocusRequestResult,
    PlatformAudioMode, PlatformDeviceInfo, PlatformDeviceKind,
};
use crate::error::{PlatformError, PlatformResult};
use crate::provider::ProviderEventSink;

/// A command received by [`MockAudioSystem`]
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PlatformCall {
    SetAudioMode(PlatformAudioMode),
    SetMicrophoneMute(bool),
    RequestAudioFocus,
    AbandonAudioFocus,
    SetSpeakerphoneOn(bool),
    StartBluetoothSco,
    StopBluetoothSco,
    SetBluetoothScoOn(bool),
}

/// In-memory OS audio manager
#[derive(Debug, Default)]
pub struct MockAudioSystem {
    devices: Mutex<Vec<PlatformDeviceInfo>>,
    next_id: AtomicU32,
    device_listener: Mutex<Option<ProviderEventSink>>,
    focus_listener: Mutex<Option<ProviderEventSink>>,
    calls: Mutex<Vec<PlatformCall>>,
    deny_focus: AtomicBool,
    fail_toggles: AtomicBool,
}

impl MockAudioSystem {
    /// A system with no endpoints attached
    pub fn new() -> Self {
        Self::default()
    }

    /// A handset: built-in earpiece and speaker
    pub fn handset() -> Self {
        let system = Self::new();
        system.push_device(PlatformDeviceKind::BuiltinEarpiece, "Built-in earpiece");
        system.push_device(PlatformDeviceKind::BuiltinSpeaker, "Built-in speaker");
        system
    }

    fn push_device(&self, kind: PlatformDeviceKind, name: &str) -> u32 {
        let id = self.next_id.fetch_add(1, Ordering::Relaxed) + 1;
        self.devices.lock().push(PlatformDeviceInfo::new(id, name, kind));
        id
    }

    fn notify_devices_changed(&self) {
        let listener = self.device_listener.lock().clone();
        if let Some(listener) = listener {
            listener.hardware_devices_changed();
        }
    }

    /// Attach an endpoint and fire the add callback. Returns its id.
    pub fn attach(&self, kind: PlatformDeviceKind, name: &str) -> u32 {
        let id = self.push_device(kind, name);
        debug!(id, ?kind, "Mock device attached");
        self.notify_devices_changed();
        id
    }

    /// Detach every endpoint of `kind` and fire the remove callback
    pub fn detach_kind(&self, kind: PlatformDeviceKind) -> usize {
        let removed = {
            let mut devices = self.devices.lock();
            let before = devices.len();
            devices.retain(|d| d.kind != kind);
            before - devices.len()
        };
        if removed > 0 {
            debug!(?kind, removed, "Mock devices detached");
            self.notify_devices_changed();
        }
        removed
    }

    /// Deliver a focus change to whoever last requested focus
    pub fn emit_focus_change(&self, change: FocusChange) -> bool {
        let listener = self.focus_listener.lock().clone();
        match listener {
            Some(listener) => listener.focus_changed(change),
            None => false,
        }
    }

    /// Make subsequent focus requests fail
    pub fn deny_focus(&self, deny: bool) {
        self.deny_focus.store(deny, Ordering::Relaxed);
    }

    /// Make speakerphone and Bluetooth toggles fail
    pub fn fail_toggles(&self, fail: bool) {
        self.fail_toggles.store(fail, Ordering::Relaxed);
    }

    pub fn has_device_listener(&self) -> bool {
        self.device_listener.lock().is_some()
    }

    /// Recorded commands, oldest first
    pub fn calls(&self) -> Vec<PlatformCall> {
        self.calls.lock().clone()
    }

    /// Recorded commands, clearing the log
    pub fn take_calls(&self) -> Vec<PlatformCall> {
        std::mem::take(&mut *self.calls.lock())
    }

    fn record(&self, call: PlatformCall) {
        self.calls.lock().push(call);
    }

    fn record_toggle(&self, call: PlatformCall, operation: &str) -> PlatformResult<()> {
        self.record(call);
        if self.fail_toggles.load(Ordering::Relaxed) {
            Err(PlatformError::rejected(operation, "injected failure"))
        } else {
            Ok(())
        }
    }
}

impl AudioSystem for MockAudioSystem {
    fn list_devices(&self) -> Vec<PlatformDeviceInfo> {
        self.devices.lock().clone()
    }

    fn set_device_listener(&self, listener: Option<ProviderEventSink>) {
        *self.device_listener.lock() = listener;
    }

    fn set_audio_mode(&self, mode: PlatformAudioMode) -> PlatformResult<()> {
        self.record(PlatformCall::SetAudioMode(mode));
        Ok(())
    }

    fn set_microphone_mute(&self, muted: bool) -> PlatformResult<()> {
        self.record(PlatformCall::SetMicrophoneMute(muted));
        Ok(())
    }

    fn request_audio_focus(&self, listener: ProviderEventSink) -> FocusRequestResult {
        self.record(PlatformCall::RequestAudioFocus);
        if self.deny_focus.load(Ordering::Relaxed) {
            return FocusRequestResult::Failed;
        }
        *self.focus_listener.lock() = Some(listener);
        FocusRequestResult::Granted
    }

    fn abandon_audio_focus(&self) {
        self.record(PlatformCall::AbandonAudioFocus);
        *self.focus_listener.lock() = None;
    }

    fn set_speakerphone_on(&self, on: bool) -> PlatformResult<()> {
        self.record_toggle(PlatformCall::SetSpeakerphoneOn(on), "setSpeakerphoneOn")
    }

    fn start_bluetooth_sco(&self) -> PlatformResult<()> {
        self.record_toggle(PlatformCall::StartBluetoothSco, "startBluetoothSco")
    }

    fn stop_bluetooth_sco(&self) -> PlatformResult<()> {
        self.record_toggle(PlatformCall::StopBluetoothSco, "stopBluetoothSco")
    }

    fn set_bluetooth_sco_on(&self, on: bool) -> PlatformResult<()> {
        self.record_toggle(PlatformCall::SetBluetoothScoOn(on), "setBluetoothScoOn")
    }
}

/// In-memory managed call-routing service
#[derive(Debug)]
pub struct MockCallAudioService {
    listener: Mutex<Option<ProviderEventSink>>,
    state: Mutex<CallAudioState>,
    routes: Mutex<Vec<CallRoute>>,
    /// Report the new state back after every accepted route switch
    echo_routes: AtomicBool,
}

impl MockCallAudioService {
    pub fn new() -> Self {
        Self {
            listener: Mutex::new(None),
            state: Mutex::new(CallAudioState::new(CallRoute::SPEAKER, CallRoute(0))),
            routes: Mutex::new(Vec::new()),
            echo_routes: AtomicBool::new(false),
        }
    }

    /// Echo every route switch back as a state change, like the platform does
    pub fn with_route_echo(self) -> Self {
        self.echo_routes.store(true, Ordering::Relaxed);
        self
    }

    /// Publish a new routing state to the listener
    pub fn push_state(&self, state: CallAudioState) -> bool {
        *self.state.lock() = state;
        let listener = self.listener.lock().clone();
        match listener {
            Some(listener) => listener.call_audio_state_changed(state),
            None => false,
        }
    }

    pub fn state(&self) -> CallAudioState {
        *self.state.lock()
    }

    /// Routes requested so far
    pub fn routes(&self) -> Vec<CallRoute> {
        self.routes.lock().clone()
    }

    pub fn has_listener(&self) -> bool {
        self.listener.lock().is_some()
    }
}

impl Default for MockCallAudioService {
    fn default() -> Self {
        Self::new()
    }
}

impl CallAudioService for MockCallAudioService {
    fn set_call_audio_state_listener(&self, listener: Option<ProviderEventSink>) {
        *self.listener.lock() = listener;
    }

    fn set_audio_route(&self, route: CallRoute) -> PlatformResult<()> {
        self.routes.lock().push(route);
        if self.echo_routes.load(Ordering::Relaxed) {
            let state = CallAudioState {
                route,
                supported_route_mask: self.state().supported_route_mask,
            };
            self.push_state(state);
        } else {
            self.state.lock().route = route;
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_handset_lists_builtin_devices() {
        let system = MockAudioSystem::handset();
        let kinds: Vec<_> = system.list_devices().into_iter().map(|d| d.kind).collect();
        assert_eq!(kinds, vec![PlatformDeviceKind::BuiltinEarpiece, PlatformDeviceKind::BuiltinSpeaker]);
    }

    #[test]
    fn test_detach_kind() {
        let system = MockAudioSystem::handset();
        system.attach(PlatformDeviceKind::WiredHeadset, "Headset");
        assert_eq!(system.detach_kind(PlatformDeviceKind::WiredHeadset), 1);
        assert_eq!(system.detach_kind(PlatformDeviceKind::WiredHeadset), 0);
        assert_eq!(system.list_devices().len(), 2);
    }

    #[test]
    fn test_failed_toggles_are_still_recorded() {
        let system = MockAudioSystem::new();
        system.fail_toggles(true);
        assert!(system.set_speakerphone_on(true).is_err());
        assert_eq!(system.take_calls(), vec![PlatformCall::SetSpeakerphoneOn(true)]);
    }
}
