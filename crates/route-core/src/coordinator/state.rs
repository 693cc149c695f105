//! Canonical route state and the reconciliation algorithm
//!
//! Pure and synchronous. The worker owns the only instance and calls into it
//! after every state-changing event; everything with side effects (provider
//! calls, notifications) is driven from the returned [`Reconciliation`].

use serde::Serialize;

use crate::device::{AudioDevice, AudioMode, DeviceSet};
use crate::provider::ProviderKind;

/// Outcome of one reconciliation pass
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Reconciliation {
    /// No mode set yet; nothing computed
    Inactive,
    /// DEFAULT mode: selection and override were cleared
    Cleared,
    /// Computed device equals the current selection; nothing to do
    Unchanged(AudioDevice),
    /// A new route must be applied
    Route(AudioDevice),
}

/// Point-in-time copy of the coordinator state
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct RouteSnapshot {
    /// `None` until the first successful `set_mode`
    pub mode: Option<AudioMode>,
    pub available: DeviceSet,
    pub selected: Option<AudioDevice>,
    pub user_selected: Option<AudioDevice>,
    pub provider: Option<ProviderKind>,
}

/// Route state owned by the coordinator worker
#[derive(Debug, Default)]
pub struct RouteState {
    mode: Option<AudioMode>,
    available: DeviceSet,
    selected: Option<AudioDevice>,
    user_selected: Option<AudioDevice>,
}

impl RouteState {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn mode(&self) -> Option<AudioMode> {
        self.mode
    }

    pub fn available(&self) -> &DeviceSet {
        &self.available
    }

    pub fn selected(&self) -> Option<AudioDevice> {
        self.selected
    }

    pub fn user_selected(&self) -> Option<AudioDevice> {
        self.user_selected
    }

    pub fn set_mode(&mut self, mode: AudioMode) {
        self.mode = Some(mode);
    }

    /// Drop both the selection and the user override
    pub fn reset_selection(&mut self) {
        self.selected = None;
        self.user_selected = None;
    }

    /// Replace the available set wholesale. The previous selection is no
    /// longer known to be valid, so it is dropped.
    pub fn replace_devices(&mut self, devices: DeviceSet) {
        self.available = devices;
        self.reset_selection();
    }

    /// Record a user choice. Unknown or unavailable devices clear the
    /// override instead. Nothing is recorded before the first mode is set.
    /// Returns whether an override is now set.
    pub fn request_device(&mut self, device: Option<AudioDevice>) -> bool {
        match device {
            Some(_) if self.mode.is_none() => false,
            Some(device) if self.available.contains(device) => {
                self.user_selected = Some(device);
                true
            }
            _ => {
                self.user_selected = None;
                false
            }
        }
    }

    /// Device the route should be on: the user override if still present,
    /// otherwise the highest-priority device.
    pub fn target_device(&self) -> AudioDevice {
        match self.user_selected {
            Some(device) if self.available.contains(device) => device,
            _ => self.available.priority_device(),
        }
    }

    /// Recompute the route. Without `force`, an unchanged result is a no-op.
    pub fn reconcile(&mut self, force: bool) -> Reconciliation {
        let Some(mode) = self.mode else {
            return Reconciliation::Inactive;
        };

        if !mode.is_call() {
            self.reset_selection();
            return Reconciliation::Cleared;
        }

        if matches!(self.user_selected, Some(device) if !self.available.contains(device)) {
            self.user_selected = None;
        }

        let device = self.target_device();
        if !force && self.selected == Some(device) {
            return Reconciliation::Unchanged(device);
        }

        self.selected = Some(device);
        Reconciliation::Route(device)
    }

    pub fn snapshot(&self, provider: Option<ProviderKind>) -> RouteSnapshot {
        RouteSnapshot {
            mode: self.mode,
            available: self.available.clone(),
            selected: self.selected,
            user_selected: self.user_selected,
            provider,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn all_device_sets() -> Vec<DeviceSet> {
        (0u8..16)
            .map(|bits| {
                AudioDevice::ALL
                    .into_iter()
                    .enumerate()
                    .filter(|(i, _)| bits & (1 << i) != 0)
                    .map(|(_, device)| device)
                    .collect()
            })
            .collect()
    }

    fn in_call(devices: DeviceSet) -> RouteState {
        let mut state = RouteState::new();
        state.replace_devices(devices);
        state.set_mode(AudioMode::AudioCall);
        state
    }

    #[test]
    fn test_no_route_while_unset() {
        let mut state = RouteState::new();
        state.replace_devices(DeviceSet::from([AudioDevice::Speaker]));
        assert_eq!(state.reconcile(true), Reconciliation::Inactive);
        assert_eq!(state.selected(), None);
    }

    #[test]
    fn test_request_ignored_while_unset() {
        let mut state = RouteState::new();
        state.replace_devices(DeviceSet::from([AudioDevice::Speaker, AudioDevice::Headphones]));
        assert!(!state.request_device(Some(AudioDevice::Speaker)));
        assert_eq!(state.user_selected(), None);

        state.set_mode(AudioMode::VideoCall);
        assert_eq!(state.reconcile(false), Reconciliation::Route(AudioDevice::Headphones));
    }

    #[test]
    fn test_priority_order_for_every_device_set() {
        for devices in all_device_sets() {
            let expected = if devices.contains(AudioDevice::Bluetooth) {
                AudioDevice::Bluetooth
            } else if devices.contains(AudioDevice::Headphones) {
                AudioDevice::Headphones
            } else {
                AudioDevice::Speaker
            };
            let mut state = in_call(devices.clone());
            assert_eq!(state.reconcile(false), Reconciliation::Route(expected), "set {:?}", devices);
        }
    }

    #[test]
    fn test_override_wins_when_available() {
        for devices in all_device_sets() {
            for device in devices.iter() {
                let mut state = in_call(devices.clone());
                state.reconcile(false);
                assert!(state.request_device(Some(device)));
                state.reconcile(false);
                assert_eq!(state.selected(), Some(device), "set {:?}", devices);
            }
        }
    }

    #[test]
    fn test_unavailable_request_clears_override() {
        let mut state = in_call(DeviceSet::from([AudioDevice::Speaker, AudioDevice::Bluetooth]));
        state.request_device(Some(AudioDevice::Speaker));
        assert_eq!(state.reconcile(false), Reconciliation::Route(AudioDevice::Speaker));

        assert!(!state.request_device(Some(AudioDevice::Earpiece)));
        assert_eq!(state.user_selected(), None);
        assert_eq!(state.reconcile(false), Reconciliation::Route(AudioDevice::Bluetooth));

        assert!(!state.request_device(None));
    }

    #[test]
    fn test_override_evicted_when_device_disappears() {
        let mut state = in_call(DeviceSet::from([AudioDevice::Speaker, AudioDevice::Headphones]));
        state.request_device(Some(AudioDevice::Speaker));
        state.reconcile(false);

        state.replace_devices(DeviceSet::from([AudioDevice::Headphones]));
        assert_eq!(state.user_selected(), None);
        assert_eq!(state.reconcile(false), Reconciliation::Route(AudioDevice::Headphones));
    }

    #[test]
    fn test_reconcile_is_idempotent_unless_forced() {
        let mut state = in_call(DeviceSet::from([AudioDevice::Speaker, AudioDevice::Bluetooth]));
        assert_eq!(state.reconcile(false), Reconciliation::Route(AudioDevice::Bluetooth));
        assert_eq!(state.reconcile(false), Reconciliation::Unchanged(AudioDevice::Bluetooth));
        assert_eq!(state.reconcile(true), Reconciliation::Route(AudioDevice::Bluetooth));
    }

    #[test]
    fn test_default_mode_clears_everything() {
        let mut state = in_call(DeviceSet::from([AudioDevice::Speaker, AudioDevice::Bluetooth]));
        state.request_device(Some(AudioDevice::Speaker));
        state.reconcile(false);

        state.set_mode(AudioMode::Default);
        assert_eq!(state.reconcile(false), Reconciliation::Cleared);
        assert_eq!(state.selected(), None);
        assert_eq!(state.user_selected(), None);
    }

    #[test]
    fn test_snapshot_reflects_state() {
        let mut state = in_call(DeviceSet::from([AudioDevice::Speaker]));
        state.reconcile(false);
        let snapshot = state.snapshot(Some(ProviderKind::Generic));
        assert_eq!(snapshot.mode, Some(AudioMode::AudioCall));
        assert_eq!(snapshot.selected, Some(AudioDevice::Speaker));
        assert_eq!(snapshot.provider, Some(ProviderKind::Generic));
    }
}
