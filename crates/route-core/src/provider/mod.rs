//! Route provider abstraction
//!
//! A provider detects which devices are present and executes routing
//! commands against the platform. Exactly one provider is live at a time; the
//! coordinator worker owns it and is the only caller of its methods.
//!
//! Platform callbacks never touch provider state directly. They go through a
//! [`ProviderEventSink`] onto the coordinator queue, and the worker hands each
//! event back to the provider via [`RouteProvider::handle_event`].

use std::fmt;
use std::sync::Arc;

use async_trait::async_trait;
use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::trace;

use crate::coordinator::{RouteCommand, RouteSnapshot};
use crate::device::{AudioDevice, AudioMode, DeviceSet};
use crate::error::RouteResult;
use crate::platform::{AudioSystem, CallAudioService, CallAudioState, FocusChange};

pub mod connection_service;
pub mod generic;

pub use connection_service::ConnectionServiceRouteProvider;
pub use generic::GenericRouteProvider;

/// Which strategy a provider implements
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderKind {
    /// Polls the OS device registry and toggles hardware routes directly
    Generic,
    /// Delegates routing to the platform's managed call-routing subsystem
    ConnectionService,
}

/// Raw platform callback, queued onto the coordinator worker
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderEvent {
    /// A device was attached or detached
    HardwareDevicesChanged,
    FocusChanged(FocusChange),
    CallAudioStateChanged(CallAudioState),
}

/// What a provider asks the coordinator to do after handling an event
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum ProviderUpdate {
    /// Replace the available set, drop the current selection and reconcile
    ReplaceDevices(DeviceSet),
    /// Recompute the route; `force` re-issues it even when unchanged
    Reconcile { force: bool },
    /// Drop the user's choice and the current selection, then reconcile
    ResetSelection,
}

/// Handle through which platform callbacks reach the coordinator queue
///
/// Cheap to clone and safe to use from any thread. Each sink is tagged with
/// the generation of the provider it was issued to, so callbacks from a
/// provider that has since been stopped are discarded.
///
/// A sink does not keep the coordinator alive: once every
/// [`RouteCoordinator`](crate::RouteCoordinator) handle is gone, submitting
/// fails and the worker detaches the provider.
#[derive(Clone)]
pub struct ProviderEventSink {
    generation: u64,
    tx: mpsc::WeakUnboundedSender<RouteCommand>,
}

impl ProviderEventSink {
    pub(crate) fn new(generation: u64, tx: mpsc::WeakUnboundedSender<RouteCommand>) -> Self {
        Self { generation, tx }
    }

    /// Generation of the provider this sink belongs to
    pub fn generation(&self) -> u64 {
        self.generation
    }

    /// Queue an event. Returns `false` once the coordinator has shut down.
    pub fn submit(&self, event: ProviderEvent) -> bool {
        trace!(generation = self.generation, ?event, "Queueing provider event");
        let Some(tx) = self.tx.upgrade() else {
            return false;
        };
        tx.send(RouteCommand::Provider {
            generation: self.generation,
            event,
        })
        .is_ok()
    }

    pub fn hardware_devices_changed(&self) -> bool {
        self.submit(ProviderEvent::HardwareDevicesChanged)
    }

    pub fn focus_changed(&self, change: FocusChange) -> bool {
        self.submit(ProviderEvent::FocusChanged(change))
    }

    pub fn call_audio_state_changed(&self, state: CallAudioState) -> bool {
        self.submit(ProviderEvent::CallAudioStateChanged(state))
    }
}

impl fmt::Debug for ProviderEventSink {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ProviderEventSink")
            .field("generation", &self.generation)
            .field("closed", &self.tx.upgrade().map_or(true, |tx| tx.is_closed()))
            .finish()
    }
}

/// Capability set every routing strategy implements
///
/// All methods are invoked sequentially from the coordinator worker.
#[async_trait]
pub trait RouteProvider: Send + fmt::Debug {
    fn kind(&self) -> ProviderKind;

    /// Begin detecting devices. Callbacks must be delivered through `sink`.
    ///
    /// An error leaves the provider installed in a degraded state.
    async fn start(&mut self, sink: ProviderEventSink) -> RouteResult<()>;

    /// Stop detecting devices and detach from the platform
    async fn stop(&mut self);

    /// Route call audio to `device`. Fire-and-forget: platform failures are
    /// logged, not reported.
    async fn set_audio_route(&mut self, device: AudioDevice);

    /// Switch the platform into `mode`
    async fn set_mode(&mut self, mode: AudioMode) -> RouteResult<()>;

    /// Interpret a queued platform callback
    async fn handle_event(&mut self, event: ProviderEvent, state: &RouteSnapshot) -> Vec<ProviderUpdate>;
}

/// Builds providers for the coordinator on (re)selection
pub trait ProviderFactory: Send + Sync {
    /// Whether the managed call-routing strategy can be used at all
    fn supports_managed_routing(&self) -> bool;

    fn create(&self, kind: ProviderKind) -> Box<dyn RouteProvider>;

    /// Strategy to install for a given preference
    fn resolve(&self, use_managed: bool) -> ProviderKind {
        if use_managed && self.supports_managed_routing() {
            ProviderKind::ConnectionService
        } else {
            ProviderKind::Generic
        }
    }
}

/// Factory building the two built-in strategies over platform collaborators
#[derive(Debug, Clone)]
pub struct PlatformProviderFactory {
    audio: Arc<dyn AudioSystem>,
    call_audio: Option<Arc<dyn CallAudioService>>,
    managed_supported: bool,
}

impl PlatformProviderFactory {
    /// Factory for a platform without managed call routing
    pub fn new(audio: Arc<dyn AudioSystem>) -> Self {
        Self {
            audio,
            call_audio: None,
            managed_supported: false,
        }
    }

    /// Declare managed routing support, optionally with the service handle.
    ///
    /// A supported platform whose service cannot be located (`None`) still
    /// selects the connection-service strategy, which then runs degraded.
    pub fn with_managed_routing(mut self, call_audio: Option<Arc<dyn CallAudioService>>) -> Self {
        self.call_audio = call_audio;
        self.managed_supported = true;
        self
    }
}

impl ProviderFactory for PlatformProviderFactory {
    fn supports_managed_routing(&self) -> bool {
        self.managed_supported
    }

    fn create(&self, kind: ProviderKind) -> Box<dyn RouteProvider> {
        match kind {
            ProviderKind::Generic => Box::new(GenericRouteProvider::new(self.audio.clone())),
            ProviderKind::ConnectionService => Box::new(ConnectionServiceRouteProvider::new(
                self.audio.clone(),
                self.call_audio.clone(),
            )),
        }
    }
}
