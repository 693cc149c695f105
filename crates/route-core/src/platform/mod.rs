//! Platform collaborators
//!
//! The engine never talks to OS audio APIs directly. Providers drive one of
//! these traits instead, and a backend (the OS binding, or the in-memory
//! [`mock`] platform) implements them. Callbacks from the platform are
//! delivered through a [`ProviderEventSink`], which may be invoked from any
//! thread.

use std::fmt;

use serde::{Deserialize, Serialize};

use crate::error::PlatformResult;
use crate::provider::ProviderEventSink;

#[cfg(feature = "platform-mock")]
pub mod mock;

/// Endpoint category as reported by the OS device registry
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PlatformDeviceKind {
    BuiltinEarpiece,
    BuiltinSpeaker,
    WiredHeadset,
    WiredHeadphones,
    BluetoothSco,
    UsbHeadset,
    /// Anything the router does not handle (HDMI, A2DP, line out, ...)
    Other(i32),
}

impl PlatformDeviceKind {
    /// Map a raw OS device type code
    pub fn from_type_code(code: i32) -> Self {
        match code {
            1 => PlatformDeviceKind::BuiltinEarpiece,
            2 => PlatformDeviceKind::BuiltinSpeaker,
            3 => PlatformDeviceKind::WiredHeadset,
            4 => PlatformDeviceKind::WiredHeadphones,
            7 => PlatformDeviceKind::BluetoothSco,
            22 => PlatformDeviceKind::UsbHeadset,
            other => PlatformDeviceKind::Other(other),
        }
    }
}

/// One endpoint attached to the system
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct PlatformDeviceInfo {
    /// Platform identifier
    pub id: u32,
    /// Product name, informational only
    pub name: String,
    pub kind: PlatformDeviceKind,
}

impl PlatformDeviceInfo {
    pub fn new(id: u32, name: impl Into<String>, kind: PlatformDeviceKind) -> Self {
        Self {
            id,
            name: name.into(),
            kind,
        }
    }
}

/// OS-level audio mode
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum PlatformAudioMode {
    Normal,
    InCommunication,
}

/// Audio focus transition delivered by the OS
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FocusChange {
    Gain,
    Loss,
    LossTransient,
    LossTransientCanDuck,
}

/// Outcome of an exclusive focus request
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum FocusRequestResult {
    Granted,
    /// Focus will be delivered later through a `Gain` callback
    Delayed,
    Failed,
}

/// Route bit mask used by the managed call-routing subsystem
#[derive(Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct CallRoute(pub u32);

impl CallRoute {
    pub const EARPIECE: CallRoute = CallRoute(0x01);
    pub const BLUETOOTH: CallRoute = CallRoute(0x02);
    pub const WIRED_HEADSET: CallRoute = CallRoute(0x04);
    pub const SPEAKER: CallRoute = CallRoute(0x08);

    pub fn bits(&self) -> u32 {
        self.0
    }

    /// Whether every bit of `route` is set in this mask
    pub fn contains(&self, route: CallRoute) -> bool {
        self.0 & route.0 == route.0
    }
}

impl std::ops::BitOr for CallRoute {
    type Output = CallRoute;

    fn bitor(self, rhs: CallRoute) -> CallRoute {
        CallRoute(self.0 | rhs.0)
    }
}

impl fmt::Debug for CallRoute {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "CallRoute({:#06x})", self.0)
    }
}

/// Routing state pushed by the managed call-routing subsystem
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct CallAudioState {
    /// Route currently carrying call audio
    pub route: CallRoute,
    /// Bit mask of every route the platform can currently use
    pub supported_route_mask: u32,
}

impl CallAudioState {
    pub fn new(route: CallRoute, supported: CallRoute) -> Self {
        Self {
            route,
            supported_route_mask: supported.bits(),
        }
    }
}

/// OS audio manager used by the generic provider
///
/// Calls are assumed synchronous and fast; they run on the coordinator worker.
pub trait AudioSystem: Send + Sync + fmt::Debug {
    /// Enumerate every attached endpoint
    fn list_devices(&self) -> Vec<PlatformDeviceInfo>;

    /// Register (or clear) the receiver of hardware add/remove callbacks
    fn set_device_listener(&self, listener: Option<ProviderEventSink>);

    fn set_audio_mode(&self, mode: PlatformAudioMode) -> PlatformResult<()>;

    fn set_microphone_mute(&self, muted: bool) -> PlatformResult<()>;

    /// Request exclusive voice-communication focus. Later focus changes are
    /// reported through `listener`.
    fn request_audio_focus(&self, listener: ProviderEventSink) -> FocusRequestResult;

    fn abandon_audio_focus(&self);

    fn set_speakerphone_on(&self, on: bool) -> PlatformResult<()>;

    fn start_bluetooth_sco(&self) -> PlatformResult<()>;

    fn stop_bluetooth_sco(&self) -> PlatformResult<()>;

    fn set_bluetooth_sco_on(&self, on: bool) -> PlatformResult<()>;
}

/// Managed call-routing subsystem used by the connection-service provider
pub trait CallAudioService: Send + Sync + fmt::Debug {
    /// Register (or clear) the receiver of route/route-mask changes
    fn set_call_audio_state_listener(&self, listener: Option<ProviderEventSink>);

    /// Ask the platform to move call audio to `route`
    fn set_audio_route(&self, route: CallRoute) -> PlatformResult<()>;
}
