//! # callroute-core - call audio route selection
//!
//! Picks and maintains the physical output path (earpiece, speaker, wired
//! headset, Bluetooth) that carries call audio, reacting to device
//! availability changes, audio focus loss and explicit user choice.
//!
//! ## Architecture
//!
//! ```text
//! ┌─────────────────────┐  commands   ┌─────────────────────┐  route / mode  ┌─────────────────────┐
//! │  Host application   │────────────▶│  RouteCoordinator   │───────────────▶│   RouteProvider     │
//! │  (HostBridge)       │             │  (single worker,    │                │ generic | managed   │
//! │                     │◀────────────│   FIFO queue)       │◀───────────────│                     │
//! └─────────────────────┘  device list└─────────────────────┘ platform events└─────────────────────┘
//!                                                                                      │
//!                                                                           AudioSystem / CallAudioService
//! ```
//!
//! Exactly one provider is live. All state changes, whether triggered by the
//! host or by a platform callback thread, are queued onto the coordinator
//! worker and applied strictly in arrival order.
//!
//! ## Routing rules
//!
//! - `DEFAULT` mode never drives routing: selection and user choice are cleared.
//! - In a call the route is Bluetooth if present, else headphones, else the
//!   speaker.
//! - A user choice overrides that order for as long as the device stays present.
//! - Recomputing with unchanged inputs does nothing, unless forced (e.g. after
//!   audio focus comes back).

pub mod bridge;
pub mod config;
pub mod coordinator;
pub mod device;
pub mod error;
pub mod events;
pub mod logging;
pub mod platform;
pub mod provider;

pub use bridge::{ExportedConstants, HostBridge, HostEvent};
pub use config::RouteConfig;
pub use coordinator::{RouteCoordinator, RouteSnapshot};
pub use device::{AudioDevice, AudioMode, DeviceSet};
pub use error::{PlatformError, PlatformResult, RouteError, RouteResult};
pub use events::{DeviceEntry, EventStream, RouteEvent, DEVICE_CHANGE_EVENT};
pub use logging::{setup_logging, LoggingConfig};
pub use provider::{
    PlatformProviderFactory, ProviderEvent, ProviderEventSink, ProviderFactory, ProviderKind,
    ProviderUpdate, RouteProvider,
};

/// Library version
pub const VERSION: &str = env!("CARGO_PKG_VERSION");
