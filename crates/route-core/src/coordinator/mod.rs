//! Route coordinator
//!
//! [`RouteCoordinator`] is a cheap, clonable handle onto a single worker task
//! that owns the route state and the active provider. Every entry point
//! (host commands and platform callbacks alike) is queued onto that worker
//! rather than executed on the calling thread.
//!
//! ```rust
//! use std::sync::Arc;
//! use callroute_core::{AudioDevice, AudioMode, PlatformProviderFactory, RouteConfig, RouteCoordinator};
//! use callroute_core::platform::mock::MockAudioSystem;
//!
//! # #[tokio::main]
//! # async fn main() -> Result<(), Box<dyn std::error::Error>> {
//! let audio = Arc::new(MockAudioSystem::handset());
//! let factory = Arc::new(PlatformProviderFactory::new(audio.clone()));
//! let coordinator = RouteCoordinator::start(RouteConfig::default(), factory).await?;
//!
//! coordinator.set_mode(AudioMode::AudioCall).await?;
//! let snapshot = coordinator.snapshot().await?;
//! assert_eq!(snapshot.selected, Some(AudioDevice::Speaker));
//!
//! coordinator.shutdown().await?;
//! # Ok(())
//! # }
//! ```

use std::sync::Arc;

use tokio::sync::{broadcast, mpsc, oneshot};
use tokio_stream::wrappers::BroadcastStream;
use tracing::debug;

use crate::config::RouteConfig;
use crate::device::{AudioDevice, AudioMode};
use crate::error::{RouteError, RouteResult};
use crate::events::{EventBroadcaster, EventStream, RouteEvent};
use crate::provider::{ProviderEvent, ProviderFactory, ProviderKind};

pub mod state;
mod worker;

pub use state::{Reconciliation, RouteSnapshot, RouteState};

use worker::RouteWorker;

/// Work item for the coordinator worker
#[derive(Debug)]
pub(crate) enum RouteCommand {
    SetMode {
        mode: AudioMode,
        reply: oneshot::Sender<RouteResult<()>>,
    },
    /// `None` is an unknown device id; it clears the override
    RequestDevice { device: Option<AudioDevice> },
    SetProviderStrategy {
        use_managed: bool,
        reply: oneshot::Sender<ProviderKind>,
    },
    /// Forced reconciliation
    Refresh,
    Provider { generation: u64, event: ProviderEvent },
    Snapshot { reply: oneshot::Sender<RouteSnapshot> },
    Shutdown { reply: oneshot::Sender<()> },
}

/// Handle to the route coordinator
#[derive(Debug, Clone)]
pub struct RouteCoordinator {
    command_tx: mpsc::UnboundedSender<RouteCommand>,
    events: EventBroadcaster,
}

impl RouteCoordinator {
    /// Spawn the worker on the current tokio runtime and install the initial
    /// provider. Returns once the provider has been started.
    pub async fn start(config: RouteConfig, factory: Arc<dyn ProviderFactory>) -> RouteResult<Self> {
        config.validate()?;

        let (command_tx, command_rx) = mpsc::unbounded_channel();
        let events = EventBroadcaster::new(config.event_channel_capacity);
        let worker = RouteWorker::new(&config, factory, command_tx.downgrade(), events.clone());
        tokio::spawn(worker.run(command_rx));

        let coordinator = Self { command_tx, events };
        coordinator
            .set_provider_strategy(config.use_managed_routing)
            .await?;
        Ok(coordinator)
    }

    fn send(&self, command: RouteCommand) -> RouteResult<()> {
        self.command_tx
            .send(command)
            .map_err(|_| RouteError::CoordinatorClosed)
    }

    async fn request<T>(
        &self,
        command: impl FnOnce(oneshot::Sender<T>) -> RouteCommand,
    ) -> RouteResult<T> {
        let (reply, rx) = oneshot::channel();
        self.send(command(reply))?;
        rx.await.map_err(|_| RouteError::CoordinatorClosed)
    }

    /// Switch the audio mode. Completes once the provider accepted the mode
    /// and the route has been recomputed; on failure nothing changes.
    pub async fn set_mode(&self, mode: AudioMode) -> RouteResult<()> {
        self.request(|reply| RouteCommand::SetMode { mode, reply }).await?
    }

    /// Like [`set_mode`](Self::set_mode) for a raw host value. Values outside
    /// the mode enumeration are rejected before anything is queued.
    pub async fn set_mode_raw(&self, mode: i32) -> RouteResult<()> {
        let mode = AudioMode::try_from(mode)?;
        self.set_mode(mode).await
    }

    /// Ask for `device` to carry call audio. An unavailable device clears
    /// any previous choice instead.
    pub fn request_device(&self, device: AudioDevice) -> RouteResult<()> {
        self.send(RouteCommand::RequestDevice {
            device: Some(device),
        })
    }

    /// [`request_device`](Self::request_device) by wire id. Unknown ids are
    /// treated like unavailable devices.
    pub fn request_device_id(&self, id: &str) -> RouteResult<()> {
        let device = id.parse::<AudioDevice>().ok();
        if device.is_none() {
            debug!(id, "Unknown device id requested");
        }
        self.send(RouteCommand::RequestDevice { device })
    }

    /// Stop the current provider and start the requested strategy. Managed
    /// routing falls back to the generic strategy when the platform lacks it.
    /// Returns the strategy now active.
    pub async fn set_provider_strategy(&self, use_managed: bool) -> RouteResult<ProviderKind> {
        self.request(|reply| RouteCommand::SetProviderStrategy { use_managed, reply })
            .await
    }

    /// Re-apply the route even if the computed device did not change
    pub fn refresh_route(&self) -> RouteResult<()> {
        self.send(RouteCommand::Refresh)
    }

    /// Current state, after every previously queued command has run
    pub async fn snapshot(&self) -> RouteResult<RouteSnapshot> {
        self.request(|reply| RouteCommand::Snapshot { reply }).await
    }

    pub fn subscribe(&self) -> broadcast::Receiver<RouteEvent> {
        self.events.subscribe()
    }

    pub fn events(&self) -> EventStream {
        BroadcastStream::new(self.subscribe())
    }

    /// Stop the active provider and end the worker. Later calls fail with
    /// [`RouteError::CoordinatorClosed`].
    ///
    /// Dropping every handle has the same effect once the queued commands
    /// have run.
    pub async fn shutdown(&self) -> RouteResult<()> {
        self.request(|reply| RouteCommand::Shutdown { reply }).await
    }

    pub fn is_closed(&self) -> bool {
        self.command_tx.is_closed()
    }
}
