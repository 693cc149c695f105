//! The serialized worker
//!
//! One task, one FIFO queue. The worker is the only code that reads or writes
//! [`RouteState`] and the only caller of the active provider, so neither
//! needs a lock. Commands run to completion in arrival order; each one sees
//! the fully applied effect of the one before it.

use std::sync::Arc;

use tokio::sync::mpsc;
use tracing::{debug, info, instrument, trace, warn};

use super::state::{Reconciliation, RouteSnapshot, RouteState};
use super::RouteCommand;
use crate::config::RouteConfig;
use crate::device::{AudioDevice, AudioMode};
use crate::error::{RouteError, RouteResult};
use crate::events::{device_entries, EventBroadcaster, RouteEvent};
use crate::provider::{
    ProviderEvent, ProviderEventSink, ProviderFactory, ProviderKind, ProviderUpdate, RouteProvider,
};

struct ActiveProvider {
    generation: u64,
    provider: Box<dyn RouteProvider>,
}

pub(crate) struct RouteWorker {
    state: RouteState,
    provider: Option<ActiveProvider>,
    factory: Arc<dyn ProviderFactory>,
    /// Used to hand out sinks to newly started providers. Weak so that the
    /// queue closes once the last coordinator handle is dropped.
    command_tx: mpsc::WeakUnboundedSender<RouteCommand>,
    events: EventBroadcaster,
    hide_earpiece: bool,
    next_generation: u64,
}

impl RouteWorker {
    pub(crate) fn new(
        config: &RouteConfig,
        factory: Arc<dyn ProviderFactory>,
        command_tx: mpsc::WeakUnboundedSender<RouteCommand>,
        events: EventBroadcaster,
    ) -> Self {
        Self {
            state: RouteState::new(),
            provider: None,
            factory,
            command_tx,
            events,
            hide_earpiece: config.hide_earpiece_with_headphones,
            next_generation: 1,
        }
    }

    pub(crate) async fn run(mut self, mut command_rx: mpsc::UnboundedReceiver<RouteCommand>) {
        debug!("Route worker started");
        while let Some(command) = command_rx.recv().await {
            if !self.handle_command(command).await {
                break;
            }
        }
        // Every handle dropped without a shutdown: detach from the platform
        self.stop_provider().await;
        info!("Route worker stopped");
    }

    /// Returns `false` once the worker should exit
    async fn handle_command(&mut self, command: RouteCommand) -> bool {
        match command {
            RouteCommand::SetMode { mode, reply } => {
                let result = self.set_mode(mode).await;
                if reply.send(result).is_err() {
                    debug!(%mode, "set_mode caller went away before completion");
                }
            }
            RouteCommand::RequestDevice { device } => self.request_device(device).await,
            RouteCommand::SetProviderStrategy { use_managed, reply } => {
                let kind = self.install_provider(use_managed).await;
                let _ = reply.send(kind);
            }
            RouteCommand::Refresh => self.reconcile(true).await,
            RouteCommand::Provider { generation, event } => self.provider_event(generation, event).await,
            RouteCommand::Snapshot { reply } => {
                let _ = reply.send(self.snapshot());
            }
            RouteCommand::Shutdown { reply } => {
                self.stop_provider().await;
                let _ = reply.send(());
                return false;
            }
        }
        true
    }

    fn snapshot(&self) -> RouteSnapshot {
        let kind = self.provider.as_ref().map(|active| active.provider.kind());
        self.state.snapshot(kind)
    }

    #[instrument(skip(self), level = "debug")]
    async fn set_mode(&mut self, mode: AudioMode) -> RouteResult<()> {
        let Some(active) = self.provider.as_mut() else {
            return Err(RouteError::route_activation(mode, "no route provider installed"));
        };

        active.provider.set_mode(mode).await.map_err(|e| match e {
            e @ RouteError::RouteActivationFailed { .. } => e,
            other => RouteError::route_activation(mode, other.to_string()),
        })?;

        self.state.set_mode(mode);
        info!(%mode, "Audio mode set");
        self.reconcile(false).await;
        Ok(())
    }

    async fn request_device(&mut self, device: Option<AudioDevice>) {
        if self.state.request_device(device) {
            debug!(?device, "User selected device");
            self.reconcile(false).await;
        } else {
            debug!(?device, "Device request not recorded");
        }
    }

    async fn provider_event(&mut self, generation: u64, event: ProviderEvent) {
        let snapshot = self.snapshot();
        let updates = match self.provider.as_mut() {
            Some(active) if active.generation == generation => {
                active.provider.handle_event(event, &snapshot).await
            }
            _ => {
                debug!(generation, ?event, "Dropping event from inactive provider");
                return;
            }
        };

        for update in updates {
            match update {
                ProviderUpdate::ReplaceDevices(devices) => {
                    self.state.replace_devices(devices);
                    self.reconcile(false).await;
                }
                ProviderUpdate::Reconcile { force } => self.reconcile(force).await,
                ProviderUpdate::ResetSelection => {
                    self.state.reset_selection();
                    self.reconcile(false).await;
                }
            }
        }
    }

    async fn reconcile(&mut self, force: bool) {
        match self.state.reconcile(force) {
            Reconciliation::Inactive => trace!("No audio mode yet, route not computed"),
            Reconciliation::Cleared => self.notify_devices(),
            Reconciliation::Unchanged(device) => trace!(%device, "Route unchanged"),
            Reconciliation::Route(device) => {
                info!(%device, force, "Routing call audio");
                if force {
                    // The platform may have dropped the call mode as well
                    self.reapply_mode().await;
                }
                if let Some(active) = self.provider.as_mut() {
                    active.provider.set_audio_route(device).await;
                }
                self.notify_devices();
            }
        }
    }

    /// Hand the current call mode to the provider again. Failures are logged;
    /// the mode stays recorded.
    async fn reapply_mode(&mut self) {
        let Some(mode) = self.state.mode().filter(|mode| mode.is_call()) else {
            return;
        };
        if let Some(active) = self.provider.as_mut() {
            if let Err(e) = active.provider.set_mode(mode).await {
                warn!(%mode, "Failed to re-apply audio mode: {}", e);
            }
        }
    }

    fn notify_devices(&self) {
        let devices = device_entries(self.state.available(), self.state.selected(), self.hide_earpiece);
        debug!(?devices, "Publishing device list");
        self.events.publish(RouteEvent::DevicesUpdated { devices });
    }

    /// Stop the current provider, then start the requested one. There is
    /// never more than one provider attached to the platform.
    #[instrument(skip(self), level = "debug")]
    async fn install_provider(&mut self, use_managed: bool) -> ProviderKind {
        let kind = self.factory.resolve(use_managed);
        self.stop_provider().await;

        let generation = self.next_generation;
        self.next_generation += 1;

        let mut provider = self.factory.create(kind);
        let sink = ProviderEventSink::new(generation, self.command_tx.clone());
        if let Err(e) = provider.start(sink).await {
            warn!(?kind, "Route provider running degraded: {}", e);
        }
        info!(?kind, generation, "Route provider started");

        self.provider = Some(ActiveProvider { generation, provider });
        // Platform callbacks registered by the old provider (audio focus
        // among them) are now dropped as stale. A call in progress has to be
        // set up again on the new provider.
        self.reapply_mode().await;
        self.events.publish(RouteEvent::ProviderSwitched { kind });
        kind
    }

    async fn stop_provider(&mut self) {
        if let Some(mut active) = self.provider.take() {
            active.provider.stop().await;
            debug!(kind = ?active.provider.kind(), generation = active.generation, "Route provider stopped");
        }
    }
}
