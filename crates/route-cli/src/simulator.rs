//! Drives a coordinator over the in-memory platform

use std::sync::Arc;

use anyhow::Result;
use serde_json::json;
use tokio::sync::broadcast::{self, error::TryRecvError};
use tracing::{debug, warn};

use callroute_core::bridge::host_event;
use callroute_core::platform::mock::{MockAudioSystem, MockCallAudioService};
use callroute_core::platform::{AudioSystem, CallAudioState, CallRoute, PlatformDeviceKind};
use callroute_core::provider::connection_service::route_for_device;
use callroute_core::provider::generic::classify_device;
use callroute_core::{
    AudioDevice, HostBridge, PlatformProviderFactory, ProviderKind, RouteConfig,
    RouteCoordinator, RouteEvent, RouteSnapshot,
};

use crate::script::ScriptCommand;

/// Built-in walkthrough used by `callroute demo`
pub const DEMO_SCRIPT: &str = "\
# A handset with earpiece and speaker starts an audio call
mode audio
state
# The user plugs in headphones, then a Bluetooth car kit connects
plug headset
plug bluetooth
# The user prefers the speaker for now
select SPEAKER
# Another app takes focus briefly; the route is re-applied afterwards
focus transient
focus gain
# The car kit disconnects and the user's choice is dropped
unplug bluetooth
# Hand routing over to the platform's call-routing service
managed on
route EARPIECE
managed off
# Hang up
mode default
state
";

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum OutputFormat {
    Text,
    Json,
}

pub struct Simulator {
    audio: Arc<MockAudioSystem>,
    service: Arc<MockCallAudioService>,
    bridge: HostBridge,
    events: broadcast::Receiver<RouteEvent>,
    format: OutputFormat,
}

impl Simulator {
    /// Start a coordinator on a simulated handset. With `managed_platform`
    /// the platform also offers managed call routing.
    pub async fn start(config: RouteConfig, managed_platform: bool, format: OutputFormat) -> Result<Self> {
        let audio = Arc::new(MockAudioSystem::handset());
        let service = Arc::new(MockCallAudioService::new().with_route_echo());

        let mut factory = PlatformProviderFactory::new(audio.clone());
        if managed_platform {
            factory = factory.with_managed_routing(Some(service.clone()));
        }

        let coordinator = RouteCoordinator::start(config, Arc::new(factory)).await?;
        let events = coordinator.subscribe();
        let mut simulator = Self {
            audio,
            service,
            bridge: HostBridge::new(coordinator),
            events,
            format,
        };
        simulator.sync_call_audio_service().await?;
        Ok(simulator)
    }

    fn coordinator(&self) -> &RouteCoordinator {
        self.bridge.coordinator()
    }

    /// Run one command and return the lines it produced, notifications included
    pub async fn step(&mut self, command: &ScriptCommand) -> Result<Vec<String>> {
        debug!(?command, "Running script command");
        let mut lines = Vec::new();

        match command {
            ScriptCommand::Plug(kind) => {
                self.audio.attach(*kind, &format!("{:?}", kind));
                self.sync_call_audio_service().await?;
            }
            ScriptCommand::Unplug(kind) => {
                if self.audio.detach_kind(*kind) == 0 {
                    lines.push(self.note(&format!("no {:?} attached", kind)));
                }
                self.sync_call_audio_service().await?;
            }
            ScriptCommand::Mode(mode) => {
                if let Err(e) = self.bridge.set_mode(*mode).await {
                    lines.push(self.note(&format!("mode {} rejected: {}", mode, e)));
                }
            }
            ScriptCommand::Select(device) => self.bridge.set_audio_device(device)?,
            ScriptCommand::Focus(change) => {
                if !self.audio.emit_focus_change(*change) {
                    lines.push(self.note("nobody holds audio focus"));
                }
            }
            ScriptCommand::Managed(enabled) => {
                let kind = self.bridge.set_use_connection_service(*enabled).await?;
                if *enabled && kind != ProviderKind::ConnectionService {
                    lines.push(self.note("platform has no managed call routing"));
                }
                self.sync_call_audio_service().await?;
            }
            ScriptCommand::Route(device) => {
                if self.provider().await? == Some(ProviderKind::ConnectionService) {
                    let mask = self.service.state().supported_route_mask;
                    self.service.push_state(CallAudioState {
                        route: route_for_device(Some(*device)),
                        supported_route_mask: mask,
                    });
                } else {
                    lines.push(self.note("route changes need managed call routing"));
                }
            }
            ScriptCommand::Refresh => self.coordinator().refresh_route()?,
            ScriptCommand::State => {}
        }

        let snapshot = self.coordinator().snapshot().await?;
        lines.extend(self.drain_events());
        if *command == ScriptCommand::State {
            lines.push(self.format_snapshot(&snapshot)?);
        }
        Ok(lines)
    }

    pub async fn shutdown(self) -> Result<()> {
        self.coordinator().shutdown().await?;
        Ok(())
    }

    async fn provider(&self) -> Result<Option<ProviderKind>> {
        Ok(self.coordinator().snapshot().await?.provider)
    }

    /// The managed service learns about hardware from the OS, not from us.
    /// Mirror the attached endpoints into its supported-route mask.
    async fn sync_call_audio_service(&mut self) -> Result<()> {
        if self.provider().await? != Some(ProviderKind::ConnectionService) {
            return Ok(());
        }
        let kinds: Vec<PlatformDeviceKind> = self.audio.list_devices().iter().map(|d| d.kind).collect();
        let mask = supported_routes(&kinds);
        let current = self.service.state();
        if current.supported_route_mask != mask.bits() {
            self.service.push_state(CallAudioState {
                route: current.route,
                supported_route_mask: mask.bits(),
            });
        }
        Ok(())
    }

    fn drain_events(&mut self) -> Vec<String> {
        let mut lines = Vec::new();
        loop {
            match self.events.try_recv() {
                Ok(event) => {
                    if let Some(line) = self.format_event(&event) {
                        lines.push(line);
                    }
                }
                Err(TryRecvError::Lagged(missed)) => warn!(missed, "Simulator missed notifications"),
                Err(TryRecvError::Empty | TryRecvError::Closed) => break,
            }
        }
        lines
    }

    fn format_event(&self, event: &RouteEvent) -> Option<String> {
        match (self.format, event) {
            (OutputFormat::Json, RouteEvent::ProviderSwitched { kind }) => {
                Some(json!({ "provider_switched": kind }).to_string())
            }
            (OutputFormat::Json, event) => host_event(event).map(|e| json!(e).to_string()),
            (OutputFormat::Text, RouteEvent::ProviderSwitched { kind }) => {
                Some(format!("provider switched: {:?}", kind))
            }
            (OutputFormat::Text, RouteEvent::DevicesUpdated { devices }) => {
                let list: Vec<String> = devices
                    .iter()
                    .map(|entry| {
                        if entry.selected {
                            format!("[{}]", entry.device)
                        } else {
                            entry.device.to_string()
                        }
                    })
                    .collect();
                Some(format!("devices: {}", list.join(" ")))
            }
        }
    }

    fn format_snapshot(&self, snapshot: &RouteSnapshot) -> Result<String> {
        if self.format == OutputFormat::Json {
            return Ok(serde_json::to_string(snapshot)?);
        }
        let show = |device: Option<AudioDevice>| {
            device.map_or_else(|| "-".to_string(), |d| d.to_string())
        };
        let available: Vec<String> = snapshot.available.iter().map(|d| d.to_string()).collect();
        Ok(format!(
            "state: mode={} selected={} override={} provider={} available=[{}]",
            snapshot.mode.map_or_else(|| "UNSET".to_string(), |m| m.to_string()),
            show(snapshot.selected),
            show(snapshot.user_selected),
            snapshot
                .provider
                .map_or_else(|| "-".to_string(), |k| format!("{:?}", k)),
            available.join(" "),
        ))
    }

    fn note(&self, message: &str) -> String {
        match self.format {
            OutputFormat::Json => json!({ "note": message }).to_string(),
            OutputFormat::Text => format!("note: {}", message),
        }
    }
}

/// Route mask covering every routable endpoint in `kinds`
fn supported_routes(kinds: &[PlatformDeviceKind]) -> CallRoute {
    kinds
        .iter()
        .filter_map(|kind| classify_device(*kind))
        .fold(CallRoute(0), |mask, device| mask | route_for_device(Some(device)))
}
