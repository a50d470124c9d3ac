//! Command bridge: the operations a UI layer calls on the sender.
//!
//! Every command takes the shared [`AppState`], locks what it needs, and
//! answers with a [`CommandResult`] so the caller always gets the same
//! `{ success, data, error }` shape back.  The UI never touches a transport
//! directly; everything goes through the one [`ConnectionManager`] held here,
//! which keeps a single session per sender.
//!
//! # Composition
//!
//! [`AppState::new`] builds the manager eagerly, so status listeners and
//! message handlers can be registered on it from the start; nothing has to
//! be queued until a manager exists.
//!
//! # Events
//!
//! Transport events are drained by [`AppState::run_event_loop`] (a long-lived
//! task) or, in tests, by [`AppState::process_pending_events`].

use std::path::PathBuf;
use std::sync::Arc;

use racecast_core::protocol::messages::{Location, PositionMessage, RequestMessage};
use racecast_core::{ConnectionStatus, Device, Message};
use serde::{Deserialize, Serialize};
use tokio::sync::{mpsc, Mutex};
use tracing::{debug, warn};

use crate::application::connection_manager::ConnectionManager;
use crate::application::transport::{IdentityProvider, SessionEvent, TransportFactory};
use crate::infrastructure::storage::config::{save_config_to, AppConfig};

// ── Shared application state ──────────────────────────────────────────────────

/// State shared between UI commands and the event loop.
///
/// Fields use `tokio::sync::Mutex` because commands run as async tasks and
/// may hold a lock across an `.await`.
pub struct AppState {
    pub connection_manager: Mutex<ConnectionManager>,
    pub config: Mutex<AppConfig>,
    /// Where config changes are persisted; `None` keeps them in memory.
    config_path: Option<PathBuf>,
    events: Mutex<mpsc::UnboundedReceiver<SessionEvent>>,
}

impl AppState {
    /// Composes the sender from `config` and its collaborators.
    pub fn new(
        config: AppConfig,
        factory: Box<dyn TransportFactory>,
        identity: Arc<dyn IdentityProvider>,
        config_path: Option<PathBuf>,
    ) -> Arc<Self> {
        let (manager, events) = ConnectionManager::new(config.session_config(), factory, identity);
        Arc::new(Self {
            connection_manager: Mutex::new(manager),
            config: Mutex::new(config),
            config_path,
            events: Mutex::new(events),
        })
    }

    /// Handles every event already queued.  Returns how many were handled.
    pub async fn process_pending_events(&self) -> usize {
        let mut events = self.events.lock().await;
        let mut manager = self.connection_manager.lock().await;
        let mut handled = 0;
        while let Ok(event) = events.try_recv() {
            manager.handle_event(event);
            handled += 1;
        }
        handled
    }

    /// Feeds transport events to the manager until every sender is gone.
    pub async fn run_event_loop(self: Arc<Self>) {
        loop {
            let event = { self.events.lock().await.recv().await };
            match event {
                Some(event) => self.connection_manager.lock().await.handle_event(event),
                None => {
                    debug!("event channel closed, stopping event loop");
                    break;
                }
            }
        }
    }

    fn persist_config(&self, config: &AppConfig) -> Result<(), String> {
        match &self.config_path {
            Some(path) => {
                save_config_to(config, path).map_err(|e| format!("failed to save config: {e}"))
            }
            None => Ok(()),
        }
    }
}

// ── Data Transfer Objects ─────────────────────────────────────────────────────

/// A receiver device as the UI sees it.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeviceDto {
    pub id: String,
    pub name: String,
}

impl From<&Device> for DeviceDto {
    fn from(d: &Device) -> Self {
        Self {
            id: d.id.to_string(),
            name: d.name.clone(),
        }
    }
}

impl From<DeviceDto> for Device {
    fn from(dto: DeviceDto) -> Self {
        Device::new(dto.id, dto.name)
    }
}

/// Connection status plus the selected device.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StatusDto {
    pub status: ConnectionStatus,
    pub device: Option<DeviceDto>,
    pub auto_connect: bool,
}

impl From<&ConnectionManager> for StatusDto {
    fn from(m: &ConnectionManager) -> Self {
        Self {
            status: m.status(),
            device: m.selected_device().map(DeviceDto::from),
            auto_connect: m.is_auto_connect(),
        }
    }
}

/// A race request from the UI.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RaceRequestDto {
    pub target_title: String,
    pub target_location: Location,
    pub start_location: Location,
    #[serde(default)]
    pub coarse_user_location: Option<Location>,
}

/// Unified response wrapper used by every command.
#[derive(Debug, Serialize, Deserialize)]
pub struct CommandResult<T: Serialize> {
    pub success: bool,
    pub data: Option<T>,
    pub error: Option<String>,
}

impl<T: Serialize> CommandResult<T> {
    pub fn ok(data: T) -> Self {
        Self {
            success: true,
            data: Some(data),
            error: None,
        }
    }
    pub fn err(msg: impl Into<String>) -> Self {
        Self {
            success: false,
            data: None,
            error: Some(msg.into()),
        }
    }
}

// ── Commands ──────────────────────────────────────────────────────────────────

/// Returns the current connection status.
pub async fn get_status(state: Arc<AppState>) -> CommandResult<StatusDto> {
    let manager = state.connection_manager.lock().await;
    CommandResult::ok(StatusDto::from(&*manager))
}

/// Selects a device, or clears the selection with `None`.
pub async fn select_device(
    state: Arc<AppState>,
    device: Option<DeviceDto>,
) -> CommandResult<StatusDto> {
    let mut manager = state.connection_manager.lock().await;
    manager.select_device(device.map(Device::from));
    CommandResult::ok(StatusDto::from(&*manager))
}

pub async fn connect(state: Arc<AppState>) -> CommandResult<StatusDto> {
    let mut manager = state.connection_manager.lock().await;
    if manager.selected_device().is_none() {
        return CommandResult::err("no device selected");
    }
    manager.connect();
    CommandResult::ok(StatusDto::from(&*manager))
}

pub async fn disconnect(state: Arc<AppState>, logout: bool) -> CommandResult<StatusDto> {
    let mut manager = state.connection_manager.lock().await;
    manager.disconnect(logout);
    CommandResult::ok(StatusDto::from(&*manager))
}

/// Changes and persists the auto-connect setting.
pub async fn set_auto_connect(state: Arc<AppState>, auto_connect: bool) -> CommandResult<()> {
    state
        .connection_manager
        .lock()
        .await
        .set_auto_connect(auto_connect);

    let mut cfg = state.config.lock().await;
    cfg.sender.auto_connect = auto_connect;
    match state.persist_config(&cfg) {
        Ok(()) => CommandResult::ok(()),
        Err(e) => CommandResult::err(e),
    }
}

/// Asks the receiver to start a race.
pub async fn send_request(state: Arc<AppState>, request: RaceRequestDto) -> CommandResult<()> {
    let mut builder = RequestMessage::builder()
        .target(request.target_title, request.target_location)
        .start(request.start_location);
    if let Some(location) = request.coarse_user_location {
        builder = builder.user_location(location);
    }
    let message = match builder.build() {
        Ok(m) => Message::Request(m),
        Err(e) => return CommandResult::err(e.to_string()),
    };
    send_control(&state, &message).await
}

/// Reports the player's current position.
pub async fn send_position(state: Arc<AppState>, location: Location) -> CommandResult<()> {
    let message = Message::Position(PositionMessage::new(location));
    send_control(&state, &message).await
}

async fn send_control(state: &AppState, message: &Message) -> CommandResult<()> {
    let mut manager = state.connection_manager.lock().await;
    match manager.send_control(message) {
        Ok(()) => CommandResult::ok(()),
        Err(e) => {
            warn!("{} not sent: {e}", message.type_name());
            CommandResult::err(e.to_string())
        }
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
