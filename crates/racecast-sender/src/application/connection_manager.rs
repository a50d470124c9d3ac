//! ConnectionManager: supervises the single session with the selected
//! receiver device.
//!
//! # Lifecycle
//!
//! ```text
//! NotAvailable ─select_device(Some)─► Disconnected ─connect()─► Connecting
//!                                                                   │ Connected event
//!                       ┌── Suspended ◄─ suspended ─┐               ▼
//!                       │  (Connected event)        └──────── Connected
//!                       └──────────────────────────────────►    │ launch Ok
//!                                                                ▼
//!                                                             Casting
//! ```
//!
//! `disconnect()` or a connection failure returns to `Disconnected`;
//! deselecting or replacing the device tears the session down and returns to
//! `NotAvailable`.
//!
//! Every transport the manager opens gets its own [`SessionId`].  When the
//! manager severs a transport itself (`disconnect()`, a failed launch) it
//! retires it and opens a fresh one for the same device, so an attempt that
//! was abandoned can never report into the next one.
//!
//! # Event handling
//!
//! Transports never call back into the manager directly.  They push
//! [`SessionEvent`]s into the channel returned by [`ConnectionManager::new`];
//! whoever owns the manager drains that channel and feeds each event to
//! [`ConnectionManager::handle_event`].  Events stamped with a session id
//! other than the current session's are dropped, and each event is only
//! accepted in the states listed on its handler.

use std::sync::Arc;

use racecast_core::protocol::messages::{LoginMessage, LogoutMessage};
use racecast_core::{encode_message, CodecError, ConnectionStatus, Device, Message, SessionCounter, SessionId};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::application::channel_mux::{ChannelMultiplexer, MessageHandler};
use crate::application::listener_registry::{Listener, ListenerRegistry};
use crate::application::transport::{
    EventSink, IdentityProvider, SessionEvent, Transport, TransportError, TransportEvent,
    TransportFactory,
};

/// Receiver application launched once the transport is up.
pub const DEFAULT_APP_ID: &str = "807AB2E8";

/// Namespace carrying `login`, `logout`, `request` and `position`.
pub const DEFAULT_CONTROL_NAMESPACE: &str = "urn:x-cast:de.martinmatysiak.mapracer";

/// Error type for [`ConnectionManager::send_message`].
#[derive(Debug, Error)]
pub enum SessionError {
    #[error("no device selected")]
    NoSession,

    #[error("session is not connected (status {0})")]
    NotConnected(ConnectionStatus),

    #[error("failed to encode message: {0}")]
    Codec(#[from] CodecError),

    #[error("transport error: {0}")]
    Transport(#[from] TransportError),
}

/// Settings the manager needs at runtime.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SessionConfig {
    pub app_id: String,
    pub control_namespace: String,
    /// Connect as soon as a device is selected.
    pub auto_connect: bool,
    /// Display name sent with `login`; the receiver picks one when absent.
    pub player_name: Option<String>,
}

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            app_id: DEFAULT_APP_ID.to_string(),
            control_namespace: DEFAULT_CONTROL_NAMESPACE.to_string(),
            auto_connect: false,
            player_name: None,
        }
    }
}

/// The transport bound to the selected device, tagged with the id its
/// events carry.
struct Session {
    id: SessionId,
    device: Device,
    transport: Box<dyn Transport>,
}

pub struct ConnectionManager {
    config: SessionConfig,
    factory: Box<dyn TransportFactory>,
    identity: Arc<dyn IdentityProvider>,
    session: Option<Session>,
    status: ConnectionStatus,
    status_listeners: ListenerRegistry<ConnectionStatus>,
    channels: ChannelMultiplexer,
    session_ids: SessionCounter,
    events_tx: mpsc::UnboundedSender<SessionEvent>,
}

impl ConnectionManager {
    /// Creates a manager with no device selected and returns it together with
    /// the receiver its transports report into.
    pub fn new(
        config: SessionConfig,
        factory: Box<dyn TransportFactory>,
        identity: Arc<dyn IdentityProvider>,
    ) -> (Self, mpsc::UnboundedReceiver<SessionEvent>) {
        let (events_tx, events_rx) = mpsc::unbounded_channel();
        let status = ConnectionStatus::NotAvailable;
        let mgr = Self {
            config,
            factory,
            identity,
            session: None,
            status,
            status_listeners: ListenerRegistry::with_value(status),
            channels: ChannelMultiplexer::new(),
            session_ids: SessionCounter::new(),
            events_tx,
        };
        (mgr, events_rx)
    }

    // ── Accessors ─────────────────────────────────────────────────────────────

    pub fn status(&self) -> ConnectionStatus {
        self.status
    }

    pub fn selected_device(&self) -> Option<&Device> {
        self.session.as_ref().map(|s| &s.device)
    }

    pub fn is_auto_connect(&self) -> bool {
        self.config.auto_connect
    }

    pub fn set_auto_connect(&mut self, auto_connect: bool) {
        self.config.auto_connect = auto_connect;
    }

    /// Id of the current transport epoch, if a device is selected.
    pub fn session_id(&self) -> Option<SessionId> {
        self.session.as_ref().map(|s| s.id)
    }

    // ── Device selection ──────────────────────────────────────────────────────

    /// Selects `device` (or clears the selection with `None`).
    ///
    /// Selecting the device that is already selected does nothing.  Any
    /// existing session is torn down (with logout) before a new one is
    /// opened, so only one session's events are ever accepted.
    pub fn select_device(&mut self, device: Option<Device>) {
        if self.selected_device() == device.as_ref() {
            return;
        }
        debug!(
            "select_device: {}",
            device.as_ref().map_or("none".to_string(), Device::to_string)
        );

        if self.session.is_some() {
            self.destroy_session();
        }

        if let Some(device) = device {
            self.session = Some(self.open_session(device));
            self.set_status(ConnectionStatus::Disconnected);

            if self.config.auto_connect {
                self.connect();
            }
        }
    }

    fn open_session(&mut self, device: Device) -> Session {
        let id = self.session_ids.next();
        let sink = EventSink::new(id, self.events_tx.clone());
        let transport = self.factory.open(&device, sink);
        info!("{id}: opened transport for {device}");
        Session {
            id,
            device,
            transport,
        }
    }

    /// Replaces a severed transport with a fresh one for the same device.
    /// Events still in flight from the old one no longer match the session id.
    fn renew_transport(&mut self) {
        let Some(old) = self.session.take() else {
            return;
        };
        debug!("{}: retired transport for {}", old.id, old.device);
        self.session = Some(self.open_session(old.device));
    }

    fn destroy_session(&mut self) {
        self.sever(true);
        if let Some(session) = self.session.take() {
            info!("{}: session for {} destroyed", session.id, session.device);
        }
        self.channels.mark_all_unsubscribed();
        self.set_status(ConnectionStatus::NotAvailable);
    }

    // ── Connect / disconnect ──────────────────────────────────────────────────

    /// Starts connecting the current session's transport.
    ///
    /// Does nothing without a session, while a connect is already in flight,
    /// or when the transport is up and the status already says so.  A
    /// transport that is up while the status is not resumes from the
    /// connected step.
    pub fn connect(&mut self) {
        let status = self.status;
        let Some(session) = self.session.as_mut() else {
            debug!("connect: no device selected");
            return;
        };
        if status == ConnectionStatus::Connecting {
            return;
        }
        if session.transport.is_connected() {
            if !status.is_connected() {
                warn!("{}: transport is up but status is {status}; resuming", session.id);
                self.set_status(ConnectionStatus::Connecting);
                self.on_connected();
            }
            return;
        }

        let result = session.transport.connect();
        let id = session.id;
        self.set_status(ConnectionStatus::Connecting);
        if let Err(e) = result {
            warn!("{id}: transport refused to connect: {e}");
            self.set_status(ConnectionStatus::Disconnected);
        }
    }

    /// Severs the transport.  With `logout`, the receiver is told first that
    /// this player is leaving: a `logout` message goes out on the control
    /// namespace and the receiver application is asked to let us go.
    ///
    /// A connect that is still in flight (or a suspended link) is abandoned.
    /// The severed transport is replaced, so any late events it produces are
    /// dropped as stale.
    pub fn disconnect(&mut self, logout: bool) {
        if self.sever(logout) {
            self.renew_transport();
        }
    }

    /// Cuts the current transport.  Returns whether anything was cut.
    fn sever(&mut self, logout: bool) -> bool {
        let status = self.status;
        let Some(session) = self.session.as_mut() else {
            return false;
        };

        if session.transport.is_connected() {
            if logout {
                send_on(
                    session.transport.as_mut(),
                    &self.config.control_namespace,
                    &Message::Logout(LogoutMessage::default()),
                );
                if let Err(e) = session.transport.leave_application() {
                    warn!("{}: leave_application failed: {e}", session.id);
                }
            }
        } else if !matches!(
            status,
            ConnectionStatus::Connecting | ConnectionStatus::Suspended
        ) {
            return false;
        }

        session.transport.disconnect();
        debug!("{}: transport disconnected (logout={logout})", session.id);
        self.channels.mark_all_unsubscribed();
        self.set_status(ConnectionStatus::Disconnected);
        true
    }

    // ── Outbound messages ─────────────────────────────────────────────────────

    /// Encodes `message` and sends it on `namespace`.
    ///
    /// # Errors
    ///
    /// [`SessionError::NoSession`] without a selected device,
    /// [`SessionError::NotConnected`] while the transport is down, or the
    /// codec/transport error that stopped the send.
    pub fn send_message(&mut self, namespace: &str, message: &Message) -> Result<(), SessionError> {
        let session = self.session.as_mut().ok_or(SessionError::NoSession)?;
        if !session.transport.is_connected() {
            return Err(SessionError::NotConnected(self.status));
        }
        let payload = encode_message(message)?;
        session.transport.send(namespace, payload)?;
        Ok(())
    }

    /// [`send_message`](Self::send_message) on the control namespace.
    pub fn send_control(&mut self, message: &Message) -> Result<(), SessionError> {
        let namespace = self.config.control_namespace.clone();
        self.send_message(&namespace, message)
    }

    // ── Listeners ─────────────────────────────────────────────────────────────

    /// Registers a status listener.  It is called right away with the
    /// current status and then once per change.
    pub fn add_status_listener(&mut self, listener: Listener<ConnectionStatus>) -> bool {
        self.status_listeners.add(listener)
    }

    pub fn remove_status_listener(&mut self, listener: &Listener<ConnectionStatus>) -> bool {
        self.status_listeners.remove(listener)
    }

    /// Registers `handler` for messages arriving on `namespace`.
    ///
    /// While casting, the first handler for a namespace subscribes it at the
    /// transport straight away; otherwise the subscription happens when the
    /// session next reaches [`ConnectionStatus::Casting`].
    pub fn add_message_received_callback(&mut self, namespace: &str, handler: MessageHandler) -> bool {
        let live: Option<&mut dyn Transport> = match self.session.as_mut() {
            Some(s) if self.status == ConnectionStatus::Casting => Some(s.transport.as_mut()),
            _ => None,
        };
        self.channels.add_handler(namespace, handler, live)
    }

    pub fn remove_message_received_callback(
        &mut self,
        namespace: &str,
        handler: &MessageHandler,
    ) -> bool {
        let live: Option<&mut dyn Transport> = match self.session.as_mut() {
            Some(s) if self.status == ConnectionStatus::Casting => Some(s.transport.as_mut()),
            _ => None,
        };
        self.channels.remove_handler(namespace, handler, live)
    }

    // ── Transport events ──────────────────────────────────────────────────────

    /// Applies one transport event.  Events from any transport other than the
    /// current one are discarded.
    pub fn handle_event(&mut self, event: SessionEvent) {
        match self.session_id() {
            Some(current) if current == event.session => {}
            current => {
                debug!(
                    "dropping stale event from {} (current: {current:?}): {:?}",
                    event.session, event.event
                );
                return;
            }
        }

        match event.event {
            TransportEvent::Connected => self.on_connected(),
            TransportEvent::ConnectionSuspended { cause } => self.on_suspended(&cause),
            TransportEvent::ConnectionFailed { reason } => self.on_connection_failed(&reason),
            TransportEvent::ApplicationLaunched(Ok(())) => self.on_application_launched(),
            TransportEvent::ApplicationLaunched(Err(reason)) => self.on_launch_failed(&reason),
            TransportEvent::ApplicationDisconnected { error_code } => {
                self.on_application_disconnected(error_code)
            }
            TransportEvent::ApplicationStatusChanged { status } => {
                debug!("{}: receiver status: {status}", event.session);
            }
            TransportEvent::MessageReceived { namespace, payload } => {
                let delivered = self.channels.dispatch(&namespace, &payload);
                debug!("{}: {namespace} payload delivered to {delivered} handler(s)", event.session);
            }
        }
    }

    /// Accepted from `Connecting` and `Suspended`.
    fn on_connected(&mut self) {
        if !matches!(
            self.status,
            ConnectionStatus::Connecting | ConnectionStatus::Suspended
        ) {
            debug!("ignoring connected event in {}", self.status);
            return;
        }
        self.set_status(ConnectionStatus::Connected);

        let Some(session) = self.session.as_mut() else {
            return;
        };
        info!("{}: connected to {}", session.id, session.device);
        if let Err(e) = session.transport.launch_application(&self.config.app_id) {
            self.on_launch_failed(&e.to_string());
        }
    }

    /// Accepted only in `Connected`.
    fn on_application_launched(&mut self) {
        if self.status != ConnectionStatus::Connected {
            debug!("ignoring launch result in {}", self.status);
            return;
        }
        let Some(session) = self.session.as_mut() else {
            return;
        };

        let resubscribed = self.channels.resubscribe_all(session.transport.as_mut());
        debug!("{}: resubscribed {resubscribed} namespace(s)", session.id);

        let mut login = LoginMessage::new(self.identity.install_id());
        if let Some(name) = &self.config.player_name {
            login = login.with_name(name.clone());
        }
        send_on(
            session.transport.as_mut(),
            &self.config.control_namespace,
            &Message::Login(login),
        );

        info!("{}: casting to {}", session.id, session.device);
        self.set_status(ConnectionStatus::Casting);
    }

    fn on_launch_failed(&mut self, reason: &str) {
        if self.status != ConnectionStatus::Connected {
            debug!("ignoring launch failure in {}", self.status);
            return;
        }
        warn!("receiver application failed to launch: {reason}");
        if let Some(session) = self.session.as_mut() {
            session.transport.disconnect();
        }
        self.channels.mark_all_unsubscribed();
        self.set_status(ConnectionStatus::Disconnected);
        self.renew_transport();
    }

    /// Accepted from `Connected` and `Casting`.
    fn on_suspended(&mut self, cause: &str) {
        if !self.status.is_connected() {
            debug!("ignoring suspension in {}", self.status);
            return;
        }
        warn!("connection suspended: {cause}");
        self.channels.mark_all_unsubscribed();
        self.set_status(ConnectionStatus::Suspended);
    }

    fn on_connection_failed(&mut self, reason: &str) {
        warn!("connection failed: {reason}");
        self.channels.mark_all_unsubscribed();
        self.set_status(ConnectionStatus::Disconnected);
    }

    /// The receiver ended the application on its own.  The device is
    /// deselected; the session is gone afterwards, so the status settles on
    /// `Disconnected` unless a transport is somehow still up.
    fn on_application_disconnected(&mut self, error_code: i32) {
        warn!("receiver application disconnected (code {error_code})");
        self.select_device(None);
        let still_connected = self
            .session
            .as_ref()
            .is_some_and(|s| s.transport.is_connected());
        self.set_status(if still_connected {
            ConnectionStatus::Connected
        } else {
            ConnectionStatus::Disconnected
        });
    }

    /// The only place `status` changes.  Listeners hear about real changes
    /// only.
    fn set_status(&mut self, status: ConnectionStatus) {
        if self.status == status {
            return;
        }
        debug!("status {} -> {status}", self.status);
        self.status = status;
        self.status_listeners.notify(status);
    }
}

/// Best-effort send used for the login/logout bookkeeping messages.
fn send_on(transport: &mut dyn Transport, namespace: &str, message: &Message) {
    let result = encode_message(message)
        .map_err(SessionError::from)
        .and_then(|payload| transport.send(namespace, payload).map_err(SessionError::from));
    if let Err(e) = result {
        warn!("failed to send {} on {namespace}: {e}", message.type_name());
    }
}

// ── Tests ─────────────────────────────────────────────────────────────────────
