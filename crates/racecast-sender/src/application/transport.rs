//! Capability traits the session controller drives, and the events that flow
//! back from them.
//!
//! A [`Transport`] is one physical link to one receiver device.  Every call on
//! it is fire-and-forget: outcomes that take time (the link coming up, the
//! receiver application starting, a payload arriving) are pushed through the
//! [`EventSink`] the transport was opened with.  The sink stamps each event
//! with the [`SessionId`] of the session that owns the transport, so events
//! from a torn-down session can be recognised as stale.
//!
//! ```text
//!  ConnectionManager ──connect/send/subscribe──► Transport
//!         ▲                                         │
//!         └──── handle_event ◄── mpsc ◄── EventSink ┘
//! ```

use racecast_core::{Device, SessionId};
use thiserror::Error;
use tokio::sync::mpsc;
use tracing::debug;

/// Synchronous rejection of a transport request.
#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum TransportError {
    #[error("transport is not connected")]
    NotConnected,

    #[error("{operation} rejected: {reason}")]
    Rejected {
        operation: &'static str,
        reason: String,
    },
}

/// Everything a transport can report asynchronously.
#[derive(Debug, Clone, PartialEq)]
pub enum TransportEvent {
    /// The link to the device is up (first time or after a suspension).
    Connected,
    /// The link dropped but the transport will try to restore it.
    ConnectionSuspended { cause: String },
    /// The link could not be established or was lost for good.
    ConnectionFailed { reason: String },
    /// Result of [`Transport::launch_application`].
    ApplicationLaunched(Result<(), String>),
    /// The receiver application went away while the link stayed up.
    ApplicationDisconnected { error_code: i32 },
    /// Free-form status text published by the receiver application.
    ApplicationStatusChanged { status: String },
    /// A payload arrived on a subscribed namespace.
    MessageReceived { namespace: String, payload: String },
}

/// A [`TransportEvent`] tagged with the session that produced it.
#[derive(Debug, Clone, PartialEq)]
pub struct SessionEvent {
    pub session: SessionId,
    pub event: TransportEvent,
}

/// Handle a transport uses to report events for its session.
#[derive(Debug, Clone)]
pub struct EventSink {
    session: SessionId,
    tx: mpsc::UnboundedSender<SessionEvent>,
}

impl EventSink {
    pub fn new(session: SessionId, tx: mpsc::UnboundedSender<SessionEvent>) -> Self {
        Self { session, tx }
    }

    pub fn session(&self) -> SessionId {
        self.session
    }

    /// Queues `event` for the session owner.  Events emitted after the owner
    /// has gone away are dropped.
    pub fn emit(&self, event: TransportEvent) {
        let tagged = SessionEvent {
            session: self.session,
            event,
        };
        if self.tx.send(tagged).is_err() {
            debug!("{}: event receiver closed, dropping event", self.session);
        }
    }
}

/// One physical link to a receiver device.
pub trait Transport: Send {
    /// Starts connecting.  The outcome arrives as [`TransportEvent::Connected`]
    /// or [`TransportEvent::ConnectionFailed`].
    fn connect(&mut self) -> Result<(), TransportError>;

    /// Severs the link immediately.  No event is emitted.
    fn disconnect(&mut self);

    fn is_connected(&self) -> bool;

    /// Sends one payload on `namespace`.
    fn send(&mut self, namespace: &str, payload: String) -> Result<(), TransportError>;

    /// Starts delivering payloads for `namespace` as
    /// [`TransportEvent::MessageReceived`].
    fn subscribe(&mut self, namespace: &str) -> Result<(), TransportError>;

    fn unsubscribe(&mut self, namespace: &str) -> Result<(), TransportError>;

    /// Asks the device to start the receiver application `app_id`.  The
    /// outcome arrives as [`TransportEvent::ApplicationLaunched`].
    fn launch_application(&mut self, app_id: &str) -> Result<(), TransportError>;

    /// Tells the receiver application this sender is leaving.
    fn leave_application(&mut self) -> Result<(), TransportError>;
}

/// Opens transports for selected devices.
pub trait TransportFactory: Send {
    fn open(&mut self, device: &Device, sink: EventSink) -> Box<dyn Transport>;
}

/// Source of the per-installation identity token sent in `login`.
#[cfg_attr(test, mockall::automock)]
pub trait IdentityProvider: Send + Sync {
    /// Returns the install id, creating and persisting it on first use.
    fn install_id(&self) -> String;
}
