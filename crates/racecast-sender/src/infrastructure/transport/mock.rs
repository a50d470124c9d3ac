//! Recording transport for tests.
//!
//! [`MockTransportFactory`] hands out [`MockTransport`]s and keeps a
//! [`MockTransportHandle`] to each one, so a test can inspect what the
//! manager asked the transport to do and play the device's side of the
//! conversation (connect results, launch results, inbound payloads).
//!
//! Nothing happens on its own: a `connect()` stays pending until the test
//! calls [`MockTransportHandle::complete_connect`] or
//! [`MockTransportHandle::fail_connect`], and the resulting events sit in the
//! manager's channel until [`pump`] feeds them in.

use std::collections::HashMap;
use std::sync::{Arc, Mutex, MutexGuard};

use racecast_core::{decode_message, Device, Message, SessionId};
use tokio::sync::mpsc::UnboundedReceiver;

use crate::application::connection_manager::ConnectionManager;
use crate::application::transport::{
    EventSink, SessionEvent, Transport, TransportError, TransportEvent, TransportFactory,
};

/// Everything a [`MockTransport`] was asked to do.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct TransportLog {
    pub connects: usize,
    pub disconnects: usize,
    pub subscribes: Vec<String>,
    pub unsubscribes: Vec<String>,
    /// `(namespace, payload)` in send order.
    pub sent: Vec<(String, String)>,
    pub launches: Vec<String>,
    pub leaves: usize,
}

struct Shared {
    device: Device,
    sink: EventSink,
    log: TransportLog,
    connected: bool,
    /// Live subscription count per namespace.
    active: HashMap<String, usize>,
    reject_connect: bool,
    reject_subscribe: bool,
    reject_launch: bool,
}

impl Shared {
    fn reject(operation: &'static str) -> TransportError {
        TransportError::Rejected {
            operation,
            reason: "rejected by mock".to_string(),
        }
    }
}

fn lock(shared: &Mutex<Shared>) -> MutexGuard<'_, Shared> {
    shared.lock().expect("lock poisoned")
}

/// A [`Transport`] that records calls instead of talking to a device.
pub struct MockTransport {
    shared: Arc<Mutex<Shared>>,
}

impl Transport for MockTransport {
    fn connect(&mut self) -> Result<(), TransportError> {
        let mut s = lock(&self.shared);
        s.log.connects += 1;
        if s.reject_connect {
            return Err(Shared::reject("connect"));
        }
        Ok(())
    }

    fn disconnect(&mut self) {
        let mut s = lock(&self.shared);
        s.log.disconnects += 1;
        s.connected = false;
        s.active.clear();
    }

    fn is_connected(&self) -> bool {
        lock(&self.shared).connected
    }

    fn send(&mut self, namespace: &str, payload: String) -> Result<(), TransportError> {
        let mut s = lock(&self.shared);
        if !s.connected {
            return Err(TransportError::NotConnected);
        }
        s.log.sent.push((namespace.to_string(), payload));
        Ok(())
    }

    fn subscribe(&mut self, namespace: &str) -> Result<(), TransportError> {
        let mut s = lock(&self.shared);
        if s.reject_subscribe {
            return Err(Shared::reject("subscribe"));
        }
        s.log.subscribes.push(namespace.to_string());
        *s.active.entry(namespace.to_string()).or_default() += 1;
        Ok(())
    }

    fn unsubscribe(&mut self, namespace: &str) -> Result<(), TransportError> {
        let mut s = lock(&self.shared);
        s.log.unsubscribes.push(namespace.to_string());
        if let Some(count) = s.active.get_mut(namespace) {
            *count = count.saturating_sub(1);
        }
        Ok(())
    }

    fn launch_application(&mut self, app_id: &str) -> Result<(), TransportError> {
        let mut s = lock(&self.shared);
        s.log.launches.push(app_id.to_string());
        if s.reject_launch {
            return Err(Shared::reject("launch"));
        }
        Ok(())
    }

    fn leave_application(&mut self) -> Result<(), TransportError> {
        lock(&self.shared).log.leaves += 1;
        Ok(())
    }
}

/// Test-side view of one [`MockTransport`].
#[derive(Clone)]
pub struct MockTransportHandle {
    shared: Arc<Mutex<Shared>>,
}

impl MockTransportHandle {
    pub fn session(&self) -> SessionId {
        lock(&self.shared).sink.session()
    }

    pub fn device(&self) -> Device {
        lock(&self.shared).device.clone()
    }

    pub fn log(&self) -> TransportLog {
        lock(&self.shared).log.clone()
    }

    pub fn is_connected(&self) -> bool {
        lock(&self.shared).connected
    }

    /// Number of subscriptions the transport currently holds for `namespace`.
    pub fn active_subscriptions(&self, namespace: &str) -> usize {
        lock(&self.shared)
            .active
            .get(namespace)
            .copied()
            .unwrap_or(0)
    }

    /// Decodes every sent payload.
    pub fn sent_messages(&self) -> Vec<(String, Message)> {
        lock(&self.shared)
            .log
            .sent
            .iter()
            .map(|(ns, payload)| {
                let msg = decode_message(payload).expect("manager sent an undecodable payload");
                (ns.clone(), msg)
            })
            .collect()
    }

    pub fn set_reject_connect(&self, reject: bool) {
        lock(&self.shared).reject_connect = reject;
    }

    pub fn set_reject_subscribe(&self, reject: bool) {
        lock(&self.shared).reject_subscribe = reject;
    }

    pub fn set_reject_launch(&self, reject: bool) {
        lock(&self.shared).reject_launch = reject;
    }

    // ── Device side ───────────────────────────────────────────────────────────

    pub fn complete_connect(&self) {
        let mut s = lock(&self.shared);
        s.connected = true;
        s.sink.emit(TransportEvent::Connected);
    }

    pub fn fail_connect(&self, reason: &str) {
        let mut s = lock(&self.shared);
        s.connected = false;
        s.active.clear();
        s.sink.emit(TransportEvent::ConnectionFailed {
            reason: reason.to_string(),
        });
    }

    pub fn suspend(&self, cause: &str) {
        let mut s = lock(&self.shared);
        s.connected = false;
        s.active.clear();
        s.sink.emit(TransportEvent::ConnectionSuspended {
            cause: cause.to_string(),
        });
    }

    pub fn complete_launch(&self) {
        lock(&self.shared)
            .sink
            .emit(TransportEvent::ApplicationLaunched(Ok(())));
    }

    pub fn fail_launch(&self, reason: &str) {
        lock(&self.shared)
            .sink
            .emit(TransportEvent::ApplicationLaunched(Err(reason.to_string())));
    }

    pub fn application_disconnected(&self, error_code: i32) {
        lock(&self.shared)
            .sink
            .emit(TransportEvent::ApplicationDisconnected { error_code });
    }

    pub fn status_changed(&self, status: &str) {
        lock(&self.shared)
            .sink
            .emit(TransportEvent::ApplicationStatusChanged {
                status: status.to_string(),
            });
    }

    /// Delivers `payload` on `namespace` as if the receiver had sent it.
    pub fn receive(&self, namespace: &str, payload: &str) {
        lock(&self.shared).sink.emit(TransportEvent::MessageReceived {
            namespace: namespace.to_string(),
            payload: payload.to_string(),
        });
    }
}

/// A [`TransportFactory`] that opens [`MockTransport`]s.  Clones share the
/// list of opened transports.
#[derive(Clone, Default)]
pub struct MockTransportFactory {
    opened: Arc<Mutex<Vec<MockTransportHandle>>>,
}

impl MockTransportFactory {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn opened_count(&self) -> usize {
        self.opened.lock().expect("lock poisoned").len()
    }

    /// Handle to the most recently opened transport.
    pub fn latest(&self) -> Option<MockTransportHandle> {
        self.opened.lock().expect("lock poisoned").last().cloned()
    }
}

impl TransportFactory for MockTransportFactory {
    fn open(&mut self, device: &Device, sink: EventSink) -> Box<dyn Transport> {
        let shared = Arc::new(Mutex::new(Shared {
            device: device.clone(),
            sink,
            log: TransportLog::default(),
            connected: false,
            active: HashMap::new(),
            reject_connect: false,
            reject_subscribe: false,
            reject_launch: false,
        }));
        self.opened
            .lock()
            .expect("lock poisoned")
            .push(MockTransportHandle {
                shared: Arc::clone(&shared),
            });
        Box::new(MockTransport { shared })
    }
}

/// Feeds every queued event into `manager`.  Returns how many were handled.
pub fn pump(manager: &mut ConnectionManager, rx: &mut UnboundedReceiver<SessionEvent>) -> usize {
    let mut handled = 0;
    while let Ok(event) = rx.try_recv() {
        manager.handle_event(event);
        handled += 1;
    }
    handled
}
