//! Integration tests for the connection manager and channel multiplexing.
//!
//! These tests drive `ConnectionManager` through its public API with the
//! recording mock transport standing in for the device.  They cover:
//!
//! - The full lifecycle: each status is observed exactly once, in order.
//! - Subscription bookkeeping: the transport never holds more than one
//!   subscription per namespace, and every queued namespace is subscribed
//!   once the session is casting.
//! - Device selection: re-selecting the same device is a no-op, replacing a
//!   device tears the old session down with a logout first.
//! - Message routing: inbound payloads reach only the handlers of their
//!   namespace.
//!
//! ```text
//! test                               MockTransportHandle
//! ────                               ───────────────────
//! select_device(d); connect()
//!                                    complete_connect()
//! pump()   → Connected, launch
//!                                    complete_launch()
//! pump()   → resubscribe, login, Casting
//! ```

use std::sync::{Arc, Mutex};

use racecast_core::protocol::messages::{
    GamePhase, GameStateMessage, Location, LogoutMessage, Message, RequestMessage,
};
use racecast_core::{encode_message, ConnectionStatus, Device};
use racecast_sender::application::channel_mux::MessageHandler;
use racecast_sender::application::connection_manager::{
    ConnectionManager, SessionConfig, DEFAULT_CONTROL_NAMESPACE,
};
use racecast_sender::application::listener_registry::Listener;
use racecast_sender::application::transport::{IdentityProvider, SessionEvent};
use racecast_sender::infrastructure::transport::mock::{pump, MockTransportFactory, MockTransportHandle};
use tokio::sync::mpsc::UnboundedReceiver;

const GAME_NS: &str = "urn:x-cast:racecast.game";
const SCORES_NS: &str = "urn:x-cast:racecast.scores";

struct StaticIdentity(&'static str);

impl IdentityProvider for StaticIdentity {
    fn install_id(&self) -> String {
        self.0.to_string()
    }
}

struct Harness {
    manager: ConnectionManager,
    events: UnboundedReceiver<SessionEvent>,
    factory: MockTransportFactory,
}

impl Harness {
    fn new() -> Self {
        let factory = MockTransportFactory::new();
        let (manager, events) = ConnectionManager::new(
            SessionConfig::default(),
            Box::new(factory.clone()),
            Arc::new(StaticIdentity("install-abc")),
        );
        Self {
            manager,
            events,
            factory,
        }
    }

    fn pump(&mut self) {
        pump(&mut self.manager, &mut self.events);
    }

    fn transport(&self) -> MockTransportHandle {
        self.factory.latest().expect("a transport must have been opened")
    }

    /// select → connect → connected → launched.
    fn cast_to(&mut self, device: Device) {
        self.manager.select_device(Some(device));
        self.manager.connect();
        self.transport().complete_connect();
        self.pump();
        self.transport().complete_launch();
        self.pump();
    }
}

fn tv() -> Device {
    Device::new("tv-1", "Living Room")
}

fn recorder() -> (Arc<Mutex<Vec<String>>>, impl Fn(&'static str) -> MessageHandler) {
    let log = Arc::new(Mutex::new(Vec::new()));
    let make_log = Arc::clone(&log);
    let make = move |tag: &'static str| -> MessageHandler {
        let log = Arc::clone(&make_log);
        Arc::new(move |m: &Message| log.lock().unwrap().push(format!("{tag}:{}", m.type_name())))
    };
    (log, make)
}

// ── Lifecycle ─────────────────────────────────────────────────────────────────

#[test]
fn test_lifecycle_statuses_are_observed_once_in_order() {
    // Arrange
    let mut h = Harness::new();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let listener: Listener<ConnectionStatus> =
        Arc::new(move |s: &ConnectionStatus| sink.lock().unwrap().push(*s));
    h.manager.add_status_listener(listener);

    // Act
    h.cast_to(tv());

    // Assert
    assert_eq!(
        *seen.lock().unwrap(),
        vec![
            ConnectionStatus::NotAvailable,
            ConnectionStatus::Disconnected,
            ConnectionStatus::Connecting,
            ConnectionStatus::Connected,
            ConnectionStatus::Casting,
        ]
    );
}

#[test]
fn test_same_listener_registered_twice_hears_each_change_once() {
    let mut h = Harness::new();
    let count = Arc::new(Mutex::new(0));
    let sink = Arc::clone(&count);
    let listener: Listener<ConnectionStatus> = Arc::new(move |_: &ConnectionStatus| {
        *sink.lock().unwrap() += 1;
    });

    h.manager.add_status_listener(Arc::clone(&listener));
    h.manager.add_status_listener(Arc::clone(&listener));
    h.manager.select_device(Some(tv()));

    // Once for the current value on registration, once for Disconnected.
    assert_eq!(*count.lock().unwrap(), 2);
}

#[test]
fn test_removed_listener_hears_nothing_further() {
    let mut h = Harness::new();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    let listener: Listener<ConnectionStatus> =
        Arc::new(move |s: &ConnectionStatus| sink.lock().unwrap().push(*s));
    h.manager.add_status_listener(Arc::clone(&listener));

    assert!(h.manager.remove_status_listener(&listener));
    h.manager.select_device(Some(tv()));

    assert_eq!(*seen.lock().unwrap(), vec![ConnectionStatus::NotAvailable]);
}

#[test]
fn test_casting_sends_login_with_install_id_on_control_namespace() {
    let mut h = Harness::new();

    h.cast_to(tv());

    let sent = h.transport().sent_messages();
    assert_eq!(sent.len(), 1);
    assert_eq!(sent[0].0, DEFAULT_CONTROL_NAMESPACE);
    assert!(matches!(&sent[0].1, Message::Login(login) if login.id == "install-abc"));
    assert_eq!(h.transport().log().launches, vec!["807AB2E8".to_string()]);
}

#[test]
fn test_disconnect_with_logout_sends_exactly_one_logout_first() {
    // Arrange
    let mut h = Harness::new();
    h.cast_to(tv());
    let transport = h.transport();

    // Act
    h.manager.disconnect(true);

    // Assert
    assert_eq!(h.manager.status(), ConnectionStatus::Disconnected);
    let logouts = transport
        .sent_messages()
        .into_iter()
        .filter(|(_, m)| *m == Message::Logout(LogoutMessage::default()))
        .count();
    assert_eq!(logouts, 1);
    let log = transport.log();
    assert_eq!(log.leaves, 1);
    assert_eq!(log.disconnects, 1);
}

#[test]
fn test_disconnect_without_logout_sends_nothing() {
    let mut h = Harness::new();
    h.cast_to(tv());
    let transport = h.transport();

    h.manager.disconnect(false);

    assert_eq!(transport.sent_messages().len(), 1, "only the login");
    assert_eq!(transport.log().leaves, 0);
}

#[test]
fn test_disconnect_keeps_device_with_fresh_idle_transport() {
    let mut h = Harness::new();
    h.cast_to(tv());
    let before = h.manager.session_id();

    h.manager.disconnect(true);

    assert_eq!(h.manager.selected_device(), Some(&tv()));
    assert_eq!(h.factory.opened_count(), 2);
    assert_ne!(h.manager.session_id(), before);
    assert_eq!(h.transport().log().connects, 0);
}

#[test]
fn test_late_failure_from_abandoned_connect_does_not_break_reconnect() {
    // Arrange: first attempt abandoned, second attempt in flight
    let mut h = Harness::new();
    h.manager.select_device(Some(tv()));
    h.manager.connect();
    let first = h.transport();
    h.manager.disconnect(false);
    h.manager.connect();
    let second = h.transport();

    // Act
    first.fail_connect("timed out");
    h.pump();
    let after_late_failure = h.manager.status();
    second.complete_connect();
    h.pump();

    // Assert
    assert_eq!(after_late_failure, ConnectionStatus::Connecting);
    assert_eq!(h.manager.status(), ConnectionStatus::Connected);
    assert_eq!(second.log().launches.len(), 1);
    second.complete_launch();
    h.pump();
    assert_eq!(h.manager.status(), ConnectionStatus::Casting);
}

#[test]
fn test_late_success_from_abandoned_connect_is_ignored_after_reconnect() {
    let mut h = Harness::new();
    h.manager.select_device(Some(tv()));
    h.manager.connect();
    let first = h.transport();
    h.manager.disconnect(false);
    h.manager.connect();
    let second = h.transport();

    first.complete_connect();
    first.complete_launch();
    h.pump();

    assert_eq!(h.manager.status(), ConnectionStatus::Connecting);
    assert!(first.log().launches.is_empty());
    assert!(second.log().launches.is_empty());
}

#[test]
fn test_receiver_status_change_leaves_session_state_alone() {
    let mut h = Harness::new();
    h.cast_to(tv());

    h.transport().status_changed("Ready to race");
    h.pump();

    assert_eq!(h.manager.status(), ConnectionStatus::Casting);
    assert_eq!(h.transport().sent_messages().len(), 1);
}

#[test]
fn test_disconnect_without_session_is_noop() {
    let mut h = Harness::new();
    h.manager.disconnect(true);
    assert_eq!(h.manager.status(), ConnectionStatus::NotAvailable);
}

// ── Device selection ──────────────────────────────────────────────────────────

#[test]
fn test_reselecting_same_device_keeps_session() {
    // Arrange
    let mut h = Harness::new();
    h.cast_to(tv());

    // Act: same id, different display name
    h.manager
        .select_device(Some(Device::new("tv-1", "Living Room TV")));

    // Assert
    assert_eq!(h.factory.opened_count(), 1);
    assert_eq!(h.manager.status(), ConnectionStatus::Casting);
    assert_eq!(h.transport().log().disconnects, 0);
}

#[test]
fn test_replacing_device_tears_down_old_session_first() {
    // Arrange
    let mut h = Harness::new();
    h.cast_to(tv());
    let old = h.transport();
    let seen = Arc::new(Mutex::new(Vec::new()));
    let sink = Arc::clone(&seen);
    h.manager
        .add_status_listener(Arc::new(move |s: &ConnectionStatus| sink.lock().unwrap().push(*s)));

    // Act
    h.manager.select_device(Some(Device::new("tv-2", "Bedroom")));

    // Assert
    assert_eq!(h.factory.opened_count(), 2);
    assert!(!old.is_connected());
    assert!(old
        .sent_messages()
        .iter()
        .any(|(_, m)| matches!(m, Message::Logout(_))));
    assert_eq!(
        *seen.lock().unwrap(),
        vec![
            ConnectionStatus::Casting,
            ConnectionStatus::Disconnected,
            ConnectionStatus::NotAvailable,
            ConnectionStatus::Disconnected,
        ]
    );
    assert_eq!(h.manager.selected_device().unwrap().name, "Bedroom");
}

#[test]
fn test_deselecting_device_returns_to_not_available() {
    let mut h = Harness::new();
    h.manager.select_device(Some(tv()));

    h.manager.select_device(None);

    assert_eq!(h.manager.status(), ConnectionStatus::NotAvailable);
    assert!(h.manager.selected_device().is_none());
}

#[test]
fn test_events_from_replaced_session_are_ignored() {
    // Arrange
    let mut h = Harness::new();
    h.manager.select_device(Some(tv()));
    h.manager.connect();
    let old = h.transport();
    h.manager.select_device(Some(Device::new("tv-2", "Bedroom")));

    // Act
    old.complete_connect();
    old.complete_launch();
    old.receive(GAME_NS, r#"{"type":"logout"}"#);
    h.pump();

    // Assert
    assert_eq!(h.manager.status(), ConnectionStatus::Disconnected);
    assert_ne!(h.manager.session_id(), Some(old.session()));
}

// ── Subscriptions ─────────────────────────────────────────────────────────────

#[test]
fn test_handlers_added_before_casting_are_subscribed_on_casting() {
    // Arrange
    let mut h = Harness::new();
    let (_log, make) = recorder();
    h.manager.add_message_received_callback(GAME_NS, make("a"));
    h.manager.add_message_received_callback(GAME_NS, make("b"));
    h.manager.add_message_received_callback(SCORES_NS, make("c"));

    // Act
    h.cast_to(tv());

    // Assert
    let mut subscribes = h.transport().log().subscribes;
    subscribes.sort();
    assert_eq!(subscribes, vec![GAME_NS.to_string(), SCORES_NS.to_string()]);
}

#[test]
fn test_handler_added_while_casting_subscribes_immediately_once() {
    let mut h = Harness::new();
    h.cast_to(tv());
    let (_log, make) = recorder();

    h.manager.add_message_received_callback(GAME_NS, make("a"));
    h.manager.add_message_received_callback(GAME_NS, make("b"));

    assert_eq!(h.transport().log().subscribes, vec![GAME_NS.to_string()]);
}

#[test]
fn test_subscription_count_never_exceeds_one_per_namespace() {
    // Arrange
    let mut h = Harness::new();
    let (_log, make) = recorder();
    let handlers: Vec<MessageHandler> = (0..4).map(|_| make("h")).collect();
    h.manager.add_message_received_callback(GAME_NS, Arc::clone(&handlers[0]));
    h.cast_to(tv());
    let transport = h.transport();

    // Act / Assert: interleave adds, removes and a reconnect
    let check = || {
        let active = transport.active_subscriptions(GAME_NS);
        assert!(active <= 1, "namespace subscribed {active} times");
    };
    for handler in &handlers[1..] {
        h.manager.add_message_received_callback(GAME_NS, Arc::clone(handler));
        check();
    }
    for handler in &handlers[..2] {
        h.manager.remove_message_received_callback(GAME_NS, handler);
        check();
    }
    transport.suspend("wifi");
    h.pump();
    transport.complete_connect();
    h.pump();
    transport.complete_launch();
    h.pump();
    check();
    for handler in &handlers[2..] {
        h.manager.remove_message_received_callback(GAME_NS, handler);
        check();
    }
    h.manager.add_message_received_callback(GAME_NS, Arc::clone(&handlers[0]));
    check();

    assert_eq!(transport.active_subscriptions(GAME_NS), 1);
}

#[test]
fn test_rejected_subscription_is_retried_on_next_casting() {
    // Arrange
    let mut h = Harness::new();
    let (log, make) = recorder();
    h.manager.add_message_received_callback(GAME_NS, make("game"));
    h.manager.select_device(Some(tv()));
    let transport = h.transport();
    transport.set_reject_subscribe(true);

    // Act: casting with the subscription refused
    h.manager.connect();
    transport.complete_connect();
    h.pump();
    transport.complete_launch();
    h.pump();
    let casting_without_subscription = (h.manager.status(), transport.active_subscriptions(GAME_NS));

    // Act: the link drops and comes back, this time subscriptions are accepted
    transport.set_reject_subscribe(false);
    transport.suspend("wifi");
    h.pump();
    transport.complete_connect();
    h.pump();
    transport.complete_launch();
    h.pump();
    transport.receive(GAME_NS, r#"{"type":"player_state","state":"waiting"}"#);
    h.pump();

    // Assert
    assert_eq!(casting_without_subscription, (ConnectionStatus::Casting, 0));
    assert_eq!(h.manager.status(), ConnectionStatus::Casting);
    assert_eq!(transport.active_subscriptions(GAME_NS), 1);
    assert_eq!(*log.lock().unwrap(), vec!["game:player_state"]);
}

#[test]
fn test_removing_last_handler_unsubscribes_while_casting() {
    let mut h = Harness::new();
    let (_log, make) = recorder();
    let handler = make("a");
    h.manager.add_message_received_callback(GAME_NS, Arc::clone(&handler));
    h.cast_to(tv());

    h.manager.remove_message_received_callback(GAME_NS, &handler);

    assert_eq!(h.transport().log().unsubscribes, vec![GAME_NS.to_string()]);
    assert_eq!(h.transport().active_subscriptions(GAME_NS), 0);
}

#[test]
fn test_remove_from_unknown_namespace_is_noop() {
    let mut h = Harness::new();
    h.cast_to(tv());
    let (_log, make) = recorder();

    assert!(!h.manager.remove_message_received_callback("urn:x-cast:nobody", &make("a")));
    assert!(h.transport().log().unsubscribes.is_empty());
}

// ── Message routing ───────────────────────────────────────────────────────────

#[test]
fn test_game_state_reply_reaches_only_game_namespace_handlers() {
    // Arrange
    let mut h = Harness::new();
    let (log, make) = recorder();
    h.manager.add_message_received_callback(GAME_NS, make("game"));
    h.manager.add_message_received_callback(SCORES_NS, make("scores"));
    h.cast_to(tv());
    let request = RequestMessage::builder()
        .target("Android", Location::new(37.420283, -122.083961))
        .start(Location::new(37.413084, -122.069217))
        .build()
        .unwrap();
    h.manager
        .send_control(&Message::Request(request))
        .expect("request must be sent while casting");

    // Act
    let reply = encode_message(&Message::GameState(GameStateMessage {
        players: 2,
        state: GamePhase::Load,
        race: None,
    }))
    .unwrap();
    h.transport().receive(GAME_NS, &reply);
    h.pump();

    // Assert
    assert_eq!(*log.lock().unwrap(), vec!["game:game_state"]);
}

#[test]
fn test_duplicate_handler_receives_each_message_once() {
    let mut h = Harness::new();
    let (log, make) = recorder();
    let handler = make("a");
    h.manager.add_message_received_callback(GAME_NS, Arc::clone(&handler));
    h.manager.add_message_received_callback(GAME_NS, Arc::clone(&handler));
    h.cast_to(tv());

    h.transport().receive(GAME_NS, r#"{"type":"player_state","state":"waiting"}"#);
    h.pump();

    assert_eq!(*log.lock().unwrap(), vec!["a:player_state"]);
}

#[test]
fn test_unknown_message_type_is_delivered_as_inert_message() {
    let mut h = Harness::new();
    let (log, make) = recorder();
    h.manager.add_message_received_callback(GAME_NS, make("a"));
    h.cast_to(tv());

    h.transport().receive(GAME_NS, r#"{"type":"countdown","seconds":3}"#);
    h.transport().receive(GAME_NS, "{broken");
    h.pump();

    assert_eq!(*log.lock().unwrap(), vec!["a:countdown"]);
}
