//! In-process stand-in for a receiver device running the race application.
//!
//! Used by the headless binary so the whole session lifecycle can be
//! exercised without a device on the network.  Every request completes
//! immediately: `connect()` reports `Connected`, a launch reports success,
//! and control messages are answered the way the real receiver answers them:
//!
//! | inbound    | reply                                                      |
//! |------------|------------------------------------------------------------|
//! | `login`    | `game_state` (current phase, player count)                  |
//! | `logout`   | `game_state` with one player fewer                          |
//! | `request`  | `game_state` load, `game_state` race, `player_state` active |
//! | `position` | within 50 m of the target: `player_state` finished,         |
//! |            | `game_state` scores, `game_scores`, `game_state` init       |
//!
//! Replies are only delivered while the namespace is subscribed.

use std::collections::HashSet;
use std::time::{SystemTime, UNIX_EPOCH};

use racecast_core::protocol::messages::{
    GamePhase, GameScoresMessage, GameStateMessage, Location, PlayerPhase, PlayerStateMessage, Race,
    ScoreEntry,
};
use racecast_core::{decode_message, encode_message, Device, Message};
use tracing::{debug, info, warn};

use crate::application::transport::{
    EventSink, Transport, TransportError, TransportEvent, TransportFactory,
};

/// A player closer than this to the target has finished.
pub const WIN_DISTANCE_METERS: f64 = 50.0;

const EARTH_RADIUS_METERS: f64 = 6_371_000.0;

/// Great-circle distance between two points.
pub fn distance_meters(a: Location, b: Location) -> f64 {
    let (lat1, lat2) = (a.lat.to_radians(), b.lat.to_radians());
    let d_lat = lat2 - lat1;
    let d_lng = (b.lng - a.lng).to_radians();
    let h = (d_lat / 2.0).sin().powi(2) + lat1.cos() * lat2.cos() * (d_lng / 2.0).sin().powi(2);
    2.0 * EARTH_RADIUS_METERS * h.sqrt().asin()
}

fn now_millis() -> i64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .map(|d| d.as_millis() as i64)
        .unwrap_or_default()
}

#[derive(Debug, Default)]
struct Game {
    phase: GamePhase,
    players: u32,
    player_id: Option<String>,
    player_name: Option<String>,
    race: Option<Race>,
}

impl Game {
    fn state(&self) -> Message {
        Message::GameState(GameStateMessage {
            players: self.players,
            state: self.phase,
            race: self.race.clone(),
        })
    }
}

/// A [`Transport`] whose far end is a simulated receiver.
pub struct SimulatedTransport {
    device: Device,
    sink: EventSink,
    namespace: String,
    connected: bool,
    launched: bool,
    subscribed: HashSet<String>,
    game: Game,
}

impl SimulatedTransport {
    pub fn new(device: Device, sink: EventSink, namespace: impl Into<String>) -> Self {
        Self {
            device,
            sink,
            namespace: namespace.into(),
            connected: false,
            launched: false,
            subscribed: HashSet::new(),
            game: Game::default(),
        }
    }

    fn reply(&self, message: &Message) {
        if !self.subscribed.contains(&self.namespace) {
            debug!("{}: {} reply dropped, namespace not subscribed", self.device, message.type_name());
            return;
        }
        match encode_message(message) {
            Ok(payload) => self.sink.emit(TransportEvent::MessageReceived {
                namespace: self.namespace.clone(),
                payload,
            }),
            Err(e) => warn!("simulated receiver failed to encode reply: {e}"),
        }
    }

    fn on_message(&mut self, message: Message) {
        match message {
            Message::Login(login) => {
                if self.game.player_id.as_deref() != Some(login.id.as_str()) {
                    self.game.players += 1;
                }
                info!("{}: player {} logged in", self.device, login.id);
                self.game.player_id = Some(login.id);
                self.game.player_name = login.name;
                self.reply(&self.game.state());
            }
            Message::Logout(_) => {
                self.game.players = self.game.players.saturating_sub(1);
                self.game.player_id = None;
                self.reply(&self.game.state());
            }
            Message::Request(request) => {
                if self.game.phase != GamePhase::Init {
                    debug!("race request ignored in phase {}", self.game.phase.as_str());
                    return;
                }
                self.game.race = Some(Race {
                    start_location: request.start_location,
                    start_time: now_millis(),
                    target_location: request.target_location,
                    target_title: request.target_title,
                });
                self.game.phase = GamePhase::Load;
                self.reply(&self.game.state());
                self.game.phase = GamePhase::Race;
                self.reply(&self.game.state());
                self.reply(&Message::PlayerState(PlayerStateMessage {
                    state: PlayerPhase::Active,
                }));
            }
            Message::Position(position) => self.on_position(position.location),
            other => debug!("simulated receiver ignores {}", other.type_name()),
        }
    }

    fn on_position(&mut self, location: Location) {
        let Some(race) = self.game.race.as_ref() else {
            return;
        };
        if self.game.phase != GamePhase::Race {
            return;
        }
        let remaining = distance_meters(location, race.target_location);
        if remaining >= WIN_DISTANCE_METERS {
            debug!("{remaining:.0} m to {}", race.target_title);
            return;
        }

        let entry = ScoreEntry {
            id: self.game.player_id.clone().unwrap_or_default(),
            name: self
                .game
                .player_name
                .clone()
                .unwrap_or_else(|| "Player 1".to_string()),
            score: remaining,
            time: now_millis() - race.start_time,
        };
        self.reply(&Message::PlayerState(PlayerStateMessage {
            state: PlayerPhase::Finished,
        }));
        self.game.phase = GamePhase::Scores;
        self.reply(&self.game.state());
        self.reply(&Message::GameScores(GameScoresMessage {
            scores: vec![entry],
        }));
        self.game.phase = GamePhase::Init;
        self.game.race = None;
        self.reply(&self.game.state());
    }
}

impl Transport for SimulatedTransport {
    fn connect(&mut self) -> Result<(), TransportError> {
        self.connected = true;
        self.sink.emit(TransportEvent::Connected);
        Ok(())
    }

    fn disconnect(&mut self) {
        self.connected = false;
        self.launched = false;
        self.subscribed.clear();
    }

    fn is_connected(&self) -> bool {
        self.connected
    }

    fn send(&mut self, namespace: &str, payload: String) -> Result<(), TransportError> {
        if !self.connected {
            return Err(TransportError::NotConnected);
        }
        if namespace != self.namespace || !self.launched {
            debug!("simulated receiver not listening on {namespace}");
            return Ok(());
        }
        match decode_message(&payload) {
            Ok(message) => self.on_message(message),
            Err(e) => warn!("simulated receiver dropped payload: {e}"),
        }
        Ok(())
    }

    fn subscribe(&mut self, namespace: &str) -> Result<(), TransportError> {
        if !self.connected {
            return Err(TransportError::NotConnected);
        }
        self.subscribed.insert(namespace.to_string());
        Ok(())
    }

    fn unsubscribe(&mut self, namespace: &str) -> Result<(), TransportError> {
        self.subscribed.remove(namespace);
        Ok(())
    }

    fn launch_application(&mut self, app_id: &str) -> Result<(), TransportError> {
        if !self.connected {
            return Err(TransportError::NotConnected);
        }
        info!("{}: launching {app_id}", self.device);
        self.launched = true;
        self.sink.emit(TransportEvent::ApplicationLaunched(Ok(())));
        self.sink.emit(TransportEvent::ApplicationStatusChanged {
            status: format!("running {app_id}"),
        });
        Ok(())
    }

    fn leave_application(&mut self) -> Result<(), TransportError> {
        self.launched = false;
        Ok(())
    }
}

/// Opens a [`SimulatedTransport`] for every selected device.
pub struct SimulatedReceiverFactory {
    namespace: String,
}

impl SimulatedReceiverFactory {
    /// `namespace` is the one the simulated receiver listens and replies on.
    pub fn new(namespace: impl Into<String>) -> Self {
        Self {
            namespace: namespace.into(),
        }
    }
}

impl TransportFactory for SimulatedReceiverFactory {
    fn open(&mut self, device: &Device, sink: EventSink) -> Box<dyn Transport> {
        Box::new(SimulatedTransport::new(device.clone(), sink, self.namespace.clone()))
    }
}
