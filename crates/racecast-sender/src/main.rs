//! Racecast sender entry point.
//!
//! Headless run against the in-process simulated receiver: loads the config
//! and install id, selects the simulated device, waits for the session to
//! reach `CASTING`, requests a race and walks the player from the start to
//! the target.  Ctrl-C ends the run early; either way the sender logs out
//! before exiting.
//!
//! ```text
//! main()
//!  └─ AppState::new()        -- config, identity, ConnectionManager
//!  └─ run_event_loop()       (Tokio task)
//!  └─ scripted race          select → connect → request → positions
//! ```

use std::sync::Arc;
use std::time::Duration;

use anyhow::{bail, Context};
use tracing::{debug, info, warn};
use tracing_subscriber::EnvFilter;

use racecast_core::protocol::messages::Location;
use racecast_core::{ConnectionStatus, Message};
use racecast_sender::infrastructure::storage::config::{config_file_path, load_config, AppConfig};
use racecast_sender::infrastructure::storage::identity::FileIdentityStore;
use racecast_sender::infrastructure::transport::simulated::SimulatedReceiverFactory;
use racecast_sender::infrastructure::ui_bridge::{self, AppState, DeviceDto, RaceRequestDto};

const POSITION_STEPS: u32 = 10;
const STEP_INTERVAL: Duration = Duration::from_millis(300);
const CASTING_TIMEOUT: Duration = Duration::from_secs(5);

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let (config, config_error) = match load_config() {
        Ok(cfg) => (cfg, None),
        Err(e) => (AppConfig::default(), Some(e)),
    };

    // Initialise structured logging.  Level is overridden by `RUST_LOG`.
    tracing_subscriber::fmt()
        .with_env_filter(
            EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(&config.sender.log_level)),
        )
        .init();

    if let Some(e) = config_error {
        warn!("using default configuration: {e}");
    }
    info!("Racecast sender starting");

    let identity = FileIdentityStore::open_default().context("failed to open install identity")?;
    info!("install id {} ({})", identity.id(), identity.path().display());

    let namespace = config.receiver.control_namespace.clone();
    let state = AppState::new(
        config,
        Box::new(SimulatedReceiverFactory::new(namespace.clone())),
        Arc::new(identity),
        config_file_path().ok(),
    );

    {
        let mut manager = state.connection_manager.lock().await;
        manager.add_status_listener(Arc::new(|s: &ConnectionStatus| info!("status: {s}")));
        manager.add_message_received_callback(&namespace, Arc::new(log_message));
    }

    let event_loop = tokio::spawn(Arc::clone(&state).run_event_loop());

    let outcome = tokio::select! {
        result = run_race(Arc::clone(&state)) => result,
        _ = tokio::signal::ctrl_c() => {
            info!("shutdown signal received");
            Ok(())
        }
    };

    ui_bridge::disconnect(Arc::clone(&state), true).await;
    event_loop.abort();
    info!("Racecast sender stopped");
    outcome
}

async fn run_race(state: Arc<AppState>) -> anyhow::Result<()> {
    let device = DeviceDto {
        id: "simulated-receiver".to_string(),
        name: "Simulated Receiver".to_string(),
    };
    ui_bridge::select_device(Arc::clone(&state), Some(device)).await;
    let connected = ui_bridge::connect(Arc::clone(&state)).await;
    if !connected.success {
        bail!("connect failed: {}", connected.error.unwrap_or_default());
    }

    tokio::time::timeout(CASTING_TIMEOUT, wait_for_casting(&state))
        .await
        .context("receiver did not reach CASTING in time")?;

    let start = Location::new(37.413084, -122.069217);
    let target = Location::new(37.420283, -122.083961);
    let request = RaceRequestDto {
        target_title: "Android".to_string(),
        target_location: target,
        start_location: start,
        coarse_user_location: Some(start),
    };
    let sent = ui_bridge::send_request(Arc::clone(&state), request).await;
    if !sent.success {
        bail!("race request failed: {}", sent.error.unwrap_or_default());
    }

    for step in 1..=POSITION_STEPS {
        tokio::time::sleep(STEP_INTERVAL).await;
        let t = f64::from(step) / f64::from(POSITION_STEPS);
        let here = Location::new(
            start.lat + (target.lat - start.lat) * t,
            start.lng + (target.lng - start.lng) * t,
        );
        let result = ui_bridge::send_position(Arc::clone(&state), here).await;
        if !result.success {
            warn!("position update dropped: {}", result.error.unwrap_or_default());
        }
    }

    // Let the final replies drain before logging out.
    tokio::time::sleep(STEP_INTERVAL).await;
    Ok(())
}

async fn wait_for_casting(state: &AppState) {
    loop {
        if state.connection_manager.lock().await.status() == ConnectionStatus::Casting {
            return;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
}

fn log_message(message: &Message) {
    match message {
        Message::GameState(gs) => match &gs.race {
            Some(race) => info!(
                "game {} with {} player(s): race to {}",
                gs.state.as_str(),
                gs.players,
                race.target_title
            ),
            None => info!("game {} with {} player(s)", gs.state.as_str(), gs.players),
        },
        Message::PlayerState(ps) => info!("player {}", ps.state.as_str()),
        Message::GameScores(scores) => {
            for (rank, entry) in scores.scores.iter().enumerate() {
                info!(
                    "#{} {} ({:.1} m, {:.1} s)",
                    rank + 1,
                    entry.name,
                    entry.score,
                    entry.time as f64 / 1000.0
                );
            }
        }
        other => debug!("received {}", other.type_name()),
    }
}
