//! Event loop tying relay, player and timers to one [`SyncEngine`].

use std::future::Future;
use std::pin::Pin;
use std::time::Duration;

use tokio::sync::mpsc;
use tokio::time::{Instant, MissedTickBehavior, interval_at, sleep};
use tracing::{debug, info, trace, warn};

use crate::config::{RelayConfig, SyncTuning};
use crate::metrics;
use crate::player::{MediaPlayer, PlayerEvent};
use crate::protocol::Outgoing;
use crate::session::{Identity, SyncEngine};
use crate::sync::LocalClock;
use crate::transport::{Backoff, RelayConnection, TransportError};

enum SessionEnd {
    Shutdown,
    Lost,
}

/// Runs until `shutdown` resolves, reconnecting to the relay with backoff.
///
/// Returns the engine so callers can inspect the final state. Only a relay
/// URL that can never work is an error; every other failure is retried.
pub async fn run<P, F>(
    relay: RelayConfig,
    tuning: SyncTuning,
    player: P,
    mut player_events: Option<mpsc::UnboundedReceiver<PlayerEvent>>,
    shutdown: F,
) -> Result<SyncEngine<P>, TransportError>
where
    P: MediaPlayer,
    F: Future<Output = ()>,
{
    let clock = LocalClock;
    let (out_tx, mut out_rx) = mpsc::unbounded_channel::<Outgoing>();
    let mut engine = SyncEngine::new(
        tuning.clone(),
        Identity::new(relay.user_name.clone(), None),
        player,
        out_tx,
    );
    engine.target_room(relay.role.clone());

    let mut backoff = Backoff::from_tuning(&tuning);
    tokio::pin!(shutdown);

    loop {
        let connected = tokio::select! {
            _ = shutdown.as_mut() => break,
            result = RelayConnection::connect(&relay.relay_url) => result,
        };

        let mut connection = match connected {
            Ok(connection) => {
                backoff.reset();
                connection
            }
            Err(err @ (TransportError::InvalidUrl(_) | TransportError::UnsupportedScheme(_))) => {
                return Err(err);
            }
            Err(err) => {
                let delay = backoff.next_delay();
                metrics::RELAY_RECONNECTS.inc();
                warn!(
                    target: "watchparty::client",
                    error = %err,
                    retry_in_ms = delay.as_millis() as u64,
                    "relay unreachable"
                );
                if !idle_wait(&mut engine, &mut player_events, delay, &clock, shutdown.as_mut()).await {
                    break;
                }
                continue;
            }
        };

        // Anything queued while offline refers to a dead session.
        while out_rx.try_recv().is_ok() {}
        info!(target: "watchparty::client", url = %relay.relay_url, "connected to relay");
        engine.on_connected(clock.now_ms());

        let end = session_loop(
            &mut engine,
            &mut connection,
            &mut out_rx,
            &mut player_events,
            &tuning,
            &clock,
            shutdown.as_mut(),
        )
        .await;
        engine.on_disconnected();
        connection.close().await;

        match end {
            SessionEnd::Shutdown => break,
            SessionEnd::Lost => {
                let delay = backoff.next_delay();
                metrics::RELAY_RECONNECTS.inc();
                info!(
                    target: "watchparty::client",
                    retry_in_ms = delay.as_millis() as u64,
                    "reconnecting"
                );
                if !idle_wait(&mut engine, &mut player_events, delay, &clock, shutdown.as_mut()).await {
                    break;
                }
            }
        }
    }

    Ok(engine)
}

async fn session_loop<P, F>(
    engine: &mut SyncEngine<P>,
    connection: &mut RelayConnection,
    out_rx: &mut mpsc::UnboundedReceiver<Outgoing>,
    player_events: &mut Option<mpsc::UnboundedReceiver<PlayerEvent>>,
    tuning: &SyncTuning,
    clock: &LocalClock,
    mut shutdown: Pin<&mut F>,
) -> SessionEnd
where
    P: MediaPlayer,
    F: Future<Output = ()>,
{
    let start = Instant::now();
    let mut sync_tick = interval_at(start + tuning.sync_loop_period(), tuning.sync_loop_period());
    let mut probe_tick = interval_at(start + tuning.probe_period(), tuning.probe_period());
    let mut heartbeat_tick = interval_at(start + tuning.heartbeat_period(), tuning.heartbeat_period());
    for ticker in [&mut sync_tick, &mut probe_tick, &mut heartbeat_tick] {
        ticker.set_missed_tick_behavior(MissedTickBehavior::Skip);
    }

    loop {
        // Flush first so replies to the previous event leave in order.
        while let Ok(outgoing) = out_rx.try_recv() {
            if !forward(connection, outgoing) {
                return SessionEnd::Lost;
            }
        }

        let scheduled = scheduled_wait(engine.next_deadline(), clock.now_ms());

        tokio::select! {
            _ = shutdown.as_mut() => {
                engine.leave_room(clock.now_ms());
                while let Ok(outgoing) = out_rx.try_recv() {
                    forward(connection, outgoing);
                }
                return SessionEnd::Shutdown;
            }
            frame = connection.recv() => match frame {
                Some(text) => engine.handle_text(&text, clock.now_ms()),
                None => return SessionEnd::Lost,
            },
            event = next_player_event(player_events) => {
                on_player_event(engine, player_events, event, clock.now_ms());
            }
            _ = sync_tick.tick() => {
                let outcome = engine.tick_sync(clock.now_ms());
                trace!(target: "watchparty::sync", ?outcome, "tick");
            }
            _ = probe_tick.tick() => engine.tick_probe(clock.now_ms()),
            _ = heartbeat_tick.tick() => engine.tick_heartbeat(clock.now_ms()),
            _ = scheduled => engine.fire_due(clock.now_ms()),
        }
    }
}

/// Sleeps between connection attempts while still feeding player events.
/// Returns `false` when shutdown was requested.
async fn idle_wait<P, F>(
    engine: &mut SyncEngine<P>,
    player_events: &mut Option<mpsc::UnboundedReceiver<PlayerEvent>>,
    delay: Duration,
    clock: &LocalClock,
    mut shutdown: Pin<&mut F>,
) -> bool
where
    P: MediaPlayer,
    F: Future<Output = ()>,
{
    let wake = sleep(delay);
    tokio::pin!(wake);
    loop {
        tokio::select! {
            _ = shutdown.as_mut() => return false,
            _ = &mut wake => return true,
            event = next_player_event(player_events) => {
                on_player_event(engine, player_events, event, clock.now_ms());
            }
        }
    }
}

fn on_player_event<P: MediaPlayer>(
    engine: &mut SyncEngine<P>,
    player_events: &mut Option<mpsc::UnboundedReceiver<PlayerEvent>>,
    event: Option<PlayerEvent>,
    now_ms: u64,
) {
    match event {
        Some(event) => engine.handle_player_event(event, now_ms),
        None => {
            *player_events = None;
            engine.handle_player_event(PlayerEvent::Detached, now_ms);
        }
    }
}

async fn next_player_event(
    rx: &mut Option<mpsc::UnboundedReceiver<PlayerEvent>>,
) -> Option<PlayerEvent> {
    match rx {
        Some(rx) => rx.recv().await,
        None => std::future::pending().await,
    }
}

async fn scheduled_wait(deadline: Option<u64>, now_ms: u64) {
    match deadline {
        Some(due) => sleep(Duration::from_millis(due.saturating_sub(now_ms))).await,
        None => std::future::pending().await,
    }
}

fn forward(connection: &RelayConnection, outgoing: Outgoing) -> bool {
    let kind = outgoing.message.kind();
    match outgoing.into_envelope().to_json() {
        Ok(text) => connection.send(text).is_ok(),
        Err(err) => {
            debug!(target: "watchparty::client", kind, error = %err, "failed to encode outbound message");
            true
        }
    }
}
