//! The per-client synchronization engine.
//!
//! [`SyncEngine`] owns every sync component and the player handle. The
//! runtime drives it from a single task: inbound frames, player events and
//! timer ticks are all method calls taking the local time, so no state is
//! ever shared across threads.

mod room;
mod router;
mod schedule;

pub use room::RoomView;
pub use schedule::Scheduled;

use tokio::sync::mpsc;
use tracing::{debug, info, warn};

use crate::config::{RoomRole, SyncTuning};
use crate::host::HostReporter;
use crate::metrics;
use crate::player::{MediaPlayer, PlayerEvent};
use crate::protocol::{InboundMessage, OutboundMessage, Outgoing};
use crate::sync::{
    AuthoritativeStateTracker, ClockSynchronizer, DriftController, EchoSuppressor, SyncPhase,
    SyncStatus, TickOutcome,
};

/// Who we are on the relay.
#[derive(Debug, Clone, Default)]
pub struct Identity {
    /// Assigned by the relay through `client_hello`.
    pub client_id: Option<String>,
    pub user_name: String,
    pub media_id: Option<String>,
}

impl Identity {
    pub fn new(user_name: impl Into<String>, media_id: Option<String>) -> Self {
        Self {
            client_id: None,
            user_name: user_name.into(),
            media_id,
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PendingAction {
    /// Start playback for a host `play` with a future start instant.
    Play,
}

pub struct SyncEngine<P> {
    tuning: SyncTuning,
    identity: Identity,
    player: P,
    outbox: mpsc::UnboundedSender<Outgoing>,

    clock: ClockSynchronizer,
    tracker: AuthoritativeStateTracker,
    echo: EchoSuppressor,
    drift: DriftController,
    reporter: HostReporter,
    pending: Scheduled<PendingAction>,

    room: Option<RoomView>,
    /// Room this client wants to be in; replayed after a reconnect.
    desired: Option<RoomRole>,
    is_host: bool,
    ready_sent: bool,
    connected: bool,
    local_buffering: bool,
}

impl<P: MediaPlayer> SyncEngine<P> {
    pub fn new(
        tuning: SyncTuning,
        identity: Identity,
        player: P,
        outbox: mpsc::UnboundedSender<Outgoing>,
    ) -> Self {
        Self {
            clock: ClockSynchronizer::new(),
            tracker: AuthoritativeStateTracker::new(),
            echo: EchoSuppressor::new(),
            drift: DriftController::new(tuning.clone()),
            reporter: HostReporter::new(&tuning),
            pending: Scheduled::new(),
            tuning,
            identity,
            player,
            outbox,
            room: None,
            desired: None,
            is_host: false,
            ready_sent: false,
            connected: false,
            local_buffering: false,
        }
    }

    pub fn tuning(&self) -> &SyncTuning {
        &self.tuning
    }

    pub fn identity(&self) -> &Identity {
        &self.identity
    }

    pub fn clock(&self) -> &ClockSynchronizer {
        &self.clock
    }

    pub fn tracker(&self) -> &AuthoritativeStateTracker {
        &self.tracker
    }

    pub fn player(&self) -> &P {
        &self.player
    }

    pub fn player_mut(&mut self) -> &mut P {
        &mut self.player
    }

    pub fn room(&self) -> Option<&RoomView> {
        self.room.as_ref()
    }

    pub fn is_host(&self) -> bool {
        self.is_host
    }

    pub fn is_connected(&self) -> bool {
        self.connected
    }

    pub fn phase(&self) -> SyncPhase {
        self.drift.phase()
    }

    pub fn sync_status(&self) -> SyncStatus {
        self.drift.status()
    }

    pub fn last_drift(&self) -> f64 {
        self.drift.last_drift()
    }

    pub fn is_suppressed(&self, now_ms: u64) -> bool {
        self.echo.is_suppressed(now_ms)
    }

    /// Parses one relay frame and routes it. Malformed frames are dropped.
    pub fn handle_text(&mut self, text: &str, now_ms: u64) {
        match InboundMessage::parse(text) {
            Ok(message) => self.handle_inbound(message, now_ms),
            Err(err) => {
                metrics::INBOUND_DROPPED
                    .with_label_values(&["malformed"])
                    .inc();
                debug!(target: "watchparty::client", error = %err, "dropping malformed frame");
            }
        }
    }

    pub fn handle_inbound(&mut self, message: InboundMessage, now_ms: u64) {
        self.route(message, now_ms);
        self.maybe_send_ready(now_ms);
    }

    pub fn handle_player_event(&mut self, event: PlayerEvent, now_ms: u64) {
        if self.is_host && self.room.is_some() {
            let status = self.player.status();
            let reports = self
                .reporter
                .on_player_event(event, status, now_ms, &self.echo);
            for report in reports {
                self.send(report, now_ms);
            }
        } else {
            self.follower_player_event(event, now_ms);
        }
        self.maybe_send_ready(now_ms);
    }

    // Local user actions on a follower are not forwarded; only the
    // resume-from-buffer transition matters here.
    fn follower_player_event(&mut self, event: PlayerEvent, now_ms: u64) {
        match event {
            PlayerEvent::Waiting => self.local_buffering = true,
            PlayerEvent::Playing | PlayerEvent::CanPlay => {
                if std::mem::take(&mut self.local_buffering) && self.room.is_some() {
                    debug!(target: "watchparty::client", "resumed after buffering, cooling down");
                    self.drift.enter_cooldown(now_ms);
                }
            }
            PlayerEvent::Detached => {
                self.local_buffering = false;
                info!(target: "watchparty::client", "player detached");
            }
            PlayerEvent::Play | PlayerEvent::Pause | PlayerEvent::Seeked { .. } => {
                if !self.echo.is_suppressed(now_ms) {
                    debug!(target: "watchparty::client", ?event, "ignoring local action on follower");
                }
            }
        }
    }

    /// One drift controller step. Hosts and clients outside a room skip it.
    pub fn tick_sync(&mut self, now_ms: u64) -> TickOutcome {
        if self.is_host || self.room.is_none() {
            return TickOutcome::Idle;
        }
        let outcome = self.drift.tick(
            now_ms,
            &self.clock,
            &mut self.tracker,
            &mut self.echo,
            &mut self.player,
        );
        self.maybe_send_ready(now_ms);
        outcome
    }

    /// Clock probe; runs whether or not we are in a room.
    pub fn tick_probe(&mut self, now_ms: u64) {
        if self.connected {
            self.send(OutboundMessage::Ping { client_ts: now_ms }, now_ms);
        }
    }

    pub fn tick_heartbeat(&mut self, now_ms: u64) {
        if !self.is_host || self.room.is_none() {
            return;
        }
        let status = self.player.status();
        if let Some(report) = self.reporter.heartbeat(status, now_ms, &self.echo) {
            self.send(report, now_ms);
        }
    }

    pub fn next_deadline(&self) -> Option<u64> {
        self.pending.deadline()
    }

    pub fn fire_due(&mut self, now_ms: u64) {
        let Some(action) = self.pending.take_due(now_ms) else {
            return;
        };
        match action {
            PendingAction::Play => {
                info!(target: "watchparty::client", "scheduled play");
                self.echo.suppress(now_ms, self.tuning.suppress_ms);
                if let Err(err) = self.player.play() {
                    debug!(target: "watchparty::client", error = %err, "play not applied");
                }
                self.drift.enter_cooldown(now_ms);
                self.drift.set_status(SyncStatus::Syncing);
            }
        }
    }

    /// Records the room to enter once connected, without sending anything.
    pub fn target_room(&mut self, role: RoomRole) {
        if let RoomRole::Host {
            media_id: Some(media_id),
        } = &role
        {
            self.identity.media_id = Some(media_id.clone());
        }
        self.desired = Some(role);
    }

    /// Fresh relay connection: probe right away and get back into the room.
    pub fn on_connected(&mut self, now_ms: u64) {
        self.connected = true;
        self.tick_probe(now_ms);
        match self.desired.clone() {
            Some(RoomRole::Host { media_id }) => self.create_room(media_id, now_ms),
            Some(RoomRole::Follow { room }) => self.join_room(room, now_ms),
            None => {}
        }
    }

    /// Drops all room-scoped state. The clock estimate is kept.
    pub fn on_disconnected(&mut self) {
        if self.connected {
            warn!(target: "watchparty::client", "relay connection lost");
        }
        self.connected = false;
        self.clear_room_state();
        self.room = None;
        self.is_host = false;
    }

    pub fn create_room(&mut self, media_id: Option<String>, now_ms: u64) {
        let start_pos = self.player.status().map(|s| s.position).unwrap_or(0.0);
        if media_id.is_some() {
            self.identity.media_id = media_id.clone();
        }
        self.desired = Some(RoomRole::Host {
            media_id: media_id.clone(),
        });
        self.send(
            OutboundMessage::CreateRoom {
                start_pos,
                media_id: media_id.or_else(|| self.identity.media_id.clone()),
                user_name: self.identity.user_name.clone(),
            },
            now_ms,
        );
    }

    pub fn join_room(&mut self, room: impl Into<String>, now_ms: u64) {
        let room = room.into();
        self.desired = Some(RoomRole::Follow { room: room.clone() });
        self.send(
            OutboundMessage::JoinRoom {
                room,
                user_name: self.identity.user_name.clone(),
            },
            now_ms,
        );
    }

    pub fn leave_room(&mut self, now_ms: u64) {
        self.desired = None;
        if self.room.is_some() {
            self.send(OutboundMessage::LeaveRoom, now_ms);
        }
        self.clear_room_state();
        self.room = None;
        self.is_host = false;
    }

    fn clear_room_state(&mut self) {
        self.tracker.clear();
        self.drift.reset();
        self.pending.cancel();
        self.echo.clear();
        self.reporter.reset();
        self.ready_sent = false;
        self.local_buffering = false;
    }

    fn maybe_send_ready(&mut self, now_ms: u64) {
        if self.ready_sent || self.room.is_none() {
            return;
        }
        if !self.player.status().is_some_and(|s| s.ready) {
            return;
        }
        self.ready_sent = true;
        let media_id = self
            .identity
            .media_id
            .clone()
            .or_else(|| self.room.as_ref().and_then(|r| r.media_id.clone()));
        self.send(OutboundMessage::Ready { media_id }, now_ms);
    }

    fn send(&self, message: OutboundMessage, now_ms: u64) {
        let outgoing = Outgoing {
            room: self.room.as_ref().map(|r| r.id.clone()),
            client: self.identity.client_id.clone(),
            ts: now_ms,
            message,
        };
        if self.outbox.send(outgoing).is_err() {
            debug!(target: "watchparty::client", "outbox closed; dropping message");
        }
    }
}
