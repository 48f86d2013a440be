//! Inbound dispatch and follower reconciliation.

use tracing::{debug, info};

use super::{PendingAction, RoomView, SyncEngine};
use crate::metrics;
use crate::player::{MediaPlayer, PlayerStatus};
use crate::protocol::{
    HostAction, HostEventPayload, InboundKind, InboundMessage, PlayState, PlaybackReport,
    RoomSnapshot,
};
use crate::sync::SyncStatus;

impl<P: MediaPlayer> SyncEngine<P> {
    pub(super) fn route(&mut self, message: InboundMessage, now_ms: u64) {
        let InboundMessage {
            room,
            client,
            server_ts,
            kind,
        } = message;

        if let (Some(current), Some(room)) = (self.room.as_ref(), room.as_deref()) {
            if current.id != room && !matches!(kind, InboundKind::RoomState(_)) {
                metrics::INBOUND_DROPPED
                    .with_label_values(&["other_room"])
                    .inc();
                return;
            }
        }

        match kind {
            InboundKind::ClientHello { client_id } => {
                debug!(target: "watchparty::client", %client_id, "identity assigned");
                self.identity.client_id = Some(client_id);
                self.refresh_host_role();
            }
            InboundKind::Pong { client_ts } => match server_ts {
                Some(server_ts) => {
                    self.clock.record_probe_reply(client_ts, server_ts, now_ms);
                }
                None => {
                    metrics::INBOUND_DROPPED
                        .with_label_values(&["pong_without_stamp"])
                        .inc();
                }
            },
            InboundKind::RoomState(snapshot) => {
                self.on_room_state(room, client, server_ts, snapshot, now_ms)
            }
            InboundKind::PlayerEvent(event) => self.on_host_event(server_ts, event, now_ms),
            InboundKind::StateUpdate(report) => self.on_state_update(server_ts, report, now_ms),
            InboundKind::ParticipantsUpdate { participant_count }
            | InboundKind::ClientLeft { participant_count } => {
                if let Some(view) = self.room.as_mut() {
                    view.set_participant_count(participant_count);
                }
            }
            InboundKind::RoomClosed { reason } => {
                if self.room.is_some() {
                    info!(target: "watchparty::client", reason = reason.as_deref().unwrap_or("unknown"), "room closed");
                    self.desired = None;
                    self.clear_room_state();
                    self.room = None;
                    self.is_host = false;
                }
            }
            InboundKind::Other(kind) => {
                debug!(target: "watchparty::client", %kind, "ignoring message");
            }
        }
    }

    fn refresh_host_role(&mut self) {
        let is_host = self
            .room
            .as_ref()
            .is_some_and(|r| r.is_hosted_by(self.identity.client_id.as_deref()));
        if is_host != self.is_host {
            info!(target: "watchparty::client", is_host, "host role changed");
            self.is_host = is_host;
            self.drift.reset();
            self.pending.cancel();
            self.reporter.reset();
            if let Err(err) = self.player.set_rate(1.0) {
                debug!(target: "watchparty::client", error = %err, "rate not applied");
            }
        }
    }

    /// Server instant for a stamped message, falling back to our estimate.
    fn observed_at(&self, server_ts: Option<u64>, now_ms: u64) -> f64 {
        server_ts
            .map(|ts| ts as f64)
            .unwrap_or_else(|| self.clock.server_now(now_ms))
    }

    fn on_room_state(
        &mut self,
        room: Option<String>,
        client: Option<String>,
        server_ts: Option<u64>,
        snapshot: RoomSnapshot,
        now_ms: u64,
    ) {
        let Some(room_id) = room.or_else(|| self.room.as_ref().map(|r| r.id.clone())) else {
            metrics::INBOUND_DROPPED
                .with_label_values(&["room_state_without_room"])
                .inc();
            return;
        };

        if self.room.as_ref().is_none_or(|r| r.id != room_id) {
            info!(target: "watchparty::client", room = %room_id, "entered room");
            self.clear_room_state();
            self.room = Some(RoomView::new(room_id));
        }
        if let Some(view) = self.room.as_mut() {
            view.absorb(&snapshot);
        }
        if self.identity.client_id.is_none() {
            self.identity.client_id = client;
        }
        if let Some(ts) = server_ts {
            if self.clock.seed_from_server_stamp(ts, now_ms) {
                debug!(target: "watchparty::clock", offset_ms = self.clock.offset_ms(), "seeded from room_state");
            }
        }
        self.refresh_host_role();

        let report = snapshot.state.unwrap_or_default();
        let Some(play_state) = report.play_state.or(self.tracker.play_state()) else {
            return;
        };
        let position = report
            .position
            .or(self.tracker.last_position())
            .unwrap_or(0.0);
        let observed_at = self.observed_at(server_ts, now_ms);
        self.tracker
            .apply_authoritative(position, play_state, observed_at);

        if self.is_host {
            return;
        }
        self.reconcile_room_state(now_ms);
    }

    fn reconcile_room_state(&mut self, now_ms: u64) {
        let server_now = self.clock.server_now(now_ms);
        let Some(expected) = self.tracker.expected_position(server_now) else {
            return;
        };
        let playing = self.tracker.is_playing();
        let target = if playing {
            expected + self.tuning.sync_lead_secs()
        } else {
            expected
        };

        if let Some(status) = self.player.status() {
            if (target - status.position).abs() > self.tuning.seek_threshold_secs {
                info!(
                    target: "watchparty::client",
                    from = status.position,
                    to = target,
                    "room_state seek"
                );
                self.seek_local(target, now_ms);
            }
            self.match_play_state(playing, status.paused, now_ms);
        }

        if playing {
            if !self.drift.phase().is_initial_catch_up() {
                self.drift.begin_initial_catch_up(target, now_ms);
            }
        } else {
            self.drift.clear_phase();
            self.drift.set_status(SyncStatus::Synced);
        }
    }

    fn on_host_event(&mut self, server_ts: Option<u64>, event: HostEventPayload, now_ms: u64) {
        if self.is_host || self.room.is_none() {
            return;
        }
        let observed_at = self.observed_at(server_ts, now_ms);
        let local = self.player.status();
        let position = event
            .position
            .or(self.tracker.last_position())
            .or(local.map(|s| s.position));
        let Some(position) = position else {
            return;
        };

        match event.action {
            HostAction::Play => {
                self.pending.cancel();
                let scheduled_local = event
                    .target_server_ts
                    .map(|ts| self.clock.to_local(ts as f64))
                    .filter(|due| *due > now_ms as f64);

                if let Some(due) = scheduled_local {
                    // Starts at the target instant from exactly `position`.
                    let start_at = event.target_server_ts.map_or(observed_at, |ts| ts as f64);
                    self.tracker
                        .apply_authoritative(position, PlayState::Playing, start_at);
                    if let Some(status) = local {
                        if (position - status.position).abs() > self.tuning.seek_threshold_secs {
                            self.seek_local(position, now_ms);
                        }
                        if !status.paused {
                            self.pause_local(now_ms);
                        }
                    }
                    let due_ms = due.ceil() as u64;
                    self.pending.schedule(due_ms, PendingAction::Play);
                    self.drift.set_status(SyncStatus::PendingPlay);
                    info!(target: "watchparty::client", position, in_ms = due_ms.saturating_sub(now_ms), "play scheduled");
                    return;
                }

                self.tracker
                    .apply_authoritative(position, PlayState::Playing, observed_at);
                let server_now = self.clock.server_now(now_ms);
                let expected = self
                    .tracker
                    .expected_position(server_now)
                    .unwrap_or(position);
                let target = expected + self.tuning.sync_lead_secs();
                if let Some(status) = local {
                    if (target - status.position).abs() > self.tuning.seek_threshold_secs {
                        self.seek_local(target, now_ms);
                    }
                    if status.paused {
                        self.play_local(now_ms);
                    }
                }
                self.drift.enter_cooldown(now_ms);
                self.drift.set_status(SyncStatus::Syncing);
                info!(target: "watchparty::client", position, target, "host play");
            }
            HostAction::Pause => {
                self.tracker
                    .apply_authoritative(position, PlayState::Paused, observed_at);
                self.settle_paused(position, local, now_ms);
                info!(target: "watchparty::client", position, "host pause");
            }
            HostAction::Seek => {
                let play_state = event
                    .play_state
                    .or(self.tracker.play_state())
                    .unwrap_or(PlayState::Playing);
                self.tracker
                    .apply_authoritative(position, play_state, observed_at);
                if let Some(status) = local {
                    if (position - status.position).abs() > self.tuning.seek_threshold_secs {
                        self.seek_local(position, now_ms);
                    }
                    self.match_play_state(play_state.is_playing(), status.paused, now_ms);
                }
                if play_state.is_playing() {
                    // The player lands late after a seek; let the rate absorb it.
                    self.drift.enter_cooldown(now_ms);
                    self.drift.set_status(SyncStatus::Syncing);
                }
                info!(target: "watchparty::client", position, "host seek");
            }
            HostAction::Buffering => {
                self.tracker
                    .apply_authoritative(position, PlayState::Paused, observed_at);
                if let Some(status) = local {
                    if !status.paused {
                        self.pause_local(now_ms);
                    }
                    if (position - status.position).abs() > self.tuning.seek_threshold_secs {
                        self.seek_local(position, now_ms);
                    }
                }
                debug!(target: "watchparty::client", position, "host buffering");
            }
            HostAction::Unknown => {
                debug!(target: "watchparty::client", "ignoring unknown host action");
            }
        }
    }

    fn on_state_update(&mut self, server_ts: Option<u64>, report: PlaybackReport, now_ms: u64) {
        if self.is_host || self.room.is_none() {
            return;
        }
        let Some(play_state) = report.play_state.or(self.tracker.play_state()) else {
            return;
        };
        let observed_at = self.observed_at(server_ts, now_ms);
        let local = self.player.status();

        match play_state {
            PlayState::Paused => {
                let Some(position) = report.position.or(self.tracker.last_position()) else {
                    return;
                };
                let was_playing = self.tracker.is_playing();
                self.tracker
                    .apply_authoritative(position, PlayState::Paused, observed_at);
                if was_playing || local.is_some_and(|s| !s.paused) {
                    self.settle_paused(position, local, now_ms);
                }
            }
            PlayState::Playing => {
                let server_now = self.clock.server_now(now_ms);
                let settling = self.drift.ignores_position_updates(now_ms);
                if self.pending.is_pending() {
                    // A scheduled play owns the start instant and reference point.
                    self.keep_position(PlayState::Playing, report.position, observed_at);
                    return;
                }
                match local {
                    Some(status) if status.paused && status.ready && !status.buffering => {
                        info!(target: "watchparty::client", position = status.position, "host playing, resuming");
                        self.play_local(now_ms);
                        self.tracker.apply_authoritative(
                            status.position,
                            PlayState::Playing,
                            server_now,
                        );
                        self.drift.enter_cooldown(now_ms);
                        self.drift.set_status(SyncStatus::Syncing);
                    }
                    Some(status) if !status.ready || status.buffering || settling => {
                        self.keep_position(PlayState::Playing, report.position, observed_at);
                    }
                    None => self.keep_position(PlayState::Playing, report.position, observed_at),
                    Some(_) => match report.position {
                        Some(position) => self.tracker.apply_authoritative(
                            position,
                            PlayState::Playing,
                            observed_at,
                        ),
                        None => self.keep_position(PlayState::Playing, None, observed_at),
                    },
                }
            }
        }
    }

    /// Updates play state only; the extrapolation reference is kept unless
    /// there is none yet.
    fn keep_position(&mut self, play_state: PlayState, position: Option<f64>, observed_at: f64) {
        match self.tracker.current() {
            Some(state) => self.tracker.replace(state.with_play_state(play_state)),
            None => {
                if let Some(position) = position {
                    self.tracker
                        .apply_authoritative(position, play_state, observed_at);
                }
            }
        }
    }

    fn settle_paused(
        &mut self,
        position: f64,
        local: Option<PlayerStatus>,
        now_ms: u64,
    ) {
        self.pending.cancel();
        self.drift.clear_phase();
        self.drift.set_status(SyncStatus::Synced);
        if let Some(status) = local {
            if !status.paused {
                self.pause_local(now_ms);
            }
            if (position - status.position).abs() > self.tuning.seek_threshold_secs {
                self.seek_local(position, now_ms);
            }
            if status.rate != 1.0 {
                if let Err(err) = self.player.set_rate(1.0) {
                    debug!(target: "watchparty::client", error = %err, "rate not applied");
                }
            }
        }
    }

    fn match_play_state(&mut self, host_playing: bool, local_paused: bool, now_ms: u64) {
        if host_playing && local_paused {
            self.play_local(now_ms);
        } else if !host_playing && !local_paused {
            self.pause_local(now_ms);
        }
    }

    fn seek_local(&mut self, position: f64, now_ms: u64) {
        self.echo.suppress(now_ms, self.tuning.suppress_ms);
        if let Err(err) = self.player.seek(position) {
            debug!(target: "watchparty::client", error = %err, "seek not applied");
        }
    }

    fn play_local(&mut self, now_ms: u64) {
        self.echo.suppress(now_ms, self.tuning.suppress_ms);
        if let Err(err) = self.player.play() {
            debug!(target: "watchparty::client", error = %err, "play not applied");
        }
    }

    fn pause_local(&mut self, now_ms: u64) {
        self.echo.suppress(now_ms, self.tuning.suppress_ms);
        if let Err(err) = self.player.pause() {
            debug!(target: "watchparty::client", error = %err, "pause not applied");
        }
    }
}
