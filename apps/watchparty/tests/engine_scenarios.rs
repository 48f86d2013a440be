use serde_json::{Value, json};
use tokio::sync::mpsc;
use watchparty_core::config::SyncTuning;
use watchparty_core::player::testing::{FakePlayer, PlayerCommand};
use watchparty_core::player::{MediaPlayer, PlayerEvent};
use watchparty_core::protocol::{HostAction, OutboundMessage, Outgoing, PlayState};
use watchparty_core::session::{Identity, SyncEngine};
use watchparty_core::sync::{SyncPhase, SyncStatus, TickOutcome};

const T: u64 = 1_700_000_000_000;
const ROOM: &str = "r1";

struct Harness {
    engine: SyncEngine<FakePlayer>,
    outbox: mpsc::UnboundedReceiver<Outgoing>,
}

impl Harness {
    fn new(player: FakePlayer) -> Self {
        let (tx, outbox) = mpsc::unbounded_channel();
        let engine = SyncEngine::new(
            SyncTuning::default(),
            Identity::new("ana", None),
            player,
            tx,
        );
        Self { engine, outbox }
    }

    /// Connected, identified as `me`, clock offset pinned at exactly zero.
    fn connected(player: FakePlayer) -> Self {
        let mut harness = Self::new(player);
        harness.engine.on_connected(T - 1_000);
        harness.deliver("client_hello", None, json!({ "client_id": "me" }), None, T - 1_000);
        harness.deliver(
            "pong",
            None,
            json!({ "client_ts": T - 1_040 }),
            Some(T - 1_020),
            T - 1_000,
        );
        assert_eq!(harness.engine.clock().offset_ms(), 0.0);
        harness.drain();
        harness
    }

    fn deliver(
        &mut self,
        kind: &str,
        room: Option<&str>,
        payload: Value,
        server_ts: Option<u64>,
        now: u64,
    ) {
        let mut frame = json!({ "type": kind, "payload": payload, "ts": now });
        if let Some(room) = room {
            frame["room"] = json!(room);
        }
        if let Some(server_ts) = server_ts {
            frame["server_ts"] = json!(server_ts);
        }
        self.engine.handle_text(&frame.to_string(), now);
    }

    fn room_state(&mut self, host: &str, position: f64, state: &str, server_ts: u64, now: u64) {
        self.deliver(
            "room_state",
            Some(ROOM),
            json!({
                "name": "movie night",
                "host_id": host,
                "participant_count": 2,
                "state": { "position": position, "play_state": state },
            }),
            Some(server_ts),
            now,
        );
    }

    fn host_event(&mut self, payload: Value, server_ts: u64, now: u64) {
        self.deliver("player_event", Some(ROOM), payload, Some(server_ts), now);
    }

    fn drain(&mut self) -> Vec<OutboundMessage> {
        let mut out = Vec::new();
        while let Ok(outgoing) = self.outbox.try_recv() {
            out.push(outgoing.message);
        }
        out
    }

    fn player(&self) -> &FakePlayer {
        self.engine.player()
    }
}

fn approx(a: f64, b: f64) -> bool {
    (a - b).abs() < 1e-6
}

#[test]
fn joining_a_playing_room_seeks_ahead_and_catches_up() {
    let mut h = Harness::connected(FakePlayer::paused_at(0.0));
    h.room_state("host", 120.0, "playing", T, T + 50);

    let seeks = h.player().seeks();
    assert_eq!(seeks.len(), 1);
    assert!(approx(seeks[0], 120.35), "seeked to {}", seeks[0]);
    assert!(h.player().commands.contains(&PlayerCommand::Play));
    assert!(matches!(
        h.engine.phase(),
        SyncPhase::InitialCatchUp { target, .. } if approx(target, 120.35)
    ));
    assert!(!h.engine.is_host());
    assert_eq!(h.engine.room().and_then(|r| r.participant_count), Some(2));
}

#[test]
fn repeated_room_state_is_idempotent() {
    let mut h = Harness::connected(FakePlayer::paused_at(0.0));
    h.room_state("host", 120.0, "playing", T, T + 50);
    let first = h.engine.tracker().current();
    h.room_state("host", 120.0, "playing", T, T + 50);

    assert_eq!(h.engine.tracker().current(), first);
    assert_eq!(h.player().seeks().len(), 1);
}

#[test]
fn cooldown_absorbs_host_seek_with_rate_instead_of_seeking() {
    let mut h = Harness::connected(FakePlayer::paused_at(295.0));
    h.room_state("host", 295.0, "paused", T, T);
    assert!(h.player().seeks().is_empty());

    h.host_event(json!({ "action": "play", "position": 295.0, "play_state": "playing" }), T, T);
    assert!(matches!(h.engine.phase(), SyncPhase::Cooldown { .. }));

    // The player lags behind the host's seek.
    h.engine.player_mut().ignore_seeks = true;
    h.host_event(
        json!({ "action": "seek", "position": 300.0, "play_state": "playing" }),
        T + 100,
        T + 100,
    );
    assert_eq!(h.player().seeks(), vec![300.0]);

    let outcome = h.engine.tick_sync(T + 200);
    match outcome {
        TickOutcome::RateAdjusted { rate, drift } => {
            assert!(drift > 5.0);
            assert_eq!(rate, 2.0);
        }
        other => panic!("expected rate correction, got {other:?}"),
    }
    assert_eq!(h.player().seeks().len(), 1);
}

#[test]
fn host_seek_while_playing_cools_down_instead_of_reseeking() {
    let mut h = Harness::connected(FakePlayer::paused_at(295.0));
    h.room_state("host", 295.0, "paused", T, T);
    h.host_event(json!({ "action": "play", "position": 295.0, "play_state": "playing" }), T, T);

    // Let the play cooldown run out with the player on track.
    h.engine.player_mut().advance(2_500);
    assert!(matches!(h.engine.tick_sync(T + 2_500), TickOutcome::InSync { .. }));
    assert_eq!(h.engine.phase(), SyncPhase::Normal);

    h.engine.player_mut().ignore_seeks = true;
    h.host_event(
        json!({ "action": "seek", "position": 303.0, "play_state": "playing" }),
        T + 2_600,
        T + 2_600,
    );
    assert_eq!(h.player().seeks(), vec![303.0]);
    assert!(matches!(h.engine.phase(), SyncPhase::Cooldown { .. }));
    assert_eq!(h.engine.sync_status(), SyncStatus::Syncing);

    match h.engine.tick_sync(T + 2_700) {
        TickOutcome::RateAdjusted { rate, drift } => {
            assert!(drift > 5.0);
            assert_eq!(rate, 2.0);
        }
        other => panic!("expected rate correction, got {other:?}"),
    }
    assert_eq!(h.player().seeks().len(), 1);
}

#[test]
fn pongs_converge_on_half_rtt_offset() {
    let mut h = Harness::new(FakePlayer::detached());
    h.engine.on_connected(T);
    for i in 0..10 {
        let send = T + i * 10_000;
        let recv = send + 40;
        h.deliver("pong", None, json!({ "client_ts": send }), Some(recv + 500), recv);
    }
    let offset = h.engine.clock().offset_ms();
    assert!((offset - 520.0).abs() <= 1.0, "offset {offset}");
}

#[test]
fn negative_rtt_pong_keeps_prior_offset() {
    let mut h = Harness::connected(FakePlayer::detached());
    h.deliver("pong", None, json!({ "client_ts": T + 10 }), Some(T + 999), T);
    assert_eq!(h.engine.clock().offset_ms(), 0.0);
}

#[test]
fn host_broadcasts_only_first_of_two_quick_seeks() {
    let mut h = Harness::connected(FakePlayer::playing_at(10.0));
    h.room_state("me", 10.0, "playing", T, T);
    assert!(h.engine.is_host());
    h.drain();

    h.engine.player_mut().seek(50.0).unwrap();
    h.engine
        .handle_player_event(PlayerEvent::Seeked { position: 50.0 }, T + 1_000);
    h.engine.player_mut().seek(90.0).unwrap();
    h.engine
        .handle_player_event(PlayerEvent::Seeked { position: 90.0 }, T + 1_100);

    let seeks: Vec<f64> = h
        .drain()
        .into_iter()
        .filter_map(|m| match m {
            OutboundMessage::PlayerEvent {
                action: HostAction::Seek,
                position,
                ..
            } => Some(position),
            _ => None,
        })
        .collect();
    assert_eq!(seeks, vec![50.0]);
}

#[test]
fn host_heartbeat_and_immediate_reports() {
    let mut h = Harness::connected(FakePlayer::playing_at(10.0));
    h.room_state("me", 10.0, "playing", T, T);
    h.drain();

    h.engine.tick_heartbeat(T + 1_000);
    assert_eq!(
        h.drain(),
        vec![OutboundMessage::StateUpdate {
            position: 10.0,
            play_state: PlayState::Playing,
        }]
    );

    h.engine.player_mut().pause().unwrap();
    h.engine.handle_player_event(PlayerEvent::Pause, T + 1_200);
    let out = h.drain();
    assert!(out.contains(&OutboundMessage::StateUpdate {
        position: 10.0,
        play_state: PlayState::Paused,
    }));
    h.engine.tick_heartbeat(T + 2_000);
    assert!(h.drain().is_empty());
}

#[test]
fn host_ignores_its_own_sync_loop() {
    let mut h = Harness::connected(FakePlayer::playing_at(10.0));
    h.room_state("me", 500.0, "playing", T, T);
    assert_eq!(h.engine.tick_sync(T + 500), TickOutcome::Idle);
    assert!(h.player().seeks().is_empty());
}

#[test]
fn host_pause_clears_phases_and_pending_play() {
    let mut h = Harness::connected(FakePlayer::paused_at(0.0));
    h.room_state("host", 60.0, "playing", T, T);
    assert!(h.engine.phase().is_initial_catch_up());

    h.host_event(json!({ "action": "pause", "position": 61.0 }), T + 1_000, T + 1_000);
    assert_eq!(h.engine.phase(), SyncPhase::Normal);
    assert_eq!(h.engine.sync_status(), SyncStatus::Synced);
    assert!(h.player().status.unwrap().paused);
    assert_eq!(h.engine.tick_sync(T + 1_500), TickOutcome::Neutral);
}

#[test]
fn scheduled_play_fires_at_server_target() {
    let mut h = Harness::connected(FakePlayer::paused_at(10.0));
    h.room_state("host", 10.0, "paused", T, T);
    h.host_event(
        json!({ "action": "play", "position": 10.0, "target_server_ts": T + 1_000 }),
        T,
        T,
    );
    assert_eq!(h.engine.sync_status(), SyncStatus::PendingPlay);
    assert_eq!(h.engine.next_deadline(), Some(T + 1_000));
    assert!(h.player().status.unwrap().paused);

    // The host's accompanying state_update must not start playback early.
    h.deliver(
        "state_update",
        Some(ROOM),
        json!({ "position": 10.0, "play_state": "playing" }),
        Some(T + 5),
        T + 5,
    );
    assert!(h.player().status.unwrap().paused);
    assert_eq!(h.engine.sync_status(), SyncStatus::PendingPlay);
    let reference = h.engine.tracker().current().unwrap();
    assert_eq!(reference.position, 10.0);
    assert_eq!(reference.observed_at_server_ms, (T + 1_000) as f64);
    assert!(reference.play_state.is_playing());

    h.engine.fire_due(T + 999);
    assert!(h.player().status.unwrap().paused);
    h.engine.fire_due(T + 1_000);
    assert!(!h.player().status.unwrap().paused);
    assert_eq!(h.engine.sync_status(), SyncStatus::Syncing);
    assert!(matches!(h.engine.phase(), SyncPhase::Cooldown { .. }));
    assert_eq!(h.engine.next_deadline(), None);
}

#[test]
fn newer_play_replaces_scheduled_play_and_pause_cancels_it() {
    let mut h = Harness::connected(FakePlayer::paused_at(10.0));
    h.room_state("host", 10.0, "paused", T, T);
    h.host_event(json!({ "action": "play", "position": 10.0, "target_server_ts": T + 1_000 }), T, T);
    h.host_event(json!({ "action": "play", "position": 10.0, "target_server_ts": T + 3_000 }), T, T);
    assert_eq!(h.engine.next_deadline(), Some(T + 3_000));

    h.host_event(json!({ "action": "pause", "position": 10.0 }), T + 100, T + 100);
    assert_eq!(h.engine.next_deadline(), None);
}

#[test]
fn host_buffering_pauses_follower_and_keeps_cooldown() {
    let mut h = Harness::connected(FakePlayer::paused_at(40.0));
    h.room_state("host", 40.0, "paused", T, T);
    h.host_event(json!({ "action": "play", "position": 40.0 }), T, T);
    assert!(matches!(h.engine.phase(), SyncPhase::Cooldown { .. }));

    h.host_event(json!({ "action": "buffering", "position": 40.2 }), T + 200, T + 200);
    assert!(h.player().status.unwrap().paused);
    assert!(matches!(h.engine.phase(), SyncPhase::Cooldown { .. }));
    assert_eq!(h.engine.tracker().play_state(), Some(PlayState::Paused));
}

#[test]
fn state_update_playing_resumes_paused_follower_from_local_position() {
    let mut h = Harness::connected(FakePlayer::paused_at(40.0));
    h.room_state("host", 40.0, "paused", T, T);
    h.deliver(
        "state_update",
        Some(ROOM),
        json!({ "position": 50.0, "play_state": "playing" }),
        Some(T + 500),
        T + 500,
    );
    assert!(!h.player().status.unwrap().paused);
    assert_eq!(h.engine.tracker().last_position(), Some(40.0));
    assert!(h.engine.tracker().is_playing());
    assert!(matches!(h.engine.phase(), SyncPhase::Cooldown { .. }));
}

#[test]
fn state_update_position_is_held_during_cooldown() {
    let mut h = Harness::connected(FakePlayer::paused_at(40.0));
    h.room_state("host", 40.0, "paused", T, T);
    h.host_event(json!({ "action": "play", "position": 40.0 }), T, T);
    let reference = h.engine.tracker().current();

    h.deliver(
        "state_update",
        Some(ROOM),
        json!({ "position": 47.0, "play_state": "playing" }),
        Some(T + 1_000),
        T + 1_000,
    );
    assert_eq!(h.engine.tracker().current(), reference);

    h.deliver(
        "state_update",
        Some(ROOM),
        json!({ "position": 42.5, "play_state": "playing" }),
        Some(T + 2_500),
        T + 2_500,
    );
    assert_eq!(h.engine.tracker().last_position(), Some(42.5));
}

#[test]
fn messages_for_other_rooms_are_ignored() {
    let mut h = Harness::connected(FakePlayer::paused_at(10.0));
    h.room_state("host", 10.0, "paused", T, T);
    h.deliver(
        "player_event",
        Some("elsewhere"),
        json!({ "action": "seek", "position": 99.0 }),
        Some(T + 10),
        T + 10,
    );
    assert!(h.player().seeks().is_empty());
    assert_eq!(h.engine.tracker().last_position(), Some(10.0));
}

#[test]
fn malformed_frames_change_nothing() {
    let mut h = Harness::connected(FakePlayer::paused_at(10.0));
    h.room_state("host", 10.0, "paused", T, T);
    let before = h.engine.tracker().current();
    h.engine.handle_text("not json", T + 1);
    h.engine.handle_text(r#"{"room":"r1"}"#, T + 1);
    h.deliver("player_event", Some(ROOM), json!({ "action": "seek", "position": "NaN" }), Some(T + 2), T + 2);
    h.deliver("state_update", Some(ROOM), json!({ "position": -5, "play_state": "paused" }), Some(T + 3), T + 3);
    let after = h.engine.tracker().current().unwrap();
    assert_eq!(after.position, before.unwrap().position);
    assert!(h.player().seeks().is_empty());
}

#[test]
fn zero_position_is_applied() {
    let mut h = Harness::connected(FakePlayer::paused_at(30.0));
    h.room_state("host", 30.0, "paused", T, T);
    h.host_event(json!({ "action": "seek", "position": 0.0, "play_state": "paused" }), T + 10, T + 10);
    assert_eq!(h.player().seeks(), vec![0.0]);
    assert_eq!(h.engine.tracker().last_position(), Some(0.0));
}

#[test]
fn ready_is_sent_once_per_room() {
    let mut h = Harness::connected(FakePlayer::paused_at(0.0));
    h.room_state("host", 0.0, "paused", T, T);
    h.room_state("host", 0.0, "paused", T, T + 100);
    let readies = h
        .drain()
        .into_iter()
        .filter(|m| matches!(m, OutboundMessage::Ready { .. }))
        .count();
    assert_eq!(readies, 1);
}

#[test]
fn room_closed_clears_room_state_but_keeps_clock() {
    let mut h = Harness::connected(FakePlayer::paused_at(0.0));
    h.deliver("pong", None, json!({ "client_ts": T - 40 }), Some(T + 480), T);
    let offset = h.engine.clock().offset_ms();
    h.room_state("host", 20.0, "playing", T, T);

    h.deliver("room_closed", Some(ROOM), json!({ "reason": "host_left" }), Some(T + 5), T + 5);
    assert!(h.engine.room().is_none());
    assert!(h.engine.tracker().current().is_none());
    assert_eq!(h.engine.phase(), SyncPhase::Normal);
    assert_eq!(h.engine.clock().offset_ms(), offset);
    assert_eq!(h.engine.tick_sync(T + 500), TickOutcome::Idle);
}

#[test]
fn disconnect_clears_room_and_reconnect_rejoins() {
    let mut h = Harness::connected(FakePlayer::paused_at(0.0));
    h.engine.join_room(ROOM, T);
    h.room_state("host", 20.0, "playing", T, T);
    h.drain();

    h.engine.on_disconnected();
    assert!(h.engine.room().is_none());
    assert!(h.engine.tracker().current().is_none());
    assert_eq!(h.engine.clock().offset_ms(), 0.0);

    h.engine.on_connected(T + 5_000);
    let out = h.drain();
    assert!(matches!(out[0], OutboundMessage::Ping { client_ts } if client_ts == T + 5_000));
    assert_eq!(
        out[1],
        OutboundMessage::JoinRoom {
            room: ROOM.into(),
            user_name: "ana".into(),
        }
    );
}

#[test]
fn first_room_state_seeds_clock_without_probes() {
    let mut h = Harness::new(FakePlayer::paused_at(0.0));
    h.engine.on_connected(T);
    h.room_state("host", 5.0, "paused", T + 2_000, T);
    assert!(h.engine.clock().has_sync());
    assert_eq!(h.engine.clock().offset_ms(), 2_000.0);
}

#[test]
fn host_handover_via_room_state() {
    let mut h = Harness::connected(FakePlayer::playing_at(10.0));
    h.room_state("host", 10.0, "playing", T, T);
    assert!(!h.engine.is_host());
    h.room_state("me", 10.0, "playing", T + 1_000, T + 1_000);
    assert!(h.engine.is_host());
    assert_eq!(h.player().rate(), 1.0);
}

#[test]
fn follower_local_resume_after_buffering_enters_cooldown() {
    let mut h = Harness::connected(FakePlayer::playing_at(10.0));
    h.room_state("host", 10.0, "playing", T, T);
    h.host_event(json!({ "action": "pause", "position": 10.0 }), T, T);
    assert_eq!(h.engine.phase(), SyncPhase::Normal);

    h.engine.handle_player_event(PlayerEvent::Waiting, T + 100);
    h.engine.handle_player_event(PlayerEvent::Playing, T + 900);
    assert!(matches!(h.engine.phase(), SyncPhase::Cooldown { until_ms } if until_ms == T + 2_900));
}

#[test]
fn leave_room_sends_leave_and_resets() {
    let mut h = Harness::connected(FakePlayer::paused_at(0.0));
    h.engine.join_room(ROOM, T);
    h.room_state("host", 0.0, "paused", T, T);
    h.drain();
    h.engine.leave_room(T + 10);
    assert_eq!(h.drain(), vec![OutboundMessage::LeaveRoom]);
    assert!(h.engine.room().is_none());
}
