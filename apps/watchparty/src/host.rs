//! Host-side reporting of local playback to the room.

use tracing::debug;

use crate::config::SyncTuning;
use crate::metrics;
use crate::player::{PlayerEvent, PlayerStatus};
use crate::protocol::{HostAction, OutboundMessage, PlayState};
use crate::sync::EchoSuppressor;

#[derive(Debug, Clone, Copy, PartialEq)]
struct LastReport {
    position: f64,
    playing: bool,
    at_ms: u64,
}

impl LastReport {
    fn position_at(&self, now_ms: u64) -> f64 {
        if self.playing {
            self.position + now_ms.saturating_sub(self.at_ms) as f64 / 1000.0
        } else {
            self.position
        }
    }
}

/// Turns local player events into authoritative reports.
///
/// Events that land inside the echo window are treated as our own doing
/// and never reported. Seeks are throttled and small ones are dropped.
#[derive(Debug, Clone)]
pub struct HostReporter {
    seek_threshold_secs: f64,
    seek_min_interval_ms: u64,
    last_seek_sent_at: Option<u64>,
    last_report: Option<LastReport>,
    buffering: bool,
}

impl HostReporter {
    pub fn new(tuning: &SyncTuning) -> Self {
        Self {
            seek_threshold_secs: tuning.seek_threshold_secs,
            seek_min_interval_ms: tuning.seek_report_min_interval_ms,
            last_seek_sent_at: None,
            last_report: None,
            buffering: false,
        }
    }

    pub fn reset(&mut self) {
        self.last_seek_sent_at = None;
        self.last_report = None;
        self.buffering = false;
    }

    pub fn is_buffering(&self) -> bool {
        self.buffering
    }

    pub fn on_player_event(
        &mut self,
        event: PlayerEvent,
        status: Option<PlayerStatus>,
        now_ms: u64,
        echo: &EchoSuppressor,
    ) -> Vec<OutboundMessage> {
        let suppressed = echo.is_suppressed(now_ms);
        let position = status.map(|s| s.position);

        match event {
            PlayerEvent::Waiting => {
                if self.buffering {
                    return Vec::new();
                }
                self.buffering = true;
                if suppressed {
                    return Vec::new();
                }
                let Some(position) = position else {
                    return Vec::new();
                };
                self.record(position, false, now_ms);
                self.count("buffering");
                debug!(target: "watchparty::host", position, "reporting buffering");
                vec![OutboundMessage::PlayerEvent {
                    action: HostAction::Buffering,
                    position,
                    play_state: None,
                }]
            }
            PlayerEvent::Playing | PlayerEvent::CanPlay => {
                if !std::mem::take(&mut self.buffering) || suppressed {
                    return Vec::new();
                }
                match status {
                    Some(status) if !status.paused => {
                        debug!(target: "watchparty::host", position = status.position, "resumed after buffering");
                        self.discrete(HostAction::Play, status.position, PlayState::Playing, now_ms)
                    }
                    _ => Vec::new(),
                }
            }
            PlayerEvent::Play | PlayerEvent::Pause if suppressed => Vec::new(),
            // Toggles during a seek or a stall come from the player, not the user.
            PlayerEvent::Play | PlayerEvent::Pause if status.is_some_and(|s| s.seeking) => {
                Vec::new()
            }
            PlayerEvent::Pause if self.buffering => Vec::new(),
            PlayerEvent::Play => match position {
                Some(position) => self.discrete(HostAction::Play, position, PlayState::Playing, now_ms),
                None => Vec::new(),
            },
            PlayerEvent::Pause => match position {
                Some(position) => self.discrete(HostAction::Pause, position, PlayState::Paused, now_ms),
                None => Vec::new(),
            },
            PlayerEvent::Seeked { position } => {
                if suppressed {
                    return Vec::new();
                }
                if let Some(sent_at) = self.last_seek_sent_at {
                    if now_ms.saturating_sub(sent_at) < self.seek_min_interval_ms {
                        debug!(target: "watchparty::host", position, "seek report throttled");
                        return Vec::new();
                    }
                }
                if let Some(last) = self.last_report {
                    if (position - last.position_at(now_ms)).abs() < self.seek_threshold_secs {
                        return Vec::new();
                    }
                }
                let state = match status {
                    Some(status) => PlayState::from_paused(status.paused),
                    None => PlayState::Playing,
                };
                self.last_seek_sent_at = Some(now_ms);
                self.discrete(HostAction::Seek, position, state, now_ms)
            }
            PlayerEvent::Detached => {
                self.buffering = false;
                Vec::new()
            }
        }
    }

    /// Periodic `state_update`, only while actually rolling.
    pub fn heartbeat(
        &mut self,
        status: Option<PlayerStatus>,
        now_ms: u64,
        echo: &EchoSuppressor,
    ) -> Option<OutboundMessage> {
        let status = status?;
        if status.paused
            || status.buffering
            || status.seeking
            || self.buffering
            || echo.is_suppressed(now_ms)
        {
            return None;
        }
        self.record(status.position, true, now_ms);
        self.count("heartbeat");
        Some(OutboundMessage::StateUpdate {
            position: status.position,
            play_state: PlayState::Playing,
        })
    }

    fn discrete(
        &mut self,
        action: HostAction,
        position: f64,
        play_state: PlayState,
        now_ms: u64,
    ) -> Vec<OutboundMessage> {
        self.record(position, play_state.is_playing(), now_ms);
        self.count(match action {
            HostAction::Play => "play",
            HostAction::Pause => "pause",
            HostAction::Seek => "seek",
            HostAction::Buffering => "buffering",
            HostAction::Unknown => "unknown",
        });
        debug!(
            target: "watchparty::host",
            ?action,
            position,
            play_state = play_state.as_str(),
            "reporting"
        );
        vec![
            OutboundMessage::PlayerEvent {
                action,
                position,
                play_state: Some(play_state),
            },
            OutboundMessage::StateUpdate {
                position,
                play_state,
            },
        ]
    }

    fn record(&mut self, position: f64, playing: bool, now_ms: u64) {
        self.last_report = Some(LastReport {
            position,
            playing,
            at_ms: now_ms,
        });
    }

    fn count(&self, kind: &str) {
        metrics::HOST_REPORTS.with_label_values(&[kind]).inc();
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn rolling(position: f64) -> Option<PlayerStatus> {
        Some(PlayerStatus {
            position,
            paused: false,
            ready: true,
            ..PlayerStatus::default()
        })
    }

    fn reporter() -> HostReporter {
        HostReporter::new(&SyncTuning::default())
    }

    #[test]
    fn seeks_inside_min_interval_are_dropped() {
        let mut host = reporter();
        let echo = EchoSuppressor::new();
        let first = host.on_player_event(PlayerEvent::Seeked { position: 50.0 }, rolling(50.0), 1_000, &echo);
        let second = host.on_player_event(PlayerEvent::Seeked { position: 90.0 }, rolling(90.0), 1_100, &echo);
        assert_eq!(first.len(), 2);
        assert!(matches!(
            first[0],
            OutboundMessage::PlayerEvent { action: HostAction::Seek, position, .. } if position == 50.0
        ));
        assert!(second.is_empty());

        let third = host.on_player_event(PlayerEvent::Seeked { position: 90.0 }, rolling(90.0), 1_400, &echo);
        assert_eq!(third.len(), 2);
    }

    #[test]
    fn small_seeks_are_not_broadcast() {
        let mut host = reporter();
        let echo = EchoSuppressor::new();
        assert!(host.heartbeat(rolling(10.0), 0, &echo).is_some());
        // 500ms later the playhead should be ~10.5; a seek to 10.9 is noise.
        let out = host.on_player_event(PlayerEvent::Seeked { position: 10.9 }, rolling(10.9), 500, &echo);
        assert!(out.is_empty());
    }

    #[test]
    fn suppressed_events_are_ignored() {
        let mut host = reporter();
        let mut echo = EchoSuppressor::new();
        echo.suppress(0, 2_000);
        assert!(host.on_player_event(PlayerEvent::Play, rolling(3.0), 100, &echo).is_empty());
        assert!(host.on_player_event(PlayerEvent::Seeked { position: 40.0 }, rolling(40.0), 100, &echo).is_empty());
        assert!(host.heartbeat(rolling(40.0), 100, &echo).is_none());
        assert!(!host.on_player_event(PlayerEvent::Pause, rolling(40.0), 2_000, &echo).is_empty());
    }

    #[test]
    fn pause_reports_immediately() {
        let mut host = reporter();
        let echo = EchoSuppressor::new();
        let out = host.on_player_event(PlayerEvent::Pause, rolling(12.5), 0, &echo);
        assert_eq!(
            out,
            vec![
                OutboundMessage::PlayerEvent {
                    action: HostAction::Pause,
                    position: 12.5,
                    play_state: Some(PlayState::Paused),
                },
                OutboundMessage::StateUpdate {
                    position: 12.5,
                    play_state: PlayState::Paused,
                },
            ]
        );
    }

    #[test]
    fn buffering_is_relayed_and_resume_reports_play() {
        let mut host = reporter();
        let echo = EchoSuppressor::new();
        let out = host.on_player_event(PlayerEvent::Waiting, rolling(30.0), 0, &echo);
        assert_eq!(
            out,
            vec![OutboundMessage::PlayerEvent {
                action: HostAction::Buffering,
                position: 30.0,
                play_state: None,
            }]
        );
        assert!(host.heartbeat(rolling(30.0), 500, &echo).is_none());

        let resumed = host.on_player_event(PlayerEvent::Playing, rolling(30.0), 800, &echo);
        assert!(matches!(
            resumed.first(),
            Some(OutboundMessage::PlayerEvent { action: HostAction::Play, .. })
        ));
        assert!(host.heartbeat(rolling(30.2), 1_000, &echo).is_some());
    }

    #[test]
    fn toggles_while_seeking_or_stalled_are_not_reported() {
        let mut host = reporter();
        let echo = EchoSuppressor::new();
        let mut seeking = rolling(20.0).unwrap();
        seeking.seeking = true;
        assert!(host.on_player_event(PlayerEvent::Pause, Some(seeking), 0, &echo).is_empty());
        assert!(host.on_player_event(PlayerEvent::Play, Some(seeking), 50, &echo).is_empty());

        host.on_player_event(PlayerEvent::Waiting, rolling(20.0), 100, &echo);
        assert!(host.on_player_event(PlayerEvent::Pause, rolling(20.0), 150, &echo).is_empty());

        host.on_player_event(PlayerEvent::Playing, rolling(20.0), 400, &echo);
        assert_eq!(
            host.on_player_event(PlayerEvent::Pause, rolling(20.3), 700, &echo).len(),
            2
        );
    }

    #[test]
    fn heartbeat_skips_paused_and_seeking() {
        let mut host = reporter();
        let echo = EchoSuppressor::new();
        let mut status = rolling(5.0).unwrap();
        status.seeking = true;
        assert!(host.heartbeat(Some(status), 0, &echo).is_none());
        status.seeking = false;
        status.paused = true;
        assert!(host.heartbeat(Some(status), 0, &echo).is_none());
        assert!(host.heartbeat(None, 0, &echo).is_none());
    }
}
