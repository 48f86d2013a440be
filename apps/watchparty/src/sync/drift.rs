use tracing::{debug, info};

use super::authority::AuthoritativeStateTracker;
use super::clock::ClockSynchronizer;
use super::echo::EchoSuppressor;
use super::phase::SyncPhase;
use crate::config::SyncTuning;
use crate::metrics;
use crate::player::MediaPlayer;

/// Drift beyond which a withheld hard seek is logged.
const WITHHELD_SEEK_LOG_SECS: f64 = 5.0;
/// Drift beyond which rate corrections are logged.
const RATE_LOG_SECS: f64 = 0.5;

/// Coarse sync indicator for presentation layers.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SyncStatus {
    #[default]
    Synced,
    Syncing,
    /// A host `play` is scheduled for a future server instant.
    PendingPlay,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SeekReason {
    /// Drift beyond the catch-up ceiling right after joining.
    CatchUpCeiling,
    /// Drift beyond the soft ceiling in normal operation.
    SoftCeiling,
}

impl SeekReason {
    fn label(self) -> &'static str {
        match self {
            SeekReason::CatchUpCeiling => "catch_up_ceiling",
            SeekReason::SoftCeiling => "soft_ceiling",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq)]
pub enum TickOutcome {
    /// No player attached or no authoritative state yet.
    Idle,
    /// Host not playing or local player not rolling; rate held at 1.0.
    Neutral,
    InSync { drift: f64 },
    HardSeek {
        target: f64,
        drift: f64,
        reason: SeekReason,
    },
    RateAdjusted { rate: f64, drift: f64 },
}

/// Follower-side periodic correction.
///
/// Small drift is absorbed by nudging the playback rate along a
/// square-root curve; large drift outside the grace phases is cut with a
/// hard seek.
#[derive(Debug, Clone)]
pub struct DriftController {
    tuning: SyncTuning,
    phase: SyncPhase,
    status: SyncStatus,
    last_drift: f64,
}

impl DriftController {
    pub fn new(tuning: SyncTuning) -> Self {
        Self {
            tuning,
            phase: SyncPhase::Normal,
            status: SyncStatus::Synced,
            last_drift: 0.0,
        }
    }

    pub fn phase(&self) -> SyncPhase {
        self.phase
    }

    pub fn status(&self) -> SyncStatus {
        self.status
    }

    pub fn set_status(&mut self, status: SyncStatus) {
        self.status = status;
    }

    pub fn last_drift(&self) -> f64 {
        self.last_drift
    }

    pub fn begin_initial_catch_up(&mut self, target: f64, now_ms: u64) {
        self.phase = SyncPhase::initial_catch_up(target, now_ms, &self.tuning);
        info!(
            target: "watchparty::sync",
            target_pos = target,
            settle_ms = self.tuning.initial_settle_ms,
            max_ms = self.tuning.initial_max_ms,
            "initial catch-up started"
        );
    }

    pub fn enter_cooldown(&mut self, now_ms: u64) {
        self.phase
            .enter_cooldown(now_ms, self.tuning.resume_cooldown_ms);
    }

    pub fn clear_phase(&mut self) {
        self.phase = SyncPhase::Normal;
    }

    pub fn ignores_position_updates(&mut self, now_ms: u64) -> bool {
        self.phase.expire(now_ms);
        self.phase.ignores_position_updates(now_ms)
    }

    pub fn reset(&mut self) {
        self.phase = SyncPhase::Normal;
        self.status = SyncStatus::Synced;
        self.last_drift = 0.0;
    }

    /// Rate for a drift inside the proportional band.
    pub fn correction_rate(&self, drift: f64) -> f64 {
        let correction = drift.signum() * drift.abs().sqrt() * self.tuning.drift_gain;
        (1.0 + correction).clamp(self.tuning.rate_min, self.tuning.rate_max)
    }

    pub fn tick<P: MediaPlayer + ?Sized>(
        &mut self,
        now_ms: u64,
        clock: &ClockSynchronizer,
        tracker: &mut AuthoritativeStateTracker,
        echo: &mut EchoSuppressor,
        player: &mut P,
    ) -> TickOutcome {
        self.phase.expire(now_ms);

        let Some(status) = player.status() else {
            return TickOutcome::Idle;
        };
        if tracker.current().is_none() {
            return TickOutcome::Idle;
        }
        if !tracker.is_playing() || !status.is_rolling() {
            if status.rate != 1.0 {
                apply_rate(player, 1.0);
            }
            return TickOutcome::Neutral;
        }

        let server_now = clock.server_now(now_ms);
        let Some(expected) = tracker.expected_position(server_now) else {
            return TickOutcome::Idle;
        };
        let drift = expected - status.position;
        let abs_drift = drift.abs();
        self.last_drift = drift;
        metrics::DRIFT_MILLIS.set((drift * 1000.0).round() as i64);

        if let SyncPhase::InitialCatchUp { deadline_ms, .. } = self.phase {
            if abs_drift > self.tuning.initial_max_drift_secs {
                self.phase = SyncPhase::Normal;
                info!(
                    target: "watchparty::sync",
                    drift,
                    local_pos = status.position,
                    expected,
                    "catch-up drift too large, seeking"
                );
                return self.hard_seek(
                    expected,
                    drift,
                    SeekReason::CatchUpCeiling,
                    now_ms,
                    server_now,
                    tracker,
                    echo,
                    player,
                );
            }
            if abs_drift < self.tuning.initial_exit_drift_secs {
                self.phase = SyncPhase::Normal;
                info!(target: "watchparty::sync", drift, "initial catch-up complete");
            } else if now_ms >= deadline_ms {
                self.phase = SyncPhase::Normal;
                info!(target: "watchparty::sync", drift, "initial catch-up timed out");
            }
        }

        if abs_drift < self.tuning.drift_deadzone_secs {
            if status.rate != 1.0 {
                apply_rate(player, 1.0);
            }
            if self.status == SyncStatus::Syncing {
                self.status = SyncStatus::Synced;
            }
            return TickOutcome::InSync { drift };
        }

        if abs_drift >= self.tuning.drift_soft_max_secs {
            if !self.phase.blocks_hard_seek(now_ms) {
                info!(
                    target: "watchparty::sync",
                    expected,
                    actual = status.position,
                    drift,
                    "hard seek"
                );
                return self.hard_seek(
                    expected,
                    drift,
                    SeekReason::SoftCeiling,
                    now_ms,
                    server_now,
                    tracker,
                    echo,
                    player,
                );
            }
            if abs_drift > WITHHELD_SEEK_LOG_SECS {
                debug!(
                    target: "watchparty::sync",
                    drift,
                    phase = self.phase.label(),
                    "hard seek withheld during grace phase"
                );
            }
        }

        let rate = self.correction_rate(drift);
        if abs_drift > RATE_LOG_SECS {
            debug!(
                target: "watchparty::sync",
                expected,
                actual = status.position,
                drift,
                rate,
                "rate correction"
            );
        }
        apply_rate(player, rate);
        metrics::RATE_ADJUSTMENTS.inc();
        if self.status == SyncStatus::Synced {
            self.status = SyncStatus::Syncing;
        }
        TickOutcome::RateAdjusted { rate, drift }
    }

    #[allow(clippy::too_many_arguments)]
    fn hard_seek<P: MediaPlayer + ?Sized>(
        &mut self,
        target: f64,
        drift: f64,
        reason: SeekReason,
        now_ms: u64,
        server_now: f64,
        tracker: &mut AuthoritativeStateTracker,
        echo: &mut EchoSuppressor,
        player: &mut P,
    ) -> TickOutcome {
        echo.suppress(now_ms, self.tuning.suppress_ms);
        if let Err(err) = player.seek(target) {
            debug!(target: "watchparty::sync", error = %err, "seek not applied");
        }
        apply_rate(player, 1.0);
        tracker.rebase(target, server_now);
        self.status = SyncStatus::Syncing;
        metrics::HARD_SEEKS.with_label_values(&[reason.label()]).inc();
        TickOutcome::HardSeek {
            target,
            drift,
            reason,
        }
    }
}

fn apply_rate<P: MediaPlayer + ?Sized>(player: &mut P, rate: f64) {
    if let Err(err) = player.set_rate(rate) {
        debug!(target: "watchparty::sync", error = %err, rate, "rate not applied");
    }
}
