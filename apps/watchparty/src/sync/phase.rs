use crate::config::SyncTuning;

/// Follower grace periods. Both non-normal phases are time bounded.
#[derive(Debug, Clone, Copy, Default, PartialEq)]
pub enum SyncPhase {
    #[default]
    Normal,
    /// Joined a room whose host was already playing.
    InitialCatchUp {
        /// Lead-compensated position we aimed for on join.
        target: f64,
        /// Local ms until which heartbeat positions are not applied.
        settle_until_ms: u64,
        /// Local ms after which the phase ends regardless of drift.
        deadline_ms: u64,
    },
    /// Just resumed; let rate correction absorb the residual gap.
    Cooldown { until_ms: u64 },
}

impl SyncPhase {
    pub fn initial_catch_up(target: f64, now_ms: u64, tuning: &SyncTuning) -> Self {
        SyncPhase::InitialCatchUp {
            target,
            settle_until_ms: now_ms + tuning.initial_settle_ms,
            deadline_ms: now_ms + tuning.initial_max_ms,
        }
    }

    /// Drops an expired cooldown. The initial catch-up is retired by the
    /// drift controller, which also needs to see its timeout.
    pub fn expire(&mut self, now_ms: u64) {
        if let SyncPhase::Cooldown { until_ms } = *self {
            if now_ms >= until_ms {
                *self = SyncPhase::Normal;
            }
        }
    }

    /// Starts a cooldown, or stretches the settle window of a running
    /// initial catch-up.
    pub fn enter_cooldown(&mut self, now_ms: u64, duration_ms: u64) {
        let until = now_ms + duration_ms;
        match self {
            SyncPhase::InitialCatchUp {
                settle_until_ms, ..
            } => *settle_until_ms = (*settle_until_ms).max(until),
            SyncPhase::Cooldown { until_ms } => *until_ms = (*until_ms).max(until),
            SyncPhase::Normal => *self = SyncPhase::Cooldown { until_ms: until },
        }
    }

    pub fn is_initial_catch_up(&self) -> bool {
        matches!(self, SyncPhase::InitialCatchUp { .. })
    }

    pub fn in_cooldown(&self, now_ms: u64) -> bool {
        matches!(self, SyncPhase::Cooldown { until_ms } if now_ms < *until_ms)
    }

    /// Hard seeks from the soft ceiling are withheld in either grace period.
    pub fn blocks_hard_seek(&self, now_ms: u64) -> bool {
        self.is_initial_catch_up() || self.in_cooldown(now_ms)
    }

    /// Heartbeat positions are not applied verbatim while settling.
    pub fn ignores_position_updates(&self, now_ms: u64) -> bool {
        match *self {
            SyncPhase::Normal => false,
            SyncPhase::Cooldown { until_ms } => now_ms < until_ms,
            SyncPhase::InitialCatchUp {
                settle_until_ms, ..
            } => now_ms < settle_until_ms,
        }
    }

    pub fn label(&self) -> &'static str {
        match self {
            SyncPhase::Normal => "normal",
            SyncPhase::InitialCatchUp { .. } => "initial_catch_up",
            SyncPhase::Cooldown { .. } => "cooldown",
        }
    }
}
