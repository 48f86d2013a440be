pub use crate::protocol::PlayState;

/// The host's playback as of a server-clock instant.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct AuthoritativeState {
    /// Seconds into the media.
    pub position: f64,
    pub play_state: PlayState,
    /// Server-clock milliseconds at which `position` was true.
    pub observed_at_server_ms: f64,
}

impl AuthoritativeState {
    pub fn new(position: f64, play_state: PlayState, observed_at_server_ms: f64) -> Self {
        Self {
            position,
            play_state,
            observed_at_server_ms,
        }
    }

    /// Same reference point, different play state.
    pub fn with_play_state(self, play_state: PlayState) -> Self {
        Self { play_state, ..self }
    }

    pub fn expected_position(&self, server_now_ms: f64) -> f64 {
        match self.play_state {
            PlayState::Paused => self.position,
            PlayState::Playing => {
                let elapsed_ms = (server_now_ms - self.observed_at_server_ms).max(0.0);
                self.position + elapsed_ms / 1000.0
            }
        }
    }
}

/// Sole owner of the last-known host state.
///
/// Every write replaces the whole [`AuthoritativeState`]; nothing else in
/// the engine holds a mutable copy.
#[derive(Debug, Clone, Default)]
pub struct AuthoritativeStateTracker {
    state: Option<AuthoritativeState>,
}

impl AuthoritativeStateTracker {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn apply_authoritative(&mut self, position: f64, play_state: PlayState, server_ts: f64) {
        self.replace(AuthoritativeState::new(position, play_state, server_ts));
    }

    pub fn replace(&mut self, state: AuthoritativeState) {
        self.state = Some(state);
    }

    /// Moves the reference point to `(position, server_now)` keeping the play
    /// state, so the next extrapolation starts from where the player was put.
    pub fn rebase(&mut self, position: f64, server_now_ms: f64) {
        let play_state = self.play_state().unwrap_or(PlayState::Paused);
        self.apply_authoritative(position, play_state, server_now_ms);
    }

    pub fn expected_position(&self, server_now_ms: f64) -> Option<f64> {
        self.state.map(|s| s.expected_position(server_now_ms))
    }

    pub fn current(&self) -> Option<AuthoritativeState> {
        self.state
    }

    pub fn play_state(&self) -> Option<PlayState> {
        self.state.map(|s| s.play_state)
    }

    pub fn last_position(&self) -> Option<f64> {
        self.state.map(|s| s.position)
    }

    pub fn is_playing(&self) -> bool {
        self.play_state().is_some_and(PlayState::is_playing)
    }

    pub fn clear(&mut self) {
        self.state = None;
    }
}
