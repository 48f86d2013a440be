//! In-memory player used by unit and integration tests.

use super::{MediaPlayer, PlayerError, PlayerStatus};

#[derive(Debug, Clone, PartialEq)]
pub enum PlayerCommand {
    Seek(f64),
    Play,
    Pause,
    Rate(f64),
}

/// Records every command and applies it to its own status, like a player
/// that obeys instantly.
#[derive(Debug, Clone, Default)]
pub struct FakePlayer {
    pub status: Option<PlayerStatus>,
    pub commands: Vec<PlayerCommand>,
    /// When set, seeks are recorded but the playhead does not move.
    pub ignore_seeks: bool,
}

impl FakePlayer {
    /// A loaded, playing player at `position`.
    pub fn playing_at(position: f64) -> Self {
        Self {
            status: Some(PlayerStatus {
                position,
                paused: false,
                ready: true,
                ..PlayerStatus::default()
            }),
            ..Self::default()
        }
    }

    pub fn paused_at(position: f64) -> Self {
        Self {
            status: Some(PlayerStatus {
                position,
                paused: true,
                ready: true,
                ..PlayerStatus::default()
            }),
            ..Self::default()
        }
    }

    pub fn detached() -> Self {
        Self::default()
    }

    pub fn position(&self) -> f64 {
        self.status.map(|s| s.position).unwrap_or_default()
    }

    pub fn rate(&self) -> f64 {
        self.status.map(|s| s.rate).unwrap_or(1.0)
    }

    /// Advances the playhead as a real player would over `elapsed_ms`.
    pub fn advance(&mut self, elapsed_ms: u64) {
        if let Some(status) = self.status.as_mut() {
            if status.is_rolling() {
                status.position += elapsed_ms as f64 / 1000.0 * status.rate;
            }
        }
    }

    pub fn set_buffering(&mut self, buffering: bool) {
        if let Some(status) = self.status.as_mut() {
            status.buffering = buffering;
            status.ready = !buffering;
        }
    }

    pub fn seeks(&self) -> Vec<f64> {
        self.commands
            .iter()
            .filter_map(|c| match c {
                PlayerCommand::Seek(pos) => Some(*pos),
                _ => None,
            })
            .collect()
    }

    pub fn last_rate(&self) -> Option<f64> {
        self.commands.iter().rev().find_map(|c| match c {
            PlayerCommand::Rate(rate) => Some(*rate),
            _ => None,
        })
    }

    fn attached(&mut self) -> Result<&mut PlayerStatus, PlayerError> {
        self.status.as_mut().ok_or(PlayerError::Unavailable)
    }
}

impl MediaPlayer for FakePlayer {
    fn status(&self) -> Option<PlayerStatus> {
        self.status
    }

    fn seek(&mut self, position: f64) -> Result<(), PlayerError> {
        let ignore = self.ignore_seeks;
        let status = self.attached()?;
        if !ignore {
            status.position = position;
        }
        self.commands.push(PlayerCommand::Seek(position));
        Ok(())
    }

    fn play(&mut self) -> Result<(), PlayerError> {
        self.attached()?.paused = false;
        self.commands.push(PlayerCommand::Play);
        Ok(())
    }

    fn pause(&mut self) -> Result<(), PlayerError> {
        self.attached()?.paused = true;
        self.commands.push(PlayerCommand::Pause);
        Ok(())
    }

    fn set_rate(&mut self, rate: f64) -> Result<(), PlayerError> {
        self.attached()?.rate = rate;
        self.commands.push(PlayerCommand::Rate(rate));
        Ok(())
    }
}
