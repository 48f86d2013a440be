//! Media player capability.
//!
//! The engine never talks to a concrete player; it reads a [`PlayerStatus`]
//! snapshot, issues fire-and-forget commands, and receives
//! [`PlayerEvent`]s through a channel owned by the adapter.

use thiserror::Error;

#[cfg(unix)]
pub mod mpv;
pub mod testing;

#[derive(Debug, Error)]
pub enum PlayerError {
    #[error("player is not available")]
    Unavailable,
    #[error("player connection closed")]
    Closed,
    #[error("player io error: {0}")]
    Io(#[from] std::io::Error),
    #[error("failed to encode player command: {0}")]
    Encode(#[from] serde_json::Error),
}

/// Point-in-time view of the local player.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct PlayerStatus {
    pub position: f64,
    pub paused: bool,
    /// Enough media is loaded to play from the current position.
    pub ready: bool,
    pub buffering: bool,
    pub seeking: bool,
    pub rate: f64,
}

impl PlayerStatus {
    /// The controller only corrects a player that is actually rolling.
    pub fn is_rolling(&self) -> bool {
        !self.paused && self.ready && !self.buffering
    }
}

impl Default for PlayerStatus {
    fn default() -> Self {
        Self {
            position: 0.0,
            paused: true,
            ready: false,
            buffering: false,
            seeking: false,
            rate: 1.0,
        }
    }
}

/// Events a player adapter reports, mirroring the media element lifecycle.
#[derive(Debug, Clone, Copy, PartialEq)]
pub enum PlayerEvent {
    Play,
    Pause,
    /// A seek finished; the position is the new playhead.
    Seeked { position: f64 },
    /// Playback stalled waiting for data.
    Waiting,
    /// Enough data is available again.
    CanPlay,
    /// Playback actually started (or resumed after a stall).
    Playing,
    /// The player went away (closed, crashed, media unloaded).
    Detached,
}

pub trait MediaPlayer {
    /// `None` while no player is attached.
    fn status(&self) -> Option<PlayerStatus>;
    fn seek(&mut self, position: f64) -> Result<(), PlayerError>;
    fn play(&mut self) -> Result<(), PlayerError>;
    fn pause(&mut self) -> Result<(), PlayerError>;
    fn set_rate(&mut self, rate: f64) -> Result<(), PlayerError>;
}

impl<P: MediaPlayer + ?Sized> MediaPlayer for Box<P> {
    fn status(&self) -> Option<PlayerStatus> {
        (**self).status()
    }

    fn seek(&mut self, position: f64) -> Result<(), PlayerError> {
        (**self).seek(position)
    }

    fn play(&mut self) -> Result<(), PlayerError> {
        (**self).play()
    }

    fn pause(&mut self) -> Result<(), PlayerError> {
        (**self).pause()
    }

    fn set_rate(&mut self, rate: f64) -> Result<(), PlayerError> {
        (**self).set_rate(rate)
    }
}
