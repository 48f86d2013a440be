//! mpv driven over its JSON IPC socket (`--input-ipc-server`).

use std::path::Path;
use std::sync::Arc;

use parking_lot::Mutex;
use serde_json::{Value, json};
use tokio::io::{AsyncBufReadExt, AsyncWriteExt, BufReader};
use tokio::net::UnixStream;
use tokio::sync::mpsc;
use tracing::{debug, trace, warn};

use super::{MediaPlayer, PlayerError, PlayerEvent, PlayerStatus};

const OBSERVED: [&str; 6] = [
    "pause",
    "time-pos",
    "speed",
    "seeking",
    "paused-for-cache",
    "idle-active",
];

#[derive(Debug, Clone, Default)]
struct MpvState {
    status: PlayerStatus,
    alive: bool,
    has_position: bool,
    idle: bool,
}

impl MpvState {
    fn connected() -> Self {
        Self {
            alive: true,
            ..Self::default()
        }
    }

    fn refresh_ready(&mut self) {
        self.status.ready = self.alive && self.has_position && !self.idle && !self.status.buffering;
    }

    /// Folds one IPC message into the state and maps it to a player event.
    fn apply(&mut self, message: &Value) -> Option<PlayerEvent> {
        let event = message.get("event")?.as_str()?;
        let outcome = match event {
            "property-change" => {
                let name = message.get("name")?.as_str()?;
                let data = message.get("data").unwrap_or(&Value::Null);
                self.property(name, data)
            }
            "seek" => {
                self.status.seeking = true;
                None
            }
            "playback-restart" => {
                let was_seeking = std::mem::take(&mut self.status.seeking);
                was_seeking.then_some(PlayerEvent::Seeked {
                    position: self.status.position,
                })
            }
            "end-file" | "shutdown" => {
                self.has_position = false;
                if event == "shutdown" {
                    self.alive = false;
                }
                Some(PlayerEvent::Detached)
            }
            _ => None,
        };
        self.refresh_ready();
        outcome
    }

    fn property(&mut self, name: &str, data: &Value) -> Option<PlayerEvent> {
        match name {
            "pause" => {
                let paused = data.as_bool()?;
                if paused == self.status.paused {
                    return None;
                }
                self.status.paused = paused;
                Some(if paused {
                    PlayerEvent::Pause
                } else {
                    PlayerEvent::Play
                })
            }
            "time-pos" => {
                match data.as_f64().filter(|p| p.is_finite() && *p >= 0.0) {
                    Some(position) => {
                        self.status.position = position;
                        self.has_position = true;
                    }
                    None => self.has_position = false,
                }
                None
            }
            "speed" => {
                if let Some(rate) = data.as_f64() {
                    self.status.rate = rate;
                }
                None
            }
            "seeking" => {
                self.status.seeking = data.as_bool().unwrap_or(false);
                None
            }
            "paused-for-cache" => {
                let buffering = data.as_bool()?;
                if buffering == self.status.buffering {
                    return None;
                }
                self.status.buffering = buffering;
                Some(if buffering {
                    PlayerEvent::Waiting
                } else {
                    PlayerEvent::Playing
                })
            }
            "idle-active" => {
                self.idle = data.as_bool().unwrap_or(false);
                None
            }
            _ => None,
        }
    }
}

/// Handle to a running mpv. Commands are fire-and-forget; status reads come
/// from observed properties and never block.
pub struct MpvPlayer {
    state: Arc<Mutex<MpvState>>,
    commands: mpsc::UnboundedSender<String>,
}

impl MpvPlayer {
    /// Connects to the IPC socket and returns the player plus its event feed.
    pub async fn connect(
        socket: &Path,
    ) -> Result<(Self, mpsc::UnboundedReceiver<PlayerEvent>), PlayerError> {
        let stream = UnixStream::connect(socket).await?;
        let (read_half, mut write_half) = stream.into_split();

        let state = Arc::new(Mutex::new(MpvState::connected()));
        let (cmd_tx, mut cmd_rx) = mpsc::unbounded_channel::<String>();
        let (event_tx, event_rx) = mpsc::unbounded_channel::<PlayerEvent>();

        tokio::spawn(async move {
            while let Some(line) = cmd_rx.recv().await {
                trace!(target: "watchparty::player", command = %line, "mpv command");
                if write_half.write_all(line.as_bytes()).await.is_err()
                    || write_half.write_all(b"\n").await.is_err()
                {
                    break;
                }
            }
        });

        let reader_state = state.clone();
        tokio::spawn(async move {
            let mut lines = BufReader::new(read_half).lines();
            loop {
                match lines.next_line().await {
                    Ok(Some(line)) => {
                        let Ok(message) = serde_json::from_str::<Value>(&line) else {
                            continue;
                        };
                        if let Some(error) = message.get("error").and_then(Value::as_str) {
                            if error != "success" {
                                debug!(target: "watchparty::player", error, "mpv rejected a command");
                            }
                        }
                        let event = reader_state.lock().apply(&message);
                        if let Some(event) = event {
                            if event_tx.send(event).is_err() {
                                break;
                            }
                        }
                    }
                    Ok(None) => break,
                    Err(err) => {
                        warn!(target: "watchparty::player", error = %err, "mpv ipc read failed");
                        break;
                    }
                }
            }
            reader_state.lock().alive = false;
            let _ = event_tx.send(PlayerEvent::Detached);
        });

        let player = Self {
            state,
            commands: cmd_tx,
        };
        for (id, name) in OBSERVED.iter().enumerate() {
            player.command(json!(["observe_property", id + 1, name]))?;
        }
        Ok((player, event_rx))
    }

    fn command(&self, command: Value) -> Result<(), PlayerError> {
        let line = serde_json::to_string(&json!({ "command": command }))?;
        self.commands.send(line).map_err(|_| PlayerError::Closed)
    }

    fn set_property(&self, name: &str, value: Value) -> Result<(), PlayerError> {
        if !self.state.lock().alive {
            return Err(PlayerError::Unavailable);
        }
        self.command(json!(["set_property", name, value]))
    }
}

impl MediaPlayer for MpvPlayer {
    fn status(&self) -> Option<PlayerStatus> {
        let state = self.state.lock();
        (state.alive && !state.idle).then_some(state.status)
    }

    fn seek(&mut self, position: f64) -> Result<(), PlayerError> {
        self.set_property("time-pos", json!(position))
    }

    fn play(&mut self) -> Result<(), PlayerError> {
        self.set_property("pause", json!(false))
    }

    fn pause(&mut self) -> Result<(), PlayerError> {
        self.set_property("pause", json!(true))
    }

    fn set_rate(&mut self, rate: f64) -> Result<(), PlayerError> {
        self.set_property("speed", json!(rate))
    }
}
