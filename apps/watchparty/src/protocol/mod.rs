//! Relay wire format.
//!
//! Every frame is a JSON text message shaped like
//! `{ type, room, client?, payload, ts, server_ts? }`. The relay stamps
//! `server_ts` on everything it forwards.

use serde::{Deserialize, Serialize};
use serde_json::Value;
use thiserror::Error;

mod inbound;
pub(crate) mod lenient;
mod outbound;

pub use inbound::{
    HostEventPayload, InboundKind, InboundMessage, PlaybackReport, RoomSnapshot,
};
pub use outbound::{OutboundMessage, Outgoing};

#[derive(Debug, Error)]
pub enum ProtocolError {
    #[error("invalid json: {0}")]
    Json(#[from] serde_json::Error),
    #[error("message has no type")]
    MissingType,
    #[error("malformed {kind} payload: {source}")]
    Payload {
        kind: String,
        source: serde_json::Error,
    },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum PlayState {
    Playing,
    Paused,
}

impl PlayState {
    pub fn from_paused(paused: bool) -> Self {
        if paused {
            PlayState::Paused
        } else {
            PlayState::Playing
        }
    }

    pub fn is_playing(self) -> bool {
        matches!(self, PlayState::Playing)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            PlayState::Playing => "playing",
            PlayState::Paused => "paused",
        }
    }
}

/// Discrete host action carried by `player_event`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum HostAction {
    Play,
    Pause,
    Seek,
    Buffering,
    #[serde(other)]
    Unknown,
}

#[derive(Serialize, Deserialize, Debug, Clone, PartialEq)]
pub struct Envelope {
    #[serde(rename = "type", default)]
    pub msg_type: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub room: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub client: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub payload: Option<Value>,
    #[serde(default, deserialize_with = "lenient::timestamp")]
    pub ts: Option<u64>,
    #[serde(
        default,
        deserialize_with = "lenient::timestamp",
        skip_serializing_if = "Option::is_none"
    )]
    pub server_ts: Option<u64>,
}

impl Envelope {
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        let envelope: Envelope = serde_json::from_str(text)?;
        if envelope.msg_type.is_empty() {
            return Err(ProtocolError::MissingType);
        }
        Ok(envelope)
    }

    pub fn to_json(&self) -> Result<String, ProtocolError> {
        Ok(serde_json::to_string(self)?)
    }
}
