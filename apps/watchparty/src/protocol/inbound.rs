use serde::Deserialize;
use serde::de::DeserializeOwned;
use serde_json::Value;

use super::{Envelope, HostAction, PlayState, ProtocolError, lenient};

/// Host playback as reported inside `room_state` and `state_update`.
#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct PlaybackReport {
    #[serde(default, deserialize_with = "lenient::position")]
    pub position: Option<f64>,
    #[serde(default, deserialize_with = "lenient::play_state")]
    pub play_state: Option<PlayState>,
}

#[derive(Debug, Clone, Default, PartialEq, Deserialize)]
pub struct RoomSnapshot {
    #[serde(default, deserialize_with = "lenient::string")]
    pub name: Option<String>,
    #[serde(default, deserialize_with = "lenient::string")]
    pub host_id: Option<String>,
    #[serde(default, deserialize_with = "lenient::count")]
    pub participant_count: Option<u32>,
    #[serde(default, deserialize_with = "lenient::string")]
    pub media_id: Option<String>,
    #[serde(default)]
    pub state: Option<PlaybackReport>,
}

#[derive(Debug, Clone, PartialEq, Deserialize)]
pub struct HostEventPayload {
    pub action: HostAction,
    #[serde(default, deserialize_with = "lenient::position")]
    pub position: Option<f64>,
    #[serde(default, deserialize_with = "lenient::play_state")]
    pub play_state: Option<PlayState>,
    /// Server-clock instant at which a coordinated `play` should start.
    #[serde(default, deserialize_with = "lenient::timestamp")]
    pub target_server_ts: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct PongPayload {
    #[serde(default, deserialize_with = "lenient::timestamp")]
    client_ts: Option<u64>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct HelloPayload {
    #[serde(default, deserialize_with = "lenient::string")]
    client_id: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct CountPayload {
    #[serde(default, deserialize_with = "lenient::count")]
    participant_count: Option<u32>,
}

#[derive(Debug, Clone, Default, Deserialize)]
struct ClosedPayload {
    #[serde(default, deserialize_with = "lenient::string")]
    reason: Option<String>,
}

#[derive(Debug, Clone, PartialEq)]
pub enum InboundKind {
    ClientHello { client_id: String },
    RoomState(RoomSnapshot),
    PlayerEvent(HostEventPayload),
    StateUpdate(PlaybackReport),
    Pong { client_ts: u64 },
    ParticipantsUpdate { participant_count: Option<u32> },
    ClientLeft { participant_count: Option<u32> },
    RoomClosed { reason: Option<String> },
    /// Types this engine does not consume (chat, room lists, ...).
    Other(String),
}

impl InboundKind {
    pub fn name(&self) -> &str {
        match self {
            InboundKind::ClientHello { .. } => "client_hello",
            InboundKind::RoomState(_) => "room_state",
            InboundKind::PlayerEvent(_) => "player_event",
            InboundKind::StateUpdate(_) => "state_update",
            InboundKind::Pong { .. } => "pong",
            InboundKind::ParticipantsUpdate { .. } => "participants_update",
            InboundKind::ClientLeft { .. } => "client_left",
            InboundKind::RoomClosed { .. } => "room_closed",
            InboundKind::Other(kind) => kind,
        }
    }
}

/// A classified relay message with its routing metadata.
#[derive(Debug, Clone, PartialEq)]
pub struct InboundMessage {
    pub room: Option<String>,
    pub client: Option<String>,
    pub server_ts: Option<u64>,
    pub kind: InboundKind,
}

impl InboundMessage {
    pub fn parse(text: &str) -> Result<Self, ProtocolError> {
        Self::classify(Envelope::parse(text)?)
    }

    pub fn classify(envelope: Envelope) -> Result<Self, ProtocolError> {
        let Envelope {
            msg_type,
            room,
            client,
            payload,
            server_ts,
            ..
        } = envelope;

        let kind = match msg_type.as_str() {
            "client_hello" => match decode::<HelloPayload>(&msg_type, payload)?.client_id {
                Some(client_id) => InboundKind::ClientHello { client_id },
                None => InboundKind::Other(msg_type),
            },
            "room_state" => InboundKind::RoomState(decode(&msg_type, payload)?),
            "player_event" => InboundKind::PlayerEvent(decode(&msg_type, payload)?),
            "state_update" => InboundKind::StateUpdate(decode(&msg_type, payload)?),
            "pong" => match decode::<PongPayload>(&msg_type, payload)?.client_ts {
                Some(client_ts) => InboundKind::Pong { client_ts },
                None => InboundKind::Other(msg_type),
            },
            "participants_update" => InboundKind::ParticipantsUpdate {
                participant_count: decode::<CountPayload>(&msg_type, payload)?.participant_count,
            },
            "client_left" => InboundKind::ClientLeft {
                participant_count: decode::<CountPayload>(&msg_type, payload)?.participant_count,
            },
            "room_closed" => InboundKind::RoomClosed {
                reason: decode::<ClosedPayload>(&msg_type, payload)?.reason,
            },
            _ => InboundKind::Other(msg_type),
        };

        Ok(Self {
            room: room.filter(|r| !r.is_empty()),
            client,
            server_ts,
            kind,
        })
    }
}

fn decode<T>(kind: &str, payload: Option<Value>) -> Result<T, ProtocolError>
where
    T: DeserializeOwned + Default,
{
    match payload {
        None | Some(Value::Null) => Ok(T::default()),
        Some(value) => serde_json::from_value(value).map_err(|source| ProtocolError::Payload {
            kind: kind.to_string(),
            source,
        }),
    }
}

// `player_event` without a payload has no action to apply.
impl Default for HostEventPayload {
    fn default() -> Self {
        Self {
            action: HostAction::Unknown,
            position: None,
            play_state: None,
            target_server_ts: None,
        }
    }
}
