use serde_json::{Map, Value, json};

use super::{Envelope, HostAction, PlayState};

#[derive(Debug, Clone, PartialEq)]
pub enum OutboundMessage {
    Ping {
        client_ts: u64,
    },
    StateUpdate {
        position: f64,
        play_state: PlayState,
    },
    PlayerEvent {
        action: HostAction,
        position: f64,
        play_state: Option<PlayState>,
    },
    CreateRoom {
        start_pos: f64,
        media_id: Option<String>,
        user_name: String,
    },
    JoinRoom {
        room: String,
        user_name: String,
    },
    LeaveRoom,
    Ready {
        media_id: Option<String>,
    },
}

impl OutboundMessage {
    pub fn kind(&self) -> &'static str {
        match self {
            OutboundMessage::Ping { .. } => "ping",
            OutboundMessage::StateUpdate { .. } => "state_update",
            OutboundMessage::PlayerEvent { .. } => "player_event",
            OutboundMessage::CreateRoom { .. } => "create_room",
            OutboundMessage::JoinRoom { .. } => "join_room",
            OutboundMessage::LeaveRoom => "leave_room",
            OutboundMessage::Ready { .. } => "ready",
        }
    }

    pub fn payload(&self) -> Value {
        match self {
            OutboundMessage::Ping { client_ts } => json!({ "client_ts": client_ts }),
            OutboundMessage::StateUpdate {
                position,
                play_state,
            } => json!({ "position": position, "play_state": play_state }),
            OutboundMessage::PlayerEvent {
                action,
                position,
                play_state,
            } => {
                let mut payload = Map::new();
                payload.insert("action".into(), json!(action));
                payload.insert("position".into(), json!(position));
                if let Some(state) = play_state {
                    payload.insert("play_state".into(), json!(state));
                }
                Value::Object(payload)
            }
            OutboundMessage::CreateRoom {
                start_pos,
                media_id,
                user_name,
            } => json!({ "start_pos": start_pos, "media_id": media_id, "user_name": user_name }),
            OutboundMessage::JoinRoom { user_name, .. } => json!({ "user_name": user_name }),
            OutboundMessage::LeaveRoom => json!({}),
            OutboundMessage::Ready { media_id } => json!({ "media_id": media_id }),
        }
    }
}

/// An outbound message with the routing fields the engine knew when it was
/// produced.
#[derive(Debug, Clone, PartialEq)]
pub struct Outgoing {
    pub room: Option<String>,
    pub client: Option<String>,
    pub ts: u64,
    pub message: OutboundMessage,
}

impl Outgoing {
    pub fn into_envelope(self) -> Envelope {
        let room = match &self.message {
            OutboundMessage::JoinRoom { room, .. } => Some(room.clone()),
            _ => self.room,
        };
        Envelope {
            msg_type: self.message.kind().to_string(),
            room,
            client: self.client,
            payload: Some(self.message.payload()),
            ts: Some(self.ts),
            server_ts: None,
        }
    }
}
