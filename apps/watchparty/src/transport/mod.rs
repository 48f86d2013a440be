//! Relay connectivity.

mod backoff;
mod websocket;

pub use backoff::Backoff;
pub use websocket::RelayConnection;

use thiserror::Error;
use tokio_tungstenite::tungstenite;

#[derive(Debug, Error)]
pub enum TransportError {
    #[error("failed to connect to relay: {0}")]
    Connect(#[from] tungstenite::Error),
    #[error("invalid relay url: {0}")]
    InvalidUrl(#[from] url::ParseError),
    #[error("unsupported relay scheme {0:?}, expected ws or wss")]
    UnsupportedScheme(String),
    #[error("relay connection closed")]
    Closed,
}
