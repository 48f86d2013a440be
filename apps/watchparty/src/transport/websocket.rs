use futures_util::{SinkExt, StreamExt};
use tokio::net::TcpStream;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio_tungstenite::{MaybeTlsStream, WebSocketStream, connect_async, tungstenite::Message};
use tracing::{debug, trace};
use url::Url;

use super::TransportError;

/// One websocket session with the relay.
///
/// Reader and writer run on a spawned task; the owner exchanges text
/// frames through unbounded channels. The inbound channel closing means
/// the connection is gone.
pub struct RelayConnection {
    tx: mpsc::UnboundedSender<String>,
    rx: mpsc::UnboundedReceiver<String>,
    task: JoinHandle<()>,
}

impl RelayConnection {
    pub async fn connect(relay_url: &str) -> Result<Self, TransportError> {
        let url = Url::parse(relay_url)?;
        match url.scheme() {
            "ws" | "wss" => {}
            other => return Err(TransportError::UnsupportedScheme(other.to_string())),
        }

        let (ws_stream, _) = connect_async(url.as_str()).await?;
        debug!(target: "watchparty::client", url = %url, "relay connected");

        let (tx_out, rx_out) = mpsc::unbounded_channel::<String>();
        let (tx_in, rx_in) = mpsc::unbounded_channel::<String>();
        let task = tokio::spawn(async move {
            handle_websocket(ws_stream, rx_out, tx_in).await;
        });

        Ok(Self {
            tx: tx_out,
            rx: rx_in,
            task,
        })
    }

    pub fn send(&self, text: String) -> Result<(), TransportError> {
        self.tx.send(text).map_err(|_| TransportError::Closed)
    }

    /// Next text frame; `None` once the relay went away.
    pub async fn recv(&mut self) -> Option<String> {
        self.rx.recv().await
    }

    pub async fn close(self) {
        drop(self.tx);
        self.task.abort();
        let _ = self.task.await;
    }
}

async fn handle_websocket(
    ws_stream: WebSocketStream<MaybeTlsStream<TcpStream>>,
    mut rx_out: mpsc::UnboundedReceiver<String>,
    tx_in: mpsc::UnboundedSender<String>,
) {
    let (mut ws_sender, mut ws_receiver) = ws_stream.split();

    let send_task = tokio::spawn(async move {
        while let Some(text) = rx_out.recv().await {
            trace!(target: "watchparty::client", frame = %text, "send");
            if ws_sender.send(Message::Text(text)).await.is_err() {
                break;
            }
        }
        let _ = ws_sender.close().await;
    });

    while let Some(msg) = ws_receiver.next().await {
        match msg {
            Ok(Message::Text(text)) => {
                if tx_in.send(text).is_err() {
                    break;
                }
            }
            Ok(Message::Close(frame)) => {
                debug!(target: "watchparty::client", ?frame, "relay closed the connection");
                break;
            }
            Err(err) => {
                debug!(target: "watchparty::client", error = %err, "relay read failed");
                break;
            }
            _ => {}
        }
    }

    send_task.abort();
}
