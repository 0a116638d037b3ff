//! WebSocket Transport Adapter
//!
//! Implements the `Connector` / `FrameStream` ports with
//! tokio-tungstenite. The connection is read-only: no application
//! messages are ever sent, only the closing handshake.

use async_trait::async_trait;
use futures_util::StreamExt;
use tokio::net::TcpStream;
use tokio_tungstenite::tungstenite::Message;
use tokio_tungstenite::{connect_async, MaybeTlsStream, WebSocketStream};
use tracing::{debug, info, instrument};

use crate::error::FeedError;
use crate::ports::transport::{Connector, Endpoint, FrameStream};

/// Opens WebSocket connections (`ws://` and `wss://` via rustls).
#[derive(Debug, Default, Clone, Copy)]
pub struct WsConnector;

impl WsConnector {
    pub const fn new() -> Self {
        Self
    }
}

#[async_trait]
impl Connector for WsConnector {
    #[instrument(skip(self), fields(endpoint = %endpoint))]
    async fn connect(&self, endpoint: &Endpoint) -> Result<Box<dyn FrameStream>, FeedError> {
        let (ws_stream, response) =
            connect_async(endpoint.as_str())
                .await
                .map_err(|e| FeedError::Connect {
                    endpoint: endpoint.to_string(),
                    reason: e.to_string(),
                })?;

        info!(status = %response.status(), "WebSocket connected");

        Ok(Box::new(WsFrameStream {
            inner: ws_stream,
            closed: false,
        }))
    }
}

/// Inbound side of one WebSocket connection.
pub struct WsFrameStream {
    inner: WebSocketStream<MaybeTlsStream<TcpStream>>,
    closed: bool,
}

#[async_trait]
impl FrameStream for WsFrameStream {
    async fn next_frame(&mut self) -> Option<Result<String, FeedError>> {
        if self.closed {
            return None;
        }

        loop {
            match self.inner.next().await? {
                Ok(Message::Text(text)) => return Some(Ok(text.to_string())),
                Ok(Message::Binary(data)) => match std::str::from_utf8(&data) {
                    Ok(text) => return Some(Ok(text.to_owned())),
                    Err(_) => debug!(len = data.len(), "Skipping non-UTF-8 binary frame"),
                },
                Ok(Message::Close(frame)) => {
                    debug!(?frame, "Peer closed the WebSocket");
                    return None;
                }
                // Pong replies are queued by tungstenite itself
                Ok(Message::Ping(_) | Message::Pong(_) | Message::Frame(_)) => {}
                Err(e) => return Some(Err(FeedError::Transport(e.to_string()))),
            }
        }
    }

    async fn close(&mut self) {
        if self.closed {
            return;
        }
        self.closed = true;

        if let Err(e) = self.inner.close(None).await {
            debug!(error = %e, "WebSocket close handshake failed");
        }
    }
}
