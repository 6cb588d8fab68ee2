//! Gateway transport adapter (WebSocket via tokio-tungstenite).

use async_trait::async_trait;
use futures_util::{SinkExt, StreamExt};
use kettu_core::{
    errors::Error,
    ports::{GatewayConnection, GatewayTransport, TransportEvent, ABNORMAL_CLOSURE},
    Result,
};
use tokio::net::TcpStream;
use tokio_tungstenite::{
    connect_async,
    tungstenite::{
        protocol::{frame::coding::CloseCode, CloseFrame},
        Message,
    },
    MaybeTlsStream, WebSocketStream,
};

/// Close frame without a status code.
const NO_STATUS: u16 = 1005;

#[derive(Clone, Debug, Default)]
pub struct WsTransport;

impl WsTransport {
    pub fn new() -> Self {
        Self
    }
}

#[async_trait]
impl GatewayTransport for WsTransport {
    async fn connect(&self, url: &str) -> Result<Box<dyn GatewayConnection>> {
        let (ws, _resp) = connect_async(url)
            .await
            .map_err(|e| Error::Transport(format!("websocket connect failed: {e}")))?;
        tracing::debug!("websocket connected");
        Ok(Box::new(WsConnection { ws, closed: false }))
    }
}

pub struct WsConnection {
    ws: WebSocketStream<MaybeTlsStream<TcpStream>>,
    closed: bool,
}

#[async_trait]
impl GatewayConnection for WsConnection {
    async fn send(&mut self, frame: String) -> Result<()> {
        self.ws
            .send(Message::Text(frame))
            .await
            .map_err(|e| Error::Transport(format!("websocket send failed: {e}")))
    }

    async fn recv(&mut self) -> TransportEvent {
        if self.closed {
            return std::future::pending().await;
        }
        loop {
            let event = match self.ws.next().await {
                Some(Ok(Message::Text(text))) => TransportEvent::Frame(text),
                Some(Ok(Message::Binary(bytes))) => match String::from_utf8(bytes) {
                    Ok(text) => TransportEvent::Frame(text),
                    Err(_) => {
                        tracing::warn!("dropping non-utf8 binary frame");
                        continue;
                    }
                },
                Some(Ok(Message::Close(frame))) => {
                    let (code, reason) = match frame {
                        Some(f) => (u16::from(f.code), f.reason.into_owned()),
                        None => (NO_STATUS, String::new()),
                    };
                    TransportEvent::Closed { code, reason }
                }
                // Ping/pong are answered by tungstenite itself.
                Some(Ok(_)) => continue,
                Some(Err(e)) => TransportEvent::Closed {
                    code: ABNORMAL_CLOSURE,
                    reason: e.to_string(),
                },
                None => TransportEvent::Closed {
                    code: ABNORMAL_CLOSURE,
                    reason: "stream ended".to_string(),
                },
            };
            if matches!(event, TransportEvent::Closed { .. }) {
                self.closed = true;
            }
            return event;
        }
    }

    async fn close(&mut self, code: u16) -> Result<()> {
        self.closed = true;
        let frame = CloseFrame {
            code: CloseCode::from(code),
            reason: "".into(),
        };
        match self.ws.close(Some(frame)).await {
            Ok(()) => Ok(()),
            // Already closed by the far end.
            Err(tokio_tungstenite::tungstenite::Error::ConnectionClosed) => Ok(()),
            Err(e) => Err(Error::Transport(format!("websocket close failed: {e}"))),
        }
    }
}
