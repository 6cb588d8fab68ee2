use async_trait::async_trait;
use serde_json::Value;

use crate::{events::ClientEvent, Result};

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum Method {
    Get,
    Post,
    Patch,
    Delete,
}

impl Method {
    pub fn as_str(self) -> &'static str {
        match self {
            Method::Get => "GET",
            Method::Post => "POST",
            Method::Patch => "PATCH",
            Method::Delete => "DELETE",
        }
    }
}

impl std::fmt::Display for Method {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}

/// One REST call, relative to the API base.
#[derive(Clone, Debug, PartialEq)]
pub struct HttpRequest {
    pub method: Method,
    pub path: String,
    pub body: Option<Value>,
    /// Send the client credential. Follow-ups authenticate through the
    /// interaction token in the path instead.
    pub auth: bool,
}

impl HttpRequest {
    pub fn get(path: impl Into<String>) -> Self {
        Self {
            method: Method::Get,
            path: path.into(),
            body: None,
            auth: true,
        }
    }

    pub fn post(path: impl Into<String>, body: Value) -> Self {
        Self {
            method: Method::Post,
            path: path.into(),
            body: Some(body),
            auth: true,
        }
    }

    pub fn delete(path: impl Into<String>) -> Self {
        Self {
            method: Method::Delete,
            path: path.into(),
            body: None,
            auth: true,
        }
    }

    pub fn without_auth(mut self) -> Self {
        self.auth = false;
        self
    }
}

/// Hexagonal port for the REST API.
///
/// Implementations own timeouts and retries; the core never retries a request.
#[async_trait]
pub trait HttpPort: Send + Sync {
    /// Perform the request and return the parsed body (`Null` when empty).
    async fn request(&self, req: HttpRequest) -> Result<Value>;
}

/// Event raised by the transport side of a gateway connection.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum TransportEvent {
    Frame(String),
    Closed { code: u16, reason: String },
}

/// Close code reported when the stream ends without a close frame.
pub const ABNORMAL_CLOSURE: u16 = 1006;

/// Hexagonal port for the persistent gateway transport.
#[async_trait]
pub trait GatewayTransport: Send + Sync {
    async fn connect(&self, url: &str) -> Result<Box<dyn GatewayConnection>>;
}

/// One open transport connection.
///
/// `recv` must be cancel-safe: the session loop races it against the
/// heartbeat timer.
#[async_trait]
pub trait GatewayConnection: Send {
    async fn send(&mut self, frame: String) -> Result<()>;

    /// Next inbound event. After `Closed` has been returned the connection is dead.
    async fn recv(&mut self) -> TransportEvent;

    async fn close(&mut self, code: u16) -> Result<()>;
}

/// Sink for domain events. Fire-and-forget; must not drop events.
pub trait EventSink: Send + Sync {
    fn publish(&self, event: ClientEvent);
}
