//! HTTP front for webhook-delivered interactions (axum).

use std::{future::Future, net::SocketAddr, sync::Arc};

use axum::{
    body::Bytes,
    extract::State,
    http::{header::CONTENT_TYPE, HeaderMap, StatusCode},
    response::{IntoResponse, Response},
    routing::post,
    Router,
};
use kettu_core::{
    errors::Error,
    interaction::{InteractionDispatcher, WebhookHandler},
    Result,
};

mod verify;

pub use verify::Ed25519Verifier;

pub const TIMESTAMP_HEADER: &str = "x-signature-timestamp";
pub const SIGNATURE_HEADER: &str = "x-signature-ed25519";

/// Handler that verifies requests against the hex-encoded application key.
pub fn handler(
    public_key: &str,
    dispatcher: Arc<InteractionDispatcher>,
) -> Result<Arc<WebhookHandler>> {
    let verifier = Ed25519Verifier::from_hex(public_key)?;
    Ok(Arc::new(WebhookHandler::new(Arc::new(verifier), dispatcher)))
}

/// `POST /interactions`.
pub fn router(handler: Arc<WebhookHandler>) -> Router {
    Router::new()
        .route("/interactions", post(interactions))
        .with_state(handler)
}

/// Bind `addr` and serve until `shutdown` resolves.
pub async fn serve(
    addr: SocketAddr,
    handler: Arc<WebhookHandler>,
    shutdown: impl Future<Output = ()> + Send + 'static,
) -> Result<()> {
    let listener = tokio::net::TcpListener::bind(addr).await?;
    tracing::info!(%addr, "webhook listening");
    axum::serve(listener, router(handler))
        .with_graceful_shutdown(shutdown)
        .await
        .map_err(Error::Io)
}

async fn interactions(
    State(handler): State<Arc<WebhookHandler>>,
    headers: HeaderMap,
    body: Bytes,
) -> Response {
    let timestamp = header_str(&headers, TIMESTAMP_HEADER);
    let signature = header_str(&headers, SIGNATURE_HEADER);

    let reply = handler.handle(timestamp, signature, &body).await;
    let status = StatusCode::from_u16(reply.status).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    match reply.body {
        Some(json) => (status, [(CONTENT_TYPE, "application/json")], json).into_response(),
        None => status.into_response(),
    }
}

fn header_str<'a>(headers: &'a HeaderMap, name: &str) -> Option<&'a str> {
    headers.get(name).and_then(|v| v.to_str().ok())
}
