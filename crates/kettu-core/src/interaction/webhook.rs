//! Transport-agnostic webhook front for interaction delivery.

use std::sync::Arc;

use crate::errors::Error;

use super::{dispatcher::InteractionDispatcher, envelope::RawInteraction};

/// Verifies the request signature before any payload is parsed.
pub trait SignatureVerifier: Send + Sync {
    fn verify(&self, timestamp: &str, body: &[u8], signature: &str) -> bool;
}

/// HTTP-level outcome of one webhook request.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WebhookReply {
    pub status: u16,
    /// JSON body, if any.
    pub body: Option<String>,
}

impl WebhookReply {
    fn status(status: u16) -> Self {
        Self { status, body: None }
    }
}

pub struct WebhookHandler {
    verifier: Arc<dyn SignatureVerifier>,
    dispatcher: Arc<InteractionDispatcher>,
}

impl WebhookHandler {
    pub fn new(
        verifier: Arc<dyn SignatureVerifier>,
        dispatcher: Arc<InteractionDispatcher>,
    ) -> Self {
        Self {
            verifier,
            dispatcher,
        }
    }

    /// Verify, dispatch and serialize. The in-band result is the response body.
    pub async fn handle(
        &self,
        timestamp: Option<&str>,
        signature: Option<&str>,
        body: &[u8],
    ) -> WebhookReply {
        let (Some(timestamp), Some(signature)) = (timestamp, signature) else {
            return WebhookReply::status(401);
        };
        if !self.verifier.verify(timestamp, body, signature) {
            tracing::warn!("webhook signature rejected");
            return WebhookReply::status(401);
        }

        let raw: RawInteraction = match serde_json::from_slice(body) {
            Ok(v) => v,
            Err(e) => {
                tracing::warn!(error = %e, "malformed webhook payload");
                return WebhookReply::status(400);
            }
        };

        match self.dispatcher.dispatch(raw).await {
            Ok(result) => match serde_json::to_string(&result) {
                Ok(json) => WebhookReply {
                    status: 200,
                    body: Some(json),
                },
                Err(e) => {
                    tracing::error!(error = %e, "failed to serialize interaction result");
                    WebhookReply::status(500)
                }
            },
            Err(e @ Error::UnsupportedInteraction(_)) => {
                tracing::warn!(error = %e, "rejected webhook interaction");
                WebhookReply::status(400)
            }
            Err(e) => {
                tracing::error!(error = %e, "webhook dispatch failed");
                WebhookReply::status(500)
            }
        }
    }
}
