use std::sync::Arc;

use serde_json::Value;
use tokio::sync::{watch, OnceCell};

use crate::{
    domain::{InteractionToken, Snowflake},
    errors::Error,
    ports::{HttpPort, HttpRequest},
    Result,
};

use super::{
    envelope::{InteractionResult, MessageBody},
    responder::SettleOutcome,
};

/// Where a settled result ended up.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ReplyDelivery {
    /// Settled before the deadline; the caller transmits it in-band.
    InBand,
    /// Deadline missed; sent as a follow-up through the REST API.
    FollowUp,
    /// The interaction was already settled by the application; nothing sent.
    Ignored,
}

/// Held by whoever transmits the in-band response; dropping it opens the
/// matching [`InBandDone`].
pub(crate) struct InBandGuard {
    _tx: watch::Sender<()>,
}

/// Resolves once the in-band response of one interaction has been sent.
#[derive(Clone, Debug)]
pub(crate) struct InBandDone(watch::Receiver<()>);

impl InBandDone {
    pub(crate) async fn wait(&self) {
        let mut rx = self.0.clone();
        while rx.changed().await.is_ok() {}
    }
}

pub(crate) fn in_band_gate() -> (InBandGuard, InBandDone) {
    let (tx, rx) = watch::channel(());
    (InBandGuard { _tx: tx }, InBandDone(rx))
}

/// Finalizes interaction results: in-band callback or out-of-band follow-up.
pub struct DeliveryRouter {
    http: Arc<dyn HttpPort>,
    application_id: OnceCell<Snowflake>,
}

impl DeliveryRouter {
    pub fn new(http: Arc<dyn HttpPort>, application_id: Option<Snowflake>) -> Self {
        Self {
            http,
            application_id: OnceCell::new_with(application_id),
        }
    }

    /// Decide the delivery for an application settle attempt and perform the
    /// out-of-band half when needed.
    pub async fn route(
        &self,
        outcome: SettleOutcome,
        token: &InteractionToken,
        result: &InteractionResult,
    ) -> Result<ReplyDelivery> {
        match outcome {
            SettleOutcome::Accepted => Ok(ReplyDelivery::InBand),
            SettleOutcome::AlreadySettled => Ok(ReplyDelivery::Ignored),
            SettleOutcome::DeadlineMissed if result.body().is_none() => Ok(ReplyDelivery::Ignored),
            SettleOutcome::DeadlineMissed => {
                self.follow_up(token, result).await?;
                Ok(ReplyDelivery::FollowUp)
            }
        }
    }

    /// In-band response for interactions received over the gateway.
    pub async fn respond_via_callback(
        &self,
        id: &Snowflake,
        token: &InteractionToken,
        result: &InteractionResult,
    ) -> Result<()> {
        let path = format!("/interactions/{}/{}/callback", id, token.as_str());
        self.http
            .request(HttpRequest::post(path, serde_json::to_value(result)?))
            .await?;
        Ok(())
    }

    /// Out-of-band message for an interaction whose deadline already passed.
    ///
    /// Only message results carry anything to send; a late acknowledge is
    /// already covered by the fallback. Failures surface as `DeliveryFailed`.
    pub async fn follow_up(
        &self,
        token: &InteractionToken,
        result: &InteractionResult,
    ) -> Result<()> {
        let Some(body) = result.body() else {
            return Ok(());
        };

        match self.send_follow_up(token, body).await {
            Ok(_) => {
                tracing::debug!("follow-up delivered");
                Ok(())
            }
            Err(e) => {
                tracing::warn!(error = %e, "follow-up delivery failed");
                Err(Error::delivery_failed(e))
            }
        }
    }

    async fn send_follow_up(&self, token: &InteractionToken, body: &MessageBody) -> Result<()> {
        let app_id = self.application_id().await?;
        let path = format!("/webhooks/{}/{}", app_id, token.as_str());
        let payload = serde_json::to_value(body)?;
        self.http
            .request(HttpRequest::post(path, payload).without_auth())
            .await?;
        Ok(())
    }

    /// Configured application id, or the one reported by the API (cached).
    pub async fn application_id(&self) -> Result<Snowflake> {
        let id = self
            .application_id
            .get_or_try_init(|| async {
                let me = self
                    .http
                    .request(HttpRequest::get("/oauth2/applications/@me"))
                    .await?;
                me.get("id")
                    .and_then(Value::as_str)
                    .map(Snowflake::from)
                    .ok_or_else(|| {
                        Error::External("application lookup returned no id".to_string())
                    })
            })
            .await?;
        Ok(id.clone())
    }
}
