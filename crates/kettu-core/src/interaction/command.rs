use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde_json::Value;

use crate::{
    domain::{InteractionToken, Snowflake},
    Result,
};

use super::{
    delivery::{DeliveryRouter, InBandDone, ReplyDelivery},
    envelope::{CommandData, InteractionResult, MessageBody},
    responder::{InteractionResponder, SettleOutcome},
};

/// A command invocation as seen by application code.
#[derive(Clone)]
pub struct CommandInteraction {
    pub id: Snowflake,
    pub token: InteractionToken,
    pub channel_id: Option<Snowflake>,
    pub guild_id: Option<Snowflake>,
    pub member: Option<Value>,
    pub command: CommandData,
    responder: InteractionResponder,
    router: Arc<DeliveryRouter>,
    in_band: InBandDone,
}

impl std::fmt::Debug for CommandInteraction {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CommandInteraction")
            .field("id", &self.id)
            .field("command", &self.command.name)
            .field("channel_id", &self.channel_id)
            .field("guild_id", &self.guild_id)
            .finish_non_exhaustive()
    }
}

impl CommandInteraction {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        id: Snowflake,
        token: InteractionToken,
        channel_id: Option<Snowflake>,
        guild_id: Option<Snowflake>,
        member: Option<Value>,
        command: CommandData,
        responder: InteractionResponder,
        router: Arc<DeliveryRouter>,
        in_band: InBandDone,
    ) -> Self {
        Self {
            id,
            token,
            channel_id,
            guild_id,
            member,
            command,
            responder,
            router,
            in_band,
        }
    }

    pub fn command_name(&self) -> &str {
        &self.command.name
    }

    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.id.created_at()
    }

    pub fn responder(&self) -> &InteractionResponder {
        &self.responder
    }

    /// Acknowledge without content. No effect after the deadline fallback or
    /// after an earlier settle.
    pub fn acknowledge(&self, hidden: bool) -> SettleOutcome {
        self.responder.acknowledge(hidden)
    }

    /// Reply with a message: in-band if the deadline has not fired, otherwise
    /// as a follow-up. A follow-up is held until the in-band fallback has
    /// been sent. Follow-up failures are returned, not retried.
    pub async fn reply(&self, body: impl Into<MessageBody>, hidden: bool) -> Result<ReplyDelivery> {
        let body = body.into();
        body.check_length()?;

        let outcome = self.responder.try_reply(&body, hidden);
        if outcome == SettleOutcome::DeadlineMissed {
            self.in_band.wait().await;
        }
        let result = InteractionResult::Message { hidden, body };
        self.router.route(outcome, &self.token, &result).await
    }
}
