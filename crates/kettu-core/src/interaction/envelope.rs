//! Inbound interaction envelopes and outbound result descriptors.

use serde::{Deserialize, Serialize, Serializer};
use serde_json::Value;

use crate::{
    domain::{InteractionToken, Snowflake},
    errors::Error,
    Result,
};

/// Inbound `type` codes.
pub const INTERACTION_PING: u64 = 1;
pub const INTERACTION_APPLICATION_COMMAND: u64 = 2;

/// Maximum message content length accepted by the platform.
pub const MAX_CONTENT_LEN: usize = 2000;

/// Interaction payload as received from the webhook body or the gateway
/// `INTERACTION_CREATE` dispatch.
#[derive(Clone, Debug, Deserialize)]
pub struct RawInteraction {
    #[serde(rename = "type")]
    pub kind: u64,
    pub id: Snowflake,
    pub token: InteractionToken,
    #[serde(default)]
    pub data: Option<Value>,
    #[serde(default)]
    pub channel_id: Option<Snowflake>,
    #[serde(default)]
    pub guild_id: Option<Snowflake>,
    #[serde(default)]
    pub member: Option<Value>,
}

/// Read-only view of one inbound interaction.
#[derive(Clone, Debug)]
pub struct InteractionEnvelope {
    pub id: Snowflake,
    pub token: InteractionToken,
    pub channel_id: Option<Snowflake>,
    pub guild_id: Option<Snowflake>,
    pub member: Option<Value>,
    pub kind: InteractionKind,
}

#[derive(Clone, Debug)]
pub enum InteractionKind {
    Probe,
    Command(CommandData),
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct CommandData {
    pub id: Snowflake,
    pub name: String,
    #[serde(default)]
    pub options: Vec<CommandOption>,
}

/// One node of the argument tree. Sub-commands carry nested `options`.
#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct CommandOption {
    pub name: String,
    #[serde(rename = "type", default)]
    pub kind: Option<u8>,
    #[serde(default)]
    pub value: Option<Value>,
    #[serde(default)]
    pub options: Vec<CommandOption>,
}

impl CommandData {
    /// Top-level option by name.
    pub fn option(&self, name: &str) -> Option<&CommandOption> {
        self.options.iter().find(|o| o.name == name)
    }
}

impl InteractionEnvelope {
    /// Classify a raw payload. Nothing is allocated for unknown kinds.
    pub fn classify(raw: RawInteraction) -> Result<Self> {
        let kind = match raw.kind {
            INTERACTION_PING => InteractionKind::Probe,
            INTERACTION_APPLICATION_COMMAND => {
                let data = raw.data.ok_or_else(|| {
                    Error::UnsupportedInteraction("command interaction without data".to_string())
                })?;
                let data: CommandData = serde_json::from_value(data).map_err(|e| {
                    Error::UnsupportedInteraction(format!("malformed command data: {e}"))
                })?;
                InteractionKind::Command(data)
            }
            other => {
                return Err(Error::UnsupportedInteraction(format!(
                    "unknown interaction type {other}"
                )))
            }
        };

        Ok(Self {
            id: raw.id,
            token: raw.token,
            channel_id: raw.channel_id,
            guild_id: raw.guild_id,
            member: raw.member,
            kind,
        })
    }
}

/// Message payload of a reply or follow-up.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct MessageBody {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    #[serde(skip_serializing_if = "std::ops::Not::not")]
    pub tts: bool,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub embeds: Vec<Value>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub allowed_mentions: Option<Value>,
}

impl MessageBody {
    pub fn text(content: impl Into<String>) -> Self {
        Self {
            content: Some(content.into()),
            ..Default::default()
        }
    }

    pub fn check_length(&self) -> Result<()> {
        let len = self
            .content
            .as_deref()
            .map(|c| c.chars().count())
            .unwrap_or(0);
        if len > MAX_CONTENT_LEN {
            return Err(Error::MessageTooLong {
                len,
                max: MAX_CONTENT_LEN,
            });
        }
        Ok(())
    }
}

impl From<&str> for MessageBody {
    fn from(s: &str) -> Self {
        MessageBody::text(s)
    }
}

impl From<String> for MessageBody {
    fn from(s: String) -> Self {
        MessageBody::text(s)
    }
}

/// Result descriptor for one interaction. Settled exactly once.
#[derive(Clone, Debug, PartialEq)]
pub enum InteractionResult {
    Pong,
    Acknowledge { hidden: bool },
    Message { hidden: bool, body: MessageBody },
}

/// Outbound `type` codes.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum ResponseType {
    Pong = 1,
    Acknowledge = 2,
    ChannelMessage = 3,
    ChannelMessageWithSource = 4,
    AcknowledgeWithSource = 5,
}

impl InteractionResult {
    /// The fallback sent when the application misses the deadline.
    pub fn fallback() -> Self {
        InteractionResult::Acknowledge { hidden: false }
    }

    pub fn response_type(&self) -> ResponseType {
        match self {
            InteractionResult::Pong => ResponseType::Pong,
            InteractionResult::Acknowledge { hidden: true } => ResponseType::Acknowledge,
            InteractionResult::Acknowledge { hidden: false } => ResponseType::AcknowledgeWithSource,
            InteractionResult::Message { hidden: true, .. } => ResponseType::ChannelMessage,
            InteractionResult::Message { hidden: false, .. } => {
                ResponseType::ChannelMessageWithSource
            }
        }
    }

    pub fn body(&self) -> Option<&MessageBody> {
        match self {
            InteractionResult::Message { body, .. } => Some(body),
            _ => None,
        }
    }
}

#[derive(Serialize)]
struct WireResponse<'a> {
    #[serde(rename = "type")]
    kind: u8,
    #[serde(skip_serializing_if = "Option::is_none")]
    data: Option<&'a MessageBody>,
}

impl Serialize for InteractionResult {
    fn serialize<S: Serializer>(&self, serializer: S) -> std::result::Result<S::Ok, S::Error> {
        WireResponse {
            kind: self.response_type() as u8,
            data: self.body(),
        }
        .serialize(serializer)
    }
}
