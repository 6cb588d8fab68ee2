//! Application command registration over REST.

use std::sync::Arc;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::{
    domain::Snowflake,
    errors::Error,
    ports::{HttpPort, HttpRequest},
    Result,
};

/// Option type. Serialized as its numeric code.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum OptionType {
    SubCommand = 1,
    SubCommandGroup = 2,
    String = 3,
    Integer = 4,
    Boolean = 5,
    User = 6,
    Channel = 7,
    Role = 8,
}

impl OptionType {
    const ALL: [OptionType; 8] = [
        OptionType::SubCommand,
        OptionType::SubCommandGroup,
        OptionType::String,
        OptionType::Integer,
        OptionType::Boolean,
        OptionType::User,
        OptionType::Channel,
        OptionType::Role,
    ];
}

impl From<OptionType> for u8 {
    fn from(t: OptionType) -> u8 {
        t as u8
    }
}

impl TryFrom<u8> for OptionType {
    type Error = String;

    fn try_from(code: u8) -> std::result::Result<Self, Self::Error> {
        OptionType::ALL
            .into_iter()
            .find(|t| *t as u8 == code)
            .ok_or_else(|| format!("unknown option type {code}"))
    }
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct OptionChoice {
    pub name: String,
    pub value: Value,
}

#[derive(Clone, Debug, PartialEq, Serialize, Deserialize)]
pub struct CommandOptionSpec {
    #[serde(rename = "type")]
    pub kind: OptionType,
    pub name: String,
    pub description: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub default: Option<bool>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub required: Option<bool>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub choices: Vec<OptionChoice>,
    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<CommandOptionSpec>,
}

/// Payload for `create`.
#[derive(Clone, Debug, Default, PartialEq, Serialize)]
pub struct NewCommand {
    pub name: String,
    pub description: String,
    #[serde(skip_serializing_if = "Vec::is_empty")]
    pub options: Vec<CommandOptionSpec>,
}

#[derive(Clone, Debug, PartialEq, Deserialize)]
pub struct ApplicationCommand {
    pub id: Snowflake,
    #[serde(default)]
    pub application_id: Option<Snowflake>,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default)]
    pub options: Vec<CommandOptionSpec>,
    /// Guild the command is scoped to; `None` for global commands.
    #[serde(skip)]
    pub guild_id: Option<Snowflake>,
}

impl ApplicationCommand {
    pub fn created_at(&self) -> Option<DateTime<Utc>> {
        self.id.created_at()
    }
}

pub struct CommandsApi {
    http: Arc<dyn HttpPort>,
}

impl CommandsApi {
    pub fn new(http: Arc<dyn HttpPort>) -> Self {
        Self { http }
    }

    pub async fn fetch(&self, guild: Option<&Snowflake>) -> Result<Vec<ApplicationCommand>> {
        let value = self.http.request(HttpRequest::get(commands_path(guild))).await?;
        let mut commands: Vec<ApplicationCommand> = match value {
            Value::Null => Vec::new(),
            v => serde_json::from_value(v)?,
        };
        for c in &mut commands {
            c.guild_id = guild.cloned();
        }
        Ok(commands)
    }

    pub async fn create(
        &self,
        command: &NewCommand,
        guild: Option<&Snowflake>,
    ) -> Result<ApplicationCommand> {
        let body = serde_json::to_value(command)?;
        let value = self
            .http
            .request(HttpRequest::post(commands_path(guild), body))
            .await?;
        if value.is_null() {
            return Err(Error::External(format!(
                "empty response creating command {}",
                command.name
            )));
        }
        let mut created: ApplicationCommand = serde_json::from_value(value)?;
        created.guild_id = guild.cloned();
        tracing::info!(id = %created.id, name = %created.name, "command registered");
        Ok(created)
    }

    pub async fn delete(&self, id: &Snowflake, guild: Option<&Snowflake>) -> Result<()> {
        let path = format!("{}/{}", commands_path(guild), id);
        self.http.request(HttpRequest::delete(path)).await?;
        tracing::info!(%id, "command deleted");
        Ok(())
    }

    pub async fn delete_command(&self, command: &ApplicationCommand) -> Result<()> {
        self.delete(&command.id, command.guild_id.as_ref()).await
    }
}

fn commands_path(guild: Option<&Snowflake>) -> String {
    match guild {
        Some(g) => format!("/applications/@me/guilds/{g}/commands"),
        None => "/applications/@me/commands".to_string(),
    }
}

/// A plain option with no choices or children.
pub fn option(kind: OptionType, name: &str, description: &str) -> CommandOptionSpec {
    CommandOptionSpec {
        kind,
        name: name.to_string(),
        description: description.to_string(),
        default: None,
        required: None,
        choices: Vec::new(),
        options: Vec::new(),
    }
}
