//! Demo application: answers `/ping`.

use std::sync::Arc;

use kettu_core::{
    commands::{CommandsApi, NewCommand},
    events::{ClientEvent, SessionEvent},
    interaction::{CommandInteraction, ReplyDelivery},
    ports::HttpPort,
};
use tokio::sync::mpsc::UnboundedReceiver;

const PING: &str = "ping";

/// Make sure the global `ping` command exists. Failures are logged; the
/// client still runs with whatever is registered.
pub async fn register_commands(http: Arc<dyn HttpPort>) {
    let api = CommandsApi::new(http);
    let existing = match api.fetch(None).await {
        Ok(c) => c,
        Err(e) => {
            tracing::warn!(error = %e, "could not list commands");
            return;
        }
    };
    if existing.iter().any(|c| c.name == PING) {
        return;
    }
    let ping = NewCommand {
        name: PING.to_string(),
        description: "Check that the bot is alive".to_string(),
        options: Vec::new(),
    };
    if let Err(e) = api.create(&ping, None).await {
        tracing::warn!(error = %e, "could not register ping command");
    }
}

pub async fn run(mut events: UnboundedReceiver<ClientEvent>) {
    while let Some(event) = events.recv().await {
        match event {
            ClientEvent::InteractionCreate(interaction) => {
                tokio::spawn(handle(interaction));
            }
            ClientEvent::Session(SessionEvent::Reconnecting { delay, attempt }) => {
                tracing::info!(?delay, attempt, "reconnecting");
            }
            ClientEvent::Session(event) => tracing::debug!(?event, "session"),
            ClientEvent::Dispatch { name, .. } => tracing::trace!(%name, "dispatch"),
        }
    }
}

async fn handle(interaction: CommandInteraction) {
    if interaction.command_name() != PING {
        tracing::warn!(command = interaction.command_name(), "unknown command");
        interaction.acknowledge(true);
        return;
    }

    match interaction.reply("Pong!", false).await {
        Ok(ReplyDelivery::FollowUp) => tracing::info!("ping answered by follow-up"),
        Ok(_) => {}
        Err(e) => tracing::warn!(error = %e, "ping reply failed"),
    }
}
