//! Domain events published to the application.

use std::time::Duration;

use serde_json::Value;
use tokio::sync::mpsc;

use crate::{domain::SessionId, interaction::CommandInteraction, ports::EventSink};

#[derive(Clone, Debug)]
pub enum ClientEvent {
    /// A command invocation waiting for `acknowledge`/`reply`.
    InteractionCreate(CommandInteraction),
    Session(SessionEvent),
    /// Any other gateway dispatch, forwarded untouched.
    Dispatch { name: String, data: Value },
}

/// Session lifecycle notifications.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum SessionEvent {
    Connecting { resuming: bool },
    Ready { session_id: SessionId },
    Resumed,
    Disconnected { code: u16, resumable: bool },
    InvalidSession,
    Reconnecting { delay: Duration, attempt: u32 },
    /// Unrecoverable close. No reconnect follows.
    Fatal { code: u16, reason: String },
    Destroyed,
}

/// `EventSink` backed by an unbounded tokio channel.
///
/// Unbounded so publishing never blocks the session loop or the dispatcher;
/// events stay in publish order.
#[derive(Clone, Debug)]
pub struct ChannelSink {
    tx: mpsc::UnboundedSender<ClientEvent>,
}

impl ChannelSink {
    pub fn new() -> (Self, mpsc::UnboundedReceiver<ClientEvent>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl EventSink for ChannelSink {
    fn publish(&self, event: ClientEvent) {
        if self.tx.send(event).is_err() {
            tracing::debug!("event receiver dropped; discarding event");
        }
    }
}
