//! Interaction acknowledgment protocol.
//!
//! Each command invocation races the application's handler against a
//! response deadline. Whatever settles first is the in-band response; a reply
//! that arrives after the deadline is sent out-of-band as a follow-up.

pub mod command;
pub mod delivery;
pub mod dispatcher;
pub mod envelope;
pub mod responder;
pub mod timer;
pub mod webhook;

pub use command::CommandInteraction;
pub use delivery::{DeliveryRouter, ReplyDelivery};
pub use dispatcher::InteractionDispatcher;
pub use envelope::{
    CommandData, CommandOption, InteractionEnvelope, InteractionKind, InteractionResult,
    MessageBody, RawInteraction, ResponseType,
};
pub use responder::{InteractionResponder, SettleOutcome, SettledBy};
pub use timer::ResponseTimer;
pub use webhook::{SignatureVerifier, WebhookHandler, WebhookReply};
