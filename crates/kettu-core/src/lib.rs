//! Core of the kettu bot client: the interaction acknowledgment protocol and
//! the gateway session supervisor.
//!
//! Nothing here talks to the network directly. REST, the gateway socket and
//! the webhook listener live behind ports (traits) implemented in adapter
//! crates.

pub mod commands;
pub mod config;
pub mod domain;
pub mod errors;
pub mod events;
pub mod gateway;
pub mod interaction;
pub mod logging;
pub mod ports;

pub use errors::{Error, Result};
