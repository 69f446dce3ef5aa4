//! Core types and traits: InboundUpdate, Handler, Bot capability, error, logger.
//! Transport-agnostic; the validator, ledger and dispatch queue build on these.

pub mod bot;
pub mod error;
pub mod logger;
pub mod types;

pub use bot::Bot;
pub use error::{HandlerError, Result, WebhookError};
pub use logger::init_tracing;
pub use types::{Handler, InboundUpdate};
