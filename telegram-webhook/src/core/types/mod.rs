//! Core types: the inbound update and the Handler trait.

mod handler;
mod update;

pub use handler::Handler;
pub use update::InboundUpdate;
