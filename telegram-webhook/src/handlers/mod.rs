//! Built-in handlers run by the dispatch queue.

mod echo_handler;
mod noop_handler;

pub use echo_handler::EchoHandler;
pub use noop_handler::NoOpHandler;
