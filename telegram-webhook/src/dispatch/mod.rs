//! Dispatch: bounded queue, worker pool, retry policy and dead-letter sinks.

mod dead_letter;
mod queue;
mod retry;

pub use dead_letter::{DeadLetter, DeadLetterSink, JsonlDeadLetterSink, TracingDeadLetterSink};
pub use queue::{DispatchConfig, DispatchQueue, DispatchTask, QueueStats};
pub use retry::RetryPolicy;
