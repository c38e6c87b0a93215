//! Domain models for fetched messages and run state

mod checkpoint;
mod message;

pub use checkpoint::Checkpoint;
pub use message::{Message, MessageBuilder, MessageId};
