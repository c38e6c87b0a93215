//! Message sources
//!
//! A source runs one search for a user and returns every matching message it
//! could fetch. Messages that could not be fetched are reported separately so
//! the run can log them without failing.

mod memory;

pub use memory::InMemorySource;

use anyhow::Result;

use crate::models::{Message, MessageId};

/// A listed message whose fetch or normalization failed
#[derive(Debug, Clone, PartialEq)]
pub struct PartialMessage {
    pub id: MessageId,
    pub error: String,
}

/// Outcome of one search
#[derive(Debug, Default)]
pub struct SearchResult {
    /// Fetched messages, in the order the source listed them
    pub success: Vec<Message>,
    pub failed: Vec<PartialMessage>,
}

/// Trait for searching and fetching messages
///
/// An `Err` means the search as a whole failed (authentication, transport,
/// listing); per-message problems belong in [`SearchResult::failed`].
pub trait MessageSource {
    fn search(&self, user: &str, query: &str) -> Result<SearchResult>;
}
