//! In-memory message source
//!
//! Serves a fixed set of messages and records every query it receives. Used
//! for tests and for feeding pre-fetched messages through the mapper.

use anyhow::Result;
use std::sync::RwLock;

use super::{MessageSource, PartialMessage, SearchResult};
use crate::models::{Message, MessageId};

pub struct InMemorySource {
    messages: Vec<Message>,
    failed: Vec<PartialMessage>,
    error: Option<String>,
    queries: RwLock<Vec<(String, String)>>,
}

impl InMemorySource {
    pub fn new(messages: Vec<Message>) -> Self {
        Self {
            messages,
            failed: Vec::new(),
            error: None,
            queries: RwLock::new(Vec::new()),
        }
    }

    /// A source whose every search fails with `error`
    pub fn failing(error: impl Into<String>) -> Self {
        Self {
            error: Some(error.into()),
            ..Self::new(Vec::new())
        }
    }

    /// Report a message as listed but not fetchable
    pub fn with_failed(mut self, id: impl Into<MessageId>, error: impl Into<String>) -> Self {
        self.failed.push(PartialMessage {
            id: id.into(),
            error: error.into(),
        });
        self
    }

    /// `(user, query)` pairs seen so far
    pub fn queries(&self) -> Vec<(String, String)> {
        self.queries
            .read()
            .map(|q| q.clone())
            .unwrap_or_default()
    }
}

impl MessageSource for InMemorySource {
    fn search(&self, user: &str, query: &str) -> Result<SearchResult> {
        if let Ok(mut queries) = self.queries.write() {
            queries.push((user.to_string(), query.to_string()));
        }

        if let Some(error) = &self.error {
            anyhow::bail!("{}", error);
        }

        Ok(SearchResult {
            success: self.messages.clone(),
            failed: self.failed.clone(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_search_returns_messages_and_records_query() {
        let source = InMemorySource::new(vec![Message::builder("m1").build()])
            .with_failed("m2", "timeout");

        let result = source.search("me", "label:inbox").unwrap();
        assert_eq!(result.success.len(), 1);
        assert_eq!(result.failed[0].id.as_str(), "m2");
        assert_eq!(
            source.queries(),
            vec![("me".to_string(), "label:inbox".to_string())]
        );
    }

    #[test]
    fn test_failing_source() {
        let source = InMemorySource::failing("invalid_grant");
        let err = source.search("me", "").unwrap_err();
        assert_eq!(err.to_string(), "invalid_grant");
        assert_eq!(source.queries().len(), 1);
    }
}
