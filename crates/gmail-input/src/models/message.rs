//! Message model: the header map and plain-text body of one Gmail message

use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// Unique identifier for a message (Gmail message ID)
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct MessageId(pub String);

impl MessageId {
    pub fn new(id: impl Into<String>) -> Self {
        Self(id.into())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl From<String> for MessageId {
    fn from(s: String) -> Self {
        Self(s)
    }
}

impl From<&str> for MessageId {
    fn from(s: &str) -> Self {
        Self(s.to_string())
    }
}

impl std::fmt::Display for MessageId {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(&self.0)
    }
}

/// A fetched mail message, as seen by the row mapper
///
/// Header names are case-sensitive keys. The body is only present when a
/// `text/plain` part could be located.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    /// Gmail message ID
    pub id: MessageId,
    headers: HashMap<String, String>,
    body: Option<String>,
}

impl Message {
    /// Create a new message builder
    pub fn builder(id: impl Into<MessageId>) -> MessageBuilder {
        MessageBuilder::new(id.into())
    }

    /// Look up a header value by its exact name
    pub fn header(&self, name: &str) -> Option<&str> {
        self.headers.get(name).map(String::as_str)
    }

    pub fn headers(&self) -> &HashMap<String, String> {
        &self.headers
    }

    /// Decoded `text/plain` body, if one was found
    pub fn body(&self) -> Option<&str> {
        self.body.as_deref()
    }
}

/// Builder for creating Message instances
pub struct MessageBuilder {
    id: MessageId,
    headers: HashMap<String, String>,
    body: Option<String>,
}

impl MessageBuilder {
    fn new(id: MessageId) -> Self {
        Self {
            id,
            headers: HashMap::new(),
            body: None,
        }
    }

    /// Add a header; a later header with the same name replaces the earlier one
    pub fn header(mut self, name: impl Into<String>, value: impl Into<String>) -> Self {
        self.headers.insert(name.into(), value.into());
        self
    }

    pub fn headers<I, K, V>(mut self, headers: I) -> Self
    where
        I: IntoIterator<Item = (K, V)>,
        K: Into<String>,
        V: Into<String>,
    {
        for (name, value) in headers {
            self.headers.insert(name.into(), value.into());
        }
        self
    }

    pub fn body(mut self, body: Option<String>) -> Self {
        self.body = body;
        self
    }

    pub fn build(self) -> Message {
        Message {
            id: self.id,
            headers: self.headers,
            body: self.body,
        }
    }
}
