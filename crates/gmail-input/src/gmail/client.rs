//! Gmail API HTTP client
//!
//! Provides methods for searching and fetching messages from the Gmail API.
//! Uses synchronous HTTP (ureq) to be executor-agnostic.

use anyhow::{Context, Result};
use log::{debug, info, warn};
use std::time::Duration;

use super::api::{GmailMessage, ListMessagesResponse, MessageRef};
use super::{GmailAuth, normalize_message};
use crate::models::MessageId;
use crate::source::{MessageSource, PartialMessage, SearchResult};

/// Gmail API client for fetching messages
pub struct GmailClient {
    auth: GmailAuth,
    max_messages: Option<usize>,
}

impl GmailClient {
    /// Gmail API base URL
    const BASE_URL: &'static str = "https://gmail.googleapis.com/gmail/v1";

    /// Largest page the list endpoint accepts
    const PAGE_SIZE: usize = 500;

    const MAX_RETRIES: u32 = 3;

    /// Create a new Gmail client
    pub fn new(auth: GmailAuth) -> Self {
        Self {
            auth,
            max_messages: None,
        }
    }

    /// Stop listing once this many messages matched
    pub fn with_max_messages(mut self, max_messages: Option<usize>) -> Self {
        self.max_messages = max_messages;
        self
    }

    /// Trigger authentication flow
    pub fn authenticate(&self) -> Result<()> {
        self.auth.get_access_token()?;
        Ok(())
    }

    /// List message IDs matching a search query
    ///
    /// # Arguments
    /// * `user` - Mailbox owner (`me` for the authenticated user)
    /// * `query` - Gmail search query
    /// * `max_results` - Maximum number of messages to return per page (1-500)
    /// * `page_token` - Optional page token for pagination
    pub fn list_messages(
        &self,
        user: &str,
        query: &str,
        max_results: usize,
        page_token: Option<&str>,
    ) -> Result<ListMessagesResponse> {
        let access_token = self.auth.get_access_token()?;

        let mut url = format!(
            "{}/users/{}/messages?maxResults={}",
            Self::BASE_URL,
            urlencoding::encode(user),
            max_results.clamp(1, Self::PAGE_SIZE)
        );

        if !query.is_empty() {
            url.push_str(&format!("&q={}", urlencoding::encode(query)));
        }

        if let Some(token) = page_token {
            url.push_str(&format!("&pageToken={}", urlencoding::encode(token)));
        }

        let mut response = ureq::get(&url)
            .header("Authorization", &format!("Bearer {}", access_token))
            .call()
            .context("Failed to send list messages request")?;

        let list: ListMessagesResponse = response
            .body_mut()
            .read_json()
            .context("Failed to parse list messages response")?;

        Ok(list)
    }

    /// List ALL message IDs matching a query
    ///
    /// Automatically handles pagination, stopping early at `max_messages`.
    pub fn list_messages_all(
        &self,
        user: &str,
        query: &str,
        max_messages: Option<usize>,
    ) -> Result<Vec<MessageRef>> {
        let mut all_messages: Vec<MessageRef> = Vec::new();
        let mut page_token = None;

        loop {
            let page_size = match max_messages {
                Some(max) if all_messages.len() >= max => break,
                Some(max) => (max - all_messages.len()).min(Self::PAGE_SIZE),
                None => Self::PAGE_SIZE,
            };

            let response = self.list_messages(user, query, page_size, page_token.as_deref())?;

            if let Some(messages) = response.messages {
                all_messages.extend(messages);
            }

            debug!(
                "Listed {} messages (estimate {:?})",
                all_messages.len(),
                response.result_size_estimate
            );

            match response.next_page_token {
                Some(token) => page_token = Some(token),
                None => break,
            }
        }

        if let Some(max) = max_messages {
            all_messages.truncate(max);
        }

        Ok(all_messages)
    }

    /// Get full message details by ID
    pub fn get_message(&self, user: &str, id: &MessageId) -> Result<GmailMessage> {
        let access_token = self.auth.get_access_token()?;

        let url = format!(
            "{}/users/{}/messages/{}?format=full",
            Self::BASE_URL,
            urlencoding::encode(user),
            urlencoding::encode(id.as_str())
        );

        let mut response = ureq::get(&url)
            .header("Authorization", &format!("Bearer {}", access_token))
            .call()
            .context("Failed to send get message request")?;

        let message: GmailMessage = response
            .body_mut()
            .read_json()
            .context("Failed to parse message response")?;

        Ok(message)
    }

    /// Get multiple messages one after another, each with retry logic
    pub fn get_messages_batch(&self, user: &str, ids: &[MessageId]) -> Vec<Result<GmailMessage>> {
        ids.iter()
            .map(|id| self.get_message_with_retry(user, id, Self::MAX_RETRIES))
            .collect()
    }

    /// Get a message with exponential backoff retry
    fn get_message_with_retry(
        &self,
        user: &str,
        id: &MessageId,
        max_retries: u32,
    ) -> Result<GmailMessage> {
        let mut last_error = None;
        let mut delay = Duration::from_millis(100);

        for attempt in 0..max_retries {
            match self.get_message(user, id) {
                Ok(msg) => return Ok(msg),
                Err(e) => {
                    warn!("Fetching message {} failed (attempt {}): {}", id, attempt + 1, e);
                    last_error = Some(e);
                    if attempt + 1 < max_retries {
                        // Add jitter to delay
                        let jitter = Duration::from_millis(rand_jitter());
                        std::thread::sleep(delay + jitter);
                        delay *= 2;
                    }
                }
            }
        }

        Err(last_error.unwrap_or_else(|| anyhow::anyhow!("No attempt made to fetch message {}", id)))
    }
}

impl MessageSource for GmailClient {
    fn search(&self, user: &str, query: &str) -> Result<SearchResult> {
        let refs = self.list_messages_all(user, query, self.max_messages)?;
        info!("Query matched {} messages", refs.len());

        let ids: Vec<MessageId> = refs.iter().map(|r| MessageId::new(&r.id)).collect();
        let fetched = self.get_messages_batch(user, &ids);
        Ok(collect_search_result(&ids, fetched))
    }
}

/// Pair fetch results with their listed IDs, keeping list order
///
/// Fetch and normalization errors become [`PartialMessage`]s.
fn collect_search_result(ids: &[MessageId], fetched: Vec<Result<GmailMessage>>) -> SearchResult {
    let mut result = SearchResult::default();

    for (id, fetched) in ids.iter().zip(fetched) {
        match fetched.and_then(normalize_message) {
            Ok(message) => result.success.push(message),
            Err(e) => result.failed.push(PartialMessage {
                id: id.clone(),
                error: format!("{:#}", e),
            }),
        }
    }

    result
}

/// Generate a random jitter value (0-100ms)
fn rand_jitter() -> u64 {
    use std::collections::hash_map::RandomState;
    use std::hash::{BuildHasher, Hasher};

    let hasher = RandomState::new().build_hasher();
    hasher.finish() % 100
}
