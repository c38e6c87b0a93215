//! Gmail API response normalization
//!
//! Converts a `format=full` Gmail message into a header map and an optional
//! plain-text body.

use anyhow::{Context, Result};
use base64::prelude::*;
use log::debug;

use super::api::{GmailMessage, Header, MessagePart, MessagePayload};
use crate::models::Message;

/// Multipart containers searched for a `text/plain` part
const MULTIPART_CONTAINERS: [&str; 2] = ["multipart/alternative", "multipart/mixed"];

/// Normalize a Gmail API message
///
/// Headers keep their exact names; when a name repeats, the last one wins.
/// A message without a supported `text/plain` body is still returned, with
/// the body absent.
pub fn normalize_message(gmail_msg: GmailMessage) -> Result<Message> {
    let payload = gmail_msg
        .payload
        .as_ref()
        .with_context(|| format!("Message {} has no payload", gmail_msg.id))?;

    let headers = payload
        .headers
        .iter()
        .flatten()
        .map(|Header { name, value }| (name.clone(), value.clone()));

    let body = extract_plain_text_body(payload);
    if body.is_none() {
        debug!(
            "Message {} has no text/plain body (mime type {:?})",
            gmail_msg.id, payload.mime_type
        );
    }

    Ok(Message::builder(gmail_msg.id.as_str())
        .headers(headers)
        .body(body)
        .build())
}

fn is_mime(mime_type: Option<&String>, expected: &str) -> bool {
    mime_type.is_some_and(|m| {
        m.split(';')
            .next()
            .is_some_and(|m| m.trim().eq_ignore_ascii_case(expected))
    })
}

fn is_container(mime_type: Option<&String>) -> bool {
    MULTIPART_CONTAINERS
        .iter()
        .any(|container| is_mime(mime_type, container))
}

/// Extract plain text body from message payload
fn extract_plain_text_body(payload: &MessagePayload) -> Option<String> {
    let mime_type = payload.mime_type.as_ref();

    if is_mime(mime_type, "text/plain") {
        return payload
            .body
            .as_ref()
            .and_then(|b| b.data.as_deref())
            .and_then(decode_base64_body);
    }

    if is_container(mime_type) {
        return payload.parts.as_deref().and_then(find_plain_text_in_parts);
    }

    None
}

/// Search parts for text/plain content, descending into nested containers
fn find_plain_text_in_parts(parts: &[MessagePart]) -> Option<String> {
    for part in parts {
        let mime_type = part.mime_type.as_ref();

        if is_mime(mime_type, "text/plain")
            && let Some(body) = &part.body
            && let Some(data) = &body.data
            && let Some(text) = decode_base64_body(data)
        {
            return Some(text);
        }

        if is_container(mime_type)
            && let Some(nested) = &part.parts
            && let Some(text) = find_plain_text_in_parts(nested)
        {
            return Some(text);
        }
    }

    None
}

/// Decode base64-encoded body data
///
/// Gmail uses URL-safe base64 but padding can vary, so we try multiple decoders.
fn decode_base64_body(data: &str) -> Option<String> {
    use base64::engine::general_purpose::{STANDARD, STANDARD_NO_PAD, URL_SAFE};

    let decoders: &[&base64::engine::GeneralPurpose] =
        &[&BASE64_URL_SAFE_NO_PAD, &URL_SAFE, &STANDARD, &STANDARD_NO_PAD];

    for decoder in decoders {
        if let Ok(decoded) = decoder.decode(data)
            && let Ok(s) = String::from_utf8(decoded)
        {
            return Some(s);
        }
    }

    None
}
