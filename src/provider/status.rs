//! Response status sanitization.
//!
//! The cloud API answers every call with an HTTP status and, on failure,
//! a JSON error document. This module turns that pair into either `Ok(())`
//! or a short, single-line [`ApiError::Status`].

use std::collections::HashMap;
use std::sync::OnceLock;

use regex_lite::Regex;

use super::error::{ApiError, ApiResult};

/// Override table of per-status-code messages.
///
/// Failure codes found in the table get their message used as a prefix of
/// the error. Success codes found in the table are only logged.
#[derive(Debug, Clone)]
pub struct StatusMessages {
    messages: HashMap<u16, String>,
}

impl Default for StatusMessages {
    fn default() -> Self {
        Self::empty()
            .with(404, "resource is missing")
            .with(401, "authentication failed")
    }
}

impl StatusMessages {
    /// Create a table without any overrides
    pub fn empty() -> Self {
        Self {
            messages: HashMap::new(),
        }
    }

    /// Add or replace the message for a status code
    pub fn with(mut self, status: u16, message: impl Into<String>) -> Self {
        self.messages.insert(status, message.into());
        self
    }

    /// Get the message registered for a status code
    pub fn get(&self, status: u16) -> Option<&str> {
        self.messages.get(&status).map(String::as_str)
    }
}

/// Check a response status against the override table.
///
/// Codes below 300 never fail; if the table knows them the message is logged.
/// Codes from 300 up always fail, with the table message (if any) prepended.
pub fn sanitize_response(status: u16, message: &str, messages: &StatusMessages) -> ApiResult<()> {
    if status < 300 {
        if let Some(note) = messages.get(status) {
            tracing::info!("{}", note);
        }
        return Ok(());
    }

    Err(status_error(status, message, messages))
}

/// Build the error for a failure status code.
pub fn status_error(status: u16, message: &str, messages: &StatusMessages) -> ApiError {
    let prefix = messages
        .get(status)
        .map(|m| format!("{}: ", m))
        .unwrap_or_default();

    ApiError::status(status, format!("{}{}", prefix, message))
}

/// Shorten a raw API error body into a human readable line.
///
/// The API reports errors as `{"httpStatus": 404, "messages": [{"errorCode": "309",
/// "message": "Resource does not exist"}]}`. The `message` fields are extracted
/// when present; any other JSON is compacted, and anything else has its
/// whitespace collapsed.
pub fn shorten_error_body(body: &str) -> String {
    let trimmed = body.trim();
    if trimmed.is_empty() {
        return String::new();
    }

    match serde_json::from_str::<serde_json::Value>(trimmed) {
        Ok(json) => {
            let extracted = extract_messages(&json);
            if extracted.is_empty() {
                json.to_string()
            } else {
                extracted.join("; ")
            }
        }
        Err(_) => collapse_whitespace(trimmed),
    }
}

fn extract_messages(json: &serde_json::Value) -> Vec<String> {
    let Some(messages) = json.get("messages") else {
        return Vec::new();
    };

    let entries = match messages {
        serde_json::Value::Array(items) => items.iter().collect::<Vec<_>>(),
        other => vec![other],
    };

    entries
        .into_iter()
        .filter_map(|entry| entry.get("message"))
        .filter_map(|message| message.as_str())
        .map(collapse_whitespace)
        .collect()
}

fn collapse_whitespace(s: &str) -> String {
    static WHITESPACE: OnceLock<Option<Regex>> = OnceLock::new();
    match WHITESPACE.get_or_init(|| Regex::new(r"\s+").ok()) {
        Some(re) => re.replace_all(s.trim(), " ").into_owned(),
        None => s.split_whitespace().collect::<Vec<_>>().join(" "),
    }
}
