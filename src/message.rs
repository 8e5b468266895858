// src/message.rs
use serde::{Deserialize, Serialize};
use std::fmt;

use crate::error::DeletionError;

/// Reported in place of the content of a deleted message that had none
/// (attachments, embeds, stickers).
pub const CONTENT_PLACEHOLDER: &str = "[no content]";

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Author {
    pub id: String,
}

/// A message as returned by the list endpoint. Only the fields the engine
/// needs are decoded; everything else in the payload is ignored.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RemoteMessage {
    pub id: String,
    pub author: Author,
    #[serde(default)]
    pub content: Option<String>,
}

impl RemoteMessage {
    pub fn new(id: &str, author_id: &str, content: Option<&str>) -> Self {
        Self {
            id: id.to_string(),
            author: Author {
                id: author_id.to_string(),
            },
            content: content.map(str::to_string),
        }
    }

    pub fn author_id(&self) -> &str {
        &self.author.id
    }

    /// Text to report once this message is deleted.
    pub fn display_content(&self) -> String {
        match self.content.as_deref() {
            Some(text) if !text.is_empty() => text.to_string(),
            _ => CONTENT_PLACEHOLDER.to_string(),
        }
    }
}

/// Opaque authorization token, sent verbatim in the `Authorization` header.
#[derive(Clone, Deserialize)]
#[serde(transparent)]
pub struct Credential(String);

impl Credential {
    pub fn new(token: impl Into<String>) -> Self {
        Self(token.into())
    }

    pub fn expose(&self) -> &str {
        &self.0
    }

    pub fn is_blank(&self) -> bool {
        self.0.trim().is_empty()
    }
}

impl fmt::Debug for Credential {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str("Credential(***)")
    }
}

/// Body of a start request. Accepts the field names of the web form
/// (`session_token`) as well as camelCase.
#[derive(Debug, Clone, Deserialize)]
pub struct DeletionRequest {
    #[serde(alias = "userId")]
    pub user_id: String,
    #[serde(alias = "channelId")]
    pub channel_id: String,
    #[serde(alias = "session_token")]
    pub credential: Credential,
}

impl DeletionRequest {
    pub fn new(user_id: &str, channel_id: &str, credential: Credential) -> Self {
        Self {
            user_id: user_id.to_string(),
            channel_id: channel_id.to_string(),
            credential,
        }
    }

    pub fn validate(&self) -> Result<(), DeletionError> {
        if self.user_id.trim().is_empty() {
            return Err(DeletionError::InvalidRequest("user_id is required".into()));
        }
        if self.channel_id.trim().is_empty() {
            return Err(DeletionError::InvalidRequest(
                "channel_id is required".into(),
            ));
        }
        if self.credential.is_blank() {
            return Err(DeletionError::InvalidRequest(
                "session_token is required".into(),
            ));
        }
        Ok(())
    }
}

/// Outcome of a run: contents of the deleted messages in deletion order.
///
/// Only [`DeletionResult::record`] grows the list, which keeps `total`
/// equal to its length.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
pub struct DeletionResult {
    deleted_messages: Vec<String>,
    total: usize,
    /// Set when the run stopped at a cancellation checkpoint.
    #[serde(skip)]
    cancelled: bool,
}

impl DeletionResult {
    pub fn record(&mut self, content: String) {
        self.deleted_messages.push(content);
        self.total = self.deleted_messages.len();
    }

    pub fn mark_cancelled(&mut self) {
        self.cancelled = true;
    }

    pub fn deleted_messages(&self) -> &[String] {
        &self.deleted_messages
    }

    pub fn total(&self) -> usize {
        self.total
    }

    pub fn is_cancelled(&self) -> bool {
        self.cancelled
    }
}
