//! Core data models used throughout docbox.
//!
//! These types represent the namespaces, chats, and messages persisted in
//! SQLite, plus the ephemeral chunks and vector records that flow through the
//! upload and retrieval pipeline.

use serde::{Deserialize, Serialize};

/// Current unix timestamp in seconds.
pub fn now_ts() -> i64 {
    chrono::Utc::now().timestamp()
}

/// Format a unix timestamp as ISO8601 for wire responses.
pub fn format_ts_iso(ts: i64) -> String {
    chrono::DateTime::from_timestamp(ts, 0)
        .map(|dt| dt.format("%Y-%m-%dT%H:%M:%SZ").to_string())
        .unwrap_or_else(|| ts.to_string())
}

/// Isolation boundary for one owner's document collection and its chats.
#[derive(Debug, Clone, Serialize)]
pub struct Namespace {
    pub id: String,
    pub owner_id: String,
    pub name: String,
    pub description: Option<String>,
    pub created_at: String,
    pub updated_at: String,
}

/// A conversation thread within a namespace. The title starts as the
/// placeholder and is replaced by a generated summary after the first
/// exchange.
#[derive(Debug, Clone, Serialize)]
pub struct Chat {
    pub id: String,
    pub owner_id: String,
    pub namespace_id: String,
    pub title: String,
    pub created_at: String,
    pub updated_at: String,
}

/// Placeholder title for a freshly created chat.
pub const NEW_CHAT_TITLE: &str = "New Chat";

/// Sender role of a persisted message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            MessageRole::User => "user",
            MessageRole::Assistant => "assistant",
        }
    }

    pub fn parse(s: &str) -> Option<Self> {
        match s {
            "user" => Some(MessageRole::User),
            "assistant" => Some(MessageRole::Assistant),
            _ => None,
        }
    }
}

/// A retrieved source document attached to an assistant message for citation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceDoc {
    pub text: String,
    pub filename: String,
    pub source: String,
}

/// One turn of a chat, ordered by creation time within its chat.
#[derive(Debug, Clone, Serialize)]
pub struct Message {
    pub id: String,
    pub chat_id: String,
    pub namespace_id: String,
    pub owner_id: String,
    pub sender: MessageRole,
    pub content: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub source_docs: Option<Vec<SourceDoc>>,
    pub created_at: String,
    pub updated_at: String,
}

/// Ephemeral chunk of an uploaded document. Never persisted locally —
/// converted straight into a vector record during upload.
#[derive(Debug, Clone)]
pub struct DocumentChunk {
    pub text: String,
    pub filename: String,
    pub chunk_index: usize,
    pub total_chunks: usize,
}

/// Metadata stored alongside each vector in the external index.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ChunkMetadata {
    pub text: String,
    pub filename: String,
    pub source: String,
    #[serde(rename = "chunkIndex")]
    pub chunk_index: String,
    #[serde(rename = "totalChunks")]
    pub total_chunks: String,
    pub namespace: String,
}

/// A record upserted into the external vector index.
#[derive(Debug, Clone, Serialize)]
pub struct VectorRecord {
    pub id: String,
    pub values: Vec<f32>,
    pub metadata: ChunkMetadata,
}

/// A scored match returned from a namespaced similarity query.
#[derive(Debug, Clone)]
pub struct VectorMatch {
    pub id: String,
    pub score: f32,
    pub metadata: Option<ChunkMetadata>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn role_roundtrip() {
        assert_eq!(MessageRole::parse("user"), Some(MessageRole::User));
        assert_eq!(MessageRole::parse("assistant"), Some(MessageRole::Assistant));
        assert_eq!(MessageRole::parse("system"), None);
        assert_eq!(MessageRole::User.as_str(), "user");
    }

    #[test]
    fn iso_formatting() {
        assert_eq!(format_ts_iso(0), "1970-01-01T00:00:00Z");
    }
}
