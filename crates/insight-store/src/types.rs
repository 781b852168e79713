//! Row types for users, documents, chunks, and chat history.

use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

/// A user row. Created lazily on first upload, never updated.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct User {
    pub id: String,
    pub email: String,
    pub created_at: String,
}

/// A document row from the database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Document {
    pub id: String,
    pub user_id: String,
    pub file_name: String,
    pub storage_path: String,
    pub uploaded_at: String,
}

/// Listing entry returned to the owner of a document.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentSummary {
    pub id: String,
    pub file_name: String,
    pub uploaded_at: String,
}

/// Values for a document insert. The upload timestamp is assigned by the store.
#[derive(Debug, Clone)]
pub struct NewDocument {
    pub id: String,
    pub user_id: String,
    pub file_name: String,
    pub storage_path: String,
}

/// A chunk row from the database.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Chunk {
    pub id: String,
    pub document_id: String,
    pub chunk_index: i64,
    pub content: String,
    /// Reserved for vector embeddings; never populated by this crate.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub embedding: Option<String>,
}

/// Author of a chat turn.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Ai,
}

impl MessageRole {
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::User => "user",
            Self::Ai => "ai",
        }
    }
}

impl fmt::Display for MessageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, thiserror::Error)]
#[error("unknown message role: {0}")]
pub struct UnknownRole(pub String);

impl FromStr for MessageRole {
    type Err = UnknownRole;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "user" => Ok(Self::User),
            "ai" => Ok(Self::Ai),
            other => Err(UnknownRole(other.to_string())),
        }
    }
}

/// A chat history row.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct ChatTurn {
    pub id: String,
    pub document_id: String,
    pub user_id: String,
    #[serde(rename = "type")]
    pub role: MessageRole,
    pub content: String,
    pub timestamp: String,
}
