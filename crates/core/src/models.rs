use crate::error::ConfigError;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocMetadata {
    pub file_name: String,
}

/// A parsed source file: plain text plus the metadata carried into retrieval
/// provenance. Immutable once created; consumed by the index builder.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Document {
    pub text: String,
    pub metadata: DocMetadata,
}

impl Document {
    pub fn new(text: impl Into<String>, file_name: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            metadata: DocMetadata {
                file_name: file_name.into(),
            },
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DocChunk {
    pub chunk_id: String,
    pub file_name: String,
    pub chunk_index: u64,
    pub text: String,
}

/// Strategy for composing retrieved chunks into a final answer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ResponseMode {
    Compact,
    Refine,
    TreeSummarize,
    SimpleSummarize,
    Accumulate,
    CompactAccumulate,
}

impl Default for ResponseMode {
    fn default() -> Self {
        Self::Compact
    }
}

impl ResponseMode {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Compact => "compact",
            Self::Refine => "refine",
            Self::TreeSummarize => "tree_summarize",
            Self::SimpleSummarize => "simple_summarize",
            Self::Accumulate => "accumulate",
            Self::CompactAccumulate => "compact_accumulate",
        }
    }
}

impl fmt::Display for ResponseMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ResponseMode {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "compact" => Ok(Self::Compact),
            "refine" => Ok(Self::Refine),
            "tree_summarize" => Ok(Self::TreeSummarize),
            "simple_summarize" => Ok(Self::SimpleSummarize),
            "accumulate" => Ok(Self::Accumulate),
            "compact_accumulate" => Ok(Self::CompactAccumulate),
            other => Err(ConfigError::ResponseMode(other.to_string())),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatRole {
    User,
    Assistant,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ChatMessage {
    pub role: ChatRole,
    pub content: String,
}

impl ChatMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: ChatRole::Assistant,
            content: content.into(),
        }
    }
}

const SNIPPET_MAX_CHARS: usize = 240;

/// Retrieval provenance attached to an assistant turn.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SourceAttribution {
    pub file_name: String,
    pub snippet: String,
    pub score: f32,
}

impl SourceAttribution {
    pub fn from_chunk(chunk: &DocChunk, score: f32) -> Self {
        let snippet = if chunk.text.chars().count() > SNIPPET_MAX_CHARS {
            let cut: String = chunk.text.chars().take(SNIPPET_MAX_CHARS).collect();
            format!("{cut}…")
        } else {
            chunk.text.clone()
        };

        Self {
            file_name: chunk.file_name.clone(),
            snippet,
            score,
        }
    }
}
