use crate::error::ConfigError;
use crate::models::ResponseMode;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::path::PathBuf;
use std::str::FromStr;
use url::Url;

pub const MAX_TOP_K: usize = 10;

/// Embedding model selection: a closed list of known models plus an
/// `other:<name>` escape hatch for anything the list does not carry.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub enum EmbeddingModel {
    Default,
    Large,
    MultilingualMiniLm,
    RosettaJa,
    Other(String),
}

impl EmbeddingModel {
    pub fn model_name(&self) -> &str {
        match self {
            Self::Default => "bge-large-en-v1.5",
            Self::Large => "Salesforce/SFR-Embedding-Mistral",
            Self::MultilingualMiniLm => "paraphrase-multilingual-MiniLM-L12-v2",
            Self::RosettaJa => "RoSEtta-base-ja",
            Self::Other(name) => name,
        }
    }

    /// Expected vector width for the named model, used to validate embedding
    /// responses before they reach the index.
    pub fn dimensions(&self) -> usize {
        match self {
            Self::Default => 1024,
            Self::Large => 4096,
            Self::MultilingualMiniLm => 384,
            Self::RosettaJa => 768,
            Self::Other(_) => 768,
        }
    }
}

impl Default for EmbeddingModel {
    fn default() -> Self {
        Self::Default
    }
}

impl fmt::Display for EmbeddingModel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.model_name())
    }
}

impl FromStr for EmbeddingModel {
    type Err = ConfigError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value {
            "default" | "bge-large-en-v1.5" => Ok(Self::Default),
            "large" | "Salesforce/SFR-Embedding-Mistral" => Ok(Self::Large),
            "paraphrase-multilingual-MiniLM-L12-v2" => Ok(Self::MultilingualMiniLm),
            "RoSEtta-base-ja" => Ok(Self::RosettaJa),
            other => match other.strip_prefix("other:") {
                Some(name) if !name.trim().is_empty() => Ok(Self::Other(name.trim().to_string())),
                _ => Err(ConfigError::EmbeddingModel(other.to_string())),
            },
        }
    }
}

/// Process-lifetime configuration read by the index builder and the query
/// engine factory at build/create time.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Settings {
    pub ollama_endpoint: String,
    pub model: String,
    pub embedding_model: EmbeddingModel,
    pub chunk_size: usize,
    pub chunk_overlap: usize,
    pub top_k: usize,
    pub response_mode: ResponseMode,
    pub vectorstore_path: PathBuf,
    pub staging_dir: PathBuf,
    pub translate_input: bool,
    pub translation_target: String,
    pub translation_endpoint: Option<String>,
    pub advanced: bool,
}

impl Default for Settings {
    fn default() -> Self {
        Self {
            ollama_endpoint: "http://localhost:11434".to_string(),
            model: String::new(),
            embedding_model: EmbeddingModel::default(),
            chunk_size: 1024,
            chunk_overlap: 200,
            top_k: 3,
            response_mode: ResponseMode::default(),
            vectorstore_path: PathBuf::from("./vectordb"),
            staging_dir: PathBuf::from("./data"),
            translate_input: false,
            translation_target: "ja".to_string(),
            translation_endpoint: None,
            advanced: false,
        }
    }
}

impl Settings {
    /// Type coercion aside, the only hard rules: bounded top-k, positive
    /// chunk sizing with overlap smaller than the chunk, and a parseable
    /// endpoint.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.top_k > MAX_TOP_K {
            return Err(ConfigError::TopK(self.top_k));
        }

        if self.chunk_size == 0 {
            return Err(ConfigError::Chunking("chunk size must be positive".to_string()));
        }

        if self.chunk_overlap == 0 {
            return Err(ConfigError::Chunking(
                "chunk overlap must be positive".to_string(),
            ));
        }

        if self.chunk_overlap >= self.chunk_size {
            return Err(ConfigError::Chunking(format!(
                "chunk overlap {} must be smaller than chunk size {}",
                self.chunk_overlap, self.chunk_size
            )));
        }

        Url::parse(&self.ollama_endpoint)?;

        if let Some(endpoint) = &self.translation_endpoint {
            Url::parse(endpoint)?;
        }

        Ok(())
    }
}
