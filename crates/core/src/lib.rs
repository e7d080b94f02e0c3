pub mod builder;
pub mod chunking;
pub mod embeddings;
pub mod engine;
pub mod error;
pub mod extract;
pub mod index;
pub mod loader;
pub mod models;
pub mod ollama;
pub mod session;
pub mod settings;
pub mod translate;

pub use builder::IndexBuilder;
pub use chunking::{chunk_document, normalize_text, split_text};
pub use embeddings::{Embedder, HashingEmbedder, OllamaEmbedder, HASHING_EMBEDDING_DIMENSIONS};
pub use engine::{create_query_engine, QueryEngine, QueryOutcome};
pub use error::{ChatError, ConfigError, IndexError, LoadError};
pub use extract::{extract_pdf_text, extract_slides_text, ExtractionServiceConfig};
pub use index::{IndexedChunk, Retrieved, VectorIndex};
pub use loader::load_documents;
pub use models::{
    ChatMessage, ChatRole, DocChunk, DocMetadata, Document, ResponseMode, SourceAttribution,
};
pub use ollama::{LanguageModel, OllamaClient, TokenStream};
pub use session::{SessionContext, TranscriptExport, TurnOutcome};
pub use settings::{EmbeddingModel, Settings, MAX_TOP_K};
pub use translate::{HttpTranslator, NoopTranslator, Translator};
