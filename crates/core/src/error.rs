use thiserror::Error;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("invalid chunking config: {0}")]
    Chunking(String),

    #[error("top_k must be between 0 and 10, got {0}")]
    TopK(usize),

    #[error("unknown response mode: {0}")]
    ResponseMode(String),

    #[error("unknown embedding model: {0}")]
    EmbeddingModel(String),

    #[error("invalid endpoint url: {0}")]
    Endpoint(#[from] url::ParseError),
}

#[derive(Debug, Error)]
pub enum LoadError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("pdf parse error: {0}")]
    PdfParse(String),

    #[error("slide parse error: {0}")]
    SlideParse(String),

    #[error("path has no file name: {0}")]
    MissingFileName(String),

    #[error("regex error: {0}")]
    Regex(#[from] regex::Error),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("extraction service failed: {0}")]
    ExtractionService(String),
}

#[derive(Debug, Error)]
pub enum IndexError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("vectorstore folder '{0}' does not exist")]
    VectorstoreMissing(String),

    #[error("embedding request failed: {0}")]
    Embedding(String),

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("serialize error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("index build failed: {0}")]
    Build(String),

    #[error(transparent)]
    Config(#[from] ConfigError),
}

#[derive(Debug, Error)]
pub enum ChatError {
    #[error("no query engine is active: {0}")]
    NotReady(String),

    #[error("translation failed: {0}")]
    Translation(String),

    #[error("retrieval failed: {0}")]
    Retrieval(String),

    #[error("invalid response from {backend}: {details}")]
    BackendResponse { backend: String, details: String },

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("serialize error: {0}")]
    Serialization(#[from] serde_json::Error),
}

pub type Result<T, E = LoadError> = std::result::Result<T, E>;
