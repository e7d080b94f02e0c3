use crate::chunking::chunk_document;
use crate::embeddings::Embedder;
use crate::error::IndexError;
use crate::index::{IndexedChunk, VectorIndex};
use crate::models::Document;
use crate::settings::Settings;
use sha2::{Digest, Sha256};
use std::path::Path;
use tracing::{debug, error, info};

/// Builds vector indexes from documents, or loads a persisted one.
///
/// Building is memoized with a single-entry cache keyed by a content digest
/// over the document set and the build-relevant settings; a repeated build
/// with identical input returns the cached index without recomputing
/// embeddings. Unbounded eviction-free caching is deliberate: one session,
/// one live document set.
pub struct IndexBuilder<E: Embedder> {
    embedder: E,
    chunk_size: usize,
    chunk_overlap: usize,
    cache: Option<(String, VectorIndex)>,
}

impl<E: Embedder> IndexBuilder<E> {
    pub fn new(embedder: E, settings: &Settings) -> Self {
        Self {
            embedder,
            chunk_size: settings.chunk_size,
            chunk_overlap: settings.chunk_overlap,
            cache: None,
        }
    }

    fn cache_key(&self, documents: &[Document]) -> String {
        let mut hasher = Sha256::new();
        hasher.update(self.embedder.model_id().as_bytes());
        hasher.update(self.chunk_size.to_le_bytes());
        hasher.update(self.chunk_overlap.to_le_bytes());
        for document in documents {
            hasher.update(document.metadata.file_name.as_bytes());
            hasher.update([0u8]);
            hasher.update(document.text.as_bytes());
            hasher.update([0u8]);
        }
        format!("{:x}", hasher.finalize())
    }

    pub async fn build(&mut self, documents: &[Document]) -> Result<VectorIndex, IndexError> {
        let key = self.cache_key(documents);
        if let Some((cached_key, index)) = &self.cache {
            if *cached_key == key {
                debug!("index cache hit, skipping embedding");
                return Ok(index.clone());
            }
        }

        let index = self.build_uncached(documents).await.map_err(|err| {
            error!(%err, "index creation failed");
            IndexError::Build(err.to_string())
        })?;

        self.cache = Some((key, index.clone()));
        Ok(index)
    }

    async fn build_uncached(&self, documents: &[Document]) -> Result<VectorIndex, IndexError> {
        let mut chunks = Vec::new();
        let mut cursor = 0u64;
        for document in documents {
            let (doc_chunks, next) =
                chunk_document(document, self.chunk_size, self.chunk_overlap, cursor)?;
            cursor = next;
            chunks.extend(doc_chunks);
        }

        let texts: Vec<String> = chunks.iter().map(|chunk| chunk.text.clone()).collect();
        let embeddings = self.embedder.embed(&texts).await?;

        if embeddings.len() != chunks.len() {
            return Err(IndexError::Embedding(format!(
                "got {} embeddings for {} chunks",
                embeddings.len(),
                chunks.len()
            )));
        }

        let entries = chunks
            .into_iter()
            .zip(embeddings)
            .map(|(chunk, embedding)| IndexedChunk { chunk, embedding })
            .collect();

        let index = VectorIndex::new(entries)?;
        info!(
            documents = documents.len(),
            chunks = index.len(),
            "index created from loaded documents"
        );
        Ok(index)
    }

    /// Reconstructs an index from the persisted vectorstore directory; the
    /// directory must exist.
    pub fn load(&self, dir: &Path) -> Result<VectorIndex, IndexError> {
        VectorIndex::load(dir).map_err(|err| {
            error!(%err, dir = %dir.display(), "loading persisted index failed");
            err
        })
    }
}
