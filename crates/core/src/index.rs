use crate::error::IndexError;
use crate::models::DocChunk;
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use tracing::info;

const INDEX_FILE: &str = "index.json";

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexedChunk {
    pub chunk: DocChunk,
    pub embedding: Vec<f32>,
}

/// The active retrieval structure: embedded chunks plus the vector width
/// they were embedded at. Replaced wholesale on rebuild or reload, never
/// partially mutated.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct VectorIndex {
    dimensions: usize,
    entries: Vec<IndexedChunk>,
}

#[derive(Debug, Clone, PartialEq)]
pub struct Retrieved {
    pub chunk: DocChunk,
    pub score: f32,
}

impl VectorIndex {
    pub fn new(entries: Vec<IndexedChunk>) -> Result<Self, IndexError> {
        let dimensions = entries
            .first()
            .map(|entry| entry.embedding.len())
            .unwrap_or(0);

        for entry in &entries {
            if entry.embedding.len() != dimensions {
                return Err(IndexError::Build(format!(
                    "embedding dimension {} != {} for chunk {}",
                    entry.embedding.len(),
                    dimensions,
                    entry.chunk.chunk_id
                )));
            }
        }

        Ok(Self {
            dimensions,
            entries,
        })
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    /// Cosine retrieval of the `top_k` most similar chunks. A `top_k` of
    /// zero is valid and retrieves nothing.
    pub fn search(&self, query: &[f32], top_k: usize) -> Result<Vec<Retrieved>, IndexError> {
        if top_k == 0 || self.entries.is_empty() {
            return Ok(Vec::new());
        }

        if query.len() != self.dimensions {
            return Err(IndexError::Build(format!(
                "query vector dim {} is not {}",
                query.len(),
                self.dimensions
            )));
        }

        let mut scored: Vec<Retrieved> = self
            .entries
            .iter()
            .map(|entry| Retrieved {
                chunk: entry.chunk.clone(),
                score: cosine_similarity(query, &entry.embedding),
            })
            .collect();

        scored.sort_by(|left, right| right.score.total_cmp(&left.score));
        scored.truncate(top_k);
        Ok(scored)
    }

    /// Writes the index into the vectorstore directory, creating it if
    /// needed.
    pub fn persist(&self, dir: &Path) -> Result<(), IndexError> {
        fs::create_dir_all(dir)?;
        let serialized = serde_json::to_vec(self)?;
        fs::write(dir.join(INDEX_FILE), serialized)?;
        info!(dir = %dir.display(), chunks = self.entries.len(), "index persisted");
        Ok(())
    }

    /// Reconstructs an index from a persisted vectorstore directory. The
    /// directory must already exist.
    pub fn load(dir: &Path) -> Result<Self, IndexError> {
        if !dir.exists() {
            return Err(IndexError::VectorstoreMissing(dir.display().to_string()));
        }

        let bytes = fs::read(dir.join(INDEX_FILE))?;
        let index: Self = serde_json::from_slice(&bytes)?;
        info!(dir = %dir.display(), chunks = index.entries.len(), "index loaded from storage");
        Ok(index)
    }
}

fn cosine_similarity(a: &[f32], b: &[f32]) -> f32 {
    let dot: f32 = a.iter().zip(b).map(|(x, y)| x * y).sum();
    let norm_a: f32 = a.iter().map(|x| x * x).sum::<f32>().sqrt();
    let norm_b: f32 = b.iter().map(|x| x * x).sum::<f32>().sqrt();
    if norm_a == 0.0 || norm_b == 0.0 {
        return 0.0;
    }
    dot / (norm_a * norm_b)
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    fn chunk(id: &str, text: &str) -> DocChunk {
        DocChunk {
            chunk_id: id.to_string(),
            file_name: "test.txt".to_string(),
            chunk_index: 0,
            text: text.to_string(),
        }
    }

    fn sample_index() -> VectorIndex {
        VectorIndex::new(vec![
            IndexedChunk {
                chunk: chunk("a", "first"),
                embedding: vec![1.0, 0.0, 0.0],
            },
            IndexedChunk {
                chunk: chunk("b", "second"),
                embedding: vec![0.0, 1.0, 0.0],
            },
            IndexedChunk {
                chunk: chunk("c", "third"),
                embedding: vec![0.7, 0.7, 0.0],
            },
        ])
        .unwrap()
    }

    #[test]
    fn mismatched_dimensions_are_rejected_at_construction() {
        let result = VectorIndex::new(vec![
            IndexedChunk {
                chunk: chunk("a", "first"),
                embedding: vec![1.0, 0.0],
            },
            IndexedChunk {
                chunk: chunk("b", "second"),
                embedding: vec![1.0],
            },
        ]);
        assert!(matches!(result, Err(IndexError::Build(_))));
    }

    #[test]
    fn search_ranks_by_cosine_similarity() {
        let index = sample_index();
        let hits = index.search(&[1.0, 0.1, 0.0], 2).unwrap();

        assert_eq!(hits.len(), 2);
        assert_eq!(hits[0].chunk.chunk_id, "a");
        assert!(hits[0].score > hits[1].score);
    }

    #[test]
    fn top_k_zero_retrieves_nothing() {
        let index = sample_index();
        assert!(index.search(&[1.0, 0.0, 0.0], 0).unwrap().is_empty());
    }

    #[test]
    fn wrong_query_width_is_an_error() {
        let index = sample_index();
        assert!(index.search(&[1.0, 0.0], 3).is_err());
    }

    #[test]
    fn persist_then_load_round_trips() {
        let dir = tempdir().unwrap();
        let store = dir.path().join("vectordb");

        let index = sample_index();
        index.persist(&store).unwrap();

        let loaded = VectorIndex::load(&store).unwrap();
        assert_eq!(loaded, index);
    }

    #[test]
    fn loading_a_missing_folder_is_a_distinct_error() {
        let dir = tempdir().unwrap();
        let result = VectorIndex::load(&dir.path().join("absent"));
        assert!(matches!(result, Err(IndexError::VectorstoreMissing(_))));
    }
}
