use crate::error::ConfigError;
use crate::models::{DocChunk, Document};
use sha2::{Digest, Sha256};

/// Collapses runs of spaces and tabs inside each line while keeping blank
/// lines intact, so paragraph boundaries survive normalization.
pub fn normalize_text(text: &str) -> String {
    let mut lines = Vec::new();
    for line in text.replace('\u{a0}', " ").lines() {
        lines.push(line.split_whitespace().collect::<Vec<_>>().join(" "));
    }
    lines.join("\n")
}

fn validate_sizes(chunk_size: usize, chunk_overlap: usize) -> Result<(), ConfigError> {
    if chunk_size == 0 || chunk_overlap == 0 {
        return Err(ConfigError::Chunking(
            "chunk size and overlap must be positive".to_string(),
        ));
    }
    if chunk_overlap >= chunk_size {
        return Err(ConfigError::Chunking(format!(
            "chunk overlap {chunk_overlap} must be smaller than chunk size {chunk_size}"
        )));
    }
    Ok(())
}

/// Splits normalized text into chunks of at most `chunk_size` characters.
/// Paragraphs are packed together while they fit; a paragraph longer than
/// the budget is sliced with `chunk_overlap` characters carried between
/// consecutive slices.
pub fn split_text(
    text: &str,
    chunk_size: usize,
    chunk_overlap: usize,
) -> Result<Vec<String>, ConfigError> {
    validate_sizes(chunk_size, chunk_overlap)?;

    let normalized = normalize_text(text);
    let paragraphs: Vec<&str> = normalized
        .split("\n\n")
        .map(str::trim)
        .filter(|paragraph| !paragraph.is_empty())
        .collect();

    let mut packed: Vec<String> = Vec::new();
    let mut current = String::new();

    for paragraph in paragraphs {
        if current.is_empty() {
            current.push_str(paragraph);
        } else if current.chars().count() + paragraph.chars().count() + 2 <= chunk_size {
            current.push_str("\n\n");
            current.push_str(paragraph);
        } else {
            packed.push(std::mem::take(&mut current));
            current.push_str(paragraph);
        }
    }
    if !current.is_empty() {
        packed.push(current);
    }

    let stride = chunk_size - chunk_overlap;
    let mut chunks = Vec::new();
    for block in packed {
        let chars: Vec<char> = block.chars().collect();
        if chars.len() <= chunk_size {
            chunks.push(block);
            continue;
        }

        let mut start = 0;
        while start < chars.len() {
            let end = (start + chunk_size).min(chars.len());
            chunks.push(chars[start..end].iter().collect());
            if end == chars.len() {
                break;
            }
            start += stride;
        }
    }

    Ok(chunks)
}

/// Chunks one document, assigning content-hashed chunk ids and contiguous
/// indices starting at `start_index`. Returns the chunks and the next free
/// index so a multi-document build keeps indices unique.
pub fn chunk_document(
    document: &Document,
    chunk_size: usize,
    chunk_overlap: usize,
    start_index: u64,
) -> Result<(Vec<DocChunk>, u64), ConfigError> {
    let pieces = split_text(&document.text, chunk_size, chunk_overlap)?;
    let file_name = &document.metadata.file_name;

    let mut cursor = start_index;
    let mut chunks = Vec::with_capacity(pieces.len());
    for text in pieces {
        chunks.push(DocChunk {
            chunk_id: make_chunk_id(file_name, cursor, &text),
            file_name: file_name.clone(),
            chunk_index: cursor,
            text,
        });
        cursor = cursor.saturating_add(1);
    }

    Ok((chunks, cursor))
}

fn make_chunk_id(file_name: &str, index: u64, text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(file_name.as_bytes());
    hasher.update(index.to_le_bytes());
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}
