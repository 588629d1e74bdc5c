use crate::error::QaError;
use crate::models::{Chunk, Document};
use chrono::Utc;
use sha2::{Digest, Sha256};
use std::str::SplitWhitespace;

pub const DEFAULT_CHUNK_SIZE: usize = 500;

/// Lazily yields consecutive, non-overlapping runs of at most `chunk_size`
/// whitespace-delimited words, joined by single spaces.
#[derive(Debug, Clone)]
pub struct WordChunks<'a> {
    words: SplitWhitespace<'a>,
    chunk_size: usize,
}

impl<'a> Iterator for WordChunks<'a> {
    type Item = String;

    fn next(&mut self) -> Option<Self::Item> {
        let mut piece = String::new();
        for word in self.words.by_ref().take(self.chunk_size) {
            if !piece.is_empty() {
                piece.push(' ');
            }
            piece.push_str(word);
        }

        if piece.is_empty() {
            None
        } else {
            Some(piece)
        }
    }
}

pub fn chunk_words(text: &str, chunk_size: usize) -> Result<WordChunks<'_>, QaError> {
    if chunk_size == 0 {
        return Err(QaError::InvalidInput(
            "chunk_size must be greater than zero".to_string(),
        ));
    }

    Ok(WordChunks {
        words: text.split_whitespace(),
        chunk_size,
    })
}

pub fn build_chunks(
    document_id: &str,
    text: &str,
    chunk_size: usize,
) -> Result<Vec<Chunk>, QaError> {
    Ok(chunk_words(text, chunk_size)?
        .enumerate()
        .map(|(chunk_index, piece)| Chunk {
            chunk_id: make_chunk_id(document_id, chunk_index, &piece),
            chunk_index,
            word_count: piece.split(' ').count(),
            text: piece,
            embedding: None,
        })
        .collect())
}

/// Builds a document from already extracted text. The identity is derived from
/// the source path when known, otherwise from the title.
pub fn build_document(
    title: impl Into<String>,
    source_path: Option<String>,
    text: impl Into<String>,
    chunk_size: usize,
) -> Result<Document, QaError> {
    let title = title.into();
    let text = text.into();
    let document_id = digest(source_path.as_deref().unwrap_or(&title).as_bytes());
    let chunks = build_chunks(&document_id, &text, chunk_size)?;

    Ok(Document {
        checksum: digest(text.as_bytes()),
        document_id,
        title,
        source_path,
        ingested_at: Utc::now(),
        text,
        chunks,
    })
}

fn make_chunk_id(document_id: &str, index: usize, text: &str) -> String {
    let mut hasher = Sha256::new();
    hasher.update(document_id.as_bytes());
    hasher.update((index as u64).to_le_bytes());
    hasher.update(text.as_bytes());
    format!("{:x}", hasher.finalize())
}

fn digest(bytes: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(bytes);
    format!("{:x}", hasher.finalize())
}
