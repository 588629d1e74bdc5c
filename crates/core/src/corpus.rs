//! Read-only corpus snapshots and their atomic replacement.
//!
//! Queries clone the current `Arc<CorpusIndex>` and keep using it for their
//! whole lifetime. A rebuild constructs a new snapshot off to the side and
//! swaps the pointer once it is complete, so queries never wait on indexing
//! and never observe a half-built index.

use crate::embeddings::Embedder;
use crate::error::QaError;
use crate::index::FlatL2Index;
use crate::models::{Chunk, ChunkRef, Document};
use crate::traits::VectorIndex;
use chrono::{DateTime, Utc};
use std::sync::{Arc, RwLock};
use tokio::sync::Mutex;
use tracing::{info, warn};

#[derive(Debug)]
pub struct CorpusIndex {
    documents: Vec<Document>,
    index: FlatL2Index<ChunkRef>,
    built_at: DateTime<Utc>,
}

impl CorpusIndex {
    /// Embeds every chunk of every document and indexes it by chunk.
    pub fn build(mut documents: Vec<Document>, embedder: &dyn Embedder) -> Result<Self, QaError> {
        let mut entries = Vec::new();

        for (document_position, document) in documents.iter_mut().enumerate() {
            let texts = document
                .chunks
                .iter()
                .map(|chunk| chunk.text.clone())
                .collect::<Vec<_>>();
            let vectors = embedder.embed_batch(&texts);
            if vectors.len() != texts.len() {
                return Err(QaError::InvalidInput(format!(
                    "embedder returned {} vectors for {} chunks of {}",
                    vectors.len(),
                    texts.len(),
                    document.title
                )));
            }

            for (chunk, vector) in document.chunks.iter_mut().zip(vectors) {
                if vector.len() != embedder.dimensions() {
                    return Err(QaError::DimensionMismatch {
                        expected: embedder.dimensions(),
                        found: vector.len(),
                    });
                }
                entries.push((
                    ChunkRef {
                        document: document_position,
                        chunk: chunk.chunk_index,
                    },
                    vector.clone(),
                ));
                chunk.embedding = Some(vector);
            }
        }

        let index = FlatL2Index::from_entries(entries)?;
        if index.is_empty() {
            warn!(documents = documents.len(), "corpus has no indexable chunks");
        }

        Ok(Self {
            documents,
            index,
            built_at: Utc::now(),
        })
    }

    pub fn empty() -> Self {
        Self {
            documents: Vec::new(),
            index: FlatL2Index::default(),
            built_at: Utc::now(),
        }
    }

    pub fn documents(&self) -> &[Document] {
        &self.documents
    }

    pub fn index(&self) -> &FlatL2Index<ChunkRef> {
        &self.index
    }

    pub fn built_at(&self) -> DateTime<Utc> {
        self.built_at
    }

    pub fn resolve(&self, reference: ChunkRef) -> Option<(&Document, &Chunk)> {
        let document = self.documents.get(reference.document)?;
        let chunk = document.chunks.get(reference.chunk)?;
        Some((document, chunk))
    }
}

/// Process-wide corpus handle.
pub struct SharedCorpus {
    current: RwLock<Arc<CorpusIndex>>,
    rebuild_lock: Mutex<()>,
}

impl SharedCorpus {
    pub fn new(initial: CorpusIndex) -> Self {
        Self {
            current: RwLock::new(Arc::new(initial)),
            rebuild_lock: Mutex::new(()),
        }
    }

    pub fn snapshot(&self) -> Arc<CorpusIndex> {
        let guard = self
            .current
            .read()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        Arc::clone(&guard)
    }

    /// Swaps in `next` and returns the snapshot it replaced.
    pub fn replace(&self, next: CorpusIndex) -> Arc<CorpusIndex> {
        let next = Arc::new(next);
        let mut guard = self
            .current
            .write()
            .unwrap_or_else(|poisoned| poisoned.into_inner());
        std::mem::replace(&mut *guard, next)
    }

    /// Rebuilds from `documents` on a blocking thread. Concurrent rebuilds
    /// run one after another; a failed rebuild keeps the current snapshot.
    pub async fn rebuild(
        &self,
        documents: Vec<Document>,
        embedder: Arc<dyn Embedder>,
    ) -> Result<Arc<CorpusIndex>, QaError> {
        let _rebuilding = self.rebuild_lock.lock().await;

        let document_count = documents.len();
        let next =
            tokio::task::spawn_blocking(move || CorpusIndex::build(documents, embedder.as_ref()))
                .await
                .map_err(|error| QaError::Task(error.to_string()))??;

        info!(
            documents = document_count,
            chunks = next.index().len(),
            "corpus rebuilt, swapping snapshot"
        );
        self.replace(next);
        Ok(self.snapshot())
    }
}

impl Default for SharedCorpus {
    fn default() -> Self {
        Self::new(CorpusIndex::empty())
    }
}
