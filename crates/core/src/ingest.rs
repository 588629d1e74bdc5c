use crate::chunking::build_document;
use crate::extractor::FileTextExtractor;
use crate::traits::TextExtractor;
use crate::{Document, IngestError};
use std::path::{Path, PathBuf};
use tracing::{info, warn};
use walkdir::WalkDir;

pub fn discover_documents(folder: &Path) -> Vec<PathBuf> {
    let mut files = Vec::new();

    for entry in WalkDir::new(folder)
        .into_iter()
        .filter_map(|item| item.ok())
    {
        if !entry.file_type().is_file() {
            continue;
        }

        if FileTextExtractor::supports(entry.path()) {
            files.push(entry.path().to_path_buf());
        }
    }

    files.sort_unstable();
    files
}

pub fn load_document(
    path: &Path,
    chunk_size: usize,
    extractor: &dyn TextExtractor,
) -> Result<Document, IngestError> {
    let title = path
        .file_name()
        .and_then(|name| name.to_str())
        .ok_or_else(|| IngestError::MissingFileName(path.display().to_string()))?;

    let text = extractor.extract(path)?;
    Ok(build_document(
        title,
        Some(path.to_string_lossy().to_string()),
        text,
        chunk_size,
    )?)
}

pub struct SkippedDocument {
    pub path: PathBuf,
    pub reason: String,
}

pub struct IngestionReport {
    pub documents: Vec<Document>,
    pub skipped_files: Vec<SkippedDocument>,
}

/// Loads every supported file under `folder`. A file that cannot be read is
/// recorded in `skipped_files` and does not stop the others.
pub fn load_corpus_best_effort(
    folder: &Path,
    chunk_size: usize,
    extractor: &dyn TextExtractor,
) -> Result<IngestionReport, IngestError> {
    if chunk_size == 0 {
        return Err(IngestError::InvalidArgument(
            "chunk_size must be greater than zero".to_string(),
        ));
    }

    let files = discover_documents(folder);
    if files.is_empty() {
        return Err(IngestError::InvalidArgument(format!(
            "no documents found in {}",
            folder.display()
        )));
    }

    let mut documents = Vec::new();
    let mut skipped_files = Vec::new();

    for path in files {
        match load_document(&path, chunk_size, extractor) {
            Ok(document) => documents.push(document),
            Err(error) => {
                warn!(path = %path.display(), reason = %error, "skipped document");
                skipped_files.push(SkippedDocument {
                    path,
                    reason: error.to_string(),
                });
            }
        }
    }

    info!(
        folder = %folder.display(),
        loaded = documents.len(),
        skipped = skipped_files.len(),
        "corpus loaded"
    );

    Ok(IngestionReport {
        documents,
        skipped_files,
    })
}
