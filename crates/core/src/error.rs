use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("pdf parse error: {0}")]
    PdfParse(String),

    #[error("path has no file name: {0}")]
    MissingFileName(String),

    #[error("unsupported document format: {0}")]
    UnsupportedFormat(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error(transparent)]
    Qa(#[from] QaError),
}

#[derive(Debug, Error)]
pub enum QaError {
    #[error("invalid input: {0}")]
    InvalidInput(String),

    #[error("dimension mismatch: expected {expected}, found {found}")]
    DimensionMismatch { expected: usize, found: usize },

    #[error("vector index has no entries")]
    EmptyIndex,

    #[error("answer extraction failed: {0}")]
    Extraction(String),

    #[error("{operation} timed out after {after_ms}ms")]
    Timeout { operation: &'static str, after_ms: u64 },

    #[error("background task failed: {0}")]
    Task(String),

    #[error("illegal pipeline transition from {from} to {to}")]
    InvalidTransition { from: String, to: String },

    #[error("invalid response from {backend}: {details}")]
    BackendResponse { backend: String, details: String },

    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),

    #[error("serialize error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("regex error: {0}")]
    Regex(#[from] regex::Error),

    #[error("configuration error: {0}")]
    Config(String),
}

impl QaError {
    /// Errors scoped to one chunk or one question. The pipeline records them
    /// in the batch result and moves on; everything else fails the request.
    pub fn is_recoverable(&self) -> bool {
        matches!(
            self,
            QaError::Extraction(_)
                | QaError::Timeout { .. }
                | QaError::Task(_)
                | QaError::Http(_)
                | QaError::BackendResponse { .. }
        )
    }
}

impl From<figment::Error> for QaError {
    fn from(value: figment::Error) -> Self {
        QaError::Config(value.to_string())
    }
}
