use thiserror::Error;

#[derive(Debug, Error)]
pub enum IngestError {
    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("unsupported file type: {0}")]
    UnsupportedFormat(String),

    #[error("pdf parse error: {0}")]
    PdfParse(String),

    #[error("office document parse error: {0}")]
    OfficeParse(String),

    #[error("csv parse error: {0}")]
    Csv(#[from] csv::Error),

    #[error("path has no file name: {0}")]
    MissingFileName(String),

    #[error("invalid chunking config: {0}")]
    InvalidChunkConfig(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("no text could be extracted from {0}")]
    EmptyDocument(String),

    #[error("no chunks were produced from the uploaded documents")]
    EmptyDocumentSet,

    #[error("failed to process {path}: {source}")]
    Document {
        path: String,
        #[source]
        source: Box<IngestError>,
    },
}

#[derive(Debug, Error)]
pub enum EmbeddingError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),

    #[error("invalid response from {backend}: {details}")]
    BackendResponse { backend: String, details: String },

    #[error("embedding dimension {actual} does not match configured {expected}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("embedding backend returned {actual} vectors for {expected} inputs")]
    CountMismatch { expected: usize, actual: usize },
}

#[derive(Debug, Error)]
pub enum GenerationError {
    #[error("http error: {0}")]
    Http(#[from] reqwest::Error),

    #[error("url parse error: {0}")]
    Url(#[from] url::ParseError),

    #[error("invalid response from {backend}: {details}")]
    BackendResponse { backend: String, details: String },

    #[error("generator produced no text")]
    EmptyOutput,
}

#[derive(Debug, Error)]
pub enum RagError {
    #[error("No documents indexed")]
    NotIndexed,

    #[error("embedder produces {actual}-dimensional vectors but the index expects {expected}")]
    DimensionMismatch { expected: usize, actual: usize },

    #[error("embedding failed: {0}")]
    Embedding(#[from] EmbeddingError),

    #[error("invalid configuration: {0}")]
    InvalidConfig(#[from] IngestError),

    #[error("cannot index an empty document set")]
    EmptyDocumentSet,

    #[error("chunk {0} has no content")]
    BlankChunk(String),

    #[error("invalid query: {0}")]
    InvalidQuery(String),

    #[error("session lock poisoned")]
    LockPoisoned,

    #[error("background worker failed: {0}")]
    Worker(String),
}

#[cfg(test)]
mod tests {
    use super::{IngestError, RagError};
    use std::error::Error;

    #[test]
    fn document_error_keeps_the_underlying_cause() {
        let error = IngestError::Document {
            path: "reports/q3.pdf".to_string(),
            source: Box::new(IngestError::PdfParse("bad xref".to_string())),
        };
        assert!(error.to_string().starts_with("failed to process reports/q3.pdf"));
        assert!(error.source().is_some());

        let rag: RagError = error.into();
        assert!(matches!(rag, RagError::InvalidConfig(IngestError::Document { .. })));
    }
}
