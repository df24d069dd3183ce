pub mod answer;
pub mod chunking;
pub mod embeddings;
pub mod error;
pub mod extractor;
pub mod generation;
pub mod index;
pub mod ingest;
pub mod models;
pub mod retriever;
pub mod session;

pub use answer::{
    build_context, build_prompt, extractive_answer, AnswerStrategy, Answerer, UNABLE_TO_ANSWER,
};
pub use chunking::{build_chunks, chunk_text, ChunkingConfig};
pub use embeddings::{
    CharacterNgramEmbedder, Embedder, OllamaEmbedder, DEFAULT_EMBEDDING_DIMENSIONS,
};
pub use error::{EmbeddingError, GenerationError, IngestError, RagError};
pub use extractor::{extract_units, DocumentExtractor, DocumentKind, ExtractedUnit};
pub use generation::{Generator, OllamaGenerator};
pub use index::{squared_euclidean, FlatIndex, IndexedChunk, Neighbor};
pub use ingest::{
    digest_file, discover_documents, expand_paths, ingest_paths, process_document, IngestedFile,
    IngestionReport,
};
pub use models::{AnswerMode, Chunk, QueryAnswer, RagConfig, RetrievedChunk, SessionStatus};
pub use retriever::Retriever;
pub use session::{RagSession, SharedSession};
