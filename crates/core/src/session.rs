use crate::answer::Answerer;
use crate::embeddings::Embedder;
use crate::error::RagError;
use crate::generation::Generator;
use crate::index::{FlatIndex, IndexedChunk};
use crate::models::{AnswerMode, Chunk, QueryAnswer, RagConfig, SessionStatus};
use crate::retriever::Retriever;
use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex, RwLock};
use tracing::{debug, info};
use uuid::Uuid;

/// One complete indexing pass. Replaced as a whole, never edited.
struct IndexSnapshot {
    index: FlatIndex,
    generation: Uuid,
    indexed_at: DateTime<Utc>,
}

pub struct RagSession {
    embedder: Arc<dyn Embedder>,
    answerer: Answerer,
    config: RagConfig,
    state: RwLock<Option<Arc<IndexSnapshot>>>,
    indexing: Mutex<()>,
}

impl RagSession {
    pub fn new(
        embedder: Arc<dyn Embedder>,
        generator: Option<Arc<dyn Generator>>,
        config: RagConfig,
    ) -> Result<Self, RagError> {
        config.validate()?;
        if embedder.dimensions() != config.embedding_dimensions {
            return Err(RagError::DimensionMismatch {
                expected: config.embedding_dimensions,
                actual: embedder.dimensions(),
            });
        }

        let answerer = Answerer::new(generator, &config);
        info!(
            embedder = embedder.model_name(),
            dimensions = config.embedding_dimensions,
            answer_mode = ?answerer.mode(),
            "rag session ready"
        );

        Ok(Self {
            embedder,
            answerer,
            config,
            state: RwLock::new(None),
            indexing: Mutex::new(()),
        })
    }

    pub fn config(&self) -> &RagConfig {
        &self.config
    }

    pub fn answer_mode(&self) -> AnswerMode {
        self.answerer.mode()
    }

    pub fn index_documents(&self, documents: Vec<Chunk>) -> Result<usize, RagError> {
        if documents.is_empty() {
            return Err(RagError::EmptyDocumentSet);
        }
        if let Some(blank) = documents
            .iter()
            .find(|chunk| chunk.content.trim().is_empty())
        {
            return Err(RagError::BlankChunk(blank.source.clone()));
        }

        let _indexing = self.indexing.lock().map_err(|_| RagError::LockPoisoned)?;
        info!(chunk_count = documents.len(), "indexing documents");

        let contents: Vec<String> = documents.iter().map(|chunk| chunk.content.clone()).collect();
        let embeddings = self.embedder.embed(&contents)?;
        if embeddings.len() != documents.len() {
            return Err(crate::error::EmbeddingError::CountMismatch {
                expected: documents.len(),
                actual: embeddings.len(),
            }
            .into());
        }

        let entries = documents
            .into_iter()
            .zip(embeddings)
            .map(|(chunk, embedding)| IndexedChunk { chunk, embedding })
            .collect();
        let index = FlatIndex::build(self.config.embedding_dimensions, entries)?;
        let chunk_count = index.len();

        let snapshot = Arc::new(IndexSnapshot {
            index,
            generation: Uuid::new_v4(),
            indexed_at: Utc::now(),
        });
        let generation = snapshot.generation;

        *self.state.write().map_err(|_| RagError::LockPoisoned)? = Some(snapshot);
        info!(chunk_count, %generation, "index published");
        Ok(chunk_count)
    }

    /// A `top_k` of zero means the configured default.
    pub fn query(&self, question: &str, top_k: usize) -> Result<QueryAnswer, RagError> {
        let question = question.trim();
        if question.is_empty() {
            return Err(RagError::InvalidQuery("question is empty".to_string()));
        }

        let snapshot = self.current()?.ok_or(RagError::NotIndexed)?;
        let top_k = if top_k == 0 { self.config.top_k } else { top_k };

        let retrieved = Retriever::new(self.embedder.as_ref(), &snapshot.index)
            .retrieve(question, top_k)?;
        debug!(generation = %snapshot.generation, hits = retrieved.len(), "answering");

        let answer = self.answerer.answer(question, &retrieved);
        let sources = retrieved.into_iter().map(|hit| hit.chunk.source).collect();

        Ok(QueryAnswer { answer, sources })
    }

    pub fn clear(&self) -> Result<(), RagError> {
        let _indexing = self.indexing.lock().map_err(|_| RagError::LockPoisoned)?;
        *self.state.write().map_err(|_| RagError::LockPoisoned)? = None;
        info!("index cleared");
        Ok(())
    }

    pub fn is_ready(&self) -> bool {
        matches!(self.current(), Ok(Some(_)))
    }

    pub fn status(&self) -> Result<SessionStatus, RagError> {
        let snapshot = self.current()?;
        Ok(SessionStatus {
            ready: snapshot.is_some(),
            chunk_count: snapshot.as_ref().map_or(0, |s| s.index.len()),
            generation: snapshot.as_ref().map(|s| s.generation),
            indexed_at: snapshot.as_ref().map(|s| s.indexed_at),
            answer_mode: self.answer_mode(),
        })
    }

    fn current(&self) -> Result<Option<Arc<IndexSnapshot>>, RagError> {
        let state = self.state.read().map_err(|_| RagError::LockPoisoned)?;
        Ok(state.clone())
    }
}

#[derive(Clone)]
pub struct SharedSession {
    inner: Arc<RagSession>,
}

impl SharedSession {
    pub fn new(session: RagSession) -> Self {
        Self {
            inner: Arc::new(session),
        }
    }

    pub fn session(&self) -> &RagSession {
        &self.inner
    }

    pub async fn index_documents(&self, documents: Vec<Chunk>) -> Result<usize, RagError> {
        let session = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || session.index_documents(documents))
            .await
            .map_err(|error| RagError::Worker(error.to_string()))?
    }

    pub async fn query(&self, question: String, top_k: usize) -> Result<QueryAnswer, RagError> {
        let session = Arc::clone(&self.inner);
        tokio::task::spawn_blocking(move || session.query(&question, top_k))
            .await
            .map_err(|error| RagError::Worker(error.to_string()))?
    }
}
