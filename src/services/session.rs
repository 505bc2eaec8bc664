//! Session state: the current index plus the answer history.

use std::sync::Arc;

use tokio::sync::RwLock;
use tracing::{debug, info, warn};

use super::answerer::{Answerer, SUMMARY_QUESTION};
use super::chunker::TextChunker;
use super::embedding::Embedder;
use super::vector_index::VectorIndex;
use crate::error::{InputError, SessionError};
use crate::models::{AnswerRecord, Document, RetrievalConfig, ScoredChunk};

/// Outcome of [`Session::upload`].
#[derive(Debug, Clone, PartialEq)]
pub struct UploadSummary {
    pub documents: usize,
    pub chunks: usize,
    /// Documents that were skipped, with the reason
    pub skipped: Vec<(String, String)>,
}

/// One user's question-answering session.
///
/// Uploading replaces the index wholesale; asking appends to the history.
/// Both are behind their own locks so a shared session can serve several tasks.
pub struct Session {
    chunker: TextChunker,
    embedder: Embedder,
    answerer: Answerer,
    retrieval: RetrievalConfig,
    index: RwLock<Option<Arc<VectorIndex>>>,
    history: RwLock<Vec<AnswerRecord>>,
}

impl Session {
    pub fn new(
        chunker: TextChunker,
        embedder: Embedder,
        answerer: Answerer,
        retrieval: RetrievalConfig,
    ) -> Self {
        Self {
            chunker,
            embedder,
            answerer,
            retrieval,
            index: RwLock::new(None),
            history: RwLock::new(Vec::new()),
        }
    }

    pub fn retrieval(&self) -> &RetrievalConfig {
        &self.retrieval
    }

    /// Chunk, embed and index `documents`, replacing the current index.
    ///
    /// On any failure the previous index stays in place.
    pub async fn upload(&self, documents: Vec<Document>) -> Result<UploadSummary, SessionError> {
        let split = self.chunker.split(&documents);
        let skipped: Vec<(String, String)> = split
            .skipped
            .into_iter()
            .map(|s| (s.source, s.error.to_string()))
            .collect();

        if split.chunks.is_empty() {
            return Err(InputError::NoDocuments.into());
        }

        let chunk_count = split.chunks.len();
        let records = self.embedder.embed(split.chunks).await?;
        let index = VectorIndex::build(records, self.retrieval.metric)?;

        *self.index.write().await = Some(Arc::new(index));

        info!(
            documents = documents.len() - skipped.len(),
            chunks = chunk_count,
            skipped = skipped.len(),
            "index replaced"
        );

        Ok(UploadSummary {
            documents: documents.len() - skipped.len(),
            chunks: chunk_count,
            skipped,
        })
    }

    /// Top-`k` chunks for `query`; empty when nothing has been uploaded.
    pub async fn retrieve(&self, query: &str, k: usize) -> Result<Vec<ScoredChunk>, SessionError> {
        let Some(index) = self.current_index().await else {
            debug!("no index, answering without context");
            return Ok(Vec::new());
        };

        let vector = self.embedder.embed_query(query).await?;
        let results = index.query(&vector, k);
        debug!(k, results = results.len(), "retrieved context");
        Ok(results)
    }

    /// Answer a question and append it to the history.
    pub async fn ask(&self, question: &str) -> Result<AnswerRecord, SessionError> {
        let question = question.trim();
        if question.is_empty() {
            return Err(InputError::EmptyQuestion.into());
        }

        let context = self.retrieve(question, self.retrieval.top_k as usize).await?;
        let record = self.answerer.answer(question, context).await.inspect_err(|e| {
            warn!(error = %e, "answer generation failed");
        })?;

        self.history.write().await.push(record.clone());
        Ok(record)
    }

    /// Summarize the uploaded documents. Summaries are not added to the history.
    pub async fn summarize(&self) -> Result<AnswerRecord, SessionError> {
        if self.current_index().await.is_none() {
            return Err(InputError::NoDocuments.into());
        }

        let context = self
            .retrieve(SUMMARY_QUESTION, self.retrieval.summary_top_k as usize)
            .await?;
        let record = self.answerer.summarize(context).await.inspect_err(|e| {
            warn!(error = %e, "summary generation failed");
        })?;
        Ok(record)
    }

    /// Snapshot of the answer history, oldest first.
    pub async fn history(&self) -> Vec<AnswerRecord> {
        self.history.read().await.clone()
    }

    /// Number of chunks in the current index, `None` before the first upload.
    pub async fn indexed_chunks(&self) -> Option<usize> {
        self.current_index().await.map(|index| index.len())
    }

    /// Drop the index and the history.
    pub async fn clear(&self) {
        *self.index.write().await = None;
        self.history.write().await.clear();
        info!("session cleared");
    }

    async fn current_index(&self) -> Option<Arc<VectorIndex>> {
        self.index.read().await.clone()
    }
}

impl std::fmt::Debug for Session {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Session")
            .field("chunker", &self.chunker)
            .field("embedder", &self.embedder)
            .field("answerer", &self.answerer)
            .field("retrieval", &self.retrieval)
            .finish_non_exhaustive()
    }
}
