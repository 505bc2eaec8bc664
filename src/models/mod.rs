mod answer;
mod config;
mod document;
mod output;

pub use answer::{AnswerMode, AnswerRecord, ScoredChunk};
pub use config::{
    ChunkingConfig, Config, DEFAULT_API_KEY_ENV, DEFAULT_EMBEDDING_DIMENSION,
    DEFAULT_EMBEDDING_MODEL, DEFAULT_EMBEDDING_URL, DEFAULT_LLM_BASE_URL, DEFAULT_LLM_MODEL,
    EmbeddingBackendKind, EmbeddingConfig, LlmConfig, Metric, OutputConfig, ResolvedConfig,
    RetrievalConfig, model_dir_name,
};
pub use document::{Chunk, Document, EmbeddingRecord, PageText};
pub use output::OutputFormat;
