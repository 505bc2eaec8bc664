mod answerer;
mod chunker;
mod embedding;
mod export;
mod llm;
mod onnx;
mod session;
mod vector_index;

pub use answerer::{Answerer, SUMMARY_QUESTION, build_prompt, build_summary_prompt};
pub use chunker::{SkippedDocument, SplitOutput, TextChunker};
pub use embedding::{
    Embedder, EmbeddingBackend, HealthResponse, HttpEmbeddingBackend, create_backend,
};
pub use export::{DEFAULT_EXPORT_FILE, render_answer_pdf, render_text_pdf};
pub use llm::{ChatCompletionClient, LanguageModel};
pub use onnx::OnnxEmbeddingBackend;
pub use session::{Session, UploadSummary};
pub use vector_index::{VectorIndex, normalize};
