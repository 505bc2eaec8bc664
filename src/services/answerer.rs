//! Prompt assembly and answer generation.

use std::sync::Arc;

use tracing::debug;

use super::llm::LanguageModel;
use crate::error::UpstreamError;
use crate::models::{AnswerMode, AnswerRecord, ScoredChunk};
use crate::utils::count_tokens;

const QUESTION_INSTRUCTIONS: &str = "You are an advanced scientific AI assistant.\n\
Answer strictly using the provided context.\n\
Provide clear and professional explanation.";

const SUMMARY_INSTRUCTIONS: &str =
    "Provide a professional executive summary of the following content.";

/// Label stored as the "question" of a summary record.
pub const SUMMARY_QUESTION: &str = "Summarize the document";

/// Build the question prompt: context first, then instructions, question, and the answer cue.
pub fn build_prompt(question: &str, context: &[ScoredChunk]) -> String {
    format!(
        "Context:\n{}\n\n{}\n\nQuestion:\n{}\n\nAnswer:",
        join_context(context),
        QUESTION_INSTRUCTIONS,
        question
    )
}

pub fn build_summary_prompt(context: &[ScoredChunk]) -> String {
    format!("{}\n\n{}", SUMMARY_INSTRUCTIONS, join_context(context))
}

fn join_context(context: &[ScoredChunk]) -> String {
    context
        .iter()
        .map(|c| c.chunk.text.as_str())
        .collect::<Vec<_>>()
        .join("\n\n")
}

/// Turns retrieved chunks into an answer via a [`LanguageModel`].
#[derive(Clone)]
pub struct Answerer {
    llm: Arc<dyn LanguageModel>,
}

impl Answerer {
    pub fn new(llm: Arc<dyn LanguageModel>) -> Self {
        Self { llm }
    }

    pub fn model_id(&self) -> &str {
        self.llm.model_id()
    }

    /// Answer `question` from `context`. An empty context still produces a prompt.
    pub async fn answer(
        &self,
        question: &str,
        context: Vec<ScoredChunk>,
    ) -> Result<AnswerRecord, UpstreamError> {
        let prompt = build_prompt(question, &context);
        self.generate(question, prompt, context, AnswerMode::Question)
            .await
    }

    /// Produce an executive summary of `context`.
    pub async fn summarize(&self, context: Vec<ScoredChunk>) -> Result<AnswerRecord, UpstreamError> {
        let prompt = build_summary_prompt(&context);
        self.generate(SUMMARY_QUESTION, prompt, context, AnswerMode::Summary)
            .await
    }

    async fn generate(
        &self,
        question: &str,
        prompt: String,
        context: Vec<ScoredChunk>,
        mode: AnswerMode,
    ) -> Result<AnswerRecord, UpstreamError> {
        let answer = self.llm.complete(&prompt).await?;
        let token_count = count_tokens(&format!("{prompt}{answer}"));

        debug!(
            model = %self.llm.model_id(),
            sources = context.len(),
            tokens = token_count,
            "generated answer"
        );

        Ok(AnswerRecord::new(question, answer, token_count, context, mode))
    }
}

impl std::fmt::Debug for Answerer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Answerer")
            .field("model_id", &self.llm.model_id())
            .finish()
    }
}
