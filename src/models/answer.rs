//! Retrieval results and answer records.

use serde::{Deserialize, Serialize};

use super::document::Chunk;

/// A retrieved chunk with its similarity score (higher is better).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScoredChunk {
    pub chunk: Chunk,
    pub score: f32,
}

/// What kind of request produced an answer.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum AnswerMode {
    #[default]
    Question,
    Summary,
}

/// One question/answer exchange. Never mutated once created.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AnswerRecord {
    pub question: String,
    pub answer: String,
    /// Token estimate over prompt + response, for display only
    pub token_count: usize,
    /// Retrieved chunks the answer was conditioned on, best first
    pub sources: Vec<ScoredChunk>,
    pub mode: AnswerMode,
    pub created_at: String,
}

impl AnswerRecord {
    pub fn new(
        question: impl Into<String>,
        answer: impl Into<String>,
        token_count: usize,
        sources: Vec<ScoredChunk>,
        mode: AnswerMode,
    ) -> Self {
        Self {
            question: question.into(),
            answer: answer.into(),
            token_count,
            sources,
            mode,
            created_at: chrono::Utc::now().to_rfc3339(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_answer_record_new() {
        let record = AnswerRecord::new("q", "a", 12, vec![], AnswerMode::Question);
        assert_eq!(record.question, "q");
        assert_eq!(record.token_count, 12);
        assert!(!record.created_at.is_empty());
    }

    #[test]
    fn test_answer_mode_serde() {
        let json = serde_json::to_string(&AnswerMode::Summary).unwrap();
        assert_eq!(json, "\"summary\"");
    }
}
