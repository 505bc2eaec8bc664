use std::fmt::Write as FmtWrite;

use crate::models::{AnswerMode, AnswerRecord, OutputFormat, ScoredChunk};
use crate::services::UploadSummary;

/// Characters of chunk text shown for each source reference.
pub const SOURCE_PREVIEW_CHARS: usize = 300;

pub trait Formatter {
    fn format_answer(&self, record: &AnswerRecord, show_sources: bool) -> String;
    fn format_sources(&self, sources: &[ScoredChunk]) -> String;
    fn format_history(&self, history: &[AnswerRecord]) -> String;
    fn format_upload(&self, upload: &UploadInfo) -> String;
    fn format_status(&self, status: &StatusInfo) -> String;
    fn format_message(&self, message: &str) -> String;
    fn format_error(&self, error: &str) -> String;
}

#[derive(Debug, Clone)]
pub struct StatusInfo {
    pub embedding_backend: String,
    pub embedding_model: String,
    pub embedding_ready: bool,
    /// Model directory or server URL
    pub embedding_location: String,
    pub llm_base_url: String,
    pub llm_model: String,
    pub api_key_env: String,
    pub api_key_set: bool,
    pub pdftotext_available: bool,
    pub global_config: Option<String>,
    pub project_config: Option<String>,
}

#[derive(Debug, Clone, Default)]
pub struct UploadInfo {
    pub files_scanned: u64,
    pub documents_indexed: u64,
    pub chunks_created: u64,
    /// (path, reason) for each file or document that was left out
    pub skipped: Vec<(String, String)>,
    pub duration_ms: u64,
}

impl UploadInfo {
    pub fn new(files_scanned: usize, summary: UploadSummary, duration_ms: u64) -> Self {
        Self {
            files_scanned: files_scanned as u64,
            documents_indexed: summary.documents as u64,
            chunks_created: summary.chunks as u64,
            skipped: summary.skipped,
            duration_ms,
        }
    }
}

fn mode_label(mode: AnswerMode) -> &'static str {
    match mode {
        AnswerMode::Question => "Answer",
        AnswerMode::Summary => "Summary",
    }
}

pub struct TextFormatter;

impl Formatter for TextFormatter {
    fn format_answer(&self, record: &AnswerRecord, show_sources: bool) -> String {
        let mut output = String::new();
        if record.mode == AnswerMode::Question {
            writeln!(output, "Q: {}\n", record.question).unwrap();
        }
        writeln!(output, "{}", mode_label(record.mode)).unwrap();
        writeln!(output, "------").unwrap();
        writeln!(output, "{}\n", record.answer).unwrap();
        writeln!(output, "Tokens used: {}", record.token_count).unwrap();

        if show_sources {
            writeln!(output).unwrap();
            output.push_str(&self.format_sources(&record.sources));
        }
        output
    }

    fn format_sources(&self, sources: &[ScoredChunk]) -> String {
        if sources.is_empty() {
            return "No source references (no documents indexed).\n".to_string();
        }

        let mut output = String::new();
        writeln!(output, "Source References").unwrap();
        writeln!(output, "-----------------").unwrap();
        for (i, source) in sources.iter().enumerate() {
            writeln!(
                output,
                "Source {} [Score: {:.3}] {}",
                i + 1,
                source.score,
                source.chunk.location()
            )
            .unwrap();
            for line in source.chunk.preview(SOURCE_PREVIEW_CHARS).lines() {
                writeln!(output, "   {}", line).unwrap();
            }
            writeln!(output).unwrap();
        }
        output
    }

    fn format_history(&self, history: &[AnswerRecord]) -> String {
        if history.is_empty() {
            return "No questions asked yet.\n".to_string();
        }

        let mut output = String::new();
        writeln!(output, "Chat History").unwrap();
        writeln!(output, "------------").unwrap();
        for (i, record) in history.iter().enumerate() {
            writeln!(output, "{}. Q: {}", i + 1, record.question).unwrap();
            let first_line = record.answer.lines().next().unwrap_or_default();
            writeln!(output, "   A: {}", first_line).unwrap();
            writeln!(
                output,
                "   ({} tokens, {} sources)",
                record.token_count,
                record.sources.len()
            )
            .unwrap();
        }
        output
    }

    fn format_upload(&self, upload: &UploadInfo) -> String {
        let mut output = String::new();
        writeln!(output, "Documents Processed").unwrap();
        writeln!(output, "-------------------").unwrap();
        writeln!(output, "Files scanned: {}", upload.files_scanned).unwrap();
        writeln!(output, "Documents indexed: {}", upload.documents_indexed).unwrap();
        writeln!(output, "Chunks created: {}", upload.chunks_created).unwrap();
        writeln!(output, "Duration: {}ms", upload.duration_ms).unwrap();
        for (path, reason) in &upload.skipped {
            writeln!(output, "Skipped: {} ({})", path, reason).unwrap();
        }
        output
    }

    fn format_status(&self, status: &StatusInfo) -> String {
        let mut output = String::new();
        writeln!(output, "Status").unwrap();
        writeln!(output, "------").unwrap();

        let embedding_status = if status.embedding_ready {
            "[READY]"
        } else {
            "[UNAVAILABLE]"
        };
        writeln!(
            output,
            "Embedding:     {} ({})",
            status.embedding_backend, embedding_status
        )
        .unwrap();
        writeln!(output, "  Model:       {}", status.embedding_model).unwrap();
        writeln!(output, "  Location:    {}", status.embedding_location).unwrap();
        writeln!(output).unwrap();

        let key_status = if status.api_key_set {
            "[SET]"
        } else {
            "[MISSING]"
        };
        writeln!(output, "Language Model: {}", status.llm_model).unwrap();
        writeln!(output, "  Endpoint:    {}", status.llm_base_url).unwrap();
        writeln!(output, "  API key:     {} {}", status.api_key_env, key_status).unwrap();
        writeln!(output).unwrap();

        let pdf_status = if status.pdftotext_available {
            "[FOUND]"
        } else {
            "[NOT FOUND]"
        };
        writeln!(output, "pdftotext:     {}", pdf_status).unwrap();

        if let Some(ref path) = status.global_config {
            writeln!(output, "Global config: {}", path).unwrap();
        }
        if let Some(ref path) = status.project_config {
            writeln!(output, "Project config: {}", path).unwrap();
        }

        output
    }

    fn format_message(&self, message: &str) -> String {
        format!("{}\n", message)
    }

    fn format_error(&self, error: &str) -> String {
        format!("Error: {}\n", error)
    }
}

pub struct JsonFormatter {
    pub pretty: bool,
}

impl JsonFormatter {
    pub fn new(pretty: bool) -> Self {
        Self { pretty }
    }

    fn render(&self, value: &serde_json::Value) -> String {
        let rendered = if self.pretty {
            serde_json::to_string_pretty(value)
        } else {
            serde_json::to_string(value)
        };
        rendered.unwrap_or_else(|e| format!("{{\"error\": \"{}\"}}", e)) + "\n"
    }
}

impl Formatter for JsonFormatter {
    fn format_answer(&self, record: &AnswerRecord, show_sources: bool) -> String {
        let mut json = serde_json::to_value(record).unwrap_or_default();
        if !show_sources && let Some(obj) = json.as_object_mut() {
            obj.remove("sources");
        }
        self.render(&json)
    }

    fn format_sources(&self, sources: &[ScoredChunk]) -> String {
        let sources_array: Vec<serde_json::Value> = sources
            .iter()
            .map(|s| {
                serde_json::json!({
                    "score": s.score,
                    "source": s.chunk.source,
                    "page": s.chunk.page,
                    "offset": s.chunk.offset,
                    "preview": s.chunk.preview(SOURCE_PREVIEW_CHARS),
                })
            })
            .collect();
        self.render(&serde_json::json!({ "sources": sources_array }))
    }

    fn format_history(&self, history: &[AnswerRecord]) -> String {
        self.render(&serde_json::json!({ "history": history }))
    }

    fn format_upload(&self, upload: &UploadInfo) -> String {
        let skipped: Vec<serde_json::Value> = upload
            .skipped
            .iter()
            .map(|(path, reason)| serde_json::json!({"path": path, "reason": reason}))
            .collect();

        self.render(&serde_json::json!({
            "files_scanned": upload.files_scanned,
            "documents_indexed": upload.documents_indexed,
            "chunks_created": upload.chunks_created,
            "skipped": skipped,
            "duration_ms": upload.duration_ms,
        }))
    }

    fn format_status(&self, status: &StatusInfo) -> String {
        self.render(&serde_json::json!({
            "embedding": {
                "backend": status.embedding_backend,
                "model": status.embedding_model,
                "ready": status.embedding_ready,
                "location": status.embedding_location,
            },
            "llm": {
                "base_url": status.llm_base_url,
                "model": status.llm_model,
                "api_key_env": status.api_key_env,
                "api_key_set": status.api_key_set,
            },
            "pdftotext": status.pdftotext_available,
            "config": {
                "global": status.global_config,
                "project": status.project_config,
            }
        }))
    }

    fn format_message(&self, message: &str) -> String {
        serde_json::json!({"message": message}).to_string() + "\n"
    }

    fn format_error(&self, error: &str) -> String {
        serde_json::json!({"error": error}).to_string() + "\n"
    }
}

pub struct MarkdownFormatter;

impl Formatter for MarkdownFormatter {
    fn format_answer(&self, record: &AnswerRecord, show_sources: bool) -> String {
        let mut output = String::new();
        if record.mode == AnswerMode::Question {
            writeln!(output, "**Question:** {}\n", record.question).unwrap();
        }
        writeln!(output, "## {}\n", mode_label(record.mode)).unwrap();
        writeln!(output, "{}\n", record.answer).unwrap();
        writeln!(output, "*Tokens used: {}*\n", record.token_count).unwrap();

        if show_sources {
            output.push_str(&self.format_sources(&record.sources));
        }
        output
    }

    fn format_sources(&self, sources: &[ScoredChunk]) -> String {
        if sources.is_empty() {
            return "*No source references.*\n".to_string();
        }

        let mut output = String::new();
        writeln!(output, "## Source References\n").unwrap();
        for (i, source) in sources.iter().enumerate() {
            writeln!(
                output,
                "### Source {} (score {:.3})\n",
                i + 1,
                source.score
            )
            .unwrap();
            writeln!(output, "**Location:** `{}`\n", source.chunk.location()).unwrap();
            writeln!(output, "```").unwrap();
            writeln!(output, "{}", source.chunk.preview(SOURCE_PREVIEW_CHARS)).unwrap();
            writeln!(output, "```\n").unwrap();
        }
        output
    }

    fn format_history(&self, history: &[AnswerRecord]) -> String {
        if history.is_empty() {
            return "## Chat History\n\n*No questions asked yet.*\n".to_string();
        }

        let mut output = String::new();
        writeln!(output, "## Chat History\n").unwrap();
        for (i, record) in history.iter().enumerate() {
            writeln!(output, "### {}. {}\n", i + 1, record.question).unwrap();
            writeln!(output, "{}\n", record.answer).unwrap();
            writeln!(output, "*Tokens used: {}*\n", record.token_count).unwrap();
        }
        output
    }

    fn format_upload(&self, upload: &UploadInfo) -> String {
        let mut output = String::new();
        writeln!(output, "## Documents Processed\n").unwrap();
        writeln!(output, "| Metric | Value |").unwrap();
        writeln!(output, "|--------|-------|").unwrap();
        writeln!(output, "| Files scanned | {} |", upload.files_scanned).unwrap();
        writeln!(output, "| Documents indexed | {} |", upload.documents_indexed).unwrap();
        writeln!(output, "| Chunks created | {} |", upload.chunks_created).unwrap();
        writeln!(output, "| Duration | {}ms |", upload.duration_ms).unwrap();
        if !upload.skipped.is_empty() {
            writeln!(output, "\n**Skipped:**\n").unwrap();
            for (path, reason) in &upload.skipped {
                writeln!(output, "- `{}`: {}", path, reason).unwrap();
            }
        }
        output
    }

    fn format_status(&self, status: &StatusInfo) -> String {
        let mut output = String::new();
        writeln!(output, "## Status\n").unwrap();

        let embedding_status = if status.embedding_ready { "✅" } else { "❌" };
        writeln!(
            output,
            "### Embedding ({}) {}\n",
            status.embedding_backend, embedding_status
        )
        .unwrap();
        writeln!(output, "- **Model:** {}", status.embedding_model).unwrap();
        writeln!(output, "- **Location:** `{}`\n", status.embedding_location).unwrap();

        let key_status = if status.api_key_set { "✅" } else { "❌" };
        writeln!(output, "### Language Model {}\n", key_status).unwrap();
        writeln!(output, "- **Model:** {}", status.llm_model).unwrap();
        writeln!(output, "- **Endpoint:** `{}`", status.llm_base_url).unwrap();
        writeln!(output, "- **API key:** `{}`\n", status.api_key_env).unwrap();

        let pdf_status = if status.pdftotext_available {
            "✅"
        } else {
            "❌"
        };
        writeln!(output, "### pdftotext {}", pdf_status).unwrap();
        output
    }

    fn format_message(&self, message: &str) -> String {
        format!("> {}\n", message)
    }

    fn format_error(&self, error: &str) -> String {
        format!("> ⚠️ **Error:** {}\n", error)
    }
}

pub fn get_formatter(format: OutputFormat) -> Box<dyn Formatter> {
    match format {
        OutputFormat::Text => Box::new(TextFormatter),
        OutputFormat::Json => Box::new(JsonFormatter::new(true)),
        OutputFormat::Markdown => Box::new(MarkdownFormatter),
    }
}
