//! Shared setup for commands that answer questions over documents.

use std::path::PathBuf;
use std::sync::Arc;
use std::time::{Duration, Instant};

use anyhow::{Context, Result};
use indicatif::{ProgressBar, ProgressStyle};

use crate::cli::output::UploadInfo;
use crate::models::Config;
use crate::services::{
    Answerer, ChatCompletionClient, Embedder, Session, TextChunker, create_backend,
};
use crate::sources::LocalSource;

/// Wire a session from the resolved configuration.
pub fn build_session(config: &Config, top_k: Option<u32>) -> Result<Session> {
    let chunker = TextChunker::from_config(&config.chunking).context("invalid chunking settings")?;

    let model_dir = config.embedding_model_dir();
    let backend = create_backend(&config.embedding, model_dir.as_deref())
        .context("failed to initialise embedding backend")?;
    let embedder = Embedder::new(backend, config.embedding.batch_size as usize);

    let llm = ChatCompletionClient::from_env(&config.llm)
        .context("failed to initialise language model client")?;
    let answerer = Answerer::new(Arc::new(llm));

    let mut retrieval = config.retrieval.clone();
    if let Some(k) = top_k {
        if k == 0 {
            anyhow::bail!("top-k must be at least 1");
        }
        retrieval.top_k = k;
        retrieval.summary_top_k = k;
    }

    Ok(Session::new(chunker, embedder, answerer, retrieval))
}

/// Load documents from `paths` and index them into `session`.
pub async fn index_documents(
    session: &Session,
    config: &Config,
    paths: &[PathBuf],
) -> Result<UploadInfo> {
    let start = Instant::now();
    let spinner = spinner("Processing documents...");

    // PDF extraction shells out and blocks; keep it off the runtime threads
    let source = LocalSource::new(config.chunking.max_file_size);
    let owned = paths.to_vec();
    let report = tokio::task::spawn_blocking(move || source.load(&owned))
        .await
        .context("document loading was interrupted")?;
    let files_scanned = report.documents.len() + report.failures.len();
    let failures: Vec<(String, String)> = report
        .failures
        .into_iter()
        .map(|(path, error)| (path.display().to_string(), error.to_string()))
        .collect();

    if report.documents.is_empty() {
        spinner.finish_and_clear();
        let reasons: Vec<String> = failures
            .iter()
            .map(|(path, reason)| format!("  {path}: {reason}"))
            .collect();
        anyhow::bail!("no readable documents found\n{}", reasons.join("\n"));
    }

    spinner.set_message(format!("Indexing {} document(s)...", report.documents.len()));
    let result = session.upload(report.documents).await;
    spinner.finish_and_clear();

    let summary = result.context("failed to index documents")?;
    let mut info = UploadInfo::new(files_scanned, summary, start.elapsed().as_millis() as u64);
    info.skipped.splice(0..0, failures);
    Ok(info)
}

pub fn spinner(message: &str) -> ProgressBar {
    let pb = ProgressBar::new_spinner();
    pb.set_style(
        ProgressStyle::default_spinner()
            .template("{spinner:.green} {msg} [{elapsed}]")
            .unwrap_or_else(|_| ProgressStyle::default_spinner()),
    );
    pb.set_message(message.to_string());
    pb.enable_steady_tick(Duration::from_millis(100));
    pb
}
