use std::process::Command;

use anyhow::Result;

use crate::cli::output::{StatusInfo, get_formatter};
use crate::models::{Config, EmbeddingBackendKind, OutputFormat};
use crate::services::HttpEmbeddingBackend;
use crate::sources::PDFTOTEXT_INSTALL_HINT;

pub async fn handle_status(format: OutputFormat, _verbose: bool) -> Result<()> {
    let resolved = Config::load()?;
    let config = &resolved.config;
    let formatter = get_formatter(format);

    let (embedding_ready, embedding_location) = match config.embedding.backend {
        EmbeddingBackendKind::Onnx => match config.embedding_model_dir() {
            Some(dir) => (
                dir.join("model.onnx").exists() && dir.join("tokenizer.json").exists(),
                dir.display().to_string(),
            ),
            None => (false, "unknown".to_string()),
        },
        EmbeddingBackendKind::Http => {
            let ready = match HttpEmbeddingBackend::new(&config.embedding) {
                Ok(backend) => backend.health_check().await.is_ok(),
                Err(_) => false,
            };
            (ready, config.embedding.url.clone())
        }
    };

    let api_key_set = std::env::var(&config.llm.api_key_env)
        .map(|k| !k.trim().is_empty())
        .unwrap_or(false);

    let pdftotext_available = Command::new("pdftotext")
        .arg("-v")
        .output()
        .is_ok();

    let status = StatusInfo {
        embedding_backend: config.embedding.backend.to_string(),
        embedding_model: config.embedding.model_id.clone(),
        embedding_ready,
        embedding_location,
        llm_base_url: config.llm.base_url.clone(),
        llm_model: config.llm.model.clone(),
        api_key_env: config.llm.api_key_env.clone(),
        api_key_set,
        pdftotext_available,
        global_config: resolved.global_path.as_ref().map(|p| p.display().to_string()),
        project_config: resolved.project_path.as_ref().map(|p| p.display().to_string()),
    };

    print!("{}", formatter.format_status(&status));

    if !embedding_ready || !api_key_set || !pdftotext_available {
        eprintln!();
        if !embedding_ready {
            match config.embedding.backend {
                EmbeddingBackendKind::Onnx => eprintln!(
                    "Hint: place model.onnx and tokenizer.json for {} in the model directory,\n      or set embedding.model_path.",
                    config.embedding.model_id
                ),
                EmbeddingBackendKind::Http => eprintln!(
                    "Warning: embedding server not reachable at {}",
                    config.embedding.url
                ),
            }
        }
        if !api_key_set {
            eprintln!(
                "Hint: set {} in your environment or a .env file.",
                config.llm.api_key_env
            );
        }
        if !pdftotext_available {
            eprintln!("Hint: PDF files need pdftotext. {PDFTOTEXT_INSTALL_HINT}");
        }
    }

    Ok(())
}
