use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::Args;

use super::common::{build_session, index_documents, spinner};
use crate::cli::output::get_formatter;
use crate::models::{Config, OutputFormat};
use crate::services::render_answer_pdf;

#[derive(Debug, Args)]
pub struct AskArgs {
    #[arg(required = true, help = "Question to answer from the documents")]
    pub question: String,

    #[arg(
        long = "doc",
        short = 'd',
        required = true,
        num_args = 1..,
        help = "Document files or directories (PDF or text)"
    )]
    pub docs: Vec<PathBuf>,

    #[arg(long, short = 'k', help = "Number of chunks to retrieve as context")]
    pub top_k: Option<u32>,

    #[arg(long, help = "Write the answer to a PDF file")]
    pub pdf: Option<PathBuf>,

    #[arg(long, short = 's', help = "Show source references")]
    pub sources: bool,
}

pub async fn handle_ask(args: AskArgs, format: OutputFormat, verbose: bool) -> Result<()> {
    let question = args.question.trim();
    if question.is_empty() {
        anyhow::bail!("question cannot be empty");
    }

    let config = Config::load()?.config;
    let formatter = get_formatter(format);
    let session = build_session(&config, args.top_k)?;

    let upload = index_documents(&session, &config, &args.docs).await?;
    if verbose {
        eprint!("{}", formatter.format_upload(&upload));
    }

    let pb = spinner("Generating answer...");
    let result = session.ask(question).await;
    pb.finish_and_clear();
    let record = result.context("failed to answer question")?;

    print!("{}", formatter.format_answer(&record, args.sources));

    if let Some(path) = args.pdf {
        std::fs::write(&path, render_answer_pdf(&record))
            .with_context(|| format!("failed to write {}", path.display()))?;
        eprintln!("Saved answer to {}", path.display());
    }

    Ok(())
}
