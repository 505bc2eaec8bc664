//! Interactive question-answering session.

use std::io::Write;
use std::path::{Path, PathBuf};

use anyhow::{Context, Result};
use clap::Args;
use console::style;
use tokio::io::{AsyncBufReadExt, BufReader};

use super::common::{build_session, index_documents, spinner};
use crate::cli::output::{Formatter, get_formatter};
use crate::models::{AnswerRecord, Config, OutputFormat};
use crate::services::{DEFAULT_EXPORT_FILE, Session, render_answer_pdf};

#[derive(Debug, Args)]
pub struct ChatArgs {
    #[arg(
        long = "doc",
        short = 'd',
        num_args = 1..,
        help = "Document files or directories to load at start"
    )]
    pub docs: Vec<PathBuf>,

    #[arg(long, short = 'k', help = "Number of chunks to retrieve as context")]
    pub top_k: Option<u32>,
}

const HELP: &str = "\
Type a question to ask it. Commands:
  /summary              Summarize the loaded documents
  /history              Show previous questions and answers
  /sources [n]          Show source references for answer n (default: last)
  /export [n] [file]    Save answer n as PDF (default: last, AI_Answer.pdf)
  /load <path>...       Load documents, replacing the current ones
  /clear                Forget loaded documents and history
  /help                 Show this help
  /quit                 Leave the session";

/// One line of user input.
#[derive(Debug, Clone, PartialEq)]
enum ChatInput {
    Empty,
    Question(String),
    Summary,
    History,
    Sources(Option<usize>),
    Export(Option<usize>, Option<PathBuf>),
    Load(Vec<PathBuf>),
    Clear,
    Help,
    Quit,
    Invalid(String),
}

fn parse_line(line: &str) -> ChatInput {
    let line = line.trim();
    if line.is_empty() {
        return ChatInput::Empty;
    }
    let Some(command) = line.strip_prefix('/') else {
        return ChatInput::Question(line.to_string());
    };

    let mut parts = command.split_whitespace();
    let name = parts.next().unwrap_or_default();
    let args: Vec<&str> = parts.collect();

    match name {
        "summary" | "summarize" => ChatInput::Summary,
        "history" => ChatInput::History,
        "sources" => match parse_index(args.first().copied()) {
            Ok(n) => ChatInput::Sources(n),
            Err(msg) => ChatInput::Invalid(msg),
        },
        "export" => {
            let (n, rest) = match args.first().map(|a| a.parse::<usize>()) {
                Some(Ok(n)) => (Some(n), &args[1..]),
                _ => (None, &args[..]),
            };
            if n == Some(0) {
                return ChatInput::Invalid("answers are numbered from 1".to_string());
            }
            ChatInput::Export(n, rest.first().map(PathBuf::from))
        }
        "load" if args.is_empty() => ChatInput::Invalid("usage: /load <path>...".to_string()),
        "load" => ChatInput::Load(args.into_iter().map(PathBuf::from).collect()),
        "clear" => ChatInput::Clear,
        "help" | "?" => ChatInput::Help,
        "quit" | "exit" | "q" => ChatInput::Quit,
        other => ChatInput::Invalid(format!("unknown command: /{other} (try /help)")),
    }
}

fn parse_index(arg: Option<&str>) -> Result<Option<usize>, String> {
    match arg {
        None => Ok(None),
        Some(a) => match a.parse::<usize>() {
            Ok(0) | Err(_) => Err(format!("invalid answer number: {a}")),
            Ok(n) => Ok(Some(n)),
        },
    }
}

/// Pick answer `n` (1-based) from history, or the most recent answer shown.
fn select<'a>(
    history: &'a [AnswerRecord],
    last: Option<&'a AnswerRecord>,
    n: Option<usize>,
) -> Result<&'a AnswerRecord, String> {
    match n {
        Some(n) => history
            .get(n - 1)
            .ok_or_else(|| format!("no answer #{n} (history has {})", history.len())),
        None => last.ok_or_else(|| "no answers yet".to_string()),
    }
}

pub async fn handle_chat(args: ChatArgs, format: OutputFormat, _verbose: bool) -> Result<()> {
    let config = Config::load()?.config;
    let formatter = get_formatter(format);
    let session = build_session(&config, args.top_k)?;

    if !args.docs.is_empty() {
        let upload = index_documents(&session, &config, &args.docs).await?;
        print!("{}", formatter.format_upload(&upload));
    }

    println!(
        "{} Ask a question about your documents, or type {} for commands.",
        style("docqa").bold().cyan(),
        style("/help").yellow()
    );

    let mut lines = BufReader::new(tokio::io::stdin()).lines();
    let mut last: Option<AnswerRecord> = None;

    loop {
        print!("{} ", style(">").bold().green());
        std::io::stdout().flush().ok();

        let Some(line) = lines.next_line().await.context("failed to read input")? else {
            println!();
            break;
        };

        match parse_line(&line) {
            ChatInput::Empty => {}
            ChatInput::Quit => break,
            ChatInput::Help => println!("{HELP}"),
            ChatInput::Invalid(msg) => eprint!("{}", formatter.format_error(&msg)),
            ChatInput::Question(question) => {
                let pb = spinner("Thinking...");
                let result = session.ask(&question).await;
                pb.finish_and_clear();
                match result {
                    Ok(record) => {
                        print!("{}", formatter.format_answer(&record, true));
                        last = Some(record);
                    }
                    Err(e) => eprint!("{}", formatter.format_error(&e.to_string())),
                }
            }
            ChatInput::Summary => {
                let pb = spinner("Summarizing...");
                let result = session.summarize().await;
                pb.finish_and_clear();
                match result {
                    Ok(record) => {
                        print!("{}", formatter.format_answer(&record, false));
                        last = Some(record);
                    }
                    Err(e) => eprint!("{}", formatter.format_error(&e.to_string())),
                }
            }
            ChatInput::History => {
                print!("{}", formatter.format_history(&session.history().await));
            }
            ChatInput::Sources(n) => {
                let history = session.history().await;
                match select(&history, last.as_ref(), n) {
                    Ok(record) => print!("{}", formatter.format_sources(&record.sources)),
                    Err(msg) => eprint!("{}", formatter.format_error(&msg)),
                }
            }
            ChatInput::Export(n, path) => {
                let history = session.history().await;
                let path = path.unwrap_or_else(|| PathBuf::from(DEFAULT_EXPORT_FILE));
                match select(&history, last.as_ref(), n) {
                    Ok(record) => export(record, &path, formatter.as_ref()),
                    Err(msg) => eprint!("{}", formatter.format_error(&msg)),
                }
            }
            ChatInput::Load(paths) => {
                load(&session, &config, &paths, formatter.as_ref()).await;
            }
            ChatInput::Clear => {
                session.clear().await;
                last = None;
                print!("{}", formatter.format_message("Session cleared."));
            }
        }
    }

    Ok(())
}

fn export(record: &AnswerRecord, path: &Path, formatter: &dyn Formatter) {
    match std::fs::write(path, render_answer_pdf(record)) {
        Ok(()) => print!(
            "{}",
            formatter.format_message(&format!("Saved answer to {}", path.display()))
        ),
        Err(e) => eprint!(
            "{}",
            formatter.format_error(&format!("failed to write {}: {e}", path.display()))
        ),
    }
}

async fn load(session: &Session, config: &Config, paths: &[PathBuf], formatter: &dyn Formatter) {
    match index_documents(session, config, paths).await {
        Ok(upload) => print!("{}", formatter.format_upload(&upload)),
        Err(e) => eprint!("{}", formatter.format_error(&format!("{e:#}"))),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::models::AnswerMode;

    #[test]
    fn test_parse_questions_and_blank_lines() {
        assert_eq!(parse_line("   "), ChatInput::Empty);
        assert_eq!(
            parse_line("  What is attention? "),
            ChatInput::Question("What is attention?".to_string())
        );
    }

    #[test]
    fn test_parse_commands() {
        assert_eq!(parse_line("/summary"), ChatInput::Summary);
        assert_eq!(parse_line("/history"), ChatInput::History);
        assert_eq!(parse_line("/sources"), ChatInput::Sources(None));
        assert_eq!(parse_line("/sources 2"), ChatInput::Sources(Some(2)));
        assert_eq!(parse_line("/clear"), ChatInput::Clear);
        assert_eq!(parse_line("/quit"), ChatInput::Quit);
        assert_eq!(
            parse_line("/load a.pdf notes"),
            ChatInput::Load(vec![PathBuf::from("a.pdf"), PathBuf::from("notes")])
        );
    }

    #[test]
    fn test_parse_export() {
        assert_eq!(parse_line("/export"), ChatInput::Export(None, None));
        assert_eq!(parse_line("/export 3"), ChatInput::Export(Some(3), None));
        assert_eq!(
            parse_line("/export 1 out.pdf"),
            ChatInput::Export(Some(1), Some(PathBuf::from("out.pdf")))
        );
        assert_eq!(
            parse_line("/export out.pdf"),
            ChatInput::Export(None, Some(PathBuf::from("out.pdf")))
        );
    }

    #[test]
    fn test_parse_invalid() {
        assert!(matches!(parse_line("/sources x"), ChatInput::Invalid(_)));
        assert!(matches!(parse_line("/sources 0"), ChatInput::Invalid(_)));
        assert!(matches!(parse_line("/export 0"), ChatInput::Invalid(_)));
        assert!(matches!(parse_line("/load"), ChatInput::Invalid(_)));
        assert!(matches!(parse_line("/frobnicate"), ChatInput::Invalid(_)));
    }

    #[test]
    fn test_select() {
        let a = AnswerRecord::new("a", "A", 1, vec![], AnswerMode::Question);
        let b = AnswerRecord::new("b", "B", 1, vec![], AnswerMode::Question);
        let history = vec![a, b];

        assert_eq!(select(&history, history.last(), None).unwrap().question, "b");
        assert_eq!(select(&history, None, Some(1)).unwrap().question, "a");
        assert!(select(&history, None, Some(3)).is_err());
        assert!(select(&[], None, None).is_err());
    }
}
