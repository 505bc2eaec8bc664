use std::path::Path;

use anyhow::Result;
use clap::Parser;
use tokio::signal;

use tracing_subscriber::EnvFilter;

use docqa::cli::commands::{
    handle_ask, handle_chat, handle_config, handle_status, handle_summarize,
};
use docqa::cli::{Cli, Commands};
use docqa::models::{Config, OutputFormat};

/// Places an ONNX Runtime shared library is commonly installed.
fn ort_library_candidates(home: &str) -> Vec<String> {
    if cfg!(target_os = "macos") {
        vec![
            format!("{home}/.local/lib/docqa/libonnxruntime.dylib"),
            "/opt/homebrew/opt/onnxruntime/lib/libonnxruntime.dylib".into(),
            "/usr/local/opt/onnxruntime/lib/libonnxruntime.dylib".into(),
        ]
    } else if cfg!(target_os = "linux") {
        let mut paths = vec![format!("{home}/.local/lib/docqa/libonnxruntime.so")];
        paths.extend(
            ["/usr/lib", "/usr/local/lib", "/usr/lib/x86_64-linux-gnu", "/usr/lib/aarch64-linux-gnu"]
                .iter()
                .map(|dir| format!("{dir}/libonnxruntime.so")),
        );
        paths
    } else {
        Vec::new()
    }
}

/// Point `ORT_DYLIB_PATH` at an installed ONNX Runtime unless it already names one.
/// Runs before the embedding backend touches `ort`.
fn detect_and_set_ort_path() {
    let already_set = std::env::var("ORT_DYLIB_PATH").is_ok_and(|p| Path::new(&p).exists());
    if already_set {
        return;
    }

    let home = std::env::var("HOME").unwrap_or_default();
    if let Some(path) = ort_library_candidates(&home)
        .into_iter()
        .find(|p| Path::new(p).exists())
    {
        // SAFETY: called from main before any other thread exists.
        unsafe {
            std::env::set_var("ORT_DYLIB_PATH", path);
        }
    }
}

/// Log to stderr. `RUST_LOG` wins; otherwise `--verbose` enables debug output for this crate.
fn init_tracing(verbose: bool) {
    let default = if verbose { "warn,docqa=debug" } else { "warn" };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default));

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .init();
}

fn main() -> Result<()> {
    // Environment is mutated before the runtime starts its worker threads
    detect_and_set_ort_path();
    dotenvy::dotenv().ok();

    tokio::runtime::Runtime::new()?.block_on(run())
}

async fn run() -> Result<()> {
    let cli = Cli::parse();
    init_tracing(cli.verbose);

    let format = cli.format.unwrap_or_else(|| {
        Config::load()
            .map(|r| r.config.output.default_format)
            .unwrap_or_default()
    });
    let verbose = cli.verbose;

    tokio::select! {
        result = run_command(cli.command, format, verbose) => {
            result?;
        }
        _ = shutdown_signal() => {
            eprintln!("\nReceived shutdown signal, exiting...");
            tokio::time::sleep(tokio::time::Duration::from_millis(100)).await;
        }
    }

    Ok(())
}

async fn run_command(command: Commands, format: OutputFormat, verbose: bool) -> Result<()> {
    match command {
        Commands::Ask(args) => {
            handle_ask(args, format, verbose).await?;
        }
        Commands::Summarize(args) => {
            handle_summarize(args, format, verbose).await?;
        }
        Commands::Chat(args) => {
            handle_chat(args, format, verbose).await?;
        }
        Commands::Status => {
            handle_status(format, verbose).await?;
        }
        Commands::Config(cmd) => {
            handle_config(cmd, format, verbose).await?;
        }
    }

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = async {
        signal::ctrl_c()
            .await
            .expect("failed to install Ctrl+C handler");
    };

    #[cfg(unix)]
    let terminate = async {
        signal::unix::signal(signal::unix::SignalKind::terminate())
            .expect("failed to install signal handler")
            .recv()
            .await;
    };

    #[cfg(not(unix))]
    let terminate = std::future::pending::<()>();

    tokio::select! {
        _ = ctrl_c => {},
        _ = terminate => {},
    }
}
