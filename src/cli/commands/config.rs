use std::path::PathBuf;
use std::process::Command;

use anyhow::{Context, Result};
use clap::Subcommand;

use crate::cli::output::{Formatter, get_formatter};
use crate::models::{Config, OutputFormat};

#[derive(Debug, Subcommand)]
pub enum ConfigCommand {
    #[command(about = "Write a config file with default settings")]
    Init {
        #[arg(long, short = 'g', help = "Write the global config instead of .docqa/")]
        global: bool,
        #[arg(long, short = 'f', help = "Overwrite an existing file")]
        force: bool,
    },
    #[command(about = "Print the effective configuration")]
    Show,
    #[command(about = "List config, model and .env locations")]
    Path {
        #[arg(long, help = "Also list locations that do not exist yet")]
        all: bool,
    },
    #[command(about = "Open a config file in $EDITOR")]
    Edit {
        #[arg(long, short = 'g', help = "Edit the global config instead of .docqa/")]
        global: bool,
    },
}

/// Which config file a command acts on.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Scope {
    Global,
    Project,
}

impl Scope {
    fn from_flag(global: bool) -> Self {
        if global { Scope::Global } else { Scope::Project }
    }

    fn label(self) -> &'static str {
        match self {
            Scope::Global => "global",
            Scope::Project => "project",
        }
    }

    /// File this scope reads and writes. A project config found in an
    /// ancestor directory takes precedence over a new one in the cwd.
    fn path(self) -> Result<PathBuf> {
        let path = match self {
            Scope::Global => Config::global_path(),
            Scope::Project => Config::find_project_config()
                .or_else(|| Config::project_config_dir().map(|d| d.join("config.toml"))),
        };
        path.context("could not determine config location")
    }

    fn create(self) -> Result<PathBuf> {
        let created = match self {
            Scope::Global => Config::init_global(),
            Scope::Project => Config::init_project(),
        };
        created.with_context(|| format!("failed to create {} config", self.label()))
    }
}

pub async fn handle_config(cmd: ConfigCommand, format: OutputFormat, _verbose: bool) -> Result<()> {
    let formatter = get_formatter(format);

    match cmd {
        ConfigCommand::Init { global, force } => {
            init(Scope::from_flag(global), force, formatter.as_ref())
        }
        ConfigCommand::Show => show(format),
        ConfigCommand::Path { all } => paths(all),
        ConfigCommand::Edit { global } => edit(Scope::from_flag(global), formatter.as_ref()),
    }
}

fn init(scope: Scope, force: bool, formatter: &dyn Formatter) -> Result<()> {
    // `init` always targets the cwd for project configs, not an ancestor
    let target = match scope {
        Scope::Global => scope.path()?,
        Scope::Project => Config::project_config_dir()
            .map(|d| d.join("config.toml"))
            .context("could not determine current directory")?,
    };

    if target.exists() && !force {
        anyhow::bail!(
            "{} config already exists at {} (use --force to overwrite)",
            scope.label(),
            target.display()
        );
    }

    let path = scope.create()?;
    print!(
        "{}",
        formatter.format_message(&format!("Wrote {} config to {}", scope.label(), path.display()))
    );
    Ok(())
}

fn show(format: OutputFormat) -> Result<()> {
    let resolved = Config::load()?;
    let model_dir = resolved.config.embedding_model_dir();

    if format == OutputFormat::Json {
        let output = serde_json::json!({
            "config": resolved.config,
            "global_path": resolved.global_path,
            "project_path": resolved.project_path,
            "model_dir": model_dir,
        });
        println!("{}", serde_json::to_string_pretty(&output)?);
        return Ok(());
    }

    for (label, path) in [
        ("global", &resolved.global_path),
        ("project", &resolved.project_path),
    ] {
        if let Some(path) = path {
            println!("# {label} config: {}", path.display());
        }
    }
    if let Some(dir) = &model_dir {
        println!("# model directory: {}", dir.display());
    }
    println!();

    let rendered = toml::to_string_pretty(&resolved.config).context("failed to render config")?;
    print!("{rendered}");
    Ok(())
}

fn paths(all: bool) -> Result<()> {
    let mut rows: Vec<(&str, PathBuf)> = Vec::new();

    if let Ok(path) = Scope::Global.path() {
        rows.push(("Global config", path));
    }
    if let Ok(path) = Scope::Project.path() {
        rows.push(("Project config", path));
    }
    if let Some(dir) = Config::models_dir() {
        rows.push(("Models", dir));
    }
    if let Ok(cwd) = std::env::current_dir() {
        rows.push((".env", cwd.join(".env")));
    }

    for (label, path) in rows {
        let exists = path.exists();
        if exists || all {
            let state = if exists { "" } else { " (not created)" };
            println!("{label:<15} {}{state}", path.display());
        }
    }
    Ok(())
}

fn edit(scope: Scope, formatter: &dyn Formatter) -> Result<()> {
    let mut path = scope.path()?;
    if !path.exists() {
        path = scope.create()?;
        print!(
            "{}",
            formatter.format_message(&format!("Wrote {} config to {}", scope.label(), path.display()))
        );
    }

    let editor = std::env::var("EDITOR")
        .or_else(|_| std::env::var("VISUAL"))
        .unwrap_or_else(|_| "vi".to_string());

    let status = Command::new(&editor)
        .arg(&path)
        .status()
        .with_context(|| format!("failed to launch {editor}"))?;
    if !status.success() {
        anyhow::bail!("{editor} exited with {status}");
    }
    Ok(())
}
