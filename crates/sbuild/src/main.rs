use clap::{CommandFactory, Parser, Subcommand};
use std::path::PathBuf;
use std::sync::Arc;

use sbuild::commands::{self, BuildOptions};
use sbuild::config::{self, LOG_ENV, ROOT_ENV};
use sbuild::executor::StdoutSink;
use sbuild::session::Session;
use sbuild::ui::{self, Tone};
use sbuild::{Error, Result};

#[derive(Debug, Parser)]
#[command(
    author,
    version,
    about = "Per-package source build helper",
    disable_help_subcommand = true
)]
struct Args {
    /// Working root holding recipes/, sources/, work/, destdir/, packages/ and logs/
    #[arg(long, global = true, env = ROOT_ENV)]
    root: Option<PathBuf>,
    #[command(subcommand)]
    cmd: Option<Command>,
}

#[derive(Debug, Subcommand)]
enum Command {
    /// Create recipes/<name>/<name>.ini from the template
    #[command(visible_alias = "ns")]
    New { name: String },
    /// Show a recipe
    Info { name: String },
    /// List recipe files whose name contains <term>
    #[command(visible_alias = "srch")]
    Search { term: String },
    /// Download the source (fetch, extract and patch)
    #[command(visible_alias = "dl")]
    Fetch { name: String },
    /// Extract the source into work/ (fetch, extract and patch)
    #[command(visible_alias = "ex")]
    Extract { name: String },
    /// Apply patches (fetch, extract and patch)
    #[command(visible_alias = "pt")]
    Patch { name: String },
    /// Run every phase and install into destdir/<name>-<version>
    #[command(visible_alias = "b")]
    Build { name: String },
    /// Same as build
    #[command(visible_alias = "i")]
    Install { name: String },
    /// Build and install, then check installed binaries for broken libraries
    Bi { name: String },
    /// Archive destdir/<name>-<version> into packages/
    #[command(visible_alias = "pkg")]
    Package { name: String },
    /// Undo an install using its manifest
    #[command(visible_alias = "rm")]
    Remove { name: String },
    /// Check installed binaries for unresolved shared libraries
    Revdep { name: String },
    /// git add/commit/push of the working root
    Sync { message: Option<String> },
    /// Print this help
    #[command(visible_alias = "h")]
    Help,
}

fn init_tracing() {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_env(LOG_ENV)
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("warn")),
        )
        .init();
}

fn main() {
    init_tracing();
    let args = Args::parse();
    if let Err(e) = run(args) {
        ui::status_line(Tone::Fail, &e.to_string());
        std::process::exit(e.exit_code());
    }
}

fn run(args: Args) -> Result<()> {
    let cmd = match args.cmd {
        None | Some(Command::Help) => {
            return Args::command()
                .print_help()
                .map_err(|e| Error::msg(format!("failed to print help: {e}")));
        }
        Some(cmd) => cmd,
    };
    let root = match args.root {
        Some(r) => r,
        None => std::env::current_dir()
            .map_err(|e| Error::msg(format!("failed to resolve working directory: {e}")))?,
    };
    let session = Session::open(&root, Arc::new(StdoutSink::default()))?;

    let build = BuildOptions {
        force_strip: config::strip_forced(),
        revdep: false,
    };
    match cmd {
        Command::New { name } => commands::new_recipe(&session, &name).map(drop),
        Command::Info { name } => commands::info(&session, &name),
        Command::Search { term } => commands::search(&session, &term).map(drop),
        Command::Fetch { name } | Command::Extract { name } | Command::Patch { name } => {
            commands::fetch_extract_patch(&session, &name).map(drop)
        }
        Command::Build { name } | Command::Install { name } => {
            commands::build_install(&session, &name, build).map(drop)
        }
        Command::Bi { name } => commands::build_install(
            &session,
            &name,
            BuildOptions {
                revdep: true,
                ..build
            },
        )
        .map(drop),
        Command::Package { name } => commands::package(&session, &name).map(drop),
        Command::Remove { name } => commands::remove(&session, &name).map(drop),
        Command::Revdep { name } => commands::revdep(&session, &name),
        Command::Sync { message } => sbuild::sync::sync(&session, message.as_deref()),
        Command::Help => Ok(()),
    }
}
