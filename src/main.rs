//! hgrc-settings reads, checks and edits Mercurial-style hgrc files.
//! It resolves the same layers Mercurial does (HGRCPATH or the system and
//! user files, then the repository's .hg/hgrc, then --config overrides)
//! and answers the questions people usually open their hgrc for: which
//! value wins, where it came from, which merge tool a file gets and
//! whether a pinned host still presents the certificate we expect.
use anyhow::Result;
use clap::{Args, Parser, Subcommand};
use std::path::PathBuf;
use std::process::ExitCode;
use tracing_subscriber::EnvFilter;

use hgrc_settings::builders::exporter::ExportFormat;
use hgrc_settings::utils::{self, GlobalOptions, WriteTarget};

#[derive(Parser)]
#[command(name = "hgrc-settings")]
#[command(about = "Inspect, validate and edit Mercurial hgrc settings")]
#[command(version)]
struct Cli {
    /// Repository whose .hg/hgrc is used (default: search upwards from the current directory)
    #[arg(short = 'R', long, global = true, value_name = "DIR")]
    repository: Option<PathBuf>,

    /// Set a single option, e.g. --config ui.verbose=True (repeatable)
    #[arg(long = "config", global = true, value_name = "SECTION.NAME=VALUE")]
    config: Vec<String>,

    /// Show more output (repeat for debug logging)
    #[arg(short, long, global = true, action = clap::ArgAction::Count)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

/// Which file a write goes to.
#[derive(Args)]
struct TargetArgs {
    /// Write to the repository's .hg/hgrc
    #[arg(long, conflicts_with = "file")]
    local: bool,

    /// Write to this file instead of the user hgrc
    #[arg(long, value_name = "PATH")]
    file: Option<PathBuf>,
}

impl From<TargetArgs> for WriteTarget {
    fn from(args: TargetArgs) -> Self {
        WriteTarget {
            local: args.local,
            file: args.file,
        }
    }
}

#[derive(Subcommand)]
enum Commands {
    /// Write the bundled hgrc to the user config if none exists
    Init {
        /// Identity to record as ui.username, e.g. "Jane Doe <jane@example.com>"
        #[arg(long)]
        username: Option<String>,
        #[command(flatten)]
        target: TargetArgs,
    },
    /// Show all settings, one section, or a single value
    Show {
        /// `section` or `section.key`
        name: Option<String>,
        /// Prefix each entry with the file and line it came from
        #[arg(long)]
        debug: bool,
    },
    /// Set section.key in a config file, keeping the rest of the file intact
    Set {
        name: String,
        value: String,
        #[command(flatten)]
        target: TargetArgs,
    },
    /// Remove section.key from a config file
    Unset {
        name: String,
        #[command(flatten)]
        target: TargetArgs,
    },
    /// Check the effective settings for mistakes
    Validate,
    /// Print a summary of the effective settings
    Summary,
    /// List the config files consulted, lowest precedence first
    Paths,
    /// Show which merge tool [merge-patterns] selects for a file
    MergeTool {
        /// Repository-relative path
        path: String,
    },
    /// Connect to a host and check its certificate against the configured pins
    CheckHost {
        host: String,
        #[arg(long, default_value_t = 443)]
        port: u16,
    },
    /// Write the effective settings to a file
    Export {
        output: PathBuf,
        /// Output format (default: from the file extension)
        #[arg(long, value_enum)]
        format: Option<ExportFormat>,
    },
    /// Merge settings from a file into a config file
    Import {
        input: PathBuf,
        /// Input format (default: from the file extension)
        #[arg(long, value_enum)]
        format: Option<ExportFormat>,
        #[command(flatten)]
        target: TargetArgs,
    },
}

fn init_logging(verbose: u8) {
    let default_level = match verbose {
        0 => "warn",
        1 => "info",
        _ => "debug",
    };
    // RUST_LOG wins over --verbose.
    tracing_subscriber::fmt()
        .with_env_filter(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_level)))
        .with_writer(std::io::stderr)
        .init();
}

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let options = GlobalOptions {
        repository: cli.repository,
        config: cli.config,
        verbose: cli.verbose > 0,
    };

    match cli.command {
        Commands::Init { username, target } => utils::initialize(&options, &target.into(), username.as_deref()),
        Commands::Show { name, debug } => utils::show(&options, name.as_deref(), debug),
        Commands::Set { name, value, target } => utils::set_value(&options, &target.into(), &name, &value),
        Commands::Unset { name, target } => utils::unset_value(&options, &target.into(), &name),
        Commands::Validate => utils::validate(&options),
        Commands::Summary => utils::summary(&options),
        Commands::Paths => utils::paths(&options),
        Commands::MergeTool { path } => utils::merge_tool(&options, &path),
        Commands::CheckHost { host, port } => utils::check_host(&options, &host, port),
        Commands::Export { output, format } => utils::export(&options, &output, format),
        Commands::Import { input, format, target } => utils::import(&options, &target.into(), &input, format),
    }
}
