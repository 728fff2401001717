// taxalign CLI - batch taxon name reconciliation against a taxonomic registry

mod exit_codes;
mod inputs;
mod registry;
mod run;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{Parser, Subcommand};
use tracing_subscriber::EnvFilter;

use exit_codes::{EXIT_CONFIG, EXIT_ERROR, EXIT_OUTPUT, EXIT_SUCCESS};

#[derive(Parser)]
#[command(name = "taxalign")]
#[command(about = "Reconcile catalog species names against a taxonomic registry")]
#[command(long_version = long_version())]
#[command(version)]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run the full reconciliation and write the taxonomy table and review reports
    #[command(after_help = "\
Examples:
  taxalign run diatoms.taxalign.toml
  taxalign run diatoms.taxalign.toml --json
  taxalign run diatoms.taxalign.toml --output summary.json
  taxalign run diatoms.taxalign.toml --fail-on-issues

The registry credential is read from the environment variable named by
registry.api_key_env (default TAXALIGN_API_KEY). Set RUST_LOG=info for
per-stage progress on stderr.")]
    Run {
        /// Path to the .taxalign.toml config file
        config: PathBuf,

        /// Print the JSON run summary to stdout
        #[arg(long)]
        json: bool,

        /// Write the JSON run summary to a file
        #[arg(long)]
        output: Option<PathBuf>,

        /// Exit 5 when lookup failures, retrieval gaps or structural issues were found
        #[arg(long)]
        fail_on_issues: bool,
    },

    /// Check a config and its input files without contacting the registry
    #[command(after_help = "\
Examples:
  taxalign validate diatoms.taxalign.toml")]
    Validate {
        /// Path to the .taxalign.toml config file
        config: PathBuf,
    },
}

fn long_version() -> &'static str {
    concat!(
        env!("CARGO_PKG_VERSION"),
        " (", env!("GIT_COMMIT_HASH"), ")",
        "\nengine:  taxalign-recon ", env!("CARGO_PKG_VERSION"),
        "\ntarget:  ", env!("TARGET"),
    )
}

/// Diagnostics go to stderr; stdout is reserved for `--json`.
fn init_logging() {
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn"));
    // Installs the `log` bridge too, so engine records are captured.
    let _ = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false)
        .try_init();
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging();

    let result = match cli.command {
        Commands::Run { config, json, output, fail_on_issues } => {
            run::cmd_run(config, json, output, fail_on_issues)
        }
        Commands::Validate { config } => run::cmd_validate(config),
    };

    match result {
        Ok(()) => ExitCode::from(EXIT_SUCCESS),
        Err(CliError { code, message, hint }) => {
            if !message.is_empty() {
                eprintln!("error: {}", message);
            }
            if let Some(hint) = hint {
                eprintln!("hint:  {}", hint);
            }
            ExitCode::from(code)
        }
    }
}

#[derive(Debug)]
pub struct CliError {
    pub code: u8,
    pub message: String,
    pub hint: Option<String>,
}

impl CliError {
    pub fn general(msg: impl Into<String>) -> Self {
        Self { code: EXIT_ERROR, message: msg.into(), hint: None }
    }

    pub fn config(msg: impl Into<String>) -> Self {
        Self { code: EXIT_CONFIG, message: msg.into(), hint: None }
    }

    pub fn output(msg: impl Into<String>) -> Self {
        Self { code: EXIT_OUTPUT, message: msg.into(), hint: None }
    }

    /// Add a hint to an existing error.
    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}
