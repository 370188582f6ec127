// geodiff CLI - snapshot reconciliation and grid ranking

mod exit_codes;
mod run;
mod sanitize;

use std::path::PathBuf;
use std::process::ExitCode;

use clap::{ArgAction, Parser, Subcommand};
use geodiff_recon::ReconError;

use exit_codes::{recon_exit_code, EXIT_ERROR, EXIT_SUCCESS, EXIT_USAGE};

#[derive(Parser)]
#[command(name = "geodiff")]
#[command(about = "Reconcile two snapshots of a geospatial dataset and rank change per grid cell")]
#[command(long_version = long_version())]
#[command(version)]
struct Cli {
    /// Raise log verbosity (-v info, -vv debug, -vvv trace). Overrides RUST_LOG.
    #[arg(short, long, action = ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run every job of a TOML config
    #[command(after_help = "\
Examples:
  geodiff run hydro.recon.toml
  geodiff run hydro.recon.toml --json
  geodiff run hydro.recon.toml --output out/")]
    Run {
        /// Path to the .recon.toml config file
        config: PathBuf,

        /// Print the full report as JSON to stdout
        #[arg(long)]
        json: bool,

        /// Write CSV tables and report.json into this directory
        #[arg(long)]
        output: Option<PathBuf>,
    },

    /// Validate a config without loading any data
    #[command(after_help = "\
Examples:
  geodiff validate hydro.recon.toml")]
    Validate {
        /// Path to the .recon.toml config file
        config: PathBuf,
    },

    /// Replace values in selected columns of a CSV snapshot
    #[command(after_help = "\
Examples:
  geodiff sanitize parcels.csv --fields OWNER,ZONE --find n/a --replace UNKNOWN
  geodiff sanitize parcels.csv --replace - --output parcels.clean.csv
  geodiff sanitize parcels.csv --find none --replace 0 --where ZONE=R1|R2")]
    Sanitize {
        /// CSV file to read
        input: PathBuf,

        /// Columns to touch (default: every column except key and geometry)
        #[arg(long, value_delimiter = ',')]
        fields: Option<Vec<String>>,

        /// Value to look for (default: empty cells)
        #[arg(long)]
        find: Option<String>,

        /// Replacement value
        #[arg(long)]
        replace: String,

        /// Only touch rows where COLUMN equals one of the listed values
        #[arg(long = "where", value_name = "COLUMN=V1|V2")]
        where_clause: Option<String>,

        /// Key column, left untouched
        #[arg(long)]
        key: Option<String>,

        /// WKT geometry column, left untouched
        #[arg(long)]
        geometry_field: Option<String>,

        /// Rows per chunk
        #[arg(long)]
        chunk_size: Option<usize>,

        /// Write here instead of stdout
        #[arg(long, short)]
        output: Option<PathBuf>,
    },
}

fn long_version() -> &'static str {
    concat!(
        env!("CARGO_PKG_VERSION"),
        " (",
        env!("GEODIFF_COMMIT"),
        ")",
        "\nengine:  geodiff-recon ",
        env!("CARGO_PKG_VERSION"),
        "\ntarget:  ",
        env!("GEODIFF_TARGET"),
    )
}

// ---------------------------------------------------------------------------
// Errors
// ---------------------------------------------------------------------------

#[derive(Debug)]
pub struct CliError {
    pub code: u8,
    /// Failing engine operation, when there is one.
    pub operation: Option<&'static str>,
    pub message: String,
    pub hint: Option<String>,
}

impl CliError {
    pub fn new(code: u8, msg: impl Into<String>) -> Self {
        Self { code, operation: None, message: msg.into(), hint: None }
    }

    pub fn usage(msg: impl Into<String>) -> Self {
        Self::new(EXIT_USAGE, msg)
    }

    pub fn with_hint(mut self, hint: impl Into<String>) -> Self {
        self.hint = Some(hint.into());
        self
    }
}

impl From<ReconError> for CliError {
    fn from(err: ReconError) -> Self {
        Self {
            code: recon_exit_code(&err),
            operation: Some(err.operation()),
            message: err.to_string(),
            hint: None,
        }
    }
}

// ---------------------------------------------------------------------------
// Logging
// ---------------------------------------------------------------------------

fn init_logging(verbose: u8) {
    use tracing_subscriber::EnvFilter;

    let filter = match verbose {
        0 => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("warn")),
        1 => EnvFilter::new("info"),
        2 => EnvFilter::new("debug"),
        _ => EnvFilter::new("trace"),
    };
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

fn install_panic_hook() {
    std::panic::set_hook(Box::new(|info| {
        let message = info
            .payload()
            .downcast_ref::<&str>()
            .map(|s| s.to_string())
            .or_else(|| info.payload().downcast_ref::<String>().cloned())
            .unwrap_or_else(|| "unknown panic".into());
        match info.location() {
            Some(loc) => eprintln!("internal error at {}:{}: {message}", loc.file(), loc.line()),
            None => eprintln!("internal error: {message}"),
        }
    }));
}

fn main() -> ExitCode {
    let cli = Cli::parse();
    init_logging(cli.verbose);
    install_panic_hook();

    let command = cli.command;
    let dispatched = std::panic::catch_unwind(std::panic::AssertUnwindSafe(move || dispatch(command)));
    let result = dispatched.unwrap_or_else(|_| Err(CliError::new(EXIT_ERROR, "")));

    match result {
        Ok(()) => ExitCode::from(EXIT_SUCCESS),
        Err(CliError { code, operation, message, hint }) => {
            if !message.is_empty() {
                match operation {
                    Some(op) => eprintln!("error in {op}: {message}"),
                    None => eprintln!("error: {message}"),
                }
            }
            if let Some(hint) = hint {
                eprintln!("hint:  {hint}");
            }
            ExitCode::from(code)
        }
    }
}

fn dispatch(command: Commands) -> Result<(), CliError> {
    match command {
        Commands::Run { config, json, output } => run::cmd_run(config, json, output),
        Commands::Validate { config } => run::cmd_validate(config),
        Commands::Sanitize {
            input,
            fields,
            find,
            replace,
            where_clause,
            key,
            geometry_field,
            chunk_size,
            output,
        } => sanitize::cmd_sanitize(sanitize::SanitizeArgs {
            input,
            fields,
            find,
            replace,
            where_clause,
            key,
            geometry_field,
            chunk_size,
            output,
        }),
    }
}
