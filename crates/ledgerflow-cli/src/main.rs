// crates/ledgerflow-cli/src/main.rs
// ============================================================================
// Module: Ledgerflow CLI Entry Point
// Description: Command dispatcher for Ledgerflow operator tasks.
// Purpose: Validate config, load templates and catalogs, sweep timeouts, report totals.
// Dependencies: clap, ledgerflow-config, ledgerflow-core, ledgerflow-store-sqlite, serde, thiserror.
// ============================================================================

//! ## Overview
//! The `ledgerflow` binary drives both engines against the configured store as
//! the trusted system principal. Template and catalog inputs are JSON, or TOML
//! when the file ends in `.toml`. Command output goes to stdout; logs and
//! notifications go to stderr or the configured sink.
//!
//! Security posture: input files are untrusted; reads are size-limited and
//! every document is validated before it reaches a store.

// ============================================================================
// SECTION: Modules
// ============================================================================

pub(crate) mod backend;
pub(crate) mod logging;

// ============================================================================
// SECTION: Imports
// ============================================================================

use std::fs::File;
use std::io::Read;
use std::io::Write;
use std::path::Path;
use std::path::PathBuf;
use std::process::ExitCode;

use clap::Args;
use clap::Parser;
use clap::Subcommand;
use ledgerflow_config::LedgerflowConfig;
use ledgerflow_config::StoreType;
use ledgerflow_core::CatalogSpec;
use ledgerflow_core::DateRange;
use ledgerflow_core::Principal;
use ledgerflow_core::ProjectId;
use ledgerflow_core::TemplateCode;
use ledgerflow_core::TemplateSpec;
use ledgerflow_core::TimeoutSweeper;
use ledgerflow_core::Timestamp;
use ledgerflow_core::UserId;
use serde::Serialize;
use serde::de::DeserializeOwned;
use thiserror::Error;
use time::OffsetDateTime;
use time::format_description::well_known::Rfc3339;
use tracing::info;

use crate::backend::output_value_engine;
use crate::backend::workflow_engine;
use crate::logging::init_logging;

// ============================================================================
// SECTION: Limits
// ============================================================================

/// Maximum size of a template, catalog, or directory input file.
pub(crate) const MAX_INPUT_BYTES: usize = 4 * 1024 * 1024;

// ============================================================================
// SECTION: CLI Types
// ============================================================================

/// Top-level CLI definition.
#[derive(Parser, Debug)]
#[command(name = "ledgerflow", version, disable_help_subcommand = true)]
struct Cli {
    /// Config file path (defaults to `LEDGERFLOW_CONFIG`, then ./ledgerflow.toml).
    #[arg(long, value_name = "PATH", global = true)]
    config: Option<PathBuf>,
    /// Selected subcommand to execute.
    #[command(subcommand)]
    command: Commands,
}

/// Supported CLI subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Configuration utilities.
    Config {
        /// Selected config subcommand.
        #[command(subcommand)]
        command: ConfigCommand,
    },
    /// Workflow template utilities.
    Template {
        /// Selected template subcommand.
        #[command(subcommand)]
        command: TemplateCommand,
    },
    /// Output-value catalog utilities.
    Catalog {
        /// Selected catalog subcommand.
        #[command(subcommand)]
        command: CatalogCommand,
    },
    /// Run one timeout sweep over overdue approval records.
    Sweep,
    /// Output-value summaries.
    Summary {
        /// Selected summary subcommand.
        #[command(subcommand)]
        command: SummaryCommand,
    },
}

impl Commands {
    /// Returns false for commands that never touch config or storage.
    const fn needs_config(&self) -> bool {
        !matches!(self, Self::Template {
            command: TemplateCommand::Validate(_),
        })
    }
}

/// Config subcommands.
#[derive(Subcommand, Debug)]
enum ConfigCommand {
    /// Validate the configuration file.
    Validate(ConfigValidateCommand),
}

/// Arguments for config validation.
#[derive(Args, Debug)]
struct ConfigValidateCommand {
    /// Print the effective config as JSON.
    #[arg(long)]
    print: bool,
}

/// Template subcommands.
#[derive(Subcommand, Debug)]
enum TemplateCommand {
    /// Validate a template file without storing it.
    Validate(TemplateFileArgs),
    /// Register a template file as a draft.
    Register(TemplateFileArgs),
    /// Activate a registered template.
    Activate(TemplateCodeArgs),
}

/// Template file argument.
#[derive(Args, Debug)]
struct TemplateFileArgs {
    /// Template file (JSON, or TOML by extension).
    #[arg(value_name = "FILE")]
    file: PathBuf,
}

/// Template code argument.
#[derive(Args, Debug)]
struct TemplateCodeArgs {
    /// Template code.
    #[arg(value_name = "CODE")]
    code: String,
}

/// Catalog subcommands.
#[derive(Subcommand, Debug)]
enum CatalogCommand {
    /// Upsert a catalog file by code.
    Load(CatalogLoadCommand),
}

/// Arguments for catalog loading.
#[derive(Args, Debug)]
struct CatalogLoadCommand {
    /// Catalog file (JSON, or TOML by extension).
    #[arg(value_name = "FILE")]
    file: PathBuf,
}

/// Summary subcommands.
#[derive(Subcommand, Debug)]
enum SummaryCommand {
    /// Totals for one project.
    Project(SummaryProjectCommand),
    /// Totals for one responsible user.
    User(SummaryUserCommand),
}

/// Arguments for a project summary.
#[derive(Args, Debug)]
struct SummaryProjectCommand {
    /// Project id.
    #[arg(value_name = "ID")]
    project_id: i64,
}

/// Arguments for a user summary.
#[derive(Args, Debug)]
struct SummaryUserCommand {
    /// User id.
    #[arg(value_name = "ID")]
    user_id: i64,
    /// Inclusive lower bound on record creation time (RFC 3339).
    #[arg(long, value_name = "TIME")]
    from: Option<String>,
    /// Exclusive upper bound on record creation time (RFC 3339).
    #[arg(long, value_name = "TIME")]
    to: Option<String>,
}

// ============================================================================
// SECTION: Errors
// ============================================================================

/// CLI error wrapper carrying a user-facing message.
#[derive(Debug, Error)]
#[error("{message}")]
pub(crate) struct CliError {
    /// Human-readable error message.
    message: String,
}

impl CliError {
    /// Constructs a new [`CliError`] from a message.
    pub(crate) const fn new(message: String) -> Self {
        Self {
            message,
        }
    }
}

/// CLI result alias for fallible operations.
pub(crate) type CliResult<T> = Result<T, CliError>;

/// Bounded file read failures.
#[derive(Debug, Error)]
pub(crate) enum ReadLimitError {
    /// The file could not be opened or read.
    #[error("{0}")]
    Io(#[from] std::io::Error),
    /// The file exceeds the allowed size.
    #[error("file is {size} bytes; limit is {limit}")]
    TooLarge {
        /// Observed size.
        size: u64,
        /// Allowed size.
        limit: usize,
    },
}

// ============================================================================
// SECTION: Entry Point
// ============================================================================

/// CLI entry point returning an exit code.
fn main() -> ExitCode {
    match run() {
        Ok(code) => code,
        Err(err) => emit_error(&err.to_string()),
    }
}

/// Parses arguments, loads config, and dispatches.
fn run() -> CliResult<ExitCode> {
    let cli = Cli::parse();
    let config = if cli.command.needs_config() {
        let config = load_config(cli.config.as_deref())?;
        init_logging(&config.logging)?;
        config
    } else {
        LedgerflowConfig::default()
    };
    let mut stdout = std::io::stdout().lock();
    dispatch(cli.command, &config, &mut stdout)
}

/// Loads and validates the config file.
fn load_config(path: Option<&Path>) -> CliResult<LedgerflowConfig> {
    LedgerflowConfig::load(path)
        .map_err(|err| CliError::new(format!("failed to load config: {err}")))
}

/// Executes one command against a loaded config.
fn dispatch(
    command: Commands,
    config: &LedgerflowConfig,
    out: &mut dyn Write,
) -> CliResult<ExitCode> {
    match command {
        Commands::Config {
            command: ConfigCommand::Validate(command),
        } => command_config_validate(&command, config, out),
        Commands::Template {
            command,
        } => command_template(command, config, out),
        Commands::Catalog {
            command: CatalogCommand::Load(command),
        } => command_catalog_load(&command, config, out),
        Commands::Sweep => command_sweep(config, out),
        Commands::Summary {
            command,
        } => command_summary(command, config, out),
    }
}

// ============================================================================
// SECTION: Config Command
// ============================================================================

/// Reports a loaded config, optionally printing it.
fn command_config_validate(
    command: &ConfigValidateCommand,
    config: &LedgerflowConfig,
    out: &mut dyn Write,
) -> CliResult<ExitCode> {
    if command.print {
        let rendered = config.to_json_pretty().map_err(|err| CliError::new(err.to_string()))?;
        write_line(out, &rendered)?;
    } else {
        let store = match config.store.store_type {
            StoreType::Memory => "memory",
            StoreType::Sqlite => "sqlite",
        };
        write_line(out, &format!("config ok (store: {store})"))?;
    }
    Ok(ExitCode::SUCCESS)
}

// ============================================================================
// SECTION: Template Commands
// ============================================================================

/// Dispatches template subcommands.
fn command_template(
    command: TemplateCommand,
    config: &LedgerflowConfig,
    out: &mut dyn Write,
) -> CliResult<ExitCode> {
    match command {
        TemplateCommand::Validate(args) => {
            let spec: TemplateSpec = read_document(&args.file)?;
            spec.validate().map_err(|err| {
                CliError::new(format!("template {} is invalid: {err}", spec.code))
            })?;
            write_line(out, &format!("template {} is valid ({} nodes)", spec.code, spec.nodes.len()))?;
        }
        TemplateCommand::Register(args) => {
            let spec: TemplateSpec = read_document(&args.file)?;
            let engine = workflow_engine(config)?;
            let template = engine
                .register_template(Principal::System, &spec)
                .map_err(|err| CliError::new(format!("failed to register template: {err}")))?;
            write_line(
                out,
                &format!("template {} registered as {}", template.code, template.status),
            )?;
        }
        TemplateCommand::Activate(args) => {
            let code = TemplateCode::parse(&args.code)
                .map_err(|err| CliError::new(format!("invalid template code: {err}")))?;
            let engine = workflow_engine(config)?;
            let template = engine
                .activate_template(Principal::System, &code)
                .map_err(|err| CliError::new(format!("failed to activate template: {err}")))?;
            write_line(out, &format!("template {} is {}", template.code, template.status))?;
        }
    }
    Ok(ExitCode::SUCCESS)
}

// ============================================================================
// SECTION: Catalog Command
// ============================================================================

/// Loads a catalog file.
fn command_catalog_load(
    command: &CatalogLoadCommand,
    config: &LedgerflowConfig,
    out: &mut dyn Write,
) -> CliResult<ExitCode> {
    let spec: CatalogSpec = read_document(&command.file)?;
    let engine = output_value_engine(config)?;
    let catalog = engine
        .load_catalog(Principal::System, &spec)
        .map_err(|err| CliError::new(format!("failed to load catalog: {err}")))?;
    let events: usize = catalog
        .iter()
        .flat_map(|stage| stage.milestones.iter())
        .map(|milestone| milestone.events.len())
        .sum();
    write_line(out, &format!("catalog loaded: {} stages, {events} events", catalog.len()))?;
    Ok(ExitCode::SUCCESS)
}

// ============================================================================
// SECTION: Sweep Command
// ============================================================================

/// Runs one sweeper pass and prints its report.
fn command_sweep(config: &LedgerflowConfig, out: &mut dyn Write) -> CliResult<ExitCode> {
    let engine = workflow_engine(config)?;
    let report = TimeoutSweeper::new(&engine, config.sweeper_config())
        .run_once()
        .map_err(|err| CliError::new(format!("sweep failed: {err}")))?;
    info!(scanned = report.scanned, failed = report.failed, "sweep finished");
    write_json(out, &report)?;
    if report.failed > 0 { Ok(ExitCode::FAILURE) } else { Ok(ExitCode::SUCCESS) }
}

// ============================================================================
// SECTION: Summary Commands
// ============================================================================

/// Dispatches summary subcommands.
fn command_summary(
    command: SummaryCommand,
    config: &LedgerflowConfig,
    out: &mut dyn Write,
) -> CliResult<ExitCode> {
    let engine = output_value_engine(config)?;
    match command {
        SummaryCommand::Project(command) => {
            let summary = engine
                .project_summary(ProjectId::new(command.project_id))
                .map_err(|err| CliError::new(format!("summary failed: {err}")))?;
            write_json(out, &summary)?;
        }
        SummaryCommand::User(command) => {
            let range = DateRange {
                from: command.from.as_deref().map(parse_time_bound).transpose()?,
                to: command.to.as_deref().map(parse_time_bound).transpose()?,
            };
            if let (Some(from), Some(to)) = (range.from, range.to)
                && from >= to
            {
                return Err(CliError::new("--from must be earlier than --to".to_string()));
            }
            let summary = engine
                .user_summary(UserId::new(command.user_id), range)
                .map_err(|err| CliError::new(format!("summary failed: {err}")))?;
            write_json(out, &summary)?;
        }
    }
    Ok(ExitCode::SUCCESS)
}

/// Parses an RFC 3339 instant into a timestamp.
fn parse_time_bound(raw: &str) -> CliResult<Timestamp> {
    let parsed = OffsetDateTime::parse(raw, &Rfc3339)
        .map_err(|err| CliError::new(format!("invalid time {raw}: {err}")))?;
    let millis = i64::try_from(parsed.unix_timestamp_nanos() / 1_000_000)
        .map_err(|_| CliError::new(format!("time {raw} is out of range")))?;
    Ok(Timestamp::from_unix_millis(millis))
}

// ============================================================================
// SECTION: Input Helpers
// ============================================================================

/// Reads a file, failing when it exceeds `max_bytes`.
pub(crate) fn read_bytes_with_limit(path: &Path, max_bytes: usize) -> Result<Vec<u8>, ReadLimitError> {
    let file = File::open(path)?;
    let size = file.metadata()?.len();
    let limit = u64::try_from(max_bytes).unwrap_or(u64::MAX);
    if size > limit {
        return Err(ReadLimitError::TooLarge {
            size,
            limit: max_bytes,
        });
    }
    let mut bytes = Vec::new();
    file.take(limit.saturating_add(1)).read_to_end(&mut bytes)?;
    if bytes.len() > max_bytes {
        return Err(ReadLimitError::TooLarge {
            size: u64::try_from(bytes.len()).unwrap_or(u64::MAX),
            limit: max_bytes,
        });
    }
    Ok(bytes)
}

/// Input document encodings.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum DocumentFormat {
    /// JSON document.
    Json,
    /// TOML document.
    Toml,
}

impl DocumentFormat {
    /// Picks the format from the file extension; JSON unless `.toml`.
    fn for_path(path: &Path) -> Self {
        match path.extension().and_then(|ext| ext.to_str()) {
            Some(ext) if ext.eq_ignore_ascii_case("toml") => Self::Toml,
            _ => Self::Json,
        }
    }
}

/// Reads and decodes a JSON or TOML document.
fn read_document<T: DeserializeOwned>(path: &Path) -> CliResult<T> {
    let bytes = read_bytes_with_limit(path, MAX_INPUT_BYTES)
        .map_err(|err| CliError::new(format!("failed to read {}: {err}", path.display())))?;
    decode_document(DocumentFormat::for_path(path), &bytes)
        .map_err(|err| CliError::new(format!("failed to parse {}: {err}", path.display())))
}

/// Decodes document bytes in the given format.
fn decode_document<T: DeserializeOwned>(format: DocumentFormat, bytes: &[u8]) -> Result<T, String> {
    match format {
        DocumentFormat::Json => serde_json::from_slice(bytes).map_err(|err| err.to_string()),
        DocumentFormat::Toml => {
            let text = std::str::from_utf8(bytes).map_err(|_| "input must be utf-8".to_string())?;
            toml::from_str(text).map_err(|err| err.to_string())
        }
    }
}

// ============================================================================
// SECTION: Output Helpers
// ============================================================================

/// Writes one line of command output.
fn write_line(out: &mut dyn Write, message: &str) -> CliResult<()> {
    writeln!(out, "{message}").map_err(|err| CliError::new(format!("failed to write output: {err}")))
}

/// Writes a value as pretty JSON.
fn write_json<T: Serialize>(out: &mut dyn Write, value: &T) -> CliResult<()> {
    let rendered = serde_json::to_string_pretty(value)
        .map_err(|err| CliError::new(format!("failed to render output: {err}")))?;
    write_line(out, &rendered)
}

/// Writes a line to stderr.
fn write_stderr_line(message: &str) -> std::io::Result<()> {
    let mut stderr = std::io::stderr();
    writeln!(&mut stderr, "{message}")
}

/// Emits an error message to stderr and returns a failure exit code.
fn emit_error(message: &str) -> ExitCode {
    let _ = write_stderr_line(message);
    ExitCode::FAILURE
}
