// crates/ledgerflow-cli/src/logging.rs
// ============================================================================
// Module: CLI Logging
// Description: Installs the tracing subscriber for the ledgerflow binary.
// Purpose: Route engine spans and events to stderr in the configured format.
// Dependencies: ledgerflow-config, tracing-subscriber
// ============================================================================

//! ## Overview
//! `RUST_LOG` wins when set; otherwise the `[logging] level` value is the
//! default directive. Log lines always go to stderr so stdout carries only
//! command output.

use ledgerflow_config::LogFormat;
use ledgerflow_config::LoggingConfig;
use tracing_subscriber::EnvFilter;

use crate::CliError;
use crate::CliResult;

/// Installs the global subscriber.
pub(crate) fn init_logging(config: &LoggingConfig) -> CliResult<()> {
    let filter = EnvFilter::try_from_default_env()
        .unwrap_or_else(|_| EnvFilter::new(config.level.to_ascii_lowercase()));
    let builder =
        tracing_subscriber::fmt().with_env_filter(filter).with_writer(std::io::stderr);
    let installed = match config.format {
        LogFormat::Pretty => builder.try_init(),
        LogFormat::Json => builder.json().try_init(),
    };
    installed.map_err(|err| CliError::new(format!("failed to initialize logging: {err}")))
}
