//! ---
//! pldm_section: "01-core-functionality"
//! pldm_subsection: "module"
//! pldm_type: "source"
//! pldm_scope: "code"
//! pldm_description: "Shared primitives and utilities for the firmware-update runtime."
//! pldm_version: "v0.0.0-prealpha"
//! pldm_owner: "tbd"
//! ---
use anyhow::{Context, Result};
use once_cell::sync::OnceCell;
use serde::{Deserialize, Serialize};
use tracing::{info, Subscriber};
use tracing_appender::non_blocking::{NonBlocking, WorkerGuard};
use tracing_appender::rolling::{RollingFileAppender, Rotation};
use tracing_subscriber::filter::EnvFilter;
use tracing_subscriber::fmt;
use tracing_subscriber::layer::{Layer, SubscriberExt};
use tracing_subscriber::registry::LookupSpan;
use tracing_subscriber::util::SubscriberInitExt;

use crate::config::LoggingConfig;

const LOG_ENV: &str = "PLDM_FWUP_LOG";
const DEFAULT_DIRECTIVE: &str = "info";

/// Writer guards flushed when the process exits.
struct LogGuards {
    _console: WorkerGuard,
    _file: WorkerGuard,
}

static GUARDS: OnceCell<LogGuards> = OnceCell::new();

/// Console output format. The rolling file is always JSON.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Default)]
#[serde(rename_all = "kebab-case")]
pub enum LogFormat {
    #[default]
    StructuredJson,
    Pretty,
}

/// Install the global subscriber for `service_name`.
///
/// * `PLDM_FWUP_LOG` sets the filter (e.g. `debug,pldm_fw_update::condition=trace`).
///   When unset the standard `RUST_LOG` variable is honoured, finally defaulting to `info`.
/// * Console records use `config.format`; `{prefix}.log` rotates daily and keeps
///   `config.retained_files` files.
///
/// Calling it again keeps the first subscriber.
pub fn init_tracing(service_name: &str, config: &LoggingConfig) -> Result<()> {
    std::fs::create_dir_all(&config.directory).with_context(|| {
        format!("unable to create log directory {}", config.directory.display())
    })?;
    let prefix = config.file_prefix.as_deref().unwrap_or(service_name);
    let appender = RollingFileAppender::builder()
        .rotation(Rotation::DAILY)
        .filename_prefix(prefix)
        .filename_suffix("log")
        .max_log_files(config.retained_files)
        .build(&config.directory)
        .with_context(|| format!("unable to open log file in {}", config.directory.display()))?;

    let (file_writer, file_guard) = tracing_appender::non_blocking(appender);
    let (console_writer, console_guard) = tracing_appender::non_blocking(std::io::stdout());

    let installed = tracing_subscriber::registry()
        .with(log_filter(std::env::var(LOG_ENV).ok()))
        .with(console_layer(config.format, console_writer))
        .with(
            fmt::layer()
                .with_target(true)
                .with_timer(fmt::time::UtcTime::rfc_3339())
                .json()
                .with_writer(file_writer),
        )
        .try_init()
        .is_ok();

    if installed {
        let _ = GUARDS.set(LogGuards {
            _console: console_guard,
            _file: file_guard,
        });
        info!(service = %service_name, log_dir = %config.directory.display(), format = ?config.format, "tracing initialised");
    }
    Ok(())
}

fn log_filter(directive: Option<String>) -> EnvFilter {
    match directive {
        Some(directive) => EnvFilter::try_new(&directive).unwrap_or_else(|err| {
            eprintln!("invalid {LOG_ENV} directive {directive:?} ({err}); using {DEFAULT_DIRECTIVE}");
            EnvFilter::new(DEFAULT_DIRECTIVE)
        }),
        None => EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVE)),
    }
}

fn console_layer<S>(format: LogFormat, writer: NonBlocking) -> Box<dyn Layer<S> + Send + Sync>
where
    S: Subscriber + for<'span> LookupSpan<'span>,
{
    let layer = fmt::layer().with_timer(fmt::time::UtcTime::rfc_3339());
    match format {
        LogFormat::StructuredJson => layer.with_target(false).json().with_writer(writer).boxed(),
        LogFormat::Pretty => layer.with_target(true).with_writer(writer).boxed(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn malformed_directive_falls_back_to_default() {
        let filter = log_filter(Some("pldm_fw_update=[".to_owned()));
        assert_eq!(filter.to_string(), DEFAULT_DIRECTIVE);
    }

    #[test]
    fn explicit_directive_is_used() {
        let filter = log_filter(Some("debug".to_owned()));
        assert_eq!(filter.to_string(), "debug");
    }
}
