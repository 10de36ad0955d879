//! Logging setup.

use crate::domain::LogFormat;
use crate::error::AppError;

/// Overrides `--log-level` with a full filter directive when set.
pub const LOG_FILTER_VAR: &str = "EVDS_LOG";

/// Install the global subscriber. Logs go to stderr so stdout only carries
/// the run summary.
pub fn init_tracing(log_level: &str, format: LogFormat) -> Result<(), AppError> {
    let directive = std::env::var(LOG_FILTER_VAR).unwrap_or_else(|_| log_level.to_string());
    let filter = tracing_subscriber::EnvFilter::try_new(&directive)
        .map_err(|err| AppError::config(format!("invalid log filter `{directive}`: {err}")))?;

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);

    let installed = match format {
        LogFormat::Json => builder.json().try_init(),
        LogFormat::Text => builder.try_init(),
    };
    installed.map_err(|err| AppError::setup(format!("failed to install logger: {err}")))
}
