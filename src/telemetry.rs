use clap::ValueEnum;
use tracing_subscriber::{EnvFilter, Registry, prelude::*};

use crate::{Error, Result};

/// Output format of the log layer
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, ValueEnum)]
pub enum LogFormat {
    #[default]
    Compact,
    Json,
}

/// Initialize tracing
pub fn init(format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new("info"))
        .map_err(|e| Error::OtherError(format!("invalid log filter: {e}")))?;

    // Decide on layers
    let reg = Registry::default().with(env_filter);
    let res = match format {
        LogFormat::Compact => reg.with(tracing_subscriber::fmt::layer().compact()).try_init(),
        LogFormat::Json => reg.with(tracing_subscriber::fmt::layer().json()).try_init(),
    };
    res.map_err(|e| Error::OtherError(format!("failed to install log subscriber: {e}")))
}
