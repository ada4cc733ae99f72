// Tracing initialization for embedding binaries.
//
// The filter honors `RUST_LOG` when set and falls back to the configured
// directives; output is json or pretty per `LoggingConfig`, to stdout or to
// a log file.

use std::sync::Arc;
use tracing_subscriber::fmt::writer::BoxMakeWriter;
use tracing_subscriber::{fmt, layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use crate::config::LoggingConfig;
use crate::error::{Error, Result};

/// Install the global tracing subscriber. Fails on an invalid filter or
/// when a subscriber is already installed.
pub fn init_logging(config: &LoggingConfig) -> Result<()> {
    let filter = build_filter(&config.level)?;

    let writer = match &config.file_path {
        Some(path) => {
            let file = std::fs::OpenOptions::new()
                .create(true)
                .append(true)
                .open(path)?;
            BoxMakeWriter::new(Arc::new(file))
        }
        None => BoxMakeWriter::new(std::io::stdout),
    };

    let base = fmt::layer().with_writer(writer).with_target(true);
    let registry = tracing_subscriber::registry().with(filter);
    let installed = if config.format == "json" {
        registry.with(base.json().with_current_span(true)).try_init()
    } else {
        registry.with(base.pretty()).try_init()
    };
    installed.map_err(|e| Error::InvalidConfig(format!("cannot install subscriber: {e}")))
}

/// `RUST_LOG` wins over the configured directives.
fn build_filter(level: &str) -> Result<EnvFilter> {
    match EnvFilter::try_from_default_env() {
        Ok(filter) => Ok(filter),
        Err(_) => parse_filter(level),
    }
}

fn parse_filter(level: &str) -> Result<EnvFilter> {
    EnvFilter::try_new(level)
        .map_err(|e| Error::InvalidConfig(format!("invalid log filter {level:?}: {e}")))
}
