//! Logging setup for hosts embedding the audio core
//!
//! The crate emits `tracing` events under the `rvoip_audio_hal` target.
//! Per-buffer stream and echo reference I/O logs at `trace`, so those
//! modules get their own level and stay quiet unless asked for.

use std::str::FromStr;

use tracing::Level;
use tracing_subscriber::{EnvFilter, fmt};

use crate::error::{HalError, HalResult};

/// Target prefix of every event the crate emits
pub const CRATE_TARGET: &str = "rvoip_audio_hal";

/// Modules on the audio I/O path
const IO_TARGETS: [&str; 2] = ["stream", "echo"];

/// Level applied to everything outside the crate
const FOREIGN_LEVEL: &str = "warn";

/// Configuration for the logging system
#[derive(Debug, Clone)]
pub struct LoggingConfig {
    /// Level for routing, call and device events
    pub level: Level,
    /// Level for the stream and echo reference modules
    pub io_level: Level,
    /// Whether to include file and line information
    pub file_info: bool,
    /// Route output through the libtest capture
    pub test_writer: bool,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        LoggingConfig {
            level: Level::INFO,
            io_level: Level::INFO,
            file_info: false,
            test_writer: false,
        }
    }
}

impl LoggingConfig {
    pub fn new(level: Level) -> Self {
        LoggingConfig {
            level,
            ..Default::default()
        }
    }

    /// Debug output captured per test, without per-buffer traces
    pub fn for_tests() -> Self {
        LoggingConfig {
            level: Level::DEBUG,
            io_level: Level::DEBUG,
            file_info: true,
            test_writer: true,
        }
    }

    /// Trace every buffer through the stream and echo modules
    pub fn with_io_tracing(mut self) -> Self {
        self.io_level = Level::TRACE;
        self
    }

    pub fn with_file_info(mut self) -> Self {
        self.file_info = true;
        self
    }

    /// Filter directives for this configuration, most general first
    pub fn directives(&self) -> Vec<String> {
        let mut directives = vec![
            FOREIGN_LEVEL.to_string(),
            format!("{}={}", CRATE_TARGET, level_name(self.level)),
        ];
        directives.extend(
            IO_TARGETS
                .iter()
                .map(|module| format!("{}::{}={}", CRATE_TARGET, module, level_name(self.io_level))),
        );
        directives
    }
}

fn level_name(level: Level) -> String {
    level.as_str().to_ascii_lowercase()
}

/// Build the event filter; `RUST_LOG` replaces the configured directives when set
pub fn build_filter(config: &LoggingConfig) -> HalResult<EnvFilter> {
    if let Ok(spec) = std::env::var(EnvFilter::DEFAULT_ENV) {
        if !spec.trim().is_empty() {
            return EnvFilter::try_new(&spec)
                .map_err(|e| HalError::config(format!("invalid {} '{}': {}", EnvFilter::DEFAULT_ENV, spec, e)));
        }
    }
    EnvFilter::try_new(config.directives().join(","))
        .map_err(|e| HalError::config(format!("invalid log directives: {}", e)))
}

/// Install a global subscriber; fails if one is already installed
pub fn setup_logging(config: LoggingConfig) -> HalResult<()> {
    let filter = build_filter(&config)?;
    let builder = fmt::Subscriber::builder()
        .with_env_filter(filter)
        .with_file(config.file_info)
        .with_line_number(config.file_info);

    let installed = if config.test_writer {
        builder.with_test_writer().try_init()
    } else {
        builder.try_init()
    };
    installed.map_err(|e| HalError::config(format!("logging already initialized: {}", e)))?;

    tracing::debug!(
        version = env!("CARGO_PKG_VERSION"),
        level = %config.level,
        io_level = %config.io_level,
        "Audio HAL logging initialized"
    );
    Ok(())
}

/// Parse a log level from a string
pub fn parse_log_level(level: &str) -> HalResult<Level> {
    Level::from_str(level).map_err(|_| HalError::config(format!("Invalid log level: {}", level)))
}
