//! Observability setup.
//!
//! Library crates only emit `tracing` events; binaries and embedders call
//! [`init_tracing`] once at startup to route them to stderr.

#![warn(missing_docs, clippy::pedantic)]

use thiserror::Error;
use tracing::debug;
use tracing_subscriber::EnvFilter;

/// Directive used when neither the config nor `RUST_LOG` sets one.
pub const DEFAULT_DIRECTIVE: &str = "info";

/// Result alias for telemetry setup.
pub type TelemetryResult<T> = Result<T, TelemetryError>;

/// Errors surfaced while installing the subscriber.
#[derive(Debug, Error)]
pub enum TelemetryError {
    /// The filter directive could not be parsed.
    #[error("invalid log filter `{directive}`: {reason}")]
    InvalidFilter {
        /// Directive as supplied.
        directive: String,
        /// Parser message.
        reason: String,
    },
    /// A global subscriber was already installed.
    #[error("tracing subscriber already initialised")]
    AlreadyInitialised,
}

/// Subscriber settings.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TelemetryConfig {
    filter: Option<String>,
    with_target: bool,
    ansi: bool,
}

impl Default for TelemetryConfig {
    fn default() -> Self {
        Self {
            filter: None,
            with_target: false,
            ansi: true,
        }
    }
}

impl TelemetryConfig {
    /// Creates the default configuration.
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Uses `directive` instead of `RUST_LOG`.
    #[must_use]
    pub fn with_filter(mut self, directive: impl Into<String>) -> Self {
        self.filter = Some(directive.into());
        self
    }

    /// Includes event targets in output.
    #[must_use]
    pub const fn with_target(mut self, with_target: bool) -> Self {
        self.with_target = with_target;
        self
    }

    /// Enables or disables ANSI colours.
    #[must_use]
    pub const fn with_ansi(mut self, ansi: bool) -> Self {
        self.ansi = ansi;
        self
    }

    /// Returns the explicit filter directive, if any.
    #[must_use]
    pub fn filter(&self) -> Option<&str> {
        self.filter.as_deref()
    }

    /// Builds the effective filter: explicit directive, then `RUST_LOG`,
    /// then [`DEFAULT_DIRECTIVE`].
    ///
    /// # Errors
    ///
    /// Returns [`TelemetryError::InvalidFilter`] when the explicit directive
    /// does not parse.
    pub fn env_filter(&self) -> TelemetryResult<EnvFilter> {
        match self.filter.as_deref() {
            Some(directive) => {
                EnvFilter::try_new(directive).map_err(|err| TelemetryError::InvalidFilter {
                    directive: directive.to_owned(),
                    reason: err.to_string(),
                })
            }
            None => Ok(EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| EnvFilter::new(DEFAULT_DIRECTIVE))),
        }
    }
}

/// Installs a global fmt subscriber writing to stderr.
///
/// # Errors
///
/// Returns [`TelemetryError::InvalidFilter`] for a bad directive and
/// [`TelemetryError::AlreadyInitialised`] when called more than once.
pub fn init_tracing(config: &TelemetryConfig) -> TelemetryResult<()> {
    let filter = config.env_filter()?;
    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(config.with_target)
        .with_ansi(config.ansi)
        .with_writer(std::io::stderr)
        .try_init()
        .map_err(|_| TelemetryError::AlreadyInitialised)?;
    debug!("tracing initialised");
    Ok(())
}
