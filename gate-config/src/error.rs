use thiserror::Error;

/// Errors raised when validating configuration values.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    /// Server address is not an absolute http(s) URL.
    #[error("invalid server address `{addr}`: {reason}")]
    InvalidServerAddr {
        /// The rejected address.
        addr: String,
        /// Why it was rejected.
        reason: &'static str,
    },
    /// Fail mode is neither `open` nor `closed`.
    #[error("invalid fail mode `{0}`, expected `open` or `closed`")]
    InvalidFailMode(String),
    /// A numeric or duration setting is out of range.
    #[error("invalid value for {field}: {reason}")]
    InvalidValue {
        /// Name of the offending setting.
        field: &'static str,
        /// Why it was rejected.
        reason: &'static str,
    },
}

/// Result alias for configuration operations.
pub type ConfigResult<T> = Result<T, ConfigError>;
