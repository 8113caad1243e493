//! Configuration management for policy-gate clients.
//!
//! Every setting has a built-in default, may be supplied through a
//! `POLICY_GATE_*` environment variable, and can be overridden per client
//! instance through the `with_*` builders on [`GateConfig`].

#![warn(missing_docs, clippy::pedantic)]

mod duration;
mod error;
mod schema;

pub use duration::parse_duration;
pub use error::{ConfigError, ConfigResult};
pub use schema::{FailMode, GateConfig, env_keys};
