//! Explicit interception capabilities for agent side effects.
//!
//! Each capability (`ProcessLauncher`, `FileOpener`, `HttpFetcher`) has a
//! plain implementation and a `Guarded*` decorator implementing the same
//! trait. Decorators describe the side effect as an action, ask a
//! [`gate_policy::PolicyEvaluator`], and refuse to delegate when the decision
//! is a deny. Compose them at startup around a shared client.

#![warn(missing_docs, clippy::pedantic)]

mod error;
mod fetch;
mod file;
mod guard;
mod process;

pub use error::{InterceptError, InterceptResult};
pub use fetch::{FetchRequest, FetchResponse, GuardedFetcher, HttpFetcher, destination_for};
pub use file::{
    DEFAULT_SKIP_PREFIXES, FileOpener, GuardedFileOpener, OpenMode, SystemFileOpener, open_action,
};
pub use process::{CommandSpec, GuardedLauncher, ProcessLauncher, SystemLauncher};
