//! Process launching capability and its policy-checking decorator.

use std::path::PathBuf;
use std::process::{Command, Output};
use std::sync::Arc;

use gate_policy::PolicyEvaluator;
use gate_primitives::{ActionDescriptor, ActionType};
use serde_json::Value;

use crate::error::InterceptResult;
use crate::guard::enforce;

/// Program invocation to launch.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct CommandSpec {
    program: String,
    args: Vec<String>,
    current_dir: Option<PathBuf>,
    envs: Vec<(String, String)>,
}

impl CommandSpec {
    /// Creates an invocation of `program` without arguments.
    #[must_use]
    pub fn new(program: impl Into<String>) -> Self {
        Self {
            program: program.into(),
            ..Self::default()
        }
    }

    /// Splits a shell-like command line on whitespace.
    #[must_use]
    pub fn from_command_line(line: &str) -> Self {
        let mut parts = line.split_whitespace();
        let program = parts.next().unwrap_or_default();
        Self::new(program).with_args(parts)
    }

    /// Appends one argument.
    #[must_use]
    pub fn with_arg(mut self, arg: impl Into<String>) -> Self {
        self.args.push(arg.into());
        self
    }

    /// Appends several arguments.
    #[must_use]
    pub fn with_args<I, S>(mut self, args: I) -> Self
    where
        I: IntoIterator<Item = S>,
        S: Into<String>,
    {
        self.args.extend(args.into_iter().map(Into::into));
        self
    }

    /// Runs the program from `dir`.
    #[must_use]
    pub fn with_current_dir(mut self, dir: impl Into<PathBuf>) -> Self {
        self.current_dir = Some(dir.into());
        self
    }

    /// Sets an environment variable for the child.
    #[must_use]
    pub fn with_env(mut self, key: impl Into<String>, value: impl Into<String>) -> Self {
        self.envs.push((key.into(), value.into()));
        self
    }

    /// Returns the program name.
    #[must_use]
    pub fn program(&self) -> &str {
        &self.program
    }

    /// Returns the arguments, excluding the program.
    #[must_use]
    pub fn args(&self) -> &[String] {
        &self.args
    }

    /// Returns the full command line joined with spaces.
    #[must_use]
    pub fn full_command(&self) -> String {
        std::iter::once(self.program.as_str())
            .chain(self.args.iter().map(String::as_str))
            .collect::<Vec<_>>()
            .join(" ")
    }

    /// Describes the invocation as a `command_exec` action.
    #[must_use]
    pub fn action(&self) -> ActionDescriptor {
        let argv: Vec<Value> = std::iter::once(&self.program)
            .chain(&self.args)
            .map(|arg| Value::from(arg.as_str()))
            .collect();
        ActionDescriptor::new(ActionType::CommandExec, self.program.as_str())
            .with_argument("args", argv)
            .with_argument("full_command", self.full_command())
    }

    fn to_command(&self) -> Command {
        let mut command = Command::new(&self.program);
        command.args(&self.args);
        if let Some(dir) = &self.current_dir {
            command.current_dir(dir);
        }
        command.envs(self.envs.iter().map(|(k, v)| (k, v)));
        command
    }
}

/// Capability to run a program to completion.
pub trait ProcessLauncher: Send + Sync {
    /// Runs `command` and collects its output.
    ///
    /// # Errors
    ///
    /// Returns [`crate::InterceptError::Io`] when the program cannot be
    /// started, or [`crate::InterceptError::Blocked`] from guarded launchers.
    fn launch(&self, command: &CommandSpec) -> InterceptResult<Output>;
}

/// Launcher backed by [`std::process::Command`].
#[derive(Debug, Clone, Copy, Default)]
pub struct SystemLauncher;

impl ProcessLauncher for SystemLauncher {
    fn launch(&self, command: &CommandSpec) -> InterceptResult<Output> {
        Ok(command.to_command().output()?)
    }
}

/// Launcher that asks the policy evaluator before delegating.
///
/// Invocations with an empty program are passed through unevaluated.
pub struct GuardedLauncher<L> {
    inner: L,
    evaluator: Arc<dyn PolicyEvaluator>,
}

impl<L> std::fmt::Debug for GuardedLauncher<L> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("GuardedLauncher").finish_non_exhaustive()
    }
}

impl<L> GuardedLauncher<L>
where
    L: ProcessLauncher,
{
    /// Wraps `inner` with policy enforcement.
    #[must_use]
    pub fn new(inner: L, evaluator: Arc<dyn PolicyEvaluator>) -> Self {
        Self { inner, evaluator }
    }

    /// Returns the wrapped launcher.
    #[must_use]
    pub fn inner(&self) -> &L {
        &self.inner
    }
}

impl<L> ProcessLauncher for GuardedLauncher<L>
where
    L: ProcessLauncher,
{
    fn launch(&self, command: &CommandSpec) -> InterceptResult<Output> {
        if !command.program().is_empty() {
            let action = command.action();
            enforce(&action, self.evaluator.decide(&action))?;
        }
        self.inner.launch(command)
    }
}
