use std::time::Duration;

use anyhow::{Context, Result, anyhow};
use clap::{Args, Parser, Subcommand};
use gate_config::{FailMode, GateConfig, parse_duration};
use gate_interceptors::destination_for;
use gate_primitives::{ActionDescriptor, ActionType};
use serde_json::Value;

/// Ask a policy decision server whether an action may proceed.
#[derive(Debug, Parser)]
#[command(name = "policy-gate", version, about)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Command,

    /// Decision server address; defaults to POLICY_GATE_SERVER_ADDR.
    #[arg(long, global = true)]
    pub server: Option<String>,

    /// Behaviour when the server is unreachable: open or closed.
    #[arg(long, global = true)]
    pub fail_mode: Option<FailMode>,

    /// Request timeout, e.g. `5s` or `500ms`.
    #[arg(long, global = true, value_parser = parse_timeout)]
    pub timeout: Option<Duration>,

    /// Log filter directive; defaults to RUST_LOG, then `warn`.
    #[arg(long, global = true)]
    pub log: Option<String>,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Evaluate an action and print the decision as JSON.
    Evaluate(ActionArgs),
    /// Print `true` when the action is permitted, `false` when denied.
    Check(ActionArgs),
}

#[derive(Debug, Args)]
pub struct ActionArgs {
    /// Action type, e.g. command_exec, file_access, http_request.
    #[arg(long = "type", value_name = "TYPE")]
    pub action_type: ActionType,

    /// Action name, e.g. the program or HTTP method.
    #[arg(long)]
    pub name: String,

    /// Argument as key=value; the value is parsed as JSON when possible.
    #[arg(long = "arg", value_name = "KEY=VALUE", value_parser = parse_argument)]
    pub arguments: Vec<(String, Value)>,

    /// Destination URL of the action.
    #[arg(long)]
    pub url: Option<String>,
}

impl ActionArgs {
    pub fn descriptor(&self) -> ActionDescriptor {
        let mut action = ActionDescriptor::new(self.action_type.clone(), self.name.as_str())
            .with_arguments(self.arguments.iter().cloned());
        if let Some(url) = &self.url {
            action = action.with_destination(destination_for(url));
        }
        action
    }
}

impl Cli {
    /// Environment configuration with command-line overrides applied.
    pub fn config(&self) -> Result<GateConfig> {
        let mut config = GateConfig::from_env();
        if let Some(server) = &self.server {
            config = config
                .with_server_addr(server)
                .with_context(|| format!("invalid --server `{server}`"))?;
        }
        if let Some(fail_mode) = self.fail_mode {
            config = config.with_fail_mode(fail_mode);
        }
        if let Some(timeout) = self.timeout {
            config = config.with_timeout(timeout).context("invalid --timeout")?;
        }
        Ok(config)
    }
}

fn parse_argument(raw: &str) -> Result<(String, Value)> {
    let (key, value) = raw
        .split_once('=')
        .ok_or_else(|| anyhow!("expected KEY=VALUE, got `{raw}`"))?;
    let key = key.trim();
    if key.is_empty() {
        return Err(anyhow!("argument key cannot be empty"));
    }
    let value = serde_json::from_str(value).unwrap_or_else(|_| Value::from(value));
    Ok((key.to_owned(), value))
}

fn parse_timeout(raw: &str) -> Result<Duration> {
    parse_duration(raw).ok_or_else(|| anyhow!("invalid duration `{raw}`"))
}
