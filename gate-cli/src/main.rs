//! `policy-gate`: evaluate a single action against a policy decision server.
//!
//! Exit status is 0 when the action is permitted, 2 when it is denied, and 1
//! when no decision could be produced.

mod cli;

use std::process::ExitCode;

use anyhow::Result;
use clap::Parser;
use gate_policy::{EvaluateOptions, PolicyClient};
use gate_telemetry::{TelemetryConfig, init_tracing};
use tracing::debug;

use crate::cli::{Cli, Command};

const DENIED: u8 = 2;
const DEFAULT_LOG: &str = "warn";

fn main() -> Result<ExitCode> {
    let cli = Cli::parse();

    let directive = cli
        .log
        .clone()
        .or_else(|| std::env::var("RUST_LOG").ok())
        .unwrap_or_else(|| DEFAULT_LOG.to_owned());
    init_tracing(&TelemetryConfig::new().with_filter(directive))?;

    let client = PolicyClient::new(cli.config()?)?;
    debug!(?client, "policy client ready");

    let permitted = run(&cli.command, &client);
    // Deliver fail-mode audit events even when evaluation failed.
    client.shutdown();

    Ok(if permitted? {
        ExitCode::SUCCESS
    } else {
        ExitCode::from(DENIED)
    })
}

fn run(command: &Command, client: &PolicyClient) -> Result<bool> {
    match command {
        Command::Evaluate(args) => {
            let decision =
                client.evaluate_with(&args.descriptor(), &EvaluateOptions::non_raising())?;
            println!("{}", serde_json::to_string_pretty(&decision)?);
            Ok(!decision.is_deny())
        }
        Command::Check(args) => {
            let permitted = client.check(&args.descriptor());
            println!("{permitted}");
            Ok(permitted)
        }
    }
}
