//! # Ruleflow CLI
//!
//! Offline tooling around the engine: validate a rule document, run a turn,
//! inspect or update a session, drive the action lifecycle, or serve HTTP.
//!
//! ## Usage
//!
//! ```bash
//! # Check a rule document before deploying it
//! ruleflow validate rules.json
//!
//! # Run one turn for a session (use the file store to keep state between runs)
//! RULEFLOW_STORE__BACKEND=file ruleflow infer c-1 --trigger +61300000000
//!
//! # Read or update session state
//! ruleflow state c-1
//! ruleflow set-state c-1 Customer.Tier=gold Counter=increment
//!
//! # Start the HTTP API
//! ruleflow serve --port 8080
//! ```

use anyhow::{bail, Context};
use clap::{Parser, Subcommand};
use std::collections::BTreeMap;
use std::path::PathBuf;
use std::process::ExitCode;
use std::sync::Arc;

use ruleflow::protocol::rest;
use ruleflow::rules::{validate_rule_sets, JsonFileRuleSource};
use ruleflow::telemetry::init_tracing;
use ruleflow::{Config, Handler, TurnInput};

#[derive(Parser)]
#[command(name = "ruleflow")]
#[command(version)]
#[command(about = "Weighted rules engine for multi-turn sessions")]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Configuration file (default: ruleflow.toml, ruleflow.local.toml)
    #[arg(long, short, global = true)]
    config: Option<PathBuf>,
}

#[derive(Subcommand)]
enum Commands {
    /// Parse and validate a rule document
    Validate {
        /// Rule document (defaults to engine.rules_path)
        rules: Option<PathBuf>,
    },

    /// Run one inference turn
    Infer {
        session_id: String,

        /// Dialled address
        #[arg(long)]
        trigger: Option<String>,

        /// Caller's address
        #[arg(long)]
        caller: Option<String>,

        /// Raw platform parameter, `name=value` (repeatable)
        #[arg(long = "param", short = 'p', value_parser = parse_pair)]
        params: Vec<(String, String)>,
    },

    /// Print a session's state
    State { session_id: String },

    /// Apply `key=value` updates to a session (`value` may be `increment`,
    /// empty deletes the key)
    SetState {
        session_id: String,

        #[arg(value_parser = parse_pair)]
        updates: Vec<(String, String)>,
    },

    /// Route a keypad menu selection (`0`-`9`, `*`, `#`, `+`)
    DtmfMenu { session_id: String, option: String },

    /// Validate keypad input against the current rule (omit for no entry)
    DtmfInput {
        session_id: String,
        input: Option<String>,
    },

    /// Start the action named by the session's current rule
    StartAction { session_id: String },

    /// Mark the session's action TIMEOUT if its deadline has passed
    CheckTimeout { session_id: String },

    /// Serve the HTTP API
    Serve {
        #[arg(long)]
        host: Option<String>,

        #[arg(long)]
        port: Option<u16>,
    },
}

fn parse_pair(text: &str) -> Result<(String, String), String> {
    text.split_once('=')
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .ok_or_else(|| format!("expected name=value, got '{text}'"))
}

/// Number the updates as `keyN`/`valueN` parameters, starting at 1
fn numbered_parameters(updates: Vec<(String, String)>) -> BTreeMap<String, String> {
    let mut parameters = BTreeMap::new();
    for (index, (key, value)) in updates.into_iter().enumerate() {
        parameters.insert(format!("key{}", index + 1), key);
        parameters.insert(format!("value{}", index + 1), value);
    }
    parameters
}

fn print_json<T: serde::Serialize>(value: &T) -> anyhow::Result<()> {
    println!("{}", serde_json::to_string_pretty(value)?);
    Ok(())
}

#[tokio::main]
async fn main() -> ExitCode {
    let cli = Cli::parse();

    match run(cli).await {
        Ok(()) => ExitCode::SUCCESS,
        Err(e) => {
            eprintln!("ERROR: {e:#}");
            ExitCode::FAILURE
        }
    }
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    let mut config = match &cli.config {
        Some(path) => Config::from_file(&path.to_string_lossy())
            .with_context(|| format!("loading {}", path.display()))?,
        None => Config::load().context("loading configuration")?,
    };
    init_tracing(&config.logging);

    if let Commands::Validate { rules } = &cli.command {
        let path = rules.clone().unwrap_or_else(|| config.engine.rules_path.clone());
        let text = std::fs::read_to_string(&path)
            .with_context(|| format!("reading {}", path.display()))?;
        let rule_sets = JsonFileRuleSource::parse(&text)?;
        validate_rule_sets(&rule_sets)?;
        let rules: usize = rule_sets.iter().map(|rs| rs.rules.len()).sum();
        println!(
            "{}: {} rule sets, {rules} rules OK",
            path.display(),
            rule_sets.len()
        );
        return Ok(());
    }

    if let Commands::Serve { host, port } = &cli.command {
        if let Some(host) = host {
            config.http.host.clone_from(host);
        }
        if let Some(port) = port {
            config.http.port = *port;
        }
        let handler = Arc::new(Handler::from_config(&config)?);
        println!("Listening on {}:{}", config.http.host, config.http.port);
        if let Err(e) = rest::start_http_server(handler, &config.http).await {
            bail!("http server failed: {e}");
        }
        return Ok(());
    }

    let handler = Handler::from_config(&config)?;
    let result = match cli.command {
        Commands::Infer {
            session_id,
            trigger,
            caller,
            params,
        } => {
            let input = TurnInput {
                session_id,
                trigger,
                caller,
                parameters: params.into_iter().collect(),
            };
            let outcome = handler.infer(&input).await?;
            print_json(&outcome)
        }
        Commands::State { session_id } => print_json(&handler.load_state(&session_id).await?),
        Commands::SetState {
            session_id,
            updates,
        } => {
            let parameters = numbered_parameters(updates);
            print_json(&handler.set_state(&session_id, &parameters).await?)
        }
        Commands::DtmfMenu { session_id, option } => {
            print_json(&handler.dtmf_menu(&session_id, &option).await?)
        }
        Commands::DtmfInput { session_id, input } => {
            print_json(&handler.dtmf_input(&session_id, input.as_deref()).await?)
        }
        Commands::StartAction { session_id } => {
            let status = handler.start_action(&session_id).await;
            println!("{status}");
            Ok(())
        }
        Commands::CheckTimeout { session_id } => {
            print_json(&handler.check_timeout(&session_id).await?)
        }
        Commands::Validate { .. } | Commands::Serve { .. } => Ok(()),
    };

    // Let dispatched actions record their outcome before exiting
    handler.shutdown().await;
    result
}
