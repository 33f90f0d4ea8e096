//! `ruleflow` Server Binary
//!
//! Starts the HTTP API.
//!
//! ## Usage
//!
//! ```bash
//! # Start server with default settings
//! cargo run --bin ruleflow-server
//!
//! # Start with custom bind address
//! cargo run --bin ruleflow-server -- --host 0.0.0.0 --port 9000
//! ```

use ruleflow::protocol::rest;
use ruleflow::protocol::Handler;
use ruleflow::telemetry::init_tracing;
use ruleflow::Config;

use std::env;
use std::sync::Arc;

#[tokio::main]
async fn main() -> Result<(), Box<dyn std::error::Error + Send + Sync>> {
    // Parse command line arguments
    let args: Vec<String> = env::args().collect();

    println!("Ruleflow Server");
    println!("===============");
    println!();

    // Load configuration
    let mut config = match get_arg(&args, "--config") {
        Some(path) => Config::from_file(&path)?,
        None => Config::load().unwrap_or_else(|e| {
            println!("Using default configuration ({e})");
            Config::default()
        }),
    };

    init_tracing(&config.logging);

    // Override HTTP config from command line
    if let Some(host) = get_arg(&args, "--host") {
        config.http.host = host;
    }
    if let Some(port) = get_arg(&args, "--port").and_then(|p| p.parse().ok()) {
        config.http.port = port;
    }

    let handler = Arc::new(Handler::from_config(&config).map_err(|e| {
        eprintln!("ERROR: Failed to initialize ruleflow: {e}");
        Box::<dyn std::error::Error + Send + Sync>::from(e)
    })?);

    println!("Rules:   {}", config.engine.rules_path.display());
    println!("Store:   {:?}", config.store.backend);
    println!("Address: {}:{}", config.http.host, config.http.port);
    println!();

    rest::start_http_server(handler, &config.http).await?;

    Ok(())
}

fn get_arg(args: &[String], flag: &str) -> Option<String> {
    args.iter()
        .position(|a| a == flag)
        .and_then(|i| args.get(i + 1).cloned())
}
