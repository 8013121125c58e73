//! Databricks MCP Server
//!
//! This server provides Model Context Protocol access to a Databricks workspace:
//! clusters, jobs and SQL statement execution over the workspace REST API.

use std::env;
use tracing::{debug, error, info};
use tracing_subscriber::EnvFilter;

mod resources;
mod server;
mod tools;

use databricks_mcp_shared::{DatabricksConfig, LoggingConfig, WorkspaceConfig};
use server::DatabricksMcpServer;

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    // A missing .env file is fine
    let _ = dotenvy::dotenv();

    let args: Vec<String> = env::args().collect();

    if args.iter().any(|a| a == "--init") {
        return init_config(&args);
    }

    let config_path = args.get(1).map(|s| s.as_str());

    let config = match DatabricksConfig::load_or_default(config_path) {
        Ok(config) => config,
        Err(e) => {
            eprintln!("Error loading configuration: {}", e);
            eprintln!("Run `{} --init` to create a default configuration.", args[0]);
            std::process::exit(1);
        }
    };

    init_logging(&config.logging)?;

    info!("Starting Databricks MCP Server");
    debug!(workspace = ?config.workspace, http = ?config.http, "Configuration loaded");

    if let Err(e) = config.validate() {
        error!("Invalid configuration: {}", e);
        eprintln!("Error: {}", e);
        eprintln!(
            "Set DATABRICKS_HOST and DATABRICKS_TOKEN (or DATABRICKS_CLIENT_ID and DATABRICKS_CLIENT_SECRET)."
        );
        std::process::exit(1);
    }
    info!("Configuration loaded successfully");

    let server = DatabricksMcpServer::new(config)?;

    info!("Databricks MCP Server initialized, starting main loop");

    match server.run().await {
        Ok(_) => {
            info!("Databricks MCP Server shut down gracefully");
            Ok(())
        }
        Err(e) => {
            error!("Databricks MCP Server error: {}", e);
            Err(e.into())
        }
    }
}

/// Logs go to stderr; stdout carries the MCP stdio transport.
fn init_logging(config: &LoggingConfig) -> anyhow::Result<()> {
    let filter = EnvFilter::try_from_default_env()
        .or_else(|_| EnvFilter::try_new(&config.level))
        .unwrap_or_else(|_| EnvFilter::new("info"));

    let builder = tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_writer(std::io::stderr)
        .with_target(false);

    let installed = if config.format.eq_ignore_ascii_case("json") {
        builder.json().try_init()
    } else {
        builder
            .with_file(true)
            .with_line_number(true)
            .try_init()
    };

    installed.map_err(|e| anyhow::anyhow!("Failed to set global logging subscriber: {}", e))
}

fn init_config(args: &[String]) -> anyhow::Result<()> {
    // The path, if any, follows the --init flag
    let config_path = args
        .iter()
        .skip_while(|a| *a != "--init")
        .nth(1)
        .map(String::as_str)
        .unwrap_or("config.json");

    if std::path::Path::new(config_path).exists() {
        eprintln!("Configuration file '{}' already exists.", config_path);
        eprintln!("Remove it first if you want to create a new one.");
        std::process::exit(1);
    }

    let config = DatabricksConfig {
        workspace: WorkspaceConfig {
            host: "https://your-workspace.cloud.databricks.com".to_string(),
            ..WorkspaceConfig::default()
        },
        ..DatabricksConfig::default()
    };

    match config.save(config_path) {
        Ok(_) => {
            println!("Configuration file '{}' created successfully!", config_path);
            println!();
            println!("Next steps:");
            println!("  • Set workspace.host to your workspace URL");
            println!("  • Set DATABRICKS_TOKEN, or DATABRICKS_CLIENT_ID and DATABRICKS_CLIENT_SECRET");
            println!();
            println!("To start the MCP server:");
            println!("  {} {}", args[0], config_path);
            Ok(())
        }
        Err(e) => {
            eprintln!("Failed to create configuration file: {}", e);
            std::process::exit(1);
        }
    }
}
