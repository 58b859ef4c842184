//! toolhost-mcp: a plugin-extensible MCP tool server
//!
//! Serves the built-in tool groups over stdio.

use std::path::PathBuf;
use std::process::ExitCode;

use clap::Parser;
use tracing::{error, info, Level};
use tracing_subscriber::EnvFilter;

use toolhost_mcp::config;
use toolhost_mcp::groups::builtin_registry;
use toolhost_mcp::mcp::{ErrorMapper, McpServer, ServerContext, ServerInfo, StreamingEngine};

/// Plugin-extensible MCP tool server.
///
/// Reads JSON-RPC messages from stdin and writes responses to stdout. Logs go
/// to stderr.
#[derive(Parser, Debug)]
#[command(name = "toolhost-mcp")]
#[command(author, version, about, long_about = None)]
struct Args {
    /// Path to configuration file
    #[arg(value_name = "CONFIG_FILE")]
    config: Option<PathBuf>,

    /// Increase logging verbosity (-v for info, -vv for debug, -vvv for trace)
    #[arg(short, long, action = clap::ArgAction::Count)]
    verbose: u8,

    /// Decrease logging verbosity (only show errors)
    #[arg(short, long)]
    quiet: bool,
}

/// Determines the log level from CLI arguments.
#[allow(clippy::match_same_arms)] // Explicit "warn" arm for clarity
fn get_log_level(verbose: u8, quiet: bool, config_level: &str) -> Level {
    if quiet {
        return Level::ERROR;
    }

    match verbose {
        0 => match config_level.to_lowercase().as_str() {
            "trace" => Level::TRACE,
            "debug" => Level::DEBUG,
            "info" => Level::INFO,
            "warn" => Level::WARN,
            "error" => Level::ERROR,
            _ => Level::WARN,
        },
        1 => Level::INFO,
        2 => Level::DEBUG,
        _ => Level::TRACE,
    }
}

/// Initialises the tracing subscriber for logging.
fn init_tracing(level: Level) {
    let filter = EnvFilter::from_default_env().add_directive(level.into());

    tracing_subscriber::fmt()
        .with_env_filter(filter)
        .with_target(false)
        .with_writer(std::io::stderr)
        .init();
}

/// Interactive notice printed to stderr on startup.
fn license_notice() -> String {
    let mut notice = format!(
        "{} {}  Copyright (C) 2026  {}\n\
         This program comes with ABSOLUTELY NO WARRANTY.\n\
         This is free software, licensed under {}.\n",
        env!("CARGO_PKG_NAME"),
        env!("CARGO_PKG_VERSION"),
        env!("CARGO_PKG_AUTHORS"),
        env!("CARGO_PKG_LICENSE"),
    );
    let repository = env!("CARGO_PKG_REPOSITORY");
    if !repository.is_empty() {
        notice.push_str("Source: ");
        notice.push_str(repository);
        notice.push('\n');
    }
    notice
}

/// Entry point for the toolhost-mcp server.
fn main() -> ExitCode {
    let args = Args::parse();

    let config_path = args.config.as_deref();
    let cfg = match config::load_config(config_path) {
        Ok(cfg) => cfg,
        Err(e) => {
            eprintln!("Configuration error: {e}");
            return ExitCode::FAILURE;
        }
    };

    init_tracing(get_log_level(args.verbose, args.quiet, &cfg.logging.level));

    // Display GPL license notice (required by GPLv3 Section 5d)
    eprintln!("{}", license_notice());

    info!(
        version = env!("CARGO_PKG_VERSION"),
        production = cfg.server.production,
        "Starting toolhost-mcp server"
    );

    let registry = match builtin_registry(cfg.tool_groups.clone()) {
        Ok(registry) => registry,
        Err(e) => {
            error!(error = %e, "Failed to register tool groups");
            eprintln!("Tool group error: {e}");
            return ExitCode::FAILURE;
        }
    };

    info!(groups = ?registry.group_names(), "Tool groups registered");

    let context = ServerContext::new(
        ServerInfo::named(cfg.server.name.clone()),
        cfg.capability_registry(),
        registry,
        StreamingEngine::new(cfg.streaming.to_engine_config()),
        ErrorMapper::new(cfg.server.production),
    );
    let server = McpServer::from_context(context);

    let runtime = match tokio::runtime::Builder::new_multi_thread().enable_all().build() {
        Ok(runtime) => runtime,
        Err(e) => {
            eprintln!("Failed to create Tokio runtime: {e}");
            return ExitCode::FAILURE;
        }
    };

    info!("MCP server ready, waiting for client messages");

    match runtime.block_on(server.run()) {
        Ok(()) => {
            info!("Server shut down gracefully");
            ExitCode::SUCCESS
        }
        Err(e) => {
            error!(error = %e, "Server error");
            ExitCode::FAILURE
        }
    }
}
