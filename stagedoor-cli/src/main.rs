// SPDX-License-Identifier: Apache-2.0
// Copyright 2025 The Stagedoor Authors

//! Stagedoor CLI
//!
//! Runs a local http server simulating API Gateway, triggering your http
//! functions on demand.

use clap::{Parser, Subcommand};

mod commands;

/// Stagedoor - local API Gateway emulator for serverless http functions
#[derive(Parser)]
#[command(name = "stagedoor")]
#[command(author, version, about, long_about = None)]
pub struct Cli {
    /// Service manifest path
    #[arg(short, long, default_value = "serverless.yml")]
    pub config: String,

    /// Enable verbose logging
    #[arg(short, long)]
    pub verbose: bool,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Start the local gateway, one route per declared http event
    Start {
        /// Port to listen on
        #[arg(short = 'P', long, default_value_t = stagedoor_core::DEFAULT_PORT)]
        port: u16,

        /// Debugger port to publish. Only supported for a subset of runtimes
        #[arg(short = 'd', long)]
        debug_port: Option<u16>,
    },

    /// Print the derived route table without starting the server
    Routes,

    /// Validate a service manifest
    Validate {
        /// Path to the manifest; defaults to --config
        file: Option<String>,
    },
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // Initialize logging
    let log_level = if cli.verbose { "debug" } else { "info" };
    tracing_subscriber::fmt().with_env_filter(log_level).init();

    let result = match cli.command {
        Commands::Start { port, debug_port } => {
            commands::start::execute(&cli.config, port, debug_port).await
        }
        Commands::Routes => commands::routes::execute(&cli.config).await,
        Commands::Validate { file } => {
            commands::validate::execute(file.as_deref().unwrap_or(&cli.config)).await
        }
    };

    if let Err(error) = result {
        eprintln!("✗ {error}");
        std::process::exit(1);
    }
}
