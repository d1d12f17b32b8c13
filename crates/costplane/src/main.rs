// SPDX-FileCopyrightText: 2026 Costplane Contributors
// SPDX-License-Identifier: MIT OR Apache-2.0

//! Costplane - route cloud cost queries to pricing plugins.
//!
//! This is the binary entry point: it loads configuration, discovers the
//! installed plugins and dispatches to a subcommand.

#[cfg(not(target_env = "msvc"))]
use tikv_jemallocator::Jemalloc;

#[cfg(not(target_env = "msvc"))]
#[global_allocator]
static GLOBAL: Jemalloc = Jemalloc;

mod estimate;
mod plugins;
mod setup;
mod shutdown;
mod validate;

use std::path::PathBuf;

use clap::{Parser, Subcommand};

/// Costplane - route cloud cost queries to pricing plugins.
#[derive(Parser, Debug)]
#[command(name = "costplane", version, about, long_about = None)]
struct Cli {
    /// Configuration file. Defaults to the XDG hierarchy.
    #[arg(long, global = true)]
    config: Option<PathBuf>,

    /// Plugin directory, overriding `engine.plugin_dir`.
    #[arg(long, global = true)]
    plugin_dir: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

/// Available subcommands.
#[derive(Subcommand, Debug)]
enum Commands {
    /// Check routing configuration against the installed plugins.
    Validate {
        /// Emit the report as JSON.
        #[arg(long)]
        json: bool,
    },
    /// List installed plugins.
    Plugins {
        /// Launch each plugin and ask it for its current capabilities.
        #[arg(long)]
        introspect: bool,
    },
    /// Estimate the cost of one resource, or of a file of queries.
    Estimate(estimate::EstimateArgs),
}

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    let mut config = match setup::load_config(cli.config.as_deref()) {
        Ok(config) => config,
        Err(errors) => {
            costplane_config::render_errors(&errors);
            std::process::exit(2);
        }
    };
    if let Some(dir) = &cli.plugin_dir {
        config.engine.plugin_dir = dir.to_string_lossy().to_string();
    }

    setup::init_tracing(&config.logging.level);

    let result = match cli.command {
        Commands::Validate { json } => validate::run_validate(&config, json),
        Commands::Plugins { introspect } => plugins::run_plugins(&config, introspect).await,
        Commands::Estimate(args) => estimate::run_estimate(&config, args).await,
    };

    match result {
        Ok(code) => std::process::exit(code),
        Err(e) => {
            eprintln!("costplane: {e}");
            std::process::exit(1);
        }
    }
}
