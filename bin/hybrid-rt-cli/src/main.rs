// Copyright (c) 2025 Dimitris Kafetzis
//
// Licensed under the MIT License.
// See LICENSE file in the project root for full license information.
//
// SPDX-License-Identifier: MIT

//! # hybrid-rt
//!
//! Command-line interface for the hybrid host/FPGA runtime.
//!
//! ## Usage
//! ```bash
//! # One forward pass against the configured accelerator
//! hybrid-rt run --config hybrid-rt.toml
//!
//! # Same pass against the in-process loopback accelerator, JSON output
//! hybrid-rt run --config hybrid-rt.toml --loopback --json
//!
//! # Show the bytes each offload puts on the wire
//! hybrid-rt inspect --config hybrid-rt.toml
//!
//! # Check that the serial device opens
//! hybrid-rt probe --config hybrid-rt.toml
//!
//! # List serial ports
//! hybrid-rt ports
//! ```

mod commands;

use clap::{Parser, Subcommand};
use std::path::PathBuf;

#[derive(Parser)]
#[command(
    name = "hybrid-rt",
    about = "Hybrid host/FPGA CNN inference over a serial link",
    version,
    author
)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(short, long, global = true, default_value = "hybrid-rt.toml")]
    config: PathBuf,

    /// Enable verbose logging (repeat for more: -v, -vv, -vvv).
    #[arg(short, long, action = clap::ArgAction::Count, global = true)]
    verbose: u8,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Run one forward pass of the demo classifier.
    Run {
        /// Use the in-process loopback accelerator instead of the device.
        #[arg(long)]
        loopback: bool,

        /// Print output and metrics as JSON.
        #[arg(long)]
        json: bool,
    },

    /// Print each offload point's wire budget.
    Inspect,

    /// Open and close the configured serial device.
    Probe,

    /// List serial ports visible to this host.
    Ports,
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();

    // Initialize tracing/logging based on verbosity.
    commands::init_tracing(cli.verbose);

    match cli.command {
        Commands::Run { loopback, json } => commands::run::execute(cli.config, loopback, json).await,
        Commands::Inspect => commands::inspect::execute(cli.config).await,
        Commands::Probe => commands::probe::execute(cli.config).await,
        Commands::Ports => commands::ports::execute().await,
    }
}
