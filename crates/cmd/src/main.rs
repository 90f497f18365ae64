// SPDX-FileCopyrightText: 2025 Caspar Water Company
//
// SPDX-License-Identifier: Apache-2.0

use anyhow::Result;
use clap::{Parser, Subcommand};
use cmd::commands::{ExtractArgs, SeriesArgs, extract_command, series_command};
use diagnostics::*;

#[derive(Parser)]
#[command(author, version, about, long_about = None)]
#[command(name = "regionstats")]
struct Cli {
    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Extract one value per feature per period as JSON records
    Extract(ExtractArgs),
    /// Reduce one geometry per image as JSON rows
    Series(SeriesArgs),
}

#[tokio::main]
async fn main() -> Result<()> {
    init_diagnostics();

    let cli = Cli::parse();
    let mut out = std::io::stdout().lock();

    match &cli.command {
        Commands::Extract(args) => extract_command(args, &mut out).await,
        Commands::Series(args) => series_command(args, &mut out).await,
    }
}
