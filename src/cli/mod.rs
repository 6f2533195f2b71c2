// Copyright (c) 2025 Fabstir
// SPDX-License-Identifier: BUSL-1.1
pub mod commands;

use anyhow::Result;
use clap::{Parser, Subcommand};

/// VLM object detection CLI
#[derive(Parser, Debug)]
#[command(name = "vlm-detect")]
#[command(version)]
#[command(about = "Detect objects in images with a vision-language model", long_about = None)]
pub struct Cli {
    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand, Debug)]
pub enum Commands {
    /// Run detection on an image file or URL
    Detect(commands::DetectArgs),

    /// Print the exact prompt sent to the model
    Prompt(commands::PromptArgs),

    /// Parse a saved model response into detections
    Parse(commands::ParseArgs),

    /// Check that the configured backend is reachable
    Health(commands::HealthArgs),
}

/// Execute CLI command
pub async fn execute(cli: Cli) -> Result<()> {
    match cli.command {
        Commands::Detect(args) => commands::detect(args).await,
        Commands::Prompt(args) => commands::prompt(args),
        Commands::Parse(args) => commands::parse(args),
        Commands::Health(args) => commands::health(args).await,
    }
}
