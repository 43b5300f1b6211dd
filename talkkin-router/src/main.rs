//! talkkin-router - operator CLI
//!
//! Inspects routing configuration and regional variant resolution.
//! Output is JSON on stdout; logs go to stderr.

use std::path::PathBuf;

use anyhow::{Context, Result};
use clap::{Parser, Subcommand};
use serde::Serialize;
use talkkin_common::config::{ConfigResolver, TomlConfig};
use talkkin_common::logging::init_tracing;
use talkkin_router::{VariantContext, VariantResolver};
use tracing::debug;

/// Command-line arguments for talkkin-router
#[derive(Parser, Debug)]
#[command(name = "talkkin-router")]
#[command(about = "Routing core tools for Talk Kin")]
#[command(version)]
struct Args {
    /// Config file (overrides TALKKIN_CONFIG and the platform config)
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Command,
}

#[derive(Subcommand, Debug)]
enum Command {
    /// Regional variant resolution
    #[command(subcommand)]
    Variant(VariantCommand),

    /// Configuration inspection
    #[command(subcommand)]
    Config(ConfigCommand),
}

#[derive(Subcommand, Debug)]
enum VariantCommand {
    /// Detect the variant for a base language
    Detect {
        language: String,
        #[arg(long)]
        region: Option<String>,
        #[arg(long)]
        country: Option<String>,
        #[arg(long)]
        accept_language: Option<String>,
    },
    /// Print the fallback chain of a variant
    Chain { variant: String },
    /// Normalize a variant alias
    Normalize { input: String },
    /// List supported variants of a base language
    List { base: String },
}

#[derive(Subcommand, Debug)]
enum ConfigCommand {
    /// Print the effective configuration
    Show,
}

fn print_json<T: Serialize>(value: &T) -> Result<()> {
    let out = serde_json::to_string_pretty(value).context("Failed to encode output")?;
    println!("{}", out);
    Ok(())
}

fn main() -> Result<()> {
    let args = Args::parse();

    let config = ConfigResolver::new("router")
        .with_cli_path(args.config.clone())
        .load()
        .context("Failed to load configuration")?;
    init_tracing(&config.logging).context("Failed to initialise tracing")?;
    debug!(command = ?args.command, "talkkin-router starting");

    match args.command {
        Command::Variant(command) => run_variant(command),
        Command::Config(ConfigCommand::Show) => show_config(&config),
    }
}

fn run_variant(command: VariantCommand) -> Result<()> {
    let resolver = VariantResolver::new();
    match command {
        VariantCommand::Detect {
            language,
            region,
            country,
            accept_language,
        } => {
            let context = VariantContext {
                region,
                country,
                accept_language,
            };
            print_json(&resolver.detect_variant(&language, &context))
        }
        VariantCommand::Chain { variant } => print_json(&resolver.get_fallback_chain(&variant)),
        VariantCommand::Normalize { input } => print_json(&resolver.normalize_variant(&input)),
        VariantCommand::List { base } => print_json(&resolver.variants_for(&base)),
    }
}

fn show_config(config: &TomlConfig) -> Result<()> {
    let value = serde_json::to_value(config).context("Failed to encode configuration")?;
    print_json(&value)
}
