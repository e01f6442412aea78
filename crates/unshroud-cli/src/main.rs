use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::filter::EnvFilter;

mod commands;
mod config;

use commands::{
    deobfuscate::DeobfuscateCommand, hash::HashCommand, transformers::TransformersCommand,
};

#[derive(Parser)]
#[command(name = "unshroud", version, about = "JavaScript deobfuscator")]
struct Cli {
    /// Config file (default: nearest unshroud.toml)
    #[arg(long, global = true, value_name = "FILE")]
    config: Option<PathBuf>,

    #[command(subcommand)]
    command: Commands,
}

#[derive(Subcommand)]
enum Commands {
    /// Deobfuscate a file
    #[command(visible_alias = "d")]
    Deobfuscate(DeobfuscateCommand),
    /// Print the source-identity hash of a file
    Hash(HashCommand),
    /// List the built-in passes
    Transformers(TransformersCommand),
}

fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_writer(std::io::stderr)
        .with_env_filter(EnvFilter::from_default_env().add_directive("warn".parse()?))
        .init();

    let cli = Cli::parse();

    match cli.command {
        Commands::Deobfuscate(cmd) => {
            let cwd = std::env::current_dir()?;
            let config = config::load_config(cli.config.as_deref(), &cwd)?;
            cmd.run(config)?;
        }
        Commands::Hash(cmd) => cmd.run()?,
        Commands::Transformers(cmd) => cmd.run()?,
    }

    Ok(())
}
