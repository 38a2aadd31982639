//! `edudir` command line.
//!
//! ## Commands
//!
//! - `edudir validate <FILE>`
//! - `edudir import <FILE> --owner <ID>`
//! - `edudir agencies [--search S] [--sort K] ...`
//! - `edudir config`

pub mod agencies_cmd;
pub mod import_cmd;

use std::path::PathBuf;
use std::process::ExitCode;

use anyhow::Context;
use clap::{Parser, Subcommand};
use edudir_core::config::{AppConfig, ConfigLoader};

/// Data tools for the consultancy directory.
#[derive(Debug, Parser)]
#[command(name = "edudir", version)]
pub struct Cli {
    /// Configuration file (defaults to ./edudir.toml, then the XDG config dir).
    #[arg(long = "config", global = true)]
    pub config: Option<PathBuf>,

    #[command(subcommand)]
    pub command: Command,
}

#[derive(Debug, Subcommand)]
pub enum Command {
    /// Parse an agency CSV without uploading it.
    Validate(import_cmd::ValidateArgs),
    /// Upload an agency CSV.
    Import(import_cmd::ImportArgs),
    /// List agencies.
    Agencies(agencies_cmd::AgenciesArgs),
    /// Print the effective configuration.
    Config,
}

impl Cli {
    pub fn load_config(&self) -> anyhow::Result<AppConfig> {
        match &self.config {
            Some(path) => ConfigLoader::new()
                .with_file(path)
                .load()
                .with_context(|| format!("loading {}", path.display())),
            None => ConfigLoader::load_default().context("loading configuration"),
        }
    }

    pub async fn run(self) -> anyhow::Result<ExitCode> {
        let config = self.load_config()?;
        match self.command {
            Command::Validate(args) => import_cmd::run_validate(&args, &config),
            Command::Import(args) => import_cmd::run_import(args, &config).await,
            Command::Agencies(args) => agencies_cmd::run_agencies(&args, &config).await,
            Command::Config => {
                print!("{}", config.to_toml()?);
                Ok(ExitCode::SUCCESS)
            }
        }
    }
}
