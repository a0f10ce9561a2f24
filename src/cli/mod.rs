//! CLI module for Kiln
//!
//! Provides command-line interface using clap.

pub mod commands;
pub mod output;

use std::env;
use std::path::PathBuf;

use clap::{Parser, Subcommand};

use crate::core::KilnResult;
use commands::*;

/// Kiln - a package manager for npm-compatible registries
#[derive(Parser)]
#[command(name = "kiln")]
#[command(author = "Kiln Contributors")]
#[command(version)]
#[command(about = "Resolve, download and unpack packages from an npm-compatible registry", long_about = None)]
#[command(propagate_version = true)]
pub struct Cli {
    /// Output in JSON format
    #[arg(long, global = true)]
    pub json: bool,

    /// Enable verbose output
    #[arg(short, long, global = true)]
    pub verbose: bool,

    /// Suppress all output
    #[arg(short, long, global = true, conflicts_with = "verbose")]
    pub quiet: bool,

    /// Project directory
    #[arg(long, global = true, default_value = ".")]
    pub cwd: PathBuf,

    #[command(subcommand)]
    pub command: Commands,
}

#[derive(Subcommand)]
pub enum Commands {
    /// Initialize a new project
    Init(init::InitArgs),

    /// Install dependencies, or add and install the named packages
    #[command(visible_aliases = ["i", "add"])]
    Install(install::InstallArgs),

    /// List declared dependencies and their installed versions
    #[command(visible_alias = "ls")]
    List(list::ListArgs),

    /// Run a script defined in package.json
    Run(run::RunArgs),

    /// Remove packages from package.json and the dependency directory
    #[command(visible_aliases = ["remove", "rm"])]
    Uninstall(uninstall::UninstallArgs),
}

/// Options shared by every command
pub struct Context {
    /// Project directory as given on the command line
    pub cwd: PathBuf,

    /// Machine-readable output
    pub json: bool,

    /// No human-readable output
    pub quiet: bool,
}

impl Context {
    pub fn from_cli(cli: &Cli) -> Self {
        Self {
            cwd: cli.cwd.clone(),
            json: cli.json,
            quiet: cli.quiet,
        }
    }

    /// Absolute project directory
    pub fn project_dir(&self) -> KilnResult<PathBuf> {
        if self.cwd.is_absolute() {
            Ok(self.cwd.clone())
        } else {
            Ok(env::current_dir()?.join(&self.cwd))
        }
    }

    /// Whether human-readable messages should be printed
    pub fn human(&self) -> bool {
        !self.json && !self.quiet
    }
}
