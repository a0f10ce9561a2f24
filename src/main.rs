//! Kiln - a package manager for npm-compatible registries
//!
//! Kiln resolves semantic-version ranges against registry metadata, downloads
//! the matching archives, checks them, and unpacks them into the project's
//! dependency directory.

mod cli;
mod core;
mod installer;
mod registry;
mod resolver;
mod security;

use clap::Parser;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt, EnvFilter};

use cli::{output, Cli, Commands, Context};

#[tokio::main]
async fn main() {
    let cli = Cli::parse();

    // RUST_LOG wins; otherwise --verbose / --quiet pick the level
    let default_filter = if cli.verbose {
        "kiln=debug"
    } else if cli.quiet {
        "error"
    } else {
        "warn"
    };
    tracing_subscriber::registry()
        .with(EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(default_filter)))
        .with(
            tracing_subscriber::fmt::layer()
                .with_target(false)
                .with_writer(std::io::stderr),
        )
        .init();

    let ctx = Context::from_cli(&cli);

    let result = match cli.command {
        Commands::Init(args) => cli::commands::init::execute(args, &ctx).await,
        Commands::Install(args) => cli::commands::install::execute(args, &ctx).await,
        Commands::List(args) => cli::commands::list::execute(args, &ctx).await,
        Commands::Run(args) => cli::commands::run::execute(args, &ctx).await,
        Commands::Uninstall(args) => cli::commands::uninstall::execute(args, &ctx).await,
    };

    if let Err(e) = result {
        if ctx.json {
            let error_json = serde_json::json!({
                "error": true,
                "message": e.to_string()
            });
            match serde_json::to_string_pretty(&error_json) {
                Ok(text) => eprintln!("{}", text),
                Err(_) => output::error(&e.to_string()),
            }
        } else {
            output::error(&e.to_string());
        }
        std::process::exit(1);
    }
}
