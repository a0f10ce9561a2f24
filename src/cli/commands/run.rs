//! kiln run - Run scripts

use std::env;
use std::process::Stdio;

use clap::Args;
use tokio::process::Command;

use crate::cli::{output, Context};
use crate::core::{Engine, KilnError, KilnResult};

#[derive(Args)]
pub struct RunArgs {
    /// Script name to run; lists scripts when omitted
    pub script: Option<String>,

    /// Arguments to pass to the script
    #[arg(trailing_var_arg = true, allow_hyphen_values = true)]
    pub args: Vec<String>,
}

pub async fn execute(args: RunArgs, ctx: &Context) -> KilnResult<()> {
    let project_dir = ctx.project_dir()?;
    let engine = Engine::new(&project_dir).await?;
    let manifest = engine.manifest().await?;

    let Some(script_name) = args.script else {
        if ctx.json {
            output::json(&serde_json::json!({ "scripts": manifest.scripts }))?;
        } else if ctx.human() {
            if manifest.scripts.is_empty() {
                output::info("No scripts defined in package.json");
            } else {
                output::info("Available scripts:");
                for (name, command) in &manifest.scripts {
                    println!(
                        "  {} → {}",
                        console::style(name).cyan().bold(),
                        console::style(command).dim()
                    );
                }
            }
        }
        return Ok(());
    };

    let script_command = manifest.scripts.get(&script_name).ok_or_else(|| {
        KilnError::other(format!(
            "Script '{}' not found. Available scripts: {}",
            script_name,
            manifest.scripts.keys().cloned().collect::<Vec<_>>().join(", ")
        ))
    })?;

    let full_command = if args.args.is_empty() {
        script_command.clone()
    } else {
        format!("{} {}", script_command, args.args.join(" "))
    };

    if ctx.human() {
        eprintln!("{} {}", console::style("$").dim(), console::style(&full_command).dim());
    }

    // Installed executables shadow the inherited PATH
    let bin_dir = engine.dependency_dir().join(".bin");
    let inherited = env::var_os("PATH").unwrap_or_default();
    let path = env::join_paths(std::iter::once(bin_dir).chain(env::split_paths(&inherited)))
        .map_err(|e| KilnError::other(format!("Cannot build PATH: {}", e)))?;

    tracing::debug!("Running '{}' in {}", full_command, project_dir.display());
    let status = Command::new(shell())
        .arg(shell_arg())
        .arg(&full_command)
        .current_dir(&engine.project_dir)
        .env("PATH", path)
        .stdin(Stdio::inherit())
        .stdout(Stdio::inherit())
        .stderr(Stdio::inherit())
        .status()
        .await?;

    if ctx.json {
        output::json(&serde_json::json!({
            "script": script_name,
            "command": full_command,
            "success": status.success(),
            "exit_code": status.code()
        }))?;
    }

    if !status.success() {
        return Err(KilnError::ScriptFailed {
            package: manifest.name,
            script: script_name,
        });
    }

    Ok(())
}

/// Get the shell to use for running scripts
fn shell() -> String {
    if cfg!(windows) {
        env::var("COMSPEC").unwrap_or_else(|_| "cmd.exe".to_string())
    } else {
        "/bin/sh".to_string()
    }
}

fn shell_arg() -> &'static str {
    if cfg!(windows) {
        "/c"
    } else {
        "-c"
    }
}
