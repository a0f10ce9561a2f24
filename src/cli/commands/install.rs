//! kiln install - Install dependencies

use std::time::Instant;

use clap::Args;

use crate::cli::{output, Context};
use crate::core::{Engine, KilnResult};
use crate::installer::InstallRequest;

#[derive(Args)]
pub struct InstallArgs {
    /// Packages to add (name or name@range); installs package.json when empty
    pub packages: Vec<String>,

    /// Record the named packages as dev dependencies
    #[arg(short = 'D', long)]
    pub save_dev: bool,

    /// Only install production dependencies
    #[arg(long, conflicts_with = "save_dev")]
    pub production: bool,
}

pub async fn execute(args: InstallArgs, ctx: &Context) -> KilnResult<()> {
    let start_time = Instant::now();

    let engine = Engine::new(&ctx.project_dir()?).await?;
    engine.ensure_initialized()?;

    let progress = ctx.human().then(|| output::spinner("Resolving dependencies..."));

    let request = InstallRequest {
        packages: args.packages,
        dev: args.save_dev,
        production: args.production,
    };

    let result = engine
        .installer()
        .install(request, |package| {
            if !ctx.human() {
                return;
            }
            let line = format!(
                "{} ({} files)",
                output::package_version(&package.name, &package.version),
                package.files
            );
            match progress {
                Some(ref pb) => pb.suspend(|| output::success(&line)),
                None => output::success(&line),
            }
        })
        .await;

    if let Some(pb) = progress {
        pb.finish_and_clear();
    }
    let report = result?;

    let duration = start_time.elapsed();

    if ctx.json {
        output::json(&serde_json::json!({
            "success": true,
            "added": report.added.iter().map(|(name, range)| serde_json::json!({
                "name": name,
                "range": range
            })).collect::<Vec<_>>(),
            "installed": report.installed.iter().map(|p| serde_json::json!({
                "name": p.name,
                "version": p.version,
                "files": p.files,
                "path": p.dir,
                "primary": p.primary
            })).collect::<Vec<_>>(),
            "warnings": report.warnings.iter().map(|w| w.to_string()).collect::<Vec<_>>(),
            "duration_ms": duration.as_millis()
        }))?;
    } else if ctx.human() {
        if !report.warnings.is_empty() {
            output::warning(&format!(
                "{} dependency request(s) could not be resolved and were skipped",
                report.warnings.len()
            ));
        }

        if report.installed.is_empty() {
            output::success("No dependencies to install");
        } else {
            output::success(&format!(
                "Installed {} package(s) in {}",
                report.installed.len(),
                output::format_duration(duration.as_millis())
            ));
        }
    }

    Ok(())
}
