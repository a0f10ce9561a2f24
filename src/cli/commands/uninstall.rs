//! kiln uninstall - Remove packages

use std::time::Instant;

use clap::Args;

use crate::cli::{output, Context};
use crate::core::{Engine, KilnResult};
use crate::installer::{bins, layout};

#[derive(Args)]
pub struct UninstallArgs {
    /// Packages to remove
    #[arg(required = true)]
    pub packages: Vec<String>,
}

pub async fn execute(args: UninstallArgs, ctx: &Context) -> KilnResult<()> {
    let start_time = Instant::now();

    let engine = Engine::new(&ctx.project_dir()?).await?;
    let mut manifest = engine.manifest().await?;
    let deps_dir = engine.dependency_dir();

    let mut removed = Vec::new();
    let mut manifest_changed = false;

    for name in &args.packages {
        layout::validate_package_name(name)?;

        let declared = manifest.remove_dependency(name);
        manifest_changed |= declared;

        let mut dirs = vec![layout::package_dir(&deps_dir, name)];
        dirs.extend(layout::secondary_dirs(&deps_dir, name).await?);

        let mut deleted = 0;
        for dir in dirs {
            if tokio::fs::symlink_metadata(&dir).await.is_ok() {
                tracing::debug!("Removing {}", dir.display());
                tokio::fs::remove_dir_all(&dir).await?;
                deleted += 1;
            }
        }

        deleted += bins::unlink_bins(&deps_dir, name).await?;

        if declared || deleted > 0 {
            removed.push(name.clone());
        } else if ctx.human() {
            output::warning(&format!("Package '{}' not found in dependencies", name));
        }
    }

    if manifest_changed {
        manifest.save(&engine.project_dir).await?;
    }

    if ctx.json {
        output::json(&serde_json::json!({
            "success": true,
            "removed": removed,
            "duration_ms": start_time.elapsed().as_millis()
        }))?;
    } else if ctx.human() {
        if removed.is_empty() {
            output::info("No packages were removed");
        }
        for name in &removed {
            output::success(&format!("Removed {}", console::style(name).cyan()));
        }
    }

    Ok(())
}
