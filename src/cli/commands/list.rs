//! kiln list - Show declared dependencies and what is installed

use std::path::Path;

use clap::Args;
use console::style;

use crate::cli::{output, Context};
use crate::core::{Engine, KilnResult, Manifest};
use crate::installer::layout;
use crate::resolver::{satisfies, VersionRange};

#[derive(Args)]
pub struct ListArgs {
    /// Only list production dependencies
    #[arg(long)]
    pub production: bool,
}

struct Row {
    name: String,
    range: String,
    installed: Option<String>,
    dev: bool,
}

impl Row {
    /// Whether the installed version still matches the declared range.
    /// Dist-tag ranges such as `next` cannot be checked offline.
    fn satisfied(&self) -> Option<bool> {
        let installed = self.installed.as_deref()?;
        let range = VersionRange::parse(&self.range);
        if matches!(range, VersionRange::Invalid(_)) {
            return None;
        }
        Some(satisfies(installed, &self.range))
    }
}

pub async fn execute(args: ListArgs, ctx: &Context) -> KilnResult<()> {
    let engine = Engine::new(&ctx.project_dir()?).await?;
    let manifest = engine.manifest().await?;
    let deps_dir = engine.dependency_dir();

    let mut declared: Vec<(&String, &String, bool)> =
        manifest.dependencies.iter().map(|(n, r)| (n, r, false)).collect();
    if !args.production {
        declared.extend(manifest.dev_dependencies.iter().map(|(n, r)| (n, r, true)));
    }

    let mut rows = Vec::with_capacity(declared.len());
    for (name, range, dev) in declared {
        rows.push(Row {
            name: name.clone(),
            range: range.clone(),
            installed: installed_version(&deps_dir, name).await,
            dev,
        });
    }

    if ctx.json {
        output::json(&serde_json::json!({
            "name": manifest.name,
            "version": manifest.version,
            "dependencies": rows.iter().map(|row| serde_json::json!({
                "name": row.name,
                "range": row.range,
                "installed": row.installed,
                "satisfied": row.satisfied(),
                "dev": row.dev
            })).collect::<Vec<_>>()
        }))?;
        return Ok(());
    }

    if !ctx.human() {
        return Ok(());
    }

    output::info(&output::package_version(&manifest.name, &manifest.version));
    if rows.is_empty() {
        println!("  (no dependencies)");
        return Ok(());
    }

    for row in &rows {
        let installed = match row.installed {
            Some(ref version) => style(version.clone()).green().to_string(),
            None => style("(not installed)".to_string()).red().to_string(),
        };
        let dev = if row.dev {
            style(" dev").dim().to_string()
        } else {
            String::new()
        };
        let mismatch = if row.satisfied() == Some(false) {
            style(" (does not satisfy range)").yellow().to_string()
        } else {
            String::new()
        };
        println!(
            "  {} {} {} {}{}{}",
            style(&row.name).cyan(),
            style(&row.range).dim(),
            style("→").dim(),
            installed,
            mismatch,
            dev
        );
    }

    Ok(())
}

/// Version recorded in an installed package's own manifest
async fn installed_version(deps_dir: &Path, name: &str) -> Option<String> {
    if layout::validate_package_name(name).is_err() {
        return None;
    }

    match Manifest::load(&layout::package_dir(deps_dir, name)).await {
        Ok(installed) => Some(installed.version),
        Err(e) => {
            tracing::debug!("{} is not installed: {}", name, e);
            None
        }
    }
}
