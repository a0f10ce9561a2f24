//! kiln init - Initialize a new project

use clap::Args;
use dialoguer::Input;

use crate::cli::{output, Context};
use crate::core::{KilnResult, Manifest};

#[derive(Args)]
pub struct InitArgs {
    /// Skip interactive prompts
    #[arg(short, long)]
    pub yes: bool,

    /// Project name
    #[arg(long)]
    pub name: Option<String>,
}

pub async fn execute(args: InitArgs, ctx: &Context) -> KilnResult<()> {
    let project_dir = ctx.project_dir()?;
    tokio::fs::create_dir_all(&project_dir).await?;

    let manifest_path = Manifest::path(&project_dir);
    if manifest_path.exists() {
        if ctx.json {
            output::json(&serde_json::json!({
                "success": false,
                "error": "package.json already exists"
            }))?;
        } else if ctx.human() {
            output::warning("package.json already exists. Use 'kiln install' to install dependencies.");
        }
        return Ok(());
    }

    let default_name = project_dir
        .file_name()
        .and_then(|n| n.to_str())
        .unwrap_or("my-project")
        .to_lowercase();

    // Prompts need a terminal; `--yes` and JSON mode take the defaults
    let interactive = !args.yes && !ctx.json;

    let project_name = match args.name {
        Some(name) => name,
        None if interactive => Input::new()
            .with_prompt("Package name")
            .default(default_name)
            .interact_text()?,
        None => default_name,
    };

    let mut manifest = Manifest::new(&project_name);

    if interactive {
        manifest.version = Input::new()
            .with_prompt("Version")
            .default(manifest.version.clone())
            .interact_text()?;
        manifest.description = Input::new()
            .with_prompt("Description")
            .default(String::new())
            .allow_empty(true)
            .interact_text()?;
    }

    manifest.save(&project_dir).await?;

    let gitignore_path = project_dir.join(".gitignore");
    if !gitignore_path.exists() {
        tokio::fs::write(&gitignore_path, "node_modules/\n.env\n*.log\n").await?;
    }

    if ctx.json {
        output::json(&serde_json::json!({
            "success": true,
            "name": project_name,
            "path": project_dir
        }))?;
    } else if ctx.human() {
        output::success(&format!(
            "Initialized project '{}' in {}",
            project_name,
            project_dir.display()
        ));
        println!();
        output::info("Next steps:");
        println!("  1. Add dependencies: kiln install <package>");
        println!("  2. Run scripts: kiln run <script>");
    }

    Ok(())
}
