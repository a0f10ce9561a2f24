//! Executable links under `<deps>/.bin`
//!
//! A primary package's `bin` entries are linked as `.bin/<name>`, pointing
//! back into the package directory with a relative path.

use std::path::{Path, PathBuf};

use crate::core::{KilnResult, Manifest};
use crate::installer::extractor::normalize;
use crate::installer::layout;

/// Directory under the dependency dir holding executable links
pub const BIN_DIR: &str = ".bin";

/// `(command, path inside the package)` pairs declared by a manifest
pub fn bin_entries(package_name: &str, manifest: &Manifest) -> Vec<(String, String)> {
    match manifest.other.get("bin") {
        Some(serde_json::Value::String(path)) => {
            let command = package_name.rsplit('/').next().unwrap_or(package_name);
            vec![(command.to_string(), path.clone())]
        }
        Some(serde_json::Value::Object(bins)) => bins
            .iter()
            .filter_map(|(command, path)| path.as_str().map(|p| (command.clone(), p.to_string())))
            .collect(),
        _ => Vec::new(),
    }
}

/// Link every `bin` entry of the package in `package_dir`, returning the
/// commands linked. Entries that would leave the package are skipped.
pub async fn link_bins(deps_dir: &Path, package_name: &str, package_dir: &Path) -> KilnResult<Vec<String>> {
    unlink_bins(deps_dir, package_name).await?;

    let manifest = match Manifest::load(package_dir).await {
        Ok(manifest) => manifest,
        Err(e) => {
            tracing::debug!("No bin links for {}: {}", package_name, e);
            return Ok(Vec::new());
        }
    };

    let entries = bin_entries(package_name, &manifest);
    if entries.is_empty() {
        return Ok(Vec::new());
    }

    let bin_dir = deps_dir.join(BIN_DIR);
    tokio::fs::create_dir_all(&bin_dir).await?;

    let mut linked = Vec::new();
    for (command, path) in entries {
        let Some(relative) = checked_bin_path(&command, &path) else {
            tracing::warn!("Skipping bin '{}' -> '{}' in {}", command, path, package_name);
            continue;
        };

        let link = bin_dir.join(&command);
        let target = link_target(package_name, &relative);
        create_link(&link, &target, &package_dir.join(&relative)).await?;
        tracing::debug!("Linked {} -> {}", link.display(), target.display());
        linked.push(command);
    }

    Ok(linked)
}

/// Remove every `.bin` link that points into `package_name`
pub async fn unlink_bins(deps_dir: &Path, package_name: &str) -> KilnResult<usize> {
    let bin_dir = deps_dir.join(BIN_DIR);
    let mut entries = match tokio::fs::read_dir(&bin_dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(0),
        Err(e) => return Err(e.into()),
    };

    let owner = link_target(package_name, Path::new(""));
    let mut removed = 0;
    while let Some(entry) = entries.next_entry().await? {
        let Ok(target) = tokio::fs::read_link(entry.path()).await else {
            continue;
        };
        if target.starts_with(&owner) {
            tokio::fs::remove_file(entry.path()).await?;
            removed += 1;
        }
    }

    Ok(removed)
}

/// The bin path relative to the package root, if both the command name and
/// the path are safe
fn checked_bin_path(command: &str, path: &str) -> Option<PathBuf> {
    if layout::validate_package_name(command).is_err() || command.contains('/') {
        return None;
    }
    if path.contains('\0') || Path::new(path).has_root() {
        return None;
    }

    normalize(Path::new(""), Path::new(path)).filter(|p| !p.as_os_str().is_empty())
}

/// `../<name>/<relative>` as seen from the `.bin` directory
fn link_target(package_name: &str, relative: &Path) -> PathBuf {
    layout::package_dir(Path::new(".."), package_name).join(relative)
}

async fn create_link(link: &Path, target: &Path, executable: &Path) -> KilnResult<()> {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;

        if tokio::fs::symlink_metadata(link).await.is_ok() {
            tokio::fs::remove_file(link).await?;
        }
        tokio::fs::symlink(target, link).await?;

        if let Ok(metadata) = tokio::fs::metadata(executable).await {
            let mode = metadata.permissions().mode() | 0o111;
            if let Err(e) = tokio::fs::set_permissions(executable, std::fs::Permissions::from_mode(mode)).await {
                tracing::debug!("Could not mark {} executable: {}", executable.display(), e);
            }
        }
    }

    #[cfg(not(unix))]
    tracing::warn!(
        "Skipping bin link {} -> {}: not supported on this platform",
        link.display(),
        target.display()
    );

    let _ = executable;
    Ok(())
}
