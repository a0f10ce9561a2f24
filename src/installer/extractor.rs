//! Archive extraction with path safety checks

use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};

use crate::core::{KilnError, KilnResult};
use crate::installer::archive::{ArchiveEntry, EntryKind};

/// Writes archive entries below a destination directory
pub struct Extractor {
    /// Package the entries belong to, for error messages
    package: String,
}

/// Entries whose destinations have all been checked, ready to write
#[derive(Debug)]
pub struct ExtractionPlan {
    package: String,
    base_dir: PathBuf,
    steps: Vec<(PathBuf, ArchiveEntry)>,
}

impl Extractor {
    /// Create a new extractor
    pub fn new(package: impl Into<String>) -> Self {
        Self {
            package: package.into(),
        }
    }

    /// Validate every entry against `base_dir` without touching the disk.
    ///
    /// One escaping entry rejects the whole archive. No entry may pass
    /// through a symlink the archive itself creates. Directories are ordered
    /// before files and symlinks; relative order within each group is kept.
    pub fn plan(&self, entries: Vec<ArchiveEntry>, base_dir: &Path) -> KilnResult<ExtractionPlan> {
        let mut checked = Vec::with_capacity(entries.len());
        let mut links = HashSet::new();

        for entry in entries {
            let relative = self.check_path_traversal(&entry.path)?;

            if entry.kind == EntryKind::Symlink {
                self.check_link_target(&relative, entry.link_target.as_deref().unwrap_or(""))?;
                links.insert(relative.clone());
            }

            if relative.as_os_str().is_empty() {
                if entry.kind == EntryKind::Directory {
                    continue;
                }
                return Err(self.traversal(&entry.path));
            }

            checked.push((relative, entry));
        }

        let mut directories = Vec::new();
        let mut others = Vec::new();

        for (relative, entry) in checked {
            if relative.ancestors().skip(1).any(|ancestor| links.contains(ancestor)) {
                return Err(self.traversal(&format!("{} (inside a symlink)", entry.path)));
            }

            let target = base_dir.join(&relative);
            if entry.kind == EntryKind::Directory {
                directories.push((target, entry));
            } else {
                others.push((target, entry));
            }
        }

        directories.extend(others);
        Ok(ExtractionPlan {
            package: self.package.clone(),
            base_dir: base_dir.to_path_buf(),
            steps: directories,
        })
    }

    /// Lexically normalise an entry path, failing if it leaves the root
    fn check_path_traversal(&self, path: &str) -> KilnResult<PathBuf> {
        if path.contains('\0') {
            return Err(self.traversal("null byte in path"));
        }

        let path_ref = Path::new(path);
        if path.starts_with('/') || path_ref.has_root() {
            return Err(self.traversal(path));
        }

        normalize(Path::new(""), path_ref).ok_or_else(|| self.traversal(path))
    }

    /// A symlink may only point at something inside the destination
    fn check_link_target(&self, link: &Path, target: &str) -> KilnResult<()> {
        let target_ref = Path::new(target);
        if target.is_empty() || target.starts_with('/') || target_ref.has_root() {
            return Err(self.traversal(&format!("{} -> {}", link.display(), target)));
        }

        let parent = link.parent().unwrap_or_else(|| Path::new(""));
        normalize(parent, target_ref)
            .map(|_| ())
            .ok_or_else(|| self.traversal(&format!("{} -> {}", link.display(), target)))
    }

    fn traversal(&self, path: &str) -> KilnError {
        KilnError::PathTraversal {
            package: self.package.clone(),
            path: path.to_string(),
        }
    }
}

/// Resolve `path` relative to `base` (itself relative to the extraction
/// root) using only `.` and `..`. `None` if it climbs above the root.
pub(crate) fn normalize(base: &Path, path: &Path) -> Option<PathBuf> {
    let mut parts: Vec<&std::ffi::OsStr> = base.iter().collect();

    for component in path.components() {
        match component {
            Component::Normal(part) => parts.push(part),
            Component::CurDir => {}
            Component::ParentDir => {
                parts.pop()?;
            }
            Component::RootDir | Component::Prefix(_) => return None,
        }
    }

    Some(parts.into_iter().collect())
}

impl ExtractionPlan {
    /// Write every entry, returning the number of regular files written
    pub async fn write(self) -> KilnResult<usize> {
        tokio::fs::create_dir_all(&self.base_dir).await?;
        let root = tokio::fs::canonicalize(&self.base_dir).await?;
        let mut files = 0;

        for (target, entry) in &self.steps {
            match entry.kind {
                EntryKind::Directory => {
                    tokio::fs::create_dir_all(target).await?;
                    self.ensure_inside(&root, target, &entry.path).await?;
                }
                EntryKind::File => {
                    self.prepare_parent(&root, target, &entry.path).await?;
                    tokio::fs::write(target, entry.payload.as_deref().unwrap_or_default()).await?;
                    set_mode(target, entry.mode).await;
                    files += 1;
                }
                EntryKind::Symlink => {
                    self.prepare_parent(&root, target, &entry.path).await?;
                    create_symlink(&self.package, target, entry.link_target.as_deref().unwrap_or("")).await?;
                }
            }
        }

        Ok(files)
    }

    async fn prepare_parent(&self, root: &Path, target: &Path, entry_path: &str) -> KilnResult<()> {
        match target.parent() {
            Some(parent) => {
                tokio::fs::create_dir_all(parent).await?;
                self.ensure_inside(root, parent, entry_path).await
            }
            None => Ok(()),
        }
    }

    /// The real location of `dir` on disk must still be below `root`
    async fn ensure_inside(&self, root: &Path, dir: &Path, entry_path: &str) -> KilnResult<()> {
        let real = tokio::fs::canonicalize(dir).await?;
        if real.starts_with(root) {
            return Ok(());
        }

        Err(KilnError::PathTraversal {
            package: self.package.clone(),
            path: format!("{} resolves to {}", entry_path, real.display()),
        })
    }
}

/// Set permissions on Unix
async fn set_mode(target: &Path, mode: u32) {
    #[cfg(unix)]
    {
        use std::os::unix::fs::PermissionsExt;
        let bits = mode & 0o777;
        if bits != 0 {
            if let Err(e) = tokio::fs::set_permissions(target, std::fs::Permissions::from_mode(bits)).await {
                tracing::debug!("Could not set mode {:o} on {}: {}", bits, target.display(), e);
            }
        }
    }

    #[cfg(not(unix))]
    let _ = (target, mode);
}

async fn create_symlink(package: &str, target: &Path, link_target: &str) -> KilnResult<()> {
    #[cfg(unix)]
    {
        if tokio::fs::symlink_metadata(target).await.is_ok() {
            tokio::fs::remove_file(target).await?;
        }
        tokio::fs::symlink(link_target, target).await?;
    }

    #[cfg(not(unix))]
    tracing::warn!(
        "Skipping symlink {} -> {} in {}: not supported on this platform",
        target.display(),
        link_target,
        package
    );

    let _ = package;
    Ok(())
}
