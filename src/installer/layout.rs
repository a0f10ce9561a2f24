//! Where each resolved package lands inside the dependency directory
//!
//! Every name gets one primary version at `<deps>/<name>`. Other versions of
//! the same name live at `<deps>/.kiln/<name>@<version>`.

use std::cmp::Ordering;
use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use crate::core::{KilnError, KilnResult};
use crate::resolver::version::{compare, SemanticVersion};
use crate::resolver::{PackageKey, ResolvedPackage};

/// Directory under the dependency dir holding non-primary versions
pub const SECONDARY_DIR: &str = ".kiln";

/// One package and the directory it will be extracted into
#[derive(Debug, Clone)]
pub struct Placement {
    pub package: ResolvedPackage,
    pub dir: PathBuf,
    pub primary: bool,
}

/// Reject names that could address anything outside their own directory,
/// or collide with kiln's own `.kiln` and `.bin` entries
pub fn validate_package_name(name: &str) -> KilnResult<()> {
    let traversal = || KilnError::PathTraversal {
        package: name.to_string(),
        path: name.to_string(),
    };

    let segments: Vec<&str> = name.split('/').collect();
    let shape_ok = match segments.as_slice() {
        [single] => !single.starts_with(['@', '.', '_']),
        [scope, _] => scope.len() > 1 && scope.starts_with('@'),
        _ => false,
    };

    if !shape_ok || !segments.iter().all(|s| is_safe_segment(s)) {
        return Err(traversal());
    }

    Ok(())
}

fn is_safe_segment(segment: &str) -> bool {
    !segment.is_empty()
        && segment != "."
        && segment != ".."
        && !segment.contains(['\\', '\0', ':'])
}

/// `<deps>/<name>`, nested one level for scoped names
pub fn package_dir(deps_dir: &Path, name: &str) -> PathBuf {
    name.split('/').fold(deps_dir.to_path_buf(), |dir, segment| dir.join(segment))
}

/// `<deps>/.kiln/<name>@<version>`
pub fn secondary_dir(deps_dir: &Path, name: &str, version: &str) -> PathBuf {
    package_dir(&deps_dir.join(SECONDARY_DIR), &format!("{}@{}", name, version))
}

/// Every installed secondary version directory of `name`
pub async fn secondary_dirs(deps_dir: &Path, name: &str) -> KilnResult<Vec<PathBuf>> {
    let probe = secondary_dir(deps_dir, name, "");
    let (Some(parent), Some(prefix)) = (probe.parent(), probe.file_name()) else {
        return Ok(Vec::new());
    };
    let prefix = prefix.to_string_lossy().into_owned();

    let mut found = Vec::new();
    let mut entries = match tokio::fs::read_dir(parent).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(found),
        Err(e) => return Err(e.into()),
    };

    while let Some(entry) = entries.next_entry().await? {
        if entry.file_name().to_string_lossy().starts_with(&prefix) {
            found.push(entry.path());
        }
    }

    found.sort();
    Ok(found)
}

/// Decide a directory for every resolved package.
///
/// `roots` maps each top-level name to the version its request resolved to;
/// that version is primary. Names reached only transitively use their
/// highest resolved version.
pub fn plan(
    packages: &BTreeMap<PackageKey, ResolvedPackage>,
    roots: &BTreeMap<String, String>,
    deps_dir: &Path,
) -> KilnResult<Vec<Placement>> {
    let mut by_name: BTreeMap<&str, Vec<&ResolvedPackage>> = BTreeMap::new();
    for package in packages.values() {
        validate_package_name(&package.name)?;
        if !is_safe_segment(&package.version) || package.version.contains('/') {
            return Err(KilnError::PathTraversal {
                package: package.name.clone(),
                path: package.version.clone(),
            });
        }
        by_name.entry(&package.name).or_default().push(package);
    }

    let mut placements = Vec::with_capacity(packages.len());
    for (name, versions) in by_name {
        let primary = roots
            .get(name)
            .filter(|v| versions.iter().any(|p| &p.version == *v))
            .cloned()
            .or_else(|| highest(&versions));

        let (first, rest): (Vec<_>, Vec<_>) = versions
            .into_iter()
            .partition(|p| Some(&p.version) == primary.as_ref());

        for package in first {
            placements.push(Placement {
                package: package.clone(),
                dir: package_dir(deps_dir, name),
                primary: true,
            });
        }
        for package in rest {
            placements.push(Placement {
                package: package.clone(),
                dir: secondary_dir(deps_dir, name, &package.version),
                primary: false,
            });
        }
    }

    Ok(placements)
}

fn highest(versions: &[&ResolvedPackage]) -> Option<String> {
    versions
        .iter()
        .max_by(|a, b| {
            match (SemanticVersion::parse(&a.version), SemanticVersion::parse(&b.version)) {
                (Some(a), Some(b)) => compare(&a, &b),
                (Some(_), None) => Ordering::Greater,
                (None, Some(_)) => Ordering::Less,
                (None, None) => a.version.cmp(&b.version),
            }
        })
        .map(|p| p.version.clone())
}
