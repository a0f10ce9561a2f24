//! Package installer for Kiln
//!
//! Drives one install run: update the manifest, resolve every top-level
//! request, decide placements, then download and extract each package.

pub mod archive;
pub mod bins;
pub mod downloader;
pub mod extractor;
pub mod layout;

use std::collections::BTreeMap;
use std::path::PathBuf;
use std::sync::Arc;

use futures::stream::{self, StreamExt};

use crate::core::{KilnResult, Manifest};
use crate::registry::Registry;
use crate::resolver::{Resolution, ResolutionWarning, Resolver};

pub use downloader::Downloader;
pub use extractor::Extractor;
pub use layout::Placement;

/// Range recorded for a package named without one
pub const DEFAULT_RANGE: &str = "latest";

/// What to install
#[derive(Debug, Clone, Default)]
pub struct InstallRequest {
    /// Explicit `name[@range]` specs; empty means everything in the manifest
    pub packages: Vec<String>,

    /// Record explicit specs under `devDependencies`
    pub dev: bool,

    /// Skip `devDependencies` when installing from the manifest
    pub production: bool,
}

/// A package that was written to disk
#[derive(Debug, Clone)]
pub struct InstalledPackage {
    pub name: String,
    pub version: String,
    pub dir: PathBuf,
    pub files: usize,
    pub primary: bool,
}

/// Result of an installation
#[derive(Debug, Default)]
pub struct InstallReport {
    /// Entries written to the manifest for explicit specs
    pub added: Vec<(String, String)>,

    /// Packages installed, in install order
    pub installed: Vec<InstalledPackage>,

    /// Requests that could not be resolved and were skipped
    pub warnings: Vec<ResolutionWarning>,
}

/// Package installer
pub struct Installer {
    /// Project directory
    project_dir: PathBuf,

    /// Absolute dependency directory
    deps_dir: PathBuf,

    registry: Arc<dyn Registry>,

    /// Concurrent request limit for resolution and downloads
    concurrency: usize,

    require_integrity: bool,
}

impl Installer {
    /// Create a new installer
    pub fn new(
        project_dir: PathBuf,
        deps_dir: PathBuf,
        registry: Arc<dyn Registry>,
        concurrency: usize,
        require_integrity: bool,
    ) -> Self {
        Self {
            project_dir,
            deps_dir,
            registry,
            concurrency: concurrency.max(1),
            require_integrity,
        }
    }

    /// Run an install. `on_installed` fires once per package after its files
    /// are on disk, never for a package that failed.
    pub async fn install<F>(&self, request: InstallRequest, mut on_installed: F) -> KilnResult<InstallReport>
    where
        F: FnMut(&InstalledPackage),
    {
        let mut manifest = Manifest::load(&self.project_dir).await?;
        let mut report = InstallReport::default();

        let requests: Vec<(String, String)> = if request.packages.is_empty() {
            let deps = if request.production {
                manifest.production_dependencies()
            } else {
                manifest.all_dependencies()
            };
            deps.into_iter().collect()
        } else {
            let specs = request
                .packages
                .iter()
                .map(|spec| {
                    let (name, range) = parse_package_spec(spec);
                    layout::validate_package_name(&name)?;
                    Ok((name, range))
                })
                .collect::<KilnResult<Vec<_>>>()?;

            for (name, range) in &specs {
                manifest.add_dependency(name, range, request.dev);
            }
            // Saved before any network activity so an interrupted install
            // still records what was asked for.
            manifest.save(&self.project_dir).await?;
            report.added = specs.clone();
            specs
        };

        if requests.is_empty() {
            tracing::debug!("Nothing to install");
            return Ok(report);
        }

        let (resolution, roots) = self.resolve_all(&requests).await?;
        report.warnings = resolution.warnings;

        let placements = layout::plan(&resolution.packages, &roots, &self.deps_dir)?;
        tracing::debug!("Installing {} package(s) into {}", placements.len(), self.deps_dir.display());
        tokio::fs::create_dir_all(&self.deps_dir).await?;

        let downloader = Downloader::new(self.registry.clone(), self.require_integrity);
        let mut downloads = stream::iter(placements)
            .map(|placement| {
                let downloader = &downloader;
                async move {
                    let bytes = downloader.download(&placement.package).await;
                    (placement, bytes)
                }
            })
            .buffered(self.concurrency);

        while let Some((placement, bytes)) = downloads.next().await {
            let installed = self.unpack(placement, &bytes?).await?;
            on_installed(&installed);
            report.installed.push(installed);
        }

        Ok(report)
    }

    /// Resolve every top-level request into one package set, returning the
    /// version each top-level name resolved to
    async fn resolve_all(
        &self,
        requests: &[(String, String)],
    ) -> KilnResult<(Resolution, BTreeMap<String, String>)> {
        let resolver = Resolver::new(self.registry.clone(), self.concurrency);
        let mut merged = Resolution::default();
        let mut roots = BTreeMap::new();
        let mut failed_roots = Vec::new();

        for (name, range) in requests {
            let mut resolution = resolver.resolve(name, range).await;

            match resolution.root.take() {
                Some(root) => {
                    roots.entry(root.name).or_insert(root.version);
                }
                None => {
                    let position = resolution
                        .warnings
                        .iter()
                        .position(|w| &w.package == name && &w.range == range);
                    if let Some(position) = position {
                        let failure = resolution.warnings.remove(position);
                        if !failure.error.is_not_found() {
                            return Err(failure.error);
                        }
                        failed_roots.push(failure);
                    }
                }
            }

            merged.merge(resolution);
        }

        if merged.packages.is_empty() {
            if let Some(failure) = failed_roots.into_iter().next() {
                return Err(failure.error);
            }
        } else {
            merged.warnings.extend(failed_roots);
        }

        Ok((merged, roots))
    }

    /// Decompress, validate and write one package into its directory
    async fn unpack(&self, placement: Placement, bytes: &[u8]) -> KilnResult<InstalledPackage> {
        let Placement { package, dir, primary } = placement;

        let entries = archive::read_archive(&package.name, bytes)?;
        let plan = Extractor::new(package.name.as_str()).plan(entries, &dir)?;

        if tokio::fs::symlink_metadata(&dir).await.is_ok() {
            tokio::fs::remove_dir_all(&dir).await?;
        }
        tokio::fs::create_dir_all(&dir).await?;

        let files = plan.write().await?;
        tracing::debug!("Extracted {}@{} into {}", package.name, package.version, dir.display());

        if primary {
            let linked = bins::link_bins(&self.deps_dir, &package.name, &dir).await?;
            if !linked.is_empty() {
                tracing::debug!("Linked {} for {}", linked.join(", "), package.name);
            }
        }

        Ok(InstalledPackage {
            name: package.name,
            version: package.version,
            dir,
            files,
            primary,
        })
    }
}

/// Split `name@range`. A leading `@` marks a scope and is part of the name;
/// a missing or empty range becomes `latest`.
pub fn parse_package_spec(spec: &str) -> (String, String) {
    let spec = spec.trim();
    let split_at = if let Some(scoped) = spec.strip_prefix('@') {
        scoped.find('@').map(|idx| idx + 1)
    } else {
        spec.find('@')
    };

    match split_at {
        Some(idx) if idx + 1 < spec.len() => (spec[..idx].to_string(), spec[idx + 1..].to_string()),
        Some(idx) => (spec[..idx].to_string(), DEFAULT_RANGE.to_string()),
        None => (spec.to_string(), DEFAULT_RANGE.to_string()),
    }
}
