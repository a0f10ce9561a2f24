//! Dependency resolver for Kiln
//!
//! Breadth-first, best-effort resolution: every `name@range` request is
//! looked up once, the best matching version is recorded under its
//! `name@version` key, and its dependencies are queued. A request that cannot
//! be resolved becomes a warning; it never stops its siblings.

pub mod version;

use std::collections::{BTreeMap, HashSet, VecDeque};
use std::fmt;
use std::sync::Arc;

use futures::stream::{FuturesUnordered, StreamExt};

use crate::core::{KilnError, KilnResult};
use crate::registry::{PackageMetadata, Registry};

pub use version::{max_satisfying, satisfies, VersionRange};

/// Identity of one concrete package version
#[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct PackageKey {
    pub name: String,
    pub version: String,
}

impl fmt::Display for PackageKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}@{}", self.name, self.version)
    }
}

/// A resolved package with the metadata needed to install it
#[derive(Debug, Clone)]
pub struct ResolvedPackage {
    pub name: String,
    pub version: String,
    pub tarball_url: String,
    pub integrity: Option<String>,
    pub dependencies: BTreeMap<String, String>,
}

impl ResolvedPackage {
    pub fn key(&self) -> PackageKey {
        PackageKey {
            name: self.name.clone(),
            version: self.version.clone(),
        }
    }
}

/// A dependency request that could not be resolved
#[derive(Debug)]
pub struct ResolutionWarning {
    pub package: String,
    pub range: String,
    pub error: KilnError,
}

impl fmt::Display for ResolutionWarning {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "could not resolve {}@{}: {}", self.package, self.range, self.error)
    }
}

/// Outcome of resolving one root request
#[derive(Debug, Default)]
pub struct Resolution {
    /// What the root request itself resolved to
    pub root: Option<PackageKey>,

    /// Every package reached from the root, keyed by `name@version`
    pub packages: BTreeMap<PackageKey, ResolvedPackage>,

    /// Requests that were skipped
    pub warnings: Vec<ResolutionWarning>,
}

impl Resolution {
    /// Fold another resolution's packages and warnings into this one.
    /// Packages already present are kept.
    pub fn merge(&mut self, other: Resolution) {
        for (key, package) in other.packages {
            self.packages.entry(key).or_insert(package);
        }
        self.warnings.extend(other.warnings);
    }
}

/// Dependency resolver
pub struct Resolver {
    registry: Arc<dyn Registry>,
    concurrency: usize,
}

impl Resolver {
    /// Create a new resolver issuing at most `concurrency` metadata requests
    /// at a time
    pub fn new(registry: Arc<dyn Registry>, concurrency: usize) -> Self {
        Self {
            registry,
            concurrency: concurrency.max(1),
        }
    }

    /// Resolve `name@range` and everything it transitively depends on
    pub async fn resolve(&self, name: &str, range: &str) -> Resolution {
        let mut resolution = Resolution::default();
        let mut queue: VecDeque<(String, String)> = VecDeque::new();
        let mut seen: HashSet<String> = HashSet::new();
        let mut in_flight = FuturesUnordered::new();

        queue.push_back((name.to_string(), range.to_string()));
        let mut root_pending = true;

        loop {
            // Only this task touches `seen`, so check-and-insert is atomic
            // with respect to the fetches in flight.
            while in_flight.len() < self.concurrency {
                let Some((name, range)) = queue.pop_front() else {
                    break;
                };
                if !seen.insert(format!("{}@{}", name, range)) {
                    continue;
                }

                let is_root = std::mem::take(&mut root_pending);
                let registry = self.registry.clone();
                in_flight.push(async move {
                    let metadata = registry.fetch_metadata(&name).await;
                    (name, range, is_root, metadata)
                });
            }

            let Some((name, range, is_root, metadata)) = in_flight.next().await else {
                break;
            };

            match metadata.and_then(|metadata| select_version(&metadata, &name, &range)) {
                Ok(package) => {
                    tracing::debug!("Resolved {}@{} to {}", name, range, package.version);
                    let key = package.key();
                    if is_root {
                        resolution.root = Some(key.clone());
                    }
                    for (dep_name, dep_range) in &package.dependencies {
                        queue.push_back((dep_name.clone(), dep_range.clone()));
                    }
                    resolution.packages.entry(key).or_insert(package);
                }
                Err(error) => {
                    tracing::warn!("Could not resolve {}@{}: {}", name, range, error);
                    resolution.warnings.push(ResolutionWarning {
                        package: name,
                        range,
                        error,
                    });
                }
            }
        }

        resolution
    }
}

/// Choose the version of `name` that `range` selects
fn select_version(metadata: &PackageMetadata, name: &str, range: &str) -> KilnResult<ResolvedPackage> {
    let range = range.trim();

    let chosen = if version::is_wildcard(range) {
        metadata
            .latest()
            .map(str::to_string)
            .or_else(|| max_satisfying(&metadata.version_list(), "*"))
    } else if let Some(tagged) = metadata.dist_tags.get(range) {
        Some(tagged.clone())
    } else {
        max_satisfying(&metadata.version_list(), range)
    };

    let not_found = || KilnError::VersionNotFound {
        package: name.to_string(),
        range: range.to_string(),
    };

    let version = chosen.ok_or_else(not_found)?;
    let descriptor = metadata.versions.get(&version).ok_or_else(not_found)?;

    if let Some(ref message) = descriptor.deprecated {
        tracing::warn!("{}@{} is deprecated: {}", name, version, message);
    }

    Ok(ResolvedPackage {
        name: name.to_string(),
        version,
        tarball_url: descriptor.dist.tarball.clone(),
        integrity: descriptor.dist.integrity.clone(),
        dependencies: descriptor.dependencies.clone(),
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::memory::MemoryRegistry;

    fn key(name: &str, version: &str) -> PackageKey {
        PackageKey {
            name: name.to_string(),
            version: version.to_string(),
        }
    }

    fn resolver(registry: MemoryRegistry) -> Resolver {
        Resolver::new(Arc::new(registry), 4)
    }

    #[tokio::test]
    async fn test_resolves_transitive_dependency() {
        let mut registry = MemoryRegistry::new();
        registry
            .publish_simple("a", "1.0.0", &[("b", "^1.0.0")])
            .publish_simple("b", "1.0.0", &[])
            .publish_simple("b", "1.1.0", &[])
            .publish_simple("b", "2.0.0", &[]);

        let resolution = resolver(registry).resolve("a", "latest").await;

        assert_eq!(resolution.root, Some(key("a", "1.0.0")));
        assert!(resolution.warnings.is_empty());
        let keys: Vec<_> = resolution.packages.keys().cloned().collect();
        assert_eq!(keys, vec![key("a", "1.0.0"), key("b", "1.1.0")]);
    }

    #[tokio::test]
    async fn test_missing_transitive_dependency_is_a_warning() {
        let mut registry = MemoryRegistry::new();
        registry
            .publish_simple("app", "1.0.0", &[("ghost", "^1.0.0"), ("real", "~2.1.0")])
            .publish_simple("real", "2.1.4", &[])
            .publish_simple("real", "2.2.0", &[]);

        let resolution = resolver(registry).resolve("app", "^1.0.0").await;

        assert_eq!(resolution.root, Some(key("app", "1.0.0")));
        assert!(resolution.packages.contains_key(&key("real", "2.1.4")));
        assert_eq!(resolution.warnings.len(), 1);
        assert_eq!(resolution.warnings[0].package, "ghost");
        assert!(matches!(resolution.warnings[0].error, KilnError::PackageNotFound(_)));
    }

    #[tokio::test]
    async fn test_unsatisfiable_range() {
        let mut registry = MemoryRegistry::new();
        registry.publish_simple("a", "1.0.0", &[]);

        let resolution = resolver(registry).resolve("a", "^2.0.0").await;

        assert!(resolution.root.is_none());
        assert!(resolution.packages.is_empty());
        assert!(resolution.warnings[0].error.is_not_found());
    }

    #[tokio::test]
    async fn test_cycles_terminate_and_requests_are_deduplicated() {
        let mut registry = MemoryRegistry::new();
        registry
            .publish_simple("a", "1.0.0", &[("b", "^1.0.0"), ("c", "^1.0.0")])
            .publish_simple("b", "1.0.0", &[("a", "^1.0.0"), ("c", "^1.0.0")])
            .publish_simple("c", "1.0.0", &[("a", "^1.0.0")]);
        let registry = Arc::new(registry);

        let resolution = Resolver::new(registry.clone(), 1).resolve("a", "^1.0.0").await;

        assert_eq!(resolution.packages.len(), 3);
        // a@^1.0.0, b@^1.0.0, c@^1.0.0: one lookup each
        assert_eq!(registry.metadata_requests(), 3);
    }

    #[tokio::test]
    async fn test_shared_dependency_is_fetched_once_with_parallel_fetches() {
        let mut registry = MemoryRegistry::new();
        registry
            .publish_simple("a", "1.0.0", &[("b", "^1.0.0"), ("c", "^1.0.0")])
            .publish_simple("b", "1.0.0", &[("d", "^1.0.0")])
            .publish_simple("c", "1.0.0", &[("d", "^1.0.0")])
            .publish_simple("d", "1.2.0", &[]);
        let registry = Arc::new(registry);

        let resolution = Resolver::new(registry.clone(), 4).resolve("a", "^1.0.0").await;

        assert!(resolution.warnings.is_empty());
        assert_eq!(resolution.packages.len(), 4);
        assert_eq!(registry.metadata_requests(), 4);
        let d_versions: Vec<_> = resolution.packages.keys().filter(|k| k.name == "d").collect();
        assert_eq!(d_versions, vec![&key("d", "1.2.0")]);
    }

    #[tokio::test]
    async fn test_distinct_ranges_keep_distinct_versions() {
        let mut registry = MemoryRegistry::new();
        registry
            .publish_simple("app", "1.0.0", &[("lib", "^1.0.0"), ("mid", "^1.0.0")])
            .publish_simple("mid", "1.0.0", &[("lib", "^2.0.0")])
            .publish_simple("lib", "1.4.0", &[])
            .publish_simple("lib", "2.3.0", &[]);

        let resolution = resolver(registry).resolve("app", "1.0.0").await;

        assert!(resolution.packages.contains_key(&key("lib", "1.4.0")));
        assert!(resolution.packages.contains_key(&key("lib", "2.3.0")));
    }

    #[tokio::test]
    async fn test_dist_tag_and_latest() {
        let mut registry = MemoryRegistry::new();
        registry
            .publish_simple("a", "1.0.0", &[])
            .publish_simple("a", "2.0.0-beta.1", &[]);
        {
            let metadata = registry.metadata_mut("a");
            metadata.dist_tags.insert("latest".to_string(), "1.0.0".to_string());
            metadata.dist_tags.insert("next".to_string(), "2.0.0-beta.1".to_string());
        }
        let registry = Arc::new(registry);
        let resolver = Resolver::new(registry, 2);

        assert_eq!(resolver.resolve("a", "").await.root, Some(key("a", "1.0.0")));
        assert_eq!(resolver.resolve("a", "*").await.root, Some(key("a", "1.0.0")));
        assert_eq!(
            resolver.resolve("a", "next").await.root,
            Some(key("a", "2.0.0-beta.1"))
        );
    }

    #[test]
    fn test_merge_keeps_existing() {
        let package = |url: &str| ResolvedPackage {
            name: "a".to_string(),
            version: "1.0.0".to_string(),
            tarball_url: url.to_string(),
            integrity: None,
            dependencies: BTreeMap::new(),
        };

        let mut first = Resolution::default();
        first.packages.insert(key("a", "1.0.0"), package("first"));
        let mut second = Resolution::default();
        second.packages.insert(key("a", "1.0.0"), package("second"));

        first.merge(second);
        assert_eq!(first.packages[&key("a", "1.0.0")].tarball_url, "first");
    }
}
