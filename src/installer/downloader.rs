//! Package archive downloader

use std::sync::Arc;

use crate::core::{KilnError, KilnResult};
use crate::registry::Registry;
use crate::resolver::ResolvedPackage;
use crate::security::IntegrityChecker;

/// Fetches archives and checks them against the registry's integrity hash
pub struct Downloader {
    registry: Arc<dyn Registry>,

    /// Fail when the registry publishes no checkable hash
    require_integrity: bool,
}

impl Downloader {
    /// Create a new downloader
    pub fn new(registry: Arc<dyn Registry>, require_integrity: bool) -> Self {
        Self {
            registry,
            require_integrity,
        }
    }

    /// Download a single package's compressed archive
    pub async fn download(&self, package: &ResolvedPackage) -> KilnResult<Vec<u8>> {
        if package.tarball_url.is_empty() {
            return Err(KilnError::registry(format!(
                "{}@{} has no archive URL",
                package.name, package.version
            )));
        }

        let bytes = self.registry.fetch_archive(&package.tarball_url).await?;
        tracing::debug!(
            "Downloaded {}@{} ({} bytes)",
            package.name,
            package.version,
            bytes.len()
        );

        let verified = match package.integrity.as_deref() {
            Some(integrity) => IntegrityChecker::verify(&bytes, integrity, &package.name)?,
            None => false,
        };

        if !verified {
            if self.require_integrity {
                return Err(KilnError::IntegrityCheckFailed {
                    package: package.name.clone(),
                    expected: "a sha512 or sha256 integrity hash".to_string(),
                    actual: package.integrity.clone().unwrap_or_else(|| "none".to_string()),
                });
            }
            tracing::debug!("No checkable integrity for {}@{}", package.name, package.version);
        }

        Ok(bytes)
    }
}
