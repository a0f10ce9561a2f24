//! Package registry access

pub mod client;
pub mod types;

#[cfg(test)]
pub mod memory;

use async_trait::async_trait;

use crate::core::KilnResult;

pub use client::RegistryClient;
pub use types::PackageMetadata;

/// Source of package metadata and archives
#[async_trait]
pub trait Registry: Send + Sync {
    /// Fetch the full metadata document for a package.
    ///
    /// Fails with `PackageNotFound` when the registry does not know the name.
    async fn fetch_metadata(&self, name: &str) -> KilnResult<PackageMetadata>;

    /// Download an archive by URL
    async fn fetch_archive(&self, url: &str) -> KilnResult<Vec<u8>>;
}
