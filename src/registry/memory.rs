//! In-memory registry used by the test suites

use std::collections::{BTreeMap, HashMap};
use std::io::Write;
use std::sync::atomic::{AtomicUsize, Ordering};

use async_trait::async_trait;
use flate2::write::GzEncoder;
use flate2::Compression;

use crate::core::{KilnError, KilnResult};
use crate::registry::types::{DistInfo, PackageMetadata, VersionMetadata};
use crate::registry::Registry;

/// A registry that serves metadata and archives from memory
#[derive(Default)]
pub struct MemoryRegistry {
    packages: HashMap<String, PackageMetadata>,
    archives: HashMap<String, Vec<u8>>,
    metadata_requests: AtomicUsize,
}

impl MemoryRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Publish `name@version` with the given dependencies and archive bytes.
    /// The newest published version becomes `latest`.
    pub fn publish(
        &mut self,
        name: &str,
        version: &str,
        dependencies: &[(&str, &str)],
        archive: Vec<u8>,
    ) -> &mut Self {
        let url = format!("mem://{}/-/{}.tgz", name, version);
        let metadata = self
            .packages
            .entry(name.to_string())
            .or_insert_with(|| PackageMetadata {
                name: name.to_string(),
                ..Default::default()
            });

        metadata
            .dist_tags
            .insert("latest".to_string(), version.to_string());
        metadata.versions.insert(
            version.to_string(),
            VersionMetadata {
                name: name.to_string(),
                version: version.to_string(),
                dist: DistInfo {
                    tarball: url.clone(),
                    integrity: None,
                    shasum: None,
                },
                dependencies: dependencies
                    .iter()
                    .map(|(n, r)| (n.to_string(), r.to_string()))
                    .collect::<BTreeMap<_, _>>(),
                deprecated: None,
            },
        );
        self.archives.insert(url, archive);
        self
    }

    /// Publish a version whose archive holds a single `package.json`
    pub fn publish_simple(&mut self, name: &str, version: &str, dependencies: &[(&str, &str)]) -> &mut Self {
        let manifest = format!(r#"{{"name":"{}","version":"{}"}}"#, name, version);
        let archive = tarball(&[("package/package.json", manifest.as_bytes())]);
        self.publish(name, version, dependencies, archive)
    }

    /// Mutable access to a published package's metadata
    pub fn metadata_mut(&mut self, name: &str) -> &mut PackageMetadata {
        self.packages.get_mut(name).expect("package was published")
    }

    pub fn metadata_requests(&self) -> usize {
        self.metadata_requests.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl Registry for MemoryRegistry {
    async fn fetch_metadata(&self, name: &str) -> KilnResult<PackageMetadata> {
        self.metadata_requests.fetch_add(1, Ordering::SeqCst);
        self.packages
            .get(name)
            .cloned()
            .ok_or_else(|| KilnError::PackageNotFound(name.to_string()))
    }

    async fn fetch_archive(&self, url: &str) -> KilnResult<Vec<u8>> {
        self.archives
            .get(url)
            .cloned()
            .ok_or_else(|| KilnError::Network(format!("Failed to download {}: HTTP 404", url)))
    }
}

/// Build a gzip-compressed ustar archive of regular files with the `tar` crate
pub fn tarball(files: &[(&str, &[u8])]) -> Vec<u8> {
    let mut builder = tar::Builder::new(Vec::new());
    for (path, data) in files {
        let mut header = tar::Header::new_ustar();
        header.set_size(data.len() as u64);
        header.set_mode(0o644);
        header.set_cksum();
        builder.append_data(&mut header, path, *data).unwrap();
    }
    gzip(&builder.into_inner().unwrap())
}

pub fn gzip(data: &[u8]) -> Vec<u8> {
    let mut encoder = GzEncoder::new(Vec::new(), Compression::default());
    encoder.write_all(data).unwrap();
    encoder.finish().unwrap()
}
