//! Registry response types

use std::collections::BTreeMap;
use serde::{Deserialize, Serialize};

/// Package metadata from an npm-compatible registry
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct PackageMetadata {
    /// Package name
    pub name: String,

    /// Distribution tags (latest, next, etc.)
    #[serde(default, rename = "dist-tags")]
    pub dist_tags: BTreeMap<String, String>,

    /// All versions metadata
    #[serde(default)]
    pub versions: BTreeMap<String, VersionMetadata>,
}

impl PackageMetadata {
    /// The version the `latest` dist-tag points at
    pub fn latest(&self) -> Option<&str> {
        self.dist_tags.get("latest").map(String::as_str)
    }

    /// All published version strings
    pub fn version_list(&self) -> Vec<&str> {
        self.versions.keys().map(String::as_str).collect()
    }
}

/// Version-specific metadata
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct VersionMetadata {
    /// Package name
    #[serde(default)]
    pub name: String,

    /// Version string
    #[serde(default)]
    pub version: String,

    /// Distribution info
    #[serde(default)]
    pub dist: DistInfo,

    /// Dependencies
    #[serde(default)]
    pub dependencies: BTreeMap<String, String>,

    /// Deprecated message
    #[serde(default, deserialize_with = "deprecation")]
    pub deprecated: Option<String>,
}

/// Distribution information
#[derive(Debug, Clone, Default, Deserialize, Serialize)]
pub struct DistInfo {
    /// Tarball URL
    #[serde(default)]
    pub tarball: String,

    /// Subresource-integrity string (`sha512-...`)
    #[serde(default)]
    pub integrity: Option<String>,

    /// SHA-1 hex digest (legacy)
    #[serde(default)]
    pub shasum: Option<String>,
}

// Registries publish `"deprecated": false` as well as a message string.
fn deprecation<'de, D>(deserializer: D) -> Result<Option<String>, D::Error>
where
    D: serde::Deserializer<'de>,
{
    Ok(match serde_json::Value::deserialize(deserializer)? {
        serde_json::Value::String(message) => Some(message),
        _ => None,
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_parse_registry_document() {
        let json = r#"{
            "name": "left-pad",
            "dist-tags": { "latest": "1.3.0" },
            "versions": {
                "1.3.0": {
                    "name": "left-pad",
                    "version": "1.3.0",
                    "dependencies": { "pad-core": "^2.0.0" },
                    "deprecated": "use String.prototype.padStart()",
                    "dist": {
                        "tarball": "https://registry.example/left-pad/-/left-pad-1.3.0.tgz",
                        "shasum": "5b8a3a7765dfe001261dde915589e782f8c94d1e",
                        "integrity": "sha512-abc"
                    }
                },
                "1.2.0": { "deprecated": false, "dist": { "tarball": "x" } }
            }
        }"#;

        let metadata: PackageMetadata = serde_json::from_str(json).unwrap();
        assert_eq!(metadata.latest(), Some("1.3.0"));
        assert_eq!(metadata.version_list(), vec!["1.2.0", "1.3.0"]);

        let v = &metadata.versions["1.3.0"];
        assert_eq!(v.dependencies["pad-core"], "^2.0.0");
        assert_eq!(v.dist.integrity.as_deref(), Some("sha512-abc"));
        assert!(v.deprecated.is_some());
        assert!(metadata.versions["1.2.0"].deprecated.is_none());
    }
}
