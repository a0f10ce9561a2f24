//! Project manifest (`package.json`) handling

use std::collections::BTreeMap;
use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::core::{KilnError, KilnResult};

/// File name of the manifest at the project root
pub const MANIFEST_FILE: &str = "package.json";

/// package.json structure
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Manifest {
    /// Package name
    #[serde(default)]
    pub name: String,

    /// Package version
    #[serde(default = "default_version")]
    pub version: String,

    #[serde(default, skip_serializing_if = "String::is_empty")]
    pub description: String,

    /// Main entry point
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub main: Option<String>,

    /// Package type (commonjs or module)
    #[serde(default, skip_serializing_if = "Option::is_none", rename = "type")]
    pub package_type: Option<String>,

    /// Scripts
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty")]
    pub scripts: BTreeMap<String, String>,

    /// Dependencies
    #[serde(default)]
    pub dependencies: BTreeMap<String, String>,

    /// Dev dependencies
    #[serde(default, skip_serializing_if = "BTreeMap::is_empty", rename = "devDependencies")]
    pub dev_dependencies: BTreeMap<String, String>,

    /// Other fields (preserved during round-trip)
    #[serde(flatten)]
    pub other: BTreeMap<String, serde_json::Value>,
}

fn default_version() -> String {
    "1.0.0".to_string()
}

impl Manifest {
    /// Path of the manifest inside a project directory
    pub fn path(project_dir: &Path) -> PathBuf {
        project_dir.join(MANIFEST_FILE)
    }

    /// Load the manifest from a project directory
    pub async fn load(project_dir: &Path) -> KilnResult<Self> {
        let path = Self::path(project_dir);

        let content = match tokio::fs::read_to_string(&path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return Err(KilnError::NotInitialized)
            }
            Err(e) => return Err(e.into()),
        };

        serde_json::from_str(&content).map_err(|e| KilnError::InvalidManifest {
            path,
            reason: e.to_string(),
        })
    }

    /// Save the manifest to a project directory
    pub async fn save(&self, project_dir: &Path) -> KilnResult<()> {
        let mut content = serde_json::to_string_pretty(self)?;
        content.push('\n');
        tokio::fs::write(Self::path(project_dir), content).await?;
        Ok(())
    }

    /// Create a new minimal manifest
    pub fn new(name: &str) -> Self {
        let mut scripts = BTreeMap::new();
        scripts.insert(
            "test".to_string(),
            "echo \"Error: no test specified\" && exit 1".to_string(),
        );

        Self {
            name: name.to_string(),
            version: default_version(),
            description: String::new(),
            main: Some("index.js".to_string()),
            package_type: None,
            scripts,
            dependencies: BTreeMap::new(),
            dev_dependencies: BTreeMap::new(),
            other: BTreeMap::new(),
        }
    }

    /// Add or overwrite a dependency. A name moves between the two maps
    /// when `dev` changes.
    pub fn add_dependency(&mut self, name: &str, range: &str, dev: bool) {
        let (target, other) = if dev {
            (&mut self.dev_dependencies, &mut self.dependencies)
        } else {
            (&mut self.dependencies, &mut self.dev_dependencies)
        };
        other.remove(name);
        target.insert(name.to_string(), range.to_string());
    }

    /// Remove a dependency from both maps; true if it was present
    pub fn remove_dependency(&mut self, name: &str) -> bool {
        let regular = self.dependencies.remove(name).is_some();
        let dev = self.dev_dependencies.remove(name).is_some();
        regular || dev
    }

    /// Regular and dev dependencies combined; a regular entry wins a tie
    pub fn all_dependencies(&self) -> BTreeMap<String, String> {
        let mut deps = self.dev_dependencies.clone();
        deps.extend(self.dependencies.clone());
        deps
    }

    /// Get production dependencies only
    pub fn production_dependencies(&self) -> BTreeMap<String, String> {
        self.dependencies.clone()
    }
}

impl Default for Manifest {
    fn default() -> Self {
        Self::new("my-project")
    }
}
