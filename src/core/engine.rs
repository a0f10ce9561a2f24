//! Core engine wiring configuration, registry and installer together

use std::path::{Path, PathBuf};
use std::sync::Arc;

use crate::core::{Config, KilnError, KilnResult, Manifest};
use crate::installer::Installer;
use crate::registry::{Registry, RegistryClient};

/// Main engine for Kiln operations
pub struct Engine {
    /// Project root directory
    pub project_dir: PathBuf,

    /// Configuration
    pub config: Config,

    /// Registry the project installs from
    pub registry: Arc<dyn Registry>,
}

impl Engine {
    /// Create a new engine for the given project directory
    pub async fn new(project_dir: &Path) -> KilnResult<Self> {
        let project_dir = project_dir
            .canonicalize()
            .unwrap_or_else(|_| project_dir.to_path_buf());
        let config = Config::load(&project_dir)?;
        let registry = Arc::new(RegistryClient::new(&config.registry, &config.network)?);

        tracing::debug!(
            "Using registry {} for {}",
            config.registry.url,
            project_dir.display()
        );

        Ok(Self::with_registry(project_dir, config, registry))
    }

    /// Create an engine around an existing registry
    pub fn with_registry(project_dir: PathBuf, config: Config, registry: Arc<dyn Registry>) -> Self {
        Self {
            project_dir,
            config,
            registry,
        }
    }

    /// Check if project is initialized
    pub fn is_initialized(&self) -> bool {
        Manifest::path(&self.project_dir).exists()
    }

    /// Ensure project is initialized
    pub fn ensure_initialized(&self) -> KilnResult<()> {
        if !self.is_initialized() {
            return Err(KilnError::NotInitialized);
        }
        Ok(())
    }

    /// Load the project's manifest
    pub async fn manifest(&self) -> KilnResult<Manifest> {
        Manifest::load(&self.project_dir).await
    }

    /// Dependency directory, resolved against the project root
    pub fn dependency_dir(&self) -> PathBuf {
        self.project_dir.join(&self.config.install.dependency_dir)
    }

    /// Create an installer
    pub fn installer(&self) -> Installer {
        Installer::new(
            self.project_dir.clone(),
            self.dependency_dir(),
            self.registry.clone(),
            self.config.network.concurrency,
            self.config.security.require_integrity,
        )
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::registry::memory::MemoryRegistry;
    use tempfile::tempdir;

    #[tokio::test]
    async fn test_engine_paths_and_initialization() {
        let dir = tempdir().unwrap();
        let mut config = Config::default();
        config.install.dependency_dir = PathBuf::from("vendor/js");

        let engine = Engine::with_registry(
            dir.path().to_path_buf(),
            config,
            Arc::new(MemoryRegistry::new()),
        );

        assert!(!engine.is_initialized());
        assert!(matches!(engine.ensure_initialized(), Err(KilnError::NotInitialized)));
        assert_eq!(engine.dependency_dir(), dir.path().join("vendor/js"));

        Manifest::new("demo").save(dir.path()).await.unwrap();
        assert!(engine.ensure_initialized().is_ok());
        assert_eq!(engine.manifest().await.unwrap().name, "demo");
    }
}
