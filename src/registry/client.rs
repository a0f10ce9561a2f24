//! Registry HTTP client

use std::future::Future;
use std::time::Duration;

use async_trait::async_trait;
use reqwest::header::{HeaderMap, HeaderValue, ACCEPT, USER_AGENT};

use crate::core::config::{NetworkConfig, RegistryConfig};
use crate::core::{KilnError, KilnResult};
use crate::registry::types::PackageMetadata;
use crate::registry::Registry;

/// npm registry client
pub struct RegistryClient {
    /// HTTP client
    client: reqwest::Client,
    /// Registry configuration
    config: RegistryConfig,
    /// Deadline for each request
    timeout: Duration,
}

impl RegistryClient {
    /// Create a new registry client
    pub fn new(config: &RegistryConfig, network: &NetworkConfig) -> KilnResult<Self> {
        let timeout = Duration::from_secs(network.timeout);

        let mut headers = HeaderMap::new();
        headers.insert(ACCEPT, HeaderValue::from_static("application/json"));
        headers.insert(
            USER_AGENT,
            HeaderValue::from_static(concat!("kiln/", env!("CARGO_PKG_VERSION"))),
        );

        let client = reqwest::Client::builder()
            .default_headers(headers)
            .timeout(timeout)
            .gzip(true)
            .brotli(true)
            .build()
            .map_err(|e| KilnError::Network(e.to_string()))?;

        Ok(Self {
            client,
            config: config.clone(),
            timeout,
        })
    }

    /// Get the URL for a package
    fn get_package_url(&self, name: &str) -> String {
        let registry = self.get_registry_for_package(name).trim_end_matches('/');

        // Handle scoped packages
        let encoded_name = if name.starts_with('@') {
            name.replace('/', "%2f")
        } else {
            name.to_string()
        };

        format!("{}/{}", registry, encoded_name)
    }

    /// Get the registry URL for a package (handles scoped overrides)
    fn get_registry_for_package(&self, name: &str) -> &str {
        if name.starts_with('@') {
            if let Some(scope) = name.split('/').next() {
                if let Some(registry) = self.config.scopes.get(scope) {
                    return registry;
                }
            }
        }

        &self.config.url
    }

    /// Run a request future under the configured deadline
    async fn with_deadline<T, F>(&self, what: &str, fut: F) -> KilnResult<T>
    where
        F: Future<Output = KilnResult<T>>,
    {
        tokio::time::timeout(self.timeout, fut)
            .await
            .map_err(|_| KilnError::Timeout(what.to_string()))?
    }
}

fn network_error(what: &str, err: reqwest::Error) -> KilnError {
    if err.is_timeout() {
        KilnError::Timeout(what.to_string())
    } else {
        KilnError::Network(format!("{}: {}", what, err))
    }
}

#[async_trait]
impl Registry for RegistryClient {
    async fn fetch_metadata(&self, name: &str) -> KilnResult<PackageMetadata> {
        let url = self.get_package_url(name);
        let what = format!("fetching metadata for {}", name);
        tracing::debug!("GET {}", url);

        self.with_deadline(&what, async {
            let response = self
                .client
                .get(&url)
                .send()
                .await
                .map_err(|e| network_error(&what, e))?;

            if !response.status().is_success() {
                if response.status() == reqwest::StatusCode::NOT_FOUND {
                    return Err(KilnError::PackageNotFound(name.to_string()));
                }
                return Err(KilnError::registry(format!(
                    "Failed to fetch {}: HTTP {}",
                    name,
                    response.status()
                )));
            }

            let text = response.text().await.map_err(|e| network_error(&what, e))?;
            Ok::<PackageMetadata, KilnError>(serde_json::from_str(&text)?)
        })
        .await
    }

    async fn fetch_archive(&self, url: &str) -> KilnResult<Vec<u8>> {
        let what = format!("downloading {}", url);
        tracing::debug!("GET {}", url);

        self.with_deadline(&what, async {
            let response = self
                .client
                .get(url)
                .send()
                .await
                .map_err(|e| network_error(&what, e))?;

            if !response.status().is_success() {
                return Err(KilnError::Network(format!(
                    "Failed to download {}: HTTP {}",
                    url,
                    response.status()
                )));
            }

            let bytes = response.bytes().await.map_err(|e| network_error(&what, e))?;
            Ok::<Vec<u8>, KilnError>(bytes.to_vec())
        })
        .await
    }
}
