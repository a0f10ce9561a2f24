//! Subresource-integrity verification for downloaded archives

use sha2::{Digest, Sha256, Sha512};

use crate::core::{KilnError, KilnResult};

/// Hash algorithms kiln can check, strongest first
const SUPPORTED: [&str; 2] = ["sha512", "sha256"];

/// Integrity checker for package verification
pub struct IntegrityChecker;

impl IntegrityChecker {
    /// Verify `data` against an SRI string such as `sha512-<base64>`.
    ///
    /// A string may carry several space-separated hashes; the strongest
    /// supported one is checked. Returns `Ok(false)` when nothing in the
    /// string is checkable (e.g. only `sha1-`).
    pub fn verify(data: &[u8], integrity: &str, package: &str) -> KilnResult<bool> {
        let Some((algorithm, expected)) = Self::strongest(integrity) else {
            return Ok(false);
        };

        let actual = Self::compute_hash(data, algorithm);
        if actual != expected {
            return Err(KilnError::IntegrityCheckFailed {
                package: package.to_string(),
                expected: format!("{}-{}", algorithm, expected),
                actual: format!("{}-{}", algorithm, actual),
            });
        }

        Ok(true)
    }

    /// Compute an SRI string for data
    #[cfg(test)]
    pub fn compute(data: &[u8], algorithm: &str) -> String {
        format!("{}-{}", algorithm, Self::compute_hash(data, algorithm))
    }

    fn strongest(integrity: &str) -> Option<(&'static str, &str)> {
        let parsed: Vec<(&str, &str)> = integrity
            .split_whitespace()
            .filter_map(|token| token.split_once('-'))
            .collect();

        SUPPORTED.iter().find_map(|algorithm| {
            parsed
                .iter()
                .find(|(name, _)| name == algorithm)
                // SRI permits `?options` after the digest
                .map(|&(_, hash)| (*algorithm, hash.split('?').next().unwrap_or(hash)))
        })
    }

    fn compute_hash(data: &[u8], algorithm: &str) -> String {
        use base64::Engine;

        let engine = &base64::engine::general_purpose::STANDARD;
        match algorithm {
            "sha512" => engine.encode(Sha512::digest(data)),
            "sha256" => engine.encode(Sha256::digest(data)),
            _ => String::new(),
        }
    }
}
