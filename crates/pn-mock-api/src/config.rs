use std::path::Path;
use std::sync::Arc;

use anyhow::{Context, Result};
use pn_mock_core::{DomainEnv, DomainError, StaticKeyGate};
use serde::{Deserialize, Serialize};
use time::Duration;

pub const DEFAULT_UPLOAD_TO_S3_URL: &str = "http://localhost:3000/upload";
pub const DEFAULT_DOWNLOAD_DOCUMENT_URL: &str = "http://localhost:3000/download";

/// Runtime settings of the mock, usually read from a YAML file.
///
/// ```yaml
/// api_keys: [key-a, key-b]
/// upload_to_s3_url: http://localhost:3000/upload
/// download_document_url: http://localhost:3000/download
/// consume_retry_after_ms: 0
/// ```
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(deny_unknown_fields)]
pub struct MockConfig {
    #[serde(default)]
    pub api_keys: Vec<String>,
    #[serde(default = "default_upload_to_s3_url")]
    pub upload_to_s3_url: String,
    #[serde(default = "default_download_document_url")]
    pub download_document_url: String,
    #[serde(default)]
    pub consume_retry_after_ms: u64,
}

fn default_upload_to_s3_url() -> String {
    DEFAULT_UPLOAD_TO_S3_URL.to_string()
}

fn default_download_document_url() -> String {
    DEFAULT_DOWNLOAD_DOCUMENT_URL.to_string()
}

impl Default for MockConfig {
    fn default() -> Self {
        Self {
            api_keys: Vec::new(),
            upload_to_s3_url: default_upload_to_s3_url(),
            download_document_url: default_download_document_url(),
            consume_retry_after_ms: 0,
        }
    }
}

impl MockConfig {
    /// Read and validate a YAML configuration file.
    ///
    /// # Errors
    /// Returns an error when the file cannot be read, is not valid YAML for this shape, or
    /// fails [`MockConfig::validate`].
    pub fn load(path: &Path) -> Result<Self> {
        let raw = std::fs::read_to_string(path)
            .with_context(|| format!("failed to read config file {}", path.display()))?;
        let config: Self = serde_yaml::from_str(&raw)
            .with_context(|| format!("failed to parse config file {}", path.display()))?;
        config.validate()?;
        Ok(config)
    }

    /// # Errors
    /// Returns [`DomainError::Config`] for blank API keys, or [`DomainError::InvalidUrl`] for
    /// URLs that do not parse.
    pub fn validate(&self) -> Result<(), DomainError> {
        if self.api_keys.iter().any(|key| key.trim().is_empty()) {
            return Err(DomainError::Config("api_keys must not contain blank entries".to_string()));
        }
        self.domain_env().map(|_| ())
    }

    /// Build the use-case environment: system clock, ULID ids and a static key gate.
    ///
    /// # Errors
    /// Returns [`DomainError::InvalidUrl`] when either URL does not parse.
    pub fn domain_env(&self) -> Result<DomainEnv, DomainError> {
        let retry_after = i64::try_from(self.consume_retry_after_ms)
            .map(Duration::milliseconds)
            .map_err(|_| {
                DomainError::Config("consume_retry_after_ms is out of range".to_string())
            })?;

        Ok(DomainEnv::new(
            Arc::new(StaticKeyGate::new(self.api_keys.iter().cloned())),
            &self.upload_to_s3_url,
            &self.download_document_url,
        )?
        .with_consume_retry_after(retry_after))
    }
}
