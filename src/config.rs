use crate::grant::MIN_SECRET_LENGTH;
use anyhow::Result;
use base64::Engine as _;
use base64::engine::general_purpose::STANDARD;
use clap::Parser;
use serde::{Deserialize, Serialize};
use std::path::Path;

/// Main configuration structure that can be loaded from CLI or config file
///
/// Example configuration file content
/// # Media Gateway Configuration
///
/// # Server configuration
/// listen_on_port = 32145
/// internal_port = 32146
/// public_base_url = "https://media.example.com"
/// workspace = "./data"
///
/// # Credential secrets (base64, at least 32 bytes decoded)
/// signing_secret = "c2lnbmluZy1zZWNyZXQtc2lnbmluZy1zZWNyZXQtMDE="
/// stream_secret = "c3RyZWFtLXNlY3JldC1zdHJlYW0tc2VjcmV0LTAxMjM0="
///
/// # Storage configuration
/// storage_backend = "s3"  # Options: "local" or "s3"
///
/// # S3 configuration (required when storage_backend = "s3")
/// s3_bucket = "my-media-bucket"
/// s3_endpoint = "http://localhost:9000"  # Optional: for MinIO or custom S3
/// s3_region = "us-east-1"                # Optional
/// s3_access_key_id = "minioadmin"
/// s3_secret_access_key = "minioadmin"
///
/// # Collaborators (optional)
/// entitlement_url = "https://app.example.com/internal/entitlements"
/// audit_webhook_url = "https://audit.example.com/events"
#[derive(Debug, Clone, Serialize, Deserialize, Parser)]
#[command(version, about, long_about = None)]
#[serde(default)]
pub struct Config {
    /// Port the external media listener binds
    #[arg(short, long, default_value_t = 32145)]
    #[serde(default = "default_port")]
    pub listen_on_port: u16,

    /// Port the internal grant-minting listener binds
    #[arg(short, long, default_value_t = 32146)]
    #[serde(default = "default_internal_port")]
    pub internal_port: u16,

    /// Public base URL wrapped media URLs are issued under
    #[arg(short = 'b', long, default_value_t = default_public_base_url())]
    #[serde(default = "default_public_base_url")]
    pub public_base_url: String,

    /// Working directory backing local storage
    #[arg(short = 'w', long, default_value = ".")]
    #[serde(default = "default_workspace")]
    pub workspace: String,

    /// Configuration file path (merged under CLI arguments)
    #[arg(short, long)]
    #[serde(skip)]
    pub config: Option<String>,

    /// Grant signing secret, base64 (required, at least 32 bytes decoded)
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signing_secret: Option<String>,

    /// Streaming-provider shared secret, base64 (optional; stream grants
    /// are refused when unset)
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub stream_secret: Option<String>,

    /// Storage backend: local or s3
    #[arg(short, long, default_value = "local")]
    #[serde(default = "default_storage_backend")]
    pub storage_backend: String,

    /// S3 bucket name (required when storage-backend is s3)
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub s3_bucket: Option<String>,

    /// S3 endpoint (for MinIO/custom S3)
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub s3_endpoint: Option<String>,

    /// S3 region
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub s3_region: Option<String>,

    /// S3 access key ID
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub s3_access_key_id: Option<String>,

    /// S3 secret access key
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub s3_secret_access_key: Option<String>,

    /// Entitlement service URL; when unset every mint request is treated
    /// as already entitled by the caller
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub entitlement_url: Option<String>,

    /// Audit webhook receiving access log entries, best-effort
    #[arg(long)]
    #[serde(skip_serializing_if = "Option::is_none")]
    pub audit_webhook_url: Option<String>,
}

impl Default for Config {
    fn default() -> Self {
        Self {
            listen_on_port: default_port(),
            internal_port: default_internal_port(),
            public_base_url: default_public_base_url(),
            workspace: default_workspace(),
            config: None,
            signing_secret: None,
            stream_secret: None,
            storage_backend: default_storage_backend(),
            s3_bucket: None,
            s3_endpoint: None,
            s3_region: None,
            s3_access_key_id: None,
            s3_secret_access_key: None,
            entitlement_url: None,
            audit_webhook_url: None,
        }
    }
}

impl Config {
    /// Load configuration from CLI args, optionally merging with a config file
    pub fn load() -> Result<Self> {
        // First parse CLI args
        let mut config = Config::parse();

        // If a config file is specified, load it and merge
        if let Some(config_path) = &config.config {
            let file_config = Self::from_file(Path::new(config_path))?;
            config = config.merge_with_file(file_config);
        }

        config.validate()?;
        Ok(config)
    }

    /// Load configuration from a TOML file
    pub fn from_file(path: &Path) -> Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: Config = toml::from_str(&content)?;
        Ok(config)
    }

    /// Merge with file config, CLI args take precedence
    fn merge_with_file(mut self, file_config: Config) -> Self {
        // If CLI value is default, use file value
        if self.listen_on_port == default_port() {
            self.listen_on_port = file_config.listen_on_port;
        }
        if self.internal_port == default_internal_port() {
            self.internal_port = file_config.internal_port;
        }
        if self.public_base_url == default_public_base_url() {
            self.public_base_url = file_config.public_base_url;
        }
        if self.workspace == default_workspace() {
            self.workspace = file_config.workspace;
        }
        if self.storage_backend == default_storage_backend() {
            self.storage_backend = file_config.storage_backend;
        }

        // For Option fields, CLI takes precedence if Some
        if self.signing_secret.is_none() {
            self.signing_secret = file_config.signing_secret;
        }
        if self.stream_secret.is_none() {
            self.stream_secret = file_config.stream_secret;
        }
        if self.s3_bucket.is_none() {
            self.s3_bucket = file_config.s3_bucket;
        }
        if self.s3_endpoint.is_none() {
            self.s3_endpoint = file_config.s3_endpoint;
        }
        if self.s3_region.is_none() {
            self.s3_region = file_config.s3_region;
        }
        if self.s3_access_key_id.is_none() {
            self.s3_access_key_id = file_config.s3_access_key_id;
        }
        if self.s3_secret_access_key.is_none() {
            self.s3_secret_access_key = file_config.s3_secret_access_key;
        }
        if self.entitlement_url.is_none() {
            self.entitlement_url = file_config.entitlement_url;
        }
        if self.audit_webhook_url.is_none() {
            self.audit_webhook_url = file_config.audit_webhook_url;
        }

        self
    }

    /// Validate the configuration
    ///
    /// A missing or undersized signing secret is fatal here, at startup,
    /// never downgraded to a per-request error.
    pub fn validate(&self) -> Result<()> {
        self.signing_secret_bytes()?;
        self.stream_secret_bytes()?;

        // Validate storage configuration
        match self.storage_backend.as_str() {
            "local" => {
                // Local storage doesn't need additional validation
            }
            "s3" => {
                if self
                    .s3_bucket
                    .as_ref()
                    .map(|s| s.is_empty())
                    .unwrap_or(true)
                {
                    return Err(anyhow::anyhow!(
                        "S3 bucket name is required when backend is 's3'"
                    ));
                }
                if self
                    .s3_access_key_id
                    .as_ref()
                    .map(|s| s.is_empty())
                    .unwrap_or(true)
                {
                    return Err(anyhow::anyhow!(
                        "S3 access key ID is required when backend is 's3'"
                    ));
                }
                if self
                    .s3_secret_access_key
                    .as_ref()
                    .map(|s| s.is_empty())
                    .unwrap_or(true)
                {
                    return Err(anyhow::anyhow!(
                        "S3 secret access key is required when backend is 's3'"
                    ));
                }
            }
            backend => {
                return Err(anyhow::anyhow!(
                    "Unsupported storage backend: {}. Use 'local' or 's3'",
                    backend
                ));
            }
        }

        for (name, url) in [
            ("Entitlement", &self.entitlement_url),
            ("Audit webhook", &self.audit_webhook_url),
        ] {
            if let Some(url) = url {
                if url.is_empty() {
                    return Err(anyhow::anyhow!("{name} URL cannot be empty"));
                }
                if !url.starts_with("http://") && !url.starts_with("https://") {
                    return Err(anyhow::anyhow!(
                        "{name} URL must start with http:// or https://"
                    ));
                }
            }
        }

        if self.public_base_url.is_empty() {
            return Err(anyhow::anyhow!("Public base URL cannot be empty"));
        }

        Ok(())
    }

    /// Decoded grant signing secret
    pub fn signing_secret_bytes(&self) -> Result<Vec<u8>> {
        let encoded = self
            .signing_secret
            .as_deref()
            .ok_or_else(|| anyhow::anyhow!("signing_secret is required"))?;
        decode_secret("signing_secret", encoded)
    }

    /// Decoded streaming-provider secret, if configured
    pub fn stream_secret_bytes(&self) -> Result<Option<Vec<u8>>> {
        self.stream_secret
            .as_deref()
            .map(|encoded| decode_secret("stream_secret", encoded))
            .transpose()
    }

    /// Convert to S3 storage backend configuration
    pub fn to_s3_config(&self) -> Option<S3Config> {
        if self.storage_backend != "s3" {
            return None;
        }

        Some(S3Config {
            bucket: self.s3_bucket.clone()?,
            endpoint: self.s3_endpoint.clone(),
            region: self.s3_region.clone(),
            access_key_id: self.s3_access_key_id.clone()?,
            secret_access_key: self.s3_secret_access_key.clone()?,
        })
    }
}

fn decode_secret(name: &str, encoded: &str) -> Result<Vec<u8>> {
    let bytes = STANDARD
        .decode(encoded)
        .map_err(|error| anyhow::anyhow!("Failed to decode base64 {name}: {error}"))?;

    if bytes.len() < MIN_SECRET_LENGTH {
        return Err(anyhow::anyhow!(
            "{name} must decode to at least {MIN_SECRET_LENGTH} bytes, got {}",
            bytes.len()
        ));
    }

    Ok(bytes)
}

// S3 configuration subset
#[derive(Debug, Clone)]
pub struct S3Config {
    pub bucket: String,
    pub endpoint: Option<String>,
    pub region: Option<String>,
    pub access_key_id: String,
    pub secret_access_key: String,
}

// Default value functions
fn default_port() -> u16 {
    32145
}

fn default_internal_port() -> u16 {
    32146
}

fn default_public_base_url() -> String {
    "http://localhost:32145".to_string()
}

fn default_workspace() -> String {
    ".".to_string()
}

fn default_storage_backend() -> String {
    "local".to_string()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn valid_secret() -> String {
        STANDARD.encode([7u8; 32])
    }

    #[test]
    fn test_validate_requires_signing_secret() {
        let config = Config::default();
        assert!(config.validate().is_err());

        let config = Config {
            signing_secret: Some(valid_secret()),
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_short_or_garbage_secret() {
        let config = Config {
            signing_secret: Some(STANDARD.encode(b"short")),
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = Config {
            signing_secret: Some("not base64!!!".to_string()),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_validate_s3_backend_requires_credentials() {
        let config = Config {
            signing_secret: Some(valid_secret()),
            storage_backend: "s3".to_string(),
            ..Default::default()
        };
        assert!(config.validate().is_err());

        let config = Config {
            signing_secret: Some(valid_secret()),
            storage_backend: "s3".to_string(),
            s3_bucket: Some("media".to_string()),
            s3_access_key_id: Some("key".to_string()),
            s3_secret_access_key: Some("secret".to_string()),
            ..Default::default()
        };
        assert!(config.validate().is_ok());
    }

    #[test]
    fn test_validate_rejects_bad_collaborator_urls() {
        let config = Config {
            signing_secret: Some(valid_secret()),
            entitlement_url: Some("ftp://example.com".to_string()),
            ..Default::default()
        };
        assert!(config.validate().is_err());
    }
}
