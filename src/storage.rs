use anyhow::{Result, anyhow};
use bytes::Bytes;
use opendal::services::{Fs, S3};
use opendal::{Operator, layers::RetryLayer};
use std::path::{Path, PathBuf};
use std::time::Duration;
use tracing::info;

/// Storage configuration
#[derive(Clone, Debug)]
pub struct StorageConfig {
    pub backend: StorageBackend,
    pub workspace: PathBuf,
}

#[derive(Clone, Debug)]
pub enum StorageBackend {
    Local,
    S3 {
        bucket: String,
        endpoint: Option<String>,
        region: Option<String>,
        access_key_id: String,
        secret_access_key: String,
    },
}

/// Storage manager over the configured backend.
///
/// All object access goes through the opendal operator; the S3 backend
/// additionally supports presigned GET URLs in its own signing scheme.
#[derive(Clone)]
pub struct StorageManager {
    operator: Operator,
    config: StorageConfig,
}

impl StorageManager {
    pub async fn new(config: StorageConfig) -> Result<Self> {
        let operator = match &config.backend {
            StorageBackend::Local => {
                tokio::fs::create_dir_all(&config.workspace).await?;
                build_fs_operator(&config.workspace)?
            }
            StorageBackend::S3 {
                bucket,
                endpoint,
                region,
                access_key_id,
                secret_access_key,
            } => build_s3_operator(
                bucket,
                endpoint.as_deref(),
                region.as_deref(),
                access_key_id,
                secret_access_key,
            )?,
        };

        Ok(Self { operator, config })
    }

    pub fn is_remote(&self) -> bool {
        matches!(self.config.backend, StorageBackend::S3 { .. })
    }

    /// Size of the object, or an error if it does not exist.
    pub async fn content_length(&self, storage_key: &str) -> Result<u64> {
        Ok(self.operator.stat(storage_key).await?.content_length())
    }

    /// Read one byte range of the object.
    pub async fn read_range(&self, storage_key: &str, start: u64, end: u64) -> Result<Bytes> {
        let data = self
            .operator
            .read_with(storage_key)
            .range(start..=end)
            .await?;
        Ok(data.to_bytes())
    }

    /// Presigned GET URL in the backend's native scheme.
    ///
    /// Only the remote backend signs natively; callers route local objects
    /// through the wrapped-URL form instead.
    pub async fn presign_read(&self, storage_key: &str, expires_in: Duration) -> Result<String> {
        if !self.is_remote() {
            return Err(anyhow!("local storage backend has no native signing"));
        }

        let request = self.operator.presign_read(storage_key, expires_in).await?;
        Ok(request.uri().to_string())
    }
}

fn build_fs_operator(root: &Path) -> Result<Operator> {
    info!(root = ?root, "Building filesystem operator");

    let mut builder = Fs::default();
    builder = builder.root(
        root.to_str()
            .ok_or_else(|| anyhow!("Invalid root path: {:?}", root))?,
    );

    Ok(Operator::new(builder)?
        .layer(RetryLayer::new().with_max_times(3))
        .finish())
}

fn build_s3_operator(
    bucket: &str,
    endpoint: Option<&str>,
    region: Option<&str>,
    access_key_id: &str,
    secret_access_key: &str,
) -> Result<Operator> {
    info!(
        bucket = %bucket,
        endpoint = ?endpoint,
        region = ?region,
        "Building S3 operator"
    );

    let mut builder = S3::default();
    builder = builder.bucket(bucket);
    builder = builder.access_key_id(access_key_id);
    builder = builder.secret_access_key(secret_access_key);

    if let Some(region) = region {
        builder = builder.region(region);
    }

    if let Some(endpoint) = endpoint {
        builder = builder.endpoint(endpoint);
    }

    Ok(Operator::new(builder)?
        .layer(RetryLayer::new().with_max_times(3))
        .finish())
}

/// Reject keys that could escape the storage root or are plainly invalid.
pub fn is_safe_storage_key(storage_key: &str) -> bool {
    !storage_key.is_empty()
        && !storage_key.starts_with('/')
        && storage_key.split('/').all(|segment| !segment.is_empty() && segment != "." && segment != "..")
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_is_safe_storage_key() {
        assert!(is_safe_storage_key("media/post-9/original.mp4"));
        assert!(is_safe_storage_key("cover.png"));

        assert!(!is_safe_storage_key(""));
        assert!(!is_safe_storage_key("/etc/passwd"));
        assert!(!is_safe_storage_key("media/../secrets.toml"));
        assert!(!is_safe_storage_key(".."));
        assert!(!is_safe_storage_key("media//double"));
        assert!(!is_safe_storage_key("./media"));
    }

    #[tokio::test]
    async fn test_local_backend_read_round_trip() {
        let workspace = std::env::temp_dir().join(format!("media-gateway-test-{}", std::process::id()));
        let manager = StorageManager::new(StorageConfig {
            backend: StorageBackend::Local,
            workspace: workspace.clone(),
        })
        .await
        .unwrap();

        tokio::fs::create_dir_all(workspace.join("media")).await.unwrap();
        tokio::fs::write(workspace.join("media/sample.bin"), b"0123456789")
            .await
            .unwrap();

        assert_eq!(manager.content_length("media/sample.bin").await.unwrap(), 10);
        let range = manager.read_range("media/sample.bin", 2, 5).await.unwrap();
        assert_eq!(&range[..], b"2345");

        assert!(!manager.is_remote());
        assert!(
            manager
                .presign_read("media/sample.bin", Duration::from_secs(60))
                .await
                .is_err()
        );

        tokio::fs::remove_dir_all(&workspace).await.ok();
    }
}
