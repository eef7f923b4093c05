use crate::access_log::AccessLogger;
use crate::config::Config;
use crate::entitlement::{AllowAll, EntitlementCheck, HttpEntitlement};
use crate::grant::{GrantManager, GrantSigner};
use crate::signed_url::SignedUrlService;
use crate::storage::{StorageBackend, StorageConfig, StorageManager};
use crate::stream_token::StreamTokenIssuer;
use std::path::PathBuf;
use std::str::FromStr;
use std::sync::Arc;
use tracing::info;

#[derive(Clone)]
pub struct AppState {
    pub grant_manager: Arc<GrantManager>,
    pub signed_urls: SignedUrlService,
    pub stream_tokens: Option<StreamTokenIssuer>,
    pub storage: Arc<StorageManager>,
    pub entitlement: Arc<dyn EntitlementCheck>,
    pub access_log: AccessLogger,
}

impl AppState {
    pub async fn new(config: &Config) -> anyhow::Result<Self> {
        let workspace = PathBuf::from_str(&config.workspace)?;

        // Configure storage backend
        let backend = match config.storage_backend.as_str() {
            "local" => {
                info!("Using local filesystem storage");
                StorageBackend::Local
            }
            "s3" => {
                info!("Using S3 storage backend");
                let s3_config = config
                    .to_s3_config()
                    .ok_or_else(|| anyhow::anyhow!("S3 configuration is required when using S3 backend"))?;
                StorageBackend::S3 {
                    bucket: s3_config.bucket,
                    endpoint: s3_config.endpoint,
                    region: s3_config.region,
                    access_key_id: s3_config.access_key_id,
                    secret_access_key: s3_config.secret_access_key,
                }
            }
            backend => {
                anyhow::bail!("Unsupported storage backend: {backend}. Use 'local' or 's3'");
            }
        };

        let storage = Arc::new(
            StorageManager::new(StorageConfig {
                backend,
                workspace,
            })
            .await?,
        );

        // The grant signer holds the process signing secret, loaded once and
        // immutable for the process lifetime.
        let signer = Arc::new(GrantSigner::new(&config.signing_secret_bytes()?)?);
        let grant_manager = Arc::new(GrantManager::new(signer.as_ref().clone()));
        let signed_urls =
            SignedUrlService::new(signer, storage.clone(), &config.public_base_url);

        // The stream issuer uses the provider's registered secret, never the
        // grant signing secret.
        let stream_tokens = config
            .stream_secret_bytes()?
            .map(|secret| anyhow::Ok(StreamTokenIssuer::new(GrantSigner::new(&secret)?)))
            .transpose()?;

        let entitlement: Arc<dyn EntitlementCheck> = match &config.entitlement_url {
            Some(url) => {
                info!(url, "Entitlement checks delegated to external service");
                Arc::new(HttpEntitlement::new(url.clone()))
            }
            None => {
                info!("No entitlement service configured, trusting internal callers");
                Arc::new(AllowAll)
            }
        };

        let access_log = AccessLogger::spawn(config.audit_webhook_url.clone());

        Ok(Self {
            grant_manager,
            signed_urls,
            stream_tokens,
            storage,
            entitlement,
            access_log,
        })
    }
}
