use crate::grant::error::GrantError;
use crate::grant::signer::GrantSigner;
use crate::grant::token::{clamp_expiry, now_unix};
use crate::storage::StorageManager;
use serde::Serialize;
use std::sync::Arc;
use std::time::Duration;

// First MAC field, keeping wrapped-URL signatures disjoint from the
// binding-token scheme under the same secret.
const MAC_DOMAIN: &[u8] = b"media-url/v1";

/// A time-limited URL granting read access to one storage object.
/// Never stored server-side; owned solely by the caller that minted it.
#[derive(Debug, Clone, Serialize)]
pub struct SignedMediaUrl {
    pub url: String,
    pub expires_at: u64,
}

/// Produces `SignedMediaUrl`s in whichever scheme the storage backend
/// honors.
///
/// The S3 backend validates its own presigned URLs, so this service just
/// asks the operator to presign. The local backend has no native signing:
/// the URL wraps key, expiry and a MAC, and the media route resolves it
/// before a proxied fetch.
#[derive(Clone)]
pub struct SignedUrlService {
    signer: Arc<GrantSigner>,
    storage: Arc<StorageManager>,
    public_base_url: String,
}

impl SignedUrlService {
    pub fn new(signer: Arc<GrantSigner>, storage: Arc<StorageManager>, public_base_url: &str) -> Self {
        Self {
            signer,
            storage,
            public_base_url: public_base_url.trim_end_matches('/').to_string(),
        }
    }

    /// Generate a signed URL for the object behind `content_id`.
    ///
    /// Entitlement is the caller's responsibility; the requested expiry is
    /// clamped into [MIN, MAX].
    pub async fn generate(
        &self,
        content_id: &str,
        storage_key: &str,
        expires_in: Option<u64>,
    ) -> Result<SignedMediaUrl, GrantError> {
        self.generate_at(now_unix(), content_id, storage_key, expires_in).await
    }

    pub(crate) async fn generate_at(
        &self,
        now: u64,
        content_id: &str,
        storage_key: &str,
        expires_in: Option<u64>,
    ) -> Result<SignedMediaUrl, GrantError> {
        if content_id.is_empty() {
            return Err(GrantError::InvalidGrant("content id"));
        }
        if storage_key.is_empty() {
            return Err(GrantError::InvalidGrant("storage key"));
        }

        let ttl = clamp_expiry(expires_in);
        let expires_at = now + ttl;

        if self.storage.is_remote() {
            let url = self
                .storage
                .presign_read(storage_key, Duration::from_secs(ttl))
                .await
                .map_err(|err| GrantError::Storage(err.to_string()))?;
            return Ok(SignedMediaUrl { url, expires_at });
        }

        let signature = self.wrapped_signature(content_id, storage_key, expires_at);
        let url = format!(
            "{}/media/{content_id}/{storage_key}?expires={expires_at}&sig={}",
            self.public_base_url,
            hex::encode(signature),
        );

        Ok(SignedMediaUrl { url, expires_at })
    }

    /// Inverse of the wrapped form, called by the media route before a
    /// proxied fetch.
    pub fn verify_wrapped(
        &self,
        content_id: &str,
        storage_key: &str,
        expires_at: u64,
        signature_hex: &str,
    ) -> Result<(), GrantError> {
        self.verify_wrapped_at(now_unix(), content_id, storage_key, expires_at, signature_hex)
    }

    pub(crate) fn verify_wrapped_at(
        &self,
        now: u64,
        content_id: &str,
        storage_key: &str,
        expires_at: u64,
        signature_hex: &str,
    ) -> Result<(), GrantError> {
        let signature = hex::decode(signature_hex).map_err(|_| GrantError::Malformed)?;

        let expires_bytes = expires_at.to_be_bytes();
        let fields = [
            MAC_DOMAIN,
            content_id.as_bytes(),
            storage_key.as_bytes(),
            expires_bytes.as_slice(),
        ];
        if !self.signer.verify(&fields, &signature) {
            return Err(GrantError::BadSignature);
        }

        if now > expires_at {
            return Err(GrantError::Expired);
        }

        Ok(())
    }

    fn wrapped_signature(&self, content_id: &str, storage_key: &str, expires_at: u64) -> [u8; 32] {
        let expires_bytes = expires_at.to_be_bytes();
        self.signer.sign(&[
            MAC_DOMAIN,
            content_id.as_bytes(),
            storage_key.as_bytes(),
            expires_bytes.as_slice(),
        ])
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::storage::{StorageBackend, StorageConfig};
    use crate::{DEFAULT_URL_EXPIRATION, MAX_URL_EXPIRATION};

    const NOW: u64 = 1_700_000_000;

    async fn local_service() -> SignedUrlService {
        let workspace =
            std::env::temp_dir().join(format!("media-gateway-url-test-{}", std::process::id()));
        let storage = StorageManager::new(StorageConfig {
            backend: StorageBackend::Local,
            workspace,
        })
        .await
        .unwrap();

        SignedUrlService::new(
            Arc::new(GrantSigner::new(b"0123456789abcdef0123456789abcdef").unwrap()),
            Arc::new(storage),
            "http://localhost:32145/",
        )
    }

    #[tokio::test]
    async fn test_wrapped_url_shape_and_round_trip() {
        let service = local_service().await;
        let signed = service
            .generate_at(NOW, "content-1", "media/content-1.mp4", Some(300))
            .await
            .unwrap();

        assert_eq!(signed.expires_at, NOW + 300);
        assert!(
            signed
                .url
                .starts_with("http://localhost:32145/media/content-1/media/content-1.mp4?expires=")
        );

        // Pull the query parameters back out and verify them.
        let query = signed.url.split_once('?').unwrap().1;
        let mut expires = None;
        let mut sig = None;
        for pair in query.split('&') {
            match pair.split_once('=').unwrap() {
                ("expires", v) => expires = Some(v.parse::<u64>().unwrap()),
                ("sig", v) => sig = Some(v.to_string()),
                _ => {}
            }
        }
        let expires = expires.unwrap();
        let sig = sig.unwrap();

        assert!(
            service
                .verify_wrapped_at(NOW, "content-1", "media/content-1.mp4", expires, &sig)
                .is_ok()
        );

        // Swapping the object out from under the signature fails.
        assert_eq!(
            service
                .verify_wrapped_at(NOW, "content-1", "media/other.mp4", expires, &sig)
                .unwrap_err(),
            GrantError::BadSignature
        );

        // Extending the expiry breaks the signature before the clock matters.
        assert_eq!(
            service
                .verify_wrapped_at(NOW, "content-1", "media/content-1.mp4", expires + 60, &sig)
                .unwrap_err(),
            GrantError::BadSignature
        );

        // Past the deadline the original URL is dead.
        assert_eq!(
            service
                .verify_wrapped_at(expires + 1, "content-1", "media/content-1.mp4", expires, &sig)
                .unwrap_err(),
            GrantError::Expired
        );
    }

    #[tokio::test]
    async fn test_wrapped_verify_rejects_garbage_signature() {
        let service = local_service().await;
        assert_eq!(
            service
                .verify_wrapped_at(NOW, "content-1", "key", NOW + 60, "zz-not-hex")
                .unwrap_err(),
            GrantError::Malformed
        );
        assert_eq!(
            service
                .verify_wrapped_at(NOW, "content-1", "key", NOW + 60, "deadbeef")
                .unwrap_err(),
            GrantError::BadSignature
        );
    }

    #[tokio::test]
    async fn test_generate_clamps_expiry() {
        let service = local_service().await;

        let signed = service
            .generate_at(NOW, "content-1", "key", None)
            .await
            .unwrap();
        assert_eq!(signed.expires_at, NOW + DEFAULT_URL_EXPIRATION);

        let signed = service
            .generate_at(NOW, "content-1", "key", Some(u64::MAX))
            .await
            .unwrap();
        assert_eq!(signed.expires_at, NOW + MAX_URL_EXPIRATION);
    }

    #[tokio::test]
    async fn test_generate_refuses_empty_inputs() {
        let service = local_service().await;
        assert_eq!(
            service.generate_at(NOW, "", "key", None).await.unwrap_err(),
            GrantError::InvalidGrant("content id")
        );
        assert_eq!(
            service.generate_at(NOW, "content-1", "", None).await.unwrap_err(),
            GrantError::InvalidGrant("storage key")
        );
    }
}
