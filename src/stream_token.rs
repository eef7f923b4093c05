use crate::grant::error::GrantError;
use crate::grant::signer::{GrantSigner, SIGNATURE_LENGTH};
use crate::grant::token::{clamp_expiry, now_unix};
use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use serde::Serialize;

// Token format constants
const MAGIC: &[u8; 4] = b"MST1";
const VERSION: u8 = 1;

// magic(4) + ver(1) + expires_at(8) + content_len(2)
const FIXED_PREFIX: usize = 15;

const MAC_DOMAIN: &[u8] = b"stream/v1";

/// A token for the streaming provider, redeemable against the shared
/// secret registered with it.
#[derive(Debug, Clone, Serialize)]
pub struct SignedStreamToken {
    pub token: String,
    pub content_id: String,
    pub expires_at: u64,
}

/// Mints streaming-provider tokens.
///
/// The trust boundary is the provider: it validates tokens itself, so this
/// issuer's whole job is correct encoding of content identity and expiry
/// under the provider's expected scheme. The signer here holds the secret
/// registered with the provider, never the grant signing secret.
#[derive(Debug, Clone)]
pub struct StreamTokenIssuer {
    signer: GrantSigner,
}

impl StreamTokenIssuer {
    pub fn new(signer: GrantSigner) -> Self {
        Self { signer }
    }

    /// Mint a stream token for `content_id` with a clamped lifetime.
    pub fn issue(
        &self,
        content_id: &str,
        expires_in: Option<u64>,
    ) -> Result<SignedStreamToken, GrantError> {
        self.issue_at(now_unix(), content_id, expires_in)
    }

    pub(crate) fn issue_at(
        &self,
        now: u64,
        content_id: &str,
        expires_in: Option<u64>,
    ) -> Result<SignedStreamToken, GrantError> {
        if content_id.is_empty() {
            return Err(GrantError::InvalidGrant("content id"));
        }
        if content_id.len() > u16::MAX as usize {
            return Err(GrantError::InvalidGrant("content id"));
        }

        let expires_at = now + clamp_expiry(expires_in);
        // A stream token must never cover an already-closed window.
        if expires_at <= now {
            return Err(GrantError::InvalidGrant("expiry window already closed"));
        }

        let expires_bytes = expires_at.to_be_bytes();
        let mac = self
            .signer
            .sign(&[MAC_DOMAIN, content_id.as_bytes(), expires_bytes.as_slice()]);

        let mut bytes =
            Vec::with_capacity(FIXED_PREFIX + content_id.len() + SIGNATURE_LENGTH);
        bytes.extend_from_slice(MAGIC);
        bytes.push(VERSION);
        bytes.extend_from_slice(&expires_at.to_be_bytes());
        bytes.extend_from_slice(&(content_id.len() as u16).to_be_bytes());
        bytes.extend_from_slice(content_id.as_bytes());
        bytes.extend_from_slice(&mac);

        Ok(SignedStreamToken {
            token: URL_SAFE_NO_PAD.encode(bytes),
            content_id: content_id.to_string(),
            expires_at,
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MIN_URL_EXPIRATION;
    use hmac::{Hmac, Mac};
    use sha2::Sha256;

    const NOW: u64 = 1_700_000_000;
    const SECRET: &[u8] = b"provider-shared-secret-0123456789ab";

    fn test_issuer() -> StreamTokenIssuer {
        StreamTokenIssuer::new(GrantSigner::new(SECRET).unwrap())
    }

    #[test]
    fn test_issue_embeds_content_and_expiry() {
        let issuer = test_issuer();
        let token = issuer.issue_at(NOW, "content-1", Some(600)).unwrap();

        assert_eq!(token.content_id, "content-1");
        assert_eq!(token.expires_at, NOW + 600);
        assert!(!token.token.is_empty());
    }

    #[test]
    fn test_wire_format_matches_provider_contract() {
        // The provider decodes this independently, so the layout is pinned:
        // magic | version | expires_at BE | content_len BE | content | mac.
        let issuer = test_issuer();
        let token = issuer.issue_at(NOW, "abc", Some(600)).unwrap();

        let bytes = URL_SAFE_NO_PAD.decode(&token.token).unwrap();
        assert_eq!(&bytes[0..4], MAGIC);
        assert_eq!(bytes[4], VERSION);
        assert_eq!(u64::from_be_bytes(bytes[5..13].try_into().unwrap()), NOW + 600);
        assert_eq!(u16::from_be_bytes(bytes[13..15].try_into().unwrap()), 3);
        assert_eq!(&bytes[15..18], b"abc");
        assert_eq!(bytes.len(), 18 + SIGNATURE_LENGTH);

        // Recompute the MAC the way the provider would.
        let expires_bytes = (NOW + 600).to_be_bytes();
        let mut mac = Hmac::<Sha256>::new_from_slice(SECRET).unwrap();
        for field in [MAC_DOMAIN, b"abc".as_slice(), expires_bytes.as_slice()] {
            mac.update(&(field.len() as u64).to_be_bytes());
            mac.update(field);
        }
        let expected: [u8; 32] = mac.finalize().into_bytes().into();
        assert_eq!(&bytes[18..], &expected);
    }

    #[test]
    fn test_issue_refuses_empty_content() {
        let issuer = test_issuer();
        assert_eq!(
            issuer.issue_at(NOW, "", Some(600)).unwrap_err(),
            GrantError::InvalidGrant("content id")
        );
    }

    #[test]
    fn test_expiry_is_clamped() {
        let issuer = test_issuer();
        let token = issuer.issue_at(NOW, "content-1", Some(0)).unwrap();
        assert_eq!(token.expires_at, NOW + MIN_URL_EXPIRATION);
    }

    #[test]
    fn test_tokens_differ_per_content() {
        let issuer = test_issuer();
        let a = issuer.issue_at(NOW, "content-1", Some(600)).unwrap();
        let b = issuer.issue_at(NOW, "content-2", Some(600)).unwrap();
        assert_ne!(a.token, b.token);
    }
}
