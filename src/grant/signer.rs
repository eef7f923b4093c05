use anyhow::{Result, bail};
use hmac::{Hmac, Mac};
use sha2::Sha256;

type HmacSha256 = Hmac<Sha256>;

/// Length of every signature produced by [`GrantSigner`].
pub const SIGNATURE_LENGTH: usize = 32;

/// Minimum acceptable secret length in bytes.
pub const MIN_SECRET_LENGTH: usize = 32;

/// Keyed message authentication over an ordered sequence of fields.
///
/// The secret is loaded once at startup and immutable for the process
/// lifetime; the signer is freely shared across concurrent callers.
#[derive(Clone)]
pub struct GrantSigner {
    secret: Vec<u8>,
}

impl std::fmt::Debug for GrantSigner {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        // The secret must never reach logs.
        f.debug_struct("GrantSigner").finish_non_exhaustive()
    }
}

impl GrantSigner {
    /// Create a signer from a secret. A missing or short secret is a
    /// startup failure, never a per-request error.
    pub fn new(secret: &[u8]) -> Result<Self> {
        if secret.len() < MIN_SECRET_LENGTH {
            bail!(
                "signing secret must be at least {MIN_SECRET_LENGTH} bytes, got {}",
                secret.len()
            );
        }

        Ok(Self {
            secret: secret.to_vec(),
        })
    }

    /// HMAC-SHA256 over the field sequence.
    ///
    /// Each field is fed length-prefixed so that field boundaries are
    /// unambiguous: ("ab", "c") and ("a", "bc") sign differently.
    pub fn sign(&self, fields: &[&[u8]]) -> [u8; SIGNATURE_LENGTH] {
        let mut mac =
            HmacSha256::new_from_slice(&self.secret).expect("HMAC can take key of any size");

        for field in fields {
            mac.update(&(field.len() as u64).to_be_bytes());
            mac.update(field);
        }

        let mut signature = [0u8; SIGNATURE_LENGTH];
        signature.copy_from_slice(&mac.finalize().into_bytes());
        signature
    }

    /// Constant-time signature check. Returns false on any malformed
    /// input, including a wrong-length signature.
    pub fn verify(&self, fields: &[&[u8]], signature: &[u8]) -> bool {
        constant_time_eq(&self.sign(fields), signature)
    }
}

fn constant_time_eq(left: &[u8], right: &[u8]) -> bool {
    if left.len() != right.len() {
        return false;
    }

    let mut diff = 0_u8;
    for (&lhs, &rhs) in left.iter().zip(right) {
        diff |= lhs ^ rhs;
    }

    diff == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_signer() -> GrantSigner {
        GrantSigner::new(b"0123456789abcdef0123456789abcdef").unwrap()
    }

    #[test]
    fn test_sign_is_deterministic() {
        let signer = test_signer();
        let a = signer.sign(&[b"user-1", b"content-9"]);
        let b = signer.sign(&[b"user-1", b"content-9"]);
        assert_eq!(a, b);
    }

    #[test]
    fn test_field_boundaries_are_unambiguous() {
        let signer = test_signer();
        let joined = signer.sign(&[b"ab", b"c"]);
        let split = signer.sign(&[b"a", b"bc"]);
        assert_ne!(joined, split);
    }

    #[test]
    fn test_verify_round_trip() {
        let signer = test_signer();
        let signature = signer.sign(&[b"user-1", b"content-9"]);
        assert!(signer.verify(&[b"user-1", b"content-9"], &signature));
        assert!(!signer.verify(&[b"user-2", b"content-9"], &signature));
    }

    #[test]
    fn test_verify_rejects_wrong_length_signature() {
        let signer = test_signer();
        let signature = signer.sign(&[b"user-1"]);
        assert!(!signer.verify(&[b"user-1"], &signature[..31]));
        assert!(!signer.verify(&[b"user-1"], &[]));
    }

    #[test]
    fn test_different_secrets_sign_differently() {
        let a = test_signer();
        let b = GrantSigner::new(b"another-secret-another-secret-32").unwrap();
        assert_ne!(a.sign(&[b"user-1"]), b.sign(&[b"user-1"]));
    }

    #[test]
    fn test_short_secret_rejected() {
        assert!(GrantSigner::new(b"short").is_err());
        assert!(GrantSigner::new(b"").is_err());
        assert!(GrantSigner::new(&[7u8; MIN_SECRET_LENGTH]).is_ok());
    }
}
