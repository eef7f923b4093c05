use crate::grant::error::GrantError;
use crate::grant::signer::{GrantSigner, SIGNATURE_LENGTH};
use crate::{DEFAULT_URL_EXPIRATION, MAX_URL_EXPIRATION, MIN_URL_EXPIRATION};
use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use std::time::{SystemTime, UNIX_EPOCH};

// Token format constants
const MAGIC: &[u8; 4] = b"MGT1";
const VERSION: u8 = 1;

// Fixed prefix: magic(4) + ver(1) + issued_at(8) + expires_at(8) = 21 bytes,
// followed by three u16-length-prefixed fields and the 32-byte MAC trailer.
const FIXED_PREFIX: usize = 21;
const MIN_TOKEN_SIZE: usize = FIXED_PREFIX + 3 * 2 + SIGNATURE_LENGTH;

// First MAC field, so binding-token signatures can never collide with the
// signed-URL or stream-token schemes under the same secret.
const MAC_DOMAIN: &[u8] = b"binding/v1";

/// Clamp a requested credential lifetime into the allowed window.
///
/// Out-of-range requests are clamped rather than rejected: lifetime is not
/// a parameter a caller should be able to turn into a mint failure.
pub fn clamp_expiry(requested: Option<u64>) -> u64 {
    requested
        .unwrap_or(DEFAULT_URL_EXPIRATION)
        .clamp(MIN_URL_EXPIRATION, MAX_URL_EXPIRATION)
}

pub(crate) fn now_unix() -> u64 {
    SystemTime::now()
        .duration_since(UNIX_EPOCH)
        .expect("system clock before unix epoch")
        .as_secs()
}

/// Parsed, signature-checked fields of a binding token.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct GrantClaims {
    pub user_id: String,
    pub content_id: String,
    pub storage_key: String,
    pub issued_at: u64,
    pub expires_at: u64,
}

/// A freshly minted binding token plus its absolute expiry.
#[derive(Debug, Clone)]
pub struct IssuedGrant {
    pub token: String,
    pub issued_at: u64,
    pub expires_at: u64,
}

/// Mints and verifies user-binding tokens.
///
/// A binding token ties one (user, content, storage object) triple to an
/// expiry window. The MAC trailer is the sole source of trust: no parsed
/// field feeds an access decision until the signature over all of them has
/// checked out. Because the user is re-checked against the requester at
/// verify time, a token copied into another user's session is useless.
#[derive(Debug, Clone)]
pub struct GrantManager {
    signer: GrantSigner,
}

impl GrantManager {
    pub fn new(signer: GrantSigner) -> Self {
        Self { signer }
    }

    /// Mint a binding token for (user, content, storage key).
    ///
    /// The caller must have already confirmed entitlement. The requested
    /// expiry is clamped into [MIN, MAX].
    pub fn issue(
        &self,
        user_id: &str,
        content_id: &str,
        storage_key: &str,
        expires_in: Option<u64>,
    ) -> Result<IssuedGrant, GrantError> {
        self.issue_at(now_unix(), user_id, content_id, storage_key, expires_in)
    }

    pub(crate) fn issue_at(
        &self,
        now: u64,
        user_id: &str,
        content_id: &str,
        storage_key: &str,
        expires_in: Option<u64>,
    ) -> Result<IssuedGrant, GrantError> {
        check_field(user_id, "user id")?;
        check_field(content_id, "content id")?;
        check_field(storage_key, "storage key")?;

        let expires_at = now + clamp_expiry(expires_in);
        let mac = self.mac(user_id, content_id, storage_key, now, expires_at);

        let mut bytes = Vec::with_capacity(
            MIN_TOKEN_SIZE + user_id.len() + content_id.len() + storage_key.len(),
        );
        bytes.extend_from_slice(MAGIC);
        bytes.push(VERSION);
        bytes.extend_from_slice(&now.to_be_bytes());
        bytes.extend_from_slice(&expires_at.to_be_bytes());
        push_field(&mut bytes, user_id);
        push_field(&mut bytes, content_id);
        push_field(&mut bytes, storage_key);
        bytes.extend_from_slice(&mac);

        Ok(IssuedGrant {
            token: URL_SAFE_NO_PAD.encode(bytes),
            issued_at: now,
            expires_at,
        })
    }

    /// Verify a presented binding token against the current requester.
    ///
    /// Check order: parse, MAC, expiry, user binding, content binding.
    /// `expected_user_id` is the authenticated identity of the requesting
    /// session, not anything taken from the token.
    pub fn verify(
        &self,
        token: &str,
        expected_user_id: &str,
        expected_content_id: &str,
        expected_storage_key: &str,
    ) -> Result<GrantClaims, GrantError> {
        self.verify_at(
            now_unix(),
            token,
            expected_user_id,
            expected_content_id,
            expected_storage_key,
        )
    }

    pub(crate) fn verify_at(
        &self,
        now: u64,
        token: &str,
        expected_user_id: &str,
        expected_content_id: &str,
        expected_storage_key: &str,
    ) -> Result<GrantClaims, GrantError> {
        let (claims, mac) = parse_token(token)?;

        // Nothing parsed is trusted until the MAC over every field verifies.
        let issued_bytes = claims.issued_at.to_be_bytes();
        let expires_bytes = claims.expires_at.to_be_bytes();
        let fields = [
            MAC_DOMAIN,
            claims.user_id.as_bytes(),
            claims.content_id.as_bytes(),
            claims.storage_key.as_bytes(),
            issued_bytes.as_slice(),
            expires_bytes.as_slice(),
        ];
        if !self.signer.verify(&fields, &mac) {
            return Err(GrantError::BadSignature);
        }

        if now > claims.expires_at {
            return Err(GrantError::Expired);
        }

        if claims.user_id != expected_user_id {
            return Err(GrantError::UserMismatch);
        }

        if claims.content_id != expected_content_id || claims.storage_key != expected_storage_key {
            return Err(GrantError::ContentMismatch);
        }

        Ok(claims)
    }

    fn mac(
        &self,
        user_id: &str,
        content_id: &str,
        storage_key: &str,
        issued_at: u64,
        expires_at: u64,
    ) -> [u8; SIGNATURE_LENGTH] {
        let issued_bytes = issued_at.to_be_bytes();
        let expires_bytes = expires_at.to_be_bytes();
        self.signer.sign(&[
            MAC_DOMAIN,
            user_id.as_bytes(),
            content_id.as_bytes(),
            storage_key.as_bytes(),
            issued_bytes.as_slice(),
            expires_bytes.as_slice(),
        ])
    }
}

fn check_field(field: &str, name: &'static str) -> Result<(), GrantError> {
    if field.is_empty() {
        return Err(GrantError::InvalidGrant(name));
    }
    if field.len() > u16::MAX as usize {
        return Err(GrantError::InvalidGrant(name));
    }
    Ok(())
}

fn push_field(bytes: &mut Vec<u8>, field: &str) {
    bytes.extend_from_slice(&(field.len() as u16).to_be_bytes());
    bytes.extend_from_slice(field.as_bytes());
}

fn parse_token(token: &str) -> Result<(GrantClaims, [u8; SIGNATURE_LENGTH]), GrantError> {
    let bytes = URL_SAFE_NO_PAD
        .decode(token)
        .map_err(|_| GrantError::Malformed)?;

    if bytes.len() < MIN_TOKEN_SIZE {
        return Err(GrantError::Malformed);
    }
    if &bytes[0..4] != MAGIC || bytes[4] != VERSION {
        return Err(GrantError::Malformed);
    }

    let issued_at = u64::from_be_bytes(bytes[5..13].try_into().expect("fixed slice"));
    let expires_at = u64::from_be_bytes(bytes[13..21].try_into().expect("fixed slice"));

    let body_end = bytes.len() - SIGNATURE_LENGTH;
    let mut offset = FIXED_PREFIX;
    let user_id = read_field(&bytes, &mut offset, body_end)?;
    let content_id = read_field(&bytes, &mut offset, body_end)?;
    let storage_key = read_field(&bytes, &mut offset, body_end)?;

    // Trailing bytes between the fields and the MAC are not a valid layout.
    if offset != body_end {
        return Err(GrantError::Malformed);
    }

    let mut mac = [0u8; SIGNATURE_LENGTH];
    mac.copy_from_slice(&bytes[body_end..]);

    Ok((
        GrantClaims {
            user_id,
            content_id,
            storage_key,
            issued_at,
            expires_at,
        },
        mac,
    ))
}

fn read_field(bytes: &[u8], offset: &mut usize, end: usize) -> Result<String, GrantError> {
    if *offset + 2 > end {
        return Err(GrantError::Malformed);
    }
    let len =
        u16::from_be_bytes(bytes[*offset..*offset + 2].try_into().expect("fixed slice")) as usize;
    *offset += 2;

    if *offset + len > end {
        return Err(GrantError::Malformed);
    }
    let field = std::str::from_utf8(&bytes[*offset..*offset + len])
        .map_err(|_| GrantError::Malformed)?
        .to_string();
    *offset += len;

    Ok(field)
}
