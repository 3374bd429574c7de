// signing.rs — Keyed digests for plans and signer attestations.
//
// HMAC-SHA256 via `ring`. The key material comes from the device's secure
// element; this type only wraps it with the key generation it belongs to so
// a signature can be tied to a key version. Tags are base64-encoded.

use std::fmt;

use base64::engine::general_purpose::STANDARD;
use base64::Engine as _;
use ring::hmac;
use sha2::{Digest, Sha256};

/// An HMAC-SHA256 key tagged with its key generation.
pub struct SigningKey {
    key_version: u64,
    key: hmac::Key,
}

impl SigningKey {
    /// Wrap raw key material for the given key generation.
    pub fn new(key_version: u64, secret: &[u8]) -> Self {
        Self {
            key_version,
            key: hmac::Key::new(hmac::HMAC_SHA256, secret),
        }
    }

    /// Key generation this key belongs to.
    pub fn key_version(&self) -> u64 {
        self.key_version
    }

    /// Sign `data`, returning a base64 tag.
    pub fn sign(&self, data: &[u8]) -> String {
        let tag = hmac::sign(&self.key, data);
        STANDARD.encode(tag.as_ref())
    }

    /// Verify a base64 tag over `data` in constant time.
    ///
    /// Malformed base64 is a failed verification, not an error.
    pub fn verify(&self, data: &[u8], signature: &str) -> bool {
        match STANDARD.decode(signature) {
            Ok(tag) => hmac::verify(&self.key, data, &tag).is_ok(),
            Err(_) => false,
        }
    }
}

// Manual Debug so key material never reaches logs.
impl fmt::Debug for SigningKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SigningKey")
            .field("key_version", &self.key_version)
            .field("key", &"<redacted>")
            .finish()
    }
}

/// Lowercase hex SHA-256 of `data`.
pub fn sha256_hex(data: &[u8]) -> String {
    let mut hasher = Sha256::new();
    hasher.update(data);
    format!("{:x}", hasher.finalize())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn sign_then_verify() {
        let key = SigningKey::new(3, b"secret");
        let tag = key.sign(b"payload");
        assert!(key.verify(b"payload", &tag));
        assert!(!key.verify(b"payload!", &tag));
    }

    #[test]
    fn different_keys_disagree() {
        let a = SigningKey::new(1, b"alpha");
        let b = SigningKey::new(1, b"beta");
        assert!(!b.verify(b"payload", &a.sign(b"payload")));
    }

    #[test]
    fn malformed_tag_fails_verification() {
        let key = SigningKey::new(1, b"secret");
        assert!(!key.verify(b"payload", "not base64 !!"));
        assert!(!key.verify(b"payload", ""));
    }

    #[test]
    fn debug_hides_key_material() {
        let key = SigningKey::new(7, b"super-secret");
        let rendered = format!("{:?}", key);
        assert!(rendered.contains("redacted"));
        assert!(!rendered.contains("super-secret"));
    }

    #[test]
    fn sha256_known_value() {
        assert_eq!(
            sha256_hex(b""),
            "e3b0c44298fc1c149afbf4c8996fb92427ae41e4649b934ca495991b7852b855"
        );
    }
}
