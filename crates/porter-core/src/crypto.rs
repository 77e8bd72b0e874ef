use aes_gcm::aead::{Aead, KeyInit};
use aes_gcm::{Aes256Gcm, Nonce};
use rand::RngCore;
use rand::rngs::OsRng;
use zeroize::{Zeroize, ZeroizeOnDrop};

use crate::error::{Result, TransferError};

pub const KEY_LEN: usize = 32;
pub const NONCE_LEN: usize = 12;
pub const TAG_LEN: usize = 16;

/// Symmetric sealing key, zeroized on drop.
#[derive(Clone, Zeroize, ZeroizeOnDrop)]
pub struct SealKey([u8; KEY_LEN]);

impl SealKey {
    pub fn from_bytes(bytes: [u8; KEY_LEN]) -> Self {
        Self(bytes)
    }

    /// Parse a 64-character hex string, the on-disk key format.
    pub fn from_hex(s: &str) -> Result<Self> {
        let bytes = hex::decode(s.trim())
            .map_err(|e| TransferError::Misconfiguration(format!("invalid key hex: {e}")))?;
        let bytes: [u8; KEY_LEN] = bytes.try_into().map_err(|_| {
            TransferError::Misconfiguration(format!("key must be {KEY_LEN} bytes"))
        })?;
        Ok(Self(bytes))
    }

    pub fn to_hex(&self) -> String {
        hex::encode(self.0)
    }

    /// Fresh random key from the OS RNG.
    pub fn generate() -> Self {
        let mut bytes = [0u8; KEY_LEN];
        OsRng.fill_bytes(&mut bytes);
        Self(bytes)
    }
}

impl std::fmt::Debug for SealKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_tuple("SealKey").field(&"[REDACTED]").finish()
    }
}

/// Seal a payload with AES-256-GCM.
///
/// Output layout: `nonce(12) || ciphertext || tag(16)`, self-contained and
/// decryptable given only the key. Nonce is 12 random bytes from OsRng.
pub fn seal(payload: &[u8], key: &SealKey) -> Result<Vec<u8>> {
    let cipher = Aes256Gcm::new_from_slice(&key.0)
        .map_err(|e| TransferError::Unknown(format!("invalid key: {e}")))?;

    let mut nonce_bytes = [0u8; NONCE_LEN];
    OsRng.fill_bytes(&mut nonce_bytes);
    let nonce = Nonce::from_slice(&nonce_bytes);

    let ciphertext = cipher
        .encrypt(nonce, payload)
        .map_err(|e| TransferError::Unknown(format!("encryption failed: {e}")))?;

    let mut sealed = Vec::with_capacity(NONCE_LEN + ciphertext.len());
    sealed.extend_from_slice(&nonce_bytes);
    sealed.extend_from_slice(&ciphertext);
    Ok(sealed)
}

/// Open a sealed blob, verifying the authentication tag.
pub fn open(sealed: &[u8], key: &SealKey) -> Result<Vec<u8>> {
    if sealed.len() < NONCE_LEN + TAG_LEN {
        return Err(TransferError::DecryptionFailure(
            "sealed blob too short".to_string(),
        ));
    }
    let (nonce_bytes, ciphertext) = sealed.split_at(NONCE_LEN);

    let cipher = Aes256Gcm::new_from_slice(&key.0)
        .map_err(|e| TransferError::DecryptionFailure(format!("invalid key: {e}")))?;

    cipher
        .decrypt(Nonce::from_slice(nonce_bytes), ciphertext)
        .map_err(|_| TransferError::DecryptionFailure("authentication failed".to_string()))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn seal_open_roundtrip() {
        let key = SealKey::generate();
        let plaintext = b"Hello, Porter! This is secret data.";

        let sealed = seal(plaintext, &key).unwrap();
        assert_ne!(&sealed[NONCE_LEN..], plaintext.as_slice());
        assert_eq!(sealed.len(), NONCE_LEN + plaintext.len() + TAG_LEN);

        let opened = open(&sealed, &key).unwrap();
        assert_eq!(opened, plaintext);
    }

    #[test]
    fn wrong_key_fails_open() {
        let sealed = seal(b"secret data", &SealKey::generate()).unwrap();
        let result = open(&sealed, &SealKey::generate());
        assert!(matches!(result, Err(TransferError::DecryptionFailure(_))));
    }

    #[test]
    fn tampered_blob_fails_open() {
        let key = SealKey::generate();
        let mut sealed = seal(b"secret data", &key).unwrap();
        let last = sealed.len() - 1;
        sealed[last] ^= 0x01;
        assert!(matches!(
            open(&sealed, &key),
            Err(TransferError::DecryptionFailure(_))
        ));
    }

    #[test]
    fn truncated_blob_fails_open() {
        let key = SealKey::generate();
        assert!(matches!(
            open(&[0u8; NONCE_LEN + TAG_LEN - 1], &key),
            Err(TransferError::DecryptionFailure(_))
        ));
        assert!(matches!(
            open(b"", &key),
            Err(TransferError::DecryptionFailure(_))
        ));
    }

    #[test]
    fn unique_nonces() {
        let key = SealKey::generate();
        let s1 = seal(b"same data", &key).unwrap();
        let s2 = seal(b"same data", &key).unwrap();
        assert_ne!(s1[..NONCE_LEN], s2[..NONCE_LEN]);
        assert_ne!(s1, s2);
    }

    #[test]
    fn empty_payload_roundtrip() {
        let key = SealKey::generate();
        let sealed = seal(b"", &key).unwrap();
        assert_eq!(open(&sealed, &key).unwrap(), b"");
    }

    #[test]
    fn key_hex_roundtrip() {
        let key = SealKey::generate();
        let parsed = SealKey::from_hex(&key.to_hex()).unwrap();
        assert_eq!(parsed.0, key.0);
    }

    #[test]
    fn bad_key_hex_is_rejected() {
        assert!(SealKey::from_hex("not hex").is_err());
        assert!(SealKey::from_hex("abcd").is_err());
    }

    #[test]
    fn key_debug_is_redacted() {
        let key = SealKey::from_bytes([0x42; KEY_LEN]);
        let debug = format!("{key:?}");
        assert!(debug.contains("REDACTED"));
        assert!(!debug.contains("42"));
    }
}
