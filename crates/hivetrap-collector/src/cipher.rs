// Copyright 2025-Present Datadog, Inc. https://www.datadoghq.com/
// SPDX-License-Identifier: Apache-2.0

//! Symmetric payload encryption for the envelope codec.
//!
//! The codec treats the cipher as a black box behind [`PayloadCipher`]; the
//! default implementation is XChaCha20-Poly1305 with a random 24-byte nonce
//! prepended to the ciphertext. The 32-byte cipher key is derived as
//! SHA-256 of the configured key string, so operators can use arbitrary
//! shared-secret strings.

use chacha20poly1305::{
    aead::{Aead, AeadCore, KeyInit, OsRng},
    Key, XChaCha20Poly1305, XNonce,
};
use sha2::{Digest, Sha256};

/// Nonce length for XChaCha20-Poly1305 (extended nonce, safe to draw
/// randomly per message).
const NONCE_LEN: usize = 24;

#[derive(Debug, thiserror::Error)]
pub enum CipherError {
    #[error("payload encryption failed")]
    Encrypt,

    #[error("payload decryption failed (wrong key or corrupted ciphertext)")]
    Decrypt,

    #[error("ciphertext too short to carry a nonce")]
    Truncated,
}

/// Black-box symmetric encryption used by the envelope codec.
///
/// `decrypt` exists for the collector side of the shared secret and for
/// round-trip verification in tests; the client only encrypts.
pub trait PayloadCipher: Send + Sync {
    fn encrypt(&self, key: &str, plaintext: &[u8]) -> Result<Vec<u8>, CipherError>;
    fn decrypt(&self, key: &str, ciphertext: &[u8]) -> Result<Vec<u8>, CipherError>;
}

/// Default [`PayloadCipher`]: XChaCha20-Poly1305, nonce-prefixed output.
#[derive(Debug, Clone, Copy, Default)]
pub struct XChaChaPayloadCipher;

fn derive_key(key: &str) -> Key {
    let digest = Sha256::digest(key.as_bytes());
    Key::clone_from_slice(digest.as_slice())
}

impl PayloadCipher for XChaChaPayloadCipher {
    fn encrypt(&self, key: &str, plaintext: &[u8]) -> Result<Vec<u8>, CipherError> {
        let cipher = XChaCha20Poly1305::new(&derive_key(key));
        let nonce = XChaCha20Poly1305::generate_nonce(&mut OsRng);
        let ciphertext = cipher
            .encrypt(&nonce, plaintext)
            .map_err(|_| CipherError::Encrypt)?;

        let mut out = Vec::with_capacity(NONCE_LEN + ciphertext.len());
        out.extend_from_slice(nonce.as_slice());
        out.extend_from_slice(&ciphertext);
        Ok(out)
    }

    fn decrypt(&self, key: &str, ciphertext: &[u8]) -> Result<Vec<u8>, CipherError> {
        if ciphertext.len() < NONCE_LEN {
            return Err(CipherError::Truncated);
        }
        let (nonce, body) = ciphertext.split_at(NONCE_LEN);
        let cipher = XChaCha20Poly1305::new(&derive_key(key));
        cipher
            .decrypt(XNonce::from_slice(nonce), body)
            .map_err(|_| CipherError::Decrypt)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_encrypt_decrypt_round_trip() {
        let cipher = XChaChaPayloadCipher;
        let plaintext = br#"{"hmac":"00","content":[]}"#;

        let ciphertext = cipher.encrypt("shared-secret", plaintext).unwrap();
        assert_ne!(&ciphertext[NONCE_LEN..], plaintext.as_slice());

        let recovered = cipher.decrypt("shared-secret", &ciphertext).unwrap();
        assert_eq!(recovered, plaintext);
    }

    #[test]
    fn test_nonce_makes_ciphertexts_differ() {
        let cipher = XChaChaPayloadCipher;
        let a = cipher.encrypt("k", b"same input").unwrap();
        let b = cipher.encrypt("k", b"same input").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_wrong_key_is_rejected() {
        let cipher = XChaChaPayloadCipher;
        let ciphertext = cipher.encrypt("right-key", b"observation").unwrap();
        assert!(matches!(
            cipher.decrypt("wrong-key", &ciphertext),
            Err(CipherError::Decrypt)
        ));
    }

    #[test]
    fn test_truncated_ciphertext_is_rejected() {
        let cipher = XChaChaPayloadCipher;
        assert!(matches!(
            cipher.decrypt("k", &[0u8; 10]),
            Err(CipherError::Truncated)
        ));
    }
}
