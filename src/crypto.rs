//! Token encryption module using AES-256-GCM
//!
//! This module provides encryption and decryption for the Canvas access
//! token stored alongside each connection, using AES-256-GCM with
//! additional authenticated data (AAD) binding a secret to its connection.
//! The nonce is stored as a separate `iv` column rather than being packed
//! into the ciphertext.

#![allow(deprecated)]

use aes_gcm::{
    Aes256Gcm, Key, Nonce,
    aead::{Aead, AeadCore, KeyInit, OsRng, Payload},
};
use thiserror::Error;
use uuid::Uuid;
use zeroize::{Zeroize, ZeroizeOnDrop};

const NONCE_LEN: usize = 12;
const TAG_LEN: usize = 16;

/// Crypto error types
#[derive(Debug, Error)]
pub enum CryptoError {
    #[error("encryption failed: {0}")]
    EncryptionFailed(String),
    #[error("decryption failed")]
    DecryptionFailed,
    #[error("invalid key length: expected 32 bytes, got {0}")]
    InvalidKeyLength(usize),
    #[error("invalid ciphertext format")]
    InvalidFormat,
}

/// Secure wrapper for the encryption key with zeroization on drop.
#[derive(Debug, Clone, Zeroize, ZeroizeOnDrop)]
pub struct CryptoKey(Vec<u8>);

impl CryptoKey {
    /// Create a new crypto key from bytes. The key must be exactly 32 bytes.
    pub fn new(bytes: Vec<u8>) -> Result<Self, CryptoError> {
        if bytes.len() != 32 {
            return Err(CryptoError::InvalidKeyLength(bytes.len()));
        }
        Ok(CryptoKey(bytes))
    }

    fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

/// An encrypted access token: ciphertext (with trailing auth tag) plus the
/// nonce it was sealed with. Maps 1:1 onto the lms_secrets columns.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct EncryptedToken {
    pub ciphertext: Vec<u8>,
    pub iv: Vec<u8>,
}

/// AES-256-GCM codec for connection secrets.
///
/// Decryption fails closed: any mismatch in key, nonce, AAD or ciphertext
/// yields [`CryptoError::DecryptionFailed`], never partial plaintext.
#[derive(Debug, Clone)]
pub struct TokenCipher {
    key: CryptoKey,
}

impl TokenCipher {
    pub fn new(key: CryptoKey) -> Self {
        Self { key }
    }

    /// Encrypt a plaintext token under the given AAD with a fresh random nonce.
    pub fn encrypt(&self, aad: &[u8], plaintext: &str) -> Result<EncryptedToken, CryptoError> {
        let cipher_key = Key::<Aes256Gcm>::from_slice(self.key.as_bytes());
        let cipher = Aes256Gcm::new(cipher_key);

        let nonce = Aes256Gcm::generate_nonce(&mut OsRng);

        let ciphertext = cipher
            .encrypt(
                &nonce,
                Payload {
                    msg: plaintext.as_bytes(),
                    aad,
                },
            )
            .map_err(|e| CryptoError::EncryptionFailed(e.to_string()))?;

        Ok(EncryptedToken {
            ciphertext,
            iv: nonce.to_vec(),
        })
    }

    /// Decrypt a token previously produced by [`encrypt`](Self::encrypt).
    pub fn decrypt(&self, aad: &[u8], token: &EncryptedToken) -> Result<String, CryptoError> {
        if token.iv.len() != NONCE_LEN || token.ciphertext.len() < TAG_LEN {
            return Err(CryptoError::InvalidFormat);
        }

        let cipher_key = Key::<Aes256Gcm>::from_slice(self.key.as_bytes());
        let cipher = Aes256Gcm::new(cipher_key);
        let nonce = Nonce::from_slice(&token.iv);

        let plaintext = cipher
            .decrypt(
                nonce,
                Payload {
                    msg: &token.ciphertext,
                    aad,
                },
            )
            .map_err(|_| CryptoError::DecryptionFailed)?;

        String::from_utf8(plaintext).map_err(|_| CryptoError::DecryptionFailed)
    }
}

/// AAD binding a secret to its connection identity. A secret copied onto
/// another owner's connection row fails to decrypt.
pub fn secret_aad(owner_id: &Uuid, provider: &str, base_url: &str) -> Vec<u8> {
    format!("{}|{}|{}", owner_id, provider, base_url).into_bytes()
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_cipher() -> TokenCipher {
        TokenCipher::new(CryptoKey::new(vec![7u8; 32]).expect("valid test key"))
    }

    #[test]
    fn encrypt_decrypt_roundtrip() {
        let cipher = test_cipher();
        let aad = b"test-aad";

        let encrypted = cipher.encrypt(aad, "canvas-token-1234").expect("encrypts");
        let decrypted = cipher.decrypt(aad, &encrypted).expect("decrypts");

        assert_eq!(decrypted, "canvas-token-1234");
    }

    #[test]
    fn different_key_fails() {
        let cipher = test_cipher();
        let other = TokenCipher::new(CryptoKey::new(vec![8u8; 32]).unwrap());
        let aad = b"test-aad";

        let encrypted = cipher.encrypt(aad, "secret").expect("encrypts");
        assert!(matches!(
            other.decrypt(aad, &encrypted),
            Err(CryptoError::DecryptionFailed)
        ));
    }

    #[test]
    fn different_aad_fails() {
        let cipher = test_cipher();

        let encrypted = cipher.encrypt(b"aad-one", "secret").expect("encrypts");
        assert!(matches!(
            cipher.decrypt(b"aad-two", &encrypted),
            Err(CryptoError::DecryptionFailed)
        ));
    }

    #[test]
    fn flipped_ciphertext_bit_fails() {
        let cipher = test_cipher();
        let aad = b"test-aad";

        let mut encrypted = cipher.encrypt(aad, "secret message").expect("encrypts");
        encrypted.ciphertext[0] ^= 0x01;

        assert!(matches!(
            cipher.decrypt(aad, &encrypted),
            Err(CryptoError::DecryptionFailed)
        ));
    }

    #[test]
    fn tampered_iv_fails() {
        let cipher = test_cipher();
        let aad = b"test-aad";

        let mut encrypted = cipher.encrypt(aad, "secret message").expect("encrypts");
        encrypted.iv[3] ^= 0x01;

        assert!(matches!(
            cipher.decrypt(aad, &encrypted),
            Err(CryptoError::DecryptionFailed)
        ));
    }

    #[test]
    fn empty_plaintext_roundtrips() {
        let cipher = test_cipher();
        let aad = b"test-aad";

        let encrypted = cipher.encrypt(aad, "").expect("encrypts");
        assert_eq!(cipher.decrypt(aad, &encrypted).expect("decrypts"), "");
    }

    #[test]
    fn nonce_is_unique_per_encryption() {
        let cipher = test_cipher();
        let aad = b"test-aad";

        let first = cipher.encrypt(aad, "secret").expect("encrypts");
        let second = cipher.encrypt(aad, "secret").expect("encrypts");

        assert_ne!(first.iv, second.iv);
        assert_eq!(cipher.decrypt(aad, &first).unwrap(), "secret");
        assert_eq!(cipher.decrypt(aad, &second).unwrap(), "secret");
    }

    #[test]
    fn invalid_key_length_rejected() {
        assert!(matches!(
            CryptoKey::new(vec![0u8; 16]),
            Err(CryptoError::InvalidKeyLength(16))
        ));
        assert!(matches!(
            CryptoKey::new(vec![0u8; 64]),
            Err(CryptoError::InvalidKeyLength(64))
        ));
    }

    #[test]
    fn truncated_ciphertext_rejected() {
        let cipher = test_cipher();
        let token = EncryptedToken {
            ciphertext: vec![0u8; 4],
            iv: vec![0u8; NONCE_LEN],
        };

        assert!(matches!(
            cipher.decrypt(b"aad", &token),
            Err(CryptoError::InvalidFormat)
        ));
    }

    #[test]
    fn wrong_iv_length_rejected() {
        let cipher = test_cipher();
        let token = EncryptedToken {
            ciphertext: vec![0u8; 32],
            iv: vec![0u8; 8],
        };

        assert!(matches!(
            cipher.decrypt(b"aad", &token),
            Err(CryptoError::InvalidFormat)
        ));
    }

    #[test]
    fn secret_aad_binds_connection_identity() {
        let owner = Uuid::new_v4();
        let a = secret_aad(&owner, "canvas", "https://canvas.qut.edu.au");
        let b = secret_aad(&owner, "canvas", "https://canvas.other.edu.au");
        assert_ne!(a, b);
    }
}
