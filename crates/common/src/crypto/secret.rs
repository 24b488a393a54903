//! Symmetric encryption using ChaCha20-Poly1305
//!
//! A [`SecretKey`] is used in three places:
//! - **Content keys**: one fresh key per written document encrypts its confidential fields
//! - **Wrapping keys**: agreed between an ephemeral and a recipient encryption key
//! - **Storage keys**: derived from the key store password to protect stored keys

use chacha20poly1305::Key;
use chacha20poly1305::{
    aead::{Aead, KeyInit},
    ChaCha20Poly1305, Nonce,
};

use super::keys::{PrivateEncryptionKey, PublicEncryptionKey};
use super::{random_bytes, CryptoError};

/// Size of ChaCha20-Poly1305 nonce in bytes
pub const NONCE_SIZE: usize = 12;
/// Size of ChaCha20-Poly1305 key in bytes (256 bits)
pub const SECRET_SIZE: usize = 32;

/// Context string for deriving wrapping keys from an X25519 shared secret
const AGREE_CONTEXT: &str = "trellis 2024-06-01 envelope wrapping key";

/// A 256-bit symmetric encryption key
///
/// The encrypted format is: `nonce (12 bytes) || ciphertext || tag (16 bytes)`.
/// Every call to [`SecretKey::encrypt`] draws a fresh random nonce.
#[derive(PartialEq, Eq, Clone)]
pub struct SecretKey([u8; SECRET_SIZE]);

impl std::fmt::Debug for SecretKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str("SecretKey(..)")
    }
}

impl From<[u8; SECRET_SIZE]> for SecretKey {
    fn from(bytes: [u8; SECRET_SIZE]) -> Self {
        SecretKey(bytes)
    }
}

impl SecretKey {
    /// Generate a new random secret using a cryptographically secure RNG
    pub fn generate() -> Result<Self, CryptoError> {
        Ok(Self(random_bytes::<SECRET_SIZE>()?))
    }

    /// Create a secret from a byte slice
    ///
    /// # Errors
    ///
    /// Returns an error if the slice length is not exactly `SECRET_SIZE` bytes.
    pub fn from_slice(data: &[u8]) -> Result<Self, CryptoError> {
        if data.len() != SECRET_SIZE {
            return Err(CryptoError::InvalidKey(format!(
                "invalid secret size, expected {}, got {}",
                SECRET_SIZE,
                data.len()
            )));
        }
        let mut buff = [0; SECRET_SIZE];
        buff.copy_from_slice(data);
        Ok(buff.into())
    }

    /// Derive the key shared by `private` and `public`.
    ///
    /// `agree(a, B) == agree(b, A)` for keypairs `(a, A)` and `(b, B)`.
    pub fn agree(private: &PrivateEncryptionKey, public: &PublicEncryptionKey) -> Self {
        let shared = private.diffie_hellman(public);
        Self(blake3::derive_key(AGREE_CONTEXT, &shared))
    }

    /// Get a reference to the secret key bytes
    pub fn bytes(&self) -> &[u8] {
        self.0.as_ref()
    }

    /// Encrypt data using ChaCha20-Poly1305 AEAD
    pub fn encrypt(&self, data: &[u8]) -> Result<Vec<u8>, CryptoError> {
        let key = Key::from_slice(self.bytes());
        let cipher = ChaCha20Poly1305::new(key);

        let nonce_bytes = random_bytes::<NONCE_SIZE>()?;
        let nonce = Nonce::from_slice(&nonce_bytes);

        let ciphertext = cipher
            .encrypt(nonce, data)
            .map_err(|_| CryptoError::Encrypt)?;

        let mut out = Vec::with_capacity(NONCE_SIZE + ciphertext.len());
        out.extend_from_slice(nonce.as_ref());
        out.extend_from_slice(ciphertext.as_ref());

        Ok(out)
    }

    /// Decrypt data using ChaCha20-Poly1305 AEAD
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::Decrypt`] if the data is too short to contain a
    /// nonce or the authentication tag does not verify (wrong key or tampering).
    pub fn decrypt(&self, data: &[u8]) -> Result<Vec<u8>, CryptoError> {
        if data.len() < NONCE_SIZE {
            return Err(CryptoError::Decrypt);
        }

        let key = Key::from_slice(self.bytes());
        let nonce = Nonce::from_slice(&data[..NONCE_SIZE]);
        let cipher = ChaCha20Poly1305::new(key);
        cipher
            .decrypt(nonce, &data[NONCE_SIZE..])
            .map_err(|_| CryptoError::Decrypt)
    }
}
