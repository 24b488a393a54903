//! Cryptographic primitives for Trellis
//!
//! This module provides the cryptographic foundation for the object protocol:
//!
//! - **Signing**: Ed25519 keypairs ([`SignKey`]/[`VerifyKey`]) prove which owner wrote a document
//! - **Encryption identities**: X25519 keypairs ([`PrivateEncryptionKey`]/[`PublicEncryptionKey`])
//! - **Content encryption**: ChaCha20-Poly1305 under a one-time [`SecretKey`]
//! - **Key agreement**: X25519 ECDH followed by a BLAKE3 KDF
//! - **Password derivation**: Argon2id with a per-role domain tag
//!
//! # Envelope Encryption
//!
//! Confidential fields are encrypted once under a fresh content key. The
//! content key is then wrapped separately for every recipient:
//! 1. Generate an ephemeral X25519 keypair for the document
//! 2. Agree on a shared key with each recipient's public encryption key
//! 3. AEAD-encrypt the content key under that shared key, giving a [`WrappedKey`]
//!
//! A recipient recovers the content key by agreeing on the same shared key
//! from their private key and the document's ephemeral public key.
//!
//! All byte outputs are standard base64 at the boundary.

mod keys;
mod password;
mod secret;
mod wrapped_key;

use base64::engine::general_purpose::STANDARD;
use base64::Engine;
use serde::{Deserialize, Serialize};
use sha2::{Digest, Sha512};

pub use keys::{
    Key, PrivateEncryptionKey, PublicEncryptionKey, SignKey, VerifyKey, PRIVATE_KEY_SIZE,
    PUBLIC_KEY_SIZE, SIGNATURE_SIZE,
};
pub use password::{derive_from_password, KdfParams};
pub use secret::{SecretKey, NONCE_SIZE, SECRET_SIZE};
pub use wrapped_key::WrappedKey;

/// Errors that can occur in the primitive layer
#[derive(Debug, thiserror::Error)]
pub enum CryptoError {
    #[error("invalid key: {0}")]
    InvalidKey(String),
    #[error("base64 decode error: {0}")]
    Base64(#[from] base64::DecodeError),
    #[error("encrypt error")]
    Encrypt,
    #[error("decrypt error")]
    Decrypt,
    #[error("key derivation error: {0}")]
    Kdf(String),
    #[error("random source error: {0}")]
    Random(String),
}

/// The closed set of key roles
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum KeyRole {
    Sign,
    Verify,
    Encrypt,
    Decrypt,
    Secret,
}

impl KeyRole {
    /// Domain tag mixed into password derivations so one password and
    ///  salt never yield the same bytes for two roles
    pub fn domain(&self) -> &'static str {
        match self {
            KeyRole::Sign | KeyRole::Verify => "signKey",
            KeyRole::Encrypt | KeyRole::Decrypt => "privateEncryptionKey",
            KeyRole::Secret => "secretKey",
        }
    }
}

impl std::fmt::Display for KeyRole {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            KeyRole::Sign => write!(f, "sign"),
            KeyRole::Verify => write!(f, "verify"),
            KeyRole::Encrypt => write!(f, "encrypt"),
            KeyRole::Decrypt => write!(f, "decrypt"),
            KeyRole::Secret => write!(f, "secret"),
        }
    }
}

pub(crate) fn b64_encode(bytes: impl AsRef<[u8]>) -> String {
    STANDARD.encode(bytes)
}

pub(crate) fn b64_decode(s: &str) -> Result<Vec<u8>, CryptoError> {
    Ok(STANDARD.decode(s)?)
}

pub(crate) fn random_bytes<const N: usize>() -> Result<[u8; N], CryptoError> {
    let mut buff = [0u8; N];
    getrandom::getrandom(&mut buff).map_err(|e| CryptoError::Random(e.to_string()))?;
    Ok(buff)
}

/// Handle to the primitive operations.
///
/// Carries the password KDF cost so every caller derives identical
/// identities from the same password. Cheap to clone.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct Crypto {
    kdf: KdfParams,
}

impl Crypto {
    pub fn new(kdf: KdfParams) -> Self {
        Self { kdf }
    }

    pub fn kdf(&self) -> &KdfParams {
        &self.kdf
    }

    /// Detached Ed25519 signature over `bytes`, base64
    pub fn sign(&self, bytes: &[u8], key: &SignKey) -> String {
        b64_encode(key.sign(bytes))
    }

    /// Check a base64 signature. Malformed input is just `false`.
    pub fn verify(&self, bytes: &[u8], signature: &str, key: &VerifyKey) -> bool {
        key.verify_b64(bytes, signature)
    }

    /// Encrypt under `key`, returning base64 `nonce || ciphertext`
    pub fn aead_encrypt(&self, bytes: &[u8], key: &SecretKey) -> Result<String, CryptoError> {
        Ok(b64_encode(key.encrypt(bytes)?))
    }

    pub fn aead_decrypt(&self, data: &str, key: &SecretKey) -> Result<Vec<u8>, CryptoError> {
        key.decrypt(&b64_decode(data)?)
    }

    /// SHA-512 digest, base64
    pub fn hash(&self, bytes: &[u8]) -> String {
        b64_encode(Sha512::digest(bytes))
    }

    /// Symmetric key agreed between a private and a public encryption key
    pub fn agree(&self, private: &PrivateEncryptionKey, public: &PublicEncryptionKey) -> SecretKey {
        SecretKey::agree(private, public)
    }

    pub fn derive_from_password(
        &self,
        password: &str,
        salt: &str,
        domain: &str,
    ) -> Result<[u8; SECRET_SIZE], CryptoError> {
        derive_from_password(&self.kdf, password, salt, domain)
    }

    /// Run the password KDF off the async executor
    pub async fn derive_from_password_async(
        &self,
        password: &str,
        salt: &str,
        domain: &str,
    ) -> Result<[u8; SECRET_SIZE], CryptoError> {
        let kdf = self.kdf.clone();
        let (password, salt, domain) = (password.to_string(), salt.to_string(), domain.to_string());
        tokio::task::spawn_blocking(move || derive_from_password(&kdf, &password, &salt, &domain))
            .await
            .map_err(|e| CryptoError::Kdf(e.to_string()))?
    }

    /// Deterministic signing identity for `password` at `salt`
    pub async fn sign_key_from_password(
        &self,
        password: &str,
        salt: &str,
    ) -> Result<SignKey, CryptoError> {
        let seed = self
            .derive_from_password_async(password, salt, KeyRole::Sign.domain())
            .await?;
        Ok(SignKey::from(seed))
    }

    /// Deterministic decryption identity for `password` at `salt`
    pub async fn decryption_key_from_password(
        &self,
        password: &str,
        salt: &str,
    ) -> Result<PrivateEncryptionKey, CryptoError> {
        let seed = self
            .derive_from_password_async(password, salt, KeyRole::Decrypt.domain())
            .await?;
        Ok(PrivateEncryptionKey::from(seed))
    }

    /// Deterministic symmetric key for `password` at `salt`
    pub async fn secret_key_from_password(
        &self,
        password: &str,
        salt: &str,
    ) -> Result<SecretKey, CryptoError> {
        let seed = self
            .derive_from_password_async(password, salt, KeyRole::Secret.domain())
            .await?;
        Ok(SecretKey::from(seed))
    }
}

#[cfg(test)]
mod test {
    use super::*;

    fn crypto() -> Crypto {
        Crypto::new(KdfParams::new(64, 1, 1))
    }

    #[test]
    fn test_sign_verify_never_panics() {
        let crypto = crypto();
        let key = SignKey::generate().unwrap();
        let signature = crypto.sign(b"payload", &key);

        assert!(crypto.verify(b"payload", &signature, &key.verify_key()));
        assert!(!crypto.verify(b"payload!", &signature, &key.verify_key()));
        assert!(!crypto.verify(b"payload", "not base64 !!", &key.verify_key()));
        assert!(!crypto.verify(b"payload", "AAAA", &key.verify_key()));
    }

    #[test]
    fn test_agree_is_commutative() {
        let crypto = crypto();
        let a = PrivateEncryptionKey::generate().unwrap();
        let b = PrivateEncryptionKey::generate().unwrap();

        let ab = crypto.agree(&a, &b.public_key());
        let ba = crypto.agree(&b, &a.public_key());
        assert_eq!(ab, ba);

        let c = PrivateEncryptionKey::generate().unwrap();
        assert_ne!(ab, crypto.agree(&c, &b.public_key()));
    }

    #[test]
    fn test_hash_is_stable() {
        let crypto = crypto();
        assert_eq!(crypto.hash(b"abc"), crypto.hash(b"abc"));
        assert_ne!(crypto.hash(b"abc"), crypto.hash(b"abd"));
        assert_eq!(b64_decode(&crypto.hash(b"abc")).unwrap().len(), 64);
    }

    #[tokio::test]
    async fn test_password_roles_are_separated() {
        let crypto = crypto();
        let sign = crypto.sign_key_from_password("hunter2", "/cities/a").await.unwrap();
        let again = crypto.sign_key_from_password("hunter2", "/cities/a").await.unwrap();
        let decrypt = crypto
            .decryption_key_from_password("hunter2", "/cities/a")
            .await
            .unwrap();

        assert_eq!(sign.to_bytes(), again.to_bytes());
        assert_ne!(sign.to_bytes(), decrypt.to_bytes());
    }
}
