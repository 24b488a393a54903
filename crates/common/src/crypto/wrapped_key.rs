//! Per-recipient wrapping of a content key
//!
//! A document's content key is wrapped once for every recipient that must be
//! able to read its confidential fields. All wraps of one document share the
//! same ephemeral keypair, whose public half travels in the envelope.
//!
//! # Protocol Overview
//!
//! To wrap a content key for a recipient:
//! 1. **Agree**: derive a wrapping key from the ephemeral private key and the recipient's public key
//! 2. **Encrypt**: AEAD-encrypt the content key under the wrapping key
//! 3. **Package**: record the recipient's public key next to the ciphertext
//!
//! The recipient recovers the content key by:
//! 1. **Agree**: derive the same wrapping key from their private key and the ephemeral public key
//! 2. **Decrypt**: AEAD-decrypt the content key
//!
//! The recorded recipient public key lets a reader check that the private key
//! it holds for a path is the one the writer wrapped for, before trying it.

use serde::{Deserialize, Serialize};

use super::keys::{PrivateEncryptionKey, PublicEncryptionKey};
use super::secret::SecretKey;
use super::{b64_decode, b64_encode, CryptoError};

/// A content key wrapped for a single recipient
///
/// # Wire Format
///
/// ```text
/// { "recipientPublicKey": base64, "wrappedContentKey": base64(nonce || ciphertext) }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WrappedKey {
    pub recipient_public_key: PublicEncryptionKey,
    pub wrapped_content_key: String,
}

impl WrappedKey {
    /// Wrap `content_key` so that only the holder of `recipient`'s private key can recover it
    ///
    /// # Arguments
    ///
    /// * `content_key` - The one-time key the confidential fields were encrypted under
    /// * `ephemeral` - The document's ephemeral private encryption key
    /// * `recipient` - The public encryption key of the intended recipient
    pub fn new(
        content_key: &SecretKey,
        ephemeral: &PrivateEncryptionKey,
        recipient: &PublicEncryptionKey,
    ) -> Result<Self, CryptoError> {
        let wrapping_key = SecretKey::agree(ephemeral, recipient);
        let wrapped = wrapping_key.encrypt(content_key.bytes())?;

        Ok(Self {
            recipient_public_key: *recipient,
            wrapped_content_key: b64_encode(wrapped),
        })
    }

    /// Whether this wrap was made for `recipient`'s public key
    pub fn is_for(&self, recipient: &PrivateEncryptionKey) -> bool {
        self.recipient_public_key == recipient.public_key()
    }

    /// Recover the content key using the recipient's private key
    ///
    /// # Errors
    ///
    /// Returns [`CryptoError::Decrypt`] if the wrap was made for a different
    /// recipient or the data was corrupted or tampered with.
    pub fn recover(
        &self,
        recipient: &PrivateEncryptionKey,
        ephemeral_public: &PublicEncryptionKey,
    ) -> Result<SecretKey, CryptoError> {
        let wrapping_key = SecretKey::agree(recipient, ephemeral_public);
        let unwrapped = wrapping_key.decrypt(&b64_decode(&self.wrapped_content_key)?)?;
        SecretKey::from_slice(&unwrapped).map_err(|_| CryptoError::Decrypt)
    }
}
