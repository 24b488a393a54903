//! Local key management
//!
//! - **[`KeyStore`]**: durable registry of signing and decryption keys by tree path
//! - **[`KeyContainer`]**: per-operation overlay of stored, one-off and prompted keys
//! - **[`PasswordPrompt`]**: the external collaborator asked for the storage password
//!
//! # Storage tiers
//!
//! Every stored key is encrypted under a key derived from the storage password:
//!
//! | tier          | protected by                          | when decrypted                    |
//! |---------------|---------------------------------------|-----------------------------------|
//! | stored-plain  | "without prompt" storage key          | once, when the store is opened    |
//! | stored-prompt | "prompt" storage key                  | per container, after one prompt   |
//! | ephemeral     | nothing, never leaves the container   | n/a                               |
//!
//! The "without prompt" storage key is derived once and kept for the
//! lifetime of the store. The "prompt" storage key is re-derived for every
//! container that needs it, from a password obtained through the prompt.
//!
//! Stored keys are either session keys (dropped on export) or persistent.
//! The reserved [`DEVICE_PATH`] always holds a plain, persistent signing and
//! decryption identity.

mod container;
mod prompt;
mod record;
mod store;

use crate::crypto::{CryptoError, KdfParams, KeyRole};

pub use container::KeyContainer;
pub use prompt::{NoPrompt, PasswordPrompt, PromptError, StaticPrompt};
pub use record::{KeyEntryRecord, KeyStoreRecord, StoredKey};
pub use store::KeyStore;

use serde::{Deserialize, Serialize};

/// Path of the identity every installation provisions for itself
pub const DEVICE_PATH: &str = "device";

/// Salt for the storage key that is cached for the store's lifetime
pub(crate) const STORAGE_SALT_PLAIN: &str = "withoutPrompt";
/// Salt for the storage key that needs the password at use time
pub(crate) const STORAGE_SALT_PROMPT: &str = "prompt";

#[derive(Debug, thiserror::Error)]
pub enum KeyStoreError {
    #[error("no {role} key for '{path}'")]
    KeyNotFound { path: String, role: KeyRole },
    #[error("wrong password")]
    WrongPassword,
    #[error("storage password prompt was rejected")]
    PromptRejected,
    #[error("{0} keys are not kept in the key store")]
    UnsupportedRole(KeyRole),
    #[error("stored {role} key for '{path}' could not be decrypted")]
    Corrupt { path: String, role: KeyRole },
    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),
    #[error("codec error: {0}")]
    Codec(#[from] serde_json::Error),
}

/// Where a key lives once it has been handed to the store
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Storage {
    /// Not kept anywhere
    #[default]
    None,
    /// Only inside the container it was set on
    Once,
    /// Stored, but dropped on export
    Session,
    /// Stored and exported
    Persistent,
}

/// How a key should be kept
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct KeyPolicy {
    pub store: Storage,
    /// Protect with the prompt storage key instead of the cached one
    #[serde(default)]
    pub prompt: bool,
}

impl KeyPolicy {
    pub const NONE: KeyPolicy = KeyPolicy {
        store: Storage::None,
        prompt: false,
    };
    pub const ONCE: KeyPolicy = KeyPolicy {
        store: Storage::Once,
        prompt: false,
    };
    pub const SESSION: KeyPolicy = KeyPolicy {
        store: Storage::Session,
        prompt: false,
    };
    pub const PERSISTENT: KeyPolicy = KeyPolicy {
        store: Storage::Persistent,
        prompt: false,
    };

    pub fn with_prompt(self) -> Self {
        Self {
            prompt: true,
            ..self
        }
    }
}

/// Key store settings
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
pub struct KeyStoreConfig {
    #[serde(default)]
    pub kdf: KdfParams,
    /// Give up on an unanswered password prompt after this many seconds
    #[serde(default)]
    pub prompt_timeout_secs: Option<u64>,
}

pub(crate) fn check_role(role: KeyRole) -> Result<KeyRole, KeyStoreError> {
    match role {
        KeyRole::Sign | KeyRole::Decrypt => Ok(role),
        other => Err(KeyStoreError::UnsupportedRole(other)),
    }
}
