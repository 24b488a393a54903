use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};

use crate::crypto::KeyRole;

/// A key encrypted under one of the storage keys
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StoredKey {
    /// base64 `nonce || ciphertext` of the raw private key
    pub ciphertext: String,
    pub persistent: bool,
    pub prompt: bool,
}

/// Stored keys for one path
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyEntryRecord {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sign_key: Option<StoredKey>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub decryption_key: Option<StoredKey>,
}

impl KeyEntryRecord {
    pub fn get(&self, role: KeyRole) -> Option<&StoredKey> {
        match role {
            KeyRole::Sign => self.sign_key.as_ref(),
            KeyRole::Decrypt => self.decryption_key.as_ref(),
            _ => None,
        }
    }

    pub fn is_empty(&self) -> bool {
        self.sign_key.is_none() && self.decryption_key.is_none()
    }
}

/// Serializable form of a key store
///
/// Never contains decrypted key material.
#[derive(Debug, Clone, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct KeyStoreRecord {
    /// base64 encryption of `true` under the cached storage key
    pub storage_password_check: String,
    #[serde(default)]
    pub keys: BTreeMap<String, KeyEntryRecord>,
}

impl KeyStoreRecord {
    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string_pretty(self)
    }
}
