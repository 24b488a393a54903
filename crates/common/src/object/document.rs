use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::canonical::canonicalize;
use crate::crypto::{Crypto, PublicEncryptionKey, VerifyKey, WrappedKey};

/// Sealed confidential fields
///
/// # Wire Format
///
/// ```text
/// {
///   "ephemeralPublicKey": base64,
///   "ciphertext": base64(nonce || ciphertext),
///   "recipientWrappedKeys": { "<recipient path>": WrappedKey, ... }
/// }
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Envelope {
    pub ephemeral_public_key: PublicEncryptionKey,
    pub ciphertext: String,
    pub recipient_wrapped_keys: BTreeMap<String, WrappedKey>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct DocumentSignature {
    /// base64 Ed25519 signature over the canonical document without this field
    pub signature: String,
    pub owner_path: String,
    pub owner_verify_key: VerifyKey,
}

/// The transmissible form of a node
///
/// Plain fields are flattened next to the protocol fields. Confidential
/// fields only ever appear inside [`Envelope::ciphertext`].
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct WireDocument {
    pub path: String,
    pub version: i64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub verify_key: Option<VerifyKey>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub public_key: Option<PublicEncryptionKey>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidential: Option<Envelope>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub signature: Option<DocumentSignature>,
    #[serde(flatten)]
    pub fields: BTreeMap<String, Value>,
}

impl WireDocument {
    pub fn new(path: impl Into<String>, version: i64) -> Self {
        Self {
            path: path.into(),
            version,
            verify_key: None,
            public_key: None,
            confidential: None,
            signature: None,
            fields: BTreeMap::new(),
        }
    }

    pub fn is_tombstone(&self) -> bool {
        self.version < 0
    }

    /// The bytes a signature covers: the canonical document minus its signature
    pub fn signing_bytes(&self) -> Vec<u8> {
        let unsigned = Self {
            signature: None,
            ..self.clone()
        };
        match serde_json::to_value(&unsigned) {
            Ok(value) => canonicalize(&value, false).to_bytes(),
            Err(_) => Vec::new(),
        }
    }

    /// Check the embedded signature against its embedded verify key
    ///
    /// Says nothing about whether that key may sign this document.
    pub fn verify_self_signed(&self, crypto: &Crypto) -> bool {
        match &self.signature {
            Some(sig) => crypto.verify(&self.signing_bytes(), &sig.signature, &sig.owner_verify_key),
            None => false,
        }
    }

    /// Last path segment
    pub fn id(&self) -> &str {
        self.path.rsplit('/').next().unwrap_or_default()
    }

    /// Path of the node this document sits under, `""` for the root
    pub fn parent_path(&self) -> &str {
        let mut segments = self.path.rsplitn(3, '/');
        segments.next();
        segments.next();
        segments.next().unwrap_or_default()
    }

    /// Collection this document sits in
    pub fn collection(&self) -> &str {
        let mut segments = self.path.rsplitn(3, '/');
        segments.next();
        segments.next().unwrap_or_default()
    }

    pub fn from_json(json: &str) -> Result<Self, serde_json::Error> {
        serde_json::from_str(json)
    }

    pub fn to_json(&self) -> Result<String, serde_json::Error> {
        serde_json::to_string(self)
    }
}
