//! The authenticated object protocol
//!
//! This module turns tree nodes into signed, selectively encrypted wire
//! documents and back:
//!
//! - **[`Policy`]**: static, per-type metadata (collection, owner type, delegation flags, field manifest)
//! - **[`Node`]**: a tree element with identity, version and field values
//! - **[`Root`]**: the authorization terminus holding the key store and store handles
//! - **[`WireDocument`]**: the flattened, transmissible form of a node
//!
//! # Ownership
//!
//! Every node is owned by the nearest ancestor whose type matches its
//! policy's owner type, or by the root. Ownership is purely structural:
//!
//! ```text
//! Root ("")
//!   |
//!   +-- /cities/paris           owner: Root
//!         |
//!         +-- /cities/paris/jobs/42     owner: /cities/paris
//! ```
//!
//! A document must be signed by its owner's key. An owner higher up may sign
//! instead when every owner in between sets `owner_may_write`.
//!
//! # Confidential Fields
//!
//! Fields marked confidential in the manifest are sealed under a one-time
//! content key. The content key is wrapped for every recipient: the owners
//! along the `owner_may_read` chain, optionally the node itself, and any
//! explicit recipients. Any single recipient can open the envelope.
//!
//! # Versions
//!
//! ```text
//! Unpersisted(0) --write--> Persisted(1) --write--> Persisted(n+1)
//!                                |
//!                                +--delete--> Tombstoned(-n)   (terminal)
//! ```

mod document;
mod loader;
mod node;
mod policy;
mod protocol;
mod root;

pub use document::{DocumentSignature, Envelope, WireDocument};
pub use node::{Children, Node, Parent, Principal};
pub use policy::{Field, OwnerKind, Policy, SelfRecipient};
pub use root::Root;

use crate::crypto::CryptoError;
use crate::key_store::KeyStoreError;
use crate::store::{GatewayError, StoreError};

/// Path of the wrapped key and signature owner used in device mode
pub const DEVICE_OWNER_PATH: &str = crate::key_store::DEVICE_PATH;

#[derive(Debug, thiserror::Error)]
pub enum ObjectError {
    #[error("path mismatch: expected '{expected}', document has '{found}'")]
    PathMismatch { expected: String, found: String },
    #[error("document '{0}' is not signed")]
    NoSignature(String),
    #[error("invalid signature on '{0}'")]
    InvalidSignature(String),
    #[error("'{owner_path}' is not allowed to sign '{path}'")]
    WrongOwner { path: String, owner_path: String },
    #[error("signature on '{path}' does not carry the known verify key of '{owner_path}'")]
    WrongVerifyKey { path: String, owner_path: String },
    #[error("no signing key available for '{0}'")]
    NoSigningKey(String),
    #[error("no decryption key available for '{0}'")]
    NoDecryptionKey(String),
    #[error("'{0}' is not persisted or already deleted")]
    AlreadyDeleted(String),
    #[error("confidential fields of '{0}' could not be decrypted")]
    DecryptFailure(String),
    #[error("confidential fields of '{0}' have no recipients")]
    NoRecipients(String),
    #[error("recipient '{recipient}' of '{path}' has no public encryption key")]
    MissingRecipientKey { path: String, recipient: String },
    #[error("confidential field '{field}' of '{path}' was sent in plaintext")]
    PlaintextConfidential { path: String, field: &'static str },
    #[error("'{field}' is not a field of {kind}")]
    UnknownField { kind: &'static str, field: String },
    #[error("{0} does not support password identities")]
    PasswordNotSupported(&'static str),
    #[error("invalid password identity: {0}")]
    InvalidPasswordIdentity(String),
    #[error("document '{0}' not found")]
    NotFound(String),
    #[error("key store error: {0}")]
    KeyStore(#[from] KeyStoreError),
    #[error("crypto error: {0}")]
    Crypto(#[from] CryptoError),
    #[error("store error: {0}")]
    Store(#[from] StoreError),
    #[error("gateway error: {0}")]
    Gateway(#[from] GatewayError),
    #[error("codec error: {0}")]
    Codec(#[from] serde_json::Error),
}

/// What happens to the version when a node is serialized
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum VersionTransition {
    /// Emit the current version
    #[default]
    Keep,
    /// Emit the next version, as for an upload
    Increment,
}

/// Who signs a document
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SignMode {
    /// The owner, or an owner further up that may write on its behalf
    #[default]
    Owner,
    /// The local device identity. Confidential fields are only wrapped for
    /// the device and explicit recipients.
    Device,
}

/// How a document is verified and opened
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum ReadMode {
    /// Verify against the owner chain, decrypt with any key we hold
    #[default]
    Default,
    /// Verify against the local device identity, decrypt with the device key.
    /// A signature from any other owner path is `WrongOwner`; one from
    /// another device is `WrongVerifyKey`.
    Device,
    /// Verify against the owner chain, never decrypt
    Opaque,
}
