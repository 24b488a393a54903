/**
 * Deterministic ordering of structured values.
 *  Everything that is signed, hashed or encrypted
 *  goes through here first.
 */
pub mod canonical;
/**
 * Cryptographic types and operations.
 *  - Signing and encryption keypairs
 *  - Symmetric AEAD secrets and key agreement
 *  - Password derived key material
 */
pub mod crypto;
/**
 * Local key management.
 *  The persistent key store and the short-lived
 *  key containers handed to every operation.
 */
pub mod key_store;
/**
 * The authenticated object protocol: nodes, their
 *  ownership chain and the signed, partially
 *  encrypted documents they travel as.
 */
pub mod object;
/**
 * Boundaries to the remote document store and
 *  the write gateway, plus an in-memory
 *  implementation of both.
 */
pub mod store;
/**
 * Helper for setting build version information
 *  at compile time.
 */
pub mod version;

pub mod prelude {
    pub use crate::canonical::{canonicalize, CanonicalValue};
    pub use crate::crypto::{
        Crypto, KdfParams, KeyRole, PrivateEncryptionKey, PublicEncryptionKey, SecretKey, SignKey,
        VerifyKey,
    };
    pub use crate::key_store::{KeyContainer, KeyPolicy, KeyStore, KeyStoreConfig, KeyStoreRecord};
    pub use crate::object::{
        Field, Node, ObjectError, Policy, ReadMode, Root, SelfRecipient, SignMode,
        VersionTransition, WireDocument,
    };
    pub use crate::store::{DocumentStore, MemoryDocumentStore, Predicate, WriteGateway};
    pub use crate::build_info;
    pub use crate::version::BuildInfo;
}
