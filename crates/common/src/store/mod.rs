//! Collaborators at the edge of the protocol
//!
//! - **[`DocumentStore`]**: read-only, path-addressed access to wire documents
//! - **[`WriteGateway`]**: the privileged endpoint that accepts signed batches
//!
//! The protocol never writes to the document store directly. Every write goes
//! through the gateway, which re-checks signatures and version rules and is
//! the authority of record.
//!
//! [`MemoryDocumentStore`] implements both sides in memory.

mod memory;
mod predicate;

use async_trait::async_trait;
use futures::stream::BoxStream;

use crate::object::WireDocument;

pub use memory::MemoryDocumentStore;
pub use predicate::{Op, Predicate};

#[derive(Debug, Clone, thiserror::Error)]
pub enum StoreError {
    #[error("document store error: {0}")]
    Internal(String),
}

#[derive(Debug, Clone, thiserror::Error)]
pub enum GatewayError {
    #[error("'{0}' is not signed")]
    MissingSignature(String),
    #[error("invalid signature on '{0}'")]
    InvalidSignature(String),
    #[error("'{owner_path}' is not a known owner of '{path}'")]
    UnknownOwner { path: String, owner_path: String },
    #[error("version conflict on '{path}': stored {current:?}, proposed {proposed}")]
    VersionConflict {
        path: String,
        current: Option<i64>,
        proposed: i64,
    },
    #[error("'{0}' has been deleted")]
    Tombstoned(String),
    #[error("gateway error: {0}")]
    Internal(String),
}

#[async_trait]
pub trait DocumentStore: Send + Sync + 'static {
    async fn get(&self, path: &str) -> Result<Option<WireDocument>, StoreError>;

    /// Documents of `collection` directly under `parent_path`
    async fn query(
        &self,
        parent_path: &str,
        collection: &str,
        predicates: &[Predicate],
    ) -> Result<Vec<WireDocument>, StoreError>;

    /// The current result of a query, then again after every change
    fn watch(
        &self,
        parent_path: &str,
        collection: &str,
        predicates: Vec<Predicate>,
    ) -> BoxStream<'static, Result<Vec<WireDocument>, StoreError>>;
}

#[async_trait]
pub trait WriteGateway: Send + Sync + 'static {
    /// Accept or reject a batch of signed documents as a whole
    async fn submit(&self, batch: Vec<WireDocument>) -> Result<(), GatewayError>;
}
