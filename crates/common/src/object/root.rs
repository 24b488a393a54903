use std::sync::Arc;

use crate::crypto::{Crypto, PublicEncryptionKey, VerifyKey};
use crate::key_store::{KeyContainer, KeyStore};
use crate::store::{DocumentStore, WriteGateway};

use super::node::{Node, Parent};
use super::policy::Policy;
use super::{ObjectError, SignMode, VersionTransition};

struct RootInner {
    keys: KeyStore,
    verify_key: Option<VerifyKey>,
    public_key: Option<PublicEncryptionKey>,
    documents: Arc<dyn DocumentStore>,
    gateway: Arc<dyn WriteGateway>,
}

/// Origin of the tree and terminus of every ownership chain
///
/// Holds the key store and the collaborators documents are read from and
/// written to. Cheap to clone.
#[derive(Clone)]
pub struct Root(Arc<RootInner>);

impl std::fmt::Debug for Root {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Root")
            .field("verify_key", &self.0.verify_key)
            .field("public_key", &self.0.public_key)
            .finish()
    }
}

impl Root {
    pub fn new(
        keys: KeyStore,
        verify_key: Option<VerifyKey>,
        public_key: Option<PublicEncryptionKey>,
        documents: Arc<dyn DocumentStore>,
        gateway: Arc<dyn WriteGateway>,
    ) -> Self {
        Self(Arc::new(RootInner {
            keys,
            verify_key,
            public_key,
            documents,
            gateway,
        }))
    }

    /// Always the empty string, so children are `/<collection>/<id>`
    pub fn path(&self) -> &'static str {
        ""
    }

    pub fn keys(&self) -> &KeyStore {
        &self.0.keys
    }

    pub fn crypto(&self) -> &Crypto {
        self.0.keys.crypto()
    }

    pub fn verify_key(&self) -> Option<VerifyKey> {
        self.0.verify_key
    }

    pub fn public_key(&self) -> Option<PublicEncryptionKey> {
        self.0.public_key
    }

    pub fn documents(&self) -> &Arc<dyn DocumentStore> {
        &self.0.documents
    }

    pub fn gateway(&self) -> &Arc<dyn WriteGateway> {
        &self.0.gateway
    }

    pub fn key_container(&self) -> KeyContainer {
        self.0.keys.create_key_container()
    }

    pub fn child(&self, policy: &'static Policy) -> Node {
        Node::new(self, policy)
    }

    pub fn child_with_id(&self, policy: &'static Policy, id: impl Into<String>) -> Node {
        Node::with_id(self, policy, id)
    }

    pub fn as_parent(&self) -> Parent {
        Parent::Root(self.clone())
    }

    /// Sign every node with one container and submit them as one batch
    ///
    /// Local versions are bumped only once the gateway accepted the batch.
    pub async fn upload(
        &self,
        nodes: &mut [Node],
        container: Option<&KeyContainer>,
    ) -> Result<(), ObjectError> {
        if nodes.is_empty() {
            return Ok(());
        }
        let owned;
        let container = match container {
            Some(container) => container,
            None => {
                owned = self.key_container();
                &owned
            }
        };

        let documents = futures::future::try_join_all(nodes.iter().map(|node| {
            node.to_wire_document(
                VersionTransition::Increment,
                SignMode::Owner,
                Some(container),
            )
        }))
        .await?;

        tracing::debug!(count = documents.len(), "submitting upload batch");
        self.0.gateway.submit(documents).await?;
        for node in nodes.iter_mut() {
            node.version += 1;
        }
        Ok(())
    }

    /// Tombstone every node with one container and submit them as one batch
    pub async fn delete(
        &self,
        nodes: &mut [Node],
        container: Option<&KeyContainer>,
    ) -> Result<(), ObjectError> {
        if nodes.is_empty() {
            return Ok(());
        }
        let owned;
        let container = match container {
            Some(container) => container,
            None => {
                owned = self.key_container();
                &owned
            }
        };

        let tombstones = futures::future::try_join_all(
            nodes
                .iter()
                .map(|node| node.to_tombstone(Some(container))),
        )
        .await?;

        tracing::debug!(count = tombstones.len(), "submitting delete batch");
        self.0.gateway.submit(tombstones).await?;
        for node in nodes.iter_mut() {
            node.version = -node.version;
        }
        Ok(())
    }
}
