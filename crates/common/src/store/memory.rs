use std::collections::BTreeMap;
use std::sync::{Arc, RwLock};

use async_trait::async_trait;
use futures::stream::{self, BoxStream, StreamExt};
use tokio::sync::broadcast;
use tokio::sync::broadcast::error::RecvError;

use crate::crypto::{Crypto, VerifyKey};
use crate::object::WireDocument;

use super::{DocumentStore, GatewayError, Predicate, StoreError, WriteGateway};

/// In-memory document store and write gateway
///
/// The gateway side enforces the same rules a production gateway would:
/// every document is signed, the signer is the root or a stored ancestor
/// with a matching verify key, and versions only move forward.
#[derive(Debug, Clone)]
pub struct MemoryDocumentStore {
    inner: Arc<RwLock<MemoryDocumentStoreInner>>,
    changes: broadcast::Sender<()>,
    root_verify_key: Option<VerifyKey>,
    crypto: Crypto,
}

#[derive(Debug, Default)]
struct MemoryDocumentStoreInner {
    /// path -> latest accepted document, tombstones included
    documents: BTreeMap<String, WireDocument>,
}

impl Default for MemoryDocumentStore {
    fn default() -> Self {
        Self::new(None)
    }
}

impl MemoryDocumentStore {
    /// With no root verify key any well-formed root signature is accepted
    pub fn new(root_verify_key: Option<VerifyKey>) -> Self {
        let (changes, _) = broadcast::channel(64);
        Self {
            inner: Arc::new(RwLock::new(MemoryDocumentStoreInner::default())),
            changes,
            root_verify_key,
            crypto: Crypto::default(),
        }
    }

    /// Store a document without any checks
    pub fn insert_unchecked(&self, doc: WireDocument) -> Result<(), StoreError> {
        let mut inner = self
            .inner
            .write()
            .map_err(|e| StoreError::Internal(format!("failed to acquire write lock: {}", e)))?;
        inner.documents.insert(doc.path.clone(), doc);
        drop(inner);
        let _ = self.changes.send(());
        Ok(())
    }

    pub fn len(&self) -> usize {
        self.inner
            .read()
            .map(|inner| inner.documents.len())
            .unwrap_or_default()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn snapshot(
        &self,
        parent_path: &str,
        collection: &str,
        predicates: &[Predicate],
    ) -> Result<Vec<WireDocument>, StoreError> {
        let inner = self
            .inner
            .read()
            .map_err(|e| StoreError::Internal(format!("failed to acquire read lock: {}", e)))?;
        let prefix = format!("{}/{}/", parent_path, collection);
        Ok(inner
            .documents
            .range(prefix.clone()..)
            .take_while(|(path, _)| path.starts_with(&prefix))
            .filter(|(path, _)| !path[prefix.len()..].contains('/'))
            .map(|(_, doc)| doc)
            .filter(|doc| predicates.iter().all(|p| p.matches(doc)))
            .cloned()
            .collect())
    }

    /// Check the signer of `doc` against what is stored (or staged) so far
    fn check_signer(
        &self,
        doc: &WireDocument,
        documents: &BTreeMap<String, WireDocument>,
    ) -> Result<(), GatewayError> {
        let Some(signature) = &doc.signature else {
            return Err(GatewayError::MissingSignature(doc.path.clone()));
        };
        if !doc.verify_self_signed(&self.crypto) {
            return Err(GatewayError::InvalidSignature(doc.path.clone()));
        }

        let unknown_owner = || GatewayError::UnknownOwner {
            path: doc.path.clone(),
            owner_path: signature.owner_path.clone(),
        };
        if signature.owner_path.is_empty() {
            return match self.root_verify_key {
                Some(key) if key != signature.owner_verify_key => {
                    Err(GatewayError::InvalidSignature(doc.path.clone()))
                }
                _ => Ok(()),
            };
        }
        if !doc.path.starts_with(&format!("{}/", signature.owner_path)) {
            return Err(unknown_owner());
        }
        match documents.get(&signature.owner_path) {
            Some(owner) if !owner.is_tombstone() => {
                if owner.verify_key == Some(signature.owner_verify_key) {
                    Ok(())
                } else {
                    Err(GatewayError::InvalidSignature(doc.path.clone()))
                }
            }
            _ => Err(unknown_owner()),
        }
    }
}

/// Validate a version move from what is stored to what is proposed
fn check_version(current: Option<&WireDocument>, doc: &WireDocument) -> Result<(), GatewayError> {
    let conflict = || GatewayError::VersionConflict {
        path: doc.path.clone(),
        current: current.map(|c| c.version),
        proposed: doc.version,
    };
    match current {
        None if doc.version == 1 => Ok(()),
        None => Err(conflict()),
        Some(current) if current.is_tombstone() => Err(GatewayError::Tombstoned(doc.path.clone())),
        Some(current) if doc.version == current.version + 1 => Ok(()),
        Some(current) if doc.version == -current.version => Ok(()),
        Some(_) => Err(conflict()),
    }
}

#[async_trait]
impl DocumentStore for MemoryDocumentStore {
    async fn get(&self, path: &str) -> Result<Option<WireDocument>, StoreError> {
        let inner = self
            .inner
            .read()
            .map_err(|e| StoreError::Internal(format!("failed to acquire read lock: {}", e)))?;
        Ok(inner.documents.get(path).cloned())
    }

    async fn query(
        &self,
        parent_path: &str,
        collection: &str,
        predicates: &[Predicate],
    ) -> Result<Vec<WireDocument>, StoreError> {
        self.snapshot(parent_path, collection, predicates)
    }

    fn watch(
        &self,
        parent_path: &str,
        collection: &str,
        predicates: Vec<Predicate>,
    ) -> BoxStream<'static, Result<Vec<WireDocument>, StoreError>> {
        struct Watch {
            store: MemoryDocumentStore,
            receiver: broadcast::Receiver<()>,
            parent_path: String,
            collection: String,
            predicates: Vec<Predicate>,
            primed: bool,
        }

        let watch = Watch {
            store: self.clone(),
            receiver: self.changes.subscribe(),
            parent_path: parent_path.to_string(),
            collection: collection.to_string(),
            predicates,
            primed: false,
        };
        stream::unfold(watch, |mut watch| async move {
            if watch.primed {
                match watch.receiver.recv().await {
                    Ok(()) | Err(RecvError::Lagged(_)) => {}
                    Err(RecvError::Closed) => return None,
                }
            }
            watch.primed = true;
            let batch =
                watch
                    .store
                    .snapshot(&watch.parent_path, &watch.collection, &watch.predicates);
            Some((batch, watch))
        })
        .boxed()
    }
}

#[async_trait]
impl WriteGateway for MemoryDocumentStore {
    async fn submit(&self, batch: Vec<WireDocument>) -> Result<(), GatewayError> {
        let mut inner = self
            .inner
            .write()
            .map_err(|e| GatewayError::Internal(format!("failed to acquire write lock: {}", e)))?;

        // validate the whole batch against a staged copy, then commit at once
        let mut staged = inner.documents.clone();
        for doc in batch {
            check_version(staged.get(&doc.path), &doc)?;
            self.check_signer(&doc, &staged)?;
            staged.insert(doc.path.clone(), doc);
        }
        inner.documents = staged;
        drop(inner);

        let _ = self.changes.send(());
        Ok(())
    }
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::object::DocumentSignature;
    use crate::crypto::SignKey;

    fn signed(path: &str, version: i64, owner_path: &str, key: &SignKey) -> WireDocument {
        let crypto = Crypto::default();
        let mut doc = WireDocument::new(path, version);
        doc.verify_key = Some(key.verify_key());
        doc.signature = Some(DocumentSignature {
            signature: crypto.sign(&doc.signing_bytes(), key),
            owner_path: owner_path.to_string(),
            owner_verify_key: key.verify_key(),
        });
        doc
    }

    #[tokio::test]
    async fn test_version_rules() {
        let root = SignKey::generate().unwrap();
        let store = MemoryDocumentStore::new(Some(root.verify_key()));

        assert!(matches!(
            store.submit(vec![signed("/c/a", 2, "", &root)]).await,
            Err(GatewayError::VersionConflict { .. })
        ));
        store.submit(vec![signed("/c/a", 1, "", &root)]).await.unwrap();
        store.submit(vec![signed("/c/a", 2, "", &root)]).await.unwrap();
        assert!(matches!(
            store.submit(vec![signed("/c/a", 2, "", &root)]).await,
            Err(GatewayError::VersionConflict { .. })
        ));
        assert!(matches!(
            store.submit(vec![signed("/c/a", -1, "", &root)]).await,
            Err(GatewayError::VersionConflict { .. })
        ));
        store.submit(vec![signed("/c/a", -2, "", &root)]).await.unwrap();
        assert!(matches!(
            store.submit(vec![signed("/c/a", 3, "", &root)]).await,
            Err(GatewayError::Tombstoned(_))
        ));
        assert_eq!(store.get("/c/a").await.unwrap().unwrap().version, -2);
    }

    #[tokio::test]
    async fn test_signer_rules() {
        let root = SignKey::generate().unwrap();
        let city = SignKey::generate().unwrap();
        let store = MemoryDocumentStore::new(Some(root.verify_key()));

        let mut unsigned = signed("/c/a", 1, "", &root);
        unsigned.signature = None;
        assert!(matches!(
            store.submit(vec![unsigned]).await,
            Err(GatewayError::MissingSignature(_))
        ));
        assert!(matches!(
            store.submit(vec![signed("/c/a", 1, "", &city)]).await,
            Err(GatewayError::InvalidSignature(_))
        ));

        // the owner document carries the city key, so the city may sign below it
        let mut owner = WireDocument::new("/c/a", 1);
        owner.verify_key = Some(city.verify_key());
        owner.signature = Some(DocumentSignature {
            signature: Crypto::default().sign(&owner.signing_bytes(), &root),
            owner_path: String::new(),
            owner_verify_key: root.verify_key(),
        });
        store
            .submit(vec![owner, signed("/c/a/j/1", 1, "/c/a", &city)])
            .await
            .unwrap();

        assert!(matches!(
            store.submit(vec![signed("/c/b/j/1", 1, "/c/a", &city)]).await,
            Err(GatewayError::UnknownOwner { .. })
        ));
        assert!(matches!(
            store.submit(vec![signed("/c/a/j/2", 1, "/c/a", &root)]).await,
            Err(GatewayError::InvalidSignature(_))
        ));
    }

    #[tokio::test]
    async fn test_rejected_batch_is_not_applied() {
        let root = SignKey::generate().unwrap();
        let store = MemoryDocumentStore::new(Some(root.verify_key()));
        let result = store
            .submit(vec![signed("/c/a", 1, "", &root), signed("/c/b", 5, "", &root)])
            .await;
        assert!(result.is_err());
        assert!(store.is_empty());
    }

    #[tokio::test]
    async fn test_query_and_watch() {
        let root = SignKey::generate().unwrap();
        let store = MemoryDocumentStore::new(None);
        store
            .submit(vec![
                signed("/c/a", 1, "", &root),
                signed("/c/b", 1, "", &root),
                signed("/d/a", 1, "", &root),
            ])
            .await
            .unwrap();

        let docs = store.query("", "c", &[]).await.unwrap();
        assert_eq!(docs.len(), 2);
        let docs = store
            .query("", "c", &[Predicate::eq("path", "/c/b")])
            .await
            .unwrap();
        assert_eq!(docs.len(), 1);

        let mut watch = store.watch("", "c", Vec::new());
        assert_eq!(watch.next().await.unwrap().unwrap().len(), 2);
        store.submit(vec![signed("/c/z", 1, "", &root)]).await.unwrap();
        assert_eq!(watch.next().await.unwrap().unwrap().len(), 3);
    }
}
