use futures::stream::{BoxStream, StreamExt};

use crate::key_store::KeyContainer;
use crate::store::Predicate;

use super::document::WireDocument;
use super::node::{Node, Parent};
use super::policy::Policy;
use super::root::Root;
use super::{ObjectError, ReadMode};

impl Parent {
    /// Load and verify the child `id` of type `policy`
    ///
    /// Returns `None` when the store has no such document. A tombstone is
    /// returned as a deleted node.
    pub async fn load_child(
        &self,
        policy: &'static Policy,
        id: &str,
        mode: ReadMode,
        container: Option<&KeyContainer>,
    ) -> Result<Option<Node>, ObjectError> {
        let mut node = Node::with_id(self.clone(), policy, id);
        let Some(doc) = self.root().documents().get(&node.path()).await? else {
            return Ok(None);
        };
        node.apply_wire_document(&doc, mode, container).await?;
        Ok(Some(node))
    }

    /// Load and verify every live child of type `policy` matching `predicates`
    ///
    /// One failing document fails the whole call.
    pub async fn load_children(
        &self,
        policy: &'static Policy,
        predicates: &[Predicate],
        mode: ReadMode,
        container: Option<&KeyContainer>,
    ) -> Result<Vec<Node>, ObjectError> {
        let docs = self
            .root()
            .documents()
            .query(&self.path(), policy.collection, predicates)
            .await?;
        let owned;
        let container = match container {
            Some(container) => container,
            None => {
                owned = self.root().key_container();
                &owned
            }
        };
        self.decode_all(policy, docs, mode, container).await
    }

    /// Live view of the children of type `policy`
    ///
    /// Every update is verified and opened again with the same container.
    pub fn watch_children(
        &self,
        policy: &'static Policy,
        predicates: Vec<Predicate>,
        mode: ReadMode,
        container: Option<KeyContainer>,
    ) -> BoxStream<'static, Result<Vec<Node>, ObjectError>> {
        let parent = self.clone();
        let container = container.unwrap_or_else(|| self.root().key_container());
        self.root()
            .documents()
            .watch(&self.path(), policy.collection, predicates)
            .then(move |batch| {
                let parent = parent.clone();
                let container = container.clone();
                async move {
                    let docs = batch?;
                    parent.decode_all(policy, docs, mode, &container).await
                }
            })
            .boxed()
    }

    async fn decode_all(
        &self,
        policy: &'static Policy,
        docs: Vec<WireDocument>,
        mode: ReadMode,
        container: &KeyContainer,
    ) -> Result<Vec<Node>, ObjectError> {
        let mut nodes = Vec::with_capacity(docs.len());
        for doc in docs {
            if doc.is_tombstone() {
                tracing::debug!(path = doc.path, "skipping tombstone");
                continue;
            }
            nodes.push(Node::from_wire_document(self.clone(), policy, &doc, mode, Some(container)).await?);
        }
        Ok(nodes)
    }
}

impl Root {
    pub async fn load_child(
        &self,
        policy: &'static Policy,
        id: &str,
        mode: ReadMode,
        container: Option<&KeyContainer>,
    ) -> Result<Option<Node>, ObjectError> {
        self.as_parent()
            .load_child(policy, id, mode, container)
            .await
    }

    pub async fn load_children(
        &self,
        policy: &'static Policy,
        predicates: &[Predicate],
        mode: ReadMode,
        container: Option<&KeyContainer>,
    ) -> Result<Vec<Node>, ObjectError> {
        self.as_parent()
            .load_children(policy, predicates, mode, container)
            .await
    }

    pub fn watch_children(
        &self,
        policy: &'static Policy,
        predicates: Vec<Predicate>,
        mode: ReadMode,
        container: Option<KeyContainer>,
    ) -> BoxStream<'static, Result<Vec<Node>, ObjectError>> {
        self.as_parent()
            .watch_children(policy, predicates, mode, container)
    }
}

impl Node {
    pub async fn load_child(
        &self,
        policy: &'static Policy,
        id: &str,
        mode: ReadMode,
        container: Option<&KeyContainer>,
    ) -> Result<Option<Node>, ObjectError> {
        Parent::from(self)
            .load_child(policy, id, mode, container)
            .await
    }

    pub async fn load_children(
        &self,
        policy: &'static Policy,
        predicates: &[Predicate],
        mode: ReadMode,
        container: Option<&KeyContainer>,
    ) -> Result<Vec<Node>, ObjectError> {
        Parent::from(self)
            .load_children(policy, predicates, mode, container)
            .await
    }

    pub fn watch_children(
        &self,
        policy: &'static Policy,
        predicates: Vec<Predicate>,
        mode: ReadMode,
        container: Option<KeyContainer>,
    ) -> BoxStream<'static, Result<Vec<Node>, ObjectError>> {
        Parent::from(self).watch_children(policy, predicates, mode, container)
    }

    /// Replace the children cache with every live child of the given types
    pub async fn load_children_into_cache(
        &mut self,
        policies: &[&'static Policy],
        mode: ReadMode,
        container: Option<&KeyContainer>,
    ) -> Result<(), ObjectError> {
        let owned;
        let container = match container {
            Some(container) => container,
            None => {
                owned = self.root().key_container();
                &owned
            }
        };
        let parent = Parent::from(&*self);
        let mut loaded = Vec::new();
        for policy in policies {
            loaded.extend(
                parent
                    .load_children(policy, &[], mode, Some(container))
                    .await?,
            );
        }

        self.clear_children();
        for child in loaded {
            self.insert_child(child)?;
        }
        Ok(())
    }

    /// Re-read this node from the store
    ///
    /// The children cache is kept.
    pub async fn refresh(
        &mut self,
        mode: ReadMode,
        container: Option<&KeyContainer>,
    ) -> Result<(), ObjectError> {
        let path = self.path();
        let Some(doc) = self.root().documents().get(&path).await? else {
            return Err(ObjectError::NotFound(path));
        };
        self.apply_wire_document(&doc, mode, container).await
    }
}
