use std::collections::BTreeMap;
use std::sync::Arc;

use serde::{Deserialize, Serialize};
use serde_json::Value;

use crate::canonical::{canonicalize, CanonicalValue};
use crate::crypto::{PublicEncryptionKey, VerifyKey};

use super::policy::{OwnerKind, Policy, SelfRecipient};
use super::root::Root;
use super::ObjectError;

/// Cached children, keyed by collection then id
pub type Children = BTreeMap<String, BTreeMap<String, Node>>;

/// What a node hangs off
///
/// A node parent is a detached snapshot: it carries the parent's identity
/// and keys, never its children cache.
#[derive(Debug, Clone)]
pub enum Parent {
    Root(Root),
    Node(Arc<Node>),
}

impl Parent {
    pub fn path(&self) -> String {
        match self {
            Parent::Root(root) => root.path().to_string(),
            Parent::Node(node) => node.path(),
        }
    }

    pub fn root(&self) -> &Root {
        match self {
            Parent::Root(root) => root,
            Parent::Node(node) => node.root(),
        }
    }
}

impl From<Root> for Parent {
    fn from(root: Root) -> Self {
        Parent::Root(root)
    }
}

impl From<&Root> for Parent {
    fn from(root: &Root) -> Self {
        Parent::Root(root.clone())
    }
}

impl From<&Node> for Parent {
    fn from(node: &Node) -> Self {
        Parent::Node(Arc::new(node.detached()))
    }
}

impl From<Node> for Parent {
    fn from(mut node: Node) -> Self {
        node.children = None;
        Parent::Node(Arc::new(node))
    }
}

/// An ancestor in an authorization role
#[derive(Debug, Clone, Copy)]
pub enum Principal<'a> {
    Root(&'a Root),
    Node(&'a Node),
}

impl Principal<'_> {
    pub fn path(&self) -> String {
        match self {
            Principal::Root(root) => root.path().to_string(),
            Principal::Node(node) => node.path(),
        }
    }

    pub fn verify_key(&self) -> Option<VerifyKey> {
        match self {
            Principal::Root(root) => root.verify_key(),
            Principal::Node(node) => node.verify_key(),
        }
    }

    pub fn public_key(&self) -> Option<PublicEncryptionKey> {
        match self {
            Principal::Root(root) => root.public_key(),
            Principal::Node(node) => node.public_key(),
        }
    }

    pub fn is_root(&self) -> bool {
        matches!(self, Principal::Root(_))
    }
}

/// Public half of a password identity, as handed to other parties
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
struct PasswordIdentity {
    public_key: PublicEncryptionKey,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    verify_key: Option<VerifyKey>,
}

/// A tree element
///
/// Cloning gives a fully independent copy, children cache included.
#[derive(Clone)]
pub struct Node {
    id: String,
    parent: Parent,
    policy: &'static Policy,
    pub(crate) version: i64,
    verify_key: Option<VerifyKey>,
    public_key: Option<PublicEncryptionKey>,
    pub(crate) recipient_keys: BTreeMap<String, PublicEncryptionKey>,
    pub(crate) fields: BTreeMap<String, CanonicalValue>,
    pub(crate) children: Option<Children>,
}

impl std::fmt::Debug for Node {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Node")
            .field("kind", &self.policy.kind)
            .field("path", &self.path())
            .field("version", &self.version)
            .field("fields", &self.fields)
            .finish()
    }
}

impl Node {
    /// A new, unpersisted node with a random id
    pub fn new(parent: impl Into<Parent>, policy: &'static Policy) -> Self {
        Self::with_id(parent, policy, uuid::Uuid::new_v4().simple().to_string())
    }

    pub fn with_id(parent: impl Into<Parent>, policy: &'static Policy, id: impl Into<String>) -> Self {
        Self {
            id: id.into(),
            parent: parent.into(),
            policy,
            version: 0,
            verify_key: None,
            public_key: None,
            recipient_keys: BTreeMap::new(),
            fields: BTreeMap::new(),
            children: None,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    pub fn policy(&self) -> &'static Policy {
        self.policy
    }

    pub fn kind(&self) -> &'static str {
        self.policy.kind
    }

    pub fn parent(&self) -> &Parent {
        &self.parent
    }

    pub fn root(&self) -> &Root {
        self.parent.root()
    }

    pub fn path(&self) -> String {
        format!(
            "{}/{}/{}",
            self.parent.path(),
            self.policy.collection,
            self.id
        )
    }

    pub fn version(&self) -> i64 {
        self.version
    }

    pub fn is_deleted(&self) -> bool {
        self.version < 0
    }

    pub fn verify_key(&self) -> Option<VerifyKey> {
        self.verify_key
    }

    pub fn set_verify_key(&mut self, key: Option<VerifyKey>) {
        self.verify_key = key;
    }

    pub fn public_key(&self) -> Option<PublicEncryptionKey> {
        self.public_key
    }

    pub fn set_public_key(&mut self, key: Option<PublicEncryptionKey>) {
        self.public_key = key;
    }

    /// Extra recipients of the confidential fields, by path
    pub fn recipient_keys(&self) -> &BTreeMap<String, PublicEncryptionKey> {
        &self.recipient_keys
    }

    pub fn add_recipient(&mut self, path: impl Into<String>, key: PublicEncryptionKey) {
        self.recipient_keys.insert(path.into(), key);
    }

    pub fn remove_recipient(&mut self, path: &str) -> Option<PublicEncryptionKey> {
        self.recipient_keys.remove(path)
    }

    pub fn fields(&self) -> &BTreeMap<String, CanonicalValue> {
        &self.fields
    }

    pub fn get(&self, name: &str) -> Option<&CanonicalValue> {
        self.fields.get(name)
    }

    /// Set a manifest field. Date-shaped strings become timestamps.
    pub fn set(&mut self, name: &str, value: impl Into<Value>) -> Result<(), ObjectError> {
        self.check_field(name)?;
        self.fields
            .insert(name.to_string(), canonicalize(&value.into(), true));
        Ok(())
    }

    pub fn set_serialize<T: Serialize + ?Sized>(
        &mut self,
        name: &str,
        value: &T,
    ) -> Result<(), ObjectError> {
        self.check_field(name)?;
        let value = serde_json::to_value(value)?;
        self.fields
            .insert(name.to_string(), canonicalize(&value, true));
        Ok(())
    }

    pub fn unset(&mut self, name: &str) -> Result<Option<CanonicalValue>, ObjectError> {
        self.check_field(name)?;
        Ok(self.fields.remove(name))
    }

    fn check_field(&self, name: &str) -> Result<(), ObjectError> {
        match self.policy.field(name) {
            Some(_) => Ok(()),
            None => Err(ObjectError::UnknownField {
                kind: self.policy.kind,
                field: name.to_string(),
            }),
        }
    }

    /// The ancestor that owns this node, purely from the tree shape
    pub fn owner(&self) -> Principal<'_> {
        let mut current = &self.parent;
        loop {
            match current {
                Parent::Root(root) => return Principal::Root(root),
                Parent::Node(node) => {
                    if self.policy.owner == OwnerKind::Kind(node.policy.kind) {
                        return Principal::Node(node.as_ref());
                    }
                    current = &node.parent;
                }
            }
        }
    }

    /// Ancestors that may sign for this node, nearest first
    ///
    /// Starts with the owner and moves on to an owner's owner only while the
    /// owner reached allows it through `owner_may_write`.
    pub fn signing_candidates(&self) -> Vec<Principal<'_>> {
        let mut candidates = Vec::new();
        let mut level = self;
        loop {
            let owner = level.owner();
            candidates.push(owner);
            match owner {
                Principal::Root(_) => break,
                Principal::Node(node) if node.policy.owner_may_write => level = node,
                Principal::Node(_) => break,
            }
        }
        candidates
    }

    /// Owners that get an envelope, following `owner_may_read`
    pub fn owner_readers(&self) -> Vec<Principal<'_>> {
        let mut readers = Vec::new();
        let mut level = self;
        while level.policy.owner_may_read {
            let owner = level.owner();
            readers.push(owner);
            match owner {
                Principal::Root(_) => break,
                Principal::Node(node) => level = node,
            }
        }
        readers
    }

    /// This node's own public key, if it is one of its recipients
    pub(crate) fn self_recipient_key(&self) -> Option<PublicEncryptionKey> {
        let key = self.public_key?;
        match self.policy.self_recipient {
            SelfRecipient::Always => Some(key),
            SelfRecipient::WhenPassword if self.policy.supports_password => Some(key),
            SelfRecipient::WhenPassword => None,
        }
    }

    /// A new child of this node
    pub fn child(&self, policy: &'static Policy) -> Node {
        Node::new(self, policy)
    }

    pub fn child_with_id(&self, policy: &'static Policy, id: impl Into<String>) -> Node {
        Node::with_id(self, policy, id)
    }

    pub fn children(&self) -> Option<&Children> {
        self.children.as_ref()
    }

    /// Cached children of one collection
    pub fn children_in(&self, collection: &str) -> impl Iterator<Item = &Node> {
        self.children
            .as_ref()
            .and_then(|c| c.get(collection))
            .into_iter()
            .flat_map(|c| c.values())
    }

    /// Cache `child`, which must sit directly under this node
    pub fn insert_child(&mut self, child: Node) -> Result<(), ObjectError> {
        let expected = self.path();
        let found = child.parent.path();
        if found != expected {
            return Err(ObjectError::PathMismatch { expected, found });
        }
        self.children
            .get_or_insert_with(BTreeMap::new)
            .entry(child.policy.collection.to_string())
            .or_default()
            .insert(child.id.clone(), child);
        Ok(())
    }

    pub fn clear_children(&mut self) {
        self.children = None;
    }

    pub(crate) fn detached(&self) -> Node {
        Node {
            id: self.id.clone(),
            parent: self.parent.clone(),
            policy: self.policy,
            version: self.version,
            verify_key: self.verify_key,
            public_key: self.public_key,
            recipient_keys: self.recipient_keys.clone(),
            fields: self.fields.clone(),
            children: None,
        }
    }

    /// base64 SHA-512 over the canonical version and field values
    pub fn hash(&self) -> String {
        let mut map = BTreeMap::new();
        map.insert(
            "fields".to_string(),
            CanonicalValue::Map(self.fields.clone()),
        );
        map.insert(
            "version".to_string(),
            CanonicalValue::Number(self.version.into()),
        );
        self.root()
            .crypto()
            .hash(&CanonicalValue::Map(map).to_bytes())
    }

    /// Install the identity derived from `password` and this node's path
    ///
    /// The public encryption key is always set. The verify key is set only
    /// for types whose password may sign.
    pub async fn set_password(&mut self, password: &str) -> Result<(), ObjectError> {
        let identity = self.derive_password_identity(password).await?;
        self.public_key = Some(identity.public_key);
        self.verify_key = identity.verify_key;
        Ok(())
    }

    /// Public half of the password identity as an opaque token
    pub async fn password_identity(&self, password: &str) -> Result<String, ObjectError> {
        let identity = self.derive_password_identity(password).await?;
        let json = serde_json::to_vec(&identity)?;
        Ok(crate::crypto::b64_encode(json))
    }

    /// Install a token produced by [`Node::password_identity`]
    pub fn apply_password_identity(&mut self, token: &str) -> Result<(), ObjectError> {
        if !self.policy.supports_password {
            return Err(ObjectError::PasswordNotSupported(self.policy.kind));
        }
        let bytes = crate::crypto::b64_decode(token)
            .map_err(|e| ObjectError::InvalidPasswordIdentity(e.to_string()))?;
        let identity: PasswordIdentity = serde_json::from_slice(&bytes)
            .map_err(|e| ObjectError::InvalidPasswordIdentity(e.to_string()))?;

        self.public_key = Some(identity.public_key);
        self.verify_key = if self.policy.password_can_sign {
            identity.verify_key
        } else {
            None
        };
        Ok(())
    }

    async fn derive_password_identity(
        &self,
        password: &str,
    ) -> Result<PasswordIdentity, ObjectError> {
        if !self.policy.supports_password {
            return Err(ObjectError::PasswordNotSupported(self.policy.kind));
        }
        let crypto = self.root().crypto();
        let path = self.path();
        let public_key = crypto
            .decryption_key_from_password(password, &path)
            .await?
            .public_key();
        let verify_key = if self.policy.password_can_sign {
            Some(
                crypto
                    .sign_key_from_password(password, &path)
                    .await?
                    .verify_key(),
            )
        } else {
            None
        };
        Ok(PasswordIdentity {
            public_key,
            verify_key,
        })
    }
}
