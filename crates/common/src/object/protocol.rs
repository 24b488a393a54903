use std::collections::BTreeMap;

use serde_json::Value;

use crate::canonical::{canonicalize, CanonicalValue};
use crate::crypto::{
    KeyRole, PrivateEncryptionKey, PublicEncryptionKey, SecretKey, SignKey, VerifyKey, WrappedKey,
};
use crate::key_store::{KeyContainer, KeyStoreError};

use super::document::{DocumentSignature, Envelope, WireDocument};
use super::node::{Node, Parent};
use super::policy::Policy;
use super::{ObjectError, ReadMode, SignMode, VersionTransition, DEVICE_OWNER_PATH};

impl Node {
    /// Serialize, seal and sign this node
    ///
    /// Confidential fields are sealed for every required recipient; the
    /// document is signed by the nearest owner the container holds a key for.
    pub async fn to_wire_document(
        &self,
        transition: VersionTransition,
        mode: SignMode,
        container: Option<&KeyContainer>,
    ) -> Result<WireDocument, ObjectError> {
        let path = self.path();
        if self.is_deleted() {
            return Err(ObjectError::AlreadyDeleted(path));
        }
        let owned;
        let container = match container {
            Some(container) => container,
            None => {
                owned = self.root().key_container();
                &owned
            }
        };

        let version = match transition {
            VersionTransition::Keep => self.version,
            VersionTransition::Increment => self.version + 1,
        };
        let mut doc = WireDocument::new(path, version);
        for field in self.policy().plain_fields() {
            if let Some(value) = self.fields.get(field.name) {
                doc.fields.insert(field.name.to_string(), value.to_value());
            }
        }
        doc.confidential = self.seal(mode)?;
        doc.verify_key = self.verify_key();
        doc.public_key = self.public_key();

        let (key, owner_path) = match mode {
            SignMode::Owner => self.resolve_signer(container).await?,
            SignMode::Device => (
                self.root().keys().device_sign_key()?,
                DEVICE_OWNER_PATH.to_string(),
            ),
        };
        self.attach_signature(&mut doc, &key, owner_path);
        Ok(doc)
    }

    /// A signed tombstone for the current version
    pub async fn to_tombstone(
        &self,
        container: Option<&KeyContainer>,
    ) -> Result<WireDocument, ObjectError> {
        let path = self.path();
        if self.version <= 0 {
            return Err(ObjectError::AlreadyDeleted(path));
        }
        let owned;
        let container = match container {
            Some(container) => container,
            None => {
                owned = self.root().key_container();
                &owned
            }
        };

        let mut doc = WireDocument::new(path, -self.version);
        let (key, owner_path) = self.resolve_signer(container).await?;
        self.attach_signature(&mut doc, &key, owner_path);
        Ok(doc)
    }

    /// Verify and open a document sitting directly under `parent`
    ///
    /// The node id is taken from the document's path.
    pub async fn from_wire_document(
        parent: impl Into<Parent>,
        policy: &'static Policy,
        doc: &WireDocument,
        mode: ReadMode,
        container: Option<&KeyContainer>,
    ) -> Result<Node, ObjectError> {
        let parent = parent.into();
        let prefix = format!("{}/{}/", parent.path(), policy.collection);
        let id = doc
            .path
            .strip_prefix(&prefix)
            .filter(|id| !id.is_empty() && !id.contains('/'))
            .ok_or_else(|| ObjectError::PathMismatch {
                expected: format!("{}<id>", prefix),
                found: doc.path.clone(),
            })?
            .to_string();

        let mut node = Node::with_id(parent, policy, id);
        node.apply_wire_document(doc, mode, container).await?;
        Ok(node)
    }

    /// Verify `doc` as the next state of this node and take it over
    ///
    /// On any failure the node is left untouched.
    pub async fn apply_wire_document(
        &mut self,
        doc: &WireDocument,
        mode: ReadMode,
        container: Option<&KeyContainer>,
    ) -> Result<(), ObjectError> {
        let path = self.path();
        if doc.path != path {
            return Err(ObjectError::PathMismatch {
                expected: path,
                found: doc.path.clone(),
            });
        }
        let signature = doc
            .signature
            .as_ref()
            .ok_or_else(|| ObjectError::NoSignature(path.clone()))?;

        let verify_key = match mode {
            ReadMode::Device => {
                if signature.owner_path != DEVICE_OWNER_PATH {
                    return Err(ObjectError::WrongOwner {
                        path,
                        owner_path: signature.owner_path.clone(),
                    });
                }
                // another device's signature names a key we do not know for "device"
                let device = self.root().keys().device_verify_key()?;
                if signature.owner_verify_key != device {
                    return Err(ObjectError::WrongVerifyKey {
                        path,
                        owner_path: signature.owner_path.clone(),
                    });
                }
                device
            }
            ReadMode::Default | ReadMode::Opaque => self.verify_owner(signature)?,
        };
        if !self
            .root()
            .crypto()
            .verify(&doc.signing_bytes(), &signature.signature, &verify_key)
        {
            return Err(ObjectError::InvalidSignature(path));
        }

        let mut fields = BTreeMap::new();
        for field in self.policy().fields {
            let Some(value) = doc.fields.get(field.name) else {
                continue;
            };
            if field.confidential {
                return Err(ObjectError::PlaintextConfidential {
                    path,
                    field: field.name,
                });
            }
            fields.insert(field.name.to_string(), canonicalize(value, true));
        }

        if mode != ReadMode::Opaque && self.policy().has_confidential() {
            if let Some(envelope) = &doc.confidential {
                let owned;
                let container = match container {
                    Some(container) => container,
                    None => {
                        owned = self.root().key_container();
                        &owned
                    }
                };
                let secret = self.open(envelope, mode, container).await?;
                for field in self.policy().confidential_fields() {
                    if let Some(value) = secret.get(field.name) {
                        fields.insert(field.name.to_string(), value.clone());
                    }
                }
            }
        }

        let recipient_keys = match &doc.confidential {
            Some(envelope) => self.explicit_recipients(envelope),
            None => BTreeMap::new(),
        };

        self.version = doc.version;
        self.fields = fields;
        self.set_verify_key(doc.verify_key);
        self.set_public_key(doc.public_key);
        self.recipient_keys = recipient_keys;
        Ok(())
    }

    /// Find the first signing candidate the container holds a key for
    async fn resolve_signer(
        &self,
        container: &KeyContainer,
    ) -> Result<(SignKey, String), ObjectError> {
        let path = self.path();
        for candidate in self.signing_candidates() {
            let owner_path = candidate.path();
            if !container.has_key(&owner_path, KeyRole::Sign) {
                tracing::debug!(path, owner_path, "no signing key for owner, moving up");
                continue;
            }
            match container.sign_key(&owner_path).await {
                Ok(key) => {
                    tracing::debug!(path, owner_path, "resolved signer");
                    return Ok((key, owner_path));
                }
                Err(KeyStoreError::WrongPassword) => {
                    return Err(KeyStoreError::WrongPassword.into());
                }
                Err(e) => {
                    tracing::debug!(path, owner_path, error = %e, "signing key unavailable");
                }
            }
        }
        Err(ObjectError::NoSigningKey(path))
    }

    /// The known verify key of the ancestor a signature claims
    fn verify_owner(&self, signature: &DocumentSignature) -> Result<VerifyKey, ObjectError> {
        let path = self.path();
        for candidate in self.signing_candidates() {
            if candidate.path() != signature.owner_path {
                continue;
            }
            return match candidate.verify_key() {
                Some(known) if known == signature.owner_verify_key => Ok(known),
                _ => Err(ObjectError::WrongVerifyKey {
                    path,
                    owner_path: signature.owner_path.clone(),
                }),
            };
        }
        tracing::debug!(path, owner_path = signature.owner_path, "signer is not in the owner chain");
        Err(ObjectError::WrongOwner {
            path,
            owner_path: signature.owner_path.clone(),
        })
    }

    fn attach_signature(&self, doc: &mut WireDocument, key: &SignKey, owner_path: String) {
        let signature = self.root().crypto().sign(&doc.signing_bytes(), key);
        doc.signature = Some(DocumentSignature {
            signature,
            owner_path,
            owner_verify_key: key.verify_key(),
        });
    }

    /// Everyone the content key gets wrapped for, by path
    fn recipients(
        &self,
        mode: SignMode,
    ) -> Result<BTreeMap<String, PublicEncryptionKey>, ObjectError> {
        let mut recipients = BTreeMap::new();
        match mode {
            SignMode::Owner => {
                for reader in self.owner_readers() {
                    let recipient = reader.path();
                    let key = reader
                        .public_key()
                        .ok_or_else(|| ObjectError::MissingRecipientKey {
                            path: self.path(),
                            recipient: recipient.clone(),
                        })?;
                    recipients.insert(recipient, key);
                }
            }
            SignMode::Device => {
                recipients.insert(
                    DEVICE_OWNER_PATH.to_string(),
                    self.root().keys().device_public_key()?,
                );
            }
        }
        if let Some(key) = self.self_recipient_key() {
            recipients.entry(self.path()).or_insert(key);
        }
        for (path, key) in self.recipient_keys() {
            recipients.entry(path.clone()).or_insert(*key);
        }
        Ok(recipients)
    }

    fn seal(&self, mode: SignMode) -> Result<Option<Envelope>, ObjectError> {
        let secret: BTreeMap<String, CanonicalValue> = self
            .policy()
            .confidential_fields()
            .filter_map(|f| {
                self.fields
                    .get(f.name)
                    .map(|v| (f.name.to_string(), v.clone()))
            })
            .collect();
        if secret.is_empty() {
            return Ok(None);
        }

        let recipients = self.recipients(mode)?;
        if recipients.is_empty() {
            return Err(ObjectError::NoRecipients(self.path()));
        }

        let crypto = self.root().crypto();
        let content_key = SecretKey::generate()?;
        let ephemeral = PrivateEncryptionKey::generate()?;
        let ciphertext =
            crypto.aead_encrypt(&CanonicalValue::Map(secret).to_bytes(), &content_key)?;

        let mut recipient_wrapped_keys = BTreeMap::new();
        for (path, key) in recipients {
            recipient_wrapped_keys.insert(path, WrappedKey::new(&content_key, &ephemeral, &key)?);
        }

        Ok(Some(Envelope {
            ephemeral_public_key: ephemeral.public_key(),
            ciphertext,
            recipient_wrapped_keys,
        }))
    }

    async fn open(
        &self,
        envelope: &Envelope,
        mode: ReadMode,
        container: &KeyContainer,
    ) -> Result<BTreeMap<String, CanonicalValue>, ObjectError> {
        let path = self.path();
        let content_key = match mode {
            ReadMode::Device => {
                let wrapped = envelope
                    .recipient_wrapped_keys
                    .get(DEVICE_OWNER_PATH)
                    .ok_or_else(|| ObjectError::NoDecryptionKey(path.clone()))?;
                let key = self.root().keys().device_decryption_key()?;
                self.unwrap_content_key(envelope, DEVICE_OWNER_PATH, wrapped, &key)?
            }
            ReadMode::Default | ReadMode::Opaque => self.find_content_key(envelope, container).await?,
        };

        let decrypt_failure = |reason: &str| {
            tracing::error!(path, reason, "confidential fields failed to open with a valid content key");
            ObjectError::DecryptFailure(path.clone())
        };
        let plain = self
            .root()
            .crypto()
            .aead_decrypt(&envelope.ciphertext, &content_key)
            .map_err(|_| decrypt_failure("aead"))?;
        let value: Value =
            serde_json::from_slice(&plain).map_err(|_| decrypt_failure("encoding"))?;
        canonicalize(&value, true)
            .into_map()
            .ok_or_else(|| decrypt_failure("shape"))
    }

    async fn find_content_key(
        &self,
        envelope: &Envelope,
        container: &KeyContainer,
    ) -> Result<SecretKey, ObjectError> {
        let path = self.path();
        for (recipient, wrapped) in &envelope.recipient_wrapped_keys {
            if !container.has_key(recipient, KeyRole::Decrypt) {
                continue;
            }
            let key = match container.decryption_key(recipient).await {
                Ok(key) => key,
                Err(KeyStoreError::WrongPassword) => {
                    return Err(KeyStoreError::WrongPassword.into());
                }
                Err(e) => {
                    tracing::debug!(path, recipient, error = %e, "decryption key unavailable");
                    continue;
                }
            };
            if !wrapped.is_for(&key) {
                tracing::warn!(path, recipient, "held decryption key does not match the envelope entry");
                continue;
            }
            return self.unwrap_content_key(envelope, recipient, wrapped, &key);
        }
        tracing::debug!(path, "no usable decryption key");
        Err(ObjectError::NoDecryptionKey(path))
    }

    fn unwrap_content_key(
        &self,
        envelope: &Envelope,
        recipient: &str,
        wrapped: &WrappedKey,
        key: &PrivateEncryptionKey,
    ) -> Result<SecretKey, ObjectError> {
        wrapped
            .recover(key, &envelope.ephemeral_public_key)
            .map_err(|e| {
                let path = self.path();
                tracing::error!(path, recipient, error = %e, "content key unwrap failed on a matching key");
                ObjectError::DecryptFailure(path)
            })
    }

    /// Envelope entries that are not implied by the tree shape
    fn explicit_recipients(&self, envelope: &Envelope) -> BTreeMap<String, PublicEncryptionKey> {
        let own_path = self.path();
        let structural: Vec<String> = self.owner_readers().iter().map(|r| r.path()).collect();
        envelope
            .recipient_wrapped_keys
            .iter()
            .filter(|(path, _)| {
                path.as_str() != own_path
                    && path.as_str() != DEVICE_OWNER_PATH
                    && !structural.contains(path)
            })
            .map(|(path, wrapped)| (path.clone(), wrapped.recipient_public_key))
            .collect()
    }
}
