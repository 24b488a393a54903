use std::collections::{BTreeSet, HashMap};
use std::sync::Arc;

use parking_lot::Mutex;
use tokio::sync::OnceCell;

use crate::crypto::{Key, KeyRole, PrivateEncryptionKey, SecretKey, SignKey};

use super::store::KeyStore;
use super::{KeyStoreError, STORAGE_SALT_PROMPT};

struct Inner {
    /// One-off keys plus every stored key resolved so far
    keys: Mutex<HashMap<(String, KeyRole), Key>>,
    storage_password: Option<String>,
    prompt_key: OnceCell<PromptOutcome>,
}

/// What the single prompt of a container produced
#[derive(Clone)]
enum PromptOutcome {
    Key(SecretKey),
    /// The answer did not open the store's password check
    WrongPassword,
    Rejected,
}

/// Keys available to one logical operation
///
/// A container asks for the storage password at most once, however many
/// prompt-protected keys it resolves and however many tasks ask at the same
/// time. A failed prompt is remembered, so the container is spent for
/// prompt-protected keys after that.
///
/// Clones share state.
#[derive(Clone)]
pub struct KeyContainer {
    store: KeyStore,
    inner: Arc<Inner>,
}

impl std::fmt::Debug for KeyContainer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        let keys = self.inner.keys.lock();
        let mut slots: Vec<_> = keys.keys().collect();
        slots.sort();
        f.debug_struct("KeyContainer")
            .field("keys", &slots)
            .field("prompted", &self.inner.prompt_key.initialized())
            .finish()
    }
}

impl KeyContainer {
    pub(crate) fn new(store: KeyStore, storage_password: Option<String>) -> Self {
        Self {
            store,
            inner: Arc::new(Inner {
                keys: Mutex::new(HashMap::new()),
                storage_password,
                prompt_key: OnceCell::new(),
            }),
        }
    }

    /// A container that never prompts; `storage_password` is used instead
    pub fn with_storage_password(store: &KeyStore, storage_password: &str) -> Self {
        Self::new(store.clone(), Some(storage_password.to_string()))
    }

    pub fn store(&self) -> &KeyStore {
        &self.store
    }

    /// Make `key` available to this container only
    pub fn set_key(&self, path: &str, key: Key) {
        self.inner
            .keys
            .lock()
            .insert((path.to_string(), key.role()), key);
    }

    pub fn has_key(&self, path: &str, role: KeyRole) -> bool {
        self.has_local(path, role) || self.store.has_stored(path, role)
    }

    pub(crate) fn has_local(&self, path: &str, role: KeyRole) -> bool {
        self.inner
            .keys
            .lock()
            .contains_key(&(path.to_string(), role))
    }

    /// Resolve the key for `path`, prompting for a prompt-protected one
    pub async fn get_key(&self, path: &str, role: KeyRole) -> Result<Key, KeyStoreError> {
        let slot = (path.to_string(), role);
        let cached = self.inner.keys.lock().get(&slot).cloned();
        if let Some(key) = cached {
            return Ok(key);
        }

        let Some((stored, plain)) = self.store.stored(path, role) else {
            return Err(KeyStoreError::KeyNotFound {
                path: path.to_string(),
                role,
            });
        };
        let key = match plain {
            Some(key) => key,
            None => {
                let prompt_key = self.prompt_storage_key().await?;
                let bytes = self
                    .store
                    .crypto()
                    .aead_decrypt(&stored.ciphertext, &prompt_key)
                    .map_err(|_| KeyStoreError::WrongPassword)?;
                Key::from_bytes(role, &bytes).map_err(|_| KeyStoreError::Corrupt {
                    path: path.to_string(),
                    role,
                })?
            }
        };

        self.inner.keys.lock().insert(slot, key.clone());
        Ok(key)
    }

    pub async fn sign_key(&self, path: &str) -> Result<SignKey, KeyStoreError> {
        match self.get_key(path, KeyRole::Sign).await? {
            Key::Sign(key) => Ok(key),
            _ => Err(KeyStoreError::KeyNotFound {
                path: path.to_string(),
                role: KeyRole::Sign,
            }),
        }
    }

    pub async fn decryption_key(&self, path: &str) -> Result<PrivateEncryptionKey, KeyStoreError> {
        match self.get_key(path, KeyRole::Decrypt).await? {
            Key::Decrypt(key) => Ok(key),
            _ => Err(KeyStoreError::KeyNotFound {
                path: path.to_string(),
                role: KeyRole::Decrypt,
            }),
        }
    }

    /// Every path this container can produce a `role` key for
    pub fn paths(&self, role: KeyRole) -> BTreeSet<String> {
        let mut paths: BTreeSet<String> = self
            .inner
            .keys
            .lock()
            .keys()
            .filter(|(_, r)| *r == role)
            .map(|(path, _)| path.clone())
            .collect();
        paths.extend(self.store.stored_paths(role));
        paths
    }

    /// The prompt-tier storage key, asking for the password on first use
    ///
    /// The answer is checked against the store's password check before any
    /// key is derived from it, so a mistyped password never seals anything.
    pub(crate) async fn prompt_storage_key(&self) -> Result<SecretKey, KeyStoreError> {
        let outcome = self
            .inner
            .prompt_key
            .get_or_init(|| async {
                let password = match &self.inner.storage_password {
                    Some(password) => password.clone(),
                    None => match self.store.prompt_password().await {
                        Ok(password) => password,
                        Err(_) => return PromptOutcome::Rejected,
                    },
                };
                match self.store.check_storage_password(&password).await {
                    Ok(true) => {}
                    Ok(false) => {
                        tracing::warn!("prompted storage password does not match");
                        return PromptOutcome::WrongPassword;
                    }
                    Err(e) => {
                        tracing::warn!(error = %e, "failed to check prompted storage password");
                        return PromptOutcome::Rejected;
                    }
                }
                match self
                    .store
                    .crypto()
                    .secret_key_from_password(&password, STORAGE_SALT_PROMPT)
                    .await
                {
                    Ok(key) => PromptOutcome::Key(key),
                    Err(e) => {
                        tracing::warn!(error = %e, "failed to derive prompt storage key");
                        PromptOutcome::Rejected
                    }
                }
            })
            .await;
        match outcome {
            PromptOutcome::Key(key) => Ok(key.clone()),
            PromptOutcome::WrongPassword => Err(KeyStoreError::WrongPassword),
            PromptOutcome::Rejected => Err(KeyStoreError::PromptRejected),
        }
    }
}
