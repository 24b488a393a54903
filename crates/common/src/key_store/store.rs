use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;

use parking_lot::RwLock;

use crate::crypto::{
    Crypto, Key, KeyRole, PrivateEncryptionKey, PublicEncryptionKey, SecretKey, SignKey, VerifyKey,
};

use super::container::KeyContainer;
use super::prompt::PasswordPrompt;
use super::record::{KeyEntryRecord, KeyStoreRecord, StoredKey};
use super::{
    check_role, KeyPolicy, KeyStoreConfig, KeyStoreError, Storage, DEVICE_PATH,
    STORAGE_SALT_PLAIN, STORAGE_SALT_PROMPT,
};

/// Plaintext sealed into the password check
const PASSWORD_CHECK: &[u8] = b"true";

const ROLES: [KeyRole; 2] = [KeyRole::Sign, KeyRole::Decrypt];

/// A stored key plus, for the plain tier, its decrypted form
#[derive(Clone)]
struct Slot {
    stored: StoredKey,
    key: Option<Key>,
}

#[derive(Clone, Default)]
struct PathKeys {
    sign: Option<Slot>,
    decrypt: Option<Slot>,
}

impl PathKeys {
    fn slot(&self, role: KeyRole) -> Option<&Slot> {
        match role {
            KeyRole::Sign => self.sign.as_ref(),
            KeyRole::Decrypt => self.decrypt.as_ref(),
            _ => None,
        }
    }

    fn set(&mut self, role: KeyRole, slot: Option<Slot>) {
        match role {
            KeyRole::Sign => self.sign = slot,
            KeyRole::Decrypt => self.decrypt = slot,
            _ => {}
        }
    }

    fn is_empty(&self) -> bool {
        self.sign.is_none() && self.decrypt.is_none()
    }
}

struct Inner {
    /// The "without prompt" storage key, derived once at open
    storage_key: SecretKey,
    password_check: String,
    entries: BTreeMap<String, PathKeys>,
}

/// Registry of private keys by tree path
///
/// Cheap to clone; clones share state.
#[derive(Clone)]
pub struct KeyStore {
    crypto: Crypto,
    prompt: Arc<dyn PasswordPrompt>,
    prompt_timeout: Option<Duration>,
    inner: Arc<RwLock<Inner>>,
}

impl std::fmt::Debug for KeyStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("KeyStore")
            .field("paths", &self.key_paths())
            .finish()
    }
}

impl KeyStore {
    /// Open a key store under `storage_password`
    ///
    /// With no record (or an empty one) a fresh store is created. Either way
    /// the device identity is provisioned if missing.
    ///
    /// # Errors
    ///
    /// [`KeyStoreError::WrongPassword`] if the record was sealed under a
    /// different storage password.
    pub async fn open(
        config: KeyStoreConfig,
        storage_password: &str,
        record: Option<KeyStoreRecord>,
        prompt: Arc<dyn PasswordPrompt>,
    ) -> Result<Self, KeyStoreError> {
        let crypto = Crypto::new(config.kdf.clone());
        let storage_key = crypto
            .secret_key_from_password(storage_password, STORAGE_SALT_PLAIN)
            .await?;

        let (password_check, entries) = match record {
            Some(record) if !record.storage_password_check.is_empty() => {
                if !check_password(&crypto, &record.storage_password_check, &storage_key) {
                    return Err(KeyStoreError::WrongPassword);
                }
                let entries = load_entries(&crypto, &storage_key, record.keys)?;
                (record.storage_password_check, entries)
            }
            _ => (
                crypto.aead_encrypt(PASSWORD_CHECK, &storage_key)?,
                BTreeMap::new(),
            ),
        };

        let store = Self {
            crypto,
            prompt,
            prompt_timeout: config.prompt_timeout_secs.map(Duration::from_secs),
            inner: Arc::new(RwLock::new(Inner {
                storage_key,
                password_check,
                entries,
            })),
        };
        store.provision_device()?;
        Ok(store)
    }

    pub fn crypto(&self) -> &Crypto {
        &self.crypto
    }

    pub fn password_check(&self) -> String {
        self.inner.read().password_check.clone()
    }

    /// Whether `password` is the current storage password
    pub async fn check_storage_password(&self, password: &str) -> Result<bool, KeyStoreError> {
        let candidate = self
            .crypto
            .secret_key_from_password(password, STORAGE_SALT_PLAIN)
            .await?;
        Ok(check_password(
            &self.crypto,
            &self.password_check(),
            &candidate,
        ))
    }

    /// A fresh container that will prompt at most once
    pub fn create_key_container(&self) -> KeyContainer {
        KeyContainer::new(self.clone(), None)
    }

    /// A fresh container that uses `storage_password` instead of prompting
    pub fn key_container_with_password(&self, storage_password: &str) -> KeyContainer {
        KeyContainer::new(self.clone(), Some(storage_password.to_string()))
    }

    pub fn has_key(&self, path: &str, role: KeyRole, container: Option<&KeyContainer>) -> bool {
        container.is_some_and(|c| c.has_local(path, role)) || self.has_stored(path, role)
    }

    pub async fn get_key(
        &self,
        path: &str,
        role: KeyRole,
        container: Option<&KeyContainer>,
    ) -> Result<Key, KeyStoreError> {
        match container {
            Some(container) => container.get_key(path, role).await,
            None => self.create_key_container().get_key(path, role).await,
        }
    }

    /// Keep `key` for `path` according to `policy`
    ///
    /// The key is also placed in the returned container, so it can be used
    /// straight away without prompting.
    pub async fn set_key(
        &self,
        path: &str,
        key: Key,
        policy: KeyPolicy,
        container: Option<&KeyContainer>,
    ) -> Result<KeyContainer, KeyStoreError> {
        let role = check_role(key.role())?;
        let container = container
            .cloned()
            .unwrap_or_else(|| self.create_key_container());

        match policy.store {
            Storage::None => {}
            Storage::Once => container.set_key(path, key),
            Storage::Session | Storage::Persistent => {
                let ciphertext = if policy.prompt {
                    let prompt_key = container.prompt_storage_key().await?;
                    self.crypto.aead_encrypt(&key.to_bytes(), &prompt_key)?
                } else {
                    let storage_key = self.inner.read().storage_key.clone();
                    self.crypto.aead_encrypt(&key.to_bytes(), &storage_key)?
                };
                let slot = Slot {
                    stored: StoredKey {
                        ciphertext,
                        persistent: policy.store == Storage::Persistent,
                        prompt: policy.prompt,
                    },
                    key: (!policy.prompt).then(|| key.clone()),
                };
                self.inner
                    .write()
                    .entries
                    .entry(path.to_string())
                    .or_default()
                    .set(role, Some(slot));
                tracing::debug!(path, %role, ?policy, "stored key");
                container.set_key(path, key);
            }
        }
        Ok(container)
    }

    /// Derive the password identity for `path` and keep it
    ///
    /// A role whose policy stores nothing is not derived.
    pub async fn set_password(
        &self,
        path: &str,
        password: &str,
        sign_policy: KeyPolicy,
        decrypt_policy: KeyPolicy,
    ) -> Result<KeyContainer, KeyStoreError> {
        let container = self.create_key_container();
        if sign_policy.store != Storage::None {
            let key = self.crypto.sign_key_from_password(password, path).await?;
            self.set_key(path, key.into(), sign_policy, Some(&container))
                .await?;
        }
        if decrypt_policy.store != Storage::None {
            let key = self
                .crypto
                .decryption_key_from_password(password, path)
                .await?;
            self.set_key(path, key.into(), decrypt_policy, Some(&container))
                .await?;
        }
        Ok(container)
    }

    /// Forget one role for `path`. Returns whether anything was removed.
    pub fn delete_key(&self, path: &str, role: KeyRole) -> bool {
        let mut inner = self.inner.write();
        let Some(keys) = inner.entries.get_mut(path) else {
            return false;
        };
        let removed = keys.slot(role).is_some();
        keys.set(role, None);
        if keys.is_empty() {
            inner.entries.remove(path);
        }
        if removed {
            tracing::debug!(path, %role, "deleted key");
        }
        removed
    }

    pub fn delete_path(&self, path: &str) -> bool {
        let removed = self.inner.write().entries.remove(path).is_some();
        if removed {
            tracing::debug!(path, "deleted keys");
        }
        removed
    }

    pub fn key_paths(&self) -> Vec<String> {
        self.inner.read().entries.keys().cloned().collect()
    }

    /// Roles stored for `path`, with their storage flags
    pub fn stored_roles(&self, path: &str) -> Vec<(KeyRole, StoredKey)> {
        let inner = self.inner.read();
        let Some(keys) = inner.entries.get(path) else {
            return Vec::new();
        };
        ROLES
            .iter()
            .filter_map(|role| keys.slot(*role).map(|s| (*role, s.stored.clone())))
            .collect()
    }

    /// Serializable form holding only persistent keys
    pub fn export(&self) -> KeyStoreRecord {
        let inner = self.inner.read();
        let mut keys = BTreeMap::new();
        for (path, path_keys) in inner.entries.iter() {
            let persistent = |role| {
                path_keys
                    .slot(role)
                    .filter(|s| s.stored.persistent)
                    .map(|s| s.stored.clone())
            };
            let entry = KeyEntryRecord {
                sign_key: persistent(KeyRole::Sign),
                decryption_key: persistent(KeyRole::Decrypt),
            };
            if !entry.is_empty() {
                keys.insert(path.clone(), entry);
            }
        }
        KeyStoreRecord {
            storage_password_check: inner.password_check.clone(),
            keys,
        }
    }

    /// Merge the entries of a record sealed under the current storage password
    pub fn import(&self, record: KeyStoreRecord) -> Result<(), KeyStoreError> {
        let storage_key = self.inner.read().storage_key.clone();
        if !check_password(&self.crypto, &record.storage_password_check, &storage_key) {
            return Err(KeyStoreError::WrongPassword);
        }
        let loaded = load_entries(&self.crypto, &storage_key, record.keys)?;

        let mut inner = self.inner.write();
        for (path, keys) in loaded {
            let target = inner.entries.entry(path).or_default();
            for role in ROLES {
                if let Some(slot) = keys.slot(role) {
                    target.set(role, Some(slot.clone()));
                }
            }
        }
        Ok(())
    }

    /// Re-seal every stored key under a new storage password
    ///
    /// Either every entry is re-encrypted or the store is left untouched.
    pub async fn set_storage_password(&self, old: &str, new: &str) -> Result<(), KeyStoreError> {
        let old_plain = self
            .crypto
            .secret_key_from_password(old, STORAGE_SALT_PLAIN)
            .await?;
        if !check_password(&self.crypto, &self.password_check(), &old_plain) {
            return Err(KeyStoreError::WrongPassword);
        }
        let (old_prompt, new_plain, new_prompt) = tokio::try_join!(
            self.crypto.secret_key_from_password(old, STORAGE_SALT_PROMPT),
            self.crypto.secret_key_from_password(new, STORAGE_SALT_PLAIN),
            self.crypto.secret_key_from_password(new, STORAGE_SALT_PROMPT),
        )?;
        let password_check = self.crypto.aead_encrypt(PASSWORD_CHECK, &new_plain)?;

        let mut inner = self.inner.write();
        let mut entries = BTreeMap::new();
        for (path, keys) in inner.entries.iter() {
            let mut resealed = PathKeys::default();
            for role in ROLES {
                let Some(slot) = keys.slot(role) else {
                    continue;
                };
                let (from, to) = if slot.stored.prompt {
                    (&old_prompt, &new_prompt)
                } else {
                    (&old_plain, &new_plain)
                };
                let bytes = self
                    .crypto
                    .aead_decrypt(&slot.stored.ciphertext, from)
                    .map_err(|_| KeyStoreError::Corrupt {
                        path: path.clone(),
                        role,
                    })?;
                let stored = StoredKey {
                    ciphertext: self.crypto.aead_encrypt(&bytes, to)?,
                    ..slot.stored.clone()
                };
                resealed.set(
                    role,
                    Some(Slot {
                        stored,
                        key: slot.key.clone(),
                    }),
                );
            }
            entries.insert(path.clone(), resealed);
        }

        inner.entries = entries;
        inner.storage_key = new_plain;
        inner.password_check = password_check;
        tracing::debug!(count = inner.entries.len(), "storage password changed");
        Ok(())
    }

    pub fn device_sign_key(&self) -> Result<SignKey, KeyStoreError> {
        match self.cached(DEVICE_PATH, KeyRole::Sign) {
            Some(Key::Sign(key)) => Ok(key),
            _ => Err(KeyStoreError::KeyNotFound {
                path: DEVICE_PATH.to_string(),
                role: KeyRole::Sign,
            }),
        }
    }

    pub fn device_decryption_key(&self) -> Result<PrivateEncryptionKey, KeyStoreError> {
        match self.cached(DEVICE_PATH, KeyRole::Decrypt) {
            Some(Key::Decrypt(key)) => Ok(key),
            _ => Err(KeyStoreError::KeyNotFound {
                path: DEVICE_PATH.to_string(),
                role: KeyRole::Decrypt,
            }),
        }
    }

    pub fn device_verify_key(&self) -> Result<VerifyKey, KeyStoreError> {
        Ok(self.device_sign_key()?.verify_key())
    }

    pub fn device_public_key(&self) -> Result<PublicEncryptionKey, KeyStoreError> {
        Ok(self.device_decryption_key()?.public_key())
    }

    pub(crate) fn has_stored(&self, path: &str, role: KeyRole) -> bool {
        self.inner
            .read()
            .entries
            .get(path)
            .and_then(|k| k.slot(role))
            .is_some()
    }

    /// The stored form of a key plus its decrypted form when plain
    pub(crate) fn stored(&self, path: &str, role: KeyRole) -> Option<(StoredKey, Option<Key>)> {
        self.inner
            .read()
            .entries
            .get(path)
            .and_then(|k| k.slot(role))
            .map(|slot| (slot.stored.clone(), slot.key.clone()))
    }

    pub(crate) fn stored_paths(&self, role: KeyRole) -> Vec<String> {
        self.inner
            .read()
            .entries
            .iter()
            .filter(|(_, keys)| keys.slot(role).is_some())
            .map(|(path, _)| path.clone())
            .collect()
    }

    /// Ask the prompt for the storage password, honoring the timeout
    pub(crate) async fn prompt_password(&self) -> Result<String, KeyStoreError> {
        let check = self.password_check();
        let answer = match self.prompt_timeout {
            Some(limit) => tokio::time::timeout(limit, self.prompt.storage_password(&check))
                .await
                .map_err(|_| {
                    tracing::warn!(?limit, "storage password prompt timed out");
                    KeyStoreError::PromptRejected
                })?,
            None => self.prompt.storage_password(&check).await,
        };
        answer.map_err(|e| {
            tracing::warn!(error = %e, "storage password prompt failed");
            KeyStoreError::PromptRejected
        })
    }

    fn cached(&self, path: &str, role: KeyRole) -> Option<Key> {
        self.stored(path, role).and_then(|(_, key)| key)
    }

    fn provision_device(&self) -> Result<(), KeyStoreError> {
        let mut inner = self.inner.write();
        let storage_key = inner.storage_key.clone();
        let device = inner.entries.entry(DEVICE_PATH.to_string()).or_default();

        for role in ROLES {
            if device.slot(role).is_some() {
                continue;
            }
            let key = match role {
                KeyRole::Sign => Key::Sign(SignKey::generate()?),
                _ => Key::Decrypt(PrivateEncryptionKey::generate()?),
            };
            let stored = StoredKey {
                ciphertext: self.crypto.aead_encrypt(&key.to_bytes(), &storage_key)?,
                persistent: true,
                prompt: false,
            };
            device.set(
                role,
                Some(Slot {
                    stored,
                    key: Some(key),
                }),
            );
            tracing::debug!(%role, "provisioned device key");
        }
        Ok(())
    }
}

fn check_password(crypto: &Crypto, password_check: &str, storage_key: &SecretKey) -> bool {
    crypto
        .aead_decrypt(password_check, storage_key)
        .is_ok_and(|plain| plain == PASSWORD_CHECK)
}

/// Decrypt the plain tier of a record; prompt-tier keys stay sealed
fn load_entries(
    crypto: &Crypto,
    storage_key: &SecretKey,
    records: BTreeMap<String, KeyEntryRecord>,
) -> Result<BTreeMap<String, PathKeys>, KeyStoreError> {
    let mut entries = BTreeMap::new();
    for (path, record) in records {
        let mut keys = PathKeys::default();
        for role in ROLES {
            let Some(stored) = record.get(role) else {
                continue;
            };
            let key = if stored.prompt {
                None
            } else {
                let corrupt = || KeyStoreError::Corrupt {
                    path: path.clone(),
                    role,
                };
                let bytes = crypto
                    .aead_decrypt(&stored.ciphertext, storage_key)
                    .map_err(|_| corrupt())?;
                Some(Key::from_bytes(role, &bytes).map_err(|_| corrupt())?)
            };
            keys.set(
                role,
                Some(Slot {
                    stored: stored.clone(),
                    key,
                }),
            );
        }
        if !keys.is_empty() {
            entries.insert(path, keys);
        }
    }
    Ok(entries)
}

#[cfg(test)]
mod test {
    use super::*;
    use crate::crypto::KdfParams;
    use crate::key_store::{NoPrompt, StaticPrompt};

    fn config() -> KeyStoreConfig {
        KeyStoreConfig {
            kdf: KdfParams::new(64, 1, 1),
            prompt_timeout_secs: None,
        }
    }

    async fn open(record: Option<KeyStoreRecord>, password: &str) -> Result<KeyStore, KeyStoreError> {
        KeyStore::open(
            config(),
            password,
            record,
            Arc::new(StaticPrompt(password.to_string())),
        )
        .await
    }

    #[tokio::test]
    async fn test_device_identity_provisioned() {
        let store = open(None, "storage").await.unwrap();
        assert!(store.has_key(DEVICE_PATH, KeyRole::Sign, None));
        assert!(store.has_key(DEVICE_PATH, KeyRole::Decrypt, None));

        let record = store.export();
        let reopened = open(Some(record), "storage").await.unwrap();
        assert_eq!(
            reopened.device_verify_key().unwrap(),
            store.device_verify_key().unwrap()
        );
        assert_eq!(
            reopened.device_public_key().unwrap(),
            store.device_public_key().unwrap()
        );
    }

    #[tokio::test]
    async fn test_wrong_password_on_open() {
        let store = open(None, "storage").await.unwrap();
        let err = open(Some(store.export()), "nope").await.unwrap_err();
        assert!(matches!(err, KeyStoreError::WrongPassword));
    }

    #[tokio::test]
    async fn test_export_keeps_only_persistent() {
        let store = open(None, "storage").await.unwrap();
        store
            .set_password("/a", "pw", KeyPolicy::PERSISTENT, KeyPolicy::SESSION)
            .await
            .unwrap();
        store
            .set_password("/b", "pw", KeyPolicy::ONCE, KeyPolicy::NONE)
            .await
            .unwrap();

        assert!(store.has_key("/a", KeyRole::Sign, None));
        assert!(store.has_key("/a", KeyRole::Decrypt, None));
        assert!(!store.has_key("/b", KeyRole::Sign, None));

        let record = store.export();
        assert!(record.keys["/a"].sign_key.is_some());
        assert!(record.keys["/a"].decryption_key.is_none());
        assert!(!record.keys.contains_key("/b"));

        let reopened = open(Some(record), "storage").await.unwrap();
        let key = reopened.get_key("/a", KeyRole::Sign, None).await.unwrap();
        let expected = store
            .crypto()
            .sign_key_from_password("pw", "/a")
            .await
            .unwrap();
        assert_eq!(key.as_sign().unwrap().to_bytes(), expected.to_bytes());
    }

    #[tokio::test]
    async fn test_once_key_stays_in_container() {
        let store = open(None, "storage").await.unwrap();
        let container = store
            .set_password("/a", "pw", KeyPolicy::ONCE, KeyPolicy::ONCE)
            .await
            .unwrap();

        assert!(store.has_key("/a", KeyRole::Sign, Some(&container)));
        assert!(!store.has_key("/a", KeyRole::Sign, None));
        assert!(container.get_key("/a", KeyRole::Decrypt).await.is_ok());
        assert!(matches!(
            store.get_key("/a", KeyRole::Sign, None).await,
            Err(KeyStoreError::KeyNotFound { .. })
        ));
    }

    #[tokio::test]
    async fn test_set_storage_password() {
        let store = open(None, "old").await.unwrap();
        store
            .set_password("/a", "pw", KeyPolicy::PERSISTENT, KeyPolicy::PERSISTENT)
            .await
            .unwrap();
        store
            .set_password(
                "/p",
                "pw",
                KeyPolicy::PERSISTENT.with_prompt(),
                KeyPolicy::NONE,
            )
            .await
            .unwrap();
        let before = store.get_key("/a", KeyRole::Sign, None).await.unwrap();

        assert!(matches!(
            store.set_storage_password("wrong", "new").await,
            Err(KeyStoreError::WrongPassword)
        ));
        store.set_storage_password("old", "new").await.unwrap();
        assert!(store.check_storage_password("new").await.unwrap());
        assert!(!store.check_storage_password("old").await.unwrap());

        let record = store.export();
        assert!(matches!(
            open(Some(record.clone()), "old").await,
            Err(KeyStoreError::WrongPassword)
        ));
        let reopened = open(Some(record), "new").await.unwrap();
        let after = reopened.get_key("/a", KeyRole::Sign, None).await.unwrap();
        assert_eq!(
            before.as_sign().unwrap().to_bytes(),
            after.as_sign().unwrap().to_bytes()
        );
        // prompt tier re-sealed under the new password too
        assert!(reopened
            .get_key("/p", KeyRole::Sign, None)
            .await
            .is_ok());
    }

    #[tokio::test]
    async fn test_prompt_rejected() {
        let store = KeyStore::open(config(), "storage", None, Arc::new(NoPrompt))
            .await
            .unwrap();
        let err = store
            .set_password(
                "/a",
                "pw",
                KeyPolicy::SESSION.with_prompt(),
                KeyPolicy::NONE,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, KeyStoreError::PromptRejected));

        let container = store.key_container_with_password("storage");
        let key = SignKey::generate().unwrap();
        store
            .set_key(
                "/a",
                key.into(),
                KeyPolicy::SESSION.with_prompt(),
                Some(&container),
            )
            .await
            .unwrap();
        assert!(matches!(
            store.get_key("/a", KeyRole::Sign, None).await,
            Err(KeyStoreError::PromptRejected)
        ));
    }

    #[tokio::test]
    async fn test_import_and_delete() {
        let first = open(None, "storage").await.unwrap();
        first
            .set_password("/a", "pw", KeyPolicy::PERSISTENT, KeyPolicy::PERSISTENT)
            .await
            .unwrap();

        let second = open(None, "storage").await.unwrap();
        second.import(first.export()).unwrap();
        assert!(second.has_key("/a", KeyRole::Sign, None));

        let other = open(None, "different").await.unwrap();
        assert!(matches!(
            other.import(first.export()),
            Err(KeyStoreError::WrongPassword)
        ));

        assert!(second.delete_key("/a", KeyRole::Sign));
        assert!(!second.delete_key("/a", KeyRole::Sign));
        assert!(second.has_key("/a", KeyRole::Decrypt, None));
        assert!(second.delete_path("/a"));
        assert!(!second.key_paths().contains(&"/a".to_string()));
    }

    #[tokio::test]
    async fn test_unsupported_role() {
        let store = open(None, "storage").await.unwrap();
        let err = store
            .set_key(
                "/a",
                Key::Secret(SecretKey::generate().unwrap()),
                KeyPolicy::SESSION,
                None,
            )
            .await
            .unwrap_err();
        assert!(matches!(err, KeyStoreError::UnsupportedRole(KeyRole::Secret)));
    }
}
