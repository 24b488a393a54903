//! Shared test utilities for object protocol integration tests
#![allow(dead_code)]

use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;

use async_trait::async_trait;
use common::crypto::KdfParams;
use common::key_store::{
    KeyPolicy, KeyStore, KeyStoreConfig, NoPrompt, PasswordPrompt, PromptError,
};
use common::object::{Field, Node, OwnerKind, Policy, Root};
use common::store::MemoryDocumentStore;

pub const STORAGE_PASSWORD: &str = "storage-password";
pub const ROOT_PASSWORD: &str = "root-password";
pub const APP_PASSWORD: &str = "app-password";
pub const CITY_PASSWORD: &str = "city-password";

pub static APP: Policy = Policy::new("app", "apps", OwnerKind::Root)
    .fields(&[Field::plain("name"), Field::confidential("apiKey")])
    .password(true, true);

/// Cities do not let their app sign on their behalf
pub static CITY: Policy = Policy::new("city", "cities", OwnerKind::Kind("app"))
    .fields(&[
        Field::plain("name"),
        Field::plain("founded"),
        Field::confidential("mayor"),
    ])
    .password(true, true)
    .owner_may_write(false);

pub static JOB: Policy = Policy::new("job", "jobs", OwnerKind::Kind("city")).fields(&[
    Field::plain("title"),
    Field::plain("salary"),
    Field::confidential("notes"),
]);

/// Cheap enough for tests, still Argon2id
pub fn config() -> KeyStoreConfig {
    KeyStoreConfig {
        kdf: KdfParams::new(64, 1, 1),
        prompt_timeout_secs: None,
    }
}

/// Answers with a fixed password and counts how often it was asked
#[derive(Debug, Default)]
pub struct CountingPrompt {
    password: String,
    calls: AtomicUsize,
}

impl CountingPrompt {
    pub fn new(password: &str) -> Arc<Self> {
        Arc::new(Self {
            password: password.to_string(),
            calls: AtomicUsize::new(0),
        })
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl PasswordPrompt for CountingPrompt {
    async fn storage_password(&self, _password_check: &str) -> Result<String, PromptError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        // give concurrent callers a chance to pile up
        tokio::task::yield_now().await;
        Ok(self.password.clone())
    }
}

/// The writer side of a test: holds the root keys and shares a store
pub struct TestEnv {
    pub root: Root,
    pub keys: KeyStore,
    pub store: Arc<MemoryDocumentStore>,
    pub prompt: Arc<CountingPrompt>,
}

/// Set up a writer with root keys over a fresh in-memory store
pub async fn setup_test_env() -> TestEnv {
    let prompt = CountingPrompt::new(STORAGE_PASSWORD);
    let keys = KeyStore::open(config(), STORAGE_PASSWORD, None, prompt.clone())
        .await
        .unwrap();
    let container = keys
        .set_password("", ROOT_PASSWORD, KeyPolicy::SESSION, KeyPolicy::SESSION)
        .await
        .unwrap();
    let verify_key = container.sign_key("").await.unwrap().verify_key();
    let public_key = container.decryption_key("").await.unwrap().public_key();

    let store = Arc::new(MemoryDocumentStore::new(Some(verify_key)));
    let root = Root::new(
        keys.clone(),
        Some(verify_key),
        Some(public_key),
        store.clone(),
        store.clone(),
    );
    TestEnv {
        root,
        keys,
        store,
        prompt,
    }
}

impl TestEnv {
    /// Another party on the same store, with an empty key store of its own
    pub async fn client(&self) -> (Root, KeyStore) {
        let keys = KeyStore::open(config(), "client-storage", None, Arc::new(NoPrompt))
            .await
            .unwrap();
        let root = Root::new(
            keys.clone(),
            self.root.verify_key(),
            self.root.public_key(),
            self.store.clone(),
            self.store.clone(),
        );
        (root, keys)
    }

    /// An uploaded app whose password keys the writer holds
    pub async fn app(&self, name: &str) -> Node {
        let mut app = self.root.child(&APP);
        app.set("name", name).unwrap();
        app.set_password(APP_PASSWORD).await.unwrap();
        self.keys
            .set_password(
                &app.path(),
                APP_PASSWORD,
                KeyPolicy::SESSION,
                KeyPolicy::SESSION,
            )
            .await
            .unwrap();
        self.root
            .upload(std::slice::from_mut(&mut app), None)
            .await
            .unwrap();
        app
    }

    /// An uploaded city under `app`, signed by the app
    pub async fn city(&self, app: &Node, name: &str) -> Node {
        let mut city = app.child(&CITY);
        city.set("name", name).unwrap();
        city.set("founded", "1237-01-01T00:00:00.000Z").unwrap();
        city.set_password(CITY_PASSWORD).await.unwrap();
        self.keys
            .set_password(
                &city.path(),
                CITY_PASSWORD,
                KeyPolicy::SESSION,
                KeyPolicy::SESSION,
            )
            .await
            .unwrap();
        self.root
            .upload(std::slice::from_mut(&mut city), None)
            .await
            .unwrap();
        city
    }

    /// An unsaved job under `city`
    pub fn job(&self, city: &Node, title: &str, salary: u64, notes: &str) -> Node {
        let mut job = city.child(&JOB);
        job.set("title", title).unwrap();
        job.set("salary", salary).unwrap();
        job.set("notes", notes).unwrap();
        job
    }
}
