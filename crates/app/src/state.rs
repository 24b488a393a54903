use std::{fs, path::PathBuf, sync::Arc};

use common::crypto::KdfParams;
use common::key_store::{KeyStore, KeyStoreConfig, KeyStoreError, KeyStoreRecord, StaticPrompt};
use serde::{Deserialize, Serialize};

pub const APP_NAME: &str = "trellis";
pub const CONFIG_FILE_NAME: &str = "config.toml";
pub const KEY_STORE_FILE_NAME: &str = "keystore.json";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// Key store file, relative to the state directory
    #[serde(default = "default_key_store_file")]
    pub key_store_file: String,
    /// Key store settings, the KDF cost in particular
    #[serde(default)]
    pub key_store: KeyStoreConfig,
}

fn default_key_store_file() -> String {
    KEY_STORE_FILE_NAME.to_string()
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            key_store_file: default_key_store_file(),
            key_store: KeyStoreConfig::default(),
        }
    }
}

impl AppConfig {
    pub fn with_kdf(kdf: KdfParams) -> Self {
        Self {
            key_store: KeyStoreConfig {
                kdf,
                ..Default::default()
            },
            ..Default::default()
        }
    }
}

#[derive(Debug, Clone)]
pub struct AppState {
    /// Path to the trellis directory (~/.trellis)
    pub trellis_dir: PathBuf,
    /// Path to the config file
    pub config_path: PathBuf,
    /// Path to the key store record
    pub key_store_path: PathBuf,
    /// Loaded configuration
    pub config: AppConfig,
}

impl AppState {
    /// Get the trellis directory path (custom or default ~/.trellis)
    pub fn trellis_dir(custom_path: Option<PathBuf>) -> Result<PathBuf, StateError> {
        if let Some(path) = custom_path {
            return Ok(path);
        }

        let home = dirs::home_dir().ok_or(StateError::NoHomeDirectory)?;
        Ok(home.join(format!(".{}", APP_NAME)))
    }

    /// Initialize a new state directory with an empty key store
    pub async fn init(
        custom_path: Option<PathBuf>,
        config: Option<AppConfig>,
        storage_password: &str,
    ) -> Result<(Self, KeyStore), StateError> {
        let trellis_dir = Self::trellis_dir(custom_path)?;
        if trellis_dir.exists() {
            return Err(StateError::AlreadyInitialized);
        }
        fs::create_dir_all(&trellis_dir)?;

        let config = config.unwrap_or_default();
        let config_path = trellis_dir.join(CONFIG_FILE_NAME);
        fs::write(&config_path, toml::to_string_pretty(&config)?)?;

        let state = Self {
            key_store_path: trellis_dir.join(&config.key_store_file),
            trellis_dir,
            config_path,
            config,
        };

        // opening without a record creates the password check and device keys
        let keys = state.open_key_store(storage_password).await?;
        state.save_key_store(&keys)?;
        Ok((state, keys))
    }

    /// Load existing state from the trellis directory
    pub fn load(custom_path: Option<PathBuf>) -> Result<Self, StateError> {
        let trellis_dir = Self::trellis_dir(custom_path)?;
        if !trellis_dir.exists() {
            return Err(StateError::NotInitialized);
        }

        let config_path = trellis_dir.join(CONFIG_FILE_NAME);
        if !config_path.exists() {
            return Err(StateError::MissingFile(CONFIG_FILE_NAME.to_string()));
        }
        let config: AppConfig = toml::from_str(&fs::read_to_string(&config_path)?)?;

        let key_store_path = trellis_dir.join(&config.key_store_file);
        if !key_store_path.exists() {
            return Err(StateError::MissingFile(config.key_store_file.clone()));
        }

        Ok(Self {
            trellis_dir,
            config_path,
            key_store_path,
            config,
        })
    }

    /// Open the key store record under `storage_password`
    ///
    /// Prompt-protected keys are unlocked with the same password.
    pub async fn open_key_store(&self, storage_password: &str) -> Result<KeyStore, StateError> {
        let record = if self.key_store_path.exists() {
            let json = fs::read_to_string(&self.key_store_path)?;
            Some(KeyStoreRecord::from_json(&json).map_err(KeyStoreError::from)?)
        } else {
            None
        };

        let keys = KeyStore::open(
            self.config.key_store.clone(),
            storage_password,
            record,
            Arc::new(StaticPrompt(storage_password.to_string())),
        )
        .await?;
        Ok(keys)
    }

    /// Write the persistent part of `keys` back to disk
    pub fn save_key_store(&self, keys: &KeyStore) -> Result<(), StateError> {
        let json = keys.export().to_json().map_err(KeyStoreError::from)?;
        fs::write(&self.key_store_path, json)?;
        tracing::debug!(path = %self.key_store_path.display(), "saved key store");
        Ok(())
    }
}

#[derive(Debug, thiserror::Error)]
pub enum StateError {
    #[error("trellis directory not initialized. Run 'trellis init' first")]
    NotInitialized,

    #[error("trellis directory already initialized")]
    AlreadyInitialized,

    #[error("no home directory found")]
    NoHomeDirectory,

    #[error("missing required file: {0}")]
    MissingFile(String),

    #[error("a storage password is required (--storage-password or TRELLIS_STORAGE_PASSWORD)")]
    MissingStoragePassword,

    #[error("key store error: {0}")]
    KeyStore(#[from] KeyStoreError),

    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("TOML serialization error: {0}")]
    TomlSer(#[from] toml::ser::Error),

    #[error("TOML deserialization error: {0}")]
    TomlDe(#[from] toml::de::Error),
}
