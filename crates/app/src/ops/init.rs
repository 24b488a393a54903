use clap::Args;
use common::crypto::KdfParams;

use crate::state::{AppConfig, AppState, StateError};

#[derive(Args, Debug, Clone)]
pub struct Init {
    /// Argon2id memory cost in KiB
    #[arg(long, default_value_t = KdfParams::default().memory_kib)]
    pub kdf_memory_kib: u32,

    /// Argon2id iterations
    #[arg(long, default_value_t = KdfParams::default().iterations)]
    pub kdf_iterations: u32,

    /// Give up on prompt-protected keys after this many seconds
    #[arg(long)]
    pub prompt_timeout_secs: Option<u64>,
}

#[derive(Debug, thiserror::Error)]
pub enum InitError {
    #[error("init failed: {0}")]
    StateFailed(#[from] StateError),
}

#[async_trait::async_trait]
impl crate::op::Op for Init {
    type Error = InitError;
    type Output = String;

    async fn execute(&self, ctx: &crate::op::OpContext) -> Result<Self::Output, Self::Error> {
        let kdf = KdfParams {
            memory_kib: self.kdf_memory_kib,
            iterations: self.kdf_iterations,
            ..Default::default()
        };
        let mut config = AppConfig::with_kdf(kdf);
        config.key_store.prompt_timeout_secs = self.prompt_timeout_secs;

        let (state, keys) = AppState::init(
            ctx.config_path.clone(),
            Some(config),
            ctx.storage_password()?,
        )
        .await?;
        let device = keys.device_verify_key().map_err(StateError::from)?;

        let output = format!(
            "Initialized trellis directory at: {}\n\
             - Config: {}\n\
             - Key store: {}\n\
             - KDF: argon2id, {} KiB, {} iteration(s)\n\
             - Device verify key: {}",
            state.trellis_dir.display(),
            state.config_path.display(),
            state.key_store_path.display(),
            state.config.key_store.kdf.memory_kib,
            state.config.key_store.kdf.iterations,
            device.to_base64(),
        );

        Ok(output)
    }
}
