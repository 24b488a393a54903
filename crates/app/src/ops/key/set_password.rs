use clap::Args;
use common::key_store::Storage;

use super::StorageArg;
use crate::state::StateError;

/// Derive the password identity for a path and keep it
#[derive(Args, Debug, Clone)]
pub struct SetPassword {
    /// Tree path the identity belongs to ("" for the root)
    pub path: String,

    #[arg(long, env = "TRELLIS_KEY_PASSWORD", hide_env_values = true)]
    pub password: String,

    /// How to keep the signing key
    #[arg(long, value_enum, default_value_t = StorageArg::Persistent)]
    pub sign: StorageArg,

    /// How to keep the decryption key
    #[arg(long, value_enum, default_value_t = StorageArg::Persistent)]
    pub decrypt: StorageArg,

    /// Require the storage password again before these keys are used
    #[arg(long)]
    pub prompt: bool,
}

#[derive(Debug, thiserror::Error)]
pub enum SetPasswordError {
    #[error(transparent)]
    State(#[from] StateError),
    #[error("nothing to keep: both roles are set to 'none'")]
    NothingStored,
}

#[async_trait::async_trait]
impl crate::op::Op for SetPassword {
    type Error = SetPasswordError;
    type Output = String;

    async fn execute(&self, ctx: &crate::op::OpContext) -> Result<Self::Output, Self::Error> {
        let sign = self.sign.policy(self.prompt);
        let decrypt = self.decrypt.policy(self.prompt);
        if sign.store == Storage::None && decrypt.store == Storage::None {
            return Err(SetPasswordError::NothingStored);
        }

        let (state, keys) = ctx.open().await?;
        keys.set_password(&self.path, &self.password, sign, decrypt)
            .await
            .map_err(StateError::from)?;
        state.save_key_store(&keys)?;

        let path = if self.path.is_empty() { "root" } else { &self.path };
        Ok(format!("keys set for {}", path))
    }
}
