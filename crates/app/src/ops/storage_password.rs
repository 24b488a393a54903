use clap::Args;

use crate::state::StateError;

/// Re-seal every stored key under a new storage password
#[derive(Args, Debug, Clone)]
pub struct StoragePassword {
    /// The new storage password
    #[arg(long, env = "TRELLIS_NEW_STORAGE_PASSWORD", hide_env_values = true)]
    pub new_password: String,
}

#[derive(Debug, thiserror::Error)]
pub enum StoragePasswordError {
    #[error(transparent)]
    State(#[from] StateError),
    #[error("the new storage password must not be empty")]
    EmptyPassword,
}

#[async_trait::async_trait]
impl crate::op::Op for StoragePassword {
    type Error = StoragePasswordError;
    type Output = String;

    async fn execute(&self, ctx: &crate::op::OpContext) -> Result<Self::Output, Self::Error> {
        if self.new_password.is_empty() {
            return Err(StoragePasswordError::EmptyPassword);
        }
        let (state, keys) = ctx.open().await?;
        keys.set_storage_password(ctx.storage_password()?, &self.new_password)
            .await
            .map_err(StateError::from)?;
        state.save_key_store(&keys)?;

        Ok(format!(
            "storage password changed for {} path(s)",
            keys.key_paths().len()
        ))
    }
}
