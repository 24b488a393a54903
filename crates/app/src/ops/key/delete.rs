use clap::Args;

use super::RoleArg;
use crate::state::StateError;

/// Forget the keys for a path
#[derive(Args, Debug, Clone)]
pub struct Delete {
    pub path: String,

    /// Only forget this role
    #[arg(long, value_enum)]
    pub role: Option<RoleArg>,
}

#[derive(Debug, thiserror::Error)]
pub enum DeleteError {
    #[error(transparent)]
    State(#[from] StateError),
    #[error("no keys stored for '{0}'")]
    NotFound(String),
}

#[async_trait::async_trait]
impl crate::op::Op for Delete {
    type Error = DeleteError;
    type Output = String;

    async fn execute(&self, ctx: &crate::op::OpContext) -> Result<Self::Output, Self::Error> {
        let (state, keys) = ctx.open().await?;
        let removed = match self.role {
            Some(role) => keys.delete_key(&self.path, role.into()),
            None => keys.delete_path(&self.path),
        };
        if !removed {
            return Err(DeleteError::NotFound(self.path.clone()));
        }
        state.save_key_store(&keys)?;
        Ok(format!("deleted keys for '{}'", self.path))
    }
}
