use clap::Args;

use crate::state::StateError;

/// Print the persistent keys as they would be written to disk
#[derive(Args, Debug, Clone)]
pub struct Export;

#[derive(Debug, thiserror::Error)]
pub enum ExportError {
    #[error(transparent)]
    State(#[from] StateError),
    #[error("failed to encode key store: {0}")]
    Encode(#[from] serde_json::Error),
}

#[async_trait::async_trait]
impl crate::op::Op for Export {
    type Error = ExportError;
    type Output = String;

    async fn execute(&self, ctx: &crate::op::OpContext) -> Result<Self::Output, Self::Error> {
        let (_, keys) = ctx.open().await?;
        Ok(keys.export().to_json()?)
    }
}
