use clap::Args;

use crate::state::StateError;

/// Print the public half of this device's identity
#[derive(Args, Debug, Clone)]
pub struct Device;

#[derive(Debug, thiserror::Error)]
pub enum DeviceError {
    #[error(transparent)]
    State(#[from] StateError),
}

#[async_trait::async_trait]
impl crate::op::Op for Device {
    type Error = DeviceError;
    type Output = String;

    async fn execute(&self, ctx: &crate::op::OpContext) -> Result<Self::Output, Self::Error> {
        let (_, keys) = ctx.open().await?;
        let verify_key = keys.device_verify_key().map_err(StateError::from)?;
        let public_key = keys.device_public_key().map_err(StateError::from)?;

        Ok(format!(
            "verify key: {}\npublic key: {}",
            verify_key.to_base64(),
            public_key.to_base64()
        ))
    }
}
