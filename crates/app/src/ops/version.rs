use std::convert::Infallible;

use clap::Args;

use common::build_info;

/// Print build information
#[derive(Args, Debug, Clone)]
pub struct Version {
    /// Print the build info as JSON
    #[arg(long)]
    pub json: bool,
}

#[async_trait::async_trait]
impl crate::op::Op for Version {
    type Error = Infallible;
    type Output = String;

    async fn execute(&self, _ctx: &crate::op::OpContext) -> Result<Self::Output, Self::Error> {
        let info = build_info!();
        if self.json {
            if let Ok(json) = serde_json::to_string_pretty(&info) {
                return Ok(json);
            }
        }
        Ok(info.to_string())
    }
}
