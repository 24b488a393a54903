use clap::Args;

use crate::state::StateError;

/// List stored keys
#[derive(Args, Debug, Clone)]
pub struct List;

#[derive(Debug, thiserror::Error)]
pub enum ListError {
    #[error(transparent)]
    State(#[from] StateError),
}

#[async_trait::async_trait]
impl crate::op::Op for List {
    type Error = ListError;
    type Output = String;

    async fn execute(&self, ctx: &crate::op::OpContext) -> Result<Self::Output, Self::Error> {
        let (_, keys) = ctx.open().await?;

        let mut lines = Vec::new();
        for path in keys.key_paths() {
            let label = if path.is_empty() { "(root)" } else { path.as_str() };
            for (role, stored) in keys.stored_roles(&path) {
                let mut flags = vec![if stored.persistent {
                    "persistent"
                } else {
                    "session"
                }];
                if stored.prompt {
                    flags.push("prompt");
                }
                lines.push(format!("{}\t{}\t{}", label, role, flags.join(",")));
            }
        }
        if lines.is_empty() {
            return Ok("no keys stored".to_string());
        }
        Ok(lines.join("\n"))
    }
}
