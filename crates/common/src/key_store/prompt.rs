use async_trait::async_trait;

#[derive(Debug, Clone, thiserror::Error)]
pub enum PromptError {
    #[error("password entry cancelled")]
    Cancelled,
    #[error("password prompt failed: {0}")]
    Failed(String),
}

/// Asks the user for the storage password
///
/// Receives the store's password check value so an implementation can
/// validate what the user typed before returning it.
#[async_trait]
pub trait PasswordPrompt: Send + Sync + 'static {
    async fn storage_password(&self, password_check: &str) -> Result<String, PromptError>;
}

/// A prompt that always refuses
#[derive(Debug, Clone, Copy, Default)]
pub struct NoPrompt;

#[async_trait]
impl PasswordPrompt for NoPrompt {
    async fn storage_password(&self, _password_check: &str) -> Result<String, PromptError> {
        Err(PromptError::Cancelled)
    }
}

/// A prompt that answers with a fixed password
#[derive(Debug, Clone)]
pub struct StaticPrompt(pub String);

#[async_trait]
impl PasswordPrompt for StaticPrompt {
    async fn storage_password(&self, _password_check: &str) -> Result<String, PromptError> {
        Ok(self.0.clone())
    }
}
