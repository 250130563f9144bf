use async_trait::async_trait;
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ChannelError {
    #[error("failed to send message: {0}")]
    Send(String),

    #[error("failed to show typing indicator: {0}")]
    Typing(String),
}

/// Keeps a typing indicator alive until dropped.
pub struct TypingGuard {
    _inner: Option<Box<dyn Send + Sync>>,
}

impl TypingGuard {
    pub fn holding<T: Send + Sync + 'static>(inner: T) -> Self {
        Self {
            _inner: Some(Box::new(inner)),
        }
    }

    /// A guard for channels that have no typing indicator.
    pub fn none() -> Self {
        Self { _inner: None }
    }
}

/// Where a bot speaks.
#[async_trait]
pub trait CommunicationChannel: Send + Sync {
    async fn send_message(&self, message: &str) -> Result<(), ChannelError>;

    /// Starts the typing indicator; it stops when the guard is dropped.
    async fn show_typing(&self) -> Result<TypingGuard, ChannelError>;
}
