use thiserror::Error;

use crate::communication_channel::ChannelError;

/// Shown in the channel when no usable reply could be generated.
pub const GENERATION_FAILED_TEXT: &str = "Response generation failed :(";

#[derive(Debug, Error)]
pub enum EngineError {
    /// The generator returned nothing usable for every attempt.
    #[error("text generation failed")]
    GenerationFailed,

    /// Selection was asked to choose among candidates that are all absent.
    #[error("no candidates available for selection")]
    NoCandidatesAvailable,

    #[error("`{0}` is not a valid selection algorithm")]
    InvalidSelectionAlgorithm(String),

    /// The change was applied in memory but the store rejected it.
    #[error("configuration change was not persisted")]
    ConfigPersistFailed,

    #[error(transparent)]
    Channel(#[from] ChannelError),
}

impl EngineError {
    /// Text a user sees when this error ends a reply attempt.
    pub fn user_message(&self) -> String {
        match self {
            EngineError::GenerationFailed | EngineError::NoCandidatesAvailable => {
                GENERATION_FAILED_TEXT.to_string()
            }
            EngineError::InvalidSelectionAlgorithm(name) => {
                format!("Error: `{}` is not a valid selection algorithm", name)
            }
            EngineError::ConfigPersistFailed => "There was a problem updating config...".to_string(),
            EngineError::Channel(e) => format!("Error: {}", e),
        }
    }
}
