use thiserror::Error;

#[derive(Debug, Error)]
pub enum RandomizeError {
    /// The attempt ran out of valid placements. Retrying with another seed may succeed.
    #[error("Generation failed: {0}")]
    GenerationFailure(String),

    /// A filled world turned out not to be beatable. This is a logic bug, never retried.
    #[error("Consistency failure: {message} (unreached locations: {unreached:?}, uncollected items: {uncollected:?})")]
    ConsistencyFailure {
        message: String,
        unreached: Vec<String>,
        uncollected: Vec<String>,
    },

    #[error("Invalid configuration: {0}")]
    InvalidConfiguration(String),
}

impl RandomizeError {
    pub fn is_recoverable(&self) -> bool {
        matches!(self, RandomizeError::GenerationFailure(_))
    }
}

pub type Result<T> = std::result::Result<T, RandomizeError>;
