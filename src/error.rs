use thiserror::Error;

#[derive(Debug, Error)]
pub enum TrainerError {
    #[error("model request failed: {0}")]
    Http(#[from] reqwest::Error),

    #[error("model provider error ({provider}, status {status}): {body}")]
    Provider {
        provider: String,
        status: u16,
        body: String,
    },

    #[error("stream read failed: {0}")]
    Io(#[from] std::io::Error),

    #[error("missing API key: set {0}")]
    MissingApiKey(String),

    #[error("unknown scenario: {0}")]
    UnknownScenario(String),

    #[error("engine stopped")]
    EngineStopped,
}

pub type Result<T> = std::result::Result<T, TrainerError>;
