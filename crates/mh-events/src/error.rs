use thiserror::Error;

#[derive(Debug, Error)]
pub enum EventError {
    #[error("publish to {topic:?} failed: {reason}")]
    Publish { topic: String, reason: String },

    #[error("event serialization failed: {0}")]
    Serialize(#[from] serde_json::Error),
}

pub type EventResult<T> = Result<T, EventError>;
