use reqwest::StatusCode;
use thiserror::Error;

/// Failures talking to the Glass API.
///
/// None of these are fatal: the session keeps its stale token and reads
/// degrade to "unavailable" for the affected value.
#[derive(Debug, Error)]
pub enum VendorError {
    #[error("login not accepted: {0}")]
    Rejected(String),
    #[error("unexpected status {0}")]
    Status(StatusCode),
    #[error("request failed: {0}")]
    Request(#[from] reqwest::Error),
    #[error("malformed response: {0}")]
    Malformed(String),
    #[error("no resource id for {0}")]
    MissingResource(&'static str),
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum PublishError {
    #[error("gave up publishing to {topic} after {attempts} attempts")]
    Exhausted { topic: String, attempts: u32 },
    #[error("could not encode payload for {topic}: {reason}")]
    Encode { topic: String, reason: String },
}
