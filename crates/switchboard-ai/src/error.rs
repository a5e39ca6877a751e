use thiserror::Error;

#[derive(Error, Debug)]
pub enum AiError {
    #[error("request failed: {0}")]
    Request(String),

    #[error("authentication failed: {0}")]
    Auth(String),

    #[error("provider error: {0}")]
    Provider(String),

    #[error("stream read error: {0}")]
    Stream(String),

    #[error("malformed model output: {0}")]
    MalformedOutput(String),

    #[error("input too large: {0} bytes (limit: {1} bytes)")]
    InputTooLarge(usize, usize),
}
