use thiserror::Error;

#[derive(Error, Debug)]
pub enum TelephonyError {
    #[error("call control request failed: {0}")]
    Request(String),

    #[error("call control rejected: HTTP {0}: {1}")]
    Rejected(u16, String),

    #[error("invalid configuration: {0}")]
    Config(String),
}
