use thiserror::Error;

#[derive(Debug, Error)]
pub enum ElectrumError {
    #[error("connect timed out after {0:?}")]
    ConnectTimeout(std::time::Duration),

    #[error("request timed out after {0:?}")]
    RequestTimeout(std::time::Duration),

    #[error("electrum server returned an error: {0}")]
    RpcError(String),

    #[error("failed to connect: {0}")]
    Connect(String),

    #[error("connection closed")]
    ConnectionClosed,

    #[error("malformed response: {0}")]
    MalformedResponse(String),

    #[error("invalid address: {0}")]
    InvalidAddress(String),

    #[error("invalid transaction hex: {0}")]
    InvalidTransaction(String),
}

pub type Result<T> = std::result::Result<T, ElectrumError>;
