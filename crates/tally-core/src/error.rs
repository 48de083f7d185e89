use thiserror::Error;

/// Errors raised by the address codec and value parsers.
#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum CoreError {
    #[error("Invalid address: {0}")]
    InvalidAddress(String),

    #[error("Invalid physical address: {0}")]
    InvalidMac(String),
}

pub type Result<T> = std::result::Result<T, CoreError>;
