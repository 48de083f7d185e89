//! Error types for the tally-discover crate.

use tally_core::CoreError;
use tally_store::StoreError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum DiscoverError {
    #[error(transparent)]
    InvalidAddress(#[from] CoreError),

    #[error("Query of device {device} failed: {reason}")]
    DeviceQuery { device: String, reason: String },

    #[error("Query of device {device} timed out after {secs}s")]
    QueryTimeout { device: String, secs: u64 },

    #[error("No devices authorized for subnet {subnet}")]
    NoAuthorizedDevices { subnet: String },

    #[error("Store error: {0}")]
    Store(#[from] StoreError),

    #[error("Resolution of {address} failed: {reason}")]
    Resolution { address: String, reason: String },

    #[error("Config error: {0}")]
    Config(String),
}

pub type Result<T> = std::result::Result<T, DiscoverError>;
