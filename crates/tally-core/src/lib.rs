//! tally-core: Shared inventory types, address codec, and error handling for Tally.
//!
//! This crate provides the foundational pieces used by every Tally component:
//! - Inventory types (Subnet, Device, AddressRecord) as read from the store
//! - The address codec: canonical integer form, display form, CIDR containment
//! - Physical (MAC) address parsing
//! - Common error types

pub mod address;
pub mod error;
pub mod types;

pub use error::CoreError;
pub use types::*;
