//! tally-discover: ARP-table discovery and inventory reconciliation.
//!
//! Queries network devices for their address-resolution tables, reconciles
//! what they report against the address inventory subnet by subnet, and
//! keeps hostnames current through a reverse-DNS pass.

pub mod baseline;
pub mod config;
pub mod error;
pub mod pass;
pub mod query;
pub mod reconcile;
pub mod resolve;
pub mod select;
pub mod snmp_walk;
pub mod summary;
pub mod tracker;
