//! Common types and utilities for the COMPAS forwarding node.
//!
//! This crate provides the name model, the TLV codec and the NDN packet
//! wire format shared by the relay and the command-line tools.

pub mod ndn;
pub mod tlv;
pub mod metrics;
pub mod types;
pub mod error;

/// Reexport of common types
pub use error::Error;
pub type Result<T> = std::result::Result<T, Error>;
