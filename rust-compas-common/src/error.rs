//! Error types for the COMPAS forwarding node.

use thiserror::Error;

/// All possible errors that can occur within the forwarder.
#[derive(Error, Debug)]
pub enum Error {
    /// Error related to TLV encoding/decoding.
    #[error("TLV error: {0}")]
    Tlv(String),

    /// Error related to NDN packet processing.
    #[error("NDN packet error: {0}")]
    NdnPacket(String),

    /// Error related to COMPAS routing messages.
    #[error("COMPAS error: {0}")]
    Compas(String),

    /// The leading bytes of a packet match no known suite.
    #[error("unknown packet format, leading byte 0x{0:02x}")]
    UnknownSuite(u8),

    /// A suite was recognised but nothing is registered to handle it.
    #[error("no dispatcher registered for suite {0}")]
    NoDispatcher(String),

    /// No room for a face to another peer.
    #[error("face table full ({0} faces)")]
    FaceTableFull(usize),

    /// The link layer refused or failed a transmission.
    #[error("link error: {0}")]
    Link(String),

    /// An operation did not complete in time.
    #[error("operation timed out")]
    Timeout,

    /// The relay worker is gone.
    #[error("relay worker channel closed")]
    ChannelClosed,

    /// Invalid or unreadable configuration.
    #[error("configuration error: {0}")]
    Config(String),

    /// I/O error
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// Other errors
    #[error("Other error: {0}")]
    Other(String),
}
