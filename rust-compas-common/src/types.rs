//! Identifiers and small value types shared by the relay and its tools.

use bytes::Bytes;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Face reserved for the local application (requests issued by this node).
pub const LOCAL_FACE: FaceId = FaceId(0);

/// Unique identifier for a face.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct FaceId(pub u16);

impl FaceId {
    pub fn is_local(self) -> bool {
        self == LOCAL_FACE
    }
}

impl fmt::Display for FaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "FaceId({})", self.0)
    }
}

/// Interface identifier type used for identifying link interfaces.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct InterfaceId(pub u32);

impl fmt::Display for InterfaceId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "if{}", self.0)
    }
}

/// Opaque link-layer address of a peer or of one of our interfaces.
#[derive(Debug, Clone, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub struct LinkAddr(pub Bytes);

impl LinkAddr {
    pub fn new(bytes: impl Into<Bytes>) -> Self {
        Self(bytes.into())
    }

    pub fn as_bytes(&self) -> &[u8] {
        &self.0
    }
}

impl From<&str> for LinkAddr {
    fn from(s: &str) -> Self {
        Self(Bytes::copy_from_slice(s.as_bytes()))
    }
}

impl fmt::Display for LinkAddr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match std::str::from_utf8(&self.0) {
            Ok(text) if !text.is_empty() => write!(f, "{}", text),
            _ => {
                for (i, b) in self.0.iter().enumerate() {
                    if i > 0 {
                        write!(f, ":")?;
                    }
                    write!(f, "{:02x}", b)?;
                }
                Ok(())
            }
        }
    }
}

/// Where a frame goes on a link.
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub enum Destination {
    Unicast(LinkAddr),
    Broadcast,
}

impl fmt::Display for Destination {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Destination::Unicast(addr) => write!(f, "{}", addr),
            Destination::Broadcast => write!(f, "broadcast"),
        }
    }
}

/// Delivery class of a piece of content.
///
/// Reliable content is always cached, whatever the admission policy says.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum TrafficClass {
    Reliable,
    #[default]
    Unreliable,
}

/// How a content store lookup compares names.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize, Default)]
#[serde(rename_all = "lowercase")]
pub enum MatchMode {
    #[default]
    Exact,
    Prefix,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn link_addr_display() {
        assert_eq!(LinkAddr::from("127.0.0.1:6363").to_string(), "127.0.0.1:6363");
        assert_eq!(LinkAddr::new(vec![0xde, 0xad, 0xff]).to_string(), "de:ad:ff");
        assert_eq!(Destination::Broadcast.to_string(), "broadcast");
    }

    #[test]
    fn local_face() {
        assert!(LOCAL_FACE.is_local());
        assert!(!FaceId(3).is_local());
    }
}
