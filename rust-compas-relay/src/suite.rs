//! Packet suites and their dispatch functions.
//!
//! A suite is a packet format. Each registered suite supplies a receive
//! dispatcher and, when its packets can be answered from the content store,
//! a content match function.

use bytes::Bytes;
use rust_compas_common::{ndn::Interest, tlv, types::FaceId, Result};
use std::fmt;
use tokio::time::Instant;

use crate::cs::ContentObject;

/// Marker byte announcing that an encoding byte follows.
pub const SUITE_SWITCH: u8 = 0x80;

/// Encoding byte of NDN-TLV packets.
pub const ENC_NDN2013: u8 = 0x01;

/// Encoding byte of COMPAS routing messages.
pub const ENC_COMPAS: u8 = 0x08;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum Suite {
    Ndn2013,
    Compas,
}

const SUITE_COUNT: usize = 2;

impl Suite {
    pub fn from_encoding(enc: u8) -> Option<Self> {
        match enc {
            ENC_NDN2013 => Some(Suite::Ndn2013),
            ENC_COMPAS => Some(Suite::Compas),
            _ => None,
        }
    }

    pub fn encoding(self) -> u8 {
        match self {
            Suite::Ndn2013 => ENC_NDN2013,
            Suite::Compas => ENC_COMPAS,
        }
    }

    /// Guess the suite of a packet without a switch marker.
    pub fn sniff(first: u8) -> Option<Self> {
        match first {
            tlv::TLV_INTEREST | tlv::TLV_DATA => Some(Suite::Ndn2013),
            _ => None,
        }
    }

    fn index(self) -> usize {
        match self {
            Suite::Ndn2013 => 0,
            Suite::Compas => 1,
        }
    }
}

impl fmt::Display for Suite {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Suite::Ndn2013 => write!(f, "ndn2013"),
            Suite::Compas => write!(f, "compas"),
        }
    }
}

/// What a dispatcher did with the front of the buffer.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DispatchStatus {
    /// One packet was taken off the buffer; carry on with the rest.
    Consumed,
    /// Ignore whatever is left of the frame.
    Stop,
}

/// Receive dispatcher: handle one packet at the front of the buffer.
pub type DispatchFn<C> = fn(&mut C, FaceId, &mut Bytes) -> Result<DispatchStatus>;

/// Does the cached content answer the Interest?
pub type MatchFn = fn(&Interest, &ContentObject, Instant) -> bool;

pub struct SuiteOps<C> {
    pub dispatch: DispatchFn<C>,
    pub content_match: Option<MatchFn>,
}

// Function pointers are Copy whatever C is.
impl<C> Clone for SuiteOps<C> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<C> Copy for SuiteOps<C> {}

/// Suite to dispatcher table, copied out before dispatching so the
/// dispatcher can borrow the context mutably.
pub struct SuiteRegistry<C> {
    ops: [Option<SuiteOps<C>>; SUITE_COUNT],
}

impl<C> Clone for SuiteRegistry<C> {
    fn clone(&self) -> Self {
        *self
    }
}

impl<C> Copy for SuiteRegistry<C> {}

impl<C> Default for SuiteRegistry<C> {
    fn default() -> Self {
        Self::new()
    }
}

impl<C> fmt::Debug for SuiteRegistry<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let registered: Vec<String> = [Suite::Ndn2013, Suite::Compas]
            .iter()
            .filter(|s| self.ops[s.index()].is_some())
            .map(|s| s.to_string())
            .collect();
        f.debug_struct("SuiteRegistry").field("registered", &registered).finish()
    }
}

impl<C> SuiteRegistry<C> {
    pub fn new() -> Self {
        Self {
            ops: [None, None],
        }
    }

    pub fn register(&mut self, suite: Suite, dispatch: DispatchFn<C>, content_match: Option<MatchFn>) {
        self.ops[suite.index()] = Some(SuiteOps {
            dispatch,
            content_match,
        });
    }

    pub fn get(&self, suite: Suite) -> Option<SuiteOps<C>> {
        self.ops[suite.index()]
    }

    pub fn content_match(&self, suite: Suite) -> Option<MatchFn> {
        self.get(suite).and_then(|ops| ops.content_match)
    }
}

/// Content match for NDN-TLV: exact name, or any name below it when the
/// Interest allows a prefix; fresh content only when asked for.
pub fn ndn_content_match(interest: &Interest, content: &ContentObject, now: Instant) -> bool {
    if !interest.matches(content.name()) {
        return false;
    }
    !(interest.must_be_fresh && content.is_stale(now))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_compas_common::{
        ndn::{Data, Name},
        types::TrafficClass,
    };
    use std::time::Duration;

    #[test]
    fn sniffing_and_encodings() {
        assert_eq!(Suite::sniff(0x05), Some(Suite::Ndn2013));
        assert_eq!(Suite::sniff(0x06), Some(Suite::Ndn2013));
        assert_eq!(Suite::sniff(0xFF), None);
        assert_eq!(Suite::from_encoding(ENC_COMPAS), Some(Suite::Compas));
        assert_eq!(Suite::from_encoding(0x42), None);
        assert_eq!(Suite::Compas.encoding(), 0x08);
    }

    #[test]
    fn registry_lookup() {
        fn stop(_: &mut (), _: FaceId, _: &mut Bytes) -> Result<DispatchStatus> {
            Ok(DispatchStatus::Stop)
        }

        let mut registry: SuiteRegistry<()> = SuiteRegistry::new();
        assert!(registry.get(Suite::Compas).is_none());
        registry.register(Suite::Compas, stop, None);
        assert!(registry.get(Suite::Compas).is_some());
        assert!(registry.content_match(Suite::Compas).is_none());
    }

    #[test]
    fn must_be_fresh_skips_stale_content() {
        let now = Instant::now();
        let data = Data::new(Name::from_string("/t"), &b"1"[..]).with_freshness(10);
        let content = ContentObject::from_data(data, TrafficClass::Unreliable, now);
        let later = now + Duration::from_millis(20);

        let plain = Interest::new(Name::from_string("/t"));
        assert!(ndn_content_match(&plain, &content, later));
        assert!(!ndn_content_match(&plain.clone().with_must_be_fresh(true), &content, later));
        assert!(ndn_content_match(&plain.with_must_be_fresh(true), &content, now));
    }
}
