//! Forwarding plane and COMPAS routing for the COMPAS forwarding node.
//!
//! The [`Relay`] owns the pending interest table, the content store and the
//! DODAG state, and is driven one message at a time: a frame arrival, a timer
//! firing or an administrative request. [`spawn`] runs a relay on a tokio task
//! and hands back a [`RelayHandle`] for the other contexts of the process.

pub mod compas;
pub mod config;
pub mod cs;
pub mod demux;
pub mod face;
pub mod fib;
pub mod link;
pub mod pit;
pub mod relay;
pub mod strategy;
pub mod suite;
pub mod timer;
pub mod worker;

pub use config::RelayConfig;
pub use cs::{ContentObject, ContentStore, CsInsert};
pub use link::{Interface, LinkLayer, MemoryLink, SentFrame};
pub use link::udp::{spawn_udp_relay, UdpLink};
pub use relay::{Delivery, Relay};
pub use strategy::{
    AdmissionPolicy, EvictAny, EvictUnreliable, EvictionStrategy, PendingOnlyAdmission,
    PrefixClassifier, RandomAdmission, TrafficClassifier,
};
pub use worker::{spawn, RelayHandle, ReplyWaiter};

/// Default UDP port of the emulated link
pub const DEFAULT_UDP_PORT: u16 = 6363;
