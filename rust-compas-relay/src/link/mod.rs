//! Link layer seam.
//!
//! The relay only needs to push a frame to one peer or to everybody on an
//! interface. [`MemoryLink`] records frames instead of sending them;
//! [`udp::UdpLink`] emulates a broadcast link over UDP.

use bytes::Bytes;
use rust_compas_common::{
    types::{Destination, InterfaceId, LinkAddr},
    Error, Result,
};
use std::sync::{
    atomic::{AtomicBool, Ordering},
    Arc, Mutex,
};

pub mod udp;

/// A network interface the relay can send on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Interface {
    pub id: InterfaceId,
    /// Our own address on this interface.
    pub addr: LinkAddr,
    pub mtu: usize,
    /// Whether the interface has a usable handle.
    pub live: bool,
}

impl Interface {
    pub fn new(id: InterfaceId, addr: LinkAddr, mtu: usize) -> Self {
        Self {
            id,
            addr,
            mtu,
            live: true,
        }
    }
}

/// Raw frame transmission.
pub trait LinkLayer: Send {
    /// Send `frame` on `iface`. Failures are reported, never retried here.
    fn send(&mut self, iface: InterfaceId, dest: &Destination, frame: Bytes) -> Result<()>;
}

/// A frame handed to a [`MemoryLink`].
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SentFrame {
    pub iface: InterfaceId,
    pub dest: Destination,
    pub frame: Bytes,
}

/// Link that keeps every frame in memory.
///
/// Clones share the same record, so a test can keep one clone while the
/// relay owns another.
#[derive(Debug, Clone, Default)]
pub struct MemoryLink {
    sent: Arc<Mutex<Vec<SentFrame>>>,
    failing: Arc<AtomicBool>,
}

impl MemoryLink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Make every following send fail.
    pub fn set_failing(&self, failing: bool) {
        self.failing.store(failing, Ordering::Relaxed);
    }

    /// Frames sent so far.
    pub fn sent(&self) -> Vec<SentFrame> {
        self.sent.lock().map(|s| s.clone()).unwrap_or_default()
    }

    /// Drain the record.
    pub fn take_sent(&self) -> Vec<SentFrame> {
        self.sent
            .lock()
            .map(|mut s| std::mem::take(&mut *s))
            .unwrap_or_default()
    }
}

impl LinkLayer for MemoryLink {
    fn send(&mut self, iface: InterfaceId, dest: &Destination, frame: Bytes) -> Result<()> {
        if self.failing.load(Ordering::Relaxed) {
            return Err(Error::Link(format!("{} refused frame to {}", iface, dest)));
        }
        let mut sent = self
            .sent
            .lock()
            .map_err(|_| Error::Link("frame record poisoned".into()))?;
        sent.push(SentFrame {
            iface,
            dest: dest.clone(),
            frame,
        });
        Ok(())
    }
}
