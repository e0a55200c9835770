//! A broadcast link emulated over UDP.
//!
//! Every node binds one socket. Unicast goes to the peer's socket address;
//! broadcast goes to each configured neighbour in turn. Link addresses are
//! the textual socket addresses (`127.0.0.1:6363`).

use bytes::Bytes;
use log::{debug, info, trace, warn};
use rust_compas_common::{
    ndn::MAX_NDN_PACKET_SIZE,
    types::{Destination, InterfaceId, LinkAddr},
    Error, Result,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::{net::UdpSocket, task::JoinHandle};

use super::{Interface, LinkLayer};
use crate::config::{LinkConfig, RelayConfig};
use crate::relay::Relay;
use crate::worker::{self, RelayHandle};

/// Interface id of the UDP link.
pub const UDP_INTERFACE: InterfaceId = InterfaceId(1);

#[derive(Debug, Clone)]
pub struct UdpLink {
    socket: Arc<UdpSocket>,
    iface: Interface,
    neighbours: Vec<SocketAddr>,
}

impl UdpLink {
    pub async fn bind(config: &LinkConfig) -> Result<Self> {
        let neighbours = config
            .neighbours
            .iter()
            .map(|n| parse_addr(n))
            .collect::<Result<Vec<_>>>()?;

        let socket = UdpSocket::bind(&config.bind).await?;
        let local = socket.local_addr()?;
        info!("[LINK] bound {} with {} neighbours", local, neighbours.len());

        Ok(Self {
            socket: Arc::new(socket),
            iface: Interface::new(UDP_INTERFACE, socket_link_addr(local), config.mtu),
            neighbours,
        })
    }

    pub fn interface(&self) -> Interface {
        self.iface.clone()
    }

    pub fn local_addr(&self) -> Result<SocketAddr> {
        Ok(self.socket.local_addr()?)
    }

    pub fn add_neighbour(&mut self, addr: SocketAddr) {
        if !self.neighbours.contains(&addr) {
            self.neighbours.push(addr);
        }
    }

    pub fn neighbours(&self) -> &[SocketAddr] {
        &self.neighbours
    }

    /// Feed every datagram received on the socket to the relay behind `handle`.
    ///
    /// Datagrams larger than an NDN packet may be are dropped here rather
    /// than passed on truncated.
    pub fn spawn_receiver(&self, handle: RelayHandle) -> JoinHandle<()> {
        let socket = self.socket.clone();
        let iface = self.iface.id;

        tokio::spawn(async move {
            // one spare byte tells a full-size datagram from a cut one
            let mut buf = vec![0u8; MAX_NDN_PACKET_SIZE + 1];
            loop {
                let (len, src) = match socket.recv_from(&mut buf).await {
                    Ok(received) => received,
                    Err(e) => {
                        // ICMP errors of earlier sends surface here on some platforms
                        debug!("[LINK] receive failed: {}", e);
                        continue;
                    }
                };
                if len > MAX_NDN_PACKET_SIZE {
                    warn!(
                        "[LINK] datagram from {} exceeds {} bytes, dropped",
                        src, MAX_NDN_PACKET_SIZE
                    );
                    handle.metrics().frames_oversized.increment();
                    continue;
                }
                trace!("[LINK] {} bytes from {}", len, src);

                let frame = Bytes::copy_from_slice(&buf[..len]);
                if handle.deliver_frame(iface, socket_link_addr(src), frame).await.is_err() {
                    debug!("[LINK] relay gone, receiver stopping");
                    break;
                }
            }
        })
    }
}

impl LinkLayer for UdpLink {
    fn send(&mut self, iface: InterfaceId, dest: &Destination, frame: Bytes) -> Result<()> {
        if iface != self.iface.id {
            return Err(Error::Link(format!("no interface {}", iface)));
        }
        if frame.len() > self.iface.mtu {
            return Err(Error::Link(format!(
                "{} byte frame exceeds mtu {}",
                frame.len(),
                self.iface.mtu
            )));
        }

        match dest {
            Destination::Unicast(addr) => {
                let target = parse_addr(&addr.to_string())?;
                self.socket.try_send_to(&frame, target)?;
            }
            Destination::Broadcast => {
                for neighbour in &self.neighbours {
                    if let Err(e) = self.socket.try_send_to(&frame, *neighbour) {
                        warn!("[LINK] broadcast to {} failed: {}", neighbour, e);
                    }
                }
            }
        }
        Ok(())
    }
}

fn parse_addr(text: &str) -> Result<SocketAddr> {
    text.parse()
        .map_err(|e| Error::Link(format!("invalid socket address {}: {}", text, e)))
}

fn socket_link_addr(addr: SocketAddr) -> LinkAddr {
    LinkAddr::from(addr.to_string().as_str())
}

/// Bind the configured UDP link, build a relay on it and start both.
pub async fn spawn_udp_relay(config: RelayConfig) -> Result<(RelayHandle, JoinHandle<Relay>)> {
    let link = UdpLink::bind(&config.link).await?;
    let relay = Relay::new(config, link.clone(), vec![link.interface()])?;
    let (handle, task) = worker::spawn(relay);
    link.spawn_receiver(handle.clone());
    Ok((handle, task))
}
