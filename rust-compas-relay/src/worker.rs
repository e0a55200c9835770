//! The relay worker: one tokio task owning the [`Relay`].
//!
//! Frames from the link receivers and requests from applications arrive as
//! [`RelayMessage`]s on a single channel, so the relay state is only ever
//! touched by this task. Due timers are run before every message.

use bytes::Bytes;
use log::{debug, info, warn};
use rust_compas_common::{
    metrics::RelayMetrics,
    ndn::{Data, InterestOptions, InterestResult, Name},
    types::{InterfaceId, LinkAddr, MatchMode, LOCAL_FACE},
    Error, Result,
};
use std::sync::Arc;
use std::time::Duration;
use tokio::{
    sync::{broadcast, mpsc, oneshot},
    task::JoinHandle,
    time::{self, Instant},
};

use crate::relay::{Delivery, Relay};

const QUEUE_DEPTH: usize = 256;
const REPLY_BUFFER: usize = 64;
const IDLE_WAKEUP: Duration = Duration::from_secs(3600);

/// Everything the worker can be asked to do.
#[derive(Debug)]
pub enum RelayMessage {
    /// A frame received on a link.
    Frame {
        iface: InterfaceId,
        src: LinkAddr,
        frame: Bytes,
    },
    Insert {
        data: Data,
        reply: oneshot::Sender<bool>,
    },
    Remove {
        name: Name,
        reply: oneshot::Sender<bool>,
    },
    Lookup {
        name: Name,
        mode: MatchMode,
        reply: oneshot::Sender<Option<Data>>,
    },
    SendInterest {
        name: Name,
        opts: InterestOptions,
        reply: oneshot::Sender<InterestResult>,
    },
    /// Drop the current parent now.
    ParentTimeout,
    Shutdown,
}

/// Run `relay` on its own task.
///
/// The task ends on [`RelayHandle::shutdown`] or once every handle is gone,
/// and returns the relay so its final state can be inspected.
pub fn spawn(relay: Relay) -> (RelayHandle, JoinHandle<Relay>) {
    let (tx, rx) = mpsc::channel(QUEUE_DEPTH);
    let (replies, _) = broadcast::channel(REPLY_BUFFER);
    let handle = RelayHandle {
        tx,
        replies: replies.clone(),
        metrics: relay.metrics(),
    };
    let task = tokio::spawn(run(relay, rx, replies));
    (handle, task)
}

async fn run(
    mut relay: Relay,
    mut rx: mpsc::Receiver<RelayMessage>,
    replies: broadcast::Sender<Delivery>,
) -> Relay {
    relay.start(Instant::now());
    info!("[WORKER] relay running, rank {}", relay.dodag().rank);

    loop {
        let wake_at = relay
            .next_deadline()
            .unwrap_or_else(|| Instant::now() + IDLE_WAKEUP);

        let msg = tokio::select! {
            biased;
            _ = time::sleep_until(wake_at) => None,
            msg = rx.recv() => match msg {
                Some(msg) => Some(msg),
                None => {
                    debug!("[WORKER] all handles dropped");
                    break;
                }
            },
        };

        let now = Instant::now();
        relay.fire_due(now);

        if let Some(msg) = msg {
            if !handle_message(&mut relay, msg, now) {
                break;
            }
        }

        for delivery in relay.take_app_deliveries() {
            // no subscriber is not an error
            let _ = replies.send(delivery);
        }
    }

    info!("[WORKER] relay stopped");
    relay
}

/// Returns false when the worker should stop.
fn handle_message(relay: &mut Relay, msg: RelayMessage, now: Instant) -> bool {
    match msg {
        RelayMessage::Frame { iface, src, frame } => {
            let outcome = relay.receive_frame(iface, src, frame, now);
            if let Some(e) = outcome.error {
                debug!("[WORKER] frame dropped after {} messages: {}", outcome.dispatched, e);
            }
        }
        RelayMessage::Insert { data, reply } => {
            let _ = reply.send(relay.insert(data, now));
        }
        RelayMessage::Remove { name, reply } => {
            let _ = reply.send(relay.remove(&name));
        }
        RelayMessage::Lookup { name, mode, reply } => {
            let found = relay.lookup(&name, mode, now).map(|c| c.data);
            let _ = reply.send(found);
        }
        RelayMessage::SendInterest { name, opts, reply } => {
            let _ = reply.send(relay.send_interest(name, &opts, LOCAL_FACE, now));
        }
        RelayMessage::ParentTimeout => relay.parent_timeout(now),
        RelayMessage::Shutdown => return false,
    }
    true
}

/// Cloneable access to a running relay.
#[derive(Debug, Clone)]
pub struct RelayHandle {
    tx: mpsc::Sender<RelayMessage>,
    replies: broadcast::Sender<Delivery>,
    metrics: Arc<RelayMetrics>,
}

impl RelayHandle {
    async fn request<T>(&self, make: impl FnOnce(oneshot::Sender<T>) -> RelayMessage) -> Result<T> {
        let (reply, rx) = oneshot::channel();
        self.send(make(reply)).await?;
        rx.await.map_err(|_| Error::ChannelClosed)
    }

    async fn send(&self, msg: RelayMessage) -> Result<()> {
        self.tx.send(msg).await.map_err(|_| Error::ChannelClosed)
    }

    /// Hand a received frame to the relay.
    pub async fn deliver_frame(&self, iface: InterfaceId, src: LinkAddr, frame: Bytes) -> Result<()> {
        self.send(RelayMessage::Frame { iface, src, frame }).await
    }

    /// Publish content from this node.
    pub async fn insert(&self, data: Data) -> Result<bool> {
        self.request(|reply| RelayMessage::Insert { data, reply }).await
    }

    pub async fn remove(&self, name: Name) -> Result<bool> {
        self.request(|reply| RelayMessage::Remove { name, reply }).await
    }

    pub async fn lookup(&self, name: Name, mode: MatchMode) -> Result<Option<Data>> {
        self.request(|reply| RelayMessage::Lookup { name, mode, reply }).await
    }

    /// Express an Interest from the local face.
    ///
    /// Subscribe with [`RelayHandle::subscribe`] first to catch the reply.
    pub async fn send_interest(&self, name: Name, opts: InterestOptions) -> Result<InterestResult> {
        self.request(|reply| RelayMessage::SendInterest { name, opts, reply }).await
    }

    pub async fn parent_timeout(&self) -> Result<()> {
        self.send(RelayMessage::ParentTimeout).await
    }

    pub async fn shutdown(&self) -> Result<()> {
        self.send(RelayMessage::Shutdown).await
    }

    /// Receive content delivered to the local face from now on.
    pub fn subscribe(&self) -> ReplyWaiter {
        ReplyWaiter {
            rx: self.replies.subscribe(),
        }
    }

    pub fn metrics(&self) -> Arc<RelayMetrics> {
        self.metrics.clone()
    }
}

/// Receiver of content delivered to the local face.
#[derive(Debug)]
pub struct ReplyWaiter {
    rx: broadcast::Receiver<Delivery>,
}

impl ReplyWaiter {
    /// Next delivery, or [`Error::Timeout`].
    pub async fn next(&mut self, timeout: Duration) -> Result<Delivery> {
        let deadline = Instant::now() + timeout;
        loop {
            match time::timeout_at(deadline, self.rx.recv()).await {
                Err(_) => return Err(Error::Timeout),
                Ok(Ok(delivery)) => return Ok(delivery),
                Ok(Err(broadcast::error::RecvError::Lagged(missed))) => {
                    warn!("[WORKER] reply waiter missed {} deliveries", missed);
                }
                Ok(Err(broadcast::error::RecvError::Closed)) => return Err(Error::ChannelClosed),
            }
        }
    }

    /// Wait for content and copy its wire encoding into `buf`.
    ///
    /// Returns the number of bytes copied; longer packets are truncated.
    pub async fn wait_for_reply(&mut self, buf: &mut [u8], timeout: Duration) -> Result<usize> {
        let delivery = self.next(timeout).await?;
        let len = delivery.wire.len().min(buf.len());
        buf[..len].copy_from_slice(&delivery.wire[..len]);
        Ok(len)
    }

    /// Wait for content named `name`, skipping other deliveries.
    pub async fn wait_for(&mut self, name: &Name, timeout: Duration) -> Result<Data> {
        let deadline = Instant::now() + timeout;
        loop {
            let left = deadline.saturating_duration_since(Instant::now());
            let delivery = self.next(left).await?;
            if &delivery.data.name == name {
                return Ok(delivery.data);
            }
        }
    }
}
