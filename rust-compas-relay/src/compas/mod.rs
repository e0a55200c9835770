//! COMPAS routing: DODAG construction, name advertisement and parent
//! liveness.
//!
//! The root floods PAMs under a trickle timer. A node adopts a parent from
//! the PAMs it hears, then advertises the names it holds to that parent with
//! NAMs. The parent pulls each advertised name with an ordinary Interest, so
//! content climbs toward the root. A node whose parent stops answering
//! floats and solicits a new one with SOLs.

pub mod dodag;
pub mod nam;
pub mod trickle;
pub mod wire;

pub use dodag::{
    Candidate, Dodag, DodagFlags, DodagStatus, MinRankSelection, Parent, ParentDecision,
    ParentSelection, RANK_UNDEF, ROOT_RANK,
};
pub use nam::{NamCache, NamEntry};
pub use trickle::{Trickle, TrickleTick};
pub use wire::{CompasMessage, Nam, Pam, Sol};

use bytes::Bytes;
use log::{debug, info, trace, warn};
use rust_compas_common::{
    ndn::{Interest, InterestOptions, Name},
    types::{Destination, FaceId, InterfaceId, LOCAL_FACE},
    Result,
};
use std::time::Duration;
use tokio::time::Instant;

use crate::face::Face;
use crate::relay::Relay;
use crate::suite::DispatchStatus;
use crate::timer::TimerEvent;

/// Receive dispatcher of the COMPAS suite.
pub(crate) fn dispatch(relay: &mut Relay, face: FaceId, buf: &mut Bytes) -> Result<DispatchStatus> {
    if let Some(msg) = CompasMessage::decode(buf)? {
        let now = relay.now;
        relay.handle_compas(face, msg, now);
    }
    Ok(DispatchStatus::Consumed)
}

impl Relay {
    pub(crate) fn start_routing(&mut self, now: Instant) {
        if self.config.node.root {
            let prefix = self.config.prefix();
            self.dodag.rank = ROOT_RANK;
            self.dodag.prefix = Some(prefix.clone());
            info!("[COMPAS] root of {}", prefix);
            self.restart_trickle(now);
        } else {
            let at = now + self.config.sol_period();
            self.timers.rearm(&mut self.dodag.timers.sol, at, TimerEvent::Sol);
            debug!("[COMPAS] waiting for a PAM, first SOL in {:?}", self.config.sol_period());
        }
    }

    pub fn handle_compas(&mut self, face: FaceId, msg: CompasMessage, now: Instant) {
        self.now = now;
        match msg {
            CompasMessage::Pam(pam) => self.handle_pam(face, pam, now),
            CompasMessage::Nam(nam) => self.handle_nam(face, nam, now),
            CompasMessage::Sol(sol) => self.handle_sol(face, sol, now),
        }
    }

    /// Prefix of the DODAG we are in, or the configured one.
    pub fn dodag_prefix(&self) -> Name {
        self.dodag.prefix.clone().unwrap_or_else(|| self.config.prefix())
    }

    /* ------------------------------------------------------------ *
     * PAM
     * ------------------------------------------------------------ */

    fn handle_pam(&mut self, face: FaceId, pam: Pam, now: Instant) {
        self.metrics.pam_received.increment();
        let Some(sender) = self.faces.get(face).cloned() else {
            return;
        };
        trace!("[COMPAS] PAM from {} rank {} flags {}", sender.peer, pam.rank, pam.flags);

        if self.dodag.rank != RANK_UNDEF
            && pam.rank == self.dodag.rank
            && !pam.flags.contains(DodagFlags::FLOATING)
        {
            self.trickle.hear_consistent();
        }

        let candidate = Candidate {
            face,
            addr: &sender.peer,
            rank: pam.rank,
            flags: pam.flags,
        };
        match self.parent_selection.evaluate(&self.dodag, &candidate) {
            ParentDecision::Adopt => self.attach(sender, &pam, now),
            ParentDecision::Refresh => self.refresh_parent(&pam, now),
            ParentDecision::Ignore => {}
        }
    }

    fn attach(&mut self, parent: Face, pam: &Pam, now: Instant) {
        let rank = pam.rank.saturating_add(1).min(RANK_UNDEF - 1);
        let changed = self.dodag.parent_face() != Some(parent.id)
            || self.dodag.rank != rank
            || self.dodag.is_floating();

        self.dodag.parent = Some(Parent {
            face: parent.id,
            iface: parent.iface,
            addr: parent.peer.clone(),
        });
        self.dodag.rank = rank;
        self.dodag.parent_timeout = false;
        self.dodag.flags.remove(DodagFlags::FLOATING);
        self.dodag.sol_count = 0;
        if !pam.prefix.is_empty() {
            self.dodag.prefix = Some(pam.prefix.clone());
        }
        self.timers.cancel_slot(&mut self.dodag.timers.sol);
        self.timers.rearm(
            &mut self.dodag.timers.parent_liveness,
            now + self.config.parent_timeout(),
            TimerEvent::ParentTimeout,
        );

        if changed {
            info!(
                "[COMPAS] parent {} on {}, rank {}, prefix {}",
                parent.peer,
                parent.iface,
                rank,
                self.dodag_prefix()
            );
            self.restart_trickle(now);
        }
        self.schedule_nam(now);
    }

    fn refresh_parent(&mut self, pam: &Pam, now: Instant) {
        self.timers.rearm(
            &mut self.dodag.timers.parent_liveness,
            now + self.config.parent_timeout(),
            TimerEvent::ParentTimeout,
        );

        let rank = pam.rank.saturating_add(1).min(RANK_UNDEF - 1);
        if rank != self.dodag.rank {
            info!("[COMPAS] parent moved, rank {} -> {}", self.dodag.rank, rank);
            self.dodag.rank = rank;
            self.restart_trickle(now);
        }
    }

    /// Shrink the trickle interval to its minimum, starting it if needed.
    fn restart_trickle(&mut self, now: Instant) {
        let at = if self.trickle.is_running() {
            match self.trickle.reset(now) {
                Some(at) => at,
                None => return,
            }
        } else {
            let jitter = self.pam_jitter();
            self.trickle.start(now + jitter)
        };
        self.timers.rearm(&mut self.dodag.timers.pam, at, TimerEvent::Pam);
    }

    fn pam_jitter(&mut self) -> Duration {
        match self.config.compas.pam_jitter_ms {
            0 => Duration::ZERO,
            max => Duration::from_millis(self.rng.u64(0..=max)),
        }
    }

    pub(crate) fn on_pam_timer(&mut self, now: Instant) {
        self.dodag.timers.pam = None;
        if self.dodag.rank == RANK_UNDEF {
            self.trickle.stop();
            return;
        }

        let (tick, next) = self.trickle.fire(now);
        match tick {
            TrickleTick::Transmit => self.broadcast_pam(),
            TrickleTick::Suppressed => {
                trace!("[COMPAS] PAM suppressed, heard {} consistent", self.trickle.counter())
            }
            TrickleTick::IntervalEnd => {}
        }
        self.dodag.timers.pam = Some(self.timers.arm(next, TimerEvent::Pam));
    }

    fn current_pam(&self) -> CompasMessage {
        CompasMessage::Pam(Pam {
            rank: self.dodag.rank,
            flags: self.dodag.flags,
            prefix: self.dodag_prefix(),
        })
    }

    fn broadcast_pam(&mut self) {
        let Some(iface) = self.egress().map(|i| i.id) else {
            warn!("[COMPAS] no live interface for PAM");
            return;
        };
        let msg = self.current_pam();
        if self.send_compas(iface, Destination::Broadcast, &msg) {
            self.metrics.pam_sent.increment();
            debug!("[COMPAS] PAM rank {} flags {}", self.dodag.rank, self.dodag.flags);
        }
    }

    fn send_pam_to(&mut self, face: FaceId) {
        let Some(target) = self.faces.get(face).cloned() else {
            return;
        };
        let msg = self.current_pam();
        if self.send_compas(target.iface, Destination::Unicast(target.peer), &msg) {
            self.metrics.pam_sent.increment();
        }
    }

    fn send_compas(&mut self, iface: InterfaceId, dest: Destination, msg: &CompasMessage) -> bool {
        match msg.encode() {
            Ok(frame) => self.transmit(iface, dest, frame),
            Err(e) => {
                warn!("[COMPAS] cannot encode {:?}: {}", msg, e);
                false
            }
        }
    }

    /* ------------------------------------------------------------ *
     * SOL
     * ------------------------------------------------------------ */

    pub(crate) fn on_sol_timer(&mut self, now: Instant) {
        self.dodag.timers.sol = None;
        match self.dodag.status() {
            DodagStatus::Root | DodagStatus::Attached => return,
            DodagStatus::Unattached | DodagStatus::Floating => {}
        }

        self.dodag.sol_count += 1;
        let unicast_to = if self.dodag.sol_count <= self.config.compas.sol_unicast_threshold {
            self.dodag.parent.clone()
        } else {
            None
        };

        let sent = match unicast_to {
            Some(parent) => {
                debug!("[COMPAS] SOL #{} to {}", self.dodag.sol_count, parent.addr);
                self.send_compas(parent.iface, Destination::Unicast(parent.addr), &CompasMessage::Sol(Sol::unicast()))
            }
            None => match self.egress().map(|i| i.id) {
                Some(iface) => {
                    debug!("[COMPAS] SOL #{} broadcast", self.dodag.sol_count);
                    self.send_compas(iface, Destination::Broadcast, &CompasMessage::Sol(Sol::trickle()))
                }
                None => {
                    warn!("[COMPAS] no live interface for SOL");
                    false
                }
            },
        };
        if sent {
            self.metrics.sol_sent.increment();
        }

        let at = now + self.config.sol_period();
        self.timers.rearm(&mut self.dodag.timers.sol, at, TimerEvent::Sol);
    }

    fn handle_sol(&mut self, face: FaceId, sol: Sol, now: Instant) {
        self.metrics.sol_received.increment();
        match self.dodag.status() {
            DodagStatus::Unattached | DodagStatus::Floating => {
                trace!("[COMPAS] SOL ignored, not in a DODAG");
                return;
            }
            DodagStatus::Root | DodagStatus::Attached => {}
        }

        if sol.resets_trickle() {
            self.restart_trickle(now);
        } else {
            self.send_pam_to(face);
        }
    }

    /* ------------------------------------------------------------ *
     * NAM
     * ------------------------------------------------------------ */

    /// Add `name` to the advertisement cache. The root never advertises.
    pub(crate) fn advertise(&mut self, name: &Name, now: Instant) {
        if self.dodag.is_root() {
            return;
        }
        if self.dodag.nam_cache.add(name, self.config.compas.nam_retries) {
            self.schedule_nam(now);
        }
    }

    fn schedule_nam(&mut self, now: Instant) {
        if !self.dodag.is_attached()
            || self.dodag.nam_cache.is_empty()
            || self.slot_armed(self.dodag.timers.nam)
        {
            return;
        }
        let at = now + self.config.nam_period();
        self.dodag.timers.nam = Some(self.timers.arm(at, TimerEvent::Nam));
    }

    pub(crate) fn on_nam_timer(&mut self, now: Instant) {
        self.dodag.timers.nam = None;
        if self.dodag.is_root() || self.dodag.parent_timeout {
            return;
        }
        let Some(parent) = self.dodag.parent.clone() else {
            return;
        };

        let cs = &self.cs;
        let pass = nam::run_pass(&mut self.dodag.nam_cache, self.config.compas.nam_retries, |n| {
            cs.contains(n)
        });

        for name in &pass.cleared {
            debug!("[COMPAS] {} left the cache, no longer advertised", name);
        }
        for (name, retries) in pass.send {
            debug!(
                "[COMPAS] nam;period={};rank={};parent_timeout={};retries={};name={}",
                self.config.compas.nam_period_ms, self.dodag.rank, self.dodag.parent_timeout, retries, name
            );
            let msg = CompasMessage::Nam(Nam { names: vec![name] });
            if self.send_compas(parent.iface, Destination::Unicast(parent.addr.clone()), &msg) {
                self.metrics.nam_sent.increment();
            }
        }

        if let Some(name) = pass.exhausted {
            info!("[COMPAS] parent never pulled {}", name);
            self.parent_timeout(now);
        } else if pass.more {
            let at = now + self.config.nam_period();
            self.dodag.timers.nam = Some(self.timers.arm(at, TimerEvent::Nam));
        }
    }

    fn handle_nam(&mut self, face: FaceId, nam: Nam, now: Instant) {
        self.metrics.nam_received.increment();
        let lifetime_ms = self.config.pit.interest_lifetime_ms;

        for name in nam.names {
            self.fib.add_route(name.clone(), face);
            if self.cs.contains(&name) || self.pit.contains(&name) {
                trace!("[COMPAS] {} advertised by {}, already held", name, face);
                continue;
            }

            debug!("[COMPAS] pulling {} from {}", name, face);
            let opts = InterestOptions {
                lifetime_ms,
                ..Default::default()
            };
            self.now = now;
            self.process_interest(LOCAL_FACE, Interest::with_options(name, &opts), true);
        }
    }

    /* ------------------------------------------------------------ *
     * Parent liveness
     * ------------------------------------------------------------ */

    pub(crate) fn on_parent_liveness_expired(&mut self, now: Instant) {
        self.dodag.timers.parent_liveness = None;
        info!(
            "[COMPAS] no PAM from parent for {} ms",
            self.config.compas.parent_timeout_ms
        );
        self.parent_timeout(now);
    }

    /// Give up on the current parent: float and start soliciting.
    pub fn parent_timeout(&mut self, now: Instant) {
        self.now = now;
        match self.dodag.status() {
            DodagStatus::Attached => {}
            status => {
                debug!("[COMPAS] parent timeout ignored while {:?}", status);
                return;
            }
        }

        self.dodag.parent_timeout = true;
        self.dodag.flags.insert(DodagFlags::FLOATING);
        self.timers.cancel_slot(&mut self.dodag.timers.parent_liveness);
        self.timers.cancel_slot(&mut self.dodag.timers.nam);
        let at = now + self.config.sol_period();
        self.timers.rearm(&mut self.dodag.timers.sol, at, TimerEvent::Sol);
        self.metrics.parent_timeouts.increment();

        let names = self
            .dodag
            .nam_cache
            .unrequested()
            .iter()
            .map(|n| n.to_string())
            .collect::<Vec<_>>()
            .join(",");
        let parent = self
            .dodag
            .parent
            .as_ref()
            .map(|p| p.addr.to_string())
            .unwrap_or_default();
        info!(
            "[COMPAS] timeout;rank={};parent_timeout={};flags={};parent={};names={}",
            self.dodag.rank, self.dodag.parent_timeout, self.dodag.flags, parent, names
        );
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::config::RelayConfig;
    use crate::link::{Interface, MemoryLink};
    use rust_compas_common::{ndn::Data, types::LinkAddr};

    const IF: InterfaceId = InterfaceId(1);

    fn node(root: bool) -> (Relay, MemoryLink) {
        let mut config = RelayConfig::default();
        config.node.root = root;
        config.compas.pam_jitter_ms = 0;
        let link = MemoryLink::new();
        let iface = Interface::new(IF, LinkAddr::from("self"), 1500);
        let relay = Relay::new(config, link.clone(), vec![iface]).unwrap().with_seed(7);
        (relay, link)
    }

    fn pam(rank: u16, flags: DodagFlags) -> Bytes {
        CompasMessage::Pam(Pam {
            rank,
            flags,
            prefix: Name::from_string("/compas"),
        })
        .encode()
        .unwrap()
    }

    fn decode(frame: &Bytes) -> CompasMessage {
        CompasMessage::decode(&mut frame.slice(2..)).unwrap().unwrap()
    }

    #[test]
    fn root_starts_trickle() {
        let (mut relay, link) = node(true);
        let now = Instant::now();
        relay.start(now);
        assert_eq!(relay.dodag().status(), DodagStatus::Root);
        assert_eq!(relay.timers().armed(&TimerEvent::Pam), 1);
        assert_eq!(relay.timers().armed(&TimerEvent::Sol), 0);

        relay.fire_due(now + Duration::from_millis(500));
        let sent = link.take_sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].dest, Destination::Broadcast);
        match decode(&sent[0].frame) {
            CompasMessage::Pam(p) => assert_eq!(p.rank, ROOT_RANK),
            other => panic!("unexpected {:?}", other),
        }
    }

    #[test]
    fn pam_attaches_unattached_node() {
        let (mut relay, _link) = node(false);
        let now = Instant::now();
        relay.start(now);
        relay.receive_frame(IF, LinkAddr::from("root"), pam(ROOT_RANK, DodagFlags::NONE), now);

        let dodag = relay.dodag();
        assert_eq!(dodag.status(), DodagStatus::Attached);
        assert_eq!(dodag.rank, 2);
        assert_eq!(dodag.parent.as_ref().unwrap().addr, LinkAddr::from("root"));
        assert_eq!(relay.timers().armed(&TimerEvent::Sol), 0);
        assert_eq!(relay.timers().armed(&TimerEvent::ParentTimeout), 1);
        assert_eq!(relay.timers().armed(&TimerEvent::Pam), 1);
    }

    #[test]
    fn floating_pam_is_ignored() {
        let (mut relay, _link) = node(false);
        let now = Instant::now();
        relay.start(now);
        relay.receive_frame(IF, LinkAddr::from("n"), pam(3, DodagFlags::FLOATING), now);
        assert_eq!(relay.dodag().status(), DodagStatus::Unattached);
    }

    #[test]
    fn unicast_sol_answered_with_pam() {
        let (mut relay, link) = node(true);
        let now = Instant::now();
        relay.start(now);
        let sol = CompasMessage::Sol(Sol::unicast()).encode().unwrap();
        relay.receive_frame(IF, LinkAddr::from("child"), sol, now);

        let sent = link.take_sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].dest, Destination::Unicast(LinkAddr::from("child")));
    }

    #[test]
    fn parent_timeout_only_when_attached() {
        let (mut relay, _link) = node(true);
        let now = Instant::now();
        relay.start(now);
        relay.parent_timeout(now);
        assert_eq!(relay.dodag().status(), DodagStatus::Root);
        assert_eq!(relay.metrics().parent_timeouts.value(), 0);

        let (mut relay, _link) = node(false);
        relay.start(now);
        relay.parent_timeout(now);
        assert_eq!(relay.dodag().status(), DodagStatus::Unattached);
    }

    #[test]
    fn silent_parent_makes_node_float() {
        let (mut relay, _link) = node(false);
        let now = Instant::now();
        relay.start(now);
        relay.receive_frame(IF, LinkAddr::from("root"), pam(ROOT_RANK, DodagFlags::NONE), now);

        let timeout = relay.config().parent_timeout();
        relay.fire_due(now + timeout);
        assert!(relay.dodag().is_floating());
        assert!(relay.dodag().flags.contains(DodagFlags::FLOATING));
        assert_eq!(relay.timers().armed(&TimerEvent::Sol), 1);
        assert_eq!(relay.metrics().parent_timeouts.value(), 1);
    }

    #[test]
    fn nam_installs_route_and_pulls() {
        let (mut relay, link) = node(true);
        let now = Instant::now();
        relay.start(now);
        link.take_sent();

        let name = Name::from_string("/compas/temp");
        let nam = CompasMessage::Nam(Nam { names: vec![name.clone()] }).encode().unwrap();
        relay.receive_frame(IF, LinkAddr::from("child"), nam, now);

        assert!(relay.fib().lookup(&name).is_some());
        let entry = relay.pit().get(&name).unwrap();
        assert!(entry.pull_only);
        let sent = link.take_sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].dest, Destination::Unicast(LinkAddr::from("child")));

        // the pulled content is cached but not handed to the application
        let reply = Data::new(name.clone(), &b"21C"[..]).encode();
        relay.receive_frame(IF, LinkAddr::from("child"), reply, now);
        assert!(relay.cs().contains(&name));
        assert!(relay.take_app_deliveries().is_empty());
    }
}
