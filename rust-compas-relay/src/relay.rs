//! The relay context: forwarding, caching and the timers that drive them.
//!
//! A [`Relay`] is a plain state machine. Every entry point takes the current
//! time and runs to completion; the caller (normally the worker in
//! [`crate::worker`]) decides when timers are due and in which order
//! messages are handled.

use bytes::Bytes;
use log::{debug, info, trace, warn};
use rust_compas_common::{
    metrics::RelayMetrics,
    ndn::{Data, Interest, InterestOptions, InterestResult, Name, NdnPacket},
    types::{Destination, FaceId, InterfaceId, LinkAddr, MatchMode, LOCAL_FACE},
    Result,
};
use std::collections::{HashSet, VecDeque};
use std::sync::Arc;
use std::time::Duration;
use tokio::time::Instant;

use crate::compas::{
    self,
    dodag::{Dodag, MinRankSelection, ParentSelection},
    trickle::Trickle,
};
use crate::config::RelayConfig;
use crate::cs::{ContentObject, ContentStore, CsInsert};
use crate::demux::{demux, DemuxOutcome};
use crate::face::FaceTable;
use crate::fib::Fib;
use crate::link::{Interface, LinkLayer};
use crate::pit::{Pit, PitInsert};
use crate::strategy::{AdmissionPolicy, EvictionStrategy, PrefixClassifier, TrafficClassifier};
use crate::suite::{ndn_content_match, DispatchStatus, Suite, SuiteRegistry};
use crate::timer::{TimerEvent, TimerToken, Timers};

/// Loopback frames handled per entry point, bounds self-addressed ping-pong.
const MAX_LOOPBACK_FRAMES: usize = 64;

/// Content handed to the local application face.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Delivery {
    pub data: Data,
    pub wire: Bytes,
}

pub struct Relay {
    pub(crate) config: RelayConfig,
    pub(crate) link: Box<dyn LinkLayer>,
    pub(crate) interfaces: Vec<Interface>,
    pub(crate) faces: FaceTable,
    registry: SuiteRegistry<Relay>,
    pub(crate) pit: Pit,
    pub(crate) cs: ContentStore,
    pub(crate) fib: Fib,
    pub(crate) timers: Timers,
    pub(crate) dodag: Dodag,
    pub(crate) trickle: Trickle,
    pub(crate) parent_selection: Box<dyn ParentSelection>,
    classifier: Box<dyn TrafficClassifier>,
    pub(crate) metrics: Arc<RelayMetrics>,
    deliveries: Vec<Delivery>,
    loopback: VecDeque<(InterfaceId, LinkAddr, Bytes)>,
    pub(crate) rng: fastrand::Rng,
    pub(crate) now: Instant,
    started: bool,
}

impl std::fmt::Debug for Relay {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Relay")
            .field("interfaces", &self.interfaces)
            .field("pit", &self.pit.len())
            .field("cs", &self.cs)
            .field("dodag", &self.dodag)
            .finish()
    }
}

impl Relay {
    /// Create a relay sending through `link` on `interfaces`.
    pub fn new(
        config: RelayConfig,
        link: impl LinkLayer + 'static,
        interfaces: Vec<Interface>,
    ) -> Result<Self> {
        config.validate()?;

        let mut registry = SuiteRegistry::new();
        registry.register(Suite::Ndn2013, ndn_dispatch, Some(ndn_content_match));
        registry.register(Suite::Compas, compas::dispatch, None);

        let mut rng = fastrand::Rng::new();
        let trickle = Self::make_trickle(&config, rng.fork());

        Ok(Self {
            pit: Pit::new(config.pit.max_entries, config.pit.max_pending_faces),
            cs: ContentStore::new(config.cs.capacity),
            dodag: Dodag::new(config.compas.nam_cache_size),
            classifier: Box::new(PrefixClassifier::from_strings(&config.node.reliable_prefixes)),
            faces: FaceTable::new(config.face.max_faces),
            config,
            link: Box::new(link),
            interfaces,
            registry,
            fib: Fib::new(),
            timers: Timers::new(),
            trickle,
            parent_selection: Box::new(MinRankSelection),
            metrics: Arc::new(RelayMetrics::new()),
            deliveries: Vec::new(),
            loopback: VecDeque::new(),
            rng,
            now: Instant::now(),
            started: false,
        })
    }

    fn make_trickle(config: &RelayConfig, rng: fastrand::Rng) -> Trickle {
        Trickle::new(
            Duration::from_millis(config.compas.trickle_imin_ms),
            config.compas.trickle_doublings,
            config.compas.trickle_redundancy,
            rng,
        )
    }

    /// Make random choices (trickle points, jitter, nonces excluded) repeatable.
    pub fn with_seed(mut self, seed: u64) -> Self {
        self.rng = fastrand::Rng::with_seed(seed);
        self.trickle = Self::make_trickle(&self.config, self.rng.fork());
        self
    }

    pub fn with_admission_policy(mut self, policy: impl AdmissionPolicy + 'static) -> Self {
        self.cs.set_admission_policy(Box::new(policy));
        self
    }

    pub fn with_eviction_strategy(mut self, strategy: impl EvictionStrategy + 'static) -> Self {
        self.cs.set_eviction_strategy(Box::new(strategy));
        self
    }

    pub fn with_classifier(mut self, classifier: impl TrafficClassifier + 'static) -> Self {
        self.classifier = Box::new(classifier);
        self
    }

    pub fn with_parent_selection(mut self, selection: impl ParentSelection + 'static) -> Self {
        self.parent_selection = Box::new(selection);
        self
    }

    /// Arm the initial routing timers. Calling it twice does nothing.
    pub fn start(&mut self, now: Instant) {
        if self.started {
            return;
        }
        self.started = true;
        self.now = now;
        self.timers
            .arm(now + self.config.face_idle_timeout(), TimerEvent::FaceAgeing);
        self.start_routing(now);
    }

    pub fn is_started(&self) -> bool {
        self.started
    }

    /* ------------------------------------------------------------ *
     * Receive path
     * ------------------------------------------------------------ */

    /// Handle a frame that arrived on `iface` from `src`.
    pub fn receive_frame(
        &mut self,
        iface: InterfaceId,
        src: LinkAddr,
        frame: Bytes,
        now: Instant,
    ) -> DemuxOutcome {
        self.now = now;
        let outcome = self.demux_frame(iface, &src, frame);
        self.drain_loopback();
        outcome
    }

    fn demux_frame(&mut self, iface: InterfaceId, src: &LinkAddr, frame: Bytes) -> DemuxOutcome {
        self.metrics.frames_received.increment();
        let face = match self.face_for(iface, src) {
            Ok(face) => face,
            Err(e) => {
                self.metrics.frames_dropped.increment();
                return DemuxOutcome {
                    dispatched: 0,
                    error: Some(e),
                };
            }
        };
        trace!("[Face {}] {} bytes from {}", face.0, frame.len(), src);

        let registry = self.registry;
        let outcome = demux(self, &registry, face, frame);
        if !outcome.is_ok() {
            self.metrics.frames_dropped.increment();
        }
        outcome
    }

    fn drain_loopback(&mut self) {
        let mut handled = 0;
        while let Some((iface, addr, frame)) = self.loopback.pop_front() {
            if handled == MAX_LOOPBACK_FRAMES {
                warn!("[LINK] dropping {} looped back frames", self.loopback.len() + 1);
                self.loopback.clear();
                break;
            }
            handled += 1;
            self.demux_frame(iface, &addr, frame);
        }
    }

    /// Answer from the cache, join a pending entry, or forward.
    pub fn handle_interest(&mut self, face: FaceId, interest: Interest, now: Instant) -> InterestResult {
        self.now = now;
        self.process_interest(face, interest, false)
    }

    pub(crate) fn process_interest(
        &mut self,
        face: FaceId,
        interest: Interest,
        pull_only: bool,
    ) -> InterestResult {
        let now = self.now;
        self.metrics.interests_received.increment();

        if let Some(content) = self.cache_match(&interest) {
            self.metrics.cs_hits.increment();
            debug!("[CS] hit for {} from {}", interest.name, face);
            self.deliver_content(face, &content);
            return InterestResult::SatisfiedByCs;
        }
        self.metrics.cs_misses.increment();

        match self.pit.insert(&interest, face, now) {
            PitInsert::Created => {
                let retransmit_at = now + self.config.retransmit_timeout();
                let expire_at = now + Duration::from_millis(interest.lifetime_ms as u64);
                let retransmit = self
                    .timers
                    .arm(retransmit_at, TimerEvent::PitRetransmit(interest.name.clone()));
                let lifetime = self
                    .timers
                    .arm(expire_at, TimerEvent::PitLifetime(interest.name.clone()));
                if let Some(entry) = self.pit.get_mut(&interest.name) {
                    entry.retransmit_timer = Some(retransmit);
                    entry.lifetime_timer = Some(lifetime);
                    entry.pull_only = pull_only;
                }
                self.metrics.pit_size.set(self.pit.len() as u64);

                match self.forward_interest(&interest.name) {
                    0 => {
                        debug!("[PIT] no next hop for {}, keeping entry", interest.name);
                        InterestResult::NoRoute
                    }
                    n => InterestResult::Forwarded(n),
                }
            }
            PitInsert::Aggregated | PitInsert::Repeated => {
                self.metrics.interests_aggregated.increment();
                if face.is_local() && !pull_only {
                    if let Some(entry) = self.pit.get_mut(&interest.name) {
                        entry.pull_only = false;
                    }
                }
                InterestResult::Aggregated
            }
            PitInsert::TableFull => InterestResult::Dropped("pending interest table full".into()),
            PitInsert::FacesFull => InterestResult::Dropped("too many faces waiting".into()),
        }
    }

    fn cache_match(&mut self, interest: &Interest) -> Option<ContentObject> {
        let matcher = self.registry.content_match(Suite::Ndn2013)?;
        self.cs.find_match(interest, matcher, self.now)
    }

    /// Send the pending Interest for `name` to its next hops.
    ///
    /// FIB routes first, the DODAG parent otherwise; never to a face that
    /// is itself waiting for the reply. Returns the number of faces tried.
    fn forward_interest(&mut self, name: &Name) -> usize {
        let Some(entry) = self.pit.get(name) else {
            return 0;
        };
        let waiting: Vec<FaceId> = entry.face_ids().collect();
        let wire = entry.interest.encode();

        let mut hops: Vec<FaceId> = self
            .fib
            .lookup(name)
            .map(|(_, faces)| faces.to_vec())
            .unwrap_or_default();
        hops.retain(|f| !f.is_local() && !waiting.contains(f));

        if hops.is_empty() && self.dodag.is_attached() {
            if let Some(parent) = self.dodag.parent_face() {
                if !waiting.contains(&parent) {
                    hops.push(parent);
                }
            }
        }

        for hop in &hops {
            if self.send_to_face(*hop, wire.clone()) {
                self.metrics.interests_forwarded.increment();
                trace!("[PIT] {} forwarded to {}", name, hop);
            }
        }
        hops.len()
    }

    /// Satisfy pending entries with `data` and cache it if admitted.
    pub fn handle_data(&mut self, face: FaceId, data: Data, wire: Bytes, now: Instant) {
        self.now = now;
        self.metrics.data_received.increment();

        let entries = self.pit.take_matching(&data.name);
        if entries.is_empty() {
            self.metrics.data_unsolicited.increment();
            debug!("[PIT] unsolicited {} from {}, dropped", data.name, face);
            return;
        }

        let mut faces: Vec<FaceId> = Vec::new();
        let mut pulled = false;
        for mut entry in entries {
            for token in entry.take_timers() {
                self.timers.cancel(token);
            }
            pulled |= entry.pull_only;
            if !entry.pull_only && entry.has_face(LOCAL_FACE) {
                let waited = now.saturating_duration_since(entry.created);
                self.metrics
                    .satisfaction_latency_ms
                    .observe(waited.as_millis() as u64);
            }
            for f in entry.face_ids() {
                if f == face || (f.is_local() && entry.pull_only) || faces.contains(&f) {
                    continue;
                }
                faces.push(f);
            }
            self.metrics.interests_satisfied.increment();
        }
        self.metrics.pit_size.set(self.pit.len() as u64);

        let class = self.classifier.classify(&data.name);
        let name = data.name.clone();
        let content = ContentObject::new(data, wire, class, now);
        let pending = faces.len() + usize::from(pulled);

        if self.cs.admit(&content, pending) {
            self.store(content.clone());
        } else {
            self.metrics.cs_rejections.increment();
            debug!("[CS] admission declined {}", name);
        }

        if pulled && self.cs.contains(&name) {
            self.advertise(&name, now);
        }

        for f in faces {
            self.deliver_content(f, &content);
        }
    }

    fn store(&mut self, content: ContentObject) -> CsInsert {
        let outcome = self.cs.add(content);
        match outcome {
            CsInsert::Inserted | CsInsert::Replaced => self.metrics.cs_inserts.increment(),
            CsInsert::InsertedAfterEviction => {
                self.metrics.cs_inserts.increment();
                self.metrics.cs_evictions.increment();
            }
            CsInsert::Rejected => self.metrics.cs_rejections.increment(),
        }
        self.metrics.cs_size.set(self.cs.len() as u64);
        outcome
    }

    /// Hand cached content to `face`.
    fn deliver_content(&mut self, face: FaceId, content: &ContentObject) {
        if face.is_local() {
            self.deliveries.push(Delivery {
                data: content.data.clone(),
                wire: content.wire.clone(),
            });
            return;
        }

        if self.send_to_face(face, content.wire.clone()) {
            self.metrics.data_forwarded.increment();
        }
        if self.dodag.parent_face() == Some(face) && self.dodag.nam_cache.mark_requested(content.name()) {
            debug!("[COMPAS] {} pulled by parent", content.name());
        }
    }

    /* ------------------------------------------------------------ *
     * Transmission
     * ------------------------------------------------------------ */

    pub(crate) fn send_to_face(&mut self, face: FaceId, frame: Bytes) -> bool {
        let Some(target) = self.faces.get(face).cloned() else {
            warn!("[Face {}] unknown face, frame dropped", face.0);
            return false;
        };
        self.faces.touch(face, self.now);
        self.transmit(target.iface, Destination::Unicast(target.peer), frame)
    }

    /// Send a frame; frames addressed to ourselves are looped back.
    pub(crate) fn transmit(&mut self, iface: InterfaceId, dest: Destination, frame: Bytes) -> bool {
        if let Destination::Unicast(addr) = &dest {
            if self.interfaces.iter().any(|i| i.id == iface && &i.addr == addr) {
                trace!("[LINK] looping back {} bytes on {}", frame.len(), iface);
                self.loopback.push_back((iface, addr.clone(), frame));
                return true;
            }
        }

        match self.link.send(iface, &dest, frame) {
            Ok(()) => true,
            Err(e) => {
                warn!("[LINK] send on {} to {} failed: {}", iface, dest, e);
                self.metrics.link_send_failures.increment();
                false
            }
        }
    }

    /// First live interface, used for COMPAS broadcasts.
    pub fn egress(&self) -> Option<&Interface> {
        self.interfaces.iter().find(|i| i.live)
    }

    /* ------------------------------------------------------------ *
     * Timers
     * ------------------------------------------------------------ */

    pub fn next_deadline(&mut self) -> Option<Instant> {
        self.timers.next_deadline()
    }

    /// Run every timer due at `now`, oldest first. Returns how many fired.
    pub fn fire_due(&mut self, now: Instant) -> usize {
        self.now = now;
        let mut fired = 0;
        while let Some((_, event)) = self.timers.pop_due(now) {
            self.on_timer(event, now);
            fired += 1;
        }
        self.drain_loopback();
        fired
    }

    fn on_timer(&mut self, event: TimerEvent, now: Instant) {
        match event {
            TimerEvent::PitRetransmit(name) => self.on_retransmit(&name, now),
            TimerEvent::PitLifetime(name) => self.on_lifetime(&name),
            TimerEvent::Pam => self.on_pam_timer(now),
            TimerEvent::Sol => self.on_sol_timer(now),
            TimerEvent::Nam => self.on_nam_timer(now),
            TimerEvent::ParentTimeout => self.on_parent_liveness_expired(now),
            TimerEvent::FaceAgeing => {
                self.age_faces(now);
                self.timers
                    .arm(now + self.config.face_idle_timeout(), TimerEvent::FaceAgeing);
            }
        }
    }

    /// Face for a peer, making room among idle faces when the table is full.
    fn face_for(&mut self, iface: InterfaceId, peer: &LinkAddr) -> Result<FaceId> {
        if self.faces.is_full() && self.faces.find(iface, peer).is_none() {
            self.age_faces(self.now);
        }
        let face = self.faces.get_or_create(iface, peer, self.now)?;
        self.metrics.faces.set(self.faces.len() as u64);
        Ok(face)
    }

    /// Remove idle faces no pending entry, route or parent refers to.
    pub(crate) fn age_faces(&mut self, now: Instant) -> usize {
        let mut in_use: HashSet<FaceId> = self.pit.iter().flat_map(|e| e.face_ids()).collect();
        in_use.extend(self.fib.faces());
        in_use.extend(self.dodag.parent_face());

        let removed = self
            .faces
            .age_out(now, self.config.face_idle_timeout(), |f| in_use.contains(&f));
        if !removed.is_empty() {
            debug!("[Face] aged out {} idle faces", removed.len());
            self.metrics.faces_aged_out.add(removed.len() as u64);
            self.metrics.faces.set(self.faces.len() as u64);
        }
        removed.len()
    }

    fn on_retransmit(&mut self, name: &Name, now: Instant) {
        let max = self.config.pit.max_retransmit;
        let Some(entry) = self.pit.get_mut(name) else {
            debug!("[PIT] retransmit timer for {} without entry", name);
            return;
        };
        entry.retransmit_timer = None;

        if entry.retries >= max {
            debug!("[PIT] {} abandoned after {} retransmissions", name, entry.retries);
            self.remove_pending(name);
            self.metrics.interests_timed_out.increment();
            return;
        }

        entry.retries += 1;
        debug!("[PIT] retransmitting {} ({}/{})", name, entry.retries, max);
        self.metrics.interests_retransmitted.increment();
        self.forward_interest(name);

        let token = self
            .timers
            .arm(now + self.config.retransmit_timeout(), TimerEvent::PitRetransmit(name.clone()));
        if let Some(entry) = self.pit.get_mut(name) {
            entry.retransmit_timer = Some(token);
        }
    }

    fn on_lifetime(&mut self, name: &Name) {
        if let Some(entry) = self.pit.get_mut(name) {
            entry.lifetime_timer = None;
            debug!("[PIT] {} expired", name);
            self.remove_pending(name);
            self.metrics.interests_timed_out.increment();
        } else {
            debug!("[PIT] lifetime timer for {} without entry", name);
        }
    }

    fn remove_pending(&mut self, name: &Name) {
        if let Some(mut entry) = self.pit.remove(name) {
            for token in entry.take_timers() {
                self.timers.cancel(token);
            }
        }
        self.metrics.pit_size.set(self.pit.len() as u64);
    }

    pub(crate) fn slot_armed(&self, slot: Option<TimerToken>) -> bool {
        slot.map_or(false, |t| self.timers.is_armed(t))
    }

    /* ------------------------------------------------------------ *
     * Administrative requests
     * ------------------------------------------------------------ */

    /// Add locally produced content. Content under the DODAG prefix is
    /// advertised toward the root.
    pub fn insert(&mut self, data: Data, now: Instant) -> bool {
        self.now = now;
        let class = self.classifier.classify(&data.name);
        let name = data.name.clone();
        let stored = self.store(ContentObject::from_data(data, class, now)).stored();

        if stored {
            info!("[CS] inserted {}", name);
            if self.dodag_prefix().is_prefix_of(&name) {
                self.advertise(&name, now);
            }
        } else {
            warn!("[CS] no room for {}", name);
        }
        stored
    }

    pub fn remove(&mut self, name: &Name) -> bool {
        let removed = self.cs.remove(name).is_some();
        self.metrics.cs_size.set(self.cs.len() as u64);
        if removed {
            debug!("[CS] removed {}", name);
        }
        removed
    }

    pub fn lookup(&mut self, name: &Name, mode: MatchMode, now: Instant) -> Option<ContentObject> {
        self.cs.lookup(name, mode, now).cloned()
    }

    /// Express an Interest on behalf of `reply_face` (normally the local face).
    pub fn send_interest(
        &mut self,
        name: Name,
        opts: &InterestOptions,
        reply_face: FaceId,
        now: Instant,
    ) -> InterestResult {
        self.now = now;
        let interest = Interest::with_options(name, opts);
        debug!("[PIT] local request {} nonce {:08x}", interest.name, interest.nonce);
        let result = self.process_interest(reply_face, interest, false);
        self.drain_loopback();
        result
    }

    /// Static route to a peer, creating its face.
    pub fn add_route(&mut self, prefix: Name, iface: InterfaceId, peer: &LinkAddr) -> Result<FaceId> {
        let face = self.face_for(iface, peer)?;
        self.fib.add_route(prefix, face);
        Ok(face)
    }

    /// Content delivered to the local face since the last call.
    pub fn take_app_deliveries(&mut self) -> Vec<Delivery> {
        std::mem::take(&mut self.deliveries)
    }

    /* ------------------------------------------------------------ *
     * Inspection
     * ------------------------------------------------------------ */

    pub fn metrics(&self) -> Arc<RelayMetrics> {
        self.metrics.clone()
    }

    pub fn config(&self) -> &RelayConfig {
        &self.config
    }

    pub fn dodag(&self) -> &Dodag {
        &self.dodag
    }

    pub fn pit(&self) -> &Pit {
        &self.pit
    }

    pub fn cs(&self) -> &ContentStore {
        &self.cs
    }

    pub fn fib(&self) -> &Fib {
        &self.fib
    }

    pub fn faces(&self) -> &FaceTable {
        &self.faces
    }

    pub fn timers(&self) -> &Timers {
        &self.timers
    }

    pub fn interfaces(&self) -> &[Interface] {
        &self.interfaces
    }
}

/// Receive dispatcher of the NDN-TLV suite.
fn ndn_dispatch(relay: &mut Relay, face: FaceId, buf: &mut Bytes) -> Result<DispatchStatus> {
    let before = buf.clone();
    let now = relay.now;
    match NdnPacket::decode(buf)? {
        NdnPacket::Interest(interest) => {
            relay.handle_interest(face, interest, now);
        }
        NdnPacket::Data(data) => {
            let wire = before.slice(..before.len() - buf.len());
            relay.handle_data(face, data, wire, now);
        }
    }
    Ok(DispatchStatus::Consumed)
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::link::MemoryLink;
    use rust_compas_common::types::TrafficClass;

    const IF: InterfaceId = InterfaceId(1);

    fn relay(config: RelayConfig) -> (Relay, MemoryLink) {
        let link = MemoryLink::new();
        let iface = Interface::new(IF, LinkAddr::from("self"), 1500);
        let relay = Relay::new(config, link.clone(), vec![iface]).unwrap().with_seed(1);
        (relay, link)
    }

    fn interest(name: &str) -> Bytes {
        Interest::new(Name::from_string(name)).encode()
    }

    fn data(name: &str) -> Bytes {
        Data::new(Name::from_string(name), &b"payload"[..]).encode()
    }

    #[test]
    fn interest_without_route_stays_pending() {
        let (mut relay, link) = relay(RelayConfig::default());
        let now = Instant::now();
        relay.receive_frame(IF, LinkAddr::from("a"), interest("/x"), now);

        assert!(relay.pit().contains(&Name::from_string("/x")));
        assert!(link.sent().is_empty());
        assert_eq!(relay.timers().armed(&TimerEvent::PitLifetime(Name::from_string("/x"))), 1);
    }

    #[test]
    fn retransmission_budget_then_removal() {
        let mut config = RelayConfig::default();
        config.pit.max_retransmit = 2;
        config.pit.retransmit_timeout_ms = 100;
        let (mut relay, link) = relay(config);
        let now = Instant::now();
        let producer = relay.add_route(Name::from_string("/p"), IF, &LinkAddr::from("producer")).unwrap();

        relay.receive_frame(IF, LinkAddr::from("consumer"), interest("/p/1"), now);
        assert_eq!(link.take_sent().len(), 1);

        relay.fire_due(now + Duration::from_millis(100));
        relay.fire_due(now + Duration::from_millis(200));
        let sent = link.take_sent();
        assert_eq!(sent.len(), 2);
        let producer_addr = relay.faces().get(producer).unwrap().peer.clone();
        assert!(sent.iter().all(|f| f.dest == Destination::Unicast(producer_addr.clone())));

        relay.fire_due(now + Duration::from_millis(300));
        assert!(!relay.pit().contains(&Name::from_string("/p/1")));
        assert!(link.sent().is_empty());
        assert_eq!(relay.metrics().interests_timed_out.value(), 1);
        // lifetime timer went with the entry
        assert!(relay.timers().is_empty());
    }

    #[test]
    fn lifetime_expiry_removes_entry() {
        let (mut relay, _link) = relay(RelayConfig::default());
        let now = Instant::now();
        let short = Interest::new(Name::from_string("/short")).with_lifetime(50).encode();
        relay.receive_frame(IF, LinkAddr::from("a"), short, now);

        relay.fire_due(now + Duration::from_millis(50));
        assert!(relay.pit().is_empty());
        assert!(relay.timers().is_empty());
    }

    #[test]
    fn unsolicited_data_is_not_cached() {
        let (mut relay, _link) = relay(RelayConfig::default());
        relay.receive_frame(IF, LinkAddr::from("a"), data("/u"), Instant::now());
        assert!(relay.cs().is_empty());
        assert_eq!(relay.metrics().data_unsolicited.value(), 1);
    }

    #[test]
    fn data_is_never_sent_back_to_its_source() {
        let (mut relay, link) = relay(RelayConfig::default());
        let now = Instant::now();
        relay.receive_frame(IF, LinkAddr::from("a"), interest("/loop"), now);
        relay.receive_frame(IF, LinkAddr::from("a"), data("/loop"), now);

        assert!(link.sent().is_empty());
        assert!(relay.pit().is_empty());
        assert!(relay.cs().contains(&Name::from_string("/loop")));
    }

    #[test]
    fn cached_content_answers_interest() {
        let (mut relay, link) = relay(RelayConfig::default());
        let now = Instant::now();
        relay.insert(Data::new(Name::from_string("/c"), &b"x"[..]), now);

        relay.receive_frame(IF, LinkAddr::from("a"), interest("/c"), now);
        let sent = link.take_sent();
        assert_eq!(sent.len(), 1);
        assert_eq!(sent[0].dest, Destination::Unicast(LinkAddr::from("a")));
        assert_eq!(Data::decode(&mut sent[0].frame.clone()).unwrap().name, Name::from_string("/c"));
        assert!(relay.pit().is_empty());
    }

    #[test]
    fn local_request_is_delivered_to_application() {
        let (mut relay, link) = relay(RelayConfig::default());
        let now = Instant::now();
        relay.add_route(Name::from_string("/r"), IF, &LinkAddr::from("producer")).unwrap();

        let result = relay.send_interest(Name::from_string("/r/1"), &InterestOptions::default(), LOCAL_FACE, now);
        assert_eq!(result, InterestResult::Forwarded(1));
        assert_eq!(link.take_sent().len(), 1);

        relay.receive_frame(IF, LinkAddr::from("producer"), data("/r/1"), now + Duration::from_millis(5));
        let delivered = relay.take_app_deliveries();
        assert_eq!(delivered.len(), 1);
        assert_eq!(delivered[0].data.name, Name::from_string("/r/1"));
        assert!(link.sent().is_empty());
        assert_eq!(relay.metrics().satisfaction_latency_ms.count(), 1);
    }

    #[test]
    fn frame_to_own_address_loops_back() {
        let (mut relay, link) = relay(RelayConfig::default());
        let now = Instant::now();
        relay.add_route(Name::from_string("/me"), IF, &LinkAddr::from("self")).unwrap();

        relay.send_interest(Name::from_string("/me/x"), &InterestOptions::default(), LOCAL_FACE, now);
        // the looped back Interest arrives on the "self" face and stays pending
        assert!(link.sent().is_empty());
        let entry = relay.pit().get(&Name::from_string("/me/x")).unwrap();
        assert_eq!(entry.faces.len(), 2);
    }

    #[test]
    fn link_failure_is_counted_not_fatal() {
        let (mut relay, link) = relay(RelayConfig::default());
        let now = Instant::now();
        relay.add_route(Name::from_string("/f"), IF, &LinkAddr::from("producer")).unwrap();
        link.set_failing(true);

        relay.receive_frame(IF, LinkAddr::from("a"), interest("/f/1"), now);
        assert_eq!(relay.metrics().link_send_failures.value(), 1);
        assert!(relay.pit().contains(&Name::from_string("/f/1")));
    }

    #[test]
    fn full_face_table_makes_room_from_idle_faces() {
        let mut config = RelayConfig::default();
        config.face.max_faces = 2;
        config.face.idle_timeout_ms = 1000;
        let (mut relay, _link) = relay(config);
        let t0 = Instant::now();

        relay.receive_frame(IF, LinkAddr::from("waiting"), interest("/x"), t0);
        relay.receive_frame(IF, LinkAddr::from("quiet"), data("/u"), t0);
        let waiting = relay.faces().find(IF, &LinkAddr::from("waiting")).unwrap();

        let refused = relay.receive_frame(IF, LinkAddr::from("new"), data("/u"), t0 + Duration::from_millis(500));
        assert!(matches!(refused.error, Some(rust_compas_common::Error::FaceTableFull(2))));
        assert_eq!(relay.faces().len(), 2);

        let accepted = relay.receive_frame(IF, LinkAddr::from("new"), data("/u"), t0 + Duration::from_millis(1000));
        assert!(accepted.is_ok());
        assert_eq!(relay.faces().find(IF, &LinkAddr::from("quiet")), None);
        let new = relay.faces().find(IF, &LinkAddr::from("new")).unwrap();
        assert_ne!(new, waiting);
        // the pending entry still answers to its own peer
        assert_eq!(relay.faces().get(waiting).unwrap().peer, LinkAddr::from("waiting"));
        assert_eq!(relay.metrics().faces_aged_out.value(), 1);
    }

    #[test]
    fn ageing_timer_sweeps_idle_faces() {
        let mut config = RelayConfig::default();
        config.face.idle_timeout_ms = 1000;
        let (mut relay, _link) = relay(config);
        let t0 = Instant::now();
        relay.start(t0);

        relay.receive_frame(IF, LinkAddr::from("passing"), data("/u"), t0);
        assert_eq!(relay.faces().len(), 1);

        relay.fire_due(t0 + Duration::from_millis(1000));
        assert!(relay.faces().is_empty());
        assert_eq!(relay.timers().armed(&TimerEvent::FaceAgeing), 1);
    }

    #[test]
    fn local_insert_respects_capacity() {
        let mut config = RelayConfig::default();
        config.cs.capacity = 1;
        let (mut relay, _link) = relay(config);
        let now = Instant::now();
        assert!(relay.insert(Data::new(Name::from_string("/one"), &b"1"[..]), now));
        assert!(!relay.insert(Data::new(Name::from_string("/two"), &b"2"[..]), now));
        assert_eq!(relay.metrics().cs_rejections.value(), 1);

        let hit = relay.lookup(&Name::from_string("/one"), MatchMode::Exact, now).unwrap();
        assert_eq!(hit.class, TrafficClass::Unreliable);
    }
}
