//! Content store.
//!
//! A bounded cache of Data packets keyed by name. What gets in is decided by
//! [`ContentStore::admit`]; what leaves under pressure is decided by the
//! optional [`EvictionStrategy`]. With no eviction strategy a full store
//! refuses new names.

use bytes::Bytes;
use log::{debug, trace};
use rust_compas_common::{
    ndn::{Data, Interest, Name},
    types::{MatchMode, TrafficClass},
};
use std::collections::BTreeMap;
use std::time::Duration;
use tokio::time::Instant;

use crate::strategy::{AdmissionPolicy, EvictionStrategy};

/// A cached reply.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContentObject {
    pub data: Data,
    /// The packet as it arrived, forwarded without re-encoding.
    pub wire: Bytes,
    pub class: TrafficClass,
    /// `None` when the Data carried no freshness period.
    pub fresh_until: Option<Instant>,
    pub last_used: Instant,
}

impl ContentObject {
    pub fn new(data: Data, wire: Bytes, class: TrafficClass, now: Instant) -> Self {
        let fresh_until = data
            .freshness_ms
            .map(|ms| now + Duration::from_millis(ms as u64));
        Self {
            data,
            wire,
            class,
            fresh_until,
            last_used: now,
        }
    }

    /// Build from a locally produced Data packet.
    pub fn from_data(data: Data, class: TrafficClass, now: Instant) -> Self {
        let wire = data.encode();
        Self::new(data, wire, class, now)
    }

    pub fn name(&self) -> &Name {
        &self.data.name
    }

    pub fn is_reliable(&self) -> bool {
        self.class == TrafficClass::Reliable
    }

    pub fn is_stale(&self, now: Instant) -> bool {
        matches!(self.fresh_until, Some(deadline) if now >= deadline)
    }
}

/// Outcome of adding content to the store.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CsInsert {
    Inserted,
    /// Same name was already cached; the content was replaced.
    Replaced,
    /// Room was made by evicting another entry.
    InsertedAfterEviction,
    /// Store is full and nothing could be evicted.
    Rejected,
}

impl CsInsert {
    pub fn stored(self) -> bool {
        !matches!(self, CsInsert::Rejected)
    }
}

pub struct ContentStore {
    entries: BTreeMap<Name, ContentObject>,
    capacity: usize,
    admission: Option<Box<dyn AdmissionPolicy>>,
    eviction: Option<Box<dyn EvictionStrategy>>,
}

impl std::fmt::Debug for ContentStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ContentStore")
            .field("len", &self.entries.len())
            .field("capacity", &self.capacity)
            .field("admission", &self.admission.is_some())
            .field("eviction", &self.eviction.is_some())
            .finish()
    }
}

impl ContentStore {
    pub fn new(capacity: usize) -> Self {
        Self {
            entries: BTreeMap::new(),
            capacity,
            admission: None,
            eviction: None,
        }
    }

    pub fn set_admission_policy(&mut self, policy: Box<dyn AdmissionPolicy>) {
        self.admission = Some(policy);
    }

    pub fn set_eviction_strategy(&mut self, strategy: Box<dyn EvictionStrategy>) {
        self.eviction = Some(strategy);
    }

    /// Should `content` be cached, given how many requests are waiting for it?
    ///
    /// Reliable content is always admitted. Otherwise the admission policy
    /// decides, and without one everything is admitted.
    pub fn admit(&mut self, content: &ContentObject, pit_pending: usize) -> bool {
        if content.is_reliable() {
            return true;
        }
        match self.admission.as_mut() {
            Some(policy) => policy.admit(content, pit_pending),
            None => true,
        }
    }

    /// Add content, evicting if the store is full.
    ///
    /// Admission is not consulted here, see [`ContentStore::admit`].
    pub fn add(&mut self, content: ContentObject) -> CsInsert {
        let name = content.name().clone();

        if let Some(existing) = self.entries.get_mut(&name) {
            *existing = content;
            debug!("[CS] replaced {}", name);
            return CsInsert::Replaced;
        }

        let mut outcome = CsInsert::Inserted;
        if self.entries.len() >= self.capacity {
            if !self.evict_one() {
                debug!("[CS] full ({} entries), rejecting {}", self.entries.len(), name);
                return CsInsert::Rejected;
            }
            outcome = CsInsert::InsertedAfterEviction;
        }

        trace!("[CS] added {}", name);
        self.entries.insert(name, content);
        outcome
    }

    /// Offer entries to the eviction strategy, least recently used first,
    /// until it agrees to remove one.
    fn evict_one(&mut self) -> bool {
        let Some(strategy) = self.eviction.as_mut() else {
            return false;
        };

        let mut candidates: Vec<(&Name, &ContentObject)> = self.entries.iter().collect();
        candidates.sort_by_key(|(_, c)| c.last_used);

        let victim = candidates
            .into_iter()
            .find(|(_, c)| strategy.should_remove(c))
            .map(|(name, _)| name.clone());

        match victim {
            Some(name) => {
                debug!("[CS] evicted {}", name);
                self.entries.remove(&name);
                true
            }
            None => false,
        }
    }

    /// Find cached content by name, refreshing its last use.
    pub fn lookup(&mut self, name: &Name, mode: MatchMode, now: Instant) -> Option<&ContentObject> {
        let key = match mode {
            MatchMode::Exact => self.entries.contains_key(name).then(|| name.clone()),
            MatchMode::Prefix => self
                .entries
                .range(name.clone()..)
                .take_while(|(k, _)| name.is_prefix_of(k))
                .map(|(k, _)| k.clone())
                .next(),
        }?;

        let entry = self.entries.get_mut(&key)?;
        entry.last_used = now;
        Some(entry)
    }

    /// Find content answering `interest` using the suite's match function.
    pub fn find_match(
        &mut self,
        interest: &Interest,
        matches: fn(&Interest, &ContentObject, Instant) -> bool,
        now: Instant,
    ) -> Option<ContentObject> {
        let key = self
            .entries
            .range(interest.name.clone()..)
            .take_while(|(k, _)| interest.name.is_prefix_of(k))
            .find(|(_, c)| matches(interest, c, now))
            .map(|(k, _)| k.clone())?;

        let entry = self.entries.get_mut(&key)?;
        entry.last_used = now;
        Some(entry.clone())
    }

    pub fn remove(&mut self, name: &Name) -> Option<ContentObject> {
        self.entries.remove(name)
    }

    pub fn contains(&self, name: &Name) -> bool {
        self.entries.contains_key(name)
    }

    pub fn get(&self, name: &Name) -> Option<&ContentObject> {
        self.entries.get(name)
    }

    /// Names of cached content under `prefix`.
    pub fn names_under(&self, prefix: &Name) -> Vec<Name> {
        self.entries
            .range(prefix.clone()..)
            .take_while(|(k, _)| prefix.is_prefix_of(k))
            .map(|(k, _)| k.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn capacity(&self) -> usize {
        self.capacity
    }
}
