//! Pluggable caching strategies and the traffic classifier.
//!
//! The relay works with none of them installed: everything is admitted,
//! nothing is evicted and all content is unreliable. Closures with the right
//! shape can be used wherever a strategy is expected.

use rust_compas_common::{ndn::Name, types::TrafficClass};

use crate::cs::ContentObject;

/// Decides whether unreliable content enters the content store.
pub trait AdmissionPolicy: Send {
    /// `pit_pending` is the number of faces that were waiting for the content.
    fn admit(&mut self, content: &ContentObject, pit_pending: usize) -> bool;
}

/// Picks content to drop when the store is full.
pub trait EvictionStrategy: Send {
    /// Called for each entry, least recently used first. Returning true
    /// removes that entry and stops the scan.
    fn should_remove(&mut self, content: &ContentObject) -> bool;
}

/// Assigns a traffic class to a name.
pub trait TrafficClassifier: Send {
    fn classify(&self, name: &Name) -> TrafficClass;
}

impl<F> AdmissionPolicy for F
where
    F: FnMut(&ContentObject, usize) -> bool + Send,
{
    fn admit(&mut self, content: &ContentObject, pit_pending: usize) -> bool {
        self(content, pit_pending)
    }
}

impl<F> EvictionStrategy for F
where
    F: FnMut(&ContentObject) -> bool + Send,
{
    fn should_remove(&mut self, content: &ContentObject) -> bool {
        self(content)
    }
}

/// Caches only content somebody asked for.
#[derive(Debug, Clone, Copy, Default)]
pub struct PendingOnlyAdmission;

impl AdmissionPolicy for PendingOnlyAdmission {
    fn admit(&mut self, _content: &ContentObject, pit_pending: usize) -> bool {
        pit_pending > 0
    }
}

/// Caches unreliable content with a fixed probability.
#[derive(Debug, Clone)]
pub struct RandomAdmission {
    probability: f64,
    rng: fastrand::Rng,
}

impl RandomAdmission {
    pub fn new(probability: f64) -> Self {
        Self {
            probability: probability.clamp(0.0, 1.0),
            rng: fastrand::Rng::new(),
        }
    }

    pub fn with_seed(probability: f64, seed: u64) -> Self {
        Self {
            probability: probability.clamp(0.0, 1.0),
            rng: fastrand::Rng::with_seed(seed),
        }
    }
}

impl AdmissionPolicy for RandomAdmission {
    fn admit(&mut self, _content: &ContentObject, _pit_pending: usize) -> bool {
        self.rng.f64() < self.probability
    }
}

/// Evicts the least recently used unreliable entry, never reliable ones.
#[derive(Debug, Clone, Copy, Default)]
pub struct EvictUnreliable;

impl EvictionStrategy for EvictUnreliable {
    fn should_remove(&mut self, content: &ContentObject) -> bool {
        !content.is_reliable()
    }
}

/// Plain LRU: evicts whatever is offered first.
#[derive(Debug, Clone, Copy, Default)]
pub struct EvictAny;

impl EvictionStrategy for EvictAny {
    fn should_remove(&mut self, _content: &ContentObject) -> bool {
        true
    }
}

/// Content under any of the configured prefixes is reliable.
#[derive(Debug, Clone, Default)]
pub struct PrefixClassifier {
    reliable: Vec<Name>,
}

impl PrefixClassifier {
    pub fn new(reliable: Vec<Name>) -> Self {
        Self { reliable }
    }

    pub fn from_strings<S: AsRef<str>>(prefixes: &[S]) -> Self {
        Self::new(prefixes.iter().map(|p| Name::from_string(p.as_ref())).collect())
    }
}

impl TrafficClassifier for PrefixClassifier {
    fn classify(&self, name: &Name) -> TrafficClass {
        if self.reliable.iter().any(|p| p.is_prefix_of(name)) {
            TrafficClass::Reliable
        } else {
            TrafficClass::Unreliable
        }
    }
}
