//! Pending interest table.
//!
//! One entry per requested name. Later requests for the same name from other
//! faces are folded into the existing entry instead of being forwarded again.

use log::{debug, warn};
use rust_compas_common::{
    ndn::{Interest, Name},
    types::FaceId,
};
use std::collections::HashMap;
use tokio::time::Instant;

use crate::timer::TimerToken;

/// A face waiting for the reply.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct PendingFace {
    pub face: FaceId,
    /// How many times this face repeated the request.
    pub retransmissions: u32,
}

#[derive(Debug, Clone)]
pub struct PitEntry {
    pub interest: Interest,
    pub faces: Vec<PendingFace>,
    /// Retransmissions performed by this node.
    pub retries: u32,
    pub created: Instant,
    /// Issued to pull content advertised by a child, not for the application.
    pub pull_only: bool,
    pub(crate) retransmit_timer: Option<TimerToken>,
    pub(crate) lifetime_timer: Option<TimerToken>,
}

impl PitEntry {
    fn new(interest: Interest, face: FaceId, now: Instant) -> Self {
        Self {
            interest,
            faces: vec![PendingFace {
                face,
                retransmissions: 0,
            }],
            retries: 0,
            created: now,
            pull_only: false,
            retransmit_timer: None,
            lifetime_timer: None,
        }
    }

    pub fn has_face(&self, face: FaceId) -> bool {
        self.faces.iter().any(|p| p.face == face)
    }

    pub fn face_ids(&self) -> impl Iterator<Item = FaceId> + '_ {
        self.faces.iter().map(|p| p.face)
    }

    /// Timers still armed for this entry.
    pub(crate) fn take_timers(&mut self) -> impl Iterator<Item = TimerToken> {
        [self.retransmit_timer.take(), self.lifetime_timer.take()]
            .into_iter()
            .flatten()
    }
}

/// Result of offering an Interest to the table.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum PitInsert {
    /// New entry; the Interest must be forwarded.
    Created,
    /// Another face joined an existing entry.
    Aggregated,
    /// A face already waiting asked again.
    Repeated,
    /// The table has no room for another name.
    TableFull,
    /// The entry has no room for another face.
    FacesFull,
}

#[derive(Debug)]
pub struct Pit {
    entries: HashMap<Name, PitEntry>,
    max_entries: usize,
    max_pending_faces: usize,
}

impl Pit {
    pub fn new(max_entries: usize, max_pending_faces: usize) -> Self {
        Self {
            entries: HashMap::new(),
            max_entries,
            max_pending_faces,
        }
    }

    /// Record that `face` wants `interest`.
    pub fn insert(&mut self, interest: &Interest, face: FaceId, now: Instant) -> PitInsert {
        if let Some(entry) = self.entries.get_mut(&interest.name) {
            if let Some(pending) = entry.faces.iter_mut().find(|p| p.face == face) {
                pending.retransmissions += 1;
                debug!(
                    "[PIT] {} repeated by {} ({} times)",
                    interest.name, face, pending.retransmissions
                );
                return PitInsert::Repeated;
            }
            if entry.faces.len() >= self.max_pending_faces {
                warn!("[PIT] {} already has {} faces, dropping request from {}", interest.name, entry.faces.len(), face);
                return PitInsert::FacesFull;
            }
            entry.faces.push(PendingFace {
                face,
                retransmissions: 0,
            });
            debug!("[PIT] {} aggregated from {}", interest.name, face);
            return PitInsert::Aggregated;
        }

        if self.entries.len() >= self.max_entries {
            warn!("[PIT] table full ({} entries), dropping {}", self.entries.len(), interest.name);
            return PitInsert::TableFull;
        }

        self.entries
            .insert(interest.name.clone(), PitEntry::new(interest.clone(), face, now));
        debug!("[PIT] new entry {} from {}", interest.name, face);
        PitInsert::Created
    }

    pub fn get(&self, name: &Name) -> Option<&PitEntry> {
        self.entries.get(name)
    }

    pub fn get_mut(&mut self, name: &Name) -> Option<&mut PitEntry> {
        self.entries.get_mut(name)
    }

    pub fn contains(&self, name: &Name) -> bool {
        self.entries.contains_key(name)
    }

    pub fn remove(&mut self, name: &Name) -> Option<PitEntry> {
        self.entries.remove(name)
    }

    /// Remove and return every entry that `data_name` satisfies.
    pub fn take_matching(&mut self, data_name: &Name) -> Vec<PitEntry> {
        let names: Vec<Name> = self
            .entries
            .values()
            .filter(|e| e.interest.matches(data_name))
            .map(|e| e.interest.name.clone())
            .collect();

        names
            .iter()
            .filter_map(|name| self.entries.remove(name))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn iter(&self) -> impl Iterator<Item = &PitEntry> {
        self.entries.values()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn interest(name: &str) -> Interest {
        Interest::new(Name::from_string(name))
    }

    #[test]
    fn duplicates_fold_into_one_entry() {
        let now = Instant::now();
        let mut pit = Pit::new(8, 8);
        let i = interest("/x/y");

        assert_eq!(pit.insert(&i, FaceId(1), now), PitInsert::Created);
        assert_eq!(pit.insert(&i, FaceId(2), now), PitInsert::Aggregated);
        assert_eq!(pit.insert(&i, FaceId(1), now), PitInsert::Repeated);
        assert_eq!(pit.insert(&i, FaceId(2), now), PitInsert::Repeated);

        assert_eq!(pit.len(), 1);
        let entry = pit.get(&i.name).unwrap();
        assert_eq!(entry.face_ids().collect::<Vec<_>>(), vec![FaceId(1), FaceId(2)]);
        assert_eq!(entry.faces[0].retransmissions, 1);
        assert_eq!(entry.faces[1].retransmissions, 1);
    }

    #[test]
    fn bounded_table_and_faces() {
        let now = Instant::now();
        let mut pit = Pit::new(1, 2);
        assert_eq!(pit.insert(&interest("/a"), FaceId(1), now), PitInsert::Created);
        assert_eq!(pit.insert(&interest("/b"), FaceId(1), now), PitInsert::TableFull);
        assert_eq!(pit.insert(&interest("/a"), FaceId(2), now), PitInsert::Aggregated);
        assert_eq!(pit.insert(&interest("/a"), FaceId(3), now), PitInsert::FacesFull);
        assert_eq!(pit.get(&Name::from_string("/a")).unwrap().faces.len(), 2);
    }

    #[test]
    fn take_matching_honours_can_be_prefix() {
        let now = Instant::now();
        let mut pit = Pit::new(8, 8);
        pit.insert(&interest("/a/b"), FaceId(1), now);
        pit.insert(&interest("/a").with_can_be_prefix(true), FaceId(2), now);
        pit.insert(&interest("/a/b/c"), FaceId(3), now);

        let mut satisfied: Vec<Name> = pit
            .take_matching(&Name::from_string("/a/b"))
            .into_iter()
            .map(|e| e.interest.name)
            .collect();
        satisfied.sort();

        assert_eq!(satisfied, vec![Name::from_string("/a"), Name::from_string("/a/b")]);
        assert!(pit.contains(&Name::from_string("/a/b/c")));
        assert_eq!(pit.len(), 1);
    }
}
