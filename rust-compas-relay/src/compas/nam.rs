//! Name advertisement cache and the per-period retry pass.
//!
//! Each locally held name under the DODAG prefix gets a slot with a retry
//! budget. A pass advertises every slot that still has budget; a slot that
//! runs dry means the parent is not pulling our content, so the node goes
//! looking for another one.

use log::debug;
use rust_compas_common::ndn::Name;

/// The parent pulled this name; stop advertising it.
pub const NAM_REQUESTED: u8 = 0x01;

#[derive(Debug, Clone, PartialEq, Eq, Default)]
pub struct NamEntry {
    pub name: Name,
    pub in_use: bool,
    pub retries: u32,
    pub flags: u8,
}

impl NamEntry {
    pub fn is_requested(&self) -> bool {
        self.flags & NAM_REQUESTED != 0
    }
}

/// Fixed number of slots, at most one per name.
#[derive(Debug, Clone)]
pub struct NamCache {
    slots: Vec<NamEntry>,
}

impl NamCache {
    pub fn new(capacity: usize) -> Self {
        Self {
            slots: vec![NamEntry::default(); capacity],
        }
    }

    /// Start advertising `name`. Returns false when every slot is taken.
    ///
    /// A name already present keeps its slot and state.
    pub fn add(&mut self, name: &Name, retries: u32) -> bool {
        if self.get(name).is_some() {
            return true;
        }
        match self.slots.iter_mut().find(|s| !s.in_use) {
            Some(slot) => {
                *slot = NamEntry {
                    name: name.clone(),
                    in_use: true,
                    retries,
                    flags: 0,
                };
                true
            }
            None => {
                debug!("[COMPAS] NAM cache full, not advertising {}", name);
                false
            }
        }
    }

    pub fn get(&self, name: &Name) -> Option<&NamEntry> {
        self.slots.iter().find(|s| s.in_use && &s.name == name)
    }

    pub fn get_mut(&mut self, name: &Name) -> Option<&mut NamEntry> {
        self.slots.iter_mut().find(|s| s.in_use && &s.name == name)
    }

    /// Mark `name` as pulled by the parent.
    pub fn mark_requested(&mut self, name: &Name) -> bool {
        match self.get_mut(name) {
            Some(entry) => {
                entry.flags |= NAM_REQUESTED;
                true
            }
            None => false,
        }
    }

    pub fn clear(&mut self, name: &Name) {
        if let Some(entry) = self.get_mut(name) {
            *entry = NamEntry::default();
        }
    }

    pub fn entries(&self) -> impl Iterator<Item = &NamEntry> {
        self.slots.iter().filter(|s| s.in_use)
    }

    /// Names the parent has not pulled yet.
    pub fn unrequested(&self) -> Vec<Name> {
        self.entries()
            .filter(|e| !e.is_requested())
            .map(|e| e.name.clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.entries().count()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn capacity(&self) -> usize {
        self.slots.len()
    }
}

/// What one pass decided.
#[derive(Debug, Default, PartialEq, Eq)]
pub struct NamPass {
    /// Names to advertise now, with the budget left after this attempt.
    pub send: Vec<(Name, u32)>,
    /// Slots dropped because their content is gone.
    pub cleared: Vec<Name>,
    /// Slot whose budget ran out; the pass stopped there.
    pub exhausted: Option<Name>,
    /// Whether another pass is needed.
    pub more: bool,
}

/// Walk the cache once.
///
/// For each slot in use: content gone, drop the slot; already requested,
/// skip; budget left, spend one attempt. A slot at zero budget (after the
/// attempt, or already) is refilled to `max_retries` and ends the pass.
pub fn run_pass(cache: &mut NamCache, max_retries: u32, has_content: impl Fn(&Name) -> bool) -> NamPass {
    let mut pass = NamPass::default();

    for slot in cache.slots.iter_mut().filter(|s| s.in_use) {
        if !has_content(&slot.name) {
            pass.cleared.push(slot.name.clone());
            *slot = NamEntry::default();
            continue;
        }
        if slot.is_requested() {
            continue;
        }
        if slot.retries > 0 {
            slot.retries -= 1;
            pass.send.push((slot.name.clone(), slot.retries));
            pass.more = true;
        }
        if slot.retries == 0 {
            slot.retries = max_retries;
            pass.exhausted = Some(slot.name.clone());
            pass.more = false;
            break;
        }
    }

    pass
}
