//! Faces: one per (interface, peer address) pair the relay has talked to.
//!
//! Faces come and go with traffic. A face that carried nothing for the idle
//! timeout and that no table still refers to is aged out, and its id may
//! then be handed to a new peer. Ids of live faces are never reused.

use log::{debug, warn};
use rust_compas_common::{
    types::{FaceId, InterfaceId, LinkAddr, LOCAL_FACE},
    Error, Result,
};
use std::collections::HashMap;
use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Face {
    pub id: FaceId,
    pub iface: InterfaceId,
    pub peer: LinkAddr,
    /// Last frame received from or sent to the peer.
    pub last_used: Instant,
}

#[derive(Debug)]
pub struct FaceTable {
    faces: HashMap<FaceId, Face>,
    by_peer: HashMap<(InterfaceId, LinkAddr), FaceId>,
    next_id: u16,
    max_faces: usize,
}

impl Default for FaceTable {
    fn default() -> Self {
        Self::new(usize::from(u16::MAX))
    }
}

impl FaceTable {
    pub fn new(max_faces: usize) -> Self {
        Self {
            faces: HashMap::new(),
            by_peer: HashMap::new(),
            next_id: LOCAL_FACE.0 + 1,
            // LOCAL_FACE is never handed out
            max_faces: max_faces.min(usize::from(u16::MAX)),
        }
    }

    /// Face for `peer` on `iface`, created on first contact.
    pub fn get_or_create(&mut self, iface: InterfaceId, peer: &LinkAddr, now: Instant) -> Result<FaceId> {
        if let Some(id) = self.by_peer.get(&(iface, peer.clone())).copied() {
            self.touch(id, now);
            return Ok(id);
        }

        if self.is_full() {
            warn!("[Face] table full ({} faces), ignoring {} on {}", self.faces.len(), peer, iface);
            return Err(Error::FaceTableFull(self.faces.len()));
        }
        let id = self.allocate().ok_or(Error::FaceTableFull(self.faces.len()))?;

        self.faces.insert(
            id,
            Face {
                id,
                iface,
                peer: peer.clone(),
                last_used: now,
            },
        );
        self.by_peer.insert((iface, peer.clone()), id);
        debug!("[Face {}] created for {} on {}", id.0, peer, iface);
        Ok(id)
    }

    /// Next id not held by a live face.
    fn allocate(&mut self) -> Option<FaceId> {
        for _ in 0..u16::MAX {
            let candidate = FaceId(self.next_id);
            self.next_id = self.next_id.checked_add(1).unwrap_or(LOCAL_FACE.0 + 1);
            if !self.faces.contains_key(&candidate) {
                return Some(candidate);
            }
        }
        None
    }

    pub fn touch(&mut self, id: FaceId, now: Instant) {
        if let Some(face) = self.faces.get_mut(&id) {
            face.last_used = now;
        }
    }

    pub fn remove(&mut self, id: FaceId) -> Option<Face> {
        let face = self.faces.remove(&id)?;
        self.by_peer.remove(&(face.iface, face.peer.clone()));
        debug!("[Face {}] removed ({})", id.0, face.peer);
        Some(face)
    }

    /// Drop faces idle for at least `idle` that `in_use` does not claim.
    /// Returns the ids removed.
    pub fn age_out(&mut self, now: Instant, idle: Duration, in_use: impl Fn(FaceId) -> bool) -> Vec<FaceId> {
        let stale: Vec<FaceId> = self
            .faces
            .values()
            .filter(|f| now.saturating_duration_since(f.last_used) >= idle && !in_use(f.id))
            .map(|f| f.id)
            .collect();
        for id in &stale {
            self.remove(*id);
        }
        stale
    }

    pub fn find(&self, iface: InterfaceId, peer: &LinkAddr) -> Option<FaceId> {
        self.by_peer.get(&(iface, peer.clone())).copied()
    }

    pub fn get(&self, id: FaceId) -> Option<&Face> {
        self.faces.get(&id)
    }

    pub fn is_full(&self) -> bool {
        self.faces.len() >= self.max_faces
    }

    pub fn len(&self) -> usize {
        self.faces.len()
    }

    pub fn is_empty(&self) -> bool {
        self.faces.is_empty()
    }
}
