//! Forwarding information base: name prefix to next-hop faces.

use log::debug;
use rust_compas_common::{ndn::Name, types::FaceId};
use std::collections::BTreeMap;

#[derive(Debug, Default)]
pub struct Fib {
    routes: BTreeMap<Name, Vec<FaceId>>,
}

impl Fib {
    pub fn new() -> Self {
        Self::default()
    }

    /// Add `face` as a next hop for `prefix`. Returns false if it was already there.
    pub fn add_route(&mut self, prefix: Name, face: FaceId) -> bool {
        let faces = self.routes.entry(prefix.clone()).or_default();
        if faces.contains(&face) {
            return false;
        }
        faces.push(face);
        debug!("[FIB] {} -> {}", prefix, face);
        true
    }

    pub fn remove_route(&mut self, prefix: &Name, face: FaceId) -> bool {
        let Some(faces) = self.routes.get_mut(prefix) else {
            return false;
        };
        let before = faces.len();
        faces.retain(|f| *f != face);
        let removed = faces.len() != before;
        if faces.is_empty() {
            self.routes.remove(prefix);
        }
        removed
    }

    /// Drop every route through `face`.
    pub fn remove_face(&mut self, face: FaceId) {
        self.routes.retain(|_, faces| {
            faces.retain(|f| *f != face);
            !faces.is_empty()
        });
    }

    /// Longest-prefix match.
    pub fn lookup(&self, name: &Name) -> Option<(&Name, &[FaceId])> {
        (0..=name.len())
            .rev()
            .find_map(|len| self.routes.get_key_value(&name.prefix(len)))
            .map(|(prefix, faces)| (prefix, faces.as_slice()))
    }

    /// Every face some route points at.
    pub fn faces(&self) -> impl Iterator<Item = FaceId> + '_ {
        self.routes.values().flatten().copied()
    }

    pub fn len(&self) -> usize {
        self.routes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.routes.is_empty()
    }
}
