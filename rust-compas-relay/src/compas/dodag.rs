//! DODAG membership state of this node.

use rust_compas_common::{
    ndn::Name,
    types::{FaceId, InterfaceId, LinkAddr},
};
use std::fmt;

use super::nam::NamCache;
use crate::timer::TimerToken;

/// Rank of a node that has not joined the DODAG.
pub const RANK_UNDEF: u16 = u16::MAX;

/// Rank of the DODAG root.
pub const ROOT_RANK: u16 = 1;

/// DODAG flag bits as carried in PAMs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Hash)]
pub struct DodagFlags(u8);

impl DodagFlags {
    pub const NONE: DodagFlags = DodagFlags(0);
    /// The node lost its parent and is looking for a new one.
    pub const FLOATING: DodagFlags = DodagFlags(0x01);

    pub fn from_bits(bits: u8) -> Self {
        Self(bits)
    }

    pub fn bits(self) -> u8 {
        self.0
    }

    pub fn contains(self, other: DodagFlags) -> bool {
        self.0 & other.0 == other.0
    }

    pub fn insert(&mut self, other: DodagFlags) {
        self.0 |= other.0;
    }

    pub fn remove(&mut self, other: DodagFlags) {
        self.0 &= !other.0;
    }
}

impl fmt::Display for DodagFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "0x{:02x}", self.0)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Parent {
    pub face: FaceId,
    pub iface: InterfaceId,
    pub addr: LinkAddr,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum DodagStatus {
    Unattached,
    Attached,
    Floating,
    Root,
}

/// Timers owned by the routing state machine.
#[derive(Debug, Default)]
pub(crate) struct DodagTimers {
    pub sol: Option<TimerToken>,
    pub pam: Option<TimerToken>,
    pub nam: Option<TimerToken>,
    pub parent_liveness: Option<TimerToken>,
}

#[derive(Debug)]
pub struct Dodag {
    pub rank: u16,
    pub flags: DodagFlags,
    /// Current parent, kept while floating as the solicitation target.
    pub parent: Option<Parent>,
    pub parent_timeout: bool,
    /// Prefix of the DODAG we belong to.
    pub prefix: Option<Name>,
    /// Consecutive solicitations since the last attachment.
    pub sol_count: u32,
    pub nam_cache: NamCache,
    pub(crate) timers: DodagTimers,
}

impl Dodag {
    pub fn new(nam_cache_size: usize) -> Self {
        Self {
            rank: RANK_UNDEF,
            flags: DodagFlags::NONE,
            parent: None,
            parent_timeout: false,
            prefix: None,
            sol_count: 0,
            nam_cache: NamCache::new(nam_cache_size),
            timers: DodagTimers::default(),
        }
    }

    pub fn status(&self) -> DodagStatus {
        if self.rank == ROOT_RANK {
            DodagStatus::Root
        } else if self.parent_timeout || self.flags.contains(DodagFlags::FLOATING) {
            DodagStatus::Floating
        } else if self.rank != RANK_UNDEF {
            DodagStatus::Attached
        } else {
            DodagStatus::Unattached
        }
    }

    pub fn is_root(&self) -> bool {
        self.rank == ROOT_RANK
    }

    pub fn is_attached(&self) -> bool {
        self.status() == DodagStatus::Attached
    }

    pub fn is_floating(&self) -> bool {
        self.status() == DodagStatus::Floating
    }

    pub fn parent_face(&self) -> Option<FaceId> {
        self.parent.as_ref().map(|p| p.face)
    }
}

/// A PAM sender under consideration as parent.
#[derive(Debug, Clone)]
pub struct Candidate<'a> {
    pub face: FaceId,
    pub addr: &'a LinkAddr,
    pub rank: u16,
    pub flags: DodagFlags,
}

/// What to do with a heard PAM.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ParentDecision {
    /// Make the sender our parent.
    Adopt,
    /// The sender is our parent; it is alive.
    Refresh,
    Ignore,
}

/// Route selection: decides whether a PAM sender becomes our parent.
pub trait ParentSelection: Send {
    fn evaluate(&mut self, dodag: &Dodag, candidate: &Candidate<'_>) -> ParentDecision;
}

/// Lowest rank wins.
///
/// Floating or unattached senders are never chosen. A node without a live
/// parent takes the first usable candidate; an attached node only moves to a
/// sender that would lower its own rank.
#[derive(Debug, Clone, Copy, Default)]
pub struct MinRankSelection;

impl ParentSelection for MinRankSelection {
    fn evaluate(&mut self, dodag: &Dodag, candidate: &Candidate<'_>) -> ParentDecision {
        if dodag.is_root() {
            return ParentDecision::Ignore;
        }
        if candidate.rank == RANK_UNDEF || candidate.flags.contains(DodagFlags::FLOATING) {
            return ParentDecision::Ignore;
        }
        if !dodag.is_attached() {
            return ParentDecision::Adopt;
        }
        if dodag.parent_face() == Some(candidate.face) {
            return ParentDecision::Refresh;
        }
        if candidate.rank.saturating_add(1) < dodag.rank {
            ParentDecision::Adopt
        } else {
            ParentDecision::Ignore
        }
    }
}
