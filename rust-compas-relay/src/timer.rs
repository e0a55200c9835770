//! Cancellable one-shot timers keyed by token.
//!
//! Arming returns a [`TimerToken`]; cancelling the token or re-arming a slot
//! makes the old firing disappear. The relay worker sleeps until
//! [`Timers::next_deadline`] and then drains [`Timers::pop_due`].

use rust_compas_common::ndn::Name;
use std::cmp::Reverse;
use std::collections::{BinaryHeap, HashMap};
use tokio::time::Instant;

/// Handle to one armed timer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct TimerToken(u64);

/// What a timer means when it fires.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum TimerEvent {
    /// Resend the pending Interest for this name.
    PitRetransmit(Name),
    /// Lifetime of the pending Interest for this name ran out.
    PitLifetime(Name),
    /// Trickle point of the PAM timer.
    Pam,
    /// Next solicitation.
    Sol,
    /// Next NAM engine pass.
    Nam,
    /// No PAM heard from the parent in time.
    ParentTimeout,
    /// Sweep idle faces.
    FaceAgeing,
}

/// Cancelled entries tolerated in the heap before it is rebuilt.
const COMPACT_MIN_HEAP: usize = 64;

#[derive(Debug, Default)]
pub struct Timers {
    next_id: u64,
    heap: BinaryHeap<Reverse<(Instant, u64)>>,
    live: HashMap<u64, (Instant, TimerEvent)>,
}

impl Timers {
    pub fn new() -> Self {
        Self::default()
    }

    /// Arm a timer firing at `at`.
    pub fn arm(&mut self, at: Instant, event: TimerEvent) -> TimerToken {
        let id = self.next_id;
        self.next_id += 1;
        self.heap.push(Reverse((at, id)));
        self.live.insert(id, (at, event));
        TimerToken(id)
    }

    /// Cancel a timer. Returns false if it already fired or was cancelled.
    pub fn cancel(&mut self, token: TimerToken) -> bool {
        let removed = self.live.remove(&token.0).is_some();
        if removed && self.heap.len() >= COMPACT_MIN_HEAP && self.heap.len() > 2 * self.live.len() {
            self.compact();
        }
        removed
    }

    /// Drop every cancelled entry from the heap.
    fn compact(&mut self) {
        let live = &self.live;
        self.heap.retain(|Reverse((_, id))| live.contains_key(id));
    }

    /// Cancel whatever `slot` holds and leave it empty.
    pub fn cancel_slot(&mut self, slot: &mut Option<TimerToken>) {
        if let Some(token) = slot.take() {
            self.cancel(token);
        }
    }

    /// Replace the timer held in `slot` with a new one.
    pub fn rearm(&mut self, slot: &mut Option<TimerToken>, at: Instant, event: TimerEvent) {
        self.cancel_slot(slot);
        *slot = Some(self.arm(at, event));
    }

    pub fn is_armed(&self, token: TimerToken) -> bool {
        self.live.contains_key(&token.0)
    }

    pub fn deadline(&self, token: TimerToken) -> Option<Instant> {
        self.live.get(&token.0).map(|(at, _)| *at)
    }

    /// Number of live timers carrying `event`.
    pub fn armed(&self, event: &TimerEvent) -> usize {
        self.live.values().filter(|(_, e)| e == event).count()
    }

    pub fn len(&self) -> usize {
        self.live.len()
    }

    pub fn is_empty(&self) -> bool {
        self.live.is_empty()
    }

    /// Earliest live deadline.
    pub fn next_deadline(&mut self) -> Option<Instant> {
        self.discard_cancelled();
        self.heap.peek().map(|Reverse((at, _))| *at)
    }

    /// Take the earliest timer that is due at `now`.
    ///
    /// Timers with equal deadlines come out in the order they were armed.
    pub fn pop_due(&mut self, now: Instant) -> Option<(TimerToken, TimerEvent)> {
        self.discard_cancelled();
        let Reverse((at, id)) = *self.heap.peek()?;
        if at > now {
            return None;
        }
        self.heap.pop();
        self.live.remove(&id).map(|(_, event)| (TimerToken(id), event))
    }

    fn discard_cancelled(&mut self) {
        while let Some(Reverse((_, id))) = self.heap.peek() {
            if self.live.contains_key(id) {
                break;
            }
            self.heap.pop();
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::time::Duration;

    #[test]
    fn fires_in_deadline_then_arm_order() {
        let now = Instant::now();
        let mut timers = Timers::new();
        timers.arm(now + Duration::from_millis(20), TimerEvent::Nam);
        timers.arm(now + Duration::from_millis(10), TimerEvent::Sol);
        timers.arm(now + Duration::from_millis(10), TimerEvent::Pam);

        assert!(timers.pop_due(now).is_none());
        assert_eq!(timers.next_deadline(), Some(now + Duration::from_millis(10)));

        let later = now + Duration::from_millis(30);
        let order: Vec<TimerEvent> = std::iter::from_fn(|| timers.pop_due(later))
            .map(|(_, e)| e)
            .collect();
        assert_eq!(order, vec![TimerEvent::Sol, TimerEvent::Pam, TimerEvent::Nam]);
        assert!(timers.is_empty());
    }

    #[test]
    fn cancelled_timer_never_fires() {
        let now = Instant::now();
        let mut timers = Timers::new();
        let token = timers.arm(now, TimerEvent::Pam);
        assert!(timers.cancel(token));
        assert!(!timers.cancel(token));
        assert!(timers.pop_due(now).is_none());
        assert_eq!(timers.next_deadline(), None);
    }

    #[test]
    fn cancelled_entries_do_not_pile_up() {
        let now = Instant::now();
        let mut timers = Timers::new();
        let mut slot = None;
        let early = timers.arm(now + Duration::from_millis(1), TimerEvent::Pam);

        // a liveness timer pushed far ahead on every refresh
        for i in 0..1_000u64 {
            timers.rearm(&mut slot, now + Duration::from_secs(60 + i), TimerEvent::ParentTimeout);
        }

        assert_eq!(timers.len(), 2);
        assert!(timers.heap.len() <= 2 * COMPACT_MIN_HEAP);
        assert_eq!(timers.pop_due(now + Duration::from_millis(1)), Some((early, TimerEvent::Pam)));
        assert_eq!(timers.next_deadline(), Some(now + Duration::from_secs(60 + 999)));
    }

    #[test]
    fn rearm_replaces_previous_token() {
        let now = Instant::now();
        let mut timers = Timers::new();
        let mut slot = None;

        timers.rearm(&mut slot, now + Duration::from_millis(5), TimerEvent::Sol);
        let first = slot.unwrap();
        timers.rearm(&mut slot, now + Duration::from_millis(50), TimerEvent::Sol);

        assert!(!timers.is_armed(first));
        assert_eq!(timers.armed(&TimerEvent::Sol), 1);
        assert_eq!(timers.deadline(slot.unwrap()), Some(now + Duration::from_millis(50)));
        assert!(timers.pop_due(now + Duration::from_millis(10)).is_none());
    }
}
