//! Trickle timer (RFC 6206) driving PAM broadcasts.
//!
//! Each interval `I` has one transmission point `t` drawn from `[I/2, I)`.
//! At `t` the node transmits unless it already heard `k` consistent
//! messages this interval. At the end of the interval `I` doubles, up to
//! `imin * 2^doublings`. An inconsistency shrinks `I` back to `imin`.

use std::time::Duration;
use tokio::time::Instant;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TrickleTick {
    /// Transmission point reached and not suppressed.
    Transmit,
    /// Transmission point reached but enough neighbours already spoke.
    Suppressed,
    /// A new interval began.
    IntervalEnd,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
enum Phase {
    BeforeFire,
    AfterFire,
}

#[derive(Debug, Clone)]
pub struct Trickle {
    imin: Duration,
    imax: Duration,
    k: u32,
    interval: Duration,
    counter: u32,
    interval_start: Instant,
    fire_offset: Duration,
    phase: Phase,
    running: bool,
    rng: fastrand::Rng,
}

impl Trickle {
    pub fn new(imin: Duration, doublings: u32, k: u32, rng: fastrand::Rng) -> Self {
        let imax = imin
            .checked_mul(1u32.checked_shl(doublings).unwrap_or(u32::MAX))
            .unwrap_or(Duration::MAX);
        Self {
            imin,
            imax,
            k,
            interval: imin,
            counter: 0,
            interval_start: Instant::now(),
            fire_offset: imin,
            phase: Phase::BeforeFire,
            running: false,
            rng,
        }
    }

    /// Begin at the minimum interval. Returns the first deadline.
    pub fn start(&mut self, now: Instant) -> Instant {
        self.running = true;
        self.interval = self.imin;
        self.begin_interval(now)
    }

    pub fn stop(&mut self) {
        self.running = false;
    }

    pub fn is_running(&self) -> bool {
        self.running
    }

    /// Inconsistency heard. Returns a new deadline when the timer restarted;
    /// `None` when it was already at the minimum interval.
    pub fn reset(&mut self, now: Instant) -> Option<Instant> {
        if !self.running {
            return Some(self.start(now));
        }
        if self.interval == self.imin {
            return None;
        }
        self.interval = self.imin;
        Some(self.begin_interval(now))
    }

    /// A consistent message was heard.
    pub fn hear_consistent(&mut self) {
        self.counter = self.counter.saturating_add(1);
    }

    /// The deadline returned earlier has passed. Returns what happened and
    /// the next deadline.
    pub fn fire(&mut self, now: Instant) -> (TrickleTick, Instant) {
        match self.phase {
            Phase::BeforeFire => {
                self.phase = Phase::AfterFire;
                let tick = if self.counter < self.k {
                    TrickleTick::Transmit
                } else {
                    TrickleTick::Suppressed
                };
                (tick, self.interval_start + self.interval)
            }
            Phase::AfterFire => {
                self.interval = self
                    .interval
                    .checked_mul(2)
                    .unwrap_or(self.imax)
                    .min(self.imax);
                (TrickleTick::IntervalEnd, self.begin_interval(now))
            }
        }
    }

    pub fn interval(&self) -> Duration {
        self.interval
    }

    pub fn counter(&self) -> u32 {
        self.counter
    }

    fn begin_interval(&mut self, now: Instant) -> Instant {
        self.counter = 0;
        self.phase = Phase::BeforeFire;
        self.interval_start = now;

        let full = self.interval.as_millis() as u64;
        let half = full / 2;
        let offset = if full > half {
            self.rng.u64(half..full)
        } else {
            half
        };
        self.fire_offset = Duration::from_millis(offset);
        now + self.fire_offset
    }
}
