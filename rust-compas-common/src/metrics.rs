//! Metrics collection for the forwarding node.
//!
//! Lock-free counters and gauges updated by the relay worker and read from
//! any thread holding a clone of the shared metrics.

use std::sync::atomic::{AtomicU64, Ordering};

/* ---------------------------------------------------------------- *
 * Simple Counter
 * ---------------------------------------------------------------- */

#[derive(Debug)]
pub struct Counter {
    value: AtomicU64,
}

impl Counter {
    pub fn new() -> Self {
        Self {
            value: AtomicU64::new(0),
        }
    }

    pub fn increment(&self) {
        self.value.fetch_add(1, Ordering::Relaxed);
    }

    pub fn add(&self, value: u64) {
        self.value.fetch_add(value, Ordering::Relaxed);
    }

    pub fn value(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

impl Default for Counter {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for Counter {
    fn clone(&self) -> Self {
        let c = Counter::new();
        c.value.store(self.value.load(Ordering::Relaxed), Ordering::Relaxed);
        c
    }
}

/* ---------------------------------------------------------------- *
 * Gauge
 * ---------------------------------------------------------------- */

#[derive(Debug)]
pub struct Gauge {
    value: AtomicU64,
}

impl Gauge {
    pub fn new() -> Self {
        Self {
            value: AtomicU64::new(0),
        }
    }

    pub fn set(&self, value: u64) {
        self.value.store(value, Ordering::Relaxed);
    }

    pub fn value(&self) -> u64 {
        self.value.load(Ordering::Relaxed)
    }
}

impl Default for Gauge {
    fn default() -> Self {
        Self::new()
    }
}

impl Clone for Histogram {
    fn clone(&self) -> Self {
        Self {
            buckets: self
                .buckets
                .iter()
                .map(|b| AtomicU64::new(b.load(Ordering::Relaxed)))
                .collect(),
            boundaries: self.boundaries.clone(),
            underflow: AtomicU64::new(self.underflow.load(Ordering::Relaxed)),
            overflow: AtomicU64::new(self.overflow.load(Ordering::Relaxed)),
            sum: AtomicU64::new(self.sum.load(Ordering::Relaxed)),
            count: AtomicU64::new(self.count.load(Ordering::Relaxed)),
        }
    }
}

impl Clone for Gauge {
    fn clone(&self) -> Self {
        let g = Gauge::new();
        g.value.store(self.value.load(Ordering::Relaxed), Ordering::Relaxed);
        g
    }
}

/* ---------------------------------------------------------------- *
 * Histogram
 * ---------------------------------------------------------------- */

#[derive(Debug)]
pub struct Histogram {
    buckets: Vec<AtomicU64>,
    boundaries: Vec<u64>,
    underflow: AtomicU64,
    overflow: AtomicU64,
    sum: AtomicU64,
    count: AtomicU64,
}

impl Histogram {
    pub fn new(boundaries: Vec<u64>) -> Self {
        let buckets = (0..boundaries.len())
            .map(|_| AtomicU64::new(0))
            .collect();

        Self {
            buckets,
            boundaries,
            underflow: AtomicU64::new(0),
            overflow: AtomicU64::new(0),
            sum: AtomicU64::new(0),
            count: AtomicU64::new(0),
        }
    }

    pub fn observe(&self, value: u64) {
        self.sum.fetch_add(value, Ordering::Relaxed);
        self.count.fetch_add(1, Ordering::Relaxed);

        match self.boundaries.first() {
            Some(&lowest) if value < lowest => {
                self.underflow.fetch_add(1, Ordering::Relaxed);
                return;
            }
            None => {
                self.overflow.fetch_add(1, Ordering::Relaxed);
                return;
            }
            _ => {}
        }

        let mut idx = self.boundaries.len();
        for (i, &b) in self.boundaries.iter().enumerate() {
            if value <= b {
                idx = i;
                break;
            }
        }

        if idx < self.buckets.len() {
            self.buckets[idx].fetch_add(1, Ordering::Relaxed);
        } else {
            self.overflow.fetch_add(1, Ordering::Relaxed);
        }
    }

    pub fn average(&self) -> f64 {
        let c = self.count.load(Ordering::Relaxed);
        if c == 0 {
            0.0
        } else {
            self.sum.load(Ordering::Relaxed) as f64 / c as f64
        }
    }

    pub fn counts(&self) -> Vec<(u64, u64)> {
        self.boundaries
            .iter()
            .zip(self.buckets.iter())
            .map(|(&b, bucket)| (b, bucket.load(Ordering::Relaxed)))
            .collect()
    }

    pub fn count(&self) -> u64 {
        self.count.load(Ordering::Relaxed)
    }
}

/* ---------------------------------------------------------------- *
 * Aggregate metrics for the relay
 * ---------------------------------------------------------------- */

#[derive(Debug, Clone)]
pub struct RelayMetrics {
    // Frame metrics
    pub frames_received: Counter,
    pub frames_dropped: Counter,
    pub frames_oversized: Counter,
    pub link_send_failures: Counter,

    // Interest metrics
    pub interests_received: Counter,
    pub interests_aggregated: Counter,
    pub interests_forwarded: Counter,
    pub interests_retransmitted: Counter,
    pub interests_timed_out: Counter,
    pub interests_satisfied: Counter,

    // Data metrics
    pub data_received: Counter,
    pub data_forwarded: Counter,
    pub data_unsolicited: Counter,

    // Cache metrics
    pub cs_hits: Counter,
    pub cs_misses: Counter,
    pub cs_inserts: Counter,
    pub cs_rejections: Counter,
    pub cs_evictions: Counter,
    pub cs_size: Gauge,

    // PIT metrics
    pub pit_size: Gauge,

    // Face metrics
    pub faces: Gauge,
    pub faces_aged_out: Counter,

    // COMPAS metrics
    pub pam_sent: Counter,
    pub pam_received: Counter,
    pub sol_sent: Counter,
    pub sol_received: Counter,
    pub nam_sent: Counter,
    pub nam_received: Counter,
    pub parent_timeouts: Counter,

    /// Time from issuing a local Interest to its satisfaction, in milliseconds.
    pub satisfaction_latency_ms: Histogram,
}

impl RelayMetrics {
    pub fn new() -> Self {
        Self {
            frames_received: Counter::new(),
            frames_dropped: Counter::new(),
            frames_oversized: Counter::new(),
            link_send_failures: Counter::new(),
            interests_received: Counter::new(),
            interests_aggregated: Counter::new(),
            interests_forwarded: Counter::new(),
            interests_retransmitted: Counter::new(),
            interests_timed_out: Counter::new(),
            interests_satisfied: Counter::new(),
            data_received: Counter::new(),
            data_forwarded: Counter::new(),
            data_unsolicited: Counter::new(),
            cs_hits: Counter::new(),
            cs_misses: Counter::new(),
            cs_inserts: Counter::new(),
            cs_rejections: Counter::new(),
            cs_evictions: Counter::new(),
            cs_size: Gauge::new(),
            pit_size: Gauge::new(),
            faces: Gauge::new(),
            faces_aged_out: Counter::new(),
            pam_sent: Counter::new(),
            pam_received: Counter::new(),
            sol_sent: Counter::new(),
            sol_received: Counter::new(),
            nam_sent: Counter::new(),
            nam_received: Counter::new(),
            parent_timeouts: Counter::new(),
            satisfaction_latency_ms: Histogram::new(vec![1, 5, 10, 50, 100, 500, 1_000, 5_000]),
        }
    }
}

impl Default for RelayMetrics {
    fn default() -> Self {
        Self::new()
    }
}
