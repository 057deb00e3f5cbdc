//! Counters shared between concurrent test tasks.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

#[derive(Debug, Default)]
pub struct Metrics {
    sent: AtomicU64,
    received: AtomicU64,
    errors: AtomicU64,
}

impl Metrics {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn record_sent(&self) {
        self.sent.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_received(&self) {
        self.received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_error(&self) {
        self.errors.fetch_add(1, Ordering::Relaxed);
    }

    pub fn sent(&self) -> u64 {
        self.sent.load(Ordering::Relaxed)
    }

    pub fn received(&self) -> u64 {
        self.received.load(Ordering::Relaxed)
    }

    pub fn errors(&self) -> u64 {
        self.errors.load(Ordering::Relaxed)
    }
}

/// Round-trip samples.
#[derive(Debug, Default)]
pub struct Latencies {
    samples: Mutex<Vec<Duration>>,
}

impl Latencies {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn record(&self, sample: Duration) {
        self.samples.lock().unwrap().push(sample);
    }

    pub fn len(&self) -> usize {
        self.samples.lock().unwrap().len()
    }

    /// Sample at percentile `p` (0-100), if any were recorded.
    pub fn percentile(&self, p: f64) -> Option<Duration> {
        let mut samples = self.samples.lock().unwrap().clone();
        if samples.is_empty() {
            return None;
        }
        samples.sort();
        let rank = ((p / 100.0) * (samples.len() - 1) as f64).round() as usize;
        samples.get(rank.min(samples.len() - 1)).copied()
    }
}
