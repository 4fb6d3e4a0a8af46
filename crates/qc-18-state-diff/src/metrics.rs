//! Metrics collection for the state diff subsystem

use std::sync::atomic::{AtomicU64, Ordering};

/// Counters for the dispatch loop and broadcaster
#[derive(Debug, Default)]
pub struct Metrics {
    /// Chain events accepted from the feed
    pub events_received: AtomicU64,

    /// Chain events fully handled, whatever the outcome
    pub events_processed: AtomicU64,

    /// Events discarded because nobody was subscribed
    pub events_skipped: AtomicU64,

    /// Diffs successfully built
    pub diffs_built: AtomicU64,

    /// Diffs suppressed as empty
    pub diffs_suppressed: AtomicU64,

    /// Payloads handed to the broadcaster
    pub payloads_broadcast: AtomicU64,

    /// Individual successful deliveries
    pub deliveries: AtomicU64,

    /// Subscribers evicted for stalled or closed sinks
    pub evictions: AtomicU64,

    /// Events dropped on a per-event failure
    pub processing_failures: AtomicU64,
}

impl Metrics {
    /// Create new metrics collector
    pub fn new() -> Self {
        Self::default()
    }

    pub fn record_event_received(&self) {
        self.events_received.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_event_processed(&self) {
        self.events_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_event_skipped(&self) {
        self.events_skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_diff_built(&self) {
        self.diffs_built.fetch_add(1, Ordering::Relaxed);
    }

    pub fn record_diff_suppressed(&self) {
        self.diffs_suppressed.fetch_add(1, Ordering::Relaxed);
    }

    /// Record one broadcast round
    pub fn record_broadcast(&self, delivered: usize, evicted: usize) {
        self.payloads_broadcast.fetch_add(1, Ordering::Relaxed);
        self.deliveries
            .fetch_add(delivered as u64, Ordering::Relaxed);
        self.evictions.fetch_add(evicted as u64, Ordering::Relaxed);
    }

    pub fn record_processing_failure(&self) {
        self.processing_failures.fetch_add(1, Ordering::Relaxed);
    }

    pub fn get_events_received(&self) -> u64 {
        self.events_received.load(Ordering::Relaxed)
    }

    pub fn get_events_processed(&self) -> u64 {
        self.events_processed.load(Ordering::Relaxed)
    }

    pub fn get_events_skipped(&self) -> u64 {
        self.events_skipped.load(Ordering::Relaxed)
    }

    pub fn get_diffs_built(&self) -> u64 {
        self.diffs_built.load(Ordering::Relaxed)
    }

    pub fn get_diffs_suppressed(&self) -> u64 {
        self.diffs_suppressed.load(Ordering::Relaxed)
    }

    pub fn get_payloads_broadcast(&self) -> u64 {
        self.payloads_broadcast.load(Ordering::Relaxed)
    }

    pub fn get_deliveries(&self) -> u64 {
        self.deliveries.load(Ordering::Relaxed)
    }

    pub fn get_evictions(&self) -> u64 {
        self.evictions.load(Ordering::Relaxed)
    }

    pub fn get_processing_failures(&self) -> u64 {
        self.processing_failures.load(Ordering::Relaxed)
    }
}
