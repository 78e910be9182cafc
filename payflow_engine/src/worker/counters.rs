use std::sync::atomic::{AtomicU64, Ordering};

use serde::Serialize;

/// Worker-side processing counters. Owned by the worker, bumped from its partition tasks and
/// snapshotted by the metrics timer.
#[derive(Debug, Default)]
pub struct Counters {
    events_processed: AtomicU64,
    duplicates_skipped: AtomicU64,
    payments_success: AtomicU64,
    payments_failed: AtomicU64,
    retried_events: AtomicU64,
    dlq_events: AtomicU64,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct CountersSnapshot {
    pub events_processed: u64,
    pub duplicates_skipped: u64,
    pub payments_success: u64,
    pub payments_failed: u64,
    pub retried_events: u64,
    pub dlq_events: u64,
}

impl Counters {
    pub fn event_processed(&self) {
        self.events_processed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn duplicate_skipped(&self) {
        self.duplicates_skipped.fetch_add(1, Ordering::Relaxed);
    }

    pub fn payment_success(&self) {
        self.payments_success.fetch_add(1, Ordering::Relaxed);
    }

    pub fn payment_failed(&self) {
        self.payments_failed.fetch_add(1, Ordering::Relaxed);
    }

    pub fn retry_scheduled(&self) {
        self.retried_events.fetch_add(1, Ordering::Relaxed);
    }

    pub fn event_dead_lettered(&self) {
        self.dlq_events.fetch_add(1, Ordering::Relaxed);
    }

    pub fn snapshot(&self) -> CountersSnapshot {
        CountersSnapshot {
            events_processed: self.events_processed.load(Ordering::Relaxed),
            duplicates_skipped: self.duplicates_skipped.load(Ordering::Relaxed),
            payments_success: self.payments_success.load(Ordering::Relaxed),
            payments_failed: self.payments_failed.load(Ordering::Relaxed),
            retried_events: self.retried_events.load(Ordering::Relaxed),
            dlq_events: self.dlq_events.load(Ordering::Relaxed),
        }
    }
}

#[cfg(test)]
mod test {
    use super::*;

    #[test]
    fn snapshot_reflects_increments() {
        let counters = Counters::default();
        counters.event_processed();
        counters.event_processed();
        counters.duplicate_skipped();
        counters.payment_success();
        counters.retry_scheduled();
        let snapshot = counters.snapshot();
        assert_eq!(snapshot.events_processed, 2);
        assert_eq!(snapshot.duplicates_skipped, 1);
        assert_eq!(snapshot.payments_success, 1);
        assert_eq!(snapshot.payments_failed, 0);
        assert_eq!(snapshot.retried_events, 1);
        assert_eq!(snapshot.dlq_events, 0);
    }

    #[test]
    fn snapshot_wire_names() {
        let json = serde_json::to_string(&Counters::default().snapshot()).unwrap();
        for key in
            ["eventsProcessed", "duplicatesSkipped", "paymentsSuccess", "paymentsFailed", "retriedEvents", "dlqEvents"]
        {
            assert!(json.contains(key), "missing {key} in {json}");
        }
    }
}
