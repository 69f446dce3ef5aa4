//! Dedup ledger: remembers recently seen update ids so platform retries are acknowledged without
//! being dispatched twice.
//!
//! One mutex guards both the id map and the insertion-ordered eviction queue, so a check and a
//! record for the same id can never interleave. Eviction is amortized into `record` calls; there is
//! no background sweep.

use std::collections::{HashMap, VecDeque};
use std::sync::{Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use chrono::{DateTime, Utc};
use tracing::debug;

/// Default retention window: 24 hours.
pub const DEFAULT_RETENTION: Duration = Duration::from_secs(24 * 60 * 60);

#[derive(Debug, Default)]
struct LedgerState {
    /// id -> insertion time
    entries: HashMap<String, DateTime<Utc>>,
    /// (id, insertion time) in insertion order; stale pairs left by `forget` are skipped.
    order: VecDeque<(String, DateTime<Utc>)>,
}

impl LedgerState {
    fn is_live(&self, id: &str, now: DateTime<Utc>, retention: chrono::Duration) -> bool {
        self.entries
            .get(id)
            .is_some_and(|inserted| now - *inserted < retention)
    }

    fn evict_expired(&mut self, now: DateTime<Utc>, retention: chrono::Duration) -> usize {
        let mut evicted = 0;
        while let Some((_, inserted)) = self.order.front() {
            if now - *inserted < retention {
                break;
            }
            if let Some((id, inserted)) = self.order.pop_front() {
                if self.entries.get(&id) == Some(&inserted) {
                    self.entries.remove(&id);
                    evicted += 1;
                }
            }
        }
        evicted
    }

    fn insert(&mut self, id: &str, now: DateTime<Utc>) {
        self.entries.insert(id.to_string(), now);
        self.order.push_back((id.to_string(), now));
    }
}

/// Thread-safe set of recently seen update ids with a retention window.
#[derive(Debug)]
pub struct DedupLedger {
    state: Mutex<LedgerState>,
    retention: chrono::Duration,
}

impl DedupLedger {
    /// Creates an empty ledger. Retention beyond chrono's range is clamped to its maximum.
    pub fn new(retention: Duration) -> Self {
        Self {
            state: Mutex::new(LedgerState::default()),
            retention: chrono::Duration::from_std(retention).unwrap_or(chrono::Duration::MAX),
        }
    }

    pub fn retention(&self) -> Duration {
        self.retention.to_std().unwrap_or(Duration::MAX)
    }

    /// True when `id` was recorded within the retention window.
    pub fn seen(&self, id: &str) -> bool {
        self.seen_at(id, Utc::now())
    }

    /// Records `id` with the current time. Recording an id that is still live is a no-op.
    pub fn record(&self, id: &str) {
        self.record_at(id, Utc::now());
    }

    /// Checks and records `id` under one lock. Returns `true` when the id was newly recorded,
    /// `false` when it was already live (a duplicate).
    pub fn check_and_record(&self, id: &str) -> bool {
        self.check_and_record_at(id, Utc::now())
    }

    pub fn seen_at(&self, id: &str, now: DateTime<Utc>) -> bool {
        self.lock().is_live(id, now, self.retention)
    }

    pub fn record_at(&self, id: &str, now: DateTime<Utc>) {
        self.check_and_record_at(id, now);
    }

    pub fn check_and_record_at(&self, id: &str, now: DateTime<Utc>) -> bool {
        let mut state = self.lock();
        let evicted = state.evict_expired(now, self.retention);
        if evicted > 0 {
            debug!(evicted, remaining = state.entries.len(), "Dedup ledger evicted expired ids");
        }
        if state.is_live(id, now, self.retention) {
            return false;
        }
        state.insert(id, now);
        true
    }

    /// Removes `id` so the next delivery of it is processed. Returns whether it was present.
    pub fn forget(&self, id: &str) -> bool {
        // The matching `order` pair is skipped at eviction time because the timestamps differ.
        self.lock().entries.remove(id).is_some()
    }

    /// Number of ids currently held (including expired ids not yet evicted).
    pub fn len(&self) -> usize {
        self.lock().entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    fn lock(&self) -> MutexGuard<'_, LedgerState> {
        self.state.lock().unwrap_or_else(PoisonError::into_inner)
    }
}

impl Default for DedupLedger {
    fn default() -> Self {
        Self::new(DEFAULT_RETENTION)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::sync::Arc;

    fn at(secs: i64) -> DateTime<Utc> {
        DateTime::<Utc>::from_timestamp(1_700_000_000 + secs, 0).unwrap()
    }

    #[test]
    fn test_duplicate_within_window_is_suppressed() {
        let ledger = DedupLedger::default();
        assert!(ledger.check_and_record_at("upd-1", at(0)));
        assert!(!ledger.check_and_record_at("upd-1", at(1)));
        assert!(ledger.seen_at("upd-1", at(1)));
        assert_eq!(ledger.len(), 1);
    }

    #[test]
    fn test_id_reprocessable_after_retention() {
        let ledger = DedupLedger::default();
        assert!(ledger.check_and_record_at("upd-2", at(0)));
        let later = at(25 * 60 * 60);
        assert!(!ledger.seen_at("upd-2", later));
        assert!(ledger.check_and_record_at("upd-2", later));
        assert!(!ledger.check_and_record_at("upd-2", later));
    }

    #[test]
    fn test_record_evicts_expired_entries() {
        let ledger = DedupLedger::new(Duration::from_secs(10));
        ledger.record_at("a", at(0));
        ledger.record_at("b", at(5));
        assert_eq!(ledger.len(), 2);

        ledger.record_at("c", at(12));
        assert_eq!(ledger.len(), 2);
        assert!(!ledger.seen_at("a", at(12)));
        assert!(ledger.seen_at("b", at(12)));
    }

    #[test]
    fn test_duplicate_record_is_noop() {
        let ledger = DedupLedger::new(Duration::from_secs(10));
        ledger.record_at("a", at(0));
        ledger.record_at("a", at(8));
        // Insertion time is not refreshed by the duplicate record.
        assert!(!ledger.seen_at("a", at(10)));
    }

    #[test]
    fn test_forget_allows_reprocessing() {
        let ledger = DedupLedger::new(Duration::from_secs(10));
        assert!(ledger.check_and_record_at("a", at(0)));
        assert!(ledger.forget("a"));
        assert!(!ledger.forget("a"));
        assert!(ledger.check_and_record_at("a", at(3)));

        // The stale order pair from the first insert must not evict the re-recorded id.
        ledger.record_at("b", at(11));
        assert!(ledger.seen_at("a", at(11)));
    }

    #[test]
    fn test_concurrent_check_and_record_admits_one() {
        let ledger = Arc::new(DedupLedger::default());
        let admitted = Arc::new(AtomicUsize::new(0));

        let handles: Vec<_> = (0..16)
            .map(|_| {
                let ledger = ledger.clone();
                let admitted = admitted.clone();
                std::thread::spawn(move || {
                    if ledger.check_and_record("same-id") {
                        admitted.fetch_add(1, Ordering::SeqCst);
                    }
                })
            })
            .collect();
        for handle in handles {
            handle.join().unwrap();
        }

        assert_eq!(admitted.load(Ordering::SeqCst), 1);
    }
}
