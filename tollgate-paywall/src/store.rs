//! In-memory per-wallet usage counters.
//!
//! For details, see the [`SessionStore`] struct documentation.

use std::{
    sync::Arc,
    time::{Duration, Instant},
};

use dashmap::DashMap;
use serde::Serialize;
use tollgate_core::types::WalletKey;

#[derive(Debug)]
struct WalletUsageRecord {
    click_count: u64,
    swap_locked: bool,
    failure_count: u32,
    total_top_ups: u64,
    last_seen: Instant,
}

impl Default for WalletUsageRecord {
    fn default() -> Self {
        WalletUsageRecord {
            click_count: 0,
            swap_locked: false,
            failure_count: 0,
            total_top_ups: 0,
            last_seen: Instant::now(),
        }
    }
}

/// Point-in-time copy of a wallet's counters.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletUsage {
    /// Requests served since the last successful top-up.
    pub click_count: u64,
    /// Whether a payment agent call is outstanding for the wallet.
    pub swap_locked: bool,
    /// Consecutive top-up failures since the last success.
    pub failure_count: u32,
    /// Successful top-ups, mirrored from the external ledger.
    pub total_top_ups: u64,
}

impl From<&WalletUsageRecord> for WalletUsage {
    fn from(record: &WalletUsageRecord) -> Self {
        WalletUsage {
            click_count: record.click_count,
            swap_locked: record.swap_locked,
            failure_count: record.failure_count,
            total_top_ups: record.total_top_ups,
        }
    }
}

/// Thread-safe usage counters keyed by [`WalletKey`].
///
/// The store is a cheap handle: clones share the same records. Records are created on
/// first write and synchronized per shard, so unrelated wallets rarely contend. Every
/// operation is a single short critical section and never waits on a payment call.
///
/// The swap lock is the at-most-one-in-flight guard for payment agent calls. Acquire it
/// with [`try_swap_guard`](SessionStore::try_swap_guard) so it is released on every exit
/// path, including panics and dropped futures.
#[derive(Debug, Clone, Default)]
pub struct SessionStore {
    records: Arc<DashMap<WalletKey, WalletUsageRecord>>,
}

impl SessionStore {
    pub fn new() -> Self {
        Self::default()
    }

    fn touch<T>(&self, wallet: &WalletKey, f: impl FnOnce(&mut WalletUsageRecord) -> T) -> T {
        if let Some(mut record) = self.records.get_mut(wallet) {
            record.last_seen = Instant::now();
            return f(&mut record);
        }

        let mut record = self.records.entry(wallet.clone()).or_default();
        record.last_seen = Instant::now();
        f(&mut record)
    }

    fn read<T>(&self, wallet: &WalletKey, f: impl FnOnce(&WalletUsageRecord) -> T) -> Option<T> {
        self.records.get(wallet).map(|record| f(&record))
    }

    /// Atomically increment the click count, returning the new value.
    pub fn increment_clicks(&self, wallet: &WalletKey) -> u64 {
        self.touch(wallet, |r| {
            r.click_count += 1;
            r.click_count
        })
    }

    pub fn clicks(&self, wallet: &WalletKey) -> u64 {
        self.read(wallet, |r| r.click_count).unwrap_or_default()
    }

    /// Only call after a confirmed successful top-up.
    pub fn reset_clicks(&self, wallet: &WalletKey) {
        self.touch(wallet, |r| r.click_count = 0)
    }

    /// Lock the wallet for a payment call if it is not locked already.
    ///
    /// Check and set happen in one critical section. Returns `false` immediately when
    /// another call holds the lock.
    pub fn try_acquire_swap_lock(&self, wallet: &WalletKey) -> bool {
        self.touch(wallet, |r| {
            if r.swap_locked {
                false
            } else {
                r.swap_locked = true;
                true
            }
        })
    }

    pub fn release_swap_lock(&self, wallet: &WalletKey) {
        if let Some(mut record) = self.records.get_mut(wallet) {
            record.swap_locked = false;
        }
    }

    /// Like [`try_acquire_swap_lock`](SessionStore::try_acquire_swap_lock), but the lock
    /// is held by the returned guard and released when it drops.
    pub fn try_swap_guard(&self, wallet: &WalletKey) -> Option<SwapGuard> {
        self.try_acquire_swap_lock(wallet).then(|| SwapGuard {
            store: self.clone(),
            wallet: wallet.clone(),
        })
    }

    pub fn is_swap_locked(&self, wallet: &WalletKey) -> bool {
        self.read(wallet, |r| r.swap_locked).unwrap_or_default()
    }

    pub fn increment_failures(&self, wallet: &WalletKey) -> u32 {
        self.touch(wallet, |r| {
            r.failure_count = r.failure_count.saturating_add(1);
            r.failure_count
        })
    }

    pub fn reset_failures(&self, wallet: &WalletKey) {
        self.touch(wallet, |r| r.failure_count = 0)
    }

    pub fn failures(&self, wallet: &WalletKey) -> u32 {
        self.read(wallet, |r| r.failure_count).unwrap_or_default()
    }

    pub fn is_max_failures_reached(&self, wallet: &WalletKey, threshold: u32) -> bool {
        self.failures(wallet) >= threshold
    }

    pub fn increment_total_top_ups(&self, wallet: &WalletKey) -> u64 {
        self.touch(wallet, |r| {
            r.total_top_ups += 1;
            r.total_top_ups
        })
    }

    pub fn total_top_ups(&self, wallet: &WalletKey) -> u64 {
        self.read(wallet, |r| r.total_top_ups).unwrap_or_default()
    }

    /// Snapshot of the wallet's counters. Unknown wallets read as all zeroes.
    pub fn usage(&self, wallet: &WalletKey) -> WalletUsage {
        self.read(wallet, |r| WalletUsage::from(r)).unwrap_or_default()
    }

    /// Drop records untouched for longer than `max_idle`.
    ///
    /// Records with an outstanding payment call or with failures are kept: evicting them
    /// would break the swap lock or silently close the circuit breaker.
    /// Returns the number of removed records.
    pub fn evict_idle(&self, max_idle: Duration) -> usize {
        let mut removed = 0;
        self.records.retain(|_, r| {
            let keep = r.swap_locked || r.failure_count > 0 || r.last_seen.elapsed() <= max_idle;
            if !keep {
                removed += 1;
            }
            keep
        });
        removed
    }

    pub fn len(&self) -> usize {
        self.records.len()
    }

    pub fn is_empty(&self) -> bool {
        self.records.is_empty()
    }
}

/// Holds a wallet's swap lock; releases it on drop.
#[must_use = "the swap lock is released as soon as the guard is dropped"]
#[derive(Debug)]
pub struct SwapGuard {
    store: SessionStore,
    wallet: WalletKey,
}

impl SwapGuard {
    pub fn wallet(&self) -> &WalletKey {
        &self.wallet
    }
}

impl Drop for SwapGuard {
    fn drop(&mut self) {
        self.store.release_swap_lock(&self.wallet);
    }
}

#[cfg(test)]
mod tests {
    use std::{
        panic::AssertUnwindSafe,
        sync::atomic::{AtomicUsize, Ordering},
        time::Duration,
    };

    use tollgate_core::types::WalletKey;

    use super::{SessionStore, WalletUsage};

    #[test]
    fn test_counters_share_normalized_key() {
        let store = SessionStore::new();
        store.increment_clicks(&WalletKey::new("0xABC"));
        store.increment_clicks(&WalletKey::new("0xabc"));
        assert_eq!(store.clicks(&WalletKey::new("0xAbc")), 2);
        assert_eq!(store.len(), 1);
    }

    #[test]
    fn test_reads_do_not_create_records() {
        let store = SessionStore::new();
        let wallet = WalletKey::new("0xabc");
        assert_eq!(store.usage(&wallet), WalletUsage::default());
        assert!(!store.is_swap_locked(&wallet));
        assert!(store.is_empty());
    }

    #[test]
    fn test_swap_lock_is_test_and_set() {
        let store = SessionStore::new();
        let wallet = WalletKey::new("0xabc");

        assert!(store.try_acquire_swap_lock(&wallet));
        assert!(!store.try_acquire_swap_lock(&wallet));
        assert!(store.is_swap_locked(&wallet));

        store.release_swap_lock(&wallet);
        assert!(!store.is_swap_locked(&wallet));
        assert!(store.try_acquire_swap_lock(&wallet));
    }

    #[test]
    fn test_swap_lock_is_per_wallet() {
        let store = SessionStore::new();
        assert!(store.try_acquire_swap_lock(&WalletKey::new("0xaaa")));
        assert!(store.try_acquire_swap_lock(&WalletKey::new("0xbbb")));
    }

    #[test]
    fn test_guard_releases_on_drop_and_panic() {
        let store = SessionStore::new();
        let wallet = WalletKey::new("0xabc");

        {
            let guard = store.try_swap_guard(&wallet).unwrap();
            assert_eq!(guard.wallet(), &wallet);
            assert!(store.try_swap_guard(&wallet).is_none());
        }
        assert!(!store.is_swap_locked(&wallet));

        let panicking = store.clone();
        let key = wallet.clone();
        let result = std::panic::catch_unwind(AssertUnwindSafe(move || {
            let _guard = panicking.try_swap_guard(&key).unwrap();
            panic!("payment call blew up");
        }));
        assert!(result.is_err());
        assert!(!store.is_swap_locked(&wallet));
    }

    #[test]
    fn test_concurrent_lock_admits_exactly_one() {
        let store = SessionStore::new();
        let wallet = WalletKey::new("0xabc");
        let winners = AtomicUsize::new(0);

        std::thread::scope(|s| {
            for _ in 0..16 {
                s.spawn(|| {
                    if store.try_acquire_swap_lock(&wallet) {
                        winners.fetch_add(1, Ordering::SeqCst);
                    }
                });
            }
        });

        assert_eq!(winners.load(Ordering::SeqCst), 1);
    }

    #[test]
    fn test_concurrent_increments_are_atomic() {
        let store = SessionStore::new();
        let wallet = WalletKey::new("0xabc");

        std::thread::scope(|s| {
            for _ in 0..8 {
                s.spawn(|| {
                    for _ in 0..500 {
                        store.increment_clicks(&wallet);
                    }
                });
            }
        });

        assert_eq!(store.clicks(&wallet), 4000);
    }

    #[test]
    fn test_failure_and_top_up_counters() {
        let store = SessionStore::new();
        let wallet = WalletKey::new("0xabc");

        assert_eq!(store.increment_failures(&wallet), 1);
        assert_eq!(store.increment_failures(&wallet), 2);
        assert!(store.is_max_failures_reached(&wallet, 2));
        assert!(!store.is_max_failures_reached(&wallet, 3));
        store.reset_failures(&wallet);
        assert_eq!(store.failures(&wallet), 0);

        assert_eq!(store.increment_total_top_ups(&wallet), 1);
        assert_eq!(store.total_top_ups(&wallet), 1);
    }

    #[test]
    fn test_evict_idle_keeps_locked_and_failing_wallets() {
        let store = SessionStore::new();
        let idle = WalletKey::new("0x111");
        let locked = WalletKey::new("0x222");
        let failing = WalletKey::new("0x333");

        store.increment_clicks(&idle);
        assert!(store.try_acquire_swap_lock(&locked));
        store.increment_failures(&failing);

        std::thread::sleep(Duration::from_millis(10));
        let fresh = WalletKey::new("0x444");
        store.increment_clicks(&fresh);

        assert_eq!(store.evict_idle(Duration::from_millis(5)), 1);
        assert_eq!(store.clicks(&idle), 0);
        assert!(store.is_swap_locked(&locked));
        assert_eq!(store.failures(&failing), 1);
        assert_eq!(store.clicks(&fresh), 1);
        assert_eq!(store.len(), 3);
    }
}
