//! Consecutive-failure circuit breaker.

use tollgate_core::types::WalletKey;

use crate::store::SessionStore;

/// Breaker state derived from a wallet's consecutive failure count.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BreakerState {
    /// No outstanding failures.
    Closed,
    /// Some top-ups failed but the threshold is not reached; retries continue.
    Degraded { failures: u32 },
    /// Threshold reached. Every request is hard-denied until [`FailureCircuitBreaker::reset`].
    Open { failures: u32 },
}

impl BreakerState {
    pub fn is_open(&self) -> bool {
        matches!(self, BreakerState::Open { .. })
    }
}

/// Counts consecutive top-up failures per wallet and opens once `max_failures` is reached.
///
/// There is no cooldown: an open breaker stays open until someone calls
/// [`reset`](FailureCircuitBreaker::reset). The counts live in the [`SessionStore`], so
/// every component sharing the store sees the same state.
#[derive(Debug, Clone)]
pub struct FailureCircuitBreaker {
    store: SessionStore,
    max_failures: u32,
}

impl FailureCircuitBreaker {
    pub fn new(store: SessionStore, max_failures: u32) -> Self {
        FailureCircuitBreaker {
            store,
            max_failures,
        }
    }

    pub fn max_failures(&self) -> u32 {
        self.max_failures
    }

    fn classify(&self, failures: u32) -> BreakerState {
        match failures {
            0 => BreakerState::Closed,
            n if n >= self.max_failures => BreakerState::Open { failures: n },
            n => BreakerState::Degraded { failures: n },
        }
    }

    pub fn state(&self, wallet: &WalletKey) -> BreakerState {
        self.classify(self.store.failures(wallet))
    }

    pub fn is_open(&self, wallet: &WalletKey) -> bool {
        self.store.is_max_failures_reached(wallet, self.max_failures)
    }

    /// Count a failed top-up and return the resulting state.
    pub fn record_failure(&self, wallet: &WalletKey) -> BreakerState {
        let state = self.classify(self.store.increment_failures(wallet));

        #[cfg(feature = "tracing")]
        if let BreakerState::Open { failures } = state {
            tracing::warn!("Circuit breaker opened: wallet='{wallet}', failures={failures}");
        }

        state
    }

    pub fn record_success(&self, wallet: &WalletKey) {
        self.store.reset_failures(wallet);
    }

    /// Manual reset; the only way out of [`BreakerState::Open`].
    pub fn reset(&self, wallet: &WalletKey) {
        #[cfg(feature = "tracing")]
        tracing::info!("Circuit breaker reset: wallet='{wallet}'");

        self.store.reset_failures(wallet);
    }
}
