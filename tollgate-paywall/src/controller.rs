//! Per-request click accounting and automatic top-ups.
//!
//! For details, see the [`AccessController`] struct documentation.

use std::{sync::Arc, time::Duration};

use tollgate_core::{
    agent::{
        PaymentAgent, SeizeOutcome, SeizeRequest, SeizeSuccess, TopUpOutcome, TopUpRequest,
        TopUpSuccess,
    },
    config::GateConfig,
    errors::Result as CoreResult,
    types::{AccessDecision, AmountValue, WalletKey},
};

use crate::{
    breaker::{BreakerState, FailureCircuitBreaker},
    errors::PaymentFailure,
    store::SessionStore,
};

/// Decides per request whether a wallet may proceed, and when to top it up.
///
/// ## Policy
///
/// 1. A wallet whose circuit breaker is open is [`HardDenied`](AccessDecision::HardDenied).
/// 2. A request that would bring the click count to `batch_limit` needs a top-up first.
///    If one is already in flight the request is granted as grace. Otherwise the caller
///    waits for a synchronous top-up: success resets the counters and the request
///    continues, failure returns [`Blocked`](AccessDecision::Blocked) (or
///    [`HardDenied`](AccessDecision::HardDenied) when it opens the breaker).
/// 3. The click is counted. On reaching `batch_threshold`, and every `batch_threshold`
///    clicks after that while no top-up has succeeded, a top-up is spawned in the
///    background. The request does not wait for it.
/// 4. A wallet with outstanding failures below `max_failures` gets
///    [`RetryPending`](AccessDecision::RetryPending); otherwise the request is granted.
///
/// Every payment call holds the wallet's swap lock, so at most one call per wallet is
/// in flight, and is bounded by `payment_timeout`. Payment calls run in their own task:
/// a caller that stops waiting does not cancel the call, and its outcome is still recorded.
pub struct AccessController<A: PaymentAgent> {
    agent: Arc<A>,
    store: SessionStore,
    breaker: FailureCircuitBreaker,
    batch_threshold: u64,
    batch_limit: u64,
    top_up_amount: AmountValue,
    payment_timeout: Duration,
}

impl<A: PaymentAgent> Clone for AccessController<A> {
    fn clone(&self) -> Self {
        AccessController {
            agent: self.agent.clone(),
            store: self.store.clone(),
            breaker: self.breaker.clone(),
            batch_threshold: self.batch_threshold,
            batch_limit: self.batch_limit,
            top_up_amount: self.top_up_amount,
            payment_timeout: self.payment_timeout,
        }
    }
}

impl<A: PaymentAgent> AccessController<A> {
    /// Fails when `config` does not pass [`GateConfig::validate`].
    pub fn new(agent: Arc<A>, store: SessionStore, config: &GateConfig) -> CoreResult<Self> {
        config.validate()?;
        Ok(AccessController {
            agent,
            breaker: FailureCircuitBreaker::new(store.clone(), config.max_failures),
            store,
            batch_threshold: config.batch_threshold,
            batch_limit: config.batch_limit,
            top_up_amount: config.top_up_amount,
            payment_timeout: config.payment_timeout,
        })
    }

    pub fn store(&self) -> &SessionStore {
        &self.store
    }

    pub fn breaker(&self) -> &FailureCircuitBreaker {
        &self.breaker
    }

    /// Evaluate one request for `wallet`, charging top-ups to `user_id`.
    pub async fn evaluate(&self, wallet: &WalletKey, user_id: &str) -> AccessDecision {
        if let BreakerState::Open { failures } = self.breaker.state(wallet) {
            return AccessDecision::HardDenied(failures);
        }

        if self.store.clicks(wallet) + 1 >= self.batch_limit {
            if let Some(decision) = self.recover(wallet, user_id).await {
                return decision;
            }
        }

        let clicks = self.store.increment_clicks(wallet);
        if self.is_trigger_point(clicks) {
            self.spawn_top_up(wallet, user_id);
        }

        match self.breaker.state(wallet) {
            BreakerState::Closed => AccessDecision::Granted,
            BreakerState::Degraded { failures } => AccessDecision::RetryPending(failures),
            BreakerState::Open { failures } => AccessDecision::HardDenied(failures),
        }
    }

    fn is_trigger_point(&self, clicks: u64) -> bool {
        clicks >= self.batch_threshold
            && (clicks - self.batch_threshold) % self.batch_threshold == 0
    }

    /// Synchronous top-up at the click limit.
    ///
    /// Returns `None` when the request may continue to click accounting.
    async fn recover(&self, wallet: &WalletKey, user_id: &str) -> Option<AccessDecision> {
        let Some(guard) = self.store.try_swap_guard(wallet) else {
            #[cfg(feature = "tracing")]
            tracing::debug!(
                "Click limit reached with top-up in flight; granting: wallet='{wallet}'"
            );
            return Some(AccessDecision::Granted);
        };

        let controller = self.clone();
        let owned_wallet = wallet.clone();
        let owned_user = user_id.to_string();
        let task = tokio::spawn(async move {
            let _guard = guard;
            controller.settle_top_up(&owned_wallet, &owned_user).await
        });
        let result = task.await.unwrap_or_else(|err| {
            Err(PaymentFailure::Agent(format!("top-up task failed: {err}")))
        });

        match result {
            Ok(_) => None,
            Err(failure) => Some(match self.breaker.state(wallet) {
                BreakerState::Open { failures } => AccessDecision::HardDenied(failures),
                _ => AccessDecision::blocked(failure),
            }),
        }
    }

    fn spawn_top_up(&self, wallet: &WalletKey, user_id: &str) {
        let Some(guard) = self.store.try_swap_guard(wallet) else {
            #[cfg(feature = "tracing")]
            tracing::debug!("Top-up already in flight; not triggering another: wallet='{wallet}'");
            return;
        };

        #[cfg(feature = "tracing")]
        tracing::debug!("Triggering background top-up: wallet='{wallet}', user='{user_id}'");

        let controller = self.clone();
        let wallet = wallet.clone();
        let user_id = user_id.to_string();
        tokio::spawn(async move {
            // Counters are updated before the guard releases the lock.
            let _guard = guard;
            let _ = controller.settle_top_up(&wallet, &user_id).await;
        });
    }

    /// Run one top-up and fold its outcome into the wallet's counters.
    ///
    /// The caller must hold the wallet's swap lock.
    async fn settle_top_up(
        &self,
        wallet: &WalletKey,
        user_id: &str,
    ) -> Result<TopUpSuccess, PaymentFailure> {
        let request = TopUpRequest {
            user_id: user_id.to_string(),
            wallet: wallet.clone(),
            amount: self.top_up_amount,
        };
        let result = top_up_within(self.agent.as_ref(), request, self.payment_timeout).await;

        match &result {
            Ok(_success) => {
                self.store.reset_clicks(wallet);
                self.breaker.record_success(wallet);
                let _total = self.store.increment_total_top_ups(wallet);

                #[cfg(feature = "tracing")]
                tracing::debug!(
                    "Top-up succeeded: wallet='{wallet}', reference='{}', total={_total}",
                    _success.reference
                );
            }
            Err(_failure) => {
                let _state = self.breaker.record_failure(wallet);

                #[cfg(feature = "tracing")]
                tracing::warn!("Top-up failed: wallet='{wallet}', state={_state:?}: {_failure}");
            }
        }

        result
    }
}

/// Call [`PaymentAgent::top_up`], folding rejections, agent errors and timeouts into
/// [`PaymentFailure`].
pub(crate) async fn top_up_within<A: PaymentAgent>(
    agent: &A,
    request: TopUpRequest,
    timeout: Duration,
) -> Result<TopUpSuccess, PaymentFailure> {
    match tokio::time::timeout(timeout, agent.top_up(request)).await {
        Ok(Ok(TopUpOutcome::Success(success))) => Ok(success),
        Ok(Ok(TopUpOutcome::Failed(rejected))) => {
            Err(PaymentFailure::Rejected(rejected.error_reason))
        }
        Ok(Err(err)) => Err(PaymentFailure::Agent(err.to_string())),
        Err(_) => Err(PaymentFailure::TimedOut(timeout)),
    }
}

/// Call [`PaymentAgent::seize`] with the same failure folding as [`top_up_within`].
pub(crate) async fn seize_within<A: PaymentAgent>(
    agent: &A,
    request: SeizeRequest,
    timeout: Duration,
) -> Result<SeizeSuccess, PaymentFailure> {
    match tokio::time::timeout(timeout, agent.seize(request)).await {
        Ok(Ok(SeizeOutcome::Success(success))) => Ok(success),
        Ok(Ok(SeizeOutcome::Failed(rejected))) => {
            Err(PaymentFailure::Rejected(rejected.error_reason))
        }
        Ok(Err(err)) => Err(PaymentFailure::Agent(err.to_string())),
        Err(_) => Err(PaymentFailure::TimedOut(timeout)),
    }
}
