//! Time-to-live enforcement for browse session tokens.
//!
//! A token whose window has aged past the TTL triggers a forced re-charge: the wallet's
//! balance is seized, immediately refilled, and the window slides to `now`. Sessions
//! that stay open therefore pay on a fixed cadence, and a leaked token is good for at
//! most one window of free browsing.

use std::{sync::Arc, time::Duration};

use tollgate_core::{
    agent::{PaymentAgent, SeizeRequest, TopUpRequest},
    config::GateConfig,
    errors::Result,
    token::{BrowseSessionToken, TokenCipher},
    types::{AmountValue, UnixMillis},
};

use crate::{
    breaker::FailureCircuitBreaker,
    controller::{seize_within, top_up_within},
    store::SessionStore,
};

/// What happened during a forced re-charge.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RechargeReport {
    pub seized: bool,
    pub refilled: bool,
}

/// Result of checking a request's session token.
#[derive(Debug, Clone)]
pub struct SessionCheck {
    pub token: BrowseSessionToken,
    /// The token changed and must be re-sealed onto the response.
    pub reissue: bool,
    /// Set when the TTL cycle ran on this request.
    pub recharge: Option<RechargeReport>,
}

impl SessionCheck {
    /// Seal the token if it needs to be re-issued.
    pub fn sealed_reissue(&self, cipher: &TokenCipher) -> Result<Option<String>> {
        self.reissue.then(|| cipher.seal(&self.token)).transpose()
    }
}

pub struct TtlEnforcer<A: PaymentAgent> {
    agent: Arc<A>,
    store: SessionStore,
    breaker: FailureCircuitBreaker,
    cipher: TokenCipher,
    ttl: Duration,
    top_up_amount: AmountValue,
    payment_timeout: Duration,
}

impl<A: PaymentAgent> TtlEnforcer<A> {
    pub fn new(
        agent: Arc<A>,
        store: SessionStore,
        cipher: TokenCipher,
        config: &GateConfig,
    ) -> Self {
        TtlEnforcer {
            agent,
            breaker: FailureCircuitBreaker::new(store.clone(), config.max_failures),
            store,
            cipher,
            ttl: config.session_ttl,
            top_up_amount: config.top_up_amount,
            payment_timeout: config.payment_timeout,
        }
    }

    pub fn cipher(&self) -> &TokenCipher {
        &self.cipher
    }

    pub async fn enforce(&self, sealed: Option<&str>) -> Option<SessionCheck> {
        self.enforce_at(sealed, UnixMillis::now()).await
    }

    /// Check a sealed token at `now`.
    ///
    /// Returns `None` when there is no usable session: the token is absent or fails to
    /// open. That is not an error; the caller decides how to treat anonymous requests.
    pub async fn enforce_at(
        &self,
        sealed: Option<&str>,
        now: UnixMillis,
    ) -> Option<SessionCheck> {
        let mut token = match self.cipher.open(sealed?) {
            Ok(token) => token,
            Err(_err) => {
                #[cfg(feature = "tracing")]
                tracing::debug!("Ignoring unreadable session token: {_err}");
                return None;
            }
        };

        let Some(age) = token.age_at(now) else {
            token.issued_at = Some(now);
            return Some(SessionCheck {
                token,
                reissue: true,
                recharge: None,
            });
        };

        if age <= self.ttl {
            return Some(SessionCheck {
                token,
                reissue: false,
                recharge: None,
            });
        }

        let recharge = self.recharge(&token).await;
        if recharge.is_some() {
            token.issued_at = Some(now);
        }

        Some(SessionCheck {
            reissue: recharge.is_some(),
            token,
            recharge,
        })
    }

    /// Seize then refill the token's wallet under its swap lock.
    ///
    /// Returns `None` when the cycle was skipped: the breaker is open, or another payment
    /// call holds the lock. The window is not slid in that case, so a later request retries.
    async fn recharge(&self, token: &BrowseSessionToken) -> Option<RechargeReport> {
        let wallet = &token.wallet;
        if self.breaker.is_open(wallet) {
            #[cfg(feature = "tracing")]
            tracing::debug!(
                "Session expired on a suspended wallet; skipping recharge: wallet='{wallet}'"
            );
            return None;
        }

        let Some(_guard) = self.store.try_swap_guard(wallet) else {
            #[cfg(feature = "tracing")]
            tracing::debug!(
                "Session expired during a top-up; deferring recharge: wallet='{wallet}'"
            );
            return None;
        };

        let user_id = token.payer_identity().to_string();

        #[cfg(feature = "tracing")]
        tracing::info!(
            "Session TTL elapsed; seizing and refilling: wallet='{wallet}', user='{user_id}'"
        );

        let seized = seize_within(
            self.agent.as_ref(),
            SeizeRequest {
                user_id: user_id.clone(),
                wallet: wallet.clone(),
            },
            self.payment_timeout,
        )
        .await
        .inspect_err(|_err| {
            #[cfg(feature = "tracing")]
            tracing::warn!("Seizure failed; refilling anyway: wallet='{wallet}': {_err}");
        })
        .is_ok();

        let refilled = top_up_within(
            self.agent.as_ref(),
            TopUpRequest {
                user_id,
                wallet: wallet.clone(),
                amount: self.top_up_amount,
            },
            self.payment_timeout,
        )
        .await
        .inspect_err(|_err| {
            #[cfg(feature = "tracing")]
            tracing::warn!("Refill after seizure failed: wallet='{wallet}': {_err}");
        })
        .is_ok();

        if refilled {
            self.store.increment_total_top_ups(wallet);
        }

        Some(RechargeReport { seized, refilled })
    }
}
