//! HTTP gate combining TTL enforcement and per-request access control.
//!
//! For details, see the [`Gate`] struct documentation.

use std::sync::Arc;

use http::{HeaderMap, HeaderValue, Request, Response, header, header::InvalidHeaderValue};
use serde::Serialize;
use tollgate_core::{
    agent::PaymentAgent,
    config::GateConfig,
    errors::Result as CoreResult,
    ledger::{TierOracle, TopUpTier},
    token::{BrowseSessionToken, TokenCipher},
    types::{AccessDecision, UnixMillis, WalletKey},
};

use crate::{
    controller::AccessController,
    errors::ErrorResponse,
    store::{SessionStore, WalletUsage},
    ttl::{RechargeReport, TtlEnforcer},
};

/// Request extension inserted for requests the gate lets through.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct AccessGrant {
    pub wallet: WalletKey,
    pub user_id: Option<String>,
    /// Set when this request ran the TTL re-charge.
    pub recharge: Option<RechargeReport>,
}

/// Usage counters of a wallet together with the ledger's tier for its user.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct WalletReport {
    pub usage: WalletUsage,
    pub tier: TopUpTier,
}

/// A pay-as-you-go HTTP gate for wallet-identified browse sessions.
///
/// Clients present a sealed [`BrowseSessionToken`] in a cookie. Each request is metered
/// against the token's wallet, and the wallet is topped up through the [`PaymentAgent`]
/// when its click count crosses the configured batch threshold.
///
/// ## Building a Gate
///
/// ```rust,ignore
/// let gate = Gate::builder()
///     .agent(agent)
///     .cipher(TokenCipher::from_env()?)
///     .config(GateConfig::from_env()?)
///     .build()?;
/// ```
///
/// `build` fails when the configuration does not pass [`GateConfig::validate`].
/// `config` defaults to [`GateConfig::default`]. Pass `store` to share a
/// [`SessionStore`] with other components, for example an admin endpoint.
///
/// ## Request Flow
///
/// [`handle_request`](Gate::handle_request) performs these steps in order:
///
/// 1. **Read the session** from the cookie named by [`GateConfig::cookie_name`]. A missing
///    or unreadable token is answered with `401 Unauthorized`.
/// 2. **Enforce the TTL** ([`TtlEnforcer`]): an expired window seizes and refills the
///    wallet, then slides. The token is re-issued as `Set-Cookie` when it changed.
/// 3. **Evaluate** ([`AccessController`]): count the click and maybe top up.
/// 4. **Run the handler** on [`Granted`](AccessDecision::Granted), with an [`AccessGrant`]
///    extension on the request. Other decisions become an [`ErrorResponse`].
///
/// Clones share the store, the agent and the configuration.
pub struct Gate<A: PaymentAgent> {
    controller: AccessController<A>,
    ttl: Arc<TtlEnforcer<A>>,
    config: Arc<GateConfig>,
}

impl<A: PaymentAgent> Clone for Gate<A> {
    fn clone(&self) -> Self {
        Gate {
            controller: self.controller.clone(),
            ttl: self.ttl.clone(),
            config: self.config.clone(),
        }
    }
}

#[bon::bon]
impl<A: PaymentAgent> Gate<A> {
    #[builder]
    pub fn new(
        agent: A,
        cipher: TokenCipher,
        #[builder(default)] config: GateConfig,
        #[builder(default)] store: SessionStore,
    ) -> CoreResult<Self> {
        let agent = Arc::new(agent);
        Ok(Gate {
            controller: AccessController::new(agent.clone(), store.clone(), &config)?,
            ttl: Arc::new(TtlEnforcer::new(agent, store, cipher, &config)),
            config: Arc::new(config),
        })
    }

    pub fn config(&self) -> &GateConfig {
        &self.config
    }

    pub fn store(&self) -> &SessionStore {
        self.controller.store()
    }

    pub fn controller(&self) -> &AccessController<A> {
        &self.controller
    }

    pub fn ttl_enforcer(&self) -> &TtlEnforcer<A> {
        &self.ttl
    }

    /// Standard gate flow.
    ///
    /// Returns the handler's response, or the denial to send instead. Either way a
    /// re-issued session cookie is attached.
    pub async fn handle_request<Fun, Fut, Req, Res>(
        &self,
        mut request: Request<Req>,
        handler: Fun,
    ) -> Result<Response<Res>, ErrorResponse>
    where
        Fun: FnOnce(Request<Req>) -> Fut,
        Fut: Future<Output = Response<Res>>,
    {
        let sealed = cookie_value(request.headers(), &self.config.cookie_name);
        let Some(check) = self.ttl.enforce(sealed).await else {
            return Err(ErrorResponse::no_session());
        };

        let set_cookie = check
            .sealed_reissue(self.ttl.cipher())
            .map_err(|err| {
                ErrorResponse::server_error(format!("Failed to seal session token: {err}"))
            })?
            .map(|sealed| self.session_cookie(&sealed))
            .transpose()
            .map_err(|err| {
                ErrorResponse::server_error(format!("Invalid session cookie: {err}"))
            })?;

        let token = check.token;
        let decision = self
            .controller
            .evaluate(&token.wallet, token.payer_identity())
            .await;

        #[cfg(feature = "tracing")]
        tracing::debug!("Access decision: wallet='{}', decision={decision}", token.wallet);

        if let Some(denial) = ErrorResponse::from_decision(&decision, self.retry_after_secs()) {
            return Err(denial.with_cookie(set_cookie));
        }

        request.extensions_mut().insert(AccessGrant {
            wallet: token.wallet,
            user_id: token.user_id,
            recharge: check.recharge,
        });

        let mut response = handler(request).await;
        if let Some(cookie) = set_cookie {
            response.headers_mut().append(header::SET_COOKIE, cookie);
        }

        Ok(response)
    }

    /// Evaluate a request for an already-authenticated wallet, without a token.
    pub async fn evaluate(&self, wallet: &WalletKey, user_id: &str) -> AccessDecision {
        self.controller.evaluate(wallet, user_id).await
    }

    /// Seal a fresh session token for `wallet`, stamped now.
    pub fn issue_session(&self, wallet: WalletKey, user_id: Option<String>) -> CoreResult<String> {
        let token = BrowseSessionToken::new(wallet, user_id).issued_at(UnixMillis::now());
        self.ttl.cipher().seal(&token)
    }

    /// `Set-Cookie` value carrying a sealed session token.
    pub fn session_cookie(&self, sealed: &str) -> Result<HeaderValue, InvalidHeaderValue> {
        HeaderValue::try_from(format!(
            "{}={sealed}; Path=/; HttpOnly; SameSite=Lax",
            self.config.cookie_name
        ))
    }

    /// Manually close the wallet's circuit breaker after the cause has been fixed.
    pub fn reset_failures(&self, wallet: &WalletKey) {
        self.controller.breaker().reset(wallet);
    }

    pub fn usage(&self, wallet: &WalletKey) -> WalletUsage {
        self.store().usage(wallet)
    }

    pub async fn wallet_report<O: TierOracle>(
        &self,
        oracle: &O,
        wallet: &WalletKey,
        user_id: &str,
    ) -> Result<WalletReport, O::Error> {
        let tier = oracle.top_up_tier(user_id).await?;
        Ok(WalletReport {
            usage: self.usage(wallet),
            tier,
        })
    }

    /// Apply [`GateConfig::idle_eviction`]. Returns the number of dropped records, and is
    /// a no-op when eviction is not configured.
    pub fn evict_idle(&self) -> usize {
        let removed = self
            .config
            .idle_eviction
            .map(|max_idle| self.store().evict_idle(max_idle))
            .unwrap_or_default();

        #[cfg(feature = "tracing")]
        if removed > 0 {
            tracing::debug!("Evicted idle wallet records: count={removed}");
        }

        removed
    }

    fn retry_after_secs(&self) -> u64 {
        self.config.payment_timeout.as_secs().max(1)
    }
}

/// Value of the cookie `name` across all `Cookie` headers.
fn cookie_value<'h>(headers: &'h HeaderMap, name: &str) -> Option<&'h str> {
    headers
        .get_all(header::COOKIE)
        .iter()
        .filter_map(|h| h.to_str().ok())
        .flat_map(|h| h.split(';'))
        .filter_map(|pair| pair.trim().split_once('='))
        .find(|(key, _)| *key == name)
        .map(|(_, value)| value.trim())
        .filter(|value| !value.is_empty())
}
