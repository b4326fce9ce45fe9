//! Gate policy configuration.

use std::{str::FromStr, time::Duration};

use bon::Builder;

use crate::{
    errors::{Error, Result},
    types::AmountValue,
};

pub const DEFAULT_COOKIE_NAME: &str = "tollgate_session";

/// Policy constants and timeouts for the gate.
///
/// `batch_threshold` is the click count at which a background top-up is initiated,
/// `batch_limit` the count at which access is blocked until a top-up succeeds.
/// `batch_threshold < batch_limit` must hold, otherwise the blocking path is unreachable;
/// see [`GateConfig::validate`].
///
/// ```
/// use std::time::Duration;
/// use tollgate_core::config::GateConfig;
///
/// let config = GateConfig::builder()
///     .batch_threshold(5)
///     .batch_limit(20)
///     .session_ttl(Duration::from_secs(600))
///     .build();
///
/// assert_eq!(config.max_failures, 5);
/// assert!(config.validate().is_ok());
/// ```
#[derive(Builder, Debug, Clone, PartialEq, Eq)]
pub struct GateConfig {
    /// Click count at which a top-up is initiated in the background.
    #[builder(default = 10)]
    pub batch_threshold: u64,
    /// Click count at which access is blocked absent an in-flight top-up.
    #[builder(default = 25)]
    pub batch_limit: u64,
    /// Consecutive failures after which the wallet is hard-denied.
    #[builder(default = 5)]
    pub max_failures: u32,
    /// Maximum session token age before a forced seize-and-refill cycle.
    #[builder(default = Duration::from_secs(60 * 60))]
    pub session_ttl: Duration,
    /// Upper bound on a single payment agent call.
    #[builder(default = Duration::from_secs(30))]
    pub payment_timeout: Duration,
    /// Amount requested from the payment agent per top-up.
    #[builder(into, default = AmountValue(100))]
    pub top_up_amount: AmountValue,
    /// Name of the cookie carrying the sealed session token.
    #[builder(into, default = DEFAULT_COOKIE_NAME.to_string())]
    pub cookie_name: String,
    /// Evict wallet records untouched for this long. Disabled when unset.
    pub idle_eviction: Option<Duration>,
}

impl Default for GateConfig {
    fn default() -> Self {
        GateConfig::builder().build()
    }
}

impl GateConfig {
    /// Check the invariants between policy constants.
    pub fn validate(&self) -> Result<()> {
        if self.batch_threshold == 0 {
            return Err(Error::ConfigError("BATCH_THRESHOLD must be positive".into()));
        }
        if self.batch_threshold >= self.batch_limit {
            return Err(Error::ConfigError(format!(
                "BATCH_THRESHOLD ({}) must be lower than BATCH_LIMIT ({})",
                self.batch_threshold, self.batch_limit
            )));
        }
        if self.max_failures == 0 {
            return Err(Error::ConfigError("MAX_FAILURES must be positive".into()));
        }
        if self.session_ttl.is_zero() {
            return Err(Error::ConfigError("SESSION_TTL must be positive".into()));
        }
        if self.payment_timeout.is_zero() {
            return Err(Error::ConfigError("PAYMENT_TIMEOUT must be positive".into()));
        }
        if self.cookie_name.is_empty() {
            return Err(Error::ConfigError("SESSION_COOKIE must not be empty".into()));
        }
        Ok(())
    }

    /// Load configuration from environment variables, keeping defaults for unset ones.
    ///
    /// Durations are given in whole seconds.
    pub fn from_env() -> Result<Self> {
        Self::from_lookup(|key| std::env::var(key).ok())
    }

    /// Load configuration through an arbitrary variable lookup.
    pub fn from_lookup(lookup: impl Fn(&str) -> Option<String>) -> Result<Self> {
        let mut config = GateConfig::default();

        if let Some(v) = parse_var(&lookup, "BATCH_THRESHOLD")? {
            config.batch_threshold = v;
        }
        if let Some(v) = parse_var(&lookup, "BATCH_LIMIT")? {
            config.batch_limit = v;
        }
        if let Some(v) = parse_var(&lookup, "MAX_FAILURES")? {
            config.max_failures = v;
        }
        if let Some(secs) = parse_var(&lookup, "SESSION_TTL")? {
            config.session_ttl = Duration::from_secs(secs);
        }
        if let Some(secs) = parse_var(&lookup, "PAYMENT_TIMEOUT")? {
            config.payment_timeout = Duration::from_secs(secs);
        }
        if let Some(v) = parse_var(&lookup, "TOP_UP_AMOUNT")? {
            config.top_up_amount = v;
        }
        if let Some(name) = lookup("SESSION_COOKIE") {
            config.cookie_name = name.trim().to_string();
        }
        if let Some(secs) = parse_var(&lookup, "IDLE_EVICTION")? {
            config.idle_eviction = Some(Duration::from_secs(secs));
        }

        config.validate()?;

        #[cfg(feature = "tracing")]
        tracing::debug!("Loaded gate configuration: {config:?}");

        Ok(config)
    }
}

fn parse_var<T>(lookup: &impl Fn(&str) -> Option<String>, key: &str) -> Result<Option<T>>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    lookup(key)
        .map(|raw| {
            raw.trim()
                .parse::<T>()
                .map_err(|err| Error::ConfigError(format!("Invalid {key}={raw:?}: {err}")))
        })
        .transpose()
}
