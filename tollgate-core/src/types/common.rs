//! Miscellaneous common types used throughout the Tollgate codebase.

use std::{
    fmt::Display,
    str::FromStr,
    time::{Duration, SystemTime, UNIX_EPOCH},
};

use serde::{Deserialize, Serialize};

/// A case-normalized wallet address, the sole identity used for usage bookkeeping.
///
/// Addresses are trimmed and lower-cased on every construction path (constructor,
/// [`FromStr`] and deserialization), so `0xABC` and `0xabc` always land on the same
/// counters.
///
/// ```
/// use tollgate_core::types::WalletKey;
///
/// let a = WalletKey::new(" 0xAbC ");
/// let b: WalletKey = "0xabc".parse().unwrap();
/// assert_eq!(a, b);
/// assert_eq!(a.as_str(), "0xabc");
///
/// let json = serde_json::to_value(&a).unwrap();
/// assert_eq!(json, serde_json::json!("0xabc"));
///
/// let c: WalletKey = serde_json::from_value(serde_json::json!("0XABC")).unwrap();
/// assert_eq!(a, c);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct WalletKey(String);

impl WalletKey {
    /// Normalize `address` without checking it. Untrusted input goes through
    /// [`str::parse`] or deserialization instead, which reject an empty address.
    pub fn new(address: impl AsRef<str>) -> Self {
        WalletKey(address.as_ref().trim().to_lowercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }
}

impl FromStr for WalletKey {
    type Err = crate::errors::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let key = WalletKey::new(s);
        if key.0.is_empty() {
            return Err(crate::errors::Error::ConfigError(
                "wallet address must not be empty".to_string(),
            ));
        }
        Ok(key)
    }
}

impl From<&str> for WalletKey {
    fn from(value: &str) -> Self {
        WalletKey::new(value)
    }
}

impl From<String> for WalletKey {
    fn from(value: String) -> Self {
        WalletKey::new(value)
    }
}

impl AsRef<str> for WalletKey {
    fn as_ref(&self) -> &str {
        &self.0
    }
}

impl Display for WalletKey {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl Serialize for WalletKey {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        serializer.serialize_str(&self.0)
    }
}

impl<'de> Deserialize<'de> for WalletKey {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        let s = String::deserialize(deserializer)?;
        s.parse().map_err(serde::de::Error::custom)
    }
}

/// Wall-clock timestamp in milliseconds since the unix epoch.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct UnixMillis(pub u64);

impl UnixMillis {
    /// The current wall-clock time.
    ///
    /// A clock set before the unix epoch reads as zero.
    pub fn now() -> Self {
        let elapsed = SystemTime::now()
            .duration_since(UNIX_EPOCH)
            .unwrap_or_default();
        UnixMillis(elapsed.as_millis() as u64)
    }

    /// Time elapsed from `earlier` to `self`, zero if `earlier` is in the future.
    pub fn saturating_since(self, earlier: UnixMillis) -> Duration {
        Duration::from_millis(self.0.saturating_sub(earlier.0))
    }

    pub fn checked_sub(self, duration: Duration) -> Option<UnixMillis> {
        self.0
            .checked_sub(duration.as_millis() as u64)
            .map(UnixMillis)
    }
}

impl Display for UnixMillis {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "{}", self.0)
    }
}
