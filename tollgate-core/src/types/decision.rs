//! The outcome of evaluating a single request against a wallet's usage.

use std::fmt::Display;

/// Per-request access decision.
///
/// Callers only ever see one of these four variants; failures inside payment calls
/// are folded into counters before a decision is produced.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum AccessDecision {
    /// The request proceeds.
    Granted,
    /// The wallet hit the hard click limit and the recovery top-up failed ("payment required").
    Blocked(String),
    /// Recent top-ups failed; an automatic top-up will be retried. Carries the consecutive failure count.
    RetryPending(u32),
    /// Too many consecutive failures; access stays denied until a manual reset.
    HardDenied(u32),
}

impl AccessDecision {
    pub fn is_granted(&self) -> bool {
        matches!(self, AccessDecision::Granted)
    }

    pub fn blocked(reason: impl Display) -> Self {
        AccessDecision::Blocked(reason.to_string())
    }

    /// Consecutive failure count carried by the decision, if any.
    pub fn failure_count(&self) -> Option<u32> {
        match self {
            AccessDecision::RetryPending(n) | AccessDecision::HardDenied(n) => Some(*n),
            _ => None,
        }
    }
}

impl Display for AccessDecision {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            AccessDecision::Granted => write!(f, "granted"),
            AccessDecision::Blocked(reason) => write!(f, "blocked: {reason}"),
            AccessDecision::RetryPending(n) => write!(f, "retry pending after {n} failure(s)"),
            AccessDecision::HardDenied(n) => write!(f, "hard denied after {n} failure(s)"),
        }
    }
}
