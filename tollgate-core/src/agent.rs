//! The payment agent contract consumed by the engine.
//!
//! The engine never executes payments itself. It issues [`TopUpRequest`]s and
//! [`SeizeRequest`]s to a [`PaymentAgent`] and only looks at the outcome.

use serde::{Deserialize, Serialize};

use crate::types::{AmountValue, WalletKey};

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopUpRequest {
    /// Identity the payment rail knows the user by.
    pub user_id: String,
    pub wallet: WalletKey,
    pub amount: AmountValue,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct SeizeRequest {
    pub user_id: String,
    pub wallet: WalletKey,
}

#[derive(Debug, Clone)]
pub enum TopUpOutcome {
    Success(TopUpSuccess),
    Failed(PaymentRejected),
}

impl TopUpOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, TopUpOutcome::Success(_))
    }

    pub fn success(reference: impl Into<String>) -> Self {
        TopUpOutcome::Success(TopUpSuccess {
            reference: reference.into(),
        })
    }

    pub fn failed(error_reason: impl Into<String>) -> Self {
        TopUpOutcome::Failed(PaymentRejected {
            error_reason: error_reason.into(),
        })
    }

    pub fn as_success(&self) -> Option<&TopUpSuccess> {
        match self {
            TopUpOutcome::Success(v) => Some(v),
            _ => None,
        }
    }

    pub fn as_failed(&self) -> Option<&PaymentRejected> {
        match self {
            TopUpOutcome::Failed(v) => Some(v),
            _ => None,
        }
    }
}

/// A completed top-up.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TopUpSuccess {
    /// Opaque rail reference, e.g. a transaction hash.
    pub reference: String,
}

/// The rail refused or could not complete the operation.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PaymentRejected {
    pub error_reason: String,
}

#[derive(Debug, Clone)]
pub enum SeizeOutcome {
    Success(SeizeSuccess),
    Failed(PaymentRejected),
}

impl SeizeOutcome {
    pub fn is_success(&self) -> bool {
        matches!(self, SeizeOutcome::Success(_))
    }

    pub fn success(reference: Option<String>) -> Self {
        SeizeOutcome::Success(SeizeSuccess { reference })
    }

    pub fn failed(error_reason: impl Into<String>) -> Self {
        SeizeOutcome::Failed(PaymentRejected {
            error_reason: error_reason.into(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SeizeSuccess {
    pub reference: Option<String>,
}

/// Payment agent interface.
///
/// The `Err` channel is reserved for transport problems (the agent could not be
/// reached or answered garbage). A rail-level refusal is an `Ok` outcome carrying
/// [`PaymentRejected`]. The engine treats both, and a timeout, as one failed attempt.
///
/// Calls are retried by the engine on later requests without deduplication, so a
/// failed call must be safe to repeat.
pub trait PaymentAgent: Send + Sync + 'static {
    type Error: std::error::Error + Send + 'static;

    fn top_up(
        &self,
        request: TopUpRequest,
    ) -> impl Future<Output = Result<TopUpOutcome, Self::Error>> + Send;

    fn seize(
        &self,
        request: SeizeRequest,
    ) -> impl Future<Output = Result<SeizeOutcome, Self::Error>> + Send;
}
