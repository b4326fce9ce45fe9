//! Read-only view of the external pricing ledger.

use serde::{Deserialize, Serialize};

/// Pricing tier the ledger assigns to a user based on their top-up history.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct TopUpTier {
    pub tier: u32,
    /// Price multiplier applied by the rail for this tier.
    pub multiplier: u64,
}

/// Oracle for the pricing tier of a user. Tollgate never computes tiers itself.
pub trait TierOracle: Send + Sync {
    type Error: std::error::Error + Send + 'static;

    fn top_up_tier(
        &self,
        user_id: &str,
    ) -> impl Future<Output = Result<TopUpTier, Self::Error>> + Send;
}
