use crate::core::asset::AssetCode;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Which pass of the profit matching engine produced a record.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(into = "u8", try_from = "u8")]
pub enum MatchStage {
    /// Lots bought directly against the settlement asset.
    DirectPurchase = 1,
    /// Lots created by a fiat-to-fiat hop, carrying a settlement cost basis.
    ChainedExchange = 2,
    /// Fiat with no tracked cost basis (deposits); books zero profit.
    Untracked = 3,
}

impl From<MatchStage> for u8 {
    fn from(stage: MatchStage) -> Self {
        stage as u8
    }
}

impl TryFrom<u8> for MatchStage {
    type Error = String;

    fn try_from(value: u8) -> Result<Self, Self::Error> {
        match value {
            1 => Ok(MatchStage::DirectPurchase),
            2 => Ok(MatchStage::ChainedExchange),
            3 => Ok(MatchStage::Untracked),
            other => Err(format!("unknown match stage {other}")),
        }
    }
}

/// Audit entry for one piece of fiat consumed while settling a sale.
///
/// Append-only; never mutated after the sale commits.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PnLMatchRecord {
    pub id: Uuid,
    pub currency: AssetCode,
    /// `None` for stage 3, which consumes no lot.
    pub lot_id: Option<Uuid>,
    pub close_tx_id: Uuid,
    pub stage: MatchStage,
    pub fiat_used: Decimal,
    pub matched_settlement: Decimal,
    pub lot_rate: Decimal,
    /// Settlement cost released from a chained lot (stage 2 only).
    pub cost_basis_portion: Option<Decimal>,
    pub sale_rate_effective: Decimal,
    pub profit_fiat: Decimal,
    pub profit_settlement: Decimal,
    pub created_at: DateTime<Utc>,
}
