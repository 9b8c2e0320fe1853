use crate::core::asset::AssetCode;
use crate::core::decimal::{round_to, FIAT_PROFIT_SCALE, SETTLEMENT_SCALE};
use crate::core::transaction::TransactionKind;
use crate::ledger::state::DeskState;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

const RATE_SCALE: u32 = 5;

/// Open lots of one currency.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RemainingLots {
    pub count: usize,
    pub total_value: Decimal,
}

/// Acquisition rates of the open lots.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RateStats {
    pub min: Decimal,
    pub max: Decimal,
    pub avg: Decimal,
    /// Weighted by remaining amount.
    pub weighted_avg: Decimal,
}

/// Realized profit and open inventory for one fiat currency.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProfitSummary {
    pub currency: AssetCode,
    pub realized_fiat: Decimal,
    pub realized_settlement: Decimal,
    pub remaining_lots: RemainingLots,
    /// `None` when no lot is open.
    pub rate_stats: Option<RateStats>,
    /// Fiat bought from customers (fiat to settlement).
    pub buy_count: usize,
    /// Fiat sold to customers (settlement to fiat).
    pub sell_count: usize,
    pub match_count: usize,
}

impl ProfitSummary {
    pub fn from_state(state: &DeskState, currency: &AssetCode) -> Self {
        let mut realized_fiat = Decimal::ZERO;
        let mut realized_settlement = Decimal::ZERO;
        let mut match_count = 0;
        for record in state.matches_for(Some(currency)) {
            realized_fiat += record.profit_fiat;
            realized_settlement += record.profit_settlement;
            match_count += 1;
        }

        let open: Vec<_> = state.lots.open_lots(currency).collect();
        let total_value: Decimal = open.iter().map(|lot| lot.remaining).sum();

        let rate_stats = if open.is_empty() {
            None
        } else {
            let min = open.iter().map(|lot| lot.rate).min().unwrap_or_default();
            let max = open.iter().map(|lot| lot.rate).max().unwrap_or_default();
            let sum: Decimal = open.iter().map(|lot| lot.rate).sum();
            let avg = sum / Decimal::from(open.len());
            let weighted: Decimal = open.iter().map(|lot| lot.rate * lot.remaining).sum();
            let weighted_avg = if total_value.is_zero() {
                avg
            } else {
                weighted / total_value
            };
            Some(RateStats {
                min: round_to(min, RATE_SCALE),
                max: round_to(max, RATE_SCALE),
                avg: round_to(avg, RATE_SCALE),
                weighted_avg: round_to(weighted_avg, RATE_SCALE),
            })
        };

        let buy_count = state
            .transactions
            .iter()
            .filter(|tx| tx.kind == TransactionKind::FiatToSettlement && tx.from_asset == *currency)
            .count();
        let sell_count = state
            .transactions
            .iter()
            .filter(|tx| {
                tx.kind == TransactionKind::SettlementToFiat && tx.to_asset.as_ref() == Some(currency)
            })
            .count();

        ProfitSummary {
            currency: currency.clone(),
            realized_fiat: round_to(realized_fiat, FIAT_PROFIT_SCALE),
            realized_settlement: round_to(realized_settlement, SETTLEMENT_SCALE),
            remaining_lots: RemainingLots {
                count: open.len(),
                total_value,
            },
            rate_stats,
            buy_count,
            sell_count,
            match_count,
        }
    }
}

impl std::fmt::Display for ProfitSummary {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        writeln!(f, "=== Profit Summary: {} ===", self.currency)?;
        writeln!(f, "Realized ({}):  {}", self.currency, self.realized_fiat)?;
        writeln!(f, "Realized (settlement): {}", self.realized_settlement)?;
        writeln!(
            f,
            "Open Lots:       {} ({} {})",
            self.remaining_lots.count, self.remaining_lots.total_value, self.currency
        )?;
        if let Some(stats) = &self.rate_stats {
            writeln!(
                f,
                "Lot Rates:       min {} / max {} / avg {} / weighted {}",
                stats.min, stats.max, stats.avg, stats.weighted_avg
            )?;
        }
        writeln!(
            f,
            "Buys: {}  Sells: {}  Matches: {}",
            self.buy_count, self.sell_count, self.match_count
        )
    }
}
