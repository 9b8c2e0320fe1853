use crate::core::asset::AssetCode;
use crate::core::error::EngineError;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// Holds one cash balance per asset for a single desk.
///
/// Balances are never negative. Every debit goes through
/// [`CashBalanceLedger::apply_delta`], which refuses a result below zero,
/// and callers pre-check outgoing legs with
/// [`CashBalanceLedger::ensure_sufficient`] before touching anything.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct CashBalanceLedger {
    balances: BTreeMap<AssetCode, Decimal>,
}

impl CashBalanceLedger {
    pub fn new() -> Self {
        Self::default()
    }

    /// Current balance, zero for an asset never referenced.
    pub fn balance(&self, asset: &AssetCode) -> Decimal {
        self.balances.get(asset).copied().unwrap_or(Decimal::ZERO)
    }

    pub fn ensure_sufficient(&self, asset: &AssetCode, required: Decimal) -> Result<(), EngineError> {
        let available = self.balance(asset);
        if available < required {
            return Err(EngineError::InsufficientFunds {
                asset: asset.clone(),
                available,
                required,
            });
        }
        Ok(())
    }

    /// Add `delta` (negative for a debit) and return the new balance.
    pub fn apply_delta(&mut self, asset: &AssetCode, delta: Decimal) -> Result<Decimal, EngineError> {
        let current = self.balance(asset);
        let next = current
            .checked_add(delta)
            .ok_or(EngineError::Arithmetic("balance update"))?;
        if next < Decimal::ZERO {
            return Err(EngineError::InsufficientFunds {
                asset: asset.clone(),
                available: current,
                required: -delta,
            });
        }
        self.balances.insert(asset.clone(), next);
        Ok(next)
    }

    /// Administrative override of a single balance.
    pub fn set_balance(&mut self, asset: &AssetCode, amount: Decimal) -> Result<(), EngineError> {
        if amount < Decimal::ZERO {
            return Err(EngineError::invalid("balance", "must not be negative"));
        }
        self.balances.insert(asset.clone(), amount);
        Ok(())
    }

    /// Create a zero balance for `asset` if it has none yet.
    pub fn touch(&mut self, asset: &AssetCode) {
        self.balances.entry(asset.clone()).or_insert(Decimal::ZERO);
    }

    pub fn all(&self) -> &BTreeMap<AssetCode, Decimal> {
        &self.balances
    }
}
