//! FIFO profit realization.
//!
//! A sale of the settlement asset for fiat pays the customer out of fiat the
//! desk already holds. That fiat is matched against lots in three passes:
//!
//! 1. lots bought directly with the settlement asset, oldest first;
//! 2. lots produced by fiat-to-fiat hops, which carry their settlement cost;
//! 3. whatever is left has no tracked cost and books zero profit.
//!
//! Fiat-to-fiat hops do not realize anything. They move cost basis from the
//! source currency's lots into a new chained lot of the destination currency.

use crate::core::asset::{AssetCode, RateConvention};
use crate::core::audit::{MatchStage, PnLMatchRecord};
use crate::core::decimal::{round_to, FIAT_PROFIT_SCALE, SETTLEMENT_SCALE};
use crate::core::error::EngineError;
use crate::ledger::lots::{FiatLotLedger, LotSource};
use chrono::Utc;
use log::{debug, warn};
use rust_decimal::Decimal;
use uuid::Uuid;

/// Result of matching one sale.
#[derive(Debug, Clone, PartialEq)]
pub struct SaleMatch {
    pub effective_rate: Decimal,
    pub records: Vec<PnLMatchRecord>,
    /// Sum of fiat profit pieces, 2 dp.
    pub realized_fiat: Decimal,
    /// Sum of settlement profit pieces, 4 dp.
    pub realized_settlement: Decimal,
}

impl SaleMatch {
    /// Fiat that was matched against a lot (stages 1 and 2).
    pub fn lot_covered(&self) -> Decimal {
        self.records
            .iter()
            .filter(|r| r.stage != MatchStage::Untracked)
            .map(|r| r.fiat_used)
            .sum()
    }
}

/// Cost basis moved out of a currency by a fiat hop.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct CostBasisTransfer {
    /// Source fiat that was backed by a lot.
    pub covered: Decimal,
    pub cost_basis_settlement: Decimal,
    pub lots_consumed: usize,
}

#[derive(Debug, Clone, Copy)]
pub struct ProfitMatchingEngine {
    epsilon: Decimal,
}

impl ProfitMatchingEngine {
    pub fn new(epsilon: Decimal) -> Self {
        Self { epsilon }
    }

    /// Match `fiat_needed` of `currency` paid out against
    /// `settlement_received`, draining lots as it goes.
    pub fn match_sale(
        &self,
        lots: &mut FiatLotLedger,
        currency: &AssetCode,
        convention: RateConvention,
        fiat_needed: Decimal,
        settlement_received: Decimal,
        close_tx_id: Uuid,
    ) -> Result<SaleMatch, EngineError> {
        let eff = fiat_needed
            .checked_div(settlement_received)
            .ok_or(EngineError::Arithmetic("effective sale rate"))?;
        if eff <= Decimal::ZERO {
            return Err(EngineError::Arithmetic("effective sale rate"));
        }

        let mut need = fiat_needed;
        let mut records = Vec::new();

        for stage in [MatchStage::DirectPurchase, MatchStage::ChainedExchange] {
            let source = match stage {
                MatchStage::DirectPurchase => LotSource::DirectPurchase,
                _ => LotSource::ChainedExchange,
            };

            while need > self.epsilon {
                let Some(lot) = lots.next_unconsumed_lot(currency, Some(source)) else {
                    break;
                };
                let (lot_id, lot_rate) = (lot.id, lot.rate);
                let take = lot.remaining.min(need);
                let matched = checked_div(take, eff)?;

                let receipt = lots.drain(lot_id, take)?;

                let (profit_fiat, profit_settlement, cost_portion) = match stage {
                    MatchStage::DirectPurchase => {
                        let pf = (lot_rate - eff)
                            .checked_mul(matched)
                            .ok_or(EngineError::Arithmetic("stage 1 profit"))?;
                        let ps = convention
                            .profit_to_settlement(pf, eff)
                            .ok_or(EngineError::Arithmetic("stage 1 profit"))?;
                        (pf, ps, None)
                    }
                    _ => {
                        let cost = receipt.cost_released;
                        let ps = matched - cost;
                        let pf = convention
                            .profit_to_fiat(ps, eff)
                            .ok_or(EngineError::Arithmetic("stage 2 profit"))?;
                        (pf, ps, Some(cost))
                    }
                };

                debug!(
                    "stage {} matched {} {} from lot {} (rate {}, eff {}): profit {} / {}",
                    stage as u8, take, currency, lot_id, lot_rate, eff, profit_fiat, profit_settlement
                );

                records.push(PnLMatchRecord {
                    id: Uuid::new_v4(),
                    currency: currency.clone(),
                    lot_id: Some(lot_id),
                    close_tx_id,
                    stage,
                    fiat_used: take,
                    matched_settlement: matched,
                    lot_rate,
                    cost_basis_portion: cost_portion,
                    sale_rate_effective: eff,
                    profit_fiat,
                    profit_settlement,
                    created_at: Utc::now(),
                });
                need -= take;
            }
        }

        if need > self.epsilon {
            if records.is_empty() {
                debug!("no lots for {currency}; {need} matched without cost basis");
            } else {
                warn!("{currency} lots exhausted; {need} matched without cost basis");
            }
            records.push(PnLMatchRecord {
                id: Uuid::new_v4(),
                currency: currency.clone(),
                lot_id: None,
                close_tx_id,
                stage: MatchStage::Untracked,
                fiat_used: need,
                matched_settlement: checked_div(need, eff)?,
                lot_rate: eff,
                cost_basis_portion: None,
                sale_rate_effective: eff,
                profit_fiat: Decimal::ZERO,
                profit_settlement: Decimal::ZERO,
                created_at: Utc::now(),
            });
        }

        let realized_fiat = round_to(records.iter().map(|r| r.profit_fiat).sum(), FIAT_PROFIT_SCALE);
        let realized_settlement = round_to(
            records.iter().map(|r| r.profit_settlement).sum(),
            SETTLEMENT_SCALE,
        );

        Ok(SaleMatch {
            effective_rate: eff,
            records,
            realized_fiat,
            realized_settlement,
        })
    }

    /// Drain up to `amount` of `currency` across both lot sources in
    /// creation order and return the settlement cost released.
    pub fn consume_cost_basis(
        &self,
        lots: &mut FiatLotLedger,
        currency: &AssetCode,
        amount: Decimal,
    ) -> Result<CostBasisTransfer, EngineError> {
        let mut need = amount;
        let mut transfer = CostBasisTransfer {
            covered: Decimal::ZERO,
            cost_basis_settlement: Decimal::ZERO,
            lots_consumed: 0,
        };

        while need > self.epsilon {
            let Some(lot) = lots.next_unconsumed_lot(currency, None) else {
                break;
            };
            let lot_id = lot.id;
            let take = lot.remaining.min(need);
            let receipt = lots.drain(lot_id, take)?;

            transfer.covered += take;
            transfer.cost_basis_settlement += receipt.cost_released;
            transfer.lots_consumed += 1;
            need -= take;
        }

        if need > self.epsilon {
            debug!("{need} {currency} carried no cost basis");
        }
        Ok(transfer)
    }
}

fn checked_div(a: Decimal, b: Decimal) -> Result<Decimal, EngineError> {
    a.checked_div(b).ok_or(EngineError::Arithmetic("matched settlement"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn czk() -> AssetCode {
        AssetCode::new("CZK")
    }

    fn engine() -> ProfitMatchingEngine {
        ProfitMatchingEngine::new(dec!(0.0000001))
    }

    fn direct(lots: &mut FiatLotLedger, currency: AssetCode, amount: Decimal, rate: Decimal) -> Uuid {
        lots.create_lot(currency, amount, rate, LotSource::DirectPurchase, None, Uuid::new_v4())
            .unwrap()
            .id
    }

    #[test]
    fn test_stage_exhaustion() {
        let mut lots = FiatLotLedger::new();
        direct(&mut lots, czk(), dec!(1000), dec!(21));

        let result = engine()
            .match_sale(&mut lots, &czk(), RateConvention::Divide, dec!(1500), dec!(75), Uuid::new_v4())
            .unwrap();

        assert_eq!(result.effective_rate, dec!(20));
        assert_eq!(result.records.len(), 2);
        assert_eq!(result.records[0].stage, MatchStage::DirectPurchase);
        assert_eq!(result.records[0].fiat_used, dec!(1000));
        assert_eq!(result.records[0].profit_fiat, dec!(50));
        assert_eq!(result.records[0].profit_settlement, dec!(2.5));
        assert_eq!(result.records[1].stage, MatchStage::Untracked);
        assert_eq!(result.records[1].fiat_used, dec!(500));
        assert_eq!(result.records[1].matched_settlement, dec!(25));
        assert!(result.records[1].lot_id.is_none());
        assert_eq!(result.realized_fiat, dec!(50.00));
        assert_eq!(result.realized_settlement, dec!(2.5));
        assert_eq!(result.lot_covered(), dec!(1000));
    }

    #[test]
    fn test_fifo_across_two_lots() {
        let mut lots = FiatLotLedger::new();
        let l1 = direct(&mut lots, czk(), dec!(100), dec!(21));
        let l2 = direct(&mut lots, czk(), dec!(100), dec!(21));

        let result = engine()
            .match_sale(&mut lots, &czk(), RateConvention::Divide, dec!(150), dec!(7.5), Uuid::new_v4())
            .unwrap();

        assert_eq!(result.records.len(), 2);
        assert_eq!(result.records[0].lot_id, Some(l1));
        assert_eq!(result.records[0].fiat_used, dec!(100));
        assert_eq!(result.records[1].lot_id, Some(l2));
        assert_eq!(result.records[1].fiat_used, dec!(50));
        assert_eq!(lots.get(l1).unwrap().remaining, Decimal::ZERO);
        assert_eq!(lots.get(l2).unwrap().remaining, dec!(50));
    }

    #[test]
    fn test_no_lots_goes_to_stage_three() {
        let mut lots = FiatLotLedger::new();
        let result = engine()
            .match_sale(&mut lots, &czk(), RateConvention::Divide, dec!(2100), dec!(100), Uuid::new_v4())
            .unwrap();
        assert_eq!(result.records.len(), 1);
        assert_eq!(result.records[0].stage, MatchStage::Untracked);
        assert_eq!(result.records[0].lot_rate, dec!(21));
        assert_eq!(result.realized_fiat, Decimal::ZERO);
    }

    #[test]
    fn test_direct_lots_before_chained() {
        let eur = AssetCode::new("EUR");
        let mut lots = FiatLotLedger::new();
        let chained = lots
            .create_lot(
                eur.clone(),
                dec!(100),
                dec!(0.8),
                LotSource::ChainedExchange,
                Some(dec!(125)),
                Uuid::new_v4(),
            )
            .unwrap()
            .id;
        let d = direct(&mut lots, eur.clone(), dec!(100), dec!(0.8));

        let result = engine()
            .match_sale(&mut lots, &eur, RateConvention::Multiply, dec!(150), dec!(200), Uuid::new_v4())
            .unwrap();

        assert_eq!(result.records[0].lot_id, Some(d));
        assert_eq!(result.records[1].lot_id, Some(chained));
        assert_eq!(result.records[1].stage, MatchStage::ChainedExchange);
        // eff 0.75; 50 EUR buys 66.6667 USDT against 62.5 of cost
        let cost = result.records[1].cost_basis_portion.unwrap();
        assert_eq!(cost, dec!(62.5));
        assert_eq!(lots.get(chained).unwrap().cost_basis_settlement, Some(dec!(62.5)));
    }

    #[test]
    fn test_stage_two_profit_uses_multiply_for_eur() {
        let eur = AssetCode::new("EUR");
        let mut lots = FiatLotLedger::new();
        lots.create_lot(
            eur.clone(),
            dec!(1000),
            dec!(0.8),
            LotSource::ChainedExchange,
            Some(dec!(1200)),
            Uuid::new_v4(),
        )
        .unwrap();

        // eff = 1000 / 1250 = 0.8
        let result = engine()
            .match_sale(&mut lots, &eur, RateConvention::Multiply, dec!(1000), dec!(1250), Uuid::new_v4())
            .unwrap();

        assert_eq!(result.records.len(), 1);
        assert_eq!(result.records[0].profit_settlement, dec!(50));
        assert_eq!(result.records[0].profit_fiat, dec!(40));
        assert_eq!(result.realized_settlement, dec!(50));
        assert_eq!(result.realized_fiat, dec!(40));
    }

    #[test]
    fn test_consume_cost_basis_mixes_sources_in_order() {
        let mut lots = FiatLotLedger::new();
        direct(&mut lots, czk(), dec!(2100), dec!(21));
        lots.create_lot(
            czk(),
            dec!(1000),
            dec!(20),
            LotSource::ChainedExchange,
            Some(dec!(50)),
            Uuid::new_v4(),
        )
        .unwrap();

        let transfer = engine()
            .consume_cost_basis(&mut lots, &czk(), dec!(2600))
            .unwrap();

        assert_eq!(transfer.covered, dec!(2600));
        assert_eq!(transfer.cost_basis_settlement, dec!(125));
        assert_eq!(transfer.lots_consumed, 2);
        assert_eq!(lots.open_cost_basis(Some(&czk())).unwrap(), dec!(25));
    }

    #[test]
    fn test_consume_cost_basis_partial_coverage() {
        let mut lots = FiatLotLedger::new();
        direct(&mut lots, czk(), dec!(500), dec!(20));
        let transfer = engine()
            .consume_cost_basis(&mut lots, &czk(), dec!(2000))
            .unwrap();
        assert_eq!(transfer.covered, dec!(500));
        assert_eq!(transfer.cost_basis_settlement, dec!(25));
    }

    #[test]
    fn test_invalid_settlement_amount() {
        let mut lots = FiatLotLedger::new();
        assert!(engine()
            .match_sale(&mut lots, &czk(), RateConvention::Divide, dec!(10), Decimal::ZERO, Uuid::new_v4())
            .is_err());
    }
}
