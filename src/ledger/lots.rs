use crate::core::asset::AssetCode;
use crate::core::decimal::{round_to, LOT_SCALE};
use crate::core::error::EngineError;
use chrono::{DateTime, Utc};
use log::debug;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use uuid::Uuid;

/// How a lot's fiat entered the desk.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum LotSource {
    /// Bought with the settlement asset; the cost is `amount / rate`.
    DirectPurchase,
    /// Produced by a fiat-to-fiat hop; the cost is carried explicitly.
    ChainedExchange,
}

/// A chunk of fiat held by the desk at a known settlement cost.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct FiatLot {
    pub id: Uuid,
    pub currency: AssetCode,
    pub original: Decimal,
    pub remaining: Decimal,
    /// Fiat per settlement unit at acquisition.
    pub rate: Decimal,
    pub source: LotSource,
    /// Settlement cost of `remaining`. Chained lots only.
    pub cost_basis_settlement: Option<Decimal>,
    pub origin_tx: Uuid,
    pub sequence: u64,
    pub created_at: DateTime<Utc>,
}

impl FiatLot {
    pub fn is_open(&self) -> bool {
        self.remaining > Decimal::ZERO
    }

    /// Settlement cost of taking `take` units out of this lot.
    pub fn cost_basis_of(&self, take: Decimal) -> Result<Decimal, EngineError> {
        match (self.source, self.cost_basis_settlement) {
            (LotSource::ChainedExchange, Some(cost)) => {
                if self.remaining.is_zero() {
                    return Ok(Decimal::ZERO);
                }
                cost.checked_mul(take)
                    .and_then(|v| v.checked_div(self.remaining))
                    .ok_or(EngineError::Arithmetic("chained lot cost basis"))
            }
            _ => take
                .checked_div(self.rate)
                .ok_or(EngineError::Arithmetic("lot cost basis")),
        }
    }

    /// Settlement cost still locked in the unconsumed part of the lot.
    pub fn open_cost_basis(&self) -> Result<Decimal, EngineError> {
        self.cost_basis_of(self.remaining)
    }
}

/// Outcome of draining part of a lot.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct DrainReceipt {
    pub taken: Decimal,
    pub cost_released: Decimal,
    pub remaining: Decimal,
}

/// Append-only store of fiat lots, kept in creation order.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct FiatLotLedger {
    lots: Vec<FiatLot>,
    next_sequence: u64,
    /// Per currency, no lot of that currency before this index is open.
    #[serde(default)]
    cursors: BTreeMap<AssetCode, usize>,
    /// No lot before this index is open.
    #[serde(default)]
    settled: usize,
}

/// Enough of a [`FiatLotLedger`] to undo one operation.
///
/// Lots before the settled prefix are closed and never change again, so
/// only the tail is copied.
#[derive(Debug, Clone)]
pub struct LotCheckpoint {
    next_sequence: u64,
    cursors: BTreeMap<AssetCode, usize>,
    settled: usize,
    tail: Vec<FiatLot>,
}

impl FiatLotLedger {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn create_lot(
        &mut self,
        currency: AssetCode,
        amount: Decimal,
        rate: Decimal,
        source: LotSource,
        cost_basis_settlement: Option<Decimal>,
        origin_tx: Uuid,
    ) -> Result<&FiatLot, EngineError> {
        if amount <= Decimal::ZERO {
            return Err(EngineError::invalid("lot amount", "must be positive"));
        }
        if rate <= Decimal::ZERO {
            return Err(EngineError::invalid("lot rate", "must be positive"));
        }
        if source == LotSource::ChainedExchange && cost_basis_settlement.is_none() {
            return Err(EngineError::invalid(
                "cost_basis_settlement",
                "required for a chained lot",
            ));
        }

        let sequence = self.next_sequence;
        self.next_sequence += 1;
        let lot = FiatLot {
            id: Uuid::new_v4(),
            currency,
            original: amount,
            remaining: amount,
            rate,
            source,
            cost_basis_settlement: match source {
                LotSource::ChainedExchange => cost_basis_settlement,
                LotSource::DirectPurchase => None,
            },
            origin_tx,
            sequence,
            created_at: Utc::now(),
        };
        debug!(
            "lot #{} created: {} {} at {} ({:?})",
            sequence, lot.remaining, lot.currency, lot.rate, lot.source
        );
        self.lots.push(lot);
        Ok(&self.lots[self.lots.len() - 1])
    }

    /// Oldest lot of `currency` with something left, optionally limited to
    /// one source. `None` considers both sources in creation order.
    pub fn next_unconsumed_lot(
        &self,
        currency: &AssetCode,
        source: Option<LotSource>,
    ) -> Option<&FiatLot> {
        let start = self.cursor(currency);
        self.lots[start..].iter().find(|lot| {
            lot.currency == *currency
                && lot.is_open()
                && source.map_or(true, |s| lot.source == s)
        })
    }

    fn cursor(&self, currency: &AssetCode) -> usize {
        self.cursors
            .get(currency)
            .copied()
            .unwrap_or(0)
            .max(self.settled)
            .min(self.lots.len())
    }

    /// Move the cursors past lots that just closed.
    fn advance(&mut self, currency: &AssetCode) {
        let start = self.cursor(currency);
        let next = self.lots[start..]
            .iter()
            .position(|lot| lot.currency == *currency && lot.is_open())
            .map_or(self.lots.len(), |i| start + i);
        self.cursors.insert(currency.clone(), next);

        while self.settled < self.lots.len() && !self.lots[self.settled].is_open() {
            self.settled += 1;
        }
    }

    pub fn checkpoint(&self) -> LotCheckpoint {
        let settled = self.settled.min(self.lots.len());
        LotCheckpoint {
            next_sequence: self.next_sequence,
            cursors: self.cursors.clone(),
            settled,
            tail: self.lots[settled..].to_vec(),
        }
    }

    pub fn restore(&mut self, checkpoint: LotCheckpoint) {
        self.lots.truncate(checkpoint.settled);
        self.lots.extend(checkpoint.tail);
        self.next_sequence = checkpoint.next_sequence;
        self.cursors = checkpoint.cursors;
        self.settled = checkpoint.settled;
    }

    /// Take `amount` out of a lot. Chained lots give up cost basis pro rata.
    pub fn drain(&mut self, lot_id: Uuid, amount: Decimal) -> Result<DrainReceipt, EngineError> {
        let floor = self.settled.min(self.lots.len());
        let index = self.lots[floor..]
            .iter()
            .position(|lot| lot.id == lot_id)
            .map(|i| floor + i)
            .or_else(|| self.lots[..floor].iter().position(|lot| lot.id == lot_id))
            .ok_or(EngineError::LotNotFound(lot_id))?;
        let lot = &mut self.lots[index];

        if amount < Decimal::ZERO || amount > lot.remaining {
            return Err(EngineError::Arithmetic("lot over-drain"));
        }

        let cost_released = lot.cost_basis_of(amount)?;
        let remaining = round_to(lot.remaining - amount, LOT_SCALE).max(Decimal::ZERO);

        if let Some(cost) = lot.cost_basis_settlement.as_mut() {
            *cost = if remaining.is_zero() {
                Decimal::ZERO
            } else {
                (*cost - cost_released).max(Decimal::ZERO)
            };
        }
        lot.remaining = remaining;

        if remaining.is_zero() {
            let currency = lot.currency.clone();
            self.advance(&currency);
        }

        Ok(DrainReceipt {
            taken: amount,
            cost_released,
            remaining,
        })
    }

    pub fn get(&self, lot_id: Uuid) -> Option<&FiatLot> {
        self.lots.iter().find(|lot| lot.id == lot_id)
    }

    /// Every lot, or every lot of one currency, in creation order.
    pub fn lots(&self, currency: Option<&AssetCode>) -> Vec<FiatLot> {
        self.lots
            .iter()
            .filter(|lot| currency.map_or(true, |c| lot.currency == *c))
            .cloned()
            .collect()
    }

    pub fn open_lots<'a>(&'a self, currency: &'a AssetCode) -> impl Iterator<Item = &'a FiatLot> + 'a {
        self.lots
            .iter()
            .filter(move |lot| lot.currency == *currency && lot.is_open())
    }

    /// Settlement cost still tied up in open lots.
    pub fn open_cost_basis(&self, currency: Option<&AssetCode>) -> Result<Decimal, EngineError> {
        let mut total = Decimal::ZERO;
        for lot in self.lots.iter().filter(|lot| lot.is_open()) {
            if currency.map_or(true, |c| lot.currency == *c) {
                total += lot.open_cost_basis()?;
            }
        }
        Ok(total)
    }

    pub fn len(&self) -> usize {
        self.lots.len()
    }

    pub fn is_empty(&self) -> bool {
        self.lots.is_empty()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    fn czk() -> AssetCode {
        AssetCode::new("CZK")
    }

    fn direct(ledger: &mut FiatLotLedger, amount: Decimal, rate: Decimal) -> Uuid {
        ledger
            .create_lot(czk(), amount, rate, LotSource::DirectPurchase, None, Uuid::new_v4())
            .unwrap()
            .id
    }

    #[test]
    fn test_fifo_order() {
        let mut ledger = FiatLotLedger::new();
        let first = direct(&mut ledger, dec!(100), dec!(21));
        let second = direct(&mut ledger, dec!(100), dec!(22));

        assert_eq!(ledger.next_unconsumed_lot(&czk(), None).unwrap().id, first);
        ledger.drain(first, dec!(100)).unwrap();
        assert_eq!(ledger.next_unconsumed_lot(&czk(), None).unwrap().id, second);
        ledger.drain(second, dec!(100)).unwrap();
        assert!(ledger.next_unconsumed_lot(&czk(), None).is_none());
    }

    #[test]
    fn test_closed_lots_are_skipped() {
        let mut ledger = FiatLotLedger::new();
        let eur = AssetCode::new("EUR");
        let a = direct(&mut ledger, dec!(100), dec!(21));
        let e = ledger
            .create_lot(eur.clone(), dec!(10), dec!(1.1), LotSource::DirectPurchase, None, Uuid::new_v4())
            .unwrap()
            .id;
        let b = direct(&mut ledger, dec!(100), dec!(22));

        ledger.drain(a, dec!(100)).unwrap();
        assert_eq!(ledger.cursors[&czk()], 2);
        assert_eq!(ledger.settled, 1);

        ledger.drain(e, dec!(10)).unwrap();
        assert_eq!(ledger.settled, 2);
        assert!(ledger.next_unconsumed_lot(&eur, None).is_none());
        assert_eq!(ledger.next_unconsumed_lot(&czk(), None).unwrap().id, b);

        // A partial drain keeps the lot in line.
        ledger.drain(b, dec!(40)).unwrap();
        assert_eq!(ledger.cursors[&czk()], 2);
        assert_eq!(ledger.next_unconsumed_lot(&czk(), None).unwrap().id, b);
    }

    #[test]
    fn test_restore_rewinds_drains_and_new_lots() {
        let mut ledger = FiatLotLedger::new();
        let a = direct(&mut ledger, dec!(100), dec!(21));
        let b = direct(&mut ledger, dec!(100), dec!(22));
        ledger.drain(a, dec!(100)).unwrap();
        let before = ledger.clone();

        let checkpoint = ledger.checkpoint();
        ledger.drain(b, dec!(100)).unwrap();
        direct(&mut ledger, dec!(50), dec!(23));
        assert_ne!(ledger, before);

        ledger.restore(checkpoint);
        assert_eq!(ledger, before);
        assert_eq!(ledger.next_unconsumed_lot(&czk(), None).unwrap().id, b);
    }

    #[test]
    fn test_source_filter() {
        let mut ledger = FiatLotLedger::new();
        ledger
            .create_lot(
                czk(),
                dec!(500),
                dec!(20),
                LotSource::ChainedExchange,
                Some(dec!(25)),
                Uuid::new_v4(),
            )
            .unwrap();
        let d = direct(&mut ledger, dec!(100), dec!(21));

        let next = ledger
            .next_unconsumed_lot(&czk(), Some(LotSource::DirectPurchase))
            .unwrap();
        assert_eq!(next.id, d);
        let any = ledger.next_unconsumed_lot(&czk(), None).unwrap();
        assert_eq!(any.source, LotSource::ChainedExchange);
        assert!(ledger
            .next_unconsumed_lot(&AssetCode::new("EUR"), None)
            .is_none());
    }

    #[test]
    fn test_drain_quantizes_remaining() {
        let mut ledger = FiatLotLedger::new();
        let id = direct(&mut ledger, dec!(1), dec!(3));
        let receipt = ledger.drain(id, dec!(0.333333333333)).unwrap();
        assert_eq!(receipt.remaining, dec!(0.6666667));
        assert_eq!(ledger.get(id).unwrap().remaining, dec!(0.6666667));
    }

    #[test]
    fn test_drain_rejects_overdraw() {
        let mut ledger = FiatLotLedger::new();
        let id = direct(&mut ledger, dec!(10), dec!(21));
        assert!(matches!(
            ledger.drain(id, dec!(10.5)),
            Err(EngineError::Arithmetic(_))
        ));
        assert!(matches!(
            ledger.drain(Uuid::new_v4(), dec!(1)),
            Err(EngineError::LotNotFound(_))
        ));
        assert_eq!(ledger.get(id).unwrap().remaining, dec!(10));
    }

    #[test]
    fn test_chained_drain_releases_cost_pro_rata() {
        let mut ledger = FiatLotLedger::new();
        let id = ledger
            .create_lot(
                AssetCode::new("EUR"),
                dec!(1000),
                dec!(0.8),
                LotSource::ChainedExchange,
                Some(dec!(1250)),
                Uuid::new_v4(),
            )
            .unwrap()
            .id;

        let receipt = ledger.drain(id, dec!(400)).unwrap();
        assert_eq!(receipt.cost_released, dec!(500));
        let lot = ledger.get(id).unwrap();
        assert_eq!(lot.remaining, dec!(600));
        assert_eq!(lot.cost_basis_settlement, Some(dec!(750)));

        let receipt = ledger.drain(id, dec!(600)).unwrap();
        assert_eq!(receipt.cost_released, dec!(750));
        assert_eq!(ledger.get(id).unwrap().cost_basis_settlement, Some(Decimal::ZERO));
    }

    #[test]
    fn test_open_cost_basis() {
        let mut ledger = FiatLotLedger::new();
        let id = direct(&mut ledger, dec!(2100), dec!(21));
        assert_eq!(ledger.open_cost_basis(Some(&czk())).unwrap(), dec!(100));
        ledger.drain(id, dec!(1050)).unwrap();
        assert_eq!(ledger.open_cost_basis(None).unwrap(), dec!(50));
    }

    #[test]
    fn test_create_lot_validation() {
        let mut ledger = FiatLotLedger::new();
        assert!(ledger
            .create_lot(czk(), dec!(0), dec!(21), LotSource::DirectPurchase, None, Uuid::new_v4())
            .is_err());
        assert!(ledger
            .create_lot(czk(), dec!(10), dec!(21), LotSource::ChainedExchange, None, Uuid::new_v4())
            .is_err());
        assert!(ledger.is_empty());
    }

    #[test]
    fn test_sequence_increases() {
        let mut ledger = FiatLotLedger::new();
        direct(&mut ledger, dec!(1), dec!(1));
        direct(&mut ledger, dec!(1), dec!(1));
        let seqs: Vec<u64> = ledger.lots(None).iter().map(|l| l.sequence).collect();
        assert_eq!(seqs, vec![0, 1]);
    }
}
