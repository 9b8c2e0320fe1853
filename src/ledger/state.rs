use crate::core::asset::AssetCode;
use crate::core::audit::PnLMatchRecord;
use crate::core::transaction::Transaction;
use crate::ledger::balance::CashBalanceLedger;
use crate::ledger::lots::{FiatLotLedger, LotCheckpoint};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Everything the engine knows about one desk.
///
/// This is the unit of persistence and of atomicity: an operation runs
/// against a [`Checkpoint`] and is rolled back to it on failure.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct DeskState {
    pub balances: CashBalanceLedger,
    pub lots: FiatLotLedger,
    pub transactions: Vec<Transaction>,
    pub matches: Vec<PnLMatchRecord>,
}

/// What an operation may change, captured before it runs.
///
/// History is append-only apart from one amended transaction, so only its
/// length is kept. Closed lots are left out the same way.
#[derive(Debug, Clone)]
pub struct Checkpoint {
    balances: CashBalanceLedger,
    lots: LotCheckpoint,
    transactions: usize,
    matches: usize,
    amended: Option<(usize, Transaction)>,
}

impl DeskState {
    pub fn new() -> Self {
        Self::default()
    }

    /// Capture the state before an operation. `touched` names an existing
    /// transaction the operation may rewrite in place.
    pub fn checkpoint(&self, touched: Option<Uuid>) -> Checkpoint {
        let amended = touched.and_then(|id| {
            self.transactions
                .iter()
                .position(|tx| tx.id == id)
                .map(|i| (i, self.transactions[i].clone()))
        });
        Checkpoint {
            balances: self.balances.clone(),
            lots: self.lots.checkpoint(),
            transactions: self.transactions.len(),
            matches: self.matches.len(),
            amended,
        }
    }

    pub fn restore(&mut self, checkpoint: Checkpoint) {
        self.balances = checkpoint.balances;
        self.lots.restore(checkpoint.lots);
        self.transactions.truncate(checkpoint.transactions);
        self.matches.truncate(checkpoint.matches);
        if let Some((index, tx)) = checkpoint.amended {
            self.transactions[index] = tx;
        }
    }

    pub fn transaction(&self, id: Uuid) -> Option<&Transaction> {
        self.transactions.iter().find(|tx| tx.id == id)
    }

    pub fn transaction_mut(&mut self, id: Uuid) -> Option<&mut Transaction> {
        self.transactions.iter_mut().find(|tx| tx.id == id)
    }

    pub fn matches_for<'a>(
        &'a self,
        currency: Option<&'a AssetCode>,
    ) -> impl Iterator<Item = &'a PnLMatchRecord> + 'a {
        self.matches
            .iter()
            .filter(move |m| currency.map_or(true, |c| m.currency == *c))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::core::asset::{AssetRegistry, RateConvention};
    use crate::core::transaction::{TransactionAmendment, TransactionKind, TransactionRequest};
    use crate::engine::orchestrator::TransactionOrchestrator;
    use rust_decimal_macros::dec;

    fn orchestrator() -> TransactionOrchestrator {
        let registry = AssetRegistry::new(AssetCode::new("USDT"))
            .with_fiat(AssetCode::new("CZK"), RateConvention::Divide);
        TransactionOrchestrator::new(registry, dec!(0.0000001))
    }

    #[test]
    fn test_restore_undoes_a_sale() {
        let o = orchestrator();
        let mut state = DeskState::new();
        o.deposit(&mut state, &AssetCode::new("USDT"), dec!(1000), "").unwrap();
        for amount in [dec!(1050), dec!(2100)] {
            o.execute(
                &mut state,
                &TransactionRequest::new(TransactionKind::FiatToSettlement, "CZK", "USDT", amount, dec!(21)),
            )
            .unwrap();
        }
        let before = state.clone();

        let checkpoint = state.checkpoint(None);
        o.execute(
            &mut state,
            &TransactionRequest::new(TransactionKind::SettlementToFiat, "USDT", "CZK", dec!(60), dec!(20)),
        )
        .unwrap();
        assert!(!state.lots.lots(None)[0].is_open());
        assert_ne!(state, before);

        state.restore(checkpoint);
        assert_eq!(state, before);
    }

    #[test]
    fn test_restore_puts_back_an_amended_transaction() {
        let o = orchestrator();
        let mut state = DeskState::new();
        let tx = o.deposit(&mut state, &AssetCode::new("USDT"), dec!(1000), "float").unwrap();
        let before = state.clone();

        let checkpoint = state.checkpoint(Some(tx.id));
        let amendment = TransactionAmendment {
            note: Some("corrected".to_string()),
            ..Default::default()
        };
        o.amend(&mut state, tx.id, &amendment).unwrap();
        assert_eq!(state.transactions[0].note, "corrected");

        state.restore(checkpoint);
        assert_eq!(state, before);
    }
}
