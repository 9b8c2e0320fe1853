use crate::core::asset::AssetCode;
use crate::core::error::EngineError;
use crate::core::scope::ScopeId;
use crate::core::transaction::{Transaction, TransactionRequest};
use crate::engine::orchestrator::{TransactionOrchestrator, TransactionResult};
use crate::engine::service::CashDeskEngine;
use crate::ledger::state::DeskState;
use log::debug;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// One line of a replayable operation stream.
///
/// ```json
/// { "op": "exchange", "kind": "fiat_to_crypto", "from": "CZK", "to": "USDT",
///   "amount": "2100", "rate": "21", "fee_percent": "1.5" }
/// { "op": "deposit", "asset": "USDT", "amount": "1000" }
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "op", rename_all = "snake_case")]
pub enum Operation {
    Exchange {
        /// Kept as text so unknown kinds surface as engine errors.
        kind: String,
        from: AssetCode,
        to: AssetCode,
        amount: Decimal,
        rate: Decimal,
        #[serde(default)]
        fee_percent: Decimal,
        #[serde(default)]
        note: String,
    },
    Deposit {
        asset: AssetCode,
        amount: Decimal,
        #[serde(default)]
        note: String,
    },
    Withdrawal {
        asset: AssetCode,
        amount: Decimal,
        #[serde(default)]
        note: String,
    },
}

/// Top-level document read by `cash-desk replay`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct OperationFile {
    pub operations: Vec<Operation>,
}

#[derive(Debug, Clone)]
pub enum OperationOutcome {
    Exchange(TransactionResult),
    CashMovement(Transaction),
}

impl OperationOutcome {
    pub fn transaction(&self) -> &Transaction {
        match self {
            OperationOutcome::Exchange(result) => &result.transaction,
            OperationOutcome::CashMovement(tx) => tx,
        }
    }
}

impl Operation {
    /// The exchange request this operation describes, if it is one.
    pub fn to_request(&self) -> Result<Option<TransactionRequest>, EngineError> {
        match self {
            Operation::Exchange {
                kind,
                from,
                to,
                amount,
                rate,
                fee_percent,
                note,
            } => Ok(Some(
                TransactionRequest::parse(kind, from.clone(), to.clone(), *amount, *rate)?
                    .with_fee(*fee_percent)
                    .with_note(note.clone()),
            )),
            Operation::Deposit { .. } | Operation::Withdrawal { .. } => Ok(None),
        }
    }

    pub fn apply(&self, engine: &CashDeskEngine, scope: &ScopeId) -> Result<OperationOutcome, EngineError> {
        match self {
            Operation::Deposit { asset, amount, note } => engine
                .deposit(scope, asset, *amount, note)
                .map(OperationOutcome::CashMovement),
            Operation::Withdrawal { asset, amount, note } => engine
                .withdraw(scope, asset, *amount, note)
                .map(OperationOutcome::CashMovement),
            Operation::Exchange { .. } => {
                let request = self.to_request()?.ok_or_else(|| {
                    EngineError::InvalidOperationType("exchange".to_string())
                })?;
                engine
                    .process_transaction(scope, &request)
                    .map(OperationOutcome::Exchange)
            }
        }
    }

    /// Apply directly to a desk state, bypassing locking and persistence.
    pub(crate) fn apply_to_state(
        &self,
        orchestrator: &TransactionOrchestrator,
        state: &mut DeskState,
    ) -> Result<OperationOutcome, EngineError> {
        match self {
            Operation::Deposit { asset, amount, note } => orchestrator
                .deposit(state, asset, *amount, note)
                .map(OperationOutcome::CashMovement),
            Operation::Withdrawal { asset, amount, note } => orchestrator
                .withdraw(state, asset, *amount, note)
                .map(OperationOutcome::CashMovement),
            Operation::Exchange { .. } => {
                let request = self.to_request()?.ok_or_else(|| {
                    EngineError::InvalidOperationType("exchange".to_string())
                })?;
                orchestrator
                    .execute(state, &request)
                    .map(OperationOutcome::Exchange)
            }
        }
    }
}

/// What happened when a stream was replayed.
#[derive(Debug, Clone, Default, Serialize)]
pub struct ReplayReport {
    pub applied: usize,
    /// Index into the stream and the error text of each rejected operation.
    pub rejected: Vec<(usize, String)>,
}

/// Apply every operation in order. A rejected operation is recorded and
/// the replay continues with the next one.
pub fn replay(engine: &CashDeskEngine, scope: &ScopeId, operations: &[Operation]) -> ReplayReport {
    let mut report = ReplayReport::default();
    for (index, op) in operations.iter().enumerate() {
        match op.apply(engine, scope) {
            Ok(_) => report.applied += 1,
            Err(e) => {
                debug!("operation {index} rejected: {e}");
                report.rejected.push((index, e.to_string()));
            }
        }
    }
    report
}
