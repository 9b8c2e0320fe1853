use crate::core::asset::{AssetCode, AssetRegistry};
use crate::core::audit::PnLMatchRecord;
use crate::core::decimal::{round_to, SETTLEMENT_SCALE};
use crate::core::error::EngineError;
use crate::core::transaction::{
    CalculationStep, Transaction, TransactionAmendment, TransactionKind, TransactionRequest,
};
use crate::engine::calculator::{Conversion, ConversionCalculator};
use crate::engine::matching::ProfitMatchingEngine;
use crate::ledger::lots::{FiatLot, LotSource};
use crate::ledger::state::DeskState;
use chrono::Utc;
use log::debug;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// What an exchange produced.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionResult {
    pub transaction: Transaction,
    pub matches: Vec<PnLMatchRecord>,
    /// The lot opened by the operation, if any.
    pub lot: Option<FiatLot>,
}

/// Profit booked by an exchange.
struct Realized {
    fiat: Decimal,
    settlement: Decimal,
    currency: AssetCode,
    cost_basis: Option<(Decimal, Decimal)>,
}

/// Runs one operation against a desk's state.
///
/// Methods mutate the state they are handed as they go; on error the caller
/// rolls it back to a [`Checkpoint`](crate::ledger::state::Checkpoint).
#[derive(Debug, Clone)]
pub struct TransactionOrchestrator {
    calculator: ConversionCalculator,
    matcher: ProfitMatchingEngine,
    epsilon: Decimal,
}

impl TransactionOrchestrator {
    pub fn new(registry: AssetRegistry, epsilon: Decimal) -> Self {
        Self {
            calculator: ConversionCalculator::new(registry),
            matcher: ProfitMatchingEngine::new(epsilon),
            epsilon,
        }
    }

    pub fn registry(&self) -> &AssetRegistry {
        self.calculator.registry()
    }

    pub fn execute(
        &self,
        state: &mut DeskState,
        request: &TransactionRequest,
    ) -> Result<TransactionResult, EngineError> {
        if !request.kind.is_exchange() {
            return Err(EngineError::InvalidOperationType(request.kind.to_string()));
        }
        let conversion = self.calculator.compute(request)?;
        let tx_id = Uuid::new_v4();

        let (realized, matches, lot) = match request.kind {
            TransactionKind::FiatToSettlement => self.buy_settlement(state, request, &conversion, tx_id)?,
            TransactionKind::SettlementToFiat => self.sell_settlement(state, request, &conversion, tx_id)?,
            TransactionKind::FiatToFiat => self.exchange_fiat(state, request, &conversion, tx_id)?,
            TransactionKind::Deposit | TransactionKind::Withdrawal => {
                return Err(EngineError::InvalidOperationType(request.kind.to_string()));
            }
        };

        let mut calculation_log = conversion.calculation_log.clone();
        push_profit_step(&mut calculation_log, realized.fiat);

        let transaction = Transaction {
            id: tx_id,
            kind: request.kind,
            from_asset: request.from_asset.clone(),
            to_asset: Some(request.to_asset.clone()),
            amount_from: request.amount_from,
            rate: request.rate,
            fee_percent: conversion.fee_percent,
            clean_amount: conversion.clean_amount,
            fee_amount: conversion.fee_amount,
            final_amount: conversion.final_amount,
            accounting_rate: conversion.accounting_rate,
            fee_direction: conversion.fee_direction,
            realized_profit: realized.fiat,
            realized_profit_settlement: realized.settlement,
            profit_currency: Some(realized.currency),
            cost_basis_settlement: realized.cost_basis.map(|(cost, _)| cost),
            cost_basis_rate: realized.cost_basis.map(|(_, rate)| rate),
            note: request.note.clone(),
            calculation_log,
            created_at: Utc::now(),
            is_modified: false,
            modified_at: None,
        };

        state.transactions.push(transaction.clone());
        state.matches.extend(matches.iter().cloned());

        Ok(TransactionResult {
            transaction,
            matches,
            lot,
        })
    }

    /// Fiat in, settlement out. The fiat received becomes a direct lot.
    fn buy_settlement(
        &self,
        state: &mut DeskState,
        request: &TransactionRequest,
        conversion: &Conversion,
        tx_id: Uuid,
    ) -> Result<(Realized, Vec<PnLMatchRecord>, Option<FiatLot>), EngineError> {
        let from = &request.from_asset;
        let to = &request.to_asset;
        state.balances.ensure_sufficient(to, conversion.final_amount)?;

        state.balances.apply_delta(to, -conversion.final_amount)?;
        state.balances.apply_delta(from, request.amount_from)?;

        let lot = if self.registry().is_fiat(from) {
            let rate = request
                .amount_from
                .checked_div(conversion.final_amount)
                .ok_or(EngineError::Arithmetic("lot rate"))?;
            let lot = state.lots.create_lot(
                from.clone(),
                request.amount_from,
                rate,
                LotSource::DirectPurchase,
                None,
                tx_id,
            )?;
            Some(lot.clone())
        } else {
            None
        };

        Ok((
            Realized {
                fiat: Decimal::ZERO,
                settlement: Decimal::ZERO,
                currency: from.clone(),
                cost_basis: None,
            },
            Vec::new(),
            lot,
        ))
    }

    /// Settlement in, fiat out. The fiat paid is matched against lots.
    fn sell_settlement(
        &self,
        state: &mut DeskState,
        request: &TransactionRequest,
        conversion: &Conversion,
        tx_id: Uuid,
    ) -> Result<(Realized, Vec<PnLMatchRecord>, Option<FiatLot>), EngineError> {
        let from = &request.from_asset;
        let to = &request.to_asset;
        state.balances.ensure_sufficient(to, conversion.final_amount)?;

        let (fiat, settlement, matches) = match self.registry().convention(to) {
            Some(convention) => {
                let sale = self.matcher.match_sale(
                    &mut state.lots,
                    to,
                    convention,
                    conversion.final_amount,
                    request.amount_from,
                    tx_id,
                )?;
                (sale.realized_fiat, sale.realized_settlement, sale.records)
            }
            None => (Decimal::ZERO, Decimal::ZERO, Vec::new()),
        };

        state.balances.apply_delta(to, -conversion.final_amount)?;
        state.balances.apply_delta(from, request.amount_from)?;

        Ok((
            Realized {
                fiat,
                settlement,
                currency: to.clone(),
                cost_basis: None,
            },
            matches,
            None,
        ))
    }

    /// Fiat to fiat. Cost basis follows the money into a chained lot.
    fn exchange_fiat(
        &self,
        state: &mut DeskState,
        request: &TransactionRequest,
        conversion: &Conversion,
        tx_id: Uuid,
    ) -> Result<(Realized, Vec<PnLMatchRecord>, Option<FiatLot>), EngineError> {
        let from = &request.from_asset;
        let to = &request.to_asset;
        state.balances.ensure_sufficient(from, request.amount_from)?;

        let transfer = self
            .matcher
            .consume_cost_basis(&mut state.lots, from, request.amount_from)?;

        let mut lot = None;
        let mut cost_basis = None;
        if transfer.cost_basis_settlement > self.epsilon && self.registry().is_fiat(to) {
            // The whole proceeds inherit the cost of the covered part.
            let cost = transfer.cost_basis_settlement;
            let rate = conversion
                .final_amount
                .checked_div(cost)
                .ok_or(EngineError::Arithmetic("chained lot rate"))?;
            let created = state.lots.create_lot(
                to.clone(),
                conversion.final_amount,
                rate,
                LotSource::ChainedExchange,
                Some(cost),
                tx_id,
            )?;
            lot = Some(created.clone());
            cost_basis = Some((
                round_to(cost, SETTLEMENT_SCALE),
                round_to(rate, SETTLEMENT_SCALE),
            ));
        } else {
            debug!(
                "{} {} -> {} carried no cost basis",
                request.amount_from, from, to
            );
        }

        state.balances.apply_delta(from, -request.amount_from)?;
        state.balances.apply_delta(to, conversion.final_amount)?;

        Ok((
            Realized {
                fiat: Decimal::ZERO,
                settlement: Decimal::ZERO,
                currency: self.registry().settlement().clone(),
                cost_basis,
            },
            Vec::new(),
            lot,
        ))
    }

    /// Credit cash that arrived outside an exchange. No lot is created.
    pub fn deposit(
        &self,
        state: &mut DeskState,
        asset: &AssetCode,
        amount: Decimal,
        note: &str,
    ) -> Result<Transaction, EngineError> {
        validate_cash_movement(asset, amount)?;
        state.balances.apply_delta(asset, amount)?;

        let tx = Transaction::cash_movement(TransactionKind::Deposit, asset.clone(), amount, note);
        state.transactions.push(tx.clone());
        Ok(tx)
    }

    pub fn withdraw(
        &self,
        state: &mut DeskState,
        asset: &AssetCode,
        amount: Decimal,
        note: &str,
    ) -> Result<Transaction, EngineError> {
        validate_cash_movement(asset, amount)?;
        state.balances.ensure_sufficient(asset, amount)?;
        state.balances.apply_delta(asset, -amount)?;

        let tx = Transaction::cash_movement(TransactionKind::Withdrawal, asset.clone(), amount, note);
        state.transactions.push(tx.clone());
        Ok(tx)
    }

    /// Re-price a recorded transaction. Balances, lots and realized profit
    /// keep what actually happened.
    pub fn amend(
        &self,
        state: &mut DeskState,
        id: Uuid,
        amendment: &TransactionAmendment,
    ) -> Result<Transaction, EngineError> {
        let tx = state
            .transaction_mut(id)
            .ok_or(EngineError::TransactionNotFound(id))?;

        if tx.kind.is_exchange() {
            if amendment.changes_amounts() {
                let to_asset = tx
                    .to_asset
                    .clone()
                    .ok_or_else(|| EngineError::invalid("to_asset", "missing on exchange"))?;
                let request = TransactionRequest::new(
                    tx.kind,
                    tx.from_asset.clone(),
                    to_asset,
                    amendment.amount_from.unwrap_or(tx.amount_from),
                    amendment.rate.unwrap_or(tx.rate),
                )
                .with_fee(amendment.fee_percent.unwrap_or(tx.fee_percent));
                let conversion = self.calculator.compute(&request)?;

                tx.amount_from = request.amount_from;
                tx.rate = request.rate;
                tx.fee_percent = conversion.fee_percent;
                tx.clean_amount = conversion.clean_amount;
                tx.fee_amount = conversion.fee_amount;
                tx.final_amount = conversion.final_amount;
                tx.accounting_rate = conversion.accounting_rate;
                tx.fee_direction = conversion.fee_direction;
                tx.calculation_log = conversion.calculation_log;
                push_profit_step(&mut tx.calculation_log, tx.realized_profit);
            }
        } else if amendment.changes_amounts() {
            return Err(EngineError::invalid(
                "amendment",
                format!("only the note of a {} can change", tx.kind),
            ));
        }

        if let Some(note) = &amendment.note {
            tx.note = note.clone();
        }
        tx.is_modified = true;
        tx.modified_at = Some(Utc::now());
        Ok(tx.clone())
    }
}

fn validate_cash_movement(asset: &AssetCode, amount: Decimal) -> Result<(), EngineError> {
    if asset.is_empty() {
        return Err(EngineError::invalid("asset", "must not be empty"));
    }
    if amount <= Decimal::ZERO {
        return Err(EngineError::invalid("amount", "must be positive"));
    }
    Ok(())
}

fn push_profit_step(log: &mut Vec<CalculationStep>, realized: Decimal) {
    log.push(CalculationStep {
        step: log.len() as u32 + 1,
        description: "Realized profit".to_string(),
        formula: "sum of matched profit pieces".to_string(),
        field: "realized_profit".to_string(),
        value: realized,
    });
}
