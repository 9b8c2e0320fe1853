//! Random operation streams for benchmarks, property tests and the CLI.
//!
//! The generator keeps its own desk state and only emits operations that
//! the engine will accept when replayed in order from an empty desk.

use crate::config::EngineConfig;
use crate::core::asset::{AssetCode, RateConvention};
use crate::core::error::EngineError;
use crate::core::transaction::{TransactionKind, TransactionRequest};
use crate::engine::calculator::ConversionCalculator;
use crate::engine::orchestrator::TransactionOrchestrator;
use crate::ledger::state::DeskState;
use crate::simulation::operation::Operation;
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};
use rust_decimal::Decimal;

/// Market value of one unit of a fiat currency.
#[derive(Debug, Clone)]
pub struct FiatQuote {
    pub currency: AssetCode,
    /// Settlement units per one unit of this fiat.
    pub settlement_value: Decimal,
}

impl FiatQuote {
    pub fn new(currency: impl Into<AssetCode>, settlement_value: Decimal) -> Self {
        Self {
            currency: currency.into(),
            settlement_value,
        }
    }
}

#[derive(Debug, Clone)]
pub struct StreamConfig {
    pub operation_count: usize,
    pub seed: u64,
    pub quotes: Vec<FiatQuote>,
    /// Settlement deposited before the first exchange.
    pub opening_float: Decimal,
    /// Upper bound of settlement moved by a single exchange.
    pub max_ticket: u32,
    /// Quoted rates deviate from market value by up to this many basis points.
    pub spread_bp: i64,
    /// Highest fee percent, in tenths.
    pub max_fee_tenths: i64,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            operation_count: 100,
            seed: 42,
            quotes: vec![
                FiatQuote::new("CZK", Decimal::new(465, 4)),
                FiatQuote::new("EUR", Decimal::new(116, 2)),
                FiatQuote::new("USD", Decimal::ONE),
            ],
            opening_float: Decimal::from(100_000),
            max_ticket: 5_000,
            spread_bp: 150,
            max_fee_tenths: 30,
        }
    }
}

/// Generate `config.operation_count` operations (plus the opening deposit)
/// that replay cleanly against `engine_config`.
pub fn generate_operation_stream(
    engine_config: &EngineConfig,
    config: &StreamConfig,
) -> Result<Vec<Operation>, EngineError> {
    let registry = engine_config.registry();
    let calculator = ConversionCalculator::new(registry.clone());
    let orchestrator = TransactionOrchestrator::new(registry.clone(), engine_config.epsilon);
    let settlement = registry.settlement().clone();
    let quotes: Vec<(FiatQuote, RateConvention)> = config
        .quotes
        .iter()
        .filter_map(|q| registry.convention(&q.currency).map(|c| (q.clone(), c)))
        .collect();

    let mut rng = StdRng::seed_from_u64(config.seed);
    let mut state = DeskState::new();
    let mut operations = Vec::with_capacity(config.operation_count + 1);

    let opening = Operation::Deposit {
        asset: settlement.clone(),
        amount: config.opening_float,
        note: "opening float".to_string(),
    };
    opening.apply_to_state(&orchestrator, &mut state)?;
    operations.push(opening);

    if quotes.is_empty() {
        return Ok(operations);
    }

    let max_attempts = config.operation_count.saturating_mul(20).max(100);
    let mut attempts = 0;
    while operations.len() <= config.operation_count && attempts < max_attempts {
        attempts += 1;
        let (quote, convention) = &quotes[rng.gen_range(0..quotes.len())];
        let fee = Decimal::new(rng.gen_range(0..=config.max_fee_tenths), 1);
        let ticket = Decimal::from(rng.gen_range(10..=config.max_ticket.max(10)));
        let market = jitter(&mut rng, quote.settlement_value, config.spread_bp);

        let candidate = match rng.gen_range(0..100) {
            0..=39 => {
                let amount = (ticket / market).round();
                Operation::Exchange {
                    kind: TransactionKind::FiatToSettlement.to_string(),
                    from: quote.currency.clone(),
                    to: settlement.clone(),
                    amount,
                    rate: quoted_rate(TransactionKind::FiatToSettlement, *convention, market),
                    fee_percent: fee,
                    note: String::new(),
                }
            }
            40..=74 => Operation::Exchange {
                kind: TransactionKind::SettlementToFiat.to_string(),
                from: settlement.clone(),
                to: quote.currency.clone(),
                amount: ticket,
                rate: quoted_rate(TransactionKind::SettlementToFiat, *convention, market),
                fee_percent: fee,
                note: String::new(),
            },
            75..=89 => {
                let (target, _) = &quotes[rng.gen_range(0..quotes.len())];
                if target.currency == quote.currency {
                    continue;
                }
                let available = state.balances.balance(&quote.currency);
                let share = Decimal::new(rng.gen_range(10..=100), 2);
                let amount = (available * share).floor();
                let target_value = jitter(&mut rng, target.settlement_value, config.spread_bp);
                Operation::Exchange {
                    kind: TransactionKind::FiatToFiat.to_string(),
                    from: quote.currency.clone(),
                    to: target.currency.clone(),
                    amount,
                    rate: (target_value / market).round_dp(5),
                    fee_percent: Decimal::ZERO,
                    note: String::new(),
                }
            }
            90..=94 => Operation::Deposit {
                asset: quote.currency.clone(),
                amount: (ticket / market).round(),
                note: String::new(),
            },
            _ => {
                let available = state.balances.balance(&quote.currency);
                Operation::Withdrawal {
                    asset: quote.currency.clone(),
                    amount: (available * Decimal::new(rng.gen_range(1..=20), 2)).floor(),
                    note: String::new(),
                }
            }
        };

        if !is_feasible(&calculator, &state, &candidate)? {
            continue;
        }
        candidate.apply_to_state(&orchestrator, &mut state)?;
        operations.push(candidate);
    }

    Ok(operations)
}

/// Whether `op` would be accepted against `state` without touching it.
fn is_feasible(
    calculator: &ConversionCalculator,
    state: &DeskState,
    op: &Operation,
) -> Result<bool, EngineError> {
    match op {
        Operation::Deposit { amount, .. } => Ok(*amount > Decimal::ZERO),
        Operation::Withdrawal { asset, amount, .. } => {
            Ok(*amount > Decimal::ZERO && state.balances.balance(asset) >= *amount)
        }
        Operation::Exchange { .. } => {
            let Some(request) = op.to_request()? else {
                return Ok(false);
            };
            let Ok(conversion) = calculator.compute(&request) else {
                return Ok(false);
            };
            let (asset, required) = outgoing_leg(&request, conversion.final_amount);
            Ok(state.balances.balance(asset) >= required)
        }
    }
}

fn outgoing_leg(request: &TransactionRequest, final_amount: Decimal) -> (&AssetCode, Decimal) {
    match request.kind {
        TransactionKind::FiatToFiat => (&request.from_asset, request.amount_from),
        _ => (&request.to_asset, final_amount),
    }
}

/// The rate a desk would quote for `kind` on a fiat with `convention`,
/// given the fiat's value in settlement units.
fn quoted_rate(kind: TransactionKind, convention: RateConvention, value: Decimal) -> Decimal {
    let per_settlement = (Decimal::ONE / value).round_dp(4);
    match (kind, convention) {
        (_, RateConvention::Divide) => per_settlement,
        (_, RateConvention::Multiply) => value,
        (TransactionKind::SettlementToFiat, RateConvention::Standard) => per_settlement,
        (_, RateConvention::Standard) => value,
    }
}

fn jitter(rng: &mut StdRng, value: Decimal, spread_bp: i64) -> Decimal {
    let spread = spread_bp.abs();
    let bp = Decimal::new(rng.gen_range(-spread..=spread), 4);
    (value * (Decimal::ONE + bp)).round_dp(6)
}
