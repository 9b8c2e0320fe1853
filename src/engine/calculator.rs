use crate::core::asset::{AssetClass, AssetRegistry, RateConvention};
use crate::core::decimal::{percent_factor, round_whole};
use crate::core::error::EngineError;
use crate::core::transaction::{CalculationStep, FeeDirection, TransactionKind, TransactionRequest};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};

/// Derived amounts of one exchange.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Conversion {
    pub clean_amount: Decimal,
    pub fee_amount: Decimal,
    pub final_amount: Decimal,
    pub accounting_rate: Option<Decimal>,
    pub fee_direction: FeeDirection,
    /// The fee actually applied; fiat hops always carry zero.
    pub fee_percent: Decimal,
    pub calculation_log: Vec<CalculationStep>,
}

/// Stateless pricing of exchange requests.
///
/// The quoted rate is applied according to the pair's convention:
///
/// | kind | condition | clean |
/// |---|---|---|
/// | fiat → settlement | from is a divide fiat | `amount / rate` |
/// | settlement → fiat | to is a divide fiat | `amount * rate` |
/// | settlement → fiat | to is a multiply fiat | `amount / rate` |
/// | fiat → fiat | | `amount / rate` |
/// | otherwise | | `amount * rate` |
///
/// Final amounts are rounded half-up to whole units.
#[derive(Debug, Clone)]
pub struct ConversionCalculator {
    registry: AssetRegistry,
}

impl ConversionCalculator {
    pub fn new(registry: AssetRegistry) -> Self {
        Self { registry }
    }

    pub fn registry(&self) -> &AssetRegistry {
        &self.registry
    }

    pub fn compute(&self, request: &TransactionRequest) -> Result<Conversion, EngineError> {
        self.validate(request)?;

        let amount = request.amount_from;
        let rate = request.rate;
        let from_class = self.registry.classify(&request.from_asset);
        let to_class = self.registry.classify(&request.to_asset);

        let mut log = CalculationLog::default();

        let conversion = match request.kind {
            TransactionKind::FiatToSettlement => {
                let clean = match from_class {
                    AssetClass::Fiat(RateConvention::Divide) => div(amount, rate, "clean amount")?,
                    _ => mul(amount, rate, "clean amount")?,
                };
                log.push("Clean amount", convert_formula(from_class, false), "clean_amount", clean);

                let factor = percent_factor(request.fee_percent);
                let final_amount = round_whole(div(clean, factor, "final amount")?);
                let fee = clean - final_amount;
                log.push("Fee withheld", "clean - final", "fee_amount", fee);
                log.push(
                    "Final amount",
                    "round(clean / (1 + fee% / 100))",
                    "final_amount",
                    final_amount,
                );

                let accounting_rate = fiat_leg_rate(from_class, rate, factor)?;
                if let Some(r) = accounting_rate {
                    log.push("Accounting rate", accounting_formula(from_class), "accounting_rate", r);
                }

                Conversion {
                    clean_amount: clean,
                    fee_amount: fee,
                    final_amount,
                    accounting_rate,
                    fee_direction: FeeDirection::Deducted,
                    fee_percent: request.fee_percent,
                    calculation_log: Vec::new(),
                }
            }
            TransactionKind::SettlementToFiat => {
                let clean = match to_class {
                    AssetClass::Fiat(RateConvention::Multiply) => div(amount, rate, "clean amount")?,
                    _ => mul(amount, rate, "clean amount")?,
                };
                log.push("Clean amount", convert_formula(to_class, true), "clean_amount", clean);

                let factor = percent_factor(request.fee_percent);
                let final_amount = round_whole(mul(clean, factor, "final amount")?);
                let fee = final_amount - clean;
                log.push("Fee added", "final - clean", "fee_amount", fee);
                log.push(
                    "Final amount",
                    "round(clean * (1 + fee% / 100))",
                    "final_amount",
                    final_amount,
                );

                let accounting_rate = fiat_leg_rate(to_class, rate, factor)?;
                if let Some(r) = accounting_rate {
                    log.push("Accounting rate", accounting_formula(to_class), "accounting_rate", r);
                }

                Conversion {
                    clean_amount: clean,
                    fee_amount: fee,
                    final_amount,
                    accounting_rate,
                    fee_direction: FeeDirection::Added,
                    fee_percent: request.fee_percent,
                    calculation_log: Vec::new(),
                }
            }
            TransactionKind::FiatToFiat => {
                let clean = div(amount, rate, "clean amount")?;
                let final_amount = round_whole(clean);
                log.push("Clean amount", "amount / rate", "clean_amount", clean);
                log.push("Final amount", "round(clean)", "final_amount", final_amount);

                Conversion {
                    clean_amount: clean,
                    fee_amount: Decimal::ZERO,
                    final_amount,
                    accounting_rate: None,
                    fee_direction: FeeDirection::None,
                    fee_percent: Decimal::ZERO,
                    calculation_log: Vec::new(),
                }
            }
            TransactionKind::Deposit | TransactionKind::Withdrawal => {
                return Err(EngineError::InvalidOperationType(request.kind.to_string()));
            }
        };

        if conversion.final_amount <= Decimal::ZERO {
            return Err(EngineError::invalid(
                "final_amount",
                format!("{} rounds to zero", conversion.clean_amount),
            ));
        }

        Ok(Conversion {
            calculation_log: log.steps,
            ..conversion
        })
    }

    fn validate(&self, request: &TransactionRequest) -> Result<(), EngineError> {
        if !request.kind.is_exchange() {
            return Err(EngineError::InvalidOperationType(request.kind.to_string()));
        }
        if request.from_asset.is_empty() {
            return Err(EngineError::invalid("from_asset", "must not be empty"));
        }
        if request.to_asset.is_empty() {
            return Err(EngineError::invalid("to_asset", "must not be empty"));
        }
        if request.from_asset == request.to_asset {
            return Err(EngineError::invalid(
                "to_asset",
                format!("cannot exchange {} into itself", request.from_asset),
            ));
        }
        if request.amount_from <= Decimal::ZERO {
            return Err(EngineError::invalid("amount_from", "must be positive"));
        }
        if request.rate <= Decimal::ZERO {
            return Err(EngineError::invalid("rate", "must be positive"));
        }
        if request.kind != TransactionKind::FiatToFiat
            && (request.fee_percent < Decimal::ZERO || request.fee_percent >= Decimal::ONE_HUNDRED)
        {
            return Err(EngineError::invalid("fee_percent", "must be in [0, 100)"));
        }

        let settlement = self.registry.settlement();
        match request.kind {
            TransactionKind::FiatToSettlement if request.to_asset != *settlement => Err(
                EngineError::invalid("to_asset", format!("must be {settlement}")),
            ),
            TransactionKind::SettlementToFiat if request.from_asset != *settlement => Err(
                EngineError::invalid("from_asset", format!("must be {settlement}")),
            ),
            TransactionKind::FiatToFiat
                if request.from_asset == *settlement || request.to_asset == *settlement =>
            {
                Err(EngineError::invalid(
                    "to_asset",
                    format!("a fiat exchange cannot involve {settlement}"),
                ))
            }
            _ => Ok(()),
        }
    }
}

#[derive(Default)]
struct CalculationLog {
    steps: Vec<CalculationStep>,
}

impl CalculationLog {
    fn push(&mut self, description: &str, formula: &str, field: &str, value: Decimal) {
        self.steps.push(CalculationStep {
            step: self.steps.len() as u32 + 1,
            description: description.to_string(),
            formula: formula.to_string(),
            field: field.to_string(),
            value,
        });
    }
}

fn div(a: Decimal, b: Decimal, what: &'static str) -> Result<Decimal, EngineError> {
    a.checked_div(b).ok_or(EngineError::Arithmetic(what))
}

fn mul(a: Decimal, b: Decimal, what: &'static str) -> Result<Decimal, EngineError> {
    a.checked_mul(b).ok_or(EngineError::Arithmetic(what))
}

/// Accounting rate of the fiat leg of a settlement exchange.
fn fiat_leg_rate(
    class: AssetClass,
    rate: Decimal,
    factor: Decimal,
) -> Result<Option<Decimal>, EngineError> {
    match class {
        AssetClass::Fiat(RateConvention::Multiply) => div(rate, factor, "accounting rate").map(Some),
        AssetClass::Fiat(_) => mul(rate, factor, "accounting rate").map(Some),
        AssetClass::Settlement | AssetClass::Other => Ok(None),
    }
}

fn convert_formula(class: AssetClass, settlement_side: bool) -> &'static str {
    match (class, settlement_side) {
        (AssetClass::Fiat(RateConvention::Divide), false) => "amount / rate",
        (AssetClass::Fiat(RateConvention::Multiply), true) => "amount / rate",
        _ => "amount * rate",
    }
}

fn accounting_formula(class: AssetClass) -> &'static str {
    match class {
        AssetClass::Fiat(RateConvention::Multiply) => "rate / (1 + fee% / 100)",
        _ => "rate * (1 + fee% / 100)",
    }
}
