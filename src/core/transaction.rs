use crate::core::asset::AssetCode;
use crate::core::error::EngineError;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use uuid::Uuid;

/// The kind of a user-facing cash desk operation.
///
/// The first three are exchanges and go through the calculator and the
/// matching engine; deposits and withdrawals only move a balance.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TransactionKind {
    #[serde(alias = "fiat_to_crypto")]
    FiatToSettlement,
    #[serde(alias = "crypto_to_fiat")]
    SettlementToFiat,
    FiatToFiat,
    Deposit,
    Withdrawal,
}

impl TransactionKind {
    pub fn as_str(&self) -> &'static str {
        match self {
            TransactionKind::FiatToSettlement => "fiat_to_settlement",
            TransactionKind::SettlementToFiat => "settlement_to_fiat",
            TransactionKind::FiatToFiat => "fiat_to_fiat",
            TransactionKind::Deposit => "deposit",
            TransactionKind::Withdrawal => "withdrawal",
        }
    }

    pub fn is_exchange(&self) -> bool {
        matches!(
            self,
            TransactionKind::FiatToSettlement
                | TransactionKind::SettlementToFiat
                | TransactionKind::FiatToFiat
        )
    }
}

impl fmt::Display for TransactionKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for TransactionKind {
    type Err = EngineError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim() {
            "fiat_to_settlement" | "fiat_to_crypto" => Ok(TransactionKind::FiatToSettlement),
            "settlement_to_fiat" | "crypto_to_fiat" => Ok(TransactionKind::SettlementToFiat),
            "fiat_to_fiat" => Ok(TransactionKind::FiatToFiat),
            "deposit" => Ok(TransactionKind::Deposit),
            "withdrawal" => Ok(TransactionKind::Withdrawal),
            other => Err(EngineError::InvalidOperationType(other.to_string())),
        }
    }
}

/// Whether the fee was paid on top of the payout or withheld from it.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FeeDirection {
    Added,
    Deducted,
    None,
}

/// One line of a transaction's calculation log.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct CalculationStep {
    pub step: u32,
    pub description: String,
    pub formula: String,
    pub field: String,
    pub value: Decimal,
}

/// An incoming exchange request.
///
/// # Examples
///
/// ```
/// use cash_desk_engine::core::transaction::{TransactionKind, TransactionRequest};
/// use rust_decimal_macros::dec;
///
/// let request = TransactionRequest::new(
///     TransactionKind::SettlementToFiat,
///     "USDT",
///     "CZK",
///     dec!(100),
///     dec!(21.5),
/// )
/// .with_fee(dec!(1.5))
/// .with_note("walk-in");
///
/// assert_eq!(request.to_asset.as_str(), "CZK");
/// assert_eq!(request.fee_percent, dec!(1.5));
/// ```
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TransactionRequest {
    pub kind: TransactionKind,
    pub from_asset: AssetCode,
    pub to_asset: AssetCode,
    pub amount_from: Decimal,
    pub rate: Decimal,
    #[serde(default)]
    pub fee_percent: Decimal,
    #[serde(default)]
    pub note: String,
}

impl TransactionRequest {
    pub fn new(
        kind: TransactionKind,
        from_asset: impl Into<AssetCode>,
        to_asset: impl Into<AssetCode>,
        amount_from: Decimal,
        rate: Decimal,
    ) -> Self {
        Self {
            kind,
            from_asset: from_asset.into(),
            to_asset: to_asset.into(),
            amount_from,
            rate,
            fee_percent: Decimal::ZERO,
            note: String::new(),
        }
    }

    /// Build a request from an untyped kind string, as received from a
    /// caller that has not validated it.
    pub fn parse(
        kind: &str,
        from_asset: impl Into<AssetCode>,
        to_asset: impl Into<AssetCode>,
        amount_from: Decimal,
        rate: Decimal,
    ) -> Result<Self, EngineError> {
        let kind: TransactionKind = kind.parse()?;
        Ok(Self::new(kind, from_asset, to_asset, amount_from, rate))
    }

    pub fn with_fee(mut self, fee_percent: Decimal) -> Self {
        self.fee_percent = fee_percent;
        self
    }

    pub fn with_note(mut self, note: impl Into<String>) -> Self {
        self.note = note.into();
        self
    }
}

/// A persisted cash desk operation with all derived amounts.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Transaction {
    pub id: Uuid,
    pub kind: TransactionKind,
    pub from_asset: AssetCode,
    /// Absent for deposits and withdrawals.
    pub to_asset: Option<AssetCode>,
    pub amount_from: Decimal,
    pub rate: Decimal,
    pub fee_percent: Decimal,
    pub clean_amount: Decimal,
    pub fee_amount: Decimal,
    pub final_amount: Decimal,
    pub accounting_rate: Option<Decimal>,
    pub fee_direction: FeeDirection,
    pub realized_profit: Decimal,
    pub realized_profit_settlement: Decimal,
    pub profit_currency: Option<AssetCode>,
    /// Settlement cost carried into the destination lot of a fiat hop.
    pub cost_basis_settlement: Option<Decimal>,
    /// Destination fiat per settlement unit of carried cost.
    pub cost_basis_rate: Option<Decimal>,
    pub note: String,
    pub calculation_log: Vec<CalculationStep>,
    pub created_at: DateTime<Utc>,
    pub is_modified: bool,
    pub modified_at: Option<DateTime<Utc>>,
}

impl Transaction {
    /// A deposit or withdrawal record. Neither carries a rate, fee or profit.
    pub fn cash_movement(
        kind: TransactionKind,
        asset: AssetCode,
        amount: Decimal,
        note: impl Into<String>,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            kind,
            from_asset: asset,
            to_asset: None,
            amount_from: amount,
            rate: Decimal::ZERO,
            fee_percent: Decimal::ZERO,
            clean_amount: Decimal::ZERO,
            fee_amount: Decimal::ZERO,
            final_amount: Decimal::ZERO,
            accounting_rate: None,
            fee_direction: FeeDirection::None,
            realized_profit: Decimal::ZERO,
            realized_profit_settlement: Decimal::ZERO,
            profit_currency: None,
            cost_basis_settlement: None,
            cost_basis_rate: None,
            note: note.into(),
            calculation_log: Vec::new(),
            created_at: Utc::now(),
            is_modified: false,
            modified_at: None,
        }
    }
}

/// Changes allowed on an already recorded transaction.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct TransactionAmendment {
    pub amount_from: Option<Decimal>,
    pub rate: Option<Decimal>,
    pub fee_percent: Option<Decimal>,
    pub note: Option<String>,
}

impl TransactionAmendment {
    /// True when the amendment touches an input of the calculator.
    pub fn changes_amounts(&self) -> bool {
        self.amount_from.is_some() || self.rate.is_some() || self.fee_percent.is_some()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rust_decimal_macros::dec;

    #[test]
    fn test_kind_parse_accepts_legacy_names() {
        assert_eq!(
            "fiat_to_crypto".parse::<TransactionKind>().unwrap(),
            TransactionKind::FiatToSettlement
        );
        assert_eq!(
            "crypto_to_fiat".parse::<TransactionKind>().unwrap(),
            TransactionKind::SettlementToFiat
        );
        assert_eq!(
            "fiat_to_fiat".parse::<TransactionKind>().unwrap(),
            TransactionKind::FiatToFiat
        );
    }

    #[test]
    fn test_kind_parse_rejects_unknown() {
        let err = "swap".parse::<TransactionKind>().unwrap_err();
        assert!(matches!(err, EngineError::InvalidOperationType(ref s) if s == "swap"));
    }

    #[test]
    fn test_kind_serde_alias() {
        let kind: TransactionKind = serde_json::from_str("\"crypto_to_fiat\"").unwrap();
        assert_eq!(kind, TransactionKind::SettlementToFiat);
        assert_eq!(
            serde_json::to_string(&kind).unwrap(),
            "\"settlement_to_fiat\""
        );
    }

    #[test]
    fn test_is_exchange() {
        assert!(TransactionKind::FiatToFiat.is_exchange());
        assert!(!TransactionKind::Deposit.is_exchange());
        assert!(!TransactionKind::Withdrawal.is_exchange());
    }

    #[test]
    fn test_request_parse() {
        let req = TransactionRequest::parse("fiat_to_fiat", "czk", "eur", dec!(1000), dec!(24.5))
            .unwrap();
        assert_eq!(req.kind, TransactionKind::FiatToFiat);
        assert_eq!(req.from_asset.as_str(), "CZK");
        assert_eq!(req.fee_percent, Decimal::ZERO);
        assert!(TransactionRequest::parse("bogus", "CZK", "EUR", dec!(1), dec!(1)).is_err());
    }

    #[test]
    fn test_request_deserializes_with_defaults() {
        let json = r#"{"kind":"fiat_to_crypto","from_asset":"CZK","to_asset":"USDT","amount_from":"2100","rate":"21"}"#;
        let req: TransactionRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.kind, TransactionKind::FiatToSettlement);
        assert_eq!(req.amount_from, dec!(2100));
        assert!(req.note.is_empty());
    }

    #[test]
    fn test_cash_movement_has_no_profit() {
        let tx = Transaction::cash_movement(
            TransactionKind::Deposit,
            AssetCode::new("CZK"),
            dec!(500),
            "float",
        );
        assert_eq!(tx.amount_from, dec!(500));
        assert_eq!(tx.realized_profit, Decimal::ZERO);
        assert!(tx.to_asset.is_none());
        assert!(!tx.is_modified);
    }

    #[test]
    fn test_amendment_changes_amounts() {
        let note_only = TransactionAmendment {
            note: Some("fixed typo".into()),
            ..Default::default()
        };
        assert!(!note_only.changes_amounts());
        let rate = TransactionAmendment {
            rate: Some(dec!(21)),
            ..Default::default()
        };
        assert!(rate.changes_amounts());
    }
}
