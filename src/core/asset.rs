use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

/// Symbol of an asset held by a cash desk.
///
/// Covers both fiat currencies (CZK, USD, EUR) and the settlement asset
/// (USDT). Symbols are trimmed and upper-cased on construction so that
/// `"czk"` and `"CZK"` address the same balance.
///
/// # Examples
///
/// ```
/// use cash_desk_engine::core::asset::AssetCode;
///
/// let czk = AssetCode::new(" czk ");
/// assert_eq!(czk.as_str(), "CZK");
/// assert_ne!(czk, AssetCode::new("EUR"));
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
#[serde(from = "String", into = "String")]
pub struct AssetCode(String);

impl AssetCode {
    pub fn new(code: impl AsRef<str>) -> Self {
        Self(code.as_ref().trim().to_ascii_uppercase())
    }

    pub fn as_str(&self) -> &str {
        &self.0
    }

    pub fn is_empty(&self) -> bool {
        self.0.is_empty()
    }
}

impl fmt::Display for AssetCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

impl From<&str> for AssetCode {
    fn from(s: &str) -> Self {
        Self::new(s)
    }
}

impl From<String> for AssetCode {
    fn from(s: String) -> Self {
        Self::new(s)
    }
}

impl From<AssetCode> for String {
    fn from(code: AssetCode) -> Self {
        code.0
    }
}

/// How a fiat currency's quoted rate relates to the settlement asset.
///
/// The desk quotes rates per pair by habit rather than by a single rule, so
/// the direction of every conversion depends on which fiat is involved.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum RateConvention {
    /// Local currency quoted as fiat per settlement unit (CZK 21.0).
    Divide,
    /// Quoted as settlement per fiat unit (EUR 1.16). Profit pieces are
    /// converted by multiplying with the effective rate.
    Multiply,
    /// Every other fiat.
    Standard,
}

impl RateConvention {
    /// Converts a fiat profit piece into settlement terms.
    pub fn profit_to_settlement(self, fiat: Decimal, rate: Decimal) -> Option<Decimal> {
        match self {
            RateConvention::Multiply => fiat.checked_mul(rate),
            RateConvention::Divide | RateConvention::Standard => fiat.checked_div(rate),
        }
    }

    /// Converts a settlement profit piece into fiat terms, using the same
    /// operator as [`Self::profit_to_settlement`].
    pub fn profit_to_fiat(self, settlement: Decimal, rate: Decimal) -> Option<Decimal> {
        match self {
            RateConvention::Multiply => settlement.checked_mul(rate),
            RateConvention::Divide | RateConvention::Standard => settlement.checked_div(rate),
        }
    }
}

/// Role an asset plays in the desk.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum AssetClass {
    Settlement,
    Fiat(RateConvention),
    Other,
}

/// Classifies asset symbols for the calculator and the matching engine.
///
/// # Examples
///
/// ```
/// use cash_desk_engine::core::asset::{AssetClass, AssetCode, AssetRegistry, RateConvention};
///
/// let registry = AssetRegistry::new(AssetCode::new("USDT"))
///     .with_fiat(AssetCode::new("CZK"), RateConvention::Divide)
///     .with_fiat(AssetCode::new("EUR"), RateConvention::Multiply);
///
/// assert_eq!(registry.classify(&AssetCode::new("USDT")), AssetClass::Settlement);
/// assert_eq!(
///     registry.classify(&AssetCode::new("EUR")),
///     AssetClass::Fiat(RateConvention::Multiply)
/// );
/// assert_eq!(registry.classify(&AssetCode::new("BTC")), AssetClass::Other);
/// ```
#[derive(Debug, Clone)]
pub struct AssetRegistry {
    settlement: AssetCode,
    fiat: HashMap<AssetCode, RateConvention>,
}

impl AssetRegistry {
    pub fn new(settlement: AssetCode) -> Self {
        Self {
            settlement,
            fiat: HashMap::new(),
        }
    }

    /// Register a fiat currency with its rate convention.
    pub fn with_fiat(mut self, code: AssetCode, convention: RateConvention) -> Self {
        self.fiat.insert(code, convention);
        self
    }

    pub fn settlement(&self) -> &AssetCode {
        &self.settlement
    }

    pub fn classify(&self, asset: &AssetCode) -> AssetClass {
        if *asset == self.settlement {
            return AssetClass::Settlement;
        }
        match self.fiat.get(asset) {
            Some(convention) => AssetClass::Fiat(*convention),
            None => AssetClass::Other,
        }
    }

    pub fn is_settlement(&self, asset: &AssetCode) -> bool {
        *asset == self.settlement
    }

    pub fn convention(&self, asset: &AssetCode) -> Option<RateConvention> {
        self.fiat.get(asset).copied()
    }

    pub fn is_fiat(&self, asset: &AssetCode) -> bool {
        self.fiat.contains_key(asset)
    }

    /// All registered fiat currencies, sorted.
    pub fn fiat_assets(&self) -> Vec<AssetCode> {
        let mut codes: Vec<AssetCode> = self.fiat.keys().cloned().collect();
        codes.sort();
        codes
    }
}
