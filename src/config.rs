//! Engine configuration.
//!
//! Loaded from a JSON file, or from the file named by `CASH_DESK_CONFIG`,
//! falling back to the built-in desk layout (USDT against CZK, USD and EUR).

use crate::core::asset::{AssetCode, AssetRegistry, RateConvention};
use crate::core::decimal::EPSILON;
use rust_decimal::Decimal;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::Path;
use thiserror::Error;

pub const CONFIG_ENV_VAR: &str = "CASH_DESK_CONFIG";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("cannot read config file '{path}': {source}")]
    Read {
        path: String,
        source: std::io::Error,
    },
    #[error("config is not valid JSON: {0}")]
    Parse(#[from] serde_json::Error),
    #[error("invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineConfig {
    pub settlement_asset: AssetCode,
    pub fiat_assets: Vec<AssetCode>,
    /// Fiat quoted as fiat per settlement unit.
    pub divide_convention: Vec<AssetCode>,
    /// Fiat quoted as settlement per fiat unit.
    pub multiply_convention: Vec<AssetCode>,
    /// Balances zeroed by `init_balances`.
    pub initial_assets: Vec<AssetCode>,
    pub epsilon: Decimal,
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            settlement_asset: AssetCode::new("USDT"),
            fiat_assets: codes(&["CZK", "USD", "EUR"]),
            divide_convention: codes(&["CZK"]),
            multiply_convention: codes(&["EUR"]),
            initial_assets: codes(&["USD", "USDT", "EUR", "CZK"]),
            epsilon: EPSILON,
        }
    }
}

fn codes(symbols: &[&str]) -> Vec<AssetCode> {
    symbols.iter().map(|s| AssetCode::new(s)).collect()
}

impl EngineConfig {
    pub fn from_json_str(json: &str) -> Result<Self, ConfigError> {
        let config: Self = serde_json::from_str(json)?;
        config.validate()?;
        Ok(config)
    }

    pub fn from_file(path: impl AsRef<Path>) -> Result<Self, ConfigError> {
        let path = path.as_ref();
        let content = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.display().to_string(),
            source,
        })?;
        Self::from_json_str(&content)
    }

    pub fn from_env() -> Result<Self, ConfigError> {
        Self::from_env_map(std::env::vars().collect())
    }

    pub fn from_env_map(env_map: HashMap<String, String>) -> Result<Self, ConfigError> {
        match env_map.get(CONFIG_ENV_VAR).map(|s| s.trim()) {
            Some(path) if !path.is_empty() => Self::from_file(path),
            _ => Ok(Self::default()),
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.settlement_asset.is_empty() {
            return Err(invalid("settlement_asset", "must not be empty"));
        }
        if self.fiat_assets.contains(&self.settlement_asset) {
            return Err(invalid(
                "fiat_assets",
                format!("{} is the settlement asset", self.settlement_asset),
            ));
        }
        if let Some(empty) = self.fiat_assets.iter().find(|c| c.is_empty()) {
            return Err(invalid("fiat_assets", format!("empty symbol '{empty}'")));
        }
        for (field, list) in [
            ("divide_convention", &self.divide_convention),
            ("multiply_convention", &self.multiply_convention),
        ] {
            if let Some(missing) = list.iter().find(|c| !self.fiat_assets.contains(c)) {
                return Err(invalid(field, format!("{missing} is not a fiat asset")));
            }
        }
        if let Some(both) = self
            .divide_convention
            .iter()
            .find(|c| self.multiply_convention.contains(c))
        {
            return Err(invalid(
                "multiply_convention",
                format!("{both} is also in divide_convention"),
            ));
        }
        if self.epsilon <= Decimal::ZERO {
            return Err(invalid("epsilon", "must be positive"));
        }
        Ok(())
    }

    pub fn registry(&self) -> AssetRegistry {
        self.fiat_assets.iter().fold(
            AssetRegistry::new(self.settlement_asset.clone()),
            |registry, code| {
                let convention = if self.divide_convention.contains(code) {
                    RateConvention::Divide
                } else if self.multiply_convention.contains(code) {
                    RateConvention::Multiply
                } else {
                    RateConvention::Standard
                };
                registry.with_fiat(code.clone(), convention)
            },
        )
    }
}

fn invalid(field: &str, reason: impl Into<String>) -> ConfigError {
    ConfigError::InvalidValue(field.to_string(), reason.into())
}
