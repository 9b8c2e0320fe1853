//! Mutable per-desk state: cash balances and fiat cost lots.

pub mod balance;
pub mod lots;
pub mod state;
