//! Read-side aggregates over a desk's ledgers.

pub mod summary;
pub mod totals;
