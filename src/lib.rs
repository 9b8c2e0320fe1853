//! # cash-desk-engine
//!
//! FIFO cost-basis accounting for a multi-currency exchange cash desk.
//!
//! Every exchange between fiat and the settlement asset (or between two
//! fiat currencies) is priced, checked against the desk's cash, and booked.
//! When fiat goes back out against the settlement asset, the engine matches
//! it against the lots the desk acquired earlier, oldest first, and records
//! the realized profit with a full audit trail. Fiat-to-fiat hops carry the
//! settlement cost of the source fiat into the destination currency.
//!
//! ## Architecture
//!
//! - **core**: Assets, scopes, transactions, audit records, errors, decimal helpers
//! - **ledger**: Cash balances, fiat lots, per-desk state
//! - **engine**: Calculator, profit matching, orchestration, the multi-desk service
//! - **store**: Persistence of desk state (memory, JSON files)
//! - **reporting**: Profit summaries
//! - **simulation**: Replayable operation streams and a random generator

pub mod config;
pub mod core;
pub mod engine;
pub mod ledger;
pub mod reporting;
pub mod simulation;
pub mod store;

/// Convenience re-exports for common usage.
pub mod prelude {
    pub use crate::config::{ConfigError, EngineConfig};
    pub use crate::core::asset::{AssetCode, AssetRegistry, RateConvention};
    pub use crate::core::audit::{MatchStage, PnLMatchRecord};
    pub use crate::core::error::{EngineError, StoreError};
    pub use crate::core::scope::ScopeId;
    pub use crate::core::transaction::{
        FeeDirection, Transaction, TransactionAmendment, TransactionKind, TransactionRequest,
    };
    pub use crate::engine::orchestrator::TransactionResult;
    pub use crate::engine::service::{CashDeskEngine, SnapshotHook, TransactionSink};
    pub use crate::ledger::lots::{FiatLot, LotSource};
    pub use crate::ledger::state::DeskState;
    pub use crate::reporting::summary::ProfitSummary;
    pub use crate::store::{DeskStore, JsonFileStore, MemoryStore};
}
