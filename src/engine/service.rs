use crate::config::{ConfigError, EngineConfig};
use crate::core::asset::AssetCode;
use crate::core::audit::PnLMatchRecord;
use crate::core::error::EngineError;
use crate::core::scope::ScopeId;
use crate::core::transaction::{Transaction, TransactionAmendment, TransactionRequest};
use crate::engine::orchestrator::{TransactionOrchestrator, TransactionResult};
use crate::ledger::lots::FiatLot;
use crate::ledger::state::DeskState;
use crate::reporting::summary::ProfitSummary;
use crate::reporting::totals;
use crate::store::{DeskStore, MemoryStore};
use log::{info, warn};
use parking_lot::{Mutex, RwLock};
use rust_decimal::Decimal;
use std::collections::{BTreeMap, HashMap};
use std::error::Error;
use std::sync::Arc;
use uuid::Uuid;

pub type HookError = Box<dyn Error + Send + Sync>;

/// Called under the scope lock before an operation touches anything.
///
/// Returning an error aborts the operation.
pub trait SnapshotHook: Send + Sync {
    fn before_operation(&self, scope: &ScopeId, state: &DeskState) -> Result<(), HookError>;
}

/// Notified after an operation commits. Failures are logged and ignored.
pub trait TransactionSink: Send + Sync {
    fn transaction_committed(
        &self,
        scope: &ScopeId,
        transaction: &Transaction,
        balances: &BTreeMap<AssetCode, Decimal>,
    ) -> Result<(), HookError>;
}

/// Multi-desk accounting engine.
///
/// Operations on one scope are serialized by a per-scope mutex; different
/// scopes proceed in parallel. An operation that fails, or that the store
/// does not accept, is rolled back to the state it started from.
///
/// # Examples
///
/// ```
/// use cash_desk_engine::prelude::*;
/// use rust_decimal_macros::dec;
///
/// let engine = CashDeskEngine::new(EngineConfig::default()).unwrap();
/// let desk = ScopeId::new("acme", "prague");
///
/// engine.deposit(&desk, &AssetCode::new("USDT"), dec!(1000), "opening float").unwrap();
/// let buy = TransactionRequest::new(TransactionKind::FiatToSettlement, "CZK", "USDT", dec!(2100), dec!(21));
/// let result = engine.process_transaction(&desk, &buy).unwrap();
///
/// assert_eq!(result.transaction.final_amount, dec!(100));
/// assert_eq!(engine.lots(&desk, None).unwrap().len(), 1);
/// ```
pub struct CashDeskEngine {
    config: EngineConfig,
    orchestrator: TransactionOrchestrator,
    store: Arc<dyn DeskStore>,
    desks: RwLock<HashMap<ScopeId, Arc<Mutex<DeskState>>>>,
    hooks: Vec<Arc<dyn SnapshotHook>>,
    sinks: Vec<Arc<dyn TransactionSink>>,
}

impl CashDeskEngine {
    /// An engine backed by a [`MemoryStore`].
    pub fn new(config: EngineConfig) -> Result<Self, ConfigError> {
        Self::with_store(config, Arc::new(MemoryStore::new()))
    }

    pub fn with_store(config: EngineConfig, store: Arc<dyn DeskStore>) -> Result<Self, ConfigError> {
        config.validate()?;
        let orchestrator = TransactionOrchestrator::new(config.registry(), config.epsilon);
        Ok(Self {
            config,
            orchestrator,
            store,
            desks: RwLock::new(HashMap::new()),
            hooks: Vec::new(),
            sinks: Vec::new(),
        })
    }

    pub fn with_snapshot_hook(mut self, hook: Arc<dyn SnapshotHook>) -> Self {
        self.hooks.push(hook);
        self
    }

    pub fn with_sink(mut self, sink: Arc<dyn TransactionSink>) -> Self {
        self.sinks.push(sink);
        self
    }

    pub fn config(&self) -> &EngineConfig {
        &self.config
    }

    pub fn process_transaction(
        &self,
        scope: &ScopeId,
        request: &TransactionRequest,
    ) -> Result<TransactionResult, EngineError> {
        let (result, balances) = self
            .mutate(scope, None, |o, state| o.execute(state, request))
            .inspect_err(|e| log_rejection(scope, e))?;

        let tx = &result.transaction;
        info!(
            "{scope}: {} {} {} -> {} {} (profit {} {})",
            tx.kind,
            tx.amount_from,
            tx.from_asset,
            tx.final_amount,
            request.to_asset,
            tx.realized_profit,
            tx.profit_currency.as_ref().map(|c| c.as_str()).unwrap_or("-"),
        );
        self.notify(scope, tx, &balances);
        Ok(result)
    }

    pub fn deposit(
        &self,
        scope: &ScopeId,
        asset: &AssetCode,
        amount: Decimal,
        note: &str,
    ) -> Result<Transaction, EngineError> {
        let (tx, balances) = self
            .mutate(scope, None, |o, state| o.deposit(state, asset, amount, note))
            .inspect_err(|e| log_rejection(scope, e))?;
        info!("{scope}: deposit {amount} {asset}");
        self.notify(scope, &tx, &balances);
        Ok(tx)
    }

    pub fn withdraw(
        &self,
        scope: &ScopeId,
        asset: &AssetCode,
        amount: Decimal,
        note: &str,
    ) -> Result<Transaction, EngineError> {
        let (tx, balances) = self
            .mutate(scope, None, |o, state| o.withdraw(state, asset, amount, note))
            .inspect_err(|e| log_rejection(scope, e))?;
        info!("{scope}: withdrawal {amount} {asset}");
        self.notify(scope, &tx, &balances);
        Ok(tx)
    }

    /// Administrative override. Records no transaction.
    pub fn set_balance(
        &self,
        scope: &ScopeId,
        asset: &AssetCode,
        amount: Decimal,
    ) -> Result<(), EngineError> {
        self.mutate(scope, None, |_, state| state.balances.set_balance(asset, amount))?;
        info!("{scope}: balance of {asset} set to {amount}");
        Ok(())
    }

    /// Zero every configured initial asset.
    pub fn init_balances(&self, scope: &ScopeId) -> Result<(), EngineError> {
        let assets = self.config.initial_assets.clone();
        self.mutate(scope, None, |_, state| {
            for asset in &assets {
                state.balances.set_balance(asset, Decimal::ZERO)?;
            }
            Ok(())
        })?;
        info!("{scope}: balances initialized");
        Ok(())
    }

    pub fn amend_transaction(
        &self,
        scope: &ScopeId,
        id: Uuid,
        amendment: &TransactionAmendment,
    ) -> Result<Transaction, EngineError> {
        let (tx, _) = self.mutate(scope, Some(id), |o, state| o.amend(state, id, amendment))?;
        info!("{scope}: transaction {id} amended");
        Ok(tx)
    }

    pub fn balances(&self, scope: &ScopeId) -> Result<BTreeMap<AssetCode, Decimal>, EngineError> {
        self.read(scope, |state| state.balances.all().clone())
    }

    pub fn lots(&self, scope: &ScopeId, currency: Option<&AssetCode>) -> Result<Vec<FiatLot>, EngineError> {
        self.read(scope, |state| state.lots.lots(currency))
    }

    pub fn pnl_matches(
        &self,
        scope: &ScopeId,
        currency: Option<&AssetCode>,
    ) -> Result<Vec<PnLMatchRecord>, EngineError> {
        self.read(scope, |state| state.matches_for(currency).cloned().collect())
    }

    pub fn profit_summary(&self, scope: &ScopeId, currency: &AssetCode) -> Result<ProfitSummary, EngineError> {
        self.read(scope, |state| ProfitSummary::from_state(state, currency))
    }

    /// Realized profit summed over all transactions, per fiat profit currency.
    pub fn profit_by_currency(&self, scope: &ScopeId) -> Result<BTreeMap<AssetCode, Decimal>, EngineError> {
        let registry = self.orchestrator.registry();
        self.read(scope, |state| totals::profit_by_currency(state, registry))
    }

    /// Net cash taken in minus cash paid out, per asset.
    pub fn cashflow(&self, scope: &ScopeId) -> Result<BTreeMap<AssetCode, Decimal>, EngineError> {
        self.read(scope, totals::cashflow)
    }

    pub fn transactions(&self, scope: &ScopeId) -> Result<Vec<Transaction>, EngineError> {
        self.read(scope, |state| state.transactions.clone())
    }

    pub fn transaction(&self, scope: &ScopeId, id: Uuid) -> Result<Transaction, EngineError> {
        self.read(scope, |state| state.transaction(id).cloned())?
            .ok_or(EngineError::TransactionNotFound(id))
    }

    /// A copy of the committed state of a desk.
    pub fn snapshot(&self, scope: &ScopeId) -> Result<DeskState, EngineError> {
        self.read(scope, DeskState::clone)
    }

    fn desk(&self, scope: &ScopeId) -> Result<Arc<Mutex<DeskState>>, EngineError> {
        if let Some(desk) = self.desks.read().get(scope) {
            return Ok(Arc::clone(desk));
        }

        // Load without holding the map; a racing loader's copy is dropped.
        let state = self.store.load(scope)?.unwrap_or_default();
        let mut desks = self.desks.write();
        let desk = desks
            .entry(scope.clone())
            .or_insert_with(|| Arc::new(Mutex::new(state)));
        Ok(Arc::clone(desk))
    }

    fn read<T>(&self, scope: &ScopeId, f: impl FnOnce(&DeskState) -> T) -> Result<T, EngineError> {
        let desk = self.desk(scope)?;
        let guard = desk.lock();
        Ok(f(&*guard))
    }

    fn mutate<T>(
        &self,
        scope: &ScopeId,
        touched: Option<Uuid>,
        f: impl FnOnce(&TransactionOrchestrator, &mut DeskState) -> Result<T, EngineError>,
    ) -> Result<(T, BTreeMap<AssetCode, Decimal>), EngineError> {
        let desk = self.desk(scope)?;
        let mut state = desk.lock();

        for hook in &self.hooks {
            hook.before_operation(scope, &state)
                .map_err(|e| EngineError::Hook(e.to_string()))?;
        }

        let checkpoint = state.checkpoint(touched);
        let outcome = f(&self.orchestrator, &mut *state).and_then(|out| {
            self.store.save(scope, &*state)?;
            Ok(out)
        });
        match outcome {
            Ok(out) => Ok((out, state.balances.all().clone())),
            Err(e) => {
                state.restore(checkpoint);
                Err(e)
            }
        }
    }

    fn notify(&self, scope: &ScopeId, tx: &Transaction, balances: &BTreeMap<AssetCode, Decimal>) {
        for sink in &self.sinks {
            if let Err(e) = sink.transaction_committed(scope, tx, balances) {
                warn!("{scope}: sink failed for transaction {}: {e}", tx.id);
            }
        }
    }
}

fn log_rejection(scope: &ScopeId, err: &EngineError) {
    match err {
        EngineError::InsufficientFunds { .. } => warn!("{scope}: rejected: {err}"),
        EngineError::Store(_) => warn!("{scope}: not committed: {err}"),
        _ => log::debug!("{scope}: rejected: {err}"),
    }
}
