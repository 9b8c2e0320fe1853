use crate::core::error::StoreError;
use crate::core::scope::ScopeId;
use crate::ledger::state::DeskState;
use crate::store::DeskStore;
use parking_lot::RwLock;
use std::collections::HashMap;

/// In-process store. State is lost when the process exits.
#[derive(Debug, Default)]
pub struct MemoryStore {
    desks: RwLock<HashMap<ScopeId, DeskState>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn scopes(&self) -> Vec<ScopeId> {
        let mut scopes: Vec<ScopeId> = self.desks.read().keys().cloned().collect();
        scopes.sort();
        scopes
    }
}

impl DeskStore for MemoryStore {
    fn load(&self, scope: &ScopeId) -> Result<Option<DeskState>, StoreError> {
        Ok(self.desks.read().get(scope).cloned())
    }

    fn save(&self, scope: &ScopeId, state: &DeskState) -> Result<(), StoreError> {
        self.desks.write().insert(scope.clone(), state.clone());
        Ok(())
    }
}
