//! Persistence of desk state, one document per scope.

pub mod file;
pub mod memory;

pub use file::JsonFileStore;
pub use memory::MemoryStore;

use crate::core::error::StoreError;
use crate::core::scope::ScopeId;
use crate::ledger::state::DeskState;

/// Where committed desk state lives.
///
/// `save` is called with the complete new state after every successful
/// operation; an error aborts the operation and the engine keeps its
/// previous state.
pub trait DeskStore: Send + Sync {
    fn load(&self, scope: &ScopeId) -> Result<Option<DeskState>, StoreError>;
    fn save(&self, scope: &ScopeId, state: &DeskState) -> Result<(), StoreError>;
}
