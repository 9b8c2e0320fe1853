use crate::core::error::StoreError;
use crate::core::scope::ScopeId;
use crate::ledger::state::DeskState;
use crate::store::DeskStore;
use log::debug;
use parking_lot::Mutex;
use std::fs;
use std::io::{ErrorKind, Write};
use std::path::{Path, PathBuf};

/// Stores each desk as `<dir>/<ScopeId::file_stem>.json`.
///
/// Writes go to a `.tmp` sibling first and are renamed into place, so a
/// crash mid-write leaves the previous document intact.
#[derive(Debug)]
pub struct JsonFileStore {
    dir: PathBuf,
    write_lock: Mutex<()>,
}

impl JsonFileStore {
    pub fn open(dir: impl AsRef<Path>) -> Result<Self, StoreError> {
        let dir = dir.as_ref().to_path_buf();
        fs::create_dir_all(&dir)?;
        Ok(Self {
            dir,
            write_lock: Mutex::new(()),
        })
    }

    pub fn path_for(&self, scope: &ScopeId) -> PathBuf {
        self.dir.join(format!("{}.json", scope.file_stem()))
    }
}

impl DeskStore for JsonFileStore {
    fn load(&self, scope: &ScopeId) -> Result<Option<DeskState>, StoreError> {
        let path = self.path_for(scope);
        let content = match fs::read_to_string(&path) {
            Ok(content) => content,
            Err(e) if e.kind() == ErrorKind::NotFound => return Ok(None),
            Err(e) => return Err(e.into()),
        };
        let state = serde_json::from_str(&content)?;
        debug!("loaded {} from {}", scope, path.display());
        Ok(Some(state))
    }

    fn save(&self, scope: &ScopeId, state: &DeskState) -> Result<(), StoreError> {
        let json = serde_json::to_vec_pretty(state)?;
        let path = self.path_for(scope);
        let tmp = path.with_extension("json.tmp");

        let _guard = self.write_lock.lock();
        {
            let mut file = fs::File::create(&tmp)?;
            file.write_all(&json)?;
            file.sync_all()?;
        }
        fs::rename(&tmp, &path)?;
        Ok(())
    }
}
