//! Load/persist hooks for the durable process blob.

use std::cell::RefCell;
use std::path::{Path, PathBuf};
use std::rc::Rc;

use tracing::debug;

use crate::config::StateFormat;
use crate::error::SchedError;
use crate::state::ProcessState;

/// `readState` / `writeState` pair. Read once per process construction,
/// written once at the end of every cycle.
pub trait StateStore {
    fn read(&mut self) -> Result<Option<ProcessState>, SchedError>;
    fn write(&mut self, state: &ProcessState) -> Result<(), SchedError>;
}

/// In-memory slot. Clones share the same slot, so a test can hand one clone
/// to a process and inspect (or reuse) the persisted blob through another.
#[derive(Debug, Clone, Default)]
pub struct MemoryStore {
    slot: Rc<RefCell<Option<ProcessState>>>,
}

impl MemoryStore {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_state(state: ProcessState) -> Self {
        Self {
            slot: Rc::new(RefCell::new(Some(state))),
        }
    }

    /// Copy of the last persisted state.
    pub fn current(&self) -> Option<ProcessState> {
        self.slot.borrow().clone()
    }
}

impl StateStore for MemoryStore {
    fn read(&mut self) -> Result<Option<ProcessState>, SchedError> {
        Ok(self.current())
    }

    fn write(&mut self, state: &ProcessState) -> Result<(), SchedError> {
        *self.slot.borrow_mut() = Some(state.clone());
        Ok(())
    }
}

/// Flat-file store. Writes land in a sibling temp file first and are renamed
/// over the target so a torn write never replaces a good blob.
#[derive(Debug, Clone)]
pub struct FileStore {
    path: PathBuf,
    format: StateFormat,
}

impl FileStore {
    pub fn new(path: impl Into<PathBuf>, format: StateFormat) -> Self {
        Self {
            path: path.into(),
            format,
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    fn encode(&self, state: &ProcessState) -> Result<Vec<u8>, SchedError> {
        Ok(match self.format {
            StateFormat::Json => serde_json::to_vec_pretty(state)?,
            StateFormat::Msgpack => rmp_serde::to_vec_named(state)?,
        })
    }

    fn decode(&self, bytes: &[u8]) -> Result<ProcessState, SchedError> {
        Ok(match self.format {
            StateFormat::Json => serde_json::from_slice(bytes)?,
            StateFormat::Msgpack => rmp_serde::from_slice(bytes)?,
        })
    }
}

impl StateStore for FileStore {
    fn read(&mut self) -> Result<Option<ProcessState>, SchedError> {
        let bytes = match std::fs::read(&self.path) {
            Ok(bytes) => bytes,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                debug!(path = %self.path.display(), "No persisted process state");
                return Ok(None);
            }
            Err(e) => return Err(e.into()),
        };
        let state = self.decode(&bytes)?;
        debug!(
            path = %self.path.display(),
            threads = state.active_thread_states.len(),
            "Loaded process state"
        );
        Ok(Some(state))
    }

    fn write(&mut self, state: &ProcessState) -> Result<(), SchedError> {
        if let Some(parent) = self.path.parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)?;
            }
        }
        let bytes = self.encode(state)?;
        let tmp = self.path.with_extension("tmp");
        std::fs::write(&tmp, bytes)?;
        std::fs::rename(&tmp, &self.path)?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::state::ThreadState;
    use serde_json::json;

    fn sample_state() -> ProcessState {
        let mut state = ProcessState::default();
        let id = state.allocate_thread_id();
        let mut t = ThreadState::new(id, "init".into(), None, "init_task", 2, json!({ "n": 1 }));
        t.program_counter = 3;
        t.next_execution = None;
        t.memoed_values = vec![json!(4), json!({ "id": "src-1" })];
        t.child_thread_ids = vec![1];
        state.active_thread_states.insert(id, t);
        let child = state.allocate_thread_id();
        let mut c = ThreadState::new(child, "init.worker".into(), Some(id), "worker_task", 0, json!(null));
        c.blocking_thread_id = Some(id);
        state.active_thread_states.insert(child, c);
        state
    }

    #[test]
    fn memory_store_clones_share_slot() {
        let store = MemoryStore::new();
        let mut writer = store.clone();
        assert!(store.current().is_none());

        writer.write(&sample_state()).unwrap();
        assert_eq!(store.current(), Some(sample_state()));
    }

    #[test]
    fn missing_file_reads_as_none() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = FileStore::new(dir.path().join("absent.json"), StateFormat::Json);
        assert!(store.read().unwrap().is_none());
    }

    #[test]
    fn json_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = FileStore::new(dir.path().join("nested/process.json"), StateFormat::Json);
        store.write(&sample_state()).unwrap();
        assert_eq!(store.read().unwrap(), Some(sample_state()));
        assert!(!dir.path().join("nested/process.tmp").exists());
    }

    #[test]
    fn msgpack_file_round_trip() {
        let dir = tempfile::tempdir().unwrap();
        let mut store = FileStore::new(dir.path().join("process.msgpack"), StateFormat::Msgpack);
        store.write(&sample_state()).unwrap();
        assert_eq!(store.read().unwrap(), Some(sample_state()));
    }

    #[test]
    fn corrupt_file_is_an_error() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("process.json");
        std::fs::write(&path, b"{ not json").unwrap();
        let mut store = FileStore::new(path, StateFormat::Json);
        assert!(matches!(store.read(), Err(SchedError::Json(_))));
    }
}
