use std::collections::BTreeMap;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Process-scoped thread identifier. Never reused.
pub type ThreadId = u64;

/// One discrete scheduling round.
pub type Tick = u64;

/// `next_execution` value meaning "eligible on the next scheduling attempt".
pub const ASAP: Tick = 0;

/// Serializable snapshot of one logical thread.
///
/// Everything needed to rebuild the thread on a fresh host lives here; the
/// live task body is reconstructed by replaying `program_counter` steps with
/// `memoed_values` standing in for side effects.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ThreadState {
    pub id: ThreadId,
    pub name: String,
    /// The thread that spawned us, or `None` for a root thread.
    pub parent_thread_id: Option<ThreadId>,

    pub task_name: String,
    pub task_version: u32,
    pub props: Value,

    /// Number of suspension points passed since the last (re)start.
    pub program_counter: u64,
    pub memoed_values: Vec<Value>,
    /// Children are killed if this thread exits or restarts.
    pub child_thread_ids: Vec<ThreadId>,

    /// `None` = suspended indefinitely.
    pub next_execution: Option<Tick>,
    /// The thread joined to us, notified when we complete.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blocking_thread_id: Option<ThreadId>,
    /// The thread we are joined to.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub blocked_on_thread_id: Option<ThreadId>,

    pub is_running: bool,

    pub last_execution: Tick,
    pub num_restarts: u32,
    pub num_crashes: u32,
}

impl ThreadState {
    /// Fresh state for a newly spawned thread, eligible immediately.
    pub fn new(
        id: ThreadId,
        name: String,
        parent_thread_id: Option<ThreadId>,
        task_name: &str,
        task_version: u32,
        props: Value,
    ) -> Self {
        Self {
            id,
            name,
            parent_thread_id,
            task_name: task_name.to_string(),
            task_version,
            props,
            program_counter: 0,
            memoed_values: Vec::new(),
            child_thread_ids: Vec::new(),
            next_execution: Some(ASAP),
            blocking_thread_id: None,
            blocked_on_thread_id: None,
            is_running: true,
            last_execution: 0,
            num_restarts: 0,
            num_crashes: 0,
        }
    }

    pub fn is_root(&self) -> bool {
        self.parent_thread_id.is_none()
    }

    /// Whether the scheduling fields allow a run at `now`. Join blocking is
    /// checked separately since it depends on other threads.
    pub fn is_due(&self, now: Tick) -> bool {
        self.is_running && self.next_execution.is_some_and(|next| next <= now)
    }
}

/// The entire durable footprint of a process.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct ProcessState {
    pub active_thread_states: BTreeMap<ThreadId, ThreadState>,
    pub next_thread_id: ThreadId,
}

impl ProcessState {
    /// No thread has ever been spawned from this state.
    pub fn is_fresh(&self) -> bool {
        self.next_thread_id == 0
    }

    pub fn allocate_thread_id(&mut self) -> ThreadId {
        let id = self.next_thread_id;
        self.next_thread_id += 1;
        id
    }
}
