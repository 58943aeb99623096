use thiserror::Error;

use crate::state::ThreadId;

#[derive(Error, Debug)]
pub enum SchedError {
    // ── Configuration ─────────────────────────────────────────
    #[error("'{0}' is already registered. Did you copy a task definition and forget to rename it?")]
    DuplicateTask(String),

    #[error("'{0}' is not a valid task name, must end in '_task'")]
    InvalidTaskName(String),

    #[error("No task for name '{0}'")]
    UnknownTask(String),

    #[error("No thread for id '{0}'")]
    ThreadNotFound(ThreadId),

    #[error("No thread for name '{0}'")]
    ThreadNameNotFound(String),

    #[error("config error: {0}")]
    Config(String),

    // ── Usage ─────────────────────────────────────────────────
    #[error("Cannot restart thread '{0}', it isn't running")]
    NotRunning(String),

    #[error("Thread {target} is already joined by thread {existing}, cannot also join from {requester}")]
    JoinConflict {
        target: ThreadId,
        existing: ThreadId,
        requester: ThreadId,
    },

    #[error("Interrupt '{event}' already has a handler registered for thread {thread}")]
    DuplicateInterrupt { event: String, thread: ThreadId },

    // ── Replay ────────────────────────────────────────────────
    #[error("Unexpected {op} of thread '{thread}' during hydration")]
    InvalidDuringHydration { thread: String, op: &'static str },

    #[error("Thread '{0}' already has a live task body, cannot hydrate")]
    AlreadyHydrated(String),

    #[error("Thread '{thread}' has no memoized value at index {index}")]
    MemoMissing { thread: String, index: usize },

    #[error("Failed to hydrate thread '{thread}': {cause}")]
    Hydration { thread: String, cause: String },

    // ── Handles ───────────────────────────────────────────────
    #[error("Handle '{id}' of type {kind} no longer resolves")]
    UnresolvedHandle { kind: &'static str, id: String },

    // ── I/O & serialization ───────────────────────────────────
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("JSON error: {0}")]
    Json(#[from] serde_json::Error),

    #[error("MessagePack encode error: {0}")]
    MsgpackEncode(#[from] rmp_serde::encode::Error),

    #[error("MessagePack decode error: {0}")]
    MsgpackDecode(#[from] rmp_serde::decode::Error),

    #[error("config parse error: {0}")]
    ConfigParse(#[from] toml::de::Error),
}
