//! Replay-based cooperative thread scheduler.
//!
//! A [`Process`] owns a tree of logical threads whose only durable footprint is
//! a [`ProcessState`] blob. Every construction rebuilds each thread's task body
//! by replaying it up to its recorded program counter, with memoized values
//! standing in for side effects, after which execution continues live.

pub mod interrupt;
pub mod process;
pub mod task;
pub mod thread;
pub mod top;

pub use interrupt::{InterruptHandler, InterruptTable};
pub use process::{CycleReport, Process, ProcessConfig};
pub use task::{display_name, FnTask, Task, TaskBody, TaskRegistry, TASK_NAME_SUFFIX};
pub use thread::{SpawnOptions, SpawnParent, Suspend, Thread};
pub use top::{RunState, ThreadSummary, TopReport};

pub use rethread_core::{
    FileStore, Handle, MemoCodec, MemoryStore, PassthroughCodec, ProcessState, Resolve,
    RuntimeConfig, SchedError, StateFormat, StateStore, ThreadId, ThreadState, Tick,
};
