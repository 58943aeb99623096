use crate::task::TaskBody;

pub(crate) type LoopFn = Box<dyn FnMut() -> anyhow::Result<bool>>;

/// Live, non-serializable companion of a `ThreadState`. Rebuilt from scratch
/// every time a process is constructed.
#[derive(Default)]
pub(crate) struct ThreadRuntime {
    pub(crate) body: Option<TaskBody>,
    pub(crate) loop_fn: Option<LoopFn>,
    /// Bumped whenever the body is discarded, so a step in flight can tell
    /// that it was restarted underneath.
    pub(crate) generation: u64,
    /// Next memo log index to consume while replaying.
    pub(crate) memo_cursor: usize,
}

impl ThreadRuntime {
    /// Discard the body and any pending loop, handing them back so they can be
    /// dropped outside the process borrow.
    pub(crate) fn reset(&mut self) -> (Option<TaskBody>, Option<LoopFn>) {
        self.generation += 1;
        self.memo_cursor = 0;
        (self.body.take(), self.loop_fn.take())
    }
}
