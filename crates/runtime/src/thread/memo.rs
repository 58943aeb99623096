use std::rc::Rc;

use serde::de::DeserializeOwned;
use serde::Serialize;
use serde_json::Value;

use rethread_core::{SchedError, ThreadId};

use crate::process::lifecycle::spawn_thread;

use super::Thread;

/// Where a new thread hangs in the tree.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub enum SpawnParent {
    /// Child of the spawning thread.
    #[default]
    Current,
    /// A new root thread, unaffected by the spawner exiting.
    Root,
    /// Child of an arbitrary live thread.
    Thread(ThreadId),
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct SpawnOptions {
    pub parent: SpawnParent,
    /// Spawn with `next_execution = None`; the thread waits for `resume`.
    pub start_suspended: bool,
}

impl SpawnOptions {
    pub fn suspended(mut self) -> Self {
        self.start_suspended = true;
        self
    }

    pub fn as_root(mut self) -> Self {
        self.parent = SpawnParent::Root;
        self
    }

    pub fn under(mut self, parent: ThreadId) -> Self {
        self.parent = SpawnParent::Thread(parent);
        self
    }
}

impl<C: 'static> Thread<C> {
    /// Run `compute` once and log its result; on replay return the logged value
    /// instead of calling `compute` again.
    ///
    /// Values pass through the process [`MemoCodec`](crate::MemoCodec) on the
    /// way into and out of the log.
    pub fn memo<T, F>(&self, compute: F) -> Result<T, SchedError>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> T,
    {
        let codec = Rc::clone(&self.shared.borrow().codec);
        if let Some(blob) = self.replay_memo()? {
            let value = codec.deserialise(blob)?;
            return Ok(serde_json::from_value(value)?);
        }

        let value = compute();
        let blob = codec.serialise(serde_json::to_value(&value)?)?;
        self.record_memo(blob)?;
        Ok(value)
    }

    /// Spawn a thread running `task_name`.
    ///
    /// The new id is logged like a memoized value, so replay reattaches to the
    /// same child instead of spawning a duplicate. A replayed handle may name a
    /// thread that has since exited.
    pub fn start_sub_thread(
        &self,
        task_name: &str,
        props: impl Serialize,
        options: SpawnOptions,
    ) -> Result<Thread<C>, SchedError> {
        if let Some(blob) = self.replay_memo()? {
            let id: ThreadId = serde_json::from_value(blob)?;
            return Ok(Thread::new(id, Rc::clone(&self.shared)));
        }

        let props = serde_json::to_value(props)?;
        let parent = match options.parent {
            SpawnParent::Current => Some(self.id),
            SpawnParent::Root => None,
            SpawnParent::Thread(id) => Some(id),
        };
        let id = spawn_thread(&self.shared, task_name, props, parent, options.start_suspended)?;
        // Ids are scheduler bookkeeping, stored verbatim rather than through the codec.
        self.record_memo(Value::from(id))?;
        Ok(Thread::new(id, Rc::clone(&self.shared)))
    }

    /// Next logged value when replaying, `None` when live.
    fn replay_memo(&self) -> Result<Option<Value>, SchedError> {
        let mut inner = self.shared.borrow_mut();
        if inner.replaying.is_none() {
            return Ok(None);
        }
        let index = inner.runtimes.get(&self.id).map_or(0, |rt| rt.memo_cursor);
        let blob = inner
            .thread_state(self.id)?
            .memoed_values
            .get(index)
            .cloned()
            .ok_or_else(|| SchedError::MemoMissing {
                thread: inner.display_name(self.id),
                index,
            })?;
        inner.runtimes.entry(self.id).or_default().memo_cursor = index + 1;
        Ok(Some(blob))
    }

    fn record_memo(&self, blob: Value) -> Result<(), SchedError> {
        self.shared
            .borrow_mut()
            .thread_state_mut(self.id)?
            .memoed_values
            .push(blob);
        Ok(())
    }
}
