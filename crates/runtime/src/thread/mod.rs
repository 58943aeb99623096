//! Thread handle and the control API exposed to task bodies.
//!
//! Split into focused submodules:
//! - `control`: suspension points (suspend, sleep, loop, join, restart, exit)
//! - `memo`: memoized calls and sub-thread spawning
//! - `runtime`: per-thread live state rebuilt on every construction
//! - `suspend`: the future every control operation hands back

mod control;
mod memo;
pub(crate) mod runtime;
mod suspend;

use std::cell::RefCell;
use std::fmt;
use std::rc::Rc;

use serde::de::DeserializeOwned;
use serde_json::Value;
use tracing::info;

use rethread_core::{SchedError, ThreadId, ThreadState, Tick};

use crate::process::inner::Shared;
use crate::process::lifecycle::dispatch_interrupt;

pub use memo::{SpawnOptions, SpawnParent};
pub use suspend::Suspend;

/// Handle to one logical thread.
///
/// Cheap to clone. A handle outlives the thread it names: once the thread has
/// exited, accessors return [`SchedError::ThreadNotFound`] and `is_running`
/// reports `false`.
pub struct Thread<C: 'static = ()> {
    id: ThreadId,
    shared: Shared<C>,
}

impl<C: 'static> Clone for Thread<C> {
    fn clone(&self) -> Self {
        Self {
            id: self.id,
            shared: Rc::clone(&self.shared),
        }
    }
}

impl<C: 'static> fmt::Debug for Thread<C> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Thread").field("id", &self.id).finish()
    }
}

impl<C: 'static> Thread<C> {
    pub(crate) fn new(id: ThreadId, shared: Shared<C>) -> Self {
        Self { id, shared }
    }

    pub fn id(&self) -> ThreadId {
        self.id
    }

    pub fn name(&self) -> Result<String, SchedError> {
        Ok(self.shared.borrow().thread_state(self.id)?.name.clone())
    }

    /// Snapshot of the durable state.
    pub fn state(&self) -> Result<ThreadState, SchedError> {
        Ok(self.shared.borrow().thread_state(self.id)?.clone())
    }

    pub fn is_running(&self) -> bool {
        self.shared
            .borrow()
            .thread_state(self.id)
            .is_ok_and(|state| state.is_running)
    }

    /// Props bound at spawn time, decoded into the task's props type.
    pub fn props<P: DeserializeOwned>(&self) -> Result<P, SchedError> {
        Ok(serde_json::from_value(self.props_value()?)?)
    }

    pub fn props_value(&self) -> Result<Value, SchedError> {
        Ok(self.shared.borrow().thread_state(self.id)?.props.clone())
    }

    /// The process Context. Refreshed by the embedder between cycles.
    pub fn ctx(&self) -> Rc<RefCell<C>> {
        Rc::clone(&self.shared.borrow().ctx)
    }

    pub fn current_time(&self) -> Tick {
        self.shared.borrow().current_time
    }

    /// True while any thread of the process is being fast-forwarded.
    pub fn is_hydrating(&self) -> bool {
        self.shared.borrow().replaying.is_some()
    }

    /// Task-facing logger. Silent while replaying.
    pub fn log(&self, message: impl fmt::Display) {
        let name = {
            let inner = self.shared.borrow();
            if inner.replaying.is_some() {
                return;
            }
            inner.display_name(self.id)
        };
        info!(thread = %name, "{}", message);
    }

    pub fn parent(&self) -> Result<Option<Thread<C>>, SchedError> {
        let parent = self.shared.borrow().thread_state(self.id)?.parent_thread_id;
        Ok(parent.map(|id| Thread::new(id, Rc::clone(&self.shared))))
    }

    pub fn children(&self) -> Result<Vec<Thread<C>>, SchedError> {
        let ids = self.shared.borrow().thread_state(self.id)?.child_thread_ids.clone();
        Ok(ids
            .into_iter()
            .map(|id| Thread::new(id, Rc::clone(&self.shared)))
            .collect())
    }

    /// Look up another live thread of the same process by id.
    pub fn thread_by_id(&self, id: ThreadId) -> Result<Thread<C>, SchedError> {
        self.shared.borrow().thread_state(id)?;
        Ok(Thread::new(id, Rc::clone(&self.shared)))
    }

    /// Look up another live thread of the same process by name.
    pub fn thread_by_name(&self, name: &str) -> Result<Thread<C>, SchedError> {
        let id = self.shared.borrow().thread_id_by_name(name)?;
        Ok(Thread::new(id, Rc::clone(&self.shared)))
    }

    /// Subscribe this thread to a process-wide event. Usually called from
    /// [`Task::interrupts`](crate::Task::interrupts). The handler is dropped
    /// when the thread exits.
    pub fn register_interrupt<F>(&self, event: &str, handler: F) -> Result<(), SchedError>
    where
        F: Fn() -> Result<(), SchedError> + 'static,
    {
        let mut inner = self.shared.borrow_mut();
        inner.thread_state(self.id)?;
        inner.interrupts.register(event, self.id, Rc::new(handler))
    }

    /// Synchronously run every handler subscribed to `event`. Ignored while
    /// replaying.
    pub fn interrupt_process(&self, event: &str) -> Result<(), SchedError> {
        if self.is_hydrating() {
            return Ok(());
        }
        dispatch_interrupt(&self.shared, event)
    }

    /// Events this thread is subscribed to.
    pub fn interrupts(&self) -> Vec<String> {
        self.shared.borrow().interrupts.events_for(self.id)
    }

    fn suspension(&self, outcome: Result<(), SchedError>) -> Suspend {
        let slot = Rc::clone(&self.shared.borrow().yield_slot);
        Suspend::new(slot, self.id, outcome)
    }
}

impl<C: 'static> PartialEq for Thread<C> {
    fn eq(&self, other: &Self) -> bool {
        self.id == other.id && Rc::ptr_eq(&self.shared, &other.shared)
    }
}
