use std::rc::Rc;

use serde_json::Value;
use tracing::{debug, error};

use rethread_core::{SchedError, ThreadId, ThreadState, ASAP};

use crate::task::display_name;
use crate::thread::Thread;

use super::inner::{ProcessInner, Released, Shared};

/// Create a thread and run its task's `interrupts` hook.
pub(crate) fn spawn_thread<C: 'static>(
    shared: &Shared<C>,
    task_name: &str,
    props: Value,
    parent: Option<ThreadId>,
    start_suspended: bool,
) -> Result<ThreadId, SchedError> {
    let (id, task) = {
        let mut inner = shared.borrow_mut();
        let task = inner.tasks.get(task_name)?;
        let id = inner.create_thread(task.name(), task.version(), task.custom_name(&props), props, parent, start_suspended)?;
        (id, task)
    };
    task.interrupts(&Thread::new(id, Rc::clone(shared)))?;
    Ok(id)
}

/// Run every live handler for `event` in registration order.
pub(crate) fn dispatch_interrupt<C: 'static>(shared: &Shared<C>, event: &str) -> Result<(), SchedError> {
    let handlers = shared.borrow().interrupts.handlers_for(event);
    debug!(event, handlers = handlers.len(), "Dispatching interrupt");
    for (owner, handler) in handlers {
        // An earlier handler may have torn the owner down.
        if !shared.borrow().contains(owner) {
            continue;
        }
        handler()?;
    }
    Ok(())
}

impl<C: 'static> ProcessInner<C> {
    pub(crate) fn create_thread(
        &mut self,
        task_name: &str,
        task_version: u32,
        custom_name: Option<String>,
        props: Value,
        parent: Option<ThreadId>,
        start_suspended: bool,
    ) -> Result<ThreadId, SchedError> {
        let parent_name = match parent {
            Some(parent) => Some(self.thread_state(parent)?.name.clone()),
            None => None,
        };
        let suffix = custom_name.unwrap_or_else(|| display_name(task_name).to_string());
        let base = match parent_name {
            Some(parent_name) => format!("{parent_name}.{suffix}"),
            None => suffix,
        };

        let id = self.state.allocate_thread_id();
        let name = self.unique_name(base, id);
        let mut state = ThreadState::new(id, name, parent, task_name, task_version, props);
        if start_suspended {
            state.next_execution = None;
        } else {
            // Give the new thread a chance to run this cycle.
            self.dirty = true;
        }
        if let Some(parent) = parent {
            self.thread_state_mut(parent)?.child_thread_ids.push(id);
        }
        debug!(thread = %state.name, id, task = task_name, ?parent, "Spawned thread");
        self.add_thread(state);
        Ok(id)
    }

    /// Reset a thread to the top of its task. Children are killed and the
    /// live body is handed back in the returned [`Released`].
    pub(crate) fn restart(&mut self, id: ThreadId, mark_dirty: bool) -> Result<Released, SchedError> {
        let state = self.thread_state(id)?;
        if !state.is_running {
            return Err(SchedError::NotRunning(state.name.clone()));
        }

        let mut released = Released::default();
        self.kill_children(id, &mut released);

        let state = self.thread_state_mut(id)?;
        state.num_restarts += 1;
        state.program_counter = 0;
        state.memoed_values.clear();
        state.next_execution = Some(ASAP);
        let blocked_on = state.blocked_on_thread_id.take();
        debug!(thread = %state.name, id, restarts = state.num_restarts, "Thread restarted");

        if let Some(target) = blocked_on {
            if let Ok(target) = self.thread_state_mut(target) {
                if target.blocking_thread_id == Some(id) {
                    target.blocking_thread_id = None;
                }
            }
        }
        if let Some(runtime) = self.runtimes.get_mut(&id) {
            released.runtime(runtime.reset());
        }
        if mark_dirty {
            // May have come from an interrupt; reschedule within this cycle.
            self.dirty = true;
        }
        Ok(released)
    }

    pub(crate) fn exit_thread(&mut self, id: ThreadId) -> Result<Released, SchedError> {
        self.thread_state(id)?;
        let mut released = Released::default();
        self.remove_tree(id, &mut released);
        Ok(released)
    }

    /// Remove a thread and all of its descendants, detach it from its parent
    /// and release whoever joined it.
    pub(crate) fn remove_tree(&mut self, id: ThreadId, released: &mut Released) {
        let Some(mut state) = self.remove_thread(id, released) else {
            return;
        };
        state.is_running = false;

        if let Some(parent) = state.parent_thread_id {
            if let Ok(parent) = self.thread_state_mut(parent) {
                parent.child_thread_ids.retain(|child| *child != id);
            }
        }

        for child in std::mem::take(&mut state.child_thread_ids) {
            if let Ok(child_state) = self.thread_state_mut(child) {
                child_state.parent_thread_id = None;
            }
            self.remove_tree(child, released);
        }

        if let Some(waiter) = state.blocking_thread_id {
            if let Ok(waiter) = self.thread_state_mut(waiter) {
                if waiter.blocked_on_thread_id == Some(id) {
                    waiter.blocked_on_thread_id = None;
                }
                // The waiter may already have had its turn this pass.
                self.dirty = true;
            }
        }
        if let Some(target) = state.blocked_on_thread_id {
            if let Ok(target) = self.thread_state_mut(target) {
                if target.blocking_thread_id == Some(id) {
                    target.blocking_thread_id = None;
                }
            }
        }

        debug!(thread = %state.name, id, "Thread exited");
    }

    pub(crate) fn kill_children(&mut self, id: ThreadId, released: &mut Released) {
        let children = match self.thread_state_mut(id) {
            Ok(state) => std::mem::take(&mut state.child_thread_ids),
            Err(_) => return,
        };
        for child in children {
            if let Ok(child_state) = self.thread_state_mut(child) {
                child_state.parent_thread_id = None;
            }
            self.remove_tree(child, released);
        }
    }

    /// Block `waiter` until `target` exits. Only one waiter per target.
    pub(crate) fn join(&mut self, waiter: ThreadId, target: ThreadId) -> Result<(), SchedError> {
        self.thread_state(waiter)?;
        let existing = match self.state.active_thread_states.get(&target) {
            Some(state) if state.is_running => state.blocking_thread_id,
            _ => return Ok(()),
        };
        if let Some(existing) = existing {
            if existing != waiter && self.contains(existing) {
                return Err(SchedError::JoinConflict {
                    target,
                    existing,
                    requester: waiter,
                });
            }
        }

        self.thread_state_mut(target)?.blocking_thread_id = Some(waiter);
        self.thread_state_mut(waiter)?.blocked_on_thread_id = Some(target);
        Ok(())
    }

    /// Count the crash, then either cascade it to the joined waiter or restart
    /// the thread on the next tick.
    pub(crate) fn handle_crash(&mut self, id: ThreadId, cause: &str, released: &mut Released) {
        let now = self.current_time;
        let Ok(state) = self.thread_state_mut(id) else {
            return;
        };
        state.num_crashes += 1;
        let name = state.name.clone();
        let waiter = state.blocking_thread_id;
        error!(thread = %name, id, crashes = state.num_crashes, tick = now, "Thread crashed: {cause}");

        match waiter.filter(|waiter| self.contains(*waiter)) {
            Some(waiter) => {
                self.remove_tree(id, released);
                self.handle_crash(waiter, &format!("sub-thread '{name}' crashed"), released);
            }
            None => {
                if let Ok(restarted) = self.restart(id, false) {
                    released.absorb(restarted);
                }
                // Defer so a body that crashes immediately can't spin this cycle.
                if let Ok(state) = self.thread_state_mut(id) {
                    state.next_execution = Some(now.saturating_add(1));
                }
            }
        }
    }
}
