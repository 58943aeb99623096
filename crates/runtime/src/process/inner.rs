use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use rethread_core::{MemoCodec, ProcessState, SchedError, ThreadId, ThreadState, Tick};

use crate::interrupt::{InterruptHandler, InterruptTable};
use crate::task::{TaskBody, TaskRegistry};
use crate::thread::runtime::{LoopFn, ThreadRuntime};

pub(crate) type Shared<C> = Rc<RefCell<ProcessInner<C>>>;

/// Everything a process owns, behind one `RefCell` shared by the process and
/// every [`Thread`](crate::Thread) handle.
///
/// No borrow is ever held across a poll of a task body or a call into
/// embedder code.
pub(crate) struct ProcessInner<C: 'static> {
    pub(crate) state: ProcessState,
    /// Live thread ids in registration order.
    pub(crate) order: Vec<ThreadId>,
    pub(crate) by_name: HashMap<String, ThreadId>,
    pub(crate) runtimes: HashMap<ThreadId, ThreadRuntime>,
    pub(crate) tasks: Rc<TaskRegistry<C>>,
    pub(crate) interrupts: InterruptTable,
    pub(crate) codec: Rc<dyn MemoCodec>,
    pub(crate) ctx: Rc<RefCell<C>>,
    /// Set by a [`Suspend`](crate::Suspend) when it yields.
    pub(crate) yield_slot: Rc<Cell<Option<ThreadId>>>,
    pub(crate) current_time: Tick,
    /// A pass spawned or released a thread; run another pass.
    pub(crate) dirty: bool,
    /// Thread currently being fast-forwarded, if any.
    pub(crate) replaying: Option<ThreadId>,
    pub(crate) tick_period_secs: f64,
    pub(crate) sleep_jitter_ticks: u64,
}

/// Bodies, loops and handlers detached from the process. Dropped by the caller
/// once its borrow has ended, since dropping a body can drop thread handles.
#[derive(Default)]
#[allow(dead_code)] // never read, only dropped
pub(crate) struct Released {
    bodies: Vec<TaskBody>,
    loops: Vec<LoopFn>,
    handlers: Vec<InterruptHandler>,
}

impl Released {
    pub(crate) fn runtime(&mut self, (body, loop_fn): (Option<TaskBody>, Option<LoopFn>)) {
        self.bodies.extend(body);
        self.loops.extend(loop_fn);
    }

    pub(crate) fn handlers(&mut self, handlers: Vec<InterruptHandler>) {
        self.handlers.extend(handlers);
    }

    pub(crate) fn absorb(&mut self, other: Released) {
        self.bodies.extend(other.bodies);
        self.loops.extend(other.loops);
        self.handlers.extend(other.handlers);
    }
}

impl<C: 'static> ProcessInner<C> {
    pub(crate) fn thread_state(&self, id: ThreadId) -> Result<&ThreadState, SchedError> {
        self.state
            .active_thread_states
            .get(&id)
            .ok_or(SchedError::ThreadNotFound(id))
    }

    pub(crate) fn thread_state_mut(&mut self, id: ThreadId) -> Result<&mut ThreadState, SchedError> {
        self.state
            .active_thread_states
            .get_mut(&id)
            .ok_or(SchedError::ThreadNotFound(id))
    }

    pub(crate) fn contains(&self, id: ThreadId) -> bool {
        self.state.active_thread_states.contains_key(&id)
    }

    pub(crate) fn thread_id_by_name(&self, name: &str) -> Result<ThreadId, SchedError> {
        self.by_name
            .get(name)
            .copied()
            .ok_or_else(|| SchedError::ThreadNameNotFound(name.to_string()))
    }

    /// Name for logs and errors; falls back to `#id` for exited threads.
    pub(crate) fn display_name(&self, id: ThreadId) -> String {
        self.state
            .active_thread_states
            .get(&id)
            .map(|state| state.name.clone())
            .unwrap_or_else(|| format!("#{id}"))
    }

    /// `base`, or `base#id` when another live thread already holds it.
    pub(crate) fn unique_name(&self, base: String, id: ThreadId) -> String {
        if self.by_name.contains_key(&base) {
            format!("{base}#{id}")
        } else {
            base
        }
    }

    pub(crate) fn add_thread(&mut self, state: ThreadState) {
        let id = state.id;
        self.order.push(id);
        self.by_name.insert(state.name.clone(), id);
        self.runtimes.insert(id, ThreadRuntime::default());
        self.state.active_thread_states.insert(id, state);
    }

    /// Drop a thread from every index. Tree and join bookkeeping is the
    /// caller's job.
    pub(crate) fn remove_thread(&mut self, id: ThreadId, released: &mut Released) -> Option<ThreadState> {
        let state = self.state.active_thread_states.remove(&id)?;
        self.order.retain(|other| *other != id);
        if self.by_name.get(&state.name) == Some(&id) {
            self.by_name.remove(&state.name);
        }
        if let Some(mut runtime) = self.runtimes.remove(&id) {
            released.runtime(runtime.reset());
        }
        released.handlers(self.interrupts.unregister_thread(id));
        Some(state)
    }
}
