//! Process: task registry, thread set, per-cycle execution and persistence.
//!
//! Split into focused submodules:
//! - `inner`: shared state and thread indexes
//! - `lifecycle`: spawn, restart, exit, join, crash handling and interrupts
//! - `execution`: per-thread resumption and replay

mod execution;
pub(crate) mod inner;
pub(crate) mod lifecycle;
#[cfg(test)]
mod tests;

use std::cell::{Cell, RefCell};
use std::collections::HashMap;
use std::rc::Rc;

use serde::Serialize;
use serde_json::json;
use tracing::{debug, info, warn};

use rethread_core::{
    MemoCodec, MemoryStore, PassthroughCodec, ProcessState, RuntimeConfig, SchedError, StateStore,
    ThreadId, Tick,
};

use crate::interrupt::InterruptTable;
use crate::task::{Task, TaskRegistry};
use crate::thread::Thread;
use crate::top::TopReport;

use self::inner::{ProcessInner, Released, Shared};
use self::lifecycle::{dispatch_interrupt, spawn_thread};

/// Everything the embedder supplies to construct a [`Process`].
pub struct ProcessConfig<C: 'static = ()> {
    pub tasks: Vec<Rc<dyn Task<C>>>,
    /// Task spawned, with empty props, when no durable state exists.
    pub root_task: String,
    pub store: Box<dyn StateStore>,
    pub codec: Rc<dyn MemoCodec>,
    pub runtime: RuntimeConfig,
    pub ctx: C,
}

impl<C: 'static> ProcessConfig<C> {
    /// In-memory store, passthrough codec and default runtime settings.
    pub fn new(root_task: impl Into<String>, tasks: Vec<Rc<dyn Task<C>>>, ctx: C) -> Self {
        Self {
            tasks,
            root_task: root_task.into(),
            store: Box::new(MemoryStore::new()),
            codec: Rc::new(PassthroughCodec),
            runtime: RuntimeConfig::default(),
            ctx,
        }
    }

    pub fn with_store(mut self, store: impl StateStore + 'static) -> Self {
        self.store = Box::new(store);
        self
    }

    pub fn with_codec(mut self, codec: impl MemoCodec + 'static) -> Self {
        self.codec = Rc::new(codec);
        self
    }

    pub fn with_runtime(mut self, runtime: RuntimeConfig) -> Self {
        self.runtime = runtime;
        self
    }
}

/// Outcome of one [`Process::execute`] call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
pub struct CycleReport {
    pub tick: Tick,
    /// Full passes over the thread list, at least one.
    pub passes: usize,
    pub live_threads: usize,
}

pub struct Process<C: 'static = ()> {
    shared: Shared<C>,
    store: Box<dyn StateStore>,
    root_task: String,
    max_passes: usize,
}

impl<C: 'static> Process<C> {
    /// Register tasks, load durable state and rebuild every thread from it, or
    /// spawn the root task on a fresh start.
    pub fn new(config: ProcessConfig<C>) -> Result<Self, SchedError> {
        config.runtime.validate()?;
        let tasks = TaskRegistry::from_tasks(config.tasks)?;
        tasks.get(&config.root_task)?;

        let mut store = config.store;
        let state = store.read()?.unwrap_or_default();

        let inner = ProcessInner {
            state,
            order: Vec::new(),
            by_name: HashMap::new(),
            runtimes: HashMap::new(),
            tasks: Rc::new(tasks),
            interrupts: InterruptTable::new(),
            codec: config.codec,
            ctx: Rc::new(RefCell::new(config.ctx)),
            yield_slot: Rc::new(Cell::new(None)),
            current_time: 0,
            dirty: false,
            replaying: None,
            tick_period_secs: config.runtime.tick_period_secs,
            sleep_jitter_ticks: config.runtime.sleep_jitter_ticks,
        };

        let process = Self {
            shared: Rc::new(RefCell::new(inner)),
            store,
            root_task: config.root_task,
            max_passes: config.runtime.max_passes_per_cycle,
        };
        process.init_from_state()?;
        Ok(process)
    }

    fn init_from_state(&self) -> Result<(), SchedError> {
        if self.shared.borrow().state.is_fresh() {
            let id = spawn_thread(&self.shared, &self.root_task, json!({}), None, false)?;
            info!(task = %self.root_task, id, "Fresh start, spawned root thread");
            return Ok(());
        }

        // Construct every thread before hydrating any, since replay may look up
        // parents and siblings.
        let ids: Vec<ThreadId> = {
            let mut inner = self.shared.borrow_mut();
            let states: Vec<_> = inner.state.active_thread_states.values().cloned().collect();
            for state in &states {
                inner.tasks.get(&state.task_name)?;
            }
            inner.state.active_thread_states.clear();
            states
                .into_iter()
                .map(|state| {
                    let id = state.id;
                    inner.add_thread(state);
                    id
                })
                .collect()
        };

        for &id in &ids {
            let task = {
                let inner = self.shared.borrow();
                inner.tasks.get(&inner.thread_state(id)?.task_name)?
            };
            task.interrupts(&Thread::new(id, Rc::clone(&self.shared)))?;
        }

        for &id in &ids {
            // A changed task may no longer match the recorded steps. Leave the
            // body empty; the version check restarts it on its first cycle.
            let stale = {
                let inner = self.shared.borrow();
                let state = inner.thread_state(id)?;
                let registered = inner.tasks.get(&state.task_name)?.version();
                state.task_version != registered
            };
            if stale {
                debug!(id, "Skipping hydration of thread bound to an updated task");
                continue;
            }
            execution::hydrate(&self.shared, id)?;
        }
        info!(threads = ids.len(), "Hydrated process from durable state");
        Ok(())
    }

    /// Run one cycle at `now`, then persist.
    ///
    /// Passes repeat while a pass spawned or released a thread, up to
    /// `max_passes_per_cycle`. Errors abort the cycle without persisting.
    pub fn execute(&mut self, now: Tick) -> Result<CycleReport, SchedError> {
        self.shared.borrow_mut().current_time = now;

        let mut passes = 0;
        loop {
            passes += 1;
            let ids = {
                let mut inner = self.shared.borrow_mut();
                inner.dirty = false;
                inner.order.clone()
            };
            for id in ids {
                execution::execute_thread(&self.shared, id)?;
            }

            if !self.shared.borrow().dirty {
                break;
            }
            if passes >= self.max_passes {
                warn!(tick = now, passes, "Pass limit reached, deferring remaining work to the next cycle");
                break;
            }
        }

        let inner = self.shared.borrow();
        self.store.write(&inner.state)?;
        let report = CycleReport {
            tick: now,
            passes,
            live_threads: inner.order.len(),
        };
        debug!(tick = now, passes, threads = report.live_threads, "Cycle complete");
        Ok(report)
    }

    /// Publish `event` from outside any thread.
    pub fn interrupt(&self, event: &str) -> Result<(), SchedError> {
        dispatch_interrupt(&self.shared, event)
    }

    pub fn thread_by_id(&self, id: ThreadId) -> Result<Thread<C>, SchedError> {
        self.shared.borrow().thread_state(id)?;
        Ok(Thread::new(id, Rc::clone(&self.shared)))
    }

    pub fn thread_by_name(&self, name: &str) -> Result<Thread<C>, SchedError> {
        let id = self.shared.borrow().thread_id_by_name(name)?;
        Ok(Thread::new(id, Rc::clone(&self.shared)))
    }

    /// Live threads in registration order.
    pub fn threads(&self) -> Vec<Thread<C>> {
        self.shared
            .borrow()
            .order
            .iter()
            .map(|&id| Thread::new(id, Rc::clone(&self.shared)))
            .collect()
    }

    pub fn current_time(&self) -> Tick {
        self.shared.borrow().current_time
    }

    /// The Context handed to every thread. Refresh it between cycles.
    pub fn ctx(&self) -> Rc<RefCell<C>> {
        Rc::clone(&self.shared.borrow().ctx)
    }

    /// Copy of the durable state as of now.
    pub fn snapshot(&self) -> ProcessState {
        self.shared.borrow().state.clone()
    }

    pub fn top(&self) -> TopReport {
        let inner = self.shared.borrow();
        TopReport::from_state(&inner.state, inner.current_time)
    }

    pub fn task_names(&self) -> Vec<String> {
        self.shared.borrow().tasks.names()
    }

    /// Exit every root thread, discard the durable state and start fresh.
    pub fn reset(&mut self) -> Result<(), SchedError> {
        let mut released = Released::default();
        {
            let mut inner = self.shared.borrow_mut();
            let roots: Vec<ThreadId> = inner
                .order
                .iter()
                .copied()
                .filter(|id| inner.thread_state(*id).is_ok_and(|state| state.is_root()))
                .collect();
            for root in roots {
                inner.remove_tree(root, &mut released);
            }
            for (_, mut runtime) in inner.runtimes.drain() {
                released.runtime(runtime.reset());
            }
            let handlers = inner.interrupts.clear();
            released.handlers(handlers);
            inner.state = ProcessState::default();
            inner.order.clear();
            inner.by_name.clear();
            inner.dirty = false;
        }
        drop(released);

        info!("Process reset");
        self.store.write(&ProcessState::default())?;
        self.init_from_state()
    }
}

impl<C: 'static> Drop for Process<C> {
    fn drop(&mut self) {
        // Bodies and handlers hold thread handles, which hold the process.
        let mut released = Released::default();
        if let Ok(mut inner) = self.shared.try_borrow_mut() {
            for (_, mut runtime) in inner.runtimes.drain() {
                released.runtime(runtime.reset());
            }
            let handlers = inner.interrupts.clear();
            released.handlers(handlers);
        }
        drop(released);
    }
}
