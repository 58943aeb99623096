use std::future::Future;
use std::rc::Rc;
use std::task::{Context, Poll};

use futures::task::noop_waker_ref;
use tracing::info;

use rethread_core::{SchedError, ThreadId, ASAP};

use crate::task::TaskBody;
use crate::thread::Thread;

use super::inner::{Released, Shared};

enum Step {
    /// Reached a suspension point; check eligibility again.
    Continue,
    /// A loop asked to be called again next tick.
    Parked,
    Crashed(String),
}

/// Resume one thread for the current cycle.
pub(crate) fn execute_thread<C: 'static>(shared: &Shared<C>, id: ThreadId) -> Result<(), SchedError> {
    check_version(shared, id)?;

    while can_execute(shared, id) {
        match step(shared, id)? {
            Step::Continue => record_execution(shared, id),
            Step::Parked => {
                record_execution(shared, id);
                break;
            }
            Step::Crashed(cause) => {
                let mut released = Released::default();
                shared.borrow_mut().handle_crash(id, &cause, &mut released);
                drop(released);
                break;
            }
        }
    }
    Ok(())
}

/// Restart threads whose recorded task version no longer matches the code.
fn check_version<C: 'static>(shared: &Shared<C>, id: ThreadId) -> Result<(), SchedError> {
    let released = {
        let mut inner = shared.borrow_mut();
        let Some(state) = inner.state.active_thread_states.get(&id) else {
            return Ok(());
        };
        let running = state.task_version;
        let code = inner.tasks.get(&state.task_name)?.version();
        if running == code {
            return Ok(());
        }
        let state = inner.thread_state_mut(id)?;
        info!(thread = %state.name, id, from = running, to = code, "Task code updated, restarting");
        state.task_version = code;
        inner.restart(id, true)?
    };
    drop(released);
    Ok(())
}

fn can_execute<C: 'static>(shared: &Shared<C>, id: ThreadId) -> bool {
    let mut inner = shared.borrow_mut();
    let now = inner.current_time;
    let blocked_on = match inner.state.active_thread_states.get(&id) {
        Some(state) if state.is_due(now) => state.blocked_on_thread_id,
        _ => return false,
    };
    match blocked_on {
        None => true,
        Some(target) if inner.contains(target) => false,
        Some(_) => {
            // Target vanished without releasing us.
            if let Ok(state) = inner.thread_state_mut(id) {
                state.blocked_on_thread_id = None;
            }
            true
        }
    }
}

fn record_execution<C: 'static>(shared: &Shared<C>, id: ThreadId) {
    let mut inner = shared.borrow_mut();
    let now = inner.current_time;
    if let Ok(state) = inner.thread_state_mut(id) {
        state.last_execution = now;
    }
}

/// Run a pending loop iteration or the next body segment.
fn step<C: 'static>(shared: &Shared<C>, id: ThreadId) -> Result<Step, SchedError> {
    let (loop_fn, generation) = {
        let mut inner = shared.borrow_mut();
        inner.thread_state_mut(id)?.next_execution = Some(ASAP);
        let runtime = inner.runtimes.entry(id).or_default();
        (runtime.loop_fn.take(), runtime.generation)
    };

    if let Some(mut loop_fn) = loop_fn {
        match loop_fn() {
            Ok(true) => {
                let mut inner = shared.borrow_mut();
                let now = inner.current_time;
                let same = inner.runtimes.get(&id).is_some_and(|rt| rt.generation == generation);
                if !same {
                    drop(inner);
                    drop(loop_fn);
                    return Ok(Step::Continue);
                }
                inner.thread_state_mut(id)?.next_execution = Some(now.saturating_add(1));
                if let Some(runtime) = inner.runtimes.get_mut(&id) {
                    runtime.loop_fn = Some(loop_fn);
                }
                return Ok(Step::Parked);
            }
            Ok(false) => drop(loop_fn),
            Err(e) => return Ok(Step::Crashed(format!("{e:#}"))),
        }
    }

    let (task, body) = {
        let mut inner = shared.borrow_mut();
        let Some(state) = inner.state.active_thread_states.get(&id) else {
            return Ok(Step::Continue);
        };
        let task = inner.tasks.get(&state.task_name)?;
        (task, inner.runtimes.entry(id).or_default().body.take())
    };
    let mut body: TaskBody = match body {
        Some(body) => body,
        None => task.run(Thread::new(id, Rc::clone(shared))),
    };
    let generation = shared.borrow().runtimes.get(&id).map_or(0, |rt| rt.generation);

    let (poll, marked) = poll_body(shared, &mut body);

    let mut body = Some(body);
    let outcome = {
        let mut inner = shared.borrow_mut();
        let present = inner.contains(id);
        let survived = present
            && inner.runtimes.get(&id).is_some_and(|rt| rt.generation == generation);
        match poll {
            Poll::Pending if marked => {
                if survived {
                    inner.thread_state_mut(id)?.program_counter += 1;
                    if let Some(runtime) = inner.runtimes.get_mut(&id) {
                        runtime.body = body.take();
                    }
                }
                Step::Continue
            }
            _ if !present => Step::Continue,
            Poll::Pending => {
                if survived {
                    Step::Crashed("Thread task yielded without a suspension marker".into())
                } else {
                    Step::Continue
                }
            }
            Poll::Ready(Ok(())) => {
                if survived {
                    Step::Crashed("Thread task returned without restarting or exiting".into())
                } else {
                    Step::Continue
                }
            }
            Poll::Ready(Err(e)) => Step::Crashed(format!("{e:#}")),
        }
    };
    drop(body);
    Ok(outcome)
}

/// Poll once with a no-op waker. Returns whether a [`Suspend`](crate::Suspend)
/// marked the yield. The marker may come from an operation aimed at another
/// thread, such as awaiting `other.exit()`.
fn poll_body<C: 'static>(shared: &Shared<C>, body: &mut TaskBody) -> (Poll<anyhow::Result<()>>, bool) {
    let slot = Rc::clone(&shared.borrow().yield_slot);
    slot.set(None);
    let mut cx = Context::from_waker(noop_waker_ref());
    let poll = body.as_mut().poll(&mut cx);
    let marked = slot.take().is_some();
    (poll, marked)
}

/// Rebuild a thread's body by replaying it `program_counter` steps.
pub(crate) fn hydrate<C: 'static>(shared: &Shared<C>, id: ThreadId) -> Result<(), SchedError> {
    let (task, steps, name) = {
        let mut inner = shared.borrow_mut();
        let state = inner.thread_state(id)?;
        let (steps, name) = (state.program_counter, state.name.clone());
        let task = inner.tasks.get(&state.task_name)?;
        let runtime = inner.runtimes.entry(id).or_default();
        if runtime.body.is_some() {
            return Err(SchedError::AlreadyHydrated(name));
        }
        runtime.memo_cursor = 0;
        inner.replaying = Some(id);
        (task, steps, name)
    };

    let result = replay(shared, id, task.run(Thread::new(id, Rc::clone(shared))), steps, &name);

    let mut inner = shared.borrow_mut();
    inner.replaying = None;
    let body = result?;
    let runtime = inner.runtimes.entry(id).or_default();
    runtime.memo_cursor = 0;
    runtime.body = Some(body);
    Ok(())
}

fn replay<C: 'static>(
    shared: &Shared<C>,
    id: ThreadId,
    mut body: TaskBody,
    steps: u64,
    name: &str,
) -> Result<TaskBody, SchedError> {
    let failure = |cause: String| SchedError::Hydration {
        thread: name.to_string(),
        cause,
    };

    for step in 0..steps {
        // Any loop set by the previous step was already left behind.
        let stale = shared
            .borrow_mut()
            .runtimes
            .get_mut(&id)
            .and_then(|rt| rt.loop_fn.take());
        drop(stale);

        match poll_body(shared, &mut body) {
            (Poll::Pending, true) => {}
            (Poll::Pending, false) => {
                return Err(failure(format!("step {step} yielded without a suspension marker")));
            }
            (Poll::Ready(Ok(())), _) => {
                return Err(failure(format!("task returned after {step} of {steps} steps")));
            }
            (Poll::Ready(Err(e)), _) => return Err(failure(format!("{e:#}"))),
        }
    }
    Ok(body)
}
