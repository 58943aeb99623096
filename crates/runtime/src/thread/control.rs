use rand::Rng;
use serde::Serialize;

use rethread_core::{SchedError, Tick, ASAP};

use super::memo::SpawnOptions;
use super::{Suspend, Thread};

impl<C: 'static> Thread<C> {
    /// Park the thread indefinitely. It stays alive but idle until resumed.
    pub fn suspend(&self) -> Suspend {
        let outcome = {
            let mut inner = self.shared.borrow_mut();
            if inner.replaying.is_some() {
                Ok(())
            } else {
                inner
                    .thread_state_mut(self.id)
                    .map(|state| state.next_execution = None)
            }
        };
        self.suspension(outcome)
    }

    /// Clear any suspension or sleep. Not a suspension point.
    pub fn resume(&self) -> Result<(), SchedError> {
        let mut inner = self.shared.borrow_mut();
        if inner.replaying.is_some() {
            return Ok(());
        }
        inner.thread_state_mut(self.id)?.next_execution = Some(ASAP);
        Ok(())
    }

    /// Become eligible again at `current_time + ticks`.
    pub fn sleep_ticks(&self, ticks: Tick) -> Suspend {
        let outcome = {
            let mut inner = self.shared.borrow_mut();
            if inner.replaying.is_some() {
                Ok(())
            } else {
                let wake = inner.current_time.saturating_add(ticks);
                inner
                    .thread_state_mut(self.id)
                    .map(|state| state.next_execution = Some(wake))
            }
        };
        self.suspension(outcome)
    }

    pub fn sleep_tick(&self) -> Suspend {
        self.sleep_ticks(1)
    }

    /// Sleep for roughly `seconds` of real time. A few ticks of random jitter
    /// keep otherwise identical periodic threads from running in lockstep.
    pub fn sleep_seconds(&self, seconds: f64) -> Suspend {
        let (period, jitter) = {
            let inner = self.shared.borrow();
            (inner.tick_period_secs, inner.sleep_jitter_ticks as i64)
        };
        let base = (seconds / period).floor().max(0.0) as i64;
        let offset = if jitter > 0 {
            rand::thread_rng().gen_range(-jitter..=jitter)
        } else {
            0
        };
        self.sleep_ticks((base + offset).max(0) as Tick)
    }

    /// Call `step` once per cycle until it returns `Ok(false)`, waiting exactly
    /// one tick between calls. The first call happens in the same cycle.
    ///
    /// An error from `step` crashes the thread.
    pub fn loop_while<F>(&self, step: F) -> Suspend
    where
        F: FnMut() -> anyhow::Result<bool> + 'static,
    {
        // Stored while replaying too: the last replayed step may be a loop
        // still in progress.
        let outcome = {
            let mut inner = self.shared.borrow_mut();
            let found = inner.thread_state(self.id).map(|_| ());
            if found.is_ok() {
                inner.runtimes.entry(self.id).or_default().loop_fn = Some(Box::new(step));
            }
            found
        };
        self.suspension(outcome)
    }

    /// Block until `target` exits. A no-op if it already has.
    pub fn join(&self, target: &Thread<C>) -> Suspend {
        let outcome = {
            let mut inner = self.shared.borrow_mut();
            if inner.replaying.is_some() {
                Ok(())
            } else {
                inner.join(self.id, target.id)
            }
        };
        self.suspension(outcome)
    }

    /// Spawn a child and join it in one step.
    pub fn do_task(&self, task_name: &str, props: impl Serialize) -> Suspend {
        match self.start_sub_thread(task_name, props, SpawnOptions::default()) {
            Ok(child) => self.join(&child),
            Err(e) => self.suspension(Err(e)),
        }
    }

    /// Kill all children and start the task over from the top, within the
    /// current cycle. Code after the await never runs.
    pub fn restart(&self) -> Suspend {
        let outcome = {
            let mut inner = self.shared.borrow_mut();
            if inner.replaying.is_some() {
                Err(SchedError::InvalidDuringHydration {
                    thread: inner.display_name(self.id),
                    op: "restart",
                })
            } else {
                inner.restart(self.id, true)
            }
        };
        let outcome = outcome.map(drop);
        self.suspension(outcome)
    }

    /// Terminate the thread and every descendant, releasing any joined
    /// waiter. Code after the await never runs.
    pub fn exit(&self) -> Suspend {
        let outcome = {
            let mut inner = self.shared.borrow_mut();
            if inner.replaying.is_some() {
                Err(SchedError::InvalidDuringHydration {
                    thread: inner.display_name(self.id),
                    op: "exit",
                })
            } else {
                inner.exit_thread(self.id)
            }
        };
        let outcome = outcome.map(drop);
        self.suspension(outcome)
    }
}
