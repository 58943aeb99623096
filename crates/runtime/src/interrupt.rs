//! Process-scoped named-event pub/sub.
//!
//! Handlers are rebuilt every time a process is constructed (via each task's
//! `interrupts` hook) and dropped when their owning thread exits, so handlers
//! referencing destroyed threads cannot accumulate.

use std::collections::HashMap;
use std::rc::Rc;

use rethread_core::{SchedError, ThreadId};

pub type InterruptHandler = Rc<dyn Fn() -> Result<(), SchedError>>;

#[derive(Default)]
pub struct InterruptTable {
    handlers: HashMap<String, Vec<(ThreadId, InterruptHandler)>>,
}

impl InterruptTable {
    pub fn new() -> Self {
        Self::default()
    }

    /// Append a handler for `event` owned by `owner`. One handler per event per thread.
    pub fn register(
        &mut self,
        event: &str,
        owner: ThreadId,
        handler: InterruptHandler,
    ) -> Result<(), SchedError> {
        let handlers = self.handlers.entry(event.to_string()).or_default();
        if handlers.iter().any(|(id, _)| *id == owner) {
            return Err(SchedError::DuplicateInterrupt {
                event: event.to_string(),
                thread: owner,
            });
        }
        handlers.push((owner, handler));
        Ok(())
    }

    /// Drop every handler owned by `owner`, returning them so the caller can
    /// release them outside any borrow.
    pub fn unregister_thread(&mut self, owner: ThreadId) -> Vec<InterruptHandler> {
        let mut removed = Vec::new();
        self.handlers.retain(|_, handlers| {
            handlers.retain(|(id, handler)| {
                if *id == owner {
                    removed.push(Rc::clone(handler));
                    false
                } else {
                    true
                }
            });
            !handlers.is_empty()
        });
        removed
    }

    /// Handlers for `event` with their owning thread, in registration order.
    pub fn handlers_for(&self, event: &str) -> Vec<(ThreadId, InterruptHandler)> {
        self.handlers
            .get(event)
            .map(|handlers| {
                handlers
                    .iter()
                    .map(|(owner, h)| (*owner, Rc::clone(h)))
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Events `owner` is subscribed to, sorted.
    pub fn events_for(&self, owner: ThreadId) -> Vec<String> {
        let mut events: Vec<String> = self
            .handlers
            .iter()
            .filter(|(_, handlers)| handlers.iter().any(|(id, _)| *id == owner))
            .map(|(event, _)| event.clone())
            .collect();
        events.sort();
        events
    }

    pub fn clear(&mut self) -> Vec<InterruptHandler> {
        self.handlers
            .drain()
            .flat_map(|(_, handlers)| handlers.into_iter().map(|(_, h)| h))
            .collect()
    }

    pub fn len(&self) -> usize {
        self.handlers.values().map(Vec::len).sum()
    }

    pub fn is_empty(&self) -> bool {
        self.handlers.is_empty()
    }
}
