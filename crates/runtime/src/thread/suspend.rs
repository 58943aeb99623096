use std::cell::Cell;
use std::future::Future;
use std::pin::Pin;
use std::rc::Rc;
use std::task::{Context, Poll};

use rethread_core::{SchedError, ThreadId};

/// The suspension marker.
///
/// Returned by every control operation. The operation's effect is applied
/// eagerly; awaiting the `Suspend` hands control back to the scheduler exactly
/// once. If the operation failed, the await resolves immediately with the error.
#[must_use = "control operations only suspend the thread when awaited; use `detach` outside a task body"]
pub struct Suspend {
    slot: Rc<Cell<Option<ThreadId>>>,
    thread: ThreadId,
    error: Option<SchedError>,
    yielded: bool,
}

impl Suspend {
    pub(crate) fn new(
        slot: Rc<Cell<Option<ThreadId>>>,
        thread: ThreadId,
        outcome: Result<(), SchedError>,
    ) -> Self {
        Self {
            slot,
            thread,
            error: outcome.err(),
            yielded: false,
        }
    }

    /// Keep the immediate effect without suspending. For interrupt handlers and
    /// embedder code acting on a thread from the outside.
    pub fn detach(self) -> Result<(), SchedError> {
        match self.error {
            Some(e) => Err(e),
            None => Ok(()),
        }
    }
}

impl Future for Suspend {
    type Output = Result<(), SchedError>;

    fn poll(self: Pin<&mut Self>, _cx: &mut Context<'_>) -> Poll<Self::Output> {
        let this = self.get_mut();
        if let Some(e) = this.error.take() {
            return Poll::Ready(Err(e));
        }
        if this.yielded {
            return Poll::Ready(Ok(()));
        }
        this.yielded = true;
        this.slot.set(Some(this.thread));
        Poll::Pending
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use futures::task::noop_waker_ref;

    #[test]
    fn yields_once_and_marks_slot() {
        let slot = Rc::new(Cell::new(None));
        let mut s = Suspend::new(Rc::clone(&slot), 4, Ok(()));
        let mut cx = Context::from_waker(noop_waker_ref());

        assert!(Pin::new(&mut s).poll(&mut cx).is_pending());
        assert_eq!(slot.take(), Some(4));
        assert!(matches!(Pin::new(&mut s).poll(&mut cx), Poll::Ready(Ok(()))));
        assert_eq!(slot.get(), None);
    }

    #[test]
    fn failed_operation_resolves_immediately() {
        let slot = Rc::new(Cell::new(None));
        let mut s = Suspend::new(Rc::clone(&slot), 4, Err(SchedError::ThreadNotFound(9)));
        let mut cx = Context::from_waker(noop_waker_ref());

        assert!(matches!(
            Pin::new(&mut s).poll(&mut cx),
            Poll::Ready(Err(SchedError::ThreadNotFound(9)))
        ));
        assert_eq!(slot.get(), None);
    }

    #[test]
    fn detach_surfaces_error() {
        let slot = Rc::new(Cell::new(None));
        assert!(Suspend::new(Rc::clone(&slot), 1, Ok(())).detach().is_ok());
        assert!(Suspend::new(slot, 1, Err(SchedError::ThreadNotFound(1))).detach().is_err());
    }
}
