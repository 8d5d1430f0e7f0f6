//! Platform abstraction traits for the idle-time scheduler.
//!
//! The runtime never owns a timer. It asks the host for one idle slice at a
//! time and re-arms from inside the slice callback while work remains, which
//! lets timer callbacks, worker loops or cooperative tasks drive the same core.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::time::Duration;

/// Upper bound on the slices [`ManualScheduler::run_all`] grants in one call.
const MAX_MANUAL_SLICES: usize = 10_000;

pub type IdleCallbackId = u64;

/// Callback invoked by the host once an idle slice starts.
pub type IdleCallback = Box<dyn FnOnce(&dyn IdleDeadline) + 'static>;

/// Remaining budget of the current idle slice.
pub trait IdleDeadline {
    /// Time left before the runtime should yield back to the host.
    fn time_remaining(&self) -> Duration;
}

/// A plain duration acts as a deadline that never runs out.
impl IdleDeadline for Duration {
    fn time_remaining(&self) -> Duration {
        *self
    }
}

/// Grants idle slices to the runtime.
///
/// Each registration fires at most once. Implementations are single-threaded;
/// callbacks capture `Rc` state and must run on the thread that requested them.
pub trait IdleScheduler {
    /// Registers `callback` for the next idle slice.
    fn request_idle_slice(&self, callback: IdleCallback) -> IdleCallbackId;

    /// Drops a registration that has not fired yet. Unknown ids are ignored.
    fn cancel_idle_slice(&self, id: IdleCallbackId);
}

/// Idle scheduler that only fires when its owner says so. Useful for headless
/// hosts and tests that need to control exactly when work runs.
#[derive(Default)]
pub struct ManualScheduler {
    next_id: Cell<IdleCallbackId>,
    queue: RefCell<VecDeque<(IdleCallbackId, IdleCallback)>>,
}

impl ManualScheduler {
    pub fn new() -> Self {
        Self::default()
    }

    /// Fires the oldest queued callback with `deadline`. Returns `false` when
    /// nothing was queued.
    pub fn run_next(&self, deadline: &dyn IdleDeadline) -> bool {
        let next = self.queue.borrow_mut().pop_front();
        match next {
            Some((_, callback)) => {
                callback(deadline);
                true
            }
            None => false,
        }
    }

    /// Fires callbacks with an unbounded deadline until the queue is empty.
    pub fn run_all(&self) -> usize {
        let mut slices = 0;
        while slices < MAX_MANUAL_SLICES && self.run_next(&Duration::MAX) {
            slices += 1;
        }
        if slices == MAX_MANUAL_SLICES {
            log::warn!("idle queue still busy after {MAX_MANUAL_SLICES} slices");
        }
        slices
    }

    pub fn queued(&self) -> usize {
        self.queue.borrow().len()
    }
}

impl IdleScheduler for ManualScheduler {
    fn request_idle_slice(&self, callback: IdleCallback) -> IdleCallbackId {
        let id = self.next_id.get() + 1;
        self.next_id.set(id);
        self.queue.borrow_mut().push_back((id, callback));
        id
    }

    fn cancel_idle_slice(&self, id: IdleCallbackId) {
        self.queue.borrow_mut().retain(|(queued, _)| *queued != id);
    }
}

/// Deadline that allows a fixed number of units of work, independent of the
/// wall clock.
#[derive(Debug)]
pub struct StepDeadline {
    remaining: Cell<usize>,
}

impl StepDeadline {
    pub fn allowing(units: usize) -> Self {
        Self {
            remaining: Cell::new(units),
        }
    }

    pub fn remaining(&self) -> usize {
        self.remaining.get()
    }
}

impl IdleDeadline for StepDeadline {
    fn time_remaining(&self) -> Duration {
        let remaining = self.remaining.get();
        if remaining == 0 {
            return Duration::ZERO;
        }
        self.remaining.set(remaining - 1);
        Duration::MAX
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::rc::Rc;

    #[test]
    fn step_deadline_counts_units() {
        let deadline = StepDeadline::allowing(2);
        assert_eq!(deadline.time_remaining(), Duration::MAX);
        assert_eq!(deadline.time_remaining(), Duration::MAX);
        assert_eq!(deadline.time_remaining(), Duration::ZERO);
        assert_eq!(deadline.remaining(), 0);
    }

    #[test]
    fn manual_scheduler_fires_in_order_and_honours_cancel() {
        let scheduler = ManualScheduler::new();
        let log = Rc::new(RefCell::new(Vec::new()));
        let push = |label: &'static str| {
            let log = Rc::clone(&log);
            Box::new(move |_: &dyn IdleDeadline| log.borrow_mut().push(label)) as IdleCallback
        };
        scheduler.request_idle_slice(push("first"));
        let cancelled = scheduler.request_idle_slice(push("cancelled"));
        scheduler.request_idle_slice(push("last"));
        scheduler.cancel_idle_slice(cancelled);

        assert_eq!(scheduler.queued(), 2);
        assert_eq!(scheduler.run_all(), 2);
        assert_eq!(*log.borrow(), ["first", "last"]);
    }
}
