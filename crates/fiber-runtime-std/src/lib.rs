//! Standard runtime services backed by Rust's `std` library.
//!
//! This crate provides concrete implementations of the idle scheduling
//! traits defined in `fiber-core`. Applications construct a [`StdRuntime`]
//! around their host adapter and call [`StdRuntime::run_pending`] from their
//! event loop whenever the thread would otherwise sit idle.

use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fmt;
use std::rc::Rc;
use std::time::{Duration, Instant};

use fiber_core::{
    Element, HostAdapter, IdleCallback, IdleCallbackId, IdleDeadline, IdleScheduler, NodeId,
    Runtime, RuntimeConfig,
};

/// Time granted to each idle slice unless configured otherwise.
pub const DEFAULT_SLICE_BUDGET: Duration = Duration::from_millis(16);

/// Deadline measured against the monotonic clock.
#[derive(Debug, Clone, Copy)]
pub struct InstantDeadline {
    end: Instant,
}

impl InstantDeadline {
    pub fn after(budget: Duration) -> Self {
        Self {
            end: Instant::now() + budget,
        }
    }

    pub fn end(&self) -> Instant {
        self.end
    }
}

impl IdleDeadline for InstantDeadline {
    fn time_remaining(&self) -> Duration {
        self.end.saturating_duration_since(Instant::now())
    }
}

/// Scheduler that queues idle callbacks until the embedder reports idle time.
pub struct StdIdleScheduler {
    slice_budget: Cell<Duration>,
    next_id: Cell<IdleCallbackId>,
    queue: RefCell<VecDeque<(IdleCallbackId, IdleCallback)>>,
}

impl StdIdleScheduler {
    pub fn new() -> Self {
        Self::with_slice_budget(DEFAULT_SLICE_BUDGET)
    }

    pub fn with_slice_budget(slice_budget: Duration) -> Self {
        Self {
            slice_budget: Cell::new(slice_budget),
            next_id: Cell::new(0),
            queue: RefCell::new(VecDeque::new()),
        }
    }

    pub fn slice_budget(&self) -> Duration {
        self.slice_budget.get()
    }

    pub fn set_slice_budget(&self, slice_budget: Duration) {
        self.slice_budget.set(slice_budget);
    }

    /// Number of callbacks waiting for an idle slice.
    pub fn pending(&self) -> usize {
        self.queue.borrow().len()
    }

    /// Runs the callbacks queued before this call, each with a fresh slice.
    /// Callbacks registered while running wait for the next call.
    pub fn run_pending(&self) -> usize {
        let batch: Vec<(IdleCallbackId, IdleCallback)> = self.queue.borrow_mut().drain(..).collect();
        let ran = batch.len();
        for (id, callback) in batch {
            log::trace!("running idle slice {id}");
            let deadline = InstantDeadline::after(self.slice_budget.get());
            callback(&deadline);
        }
        ran
    }

    /// Keeps granting slices until nothing is queued or `max_rounds` rounds
    /// have run. Returns the number of rounds.
    pub fn run_until_idle(&self, max_rounds: usize) -> usize {
        let mut rounds = 0;
        while rounds < max_rounds && self.run_pending() > 0 {
            rounds += 1;
        }
        if rounds == max_rounds && self.pending() > 0 {
            log::warn!("idle queue still busy after {max_rounds} rounds");
        }
        rounds
    }
}

impl Default for StdIdleScheduler {
    fn default() -> Self {
        Self::new()
    }
}

impl fmt::Debug for StdIdleScheduler {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StdIdleScheduler")
            .field("slice_budget", &self.slice_budget.get())
            .field("pending", &self.pending())
            .finish()
    }
}

impl IdleScheduler for StdIdleScheduler {
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

/// Convenience container bundling the standard scheduler with a runtime.
pub struct StdRuntime<A: HostAdapter + 'static> {
    scheduler: Rc<StdIdleScheduler>,
    runtime: Runtime<A>,
}

impl<A: HostAdapter + 'static> StdRuntime<A> {
    /// Creates a runtime rendering into `host_root` with default settings.
    pub fn new(host: A, host_root: NodeId) -> Self {
        Self::with_config(host, host_root, RuntimeConfig::default())
    }

    pub fn with_config(host: A, host_root: NodeId, config: RuntimeConfig) -> Self {
        let scheduler = Rc::new(StdIdleScheduler::new());
        let runtime = Runtime::with_config(host, host_root, scheduler.clone(), config);
        Self { scheduler, runtime }
    }

    /// Returns the [`fiber_core::Runtime`] driven by the standard scheduler.
    pub fn runtime(&self) -> Runtime<A> {
        self.runtime.clone()
    }

    pub fn scheduler(&self) -> Rc<StdIdleScheduler> {
        Rc::clone(&self.scheduler)
    }

    pub fn render(&self, element: Element) {
        self.runtime.render(element);
    }

    /// Grants one idle slice to every queued callback.
    pub fn run_pending(&self) -> usize {
        self.scheduler.run_pending()
    }

    /// Grants slices until the runtime has no work left or `max_rounds`
    /// rounds have run.
    pub fn run_until_idle(&self, max_rounds: usize) -> usize {
        self.scheduler.run_until_idle(max_rounds)
    }

    pub fn has_pending_work(&self) -> bool {
        self.runtime.has_pending_work()
    }
}

impl<A: HostAdapter + 'static> fmt::Debug for StdRuntime<A> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StdRuntime")
            .field("scheduler", &self.scheduler)
            .field("pending_work", &self.runtime.has_pending_work())
            .finish()
    }
}
