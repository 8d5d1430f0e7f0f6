//! Render session state and the idle-time work loop.
//!
//! A [`Runtime`] owns the host adapter, the fiber arena and the pointers that
//! describe the render pass in flight. Everything a pass needs is reset in one
//! step whenever a new pass begins, so a superseded pass leaves nothing behind.

use std::cell::{Cell, RefCell};
use std::rc::{Rc, Weak};
use std::time::Duration;

use crate::commit::{commit_deletion, commit_work, CommitStats};
use crate::element::{Element, ElementKind, Props, ROOT_TAG};
use crate::fiber::{Fiber, FiberId, FiberTree};
use crate::hooks;
use crate::host::{HostAdapter, NodeError, NodeId};
use crate::platform::{IdleCallbackId, IdleDeadline, IdleScheduler};
use crate::reconciler::perform_unit_of_work;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RuntimeConfig {
    /// Work yields once the idle slice has less than this left.
    pub min_time_remaining: Duration,
}

impl RuntimeConfig {
    pub fn with_min_time_remaining(mut self, min_time_remaining: Duration) -> Self {
        self.min_time_remaining = min_time_remaining;
        self
    }
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            min_time_remaining: Duration::from_millis(1),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SliceStatus {
    /// The slice ran out of time with units of work left.
    Pending,
    /// Nothing left to build; any finished pass has been committed.
    Done,
}

pub(crate) enum RenderRequest {
    Root(Element),
    Rerender,
}

pub(crate) trait RenderRequester {
    fn request(&self, request: RenderRequest);
}

struct Detached;

impl RenderRequester for Detached {
    fn request(&self, _request: RenderRequest) {}
}

/// Weak handle used by state setters to ask for a new render pass.
#[derive(Clone)]
pub struct RuntimeHandle(Weak<dyn RenderRequester>);

impl RuntimeHandle {
    /// A handle bound to no runtime. Requests through it are dropped.
    pub fn detached() -> Self {
        let requester: Weak<dyn RenderRequester> = Weak::<Detached>::new();
        RuntimeHandle(requester)
    }

    pub fn is_alive(&self) -> bool {
        self.0.strong_count() > 0
    }

    /// Starts a fresh pass from the latest rendered element, discarding any
    /// pass still being built.
    pub fn request_rerender(&self) {
        match self.0.upgrade() {
            Some(requester) => requester.request(RenderRequest::Rerender),
            None => log::debug!("dropping rerender request for a runtime that no longer exists"),
        }
    }
}

struct WorkState<A> {
    host: A,
    host_root: NodeId,
    tree: FiberTree,
    root_props: Option<Rc<Props>>,
    current_root: Option<FiberId>,
    wip_root: Option<FiberId>,
    next_unit: Option<FiberId>,
    last_commit: Option<CommitStats>,
}

impl<A: HostAdapter> WorkState<A> {
    fn begin_pass(&mut self, request: RenderRequest) {
        let props = match request {
            RenderRequest::Root(element) => Rc::new(Props::root(element)),
            RenderRequest::Rerender => match &self.root_props {
                Some(props) => Rc::clone(props),
                None => {
                    log::debug!("rerender requested before anything was rendered");
                    return;
                }
            },
        };
        if self.wip_root.is_some() {
            log::debug!("discarding in-flight render pass");
        }
        self.discard_pass();

        let mut root = Fiber::new(ElementKind::from(ROOT_TAG), Rc::clone(&props));
        root.host_node = Some(self.host_root);
        root.alternate = self.current_root;
        let id = self.tree.insert(root);
        self.root_props = Some(props);
        self.wip_root = Some(id);
        self.next_unit = Some(id);
        log::debug!("render pass started (baseline: {:?})", self.current_root);
    }

    fn discard_pass(&mut self) {
        if self.wip_root.take().is_some() {
            self.tree.retain_reachable(self.current_root);
        }
        self.next_unit = None;
        self.tree.abandon_deletions();
    }

    fn commit_root(&mut self) -> Result<CommitStats, NodeError> {
        let Some(root) = self.wip_root else {
            return Ok(CommitStats::default());
        };
        let deletions = self.tree.deletions().to_vec();
        let mut stats = CommitStats::default();
        if let Err(err) = self.apply_effects(root, &deletions, &mut stats) {
            self.discard_pass();
            return Err(err);
        }
        self.tree.settle_deletions();
        self.current_root = Some(root);
        self.wip_root = None;
        self.next_unit = None;
        self.tree.retain_reachable(self.current_root);
        self.last_commit = Some(stats);
        Ok(stats)
    }

    fn apply_effects(
        &mut self,
        root: FiberId,
        deletions: &[FiberId],
        stats: &mut CommitStats,
    ) -> Result<(), NodeError> {
        for &deleted in deletions {
            commit_deletion(&self.tree, &mut self.host, deleted, stats)?;
        }
        commit_work(&self.tree, &mut self.host, root, stats)
    }
}

struct RuntimeInner<A> {
    state: RefCell<WorkState<A>>,
    deferred: RefCell<Option<RenderRequest>>,
    scheduler: Rc<dyn IdleScheduler>,
    armed: Cell<Option<IdleCallbackId>>,
    config: RuntimeConfig,
    handle: RuntimeHandle,
    this: Weak<RuntimeInner<A>>,
}

impl<A: HostAdapter + 'static> RuntimeInner<A> {
    /// Keeps a request that arrived while the state was busy. A pending root
    /// render is never replaced by a plain rerender.
    fn defer(&self, request: RenderRequest) {
        let mut deferred = self.deferred.borrow_mut();
        if matches!(
            (&*deferred, &request),
            (Some(RenderRequest::Root(_)), RenderRequest::Rerender)
        ) {
            return;
        }
        *deferred = Some(request);
    }

    fn apply_deferred(&self, state: &mut WorkState<A>) {
        let request = self.deferred.borrow_mut().take();
        if let Some(request) = request {
            state.begin_pass(request);
        }
    }

    fn has_pending_work(&self) -> bool {
        self.deferred.borrow().is_some()
            || self
                .state
                .try_borrow()
                .map_or(true, |state| state.wip_root.is_some())
    }

    fn schedule_slice(&self) {
        if self.armed.get().is_some() || !self.has_pending_work() {
            return;
        }
        let this = self.this.clone();
        let id = self
            .scheduler
            .request_idle_slice(Box::new(move |deadline: &dyn IdleDeadline| {
                if let Some(inner) = this.upgrade() {
                    inner.work_loop(deadline);
                }
            }));
        self.armed.set(Some(id));
    }

    fn work_loop(&self, deadline: &dyn IdleDeadline) {
        self.armed.set(None);
        if let Err(err) = self.run_slice(deadline) {
            log::error!("render pass failed: {err}");
        }
        self.schedule_slice();
    }

    fn run_slice(&self, deadline: &dyn IdleDeadline) -> Result<SliceStatus, NodeError> {
        if hooks::is_rendering() {
            log::warn!("run_slice called from inside a component render; skipping");
            return Ok(SliceStatus::Pending);
        }
        let Ok(mut state) = self.state.try_borrow_mut() else {
            log::warn!("run_slice re-entered while the runtime is busy; skipping");
            return Ok(SliceStatus::Pending);
        };
        self.apply_deferred(&mut state);

        while let Some(unit) = state.next_unit {
            if deadline.time_remaining() < self.config.min_time_remaining {
                log::trace!("idle slice exhausted; yielding");
                return Ok(SliceStatus::Pending);
            }
            let WorkState { tree, host, .. } = &mut *state;
            match perform_unit_of_work(tree, host, &self.handle, unit) {
                Ok(next) => state.next_unit = next,
                Err(err) => {
                    state.discard_pass();
                    return Err(err);
                }
            }
            self.apply_deferred(&mut state);
        }

        if state.wip_root.is_some() {
            let stats = state.commit_root()?;
            log::debug!(
                "committed: {} added, {} updated, {} removed",
                stats.added,
                stats.updated,
                stats.removed
            );
        }
        Ok(SliceStatus::Done)
    }
}

impl<A: HostAdapter + 'static> RenderRequester for RuntimeInner<A> {
    fn request(&self, request: RenderRequest) {
        match self.state.try_borrow_mut() {
            Ok(mut state) => {
                self.apply_deferred(&mut state);
                state.begin_pass(request);
            }
            Err(_) => self.defer(request),
        }
        self.schedule_slice();
    }
}

/// Reconciles element trees into a host tree on idle time.
pub struct Runtime<A: HostAdapter + 'static> {
    inner: Rc<RuntimeInner<A>>,
}

impl<A: HostAdapter + 'static> Clone for Runtime<A> {
    fn clone(&self) -> Self {
        Self {
            inner: Rc::clone(&self.inner),
        }
    }
}

impl<A: HostAdapter + 'static> Runtime<A> {
    /// Creates a runtime rendering into `host_root`, an existing node of `host`.
    pub fn new(host: A, host_root: NodeId, scheduler: Rc<dyn IdleScheduler>) -> Self {
        Self::with_config(host, host_root, scheduler, RuntimeConfig::default())
    }

    pub fn with_config(
        host: A,
        host_root: NodeId,
        scheduler: Rc<dyn IdleScheduler>,
        config: RuntimeConfig,
    ) -> Self {
        let inner = Rc::new_cyclic(|this: &Weak<RuntimeInner<A>>| {
            let requester: Weak<dyn RenderRequester> = this.clone();
            RuntimeInner {
                state: RefCell::new(WorkState {
                    host,
                    host_root,
                    tree: FiberTree::new(),
                    root_props: None,
                    current_root: None,
                    wip_root: None,
                    next_unit: None,
                    last_commit: None,
                }),
                deferred: RefCell::new(None),
                scheduler,
                armed: Cell::new(None),
                config,
                handle: RuntimeHandle(requester),
                this: this.clone(),
            }
        });
        Self { inner }
    }

    /// Starts a new render pass for `element` and makes sure an idle slice is
    /// armed to build it. Any pass still in flight is discarded.
    pub fn render(&self, element: Element) {
        self.inner.request(RenderRequest::Root(element));
    }

    /// Builds fibers until the deadline runs low or the tree is complete, and
    /// commits a completed tree.
    ///
    /// A host error aborts the pass: nothing is promoted and the previously
    /// committed tree stays current.
    pub fn run_slice(&self, deadline: &dyn IdleDeadline) -> Result<SliceStatus, NodeError> {
        self.inner.run_slice(deadline)
    }

    /// Cancels the armed idle slice, if any. The next render request re-arms.
    pub fn stop(&self) {
        if let Some(id) = self.inner.armed.take() {
            self.inner.scheduler.cancel_idle_slice(id);
        }
    }

    pub fn is_scheduled(&self) -> bool {
        self.inner.armed.get().is_some()
    }

    pub fn has_pending_work(&self) -> bool {
        self.inner.has_pending_work()
    }

    pub fn handle(&self) -> RuntimeHandle {
        self.inner.handle.clone()
    }

    pub fn config(&self) -> RuntimeConfig {
        self.inner.config
    }

    pub fn host_root(&self) -> NodeId {
        self.inner.state.borrow().host_root
    }

    pub fn current_root(&self) -> Option<FiberId> {
        self.inner.state.borrow().current_root
    }

    pub fn pending_root(&self) -> Option<FiberId> {
        self.inner.state.borrow().wip_root
    }

    pub fn next_unit(&self) -> Option<FiberId> {
        self.inner.state.borrow().next_unit
    }

    pub fn last_commit(&self) -> Option<CommitStats> {
        self.inner.state.borrow().last_commit
    }

    pub fn with_tree<R>(&self, f: impl FnOnce(&FiberTree) -> R) -> R {
        f(&self.inner.state.borrow().tree)
    }

    pub fn with_host<R>(&self, f: impl FnOnce(&A) -> R) -> R {
        f(&self.inner.state.borrow().host)
    }

    pub fn with_host_mut<R>(&self, f: impl FnOnce(&mut A) -> R) -> R {
        f(&mut self.inner.state.borrow_mut().host)
    }
}

#[cfg(test)]
#[path = "tests/runtime_tests.rs"]
mod tests;
