//! Per-component state identified by call order.
//!
//! While a component fiber is evaluated, a hook frame sits on a thread-local
//! stack. Each `use_state` call claims the next slot of that frame, reads the
//! record stored at the same position on the alternate fiber, and records a
//! fresh one for the fiber being built.

use std::any::Any;
use std::cell::{Cell, RefCell};
use std::collections::VecDeque;
use std::fmt;
use std::rc::Rc;

use crate::fiber::FiberId;
use crate::runtime::RuntimeHandle;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum HookError {
    OutsideComponent,
}

impl fmt::Display for HookError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            HookError::OutsideComponent => {
                f.write_str("use_state called outside of a component render")
            }
        }
    }
}

impl std::error::Error for HookError {}

/// Type-erased hook record stored on a fiber.
pub(crate) trait HookSlot: Any {
    fn into_any(self: Rc<Self>) -> Rc<dyn Any>;

    /// Address of the update queue shared by every record of this slot.
    fn queue_id(&self) -> *const ();

    /// Called once the fiber holding this record has been committed.
    fn commit(&self);
}

/// Re-runs granted to a component that keeps setting its own state while it
/// renders.
pub(crate) const MAX_RENDER_RETRIES: usize = 25;

struct HookFrame {
    fiber: FiberId,
    previous: Vec<Rc<dyn HookSlot>>,
    recorded: Vec<Rc<dyn HookSlot>>,
    cursor: usize,
    /// Set when the component queued an update on one of its own slots.
    dirty: bool,
    runtime: RuntimeHandle,
}

impl HookFrame {
    fn owns(&self, queue: *const ()) -> bool {
        self.recorded
            .iter()
            .chain(&self.previous)
            .any(|slot| slot.queue_id() == queue)
    }

    /// Prepares another evaluation that reads the records just produced.
    fn rewind(&mut self) {
        self.previous = std::mem::take(&mut self.recorded);
        self.cursor = 0;
        self.dirty = false;
    }
}

thread_local! {
    static HOOK_FRAMES: RefCell<Vec<HookFrame>> = RefCell::new(Vec::new());
}

struct FrameGuard {
    armed: bool,
}

impl FrameGuard {
    fn is_dirty(&self) -> bool {
        HOOK_FRAMES.with(|frames| frames.borrow().last().is_some_and(|frame| frame.dirty))
    }

    fn rewind(&self) {
        HOOK_FRAMES.with(|frames| {
            if let Some(frame) = frames.borrow_mut().last_mut() {
                frame.rewind();
            }
        });
    }

    fn finish(mut self) -> Vec<Rc<dyn HookSlot>> {
        self.armed = false;
        HOOK_FRAMES
            .with(|frames| frames.borrow_mut().pop())
            .map(|frame| frame.recorded)
            .unwrap_or_default()
    }
}

impl Drop for FrameGuard {
    fn drop(&mut self) {
        if self.armed {
            HOOK_FRAMES.with(|frames| {
                frames.borrow_mut().pop();
            });
        }
    }
}

/// Runs `render` with an active hook context for `fiber` and returns its
/// result together with the hook records it produced.
///
/// Updates a component queues on its own slots while rendering are folded in
/// by evaluating it again within the same pass, up to [`MAX_RENDER_RETRIES`]
/// times.
pub(crate) fn render_with_hooks<R>(
    fiber: FiberId,
    previous: Vec<Rc<dyn HookSlot>>,
    runtime: RuntimeHandle,
    mut render: impl FnMut() -> R,
) -> (R, Vec<Rc<dyn HookSlot>>) {
    HOOK_FRAMES.with(|frames| {
        frames.borrow_mut().push(HookFrame {
            fiber,
            previous,
            recorded: Vec::new(),
            cursor: 0,
            dirty: false,
            runtime,
        })
    });
    let guard = FrameGuard { armed: true };
    let mut result = render();
    let mut retries = 0;
    while guard.is_dirty() {
        if retries == MAX_RENDER_RETRIES {
            log::error!(
                "fiber {fiber:?} still updating its own state after {MAX_RENDER_RETRIES} re-renders; keeping the last result"
            );
            break;
        }
        guard.rewind();
        retries += 1;
        result = render();
    }
    (result, guard.finish())
}

pub(crate) fn is_rendering() -> bool {
    HOOK_FRAMES.with(|frames| !frames.borrow().is_empty())
}

/// Marks the frame being evaluated dirty when it owns `queue`.
fn claim_render_phase_update(queue: *const ()) -> bool {
    HOOK_FRAMES.with(|frames| {
        let Ok(mut frames) = frames.try_borrow_mut() else {
            return false;
        };
        match frames.last_mut() {
            Some(frame) if frame.owns(queue) => {
                frame.dirty = true;
                true
            }
            _ => false,
        }
    })
}

enum StateUpdate<T> {
    Replace(T),
    Apply(Rc<dyn Fn(&T) -> T>),
}

impl<T: Clone> Clone for StateUpdate<T> {
    fn clone(&self) -> Self {
        match self {
            StateUpdate::Replace(value) => StateUpdate::Replace(value.clone()),
            StateUpdate::Apply(transform) => StateUpdate::Apply(Rc::clone(transform)),
        }
    }
}

/// Updates enqueued for one hook slot, shared by every record of that slot.
///
/// Updates carry increasing sequence numbers. A record remembers the last
/// sequence it folded in; updates are dropped only after a committed record
/// has seen them, so a render pass that gets discarded loses nothing.
struct UpdateQueue<T> {
    next_seq: Cell<u64>,
    pending: RefCell<VecDeque<(u64, StateUpdate<T>)>>,
}

impl<T: Clone> UpdateQueue<T> {
    fn new() -> Self {
        Self {
            next_seq: Cell::new(1),
            pending: RefCell::new(VecDeque::new()),
        }
    }

    fn push(&self, update: StateUpdate<T>) {
        let seq = self.next_seq.get();
        self.next_seq.set(seq + 1);
        self.pending.borrow_mut().push_back((seq, update));
    }

    /// Folds every update newer than `seen` into `base`, in enqueue order.
    /// Updates queued by the transforms themselves are left for the next fold.
    fn resolve(&self, base: &T, seen: u64) -> (T, u64) {
        let newer: Vec<(u64, StateUpdate<T>)> = self
            .pending
            .borrow()
            .iter()
            .filter(|(seq, _)| *seq > seen)
            .cloned()
            .collect();
        let mut value = base.clone();
        let mut last = seen;
        for (seq, update) in newer {
            value = match update {
                StateUpdate::Replace(next) => next,
                StateUpdate::Apply(transform) => transform(&value),
            };
            last = seq;
        }
        (value, last)
    }

    fn acknowledge(&self, seen: u64) {
        self.pending.borrow_mut().retain(|(seq, _)| *seq > seen);
    }

    fn len(&self) -> usize {
        self.pending.borrow().len()
    }
}

struct StateHook<T> {
    value: T,
    seen: u64,
    queue: Rc<UpdateQueue<T>>,
}

impl<T: Clone + 'static> HookSlot for StateHook<T> {
    fn into_any(self: Rc<Self>) -> Rc<dyn Any> {
        self
    }

    fn queue_id(&self) -> *const () {
        Rc::as_ptr(&self.queue) as *const ()
    }

    fn commit(&self) {
        self.queue.acknowledge(self.seen);
    }
}

/// Handle returned by [`use_state`]. Every call queues an update on the slot
/// and requests a fresh render pass from the owning runtime, unless the
/// component owning the slot is rendering right now, in which case it is
/// evaluated again before the pass moves on.
pub struct StateSetter<T> {
    queue: Rc<UpdateQueue<T>>,
    runtime: RuntimeHandle,
}

impl<T> Clone for StateSetter<T> {
    fn clone(&self) -> Self {
        Self {
            queue: Rc::clone(&self.queue),
            runtime: self.runtime.clone(),
        }
    }
}

impl<T: Clone + 'static> StateSetter<T> {
    /// Replaces the state outright.
    pub fn set(&self, value: T) {
        self.enqueue(StateUpdate::Replace(value));
    }

    /// Derives the next state from the state accumulated so far.
    pub fn update(&self, transform: impl Fn(&T) -> T + 'static) {
        self.enqueue(StateUpdate::Apply(Rc::new(transform)));
    }

    /// Updates waiting to be observed by a committed render.
    pub fn pending_updates(&self) -> usize {
        self.queue.len()
    }

    fn enqueue(&self, update: StateUpdate<T>) {
        self.queue.push(update);
        if !claim_render_phase_update(Rc::as_ptr(&self.queue) as *const ()) {
            self.runtime.request_rerender();
        }
    }
}

impl<T> fmt::Debug for StateSetter<T> {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("StateSetter")
            .field("queue", &Rc::as_ptr(&self.queue))
            .finish()
    }
}

/// Returns the current state of the next hook slot and a setter for it.
///
/// # Panics
///
/// Panics when called outside of a component render. Use [`try_use_state`]
/// to get an error instead.
pub fn use_state<T: Clone + 'static>(initial: T) -> (T, StateSetter<T>) {
    match try_use_state(initial) {
        Ok(state) => state,
        Err(err) => panic!("{err}"),
    }
}

pub fn try_use_state<T: Clone + 'static>(initial: T) -> Result<(T, StateSetter<T>), HookError> {
    let (previous, runtime) = HOOK_FRAMES.with(|frames| {
        let mut frames = frames.borrow_mut();
        let frame = frames.last_mut().ok_or(HookError::OutsideComponent)?;
        let index = frame.cursor;
        frame.cursor += 1;

        let previous = frame.previous.get(index).cloned().and_then(|slot| {
            let typed = slot.into_any().downcast::<StateHook<T>>().ok();
            if typed.is_none() {
                log::warn!(
                    "hook {index} of fiber {:?} changed type between renders; resetting it",
                    frame.fiber
                );
            }
            typed
        });
        Ok::<_, HookError>((previous, frame.runtime.clone()))
    })?;

    // Transforms may call setters or hooks, so no frame is borrowed here.
    let record = match previous {
        Some(previous) => {
            let (value, seen) = previous.queue.resolve(&previous.value, previous.seen);
            StateHook {
                value,
                seen,
                queue: Rc::clone(&previous.queue),
            }
        }
        None => StateHook {
            value: initial,
            seen: 0,
            queue: Rc::new(UpdateQueue::new()),
        },
    };

    let value = record.value.clone();
    let setter = StateSetter {
        queue: Rc::clone(&record.queue),
        runtime,
    };
    HOOK_FRAMES.with(|frames| {
        if let Some(frame) = frames.borrow_mut().last_mut() {
            frame.recorded.push(Rc::new(record));
        }
    });
    Ok((value, setter))
}

#[cfg(test)]
mod tests {
    use super::*;
    use slotmap::KeyData;

    fn fiber() -> FiberId {
        FiberId::from(KeyData::from_ffi(1))
    }

    fn render<R>(
        previous: &[Rc<dyn HookSlot>],
        body: impl FnMut() -> R,
    ) -> (R, Vec<Rc<dyn HookSlot>>) {
        render_with_hooks(fiber(), previous.to_vec(), RuntimeHandle::detached(), body)
    }

    fn commit(records: &[Rc<dyn HookSlot>]) {
        for record in records {
            record.commit();
        }
    }

    #[test]
    fn outside_component_is_an_error() {
        assert_eq!(try_use_state(0).err(), Some(HookError::OutsideComponent));
        assert!(!is_rendering());
    }

    #[test]
    #[should_panic(expected = "outside of a component render")]
    fn use_state_outside_component_panics() {
        let _ = use_state(0);
    }

    #[test]
    fn first_render_uses_initial_values() {
        let ((a, b), records) = render(&[], || (use_state(1).0, use_state("x").0));
        assert_eq!((a, b), (1, "x"));
        assert_eq!(records.len(), 2);
    }

    #[test]
    fn slots_are_independent_and_keep_state() {
        let ((_, (_, set_b)), records) = render(&[], || (use_state(1), use_state(10)));
        set_b.set(20);

        let ((a, b), _) = render(&records, || (use_state(1).0, use_state(10).0));
        assert_eq!((a, b), (1, 20));
    }

    #[test]
    fn updates_apply_in_call_order() {
        let ((_, set), records) = render(&[], || use_state(1));
        set.update(|value| value + 1);
        set.set(10);
        set.update(|value| value * 3);

        let (value, _) = render(&records, || use_state(1).0);
        assert_eq!(value, 30);
    }

    #[test]
    fn discarded_render_keeps_updates() {
        let ((_, set), committed) = render(&[], || use_state(0));
        set.update(|value| value + 1);

        // A pass that observes the update but never commits.
        let (seen, _discarded) = render(&committed, || use_state(0).0);
        assert_eq!(seen, 1);

        let (value, records) = render(&committed, || use_state(0).0);
        assert_eq!(value, 1);
        commit(&records);
        assert_eq!(set.pending_updates(), 0);
    }

    #[test]
    fn stale_setters_still_deliver() {
        let ((_, first_setter), first) = render(&[], || use_state(0));
        commit(&first);
        let (_, second) = render(&first, || use_state(0).0);
        commit(&second);

        first_setter.update(|value| value + 5);

        let (value, _) = render(&second, || use_state(0).0);
        assert_eq!(value, 5);
    }

    #[test]
    fn changed_hook_type_resets_slot() {
        let (_, records) = render(&[], || use_state(3u8));
        let (value, _) = render(&records, || use_state(String::from("fresh")).0);
        assert_eq!(value, "fresh");
    }

    #[test]
    fn own_update_during_first_render_settles_in_place() {
        let evaluations = Cell::new(0);
        let ((value, set), records) = render(&[], || {
            evaluations.set(evaluations.get() + 1);
            let (n, set_n) = use_state(0);
            if n < 3 {
                set_n.set(n + 1);
            }
            (n, set_n)
        });
        assert_eq!(value, 3);
        assert_eq!(evaluations.get(), 4);
        assert_eq!(records.len(), 1);

        commit(&records);
        assert_eq!(set.pending_updates(), 0);
        let (again, _) = render(&records, || use_state(0).0);
        assert_eq!(again, 3);
    }

    #[test]
    fn endless_own_updates_stop_after_retry_limit() {
        let evaluations = Cell::new(0);
        let (value, records) = render(&[], || {
            evaluations.set(evaluations.get() + 1);
            let (n, set_n) = use_state(0usize);
            set_n.update(|n| n + 1);
            n
        });
        assert_eq!(evaluations.get(), MAX_RENDER_RETRIES + 1);
        assert_eq!(value, MAX_RENDER_RETRIES);
        assert_eq!(records.len(), 1);
        assert!(!is_rendering());
    }

    #[test]
    fn transform_may_call_its_own_setter() {
        let ((_, set), records) = render(&[], || use_state(0));
        commit(&records);

        let inner = set.clone();
        let fired = Cell::new(false);
        set.update(move |value| {
            if !fired.replace(true) {
                inner.set(100);
            }
            value + 1
        });

        let (value, next) = render(&records, || use_state(0).0);
        assert_eq!(value, 100);
        commit(&next);
        assert_eq!(set.pending_updates(), 0);
    }

    #[test]
    fn setter_of_another_component_does_not_dirty_the_frame() {
        let ((_, outside), _) = render(&[], || use_state(0));
        let evaluations = Cell::new(0);
        let (value, _) = render(&[], || {
            evaluations.set(evaluations.get() + 1);
            outside.set(7);
            use_state(1).0
        });
        assert_eq!((value, evaluations.get()), (1, 1));
        assert_eq!(outside.pending_updates(), 1);
    }

    #[test]
    fn frame_is_popped_after_panic() {
        let result = std::panic::catch_unwind(|| {
            render(&[], || -> () { panic!("component failed") });
        });
        assert!(result.is_err());
        assert!(!is_rendering());
    }
}
