#![doc = r"Core reconciler for a Fiber style UI engine: elements, fibers, hooks and the idle-time work loop."]

extern crate self as fiber_core;

mod collections;
pub mod commit;
pub mod diff;
pub mod element;
pub mod fiber;
pub mod hooks;
pub mod host;
pub mod platform;
mod reconciler;
pub mod runtime;

pub use commit::CommitStats;
pub use diff::{diff_props, event_name, is_listener_key, KeyDiff, PropsDiff};
pub use element::{
    create_element, create_text_element, Child, Component, Element, ElementKind, Event, Listener,
    PropValue, Props, CHILDREN, TEXT_ELEMENT, TEXT_VALUE,
};
pub use fiber::{EffectTag, Fiber, FiberId, FiberTree};
pub use hooks::{try_use_state, use_state, HookError, StateSetter};
pub use host::{HostAdapter, HostNode, HostOp, MemoryHost, NodeError, NodeId};
pub use platform::{
    IdleCallback, IdleCallbackId, IdleDeadline, IdleScheduler, ManualScheduler, StepDeadline,
};
pub use runtime::{Runtime, RuntimeConfig, RuntimeHandle, SliceStatus};
