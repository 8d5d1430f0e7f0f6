//! Property and listener diffing between two renders of the same host node.

use std::rc::Rc;

use indexmap::IndexMap;

use crate::element::{PropValue, Props};
use crate::host::{HostAdapter, NodeError, NodeId};

const LISTENER_PREFIX: &str = "on";

#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct KeyDiff {
    pub removed: Vec<Rc<str>>,
    pub added: Vec<Rc<str>>,
}

impl KeyDiff {
    pub fn is_empty(&self) -> bool {
        self.removed.is_empty() && self.added.is_empty()
    }
}

/// Changes between two property bags, split into listeners and attributes.
#[derive(Debug, Default, Clone, PartialEq, Eq)]
pub struct PropsDiff {
    pub listeners: KeyDiff,
    pub attributes: KeyDiff,
}

impl PropsDiff {
    pub fn is_empty(&self) -> bool {
        self.listeners.is_empty() && self.attributes.is_empty()
    }
}

/// `onClick`, `onInput`, ... A bare `on` is not a listener key.
pub fn is_listener_key(name: &str) -> bool {
    name.len() > LISTENER_PREFIX.len() && name.starts_with(LISTENER_PREFIX)
}

/// `onClick` -> `click`.
pub fn event_name(name: &str) -> String {
    name.strip_prefix(LISTENER_PREFIX)
        .unwrap_or(name)
        .to_lowercase()
}

type Partition<'a> = IndexMap<&'a str, &'a PropValue>;

/// Splits a bag into listener and attribute entries. Entries whose value does
/// not fit their key (a handler under a plain name or a plain value under an
/// `on*` name) belong to neither and are ignored.
fn partition(props: &Props) -> (Partition<'_>, Partition<'_>) {
    let mut listeners = Partition::new();
    let mut attributes = Partition::new();
    for (name, value) in props.iter() {
        match (is_listener_key(name), value) {
            (true, PropValue::Listener(_)) => {
                listeners.insert(name, value);
            }
            (false, PropValue::Listener(_)) | (true, _) => {
                log::trace!("ignoring property `{name}` of unrecognized shape");
            }
            (false, _) => {
                attributes.insert(name, value);
            }
        }
    }
    (listeners, attributes)
}

fn changed(before: &Partition<'_>, name: &str, value: &PropValue) -> bool {
    before.get(name).map_or(true, |previous| *previous != value)
}

pub fn diff_props(prev: &Props, next: &Props) -> PropsDiff {
    let (prev_listeners, prev_attributes) = partition(prev);
    let (next_listeners, next_attributes) = partition(next);

    let listeners = KeyDiff {
        removed: prev_listeners
            .iter()
            .filter(|(name, value)| changed(&next_listeners, name, value))
            .map(|(name, _)| Rc::from(*name))
            .collect(),
        added: next_listeners
            .iter()
            .filter(|(name, value)| changed(&prev_listeners, name, value))
            .map(|(name, _)| Rc::from(*name))
            .collect(),
    };
    let attributes = KeyDiff {
        removed: prev_attributes
            .keys()
            .filter(|name| !next_attributes.contains_key(*name))
            .map(|name| Rc::from(*name))
            .collect(),
        added: next_attributes
            .iter()
            .filter(|(name, value)| changed(&prev_attributes, name, value))
            .map(|(name, _)| Rc::from(*name))
            .collect(),
    };
    PropsDiff {
        listeners,
        attributes,
    }
}

/// Applies the diff between `prev` and `next` to a host node. A node that has
/// not been created yet is left alone.
pub(crate) fn apply_props<A: HostAdapter + ?Sized>(
    host: &mut A,
    node: Option<NodeId>,
    prev: &Props,
    next: &Props,
) -> Result<(), NodeError> {
    let Some(node) = node else {
        return Ok(());
    };
    let diff = diff_props(prev, next);

    for name in &diff.listeners.removed {
        if let Some(handler) = prev.get(name).and_then(PropValue::as_listener) {
            host.remove_event_listener(node, &event_name(name), handler)?;
        }
    }
    for name in &diff.listeners.added {
        if let Some(handler) = next.get(name).and_then(PropValue::as_listener) {
            host.add_event_listener(node, &event_name(name), handler)?;
        }
    }
    for name in &diff.attributes.removed {
        host.remove_property(node, name)?;
    }
    for name in &diff.attributes.added {
        if let Some(value) = next.get(name) {
            host.set_property(node, name, value)?;
        }
    }
    Ok(())
}
