//! Builds the work-in-progress tree one fiber at a time.

use std::rc::Rc;

use crate::diff::apply_props;
use crate::element::{Element, ElementKind, Props, TEXT_VALUE};
use crate::fiber::{EffectTag, Fiber, FiberId, FiberTree};
use crate::hooks::render_with_hooks;
use crate::host::{HostAdapter, NodeError, NodeId};
use crate::runtime::RuntimeHandle;

/// Processes one fiber and returns the next unit of work.
pub(crate) fn perform_unit_of_work<A: HostAdapter + ?Sized>(
    tree: &mut FiberTree,
    host: &mut A,
    runtime: &RuntimeHandle,
    id: FiberId,
) -> Result<Option<FiberId>, NodeError> {
    let Some(fiber) = tree.get(id) else {
        return Ok(None);
    };
    log::trace!("performing unit of work for <{}>", fiber.tag());
    if fiber.kind.is_component() {
        update_component(tree, runtime, id);
    } else {
        update_host(tree, host, id)?;
    }
    Ok(tree.next_unit(id))
}

fn update_component(tree: &mut FiberTree, runtime: &RuntimeHandle, id: FiberId) {
    let Some(fiber) = tree.get(id) else {
        return;
    };
    let ElementKind::Component(component) = fiber.kind.clone() else {
        return;
    };
    let props = Rc::clone(&fiber.props);
    let previous = fiber
        .alternate
        .and_then(|alternate| tree.get(alternate))
        .map(|alternate| alternate.hooks.clone())
        .unwrap_or_default();

    let (child, hooks) =
        render_with_hooks(id, previous, runtime.clone(), || component.render(&props));

    if let Some(fiber) = tree.get_mut(id) {
        fiber.hooks = hooks;
    }
    reconcile_children(tree, id, std::slice::from_ref(&child));
}

fn update_host<A: HostAdapter + ?Sized>(
    tree: &mut FiberTree,
    host: &mut A,
    id: FiberId,
) -> Result<(), NodeError> {
    let Some(fiber) = tree.get_mut(id) else {
        return Ok(());
    };
    if fiber.host_node.is_none() {
        fiber.host_node = create_host_node(host, &fiber.kind, &fiber.props)?;
    }
    let props = Rc::clone(&fiber.props);
    reconcile_children(tree, id, props.children());
    Ok(())
}

/// Creates the host node backing a fiber and applies its initial properties.
fn create_host_node<A: HostAdapter + ?Sized>(
    host: &mut A,
    kind: &ElementKind,
    props: &Props,
) -> Result<Option<NodeId>, NodeError> {
    match kind {
        ElementKind::Host(tag) => {
            let node = host.create_host_node(tag);
            apply_props(host, Some(node), &Props::default(), props)?;
            Ok(Some(node))
        }
        ElementKind::Text => {
            let value = props
                .get(TEXT_VALUE)
                .map(ToString::to_string)
                .unwrap_or_default();
            Ok(Some(host.create_text_node(&value)))
        }
        ElementKind::Component(_) => Ok(None),
    }
}

/// Diffs `elements` against the children of the fiber's alternate, position by
/// position, and links the resulting fibers under `wip`.
pub(crate) fn reconcile_children(tree: &mut FiberTree, wip: FiberId, elements: &[Element]) {
    let mut old = tree
        .get(wip)
        .and_then(|fiber| fiber.alternate)
        .and_then(|alternate| tree.get(alternate))
        .and_then(|alternate| alternate.child);
    let mut previous: Option<FiberId> = None;
    let mut index = 0;

    if let Some(fiber) = tree.get_mut(wip) {
        fiber.child = None;
    }

    while index < elements.len() || old.is_some() {
        let element = elements.get(index);
        let (same_kind, old_host_node, next_old) = match old.and_then(|id| tree.get(id)) {
            Some(old_fiber) => (
                element.is_some_and(|element| old_fiber.kind == *element.kind()),
                old_fiber.host_node,
                old_fiber.sibling,
            ),
            None => (false, None, None),
        };

        let successor = element.map(|element| {
            let mut fiber = Fiber::new(element.kind().clone(), element.shared_props());
            fiber.parent = Some(wip);
            if same_kind {
                fiber.host_node = old_host_node;
                fiber.alternate = old;
                fiber.effect = Some(EffectTag::Update);
            } else {
                fiber.effect = Some(EffectTag::Add);
            }
            tree.insert(fiber)
        });

        if !same_kind {
            if let Some(old_id) = old {
                tree.mark_removed(old_id);
            }
        }
        old = next_old;

        if index == 0 {
            if let Some(fiber) = tree.get_mut(wip) {
                fiber.child = successor;
            }
        } else if let Some(prev) = previous.and_then(|id| tree.get_mut(id)) {
            prev.sibling = successor;
        }
        if successor.is_some() {
            previous = successor;
        }
        index += 1;
    }
}
