//! Fiber records and the arena that owns them.
//!
//! Structural links (`parent`, `child`, `sibling`) and the cross-buffer
//! `alternate` link are plain [`FiberId`] handles. A handle into a fiber that
//! has since been collected simply resolves to `None`.

use std::rc::Rc;

use slotmap::{new_key_type, SlotMap};

use crate::collections::map::HashSet;
use crate::element::{ElementKind, Props};
use crate::hooks::HookSlot;
use crate::host::NodeId;

new_key_type! {
    pub struct FiberId;
}

#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum EffectTag {
    Add,
    Update,
    Remove,
}

pub struct Fiber {
    pub(crate) kind: ElementKind,
    pub(crate) props: Rc<Props>,
    pub(crate) host_node: Option<NodeId>,
    pub(crate) parent: Option<FiberId>,
    pub(crate) child: Option<FiberId>,
    pub(crate) sibling: Option<FiberId>,
    pub(crate) alternate: Option<FiberId>,
    pub(crate) effect: Option<EffectTag>,
    pub(crate) hooks: Vec<Rc<dyn HookSlot>>,
}

impl Fiber {
    pub(crate) fn new(kind: ElementKind, props: Rc<Props>) -> Self {
        Self {
            kind,
            props,
            host_node: None,
            parent: None,
            child: None,
            sibling: None,
            alternate: None,
            effect: None,
            hooks: Vec::new(),
        }
    }

    pub fn kind(&self) -> &ElementKind {
        &self.kind
    }

    pub fn tag(&self) -> &str {
        self.kind.tag()
    }

    pub fn props(&self) -> &Props {
        &self.props
    }

    pub fn host_node(&self) -> Option<NodeId> {
        self.host_node
    }

    pub fn parent(&self) -> Option<FiberId> {
        self.parent
    }

    pub fn child(&self) -> Option<FiberId> {
        self.child
    }

    pub fn sibling(&self) -> Option<FiberId> {
        self.sibling
    }

    pub fn alternate(&self) -> Option<FiberId> {
        self.alternate
    }

    pub fn effect(&self) -> Option<EffectTag> {
        self.effect
    }

    pub fn hook_count(&self) -> usize {
        self.hooks.len()
    }
}

/// Arena holding every live fiber of both buffers plus the deletion list of
/// the pass in progress.
#[derive(Default)]
pub struct FiberTree {
    fibers: SlotMap<FiberId, Fiber>,
    deletions: Vec<FiberId>,
    /// Tags carried by the entries of `deletions` before they were marked.
    displaced: Vec<Option<EffectTag>>,
}

impl FiberTree {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn get(&self, id: FiberId) -> Option<&Fiber> {
        self.fibers.get(id)
    }

    pub(crate) fn get_mut(&mut self, id: FiberId) -> Option<&mut Fiber> {
        self.fibers.get_mut(id)
    }

    pub(crate) fn insert(&mut self, fiber: Fiber) -> FiberId {
        self.fibers.insert(fiber)
    }

    pub fn len(&self) -> usize {
        self.fibers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.fibers.is_empty()
    }

    pub fn contains(&self, id: FiberId) -> bool {
        self.fibers.contains_key(id)
    }

    pub fn deletions(&self) -> &[FiberId] {
        &self.deletions
    }

    /// Tags a committed fiber for removal and queues it for the commit.
    pub(crate) fn mark_removed(&mut self, id: FiberId) {
        if let Some(fiber) = self.fibers.get_mut(id) {
            self.displaced.push(fiber.effect.replace(EffectTag::Remove));
            self.deletions.push(id);
        }
    }

    /// Forgets the deletion list once the commit has applied it.
    pub(crate) fn settle_deletions(&mut self) {
        self.deletions.clear();
        self.displaced.clear();
    }

    /// Drops the deletion list of an abandoned pass. Queued fibers get back
    /// the tag they had before being marked.
    pub(crate) fn abandon_deletions(&mut self) {
        for (id, effect) in self.deletions.drain(..).zip(self.displaced.drain(..)) {
            if let Some(fiber) = self.fibers.get_mut(id) {
                fiber.effect = effect;
            }
        }
    }

    /// Direct children of `id` in sibling order.
    pub fn children(&self, id: FiberId) -> impl Iterator<Item = FiberId> + '_ {
        let first = self.get(id).and_then(|fiber| fiber.child);
        std::iter::successors(first, move |&current| {
            self.get(current).and_then(|fiber| fiber.sibling)
        })
    }

    /// `root` followed by all of its descendants in pre-order. Siblings of
    /// `root` itself are not visited.
    pub fn descendants(&self, root: FiberId) -> Vec<FiberId> {
        let mut order = Vec::new();
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            if !self.contains(id) {
                continue;
            }
            order.push(id);
            let children: Vec<FiberId> = self.children(id).collect();
            stack.extend(children.into_iter().rev());
        }
        order
    }

    /// Next unit of work after `id`: its child, otherwise the sibling of the
    /// nearest ancestor (or itself) that has one.
    pub(crate) fn next_unit(&self, id: FiberId) -> Option<FiberId> {
        let fiber = self.get(id)?;
        if fiber.child.is_some() {
            return fiber.child;
        }
        let mut current = Some(id);
        while let Some(fiber) = current.and_then(|id| self.get(id)) {
            if fiber.sibling.is_some() {
                return fiber.sibling;
            }
            current = fiber.parent;
        }
        None
    }

    /// Host node of the nearest ancestor that owns one. Components own none
    /// and are skipped.
    pub(crate) fn host_parent(&self, id: FiberId) -> Option<NodeId> {
        let mut current = self.get(id)?.parent;
        while let Some(fiber) = current.and_then(|id| self.get(id)) {
            if let Some(node) = fiber.host_node {
                return Some(node);
            }
            current = fiber.parent;
        }
        None
    }

    /// Host nodes directly below `id`: its own node, or for a component the
    /// nearest node-owning descendants along every branch.
    pub(crate) fn nearest_host_nodes(&self, id: FiberId) -> Vec<NodeId> {
        let mut nodes = Vec::new();
        let mut stack = vec![id];
        while let Some(current) = stack.pop() {
            let Some(fiber) = self.get(current) else {
                continue;
            };
            match fiber.host_node {
                Some(node) => nodes.push(node),
                None => {
                    let children: Vec<FiberId> = self.children(current).collect();
                    stack.extend(children.into_iter().rev());
                }
            }
        }
        nodes
    }

    /// Drops every fiber not reachable from `root` through child and sibling
    /// links. With no root the arena is emptied.
    pub(crate) fn retain_reachable(&mut self, root: Option<FiberId>) {
        let live: HashSet<FiberId> = root
            .map(|root| self.descendants(root).into_iter().collect())
            .unwrap_or_default();
        let before = self.fibers.len();
        self.fibers.retain(|id, _| live.contains(&id));
        log::trace!("collected {} fibers", before - self.fibers.len());
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::element::ElementKind;

    fn host(tree: &mut FiberTree, tag: &str, parent: Option<FiberId>) -> FiberId {
        let mut fiber = Fiber::new(ElementKind::from(tag), Rc::new(Props::new()));
        fiber.parent = parent;
        let id = tree.insert(fiber);
        if let Some(parent) = parent {
            let last = tree.children(parent).last();
            match last {
                Some(last) => tree.get_mut(last).unwrap().sibling = Some(id),
                None => tree.get_mut(parent).unwrap().child = Some(id),
            }
        }
        id
    }

    #[test]
    fn abandoned_deletions_restore_previous_tags() {
        let mut tree = FiberTree::new();
        let root = host(&mut tree, "root", None);
        let kept = host(&mut tree, "kept", Some(root));
        let fresh = host(&mut tree, "fresh", Some(root));
        tree.get_mut(kept).unwrap().effect = Some(EffectTag::Update);

        tree.mark_removed(kept);
        tree.mark_removed(fresh);
        assert_eq!(tree.deletions(), &[kept, fresh]);
        assert_eq!(tree.get(kept).unwrap().effect(), Some(EffectTag::Remove));

        tree.abandon_deletions();
        assert!(tree.deletions().is_empty());
        assert_eq!(tree.get(kept).unwrap().effect(), Some(EffectTag::Update));
        assert_eq!(tree.get(fresh).unwrap().effect(), None);

        tree.mark_removed(kept);
        tree.settle_deletions();
        assert!(tree.deletions().is_empty());
        assert_eq!(tree.get(kept).unwrap().effect(), Some(EffectTag::Remove));
    }

    #[test]
    fn traversal_is_depth_first_then_siblings_then_up() {
        let mut tree = FiberTree::new();
        let root = host(&mut tree, "root", None);
        let a = host(&mut tree, "a", Some(root));
        let a1 = host(&mut tree, "a1", Some(a));
        let b = host(&mut tree, "b", Some(root));

        assert_eq!(tree.next_unit(root), Some(a));
        assert_eq!(tree.next_unit(a), Some(a1));
        assert_eq!(tree.next_unit(a1), Some(b));
        assert_eq!(tree.next_unit(b), None);
        assert_eq!(tree.descendants(root), vec![root, a, a1, b]);
    }

    #[test]
    fn host_parent_skips_nodes_without_host_node() {
        let mut tree = FiberTree::new();
        let root = host(&mut tree, "root", None);
        tree.get_mut(root).unwrap().host_node = Some(7);
        let middle = host(&mut tree, "middle", Some(root));
        let leaf = host(&mut tree, "leaf", Some(middle));

        assert_eq!(tree.host_parent(leaf), Some(7));
        assert_eq!(tree.host_parent(root), None);
    }

    #[test]
    fn retain_reachable_collects_detached_fibers() {
        let mut tree = FiberTree::new();
        let root = host(&mut tree, "root", None);
        let child = host(&mut tree, "child", Some(root));
        let stray = host(&mut tree, "stray", None);

        tree.retain_reachable(Some(root));

        assert!(tree.contains(root));
        assert!(tree.contains(child));
        assert!(!tree.contains(stray));

        tree.retain_reachable(None);
        assert!(tree.is_empty());
    }
}
