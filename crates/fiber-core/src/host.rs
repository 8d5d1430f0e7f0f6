//! Host adapter contract and the in-memory reference host.

use std::fmt;

use indexmap::IndexMap;

use crate::element::{Event, Listener, PropValue, TEXT_VALUE};

pub type NodeId = usize;

#[derive(Debug, Clone, PartialEq, Eq)]
pub enum NodeError {
    Missing { id: NodeId },
    NotAttached { parent: NodeId, child: NodeId },
}

impl fmt::Display for NodeError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            NodeError::Missing { id } => write!(f, "node {id} missing"),
            NodeError::NotAttached { parent, child } => {
                write!(f, "node {child} is not a child of node {parent}")
            }
        }
    }
}

impl std::error::Error for NodeError {}

/// Operations the reconciler needs from the rendering target.
///
/// Node creation never fails; every operation addressing an existing node
/// reports a [`NodeError`] when the handle is unknown.
pub trait HostAdapter {
    fn create_host_node(&mut self, tag: &str) -> NodeId;
    fn create_text_node(&mut self, value: &str) -> NodeId;
    fn append_child(&mut self, parent: NodeId, child: NodeId) -> Result<(), NodeError>;
    fn remove_child(&mut self, parent: NodeId, child: NodeId) -> Result<(), NodeError>;
    fn set_property(&mut self, node: NodeId, name: &str, value: &PropValue)
        -> Result<(), NodeError>;
    fn remove_property(&mut self, node: NodeId, name: &str) -> Result<(), NodeError>;
    fn add_event_listener(
        &mut self,
        node: NodeId,
        event: &str,
        handler: &Listener,
    ) -> Result<(), NodeError>;
    fn remove_event_listener(
        &mut self,
        node: NodeId,
        event: &str,
        handler: &Listener,
    ) -> Result<(), NodeError>;
}

/// One call received by a [`MemoryHost`], in arrival order.
#[derive(Debug, Clone, PartialEq)]
pub enum HostOp {
    CreateNode { id: NodeId, tag: String },
    CreateText { id: NodeId, value: String },
    AppendChild { parent: NodeId, child: NodeId },
    RemoveChild { parent: NodeId, child: NodeId },
    SetProperty { node: NodeId, name: String, value: PropValue },
    RemoveProperty { node: NodeId, name: String },
    AddListener { node: NodeId, event: String },
    RemoveListener { node: NodeId, event: String },
}

impl HostOp {
    pub fn is_mutation(&self) -> bool {
        !matches!(self, HostOp::CreateNode { .. } | HostOp::CreateText { .. })
    }
}

#[derive(Debug, Clone)]
pub struct HostNode {
    tag: String,
    text: Option<String>,
    properties: IndexMap<String, PropValue>,
    listeners: Vec<(String, Listener)>,
    children: Vec<NodeId>,
    parent: Option<NodeId>,
}

impl HostNode {
    fn element(tag: &str) -> Self {
        Self {
            tag: tag.to_owned(),
            text: None,
            properties: IndexMap::new(),
            listeners: Vec::new(),
            children: Vec::new(),
            parent: None,
        }
    }

    fn text(value: &str) -> Self {
        Self {
            text: Some(value.to_owned()),
            ..Self::element("#text")
        }
    }

    pub fn tag(&self) -> &str {
        &self.tag
    }

    pub fn text_value(&self) -> Option<&str> {
        self.text.as_deref()
    }

    pub fn property(&self, name: &str) -> Option<&PropValue> {
        self.properties.get(name)
    }

    pub fn properties(&self) -> impl Iterator<Item = (&str, &PropValue)> {
        self.properties.iter().map(|(name, value)| (name.as_str(), value))
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn listener_count(&self) -> usize {
        self.listeners.len()
    }
}

/// Host tree kept entirely in memory.
///
/// Records every adapter call in an operation log so tests can assert on the
/// exact mutations a commit produced.
#[derive(Default)]
pub struct MemoryHost {
    nodes: Vec<HostNode>,
    ops: Vec<HostOp>,
}

impl MemoryHost {
    pub fn new() -> Self {
        Self::default()
    }

    /// Creates a detached element to serve as the render target.
    ///
    /// Unlike [`HostAdapter::create_host_node`] the call is not logged.
    pub fn create_root(&mut self, tag: &str) -> NodeId {
        self.nodes.push(HostNode::element(tag));
        self.nodes.len() - 1
    }

    pub fn node(&self, id: NodeId) -> Option<&HostNode> {
        self.nodes.get(id)
    }

    pub fn children(&self, id: NodeId) -> &[NodeId] {
        self.nodes
            .get(id)
            .map(|node| node.children.as_slice())
            .unwrap_or(&[])
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn ops(&self) -> &[HostOp] {
        &self.ops
    }

    pub fn take_ops(&mut self) -> Vec<HostOp> {
        std::mem::take(&mut self.ops)
    }

    /// Handlers registered on `node` for `event`, cloned so they can be
    /// invoked without holding a borrow of the host.
    pub fn listeners(&self, node: NodeId, event: &str) -> Vec<Listener> {
        self.nodes
            .get(node)
            .map(|node| {
                node.listeners
                    .iter()
                    .filter(|(name, _)| name == event)
                    .map(|(_, handler)| handler.clone())
                    .collect()
            })
            .unwrap_or_default()
    }

    /// Invokes every handler registered for the event. Returns how many ran.
    pub fn dispatch(&self, node: NodeId, event: &Event) -> usize {
        let handlers = self.listeners(node, event.name());
        for handler in &handlers {
            handler.call(event);
        }
        handlers.len()
    }

    /// Depth-first search for the first node with the given tag.
    pub fn find_by_tag(&self, root: NodeId, tag: &str) -> Option<NodeId> {
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            let node = self.nodes.get(id)?;
            if node.tag == tag {
                return Some(id);
            }
            stack.extend(node.children.iter().rev().copied());
        }
        None
    }

    pub fn dump_tree(&self, root: Option<NodeId>) -> String {
        let mut output = String::new();
        if let Some(root_id) = root {
            self.dump_node(&mut output, root_id, 0);
        } else {
            output.push_str("(no root)\n");
        }
        output
    }

    fn dump_node(&self, output: &mut String, id: NodeId, depth: usize) {
        let indent = "  ".repeat(depth);
        match self.nodes.get(id) {
            Some(node) => {
                match &node.text {
                    Some(text) => output.push_str(&format!("{indent}[{id}] {text:?}")),
                    None => output.push_str(&format!("{indent}[{id}] <{}>", node.tag)),
                }
                for (name, value) in &node.properties {
                    if node.text.is_none() {
                        output.push_str(&format!(" {name}={value}"));
                    }
                }
                output.push('\n');
                for &child in &node.children {
                    self.dump_node(output, child, depth + 1);
                }
            }
            None => output.push_str(&format!("{indent}[{id}] (missing)\n")),
        }
    }

    fn node_mut(&mut self, id: NodeId) -> Result<&mut HostNode, NodeError> {
        self.nodes.get_mut(id).ok_or(NodeError::Missing { id })
    }

    fn detach(&mut self, child: NodeId) -> Result<(), NodeError> {
        if let Some(parent) = self.node_mut(child)?.parent.take() {
            self.node_mut(parent)?.children.retain(|&id| id != child);
        }
        Ok(())
    }
}

impl HostAdapter for MemoryHost {
    fn create_host_node(&mut self, tag: &str) -> NodeId {
        let id = self.create_root(tag);
        self.ops.push(HostOp::CreateNode {
            id,
            tag: tag.to_owned(),
        });
        id
    }

    fn create_text_node(&mut self, value: &str) -> NodeId {
        self.nodes.push(HostNode::text(value));
        let id = self.nodes.len() - 1;
        self.ops.push(HostOp::CreateText {
            id,
            value: value.to_owned(),
        });
        id
    }

    fn append_child(&mut self, parent: NodeId, child: NodeId) -> Result<(), NodeError> {
        self.node_mut(parent)?;
        self.detach(child)?;
        self.node_mut(child)?.parent = Some(parent);
        self.node_mut(parent)?.children.push(child);
        self.ops.push(HostOp::AppendChild { parent, child });
        Ok(())
    }

    fn remove_child(&mut self, parent: NodeId, child: NodeId) -> Result<(), NodeError> {
        self.node_mut(child)?;
        let siblings = &mut self.node_mut(parent)?.children;
        let Some(index) = siblings.iter().position(|&id| id == child) else {
            return Err(NodeError::NotAttached { parent, child });
        };
        siblings.remove(index);
        self.node_mut(child)?.parent = None;
        self.ops.push(HostOp::RemoveChild { parent, child });
        Ok(())
    }

    fn set_property(
        &mut self,
        node: NodeId,
        name: &str,
        value: &PropValue,
    ) -> Result<(), NodeError> {
        let target = self.node_mut(node)?;
        if target.text.is_some() && name == TEXT_VALUE {
            target.text = Some(value.to_string());
        } else {
            target.properties.insert(name.to_owned(), value.clone());
        }
        self.ops.push(HostOp::SetProperty {
            node,
            name: name.to_owned(),
            value: value.clone(),
        });
        Ok(())
    }

    fn remove_property(&mut self, node: NodeId, name: &str) -> Result<(), NodeError> {
        self.node_mut(node)?.properties.shift_remove(name);
        self.ops.push(HostOp::RemoveProperty {
            node,
            name: name.to_owned(),
        });
        Ok(())
    }

    fn add_event_listener(
        &mut self,
        node: NodeId,
        event: &str,
        handler: &Listener,
    ) -> Result<(), NodeError> {
        self.node_mut(node)?
            .listeners
            .push((event.to_owned(), handler.clone()));
        self.ops.push(HostOp::AddListener {
            node,
            event: event.to_owned(),
        });
        Ok(())
    }

    fn remove_event_listener(
        &mut self,
        node: NodeId,
        event: &str,
        handler: &Listener,
    ) -> Result<(), NodeError> {
        self.node_mut(node)?
            .listeners
            .retain(|(name, registered)| !(name == event && registered == handler));
        self.ops.push(HostOp::RemoveListener {
            node,
            event: event.to_owned(),
        });
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn append_moves_node_between_parents() {
        let mut host = MemoryHost::new();
        let a = host.create_root("a");
        let b = host.create_root("b");
        let child = host.create_host_node("span");

        host.append_child(a, child).unwrap();
        host.append_child(b, child).unwrap();

        assert!(host.children(a).is_empty());
        assert_eq!(host.children(b), &[child]);
        assert_eq!(host.node(child).unwrap().parent(), Some(b));
    }

    #[test]
    fn remove_requires_attachment() {
        let mut host = MemoryHost::new();
        let root = host.create_root("root");
        let orphan = host.create_text_node("x");

        assert_eq!(
            host.remove_child(root, orphan),
            Err(NodeError::NotAttached {
                parent: root,
                child: orphan
            })
        );
        assert_eq!(
            host.append_child(root, 42),
            Err(NodeError::Missing { id: 42 })
        );
    }

    #[test]
    fn text_nodes_update_their_value() {
        let mut host = MemoryHost::new();
        let text = host.create_text_node("before");
        host.set_property(text, TEXT_VALUE, &PropValue::from("after"))
            .unwrap();
        assert_eq!(host.node(text).unwrap().text_value(), Some("after"));
        assert!(host.node(text).unwrap().property(TEXT_VALUE).is_none());
    }

    #[test]
    fn dispatch_reaches_registered_handlers_only() {
        use std::cell::Cell;
        use std::rc::Rc;

        let mut host = MemoryHost::new();
        let button = host.create_host_node("button");
        let clicks = Rc::new(Cell::new(0));
        let handler = {
            let clicks = Rc::clone(&clicks);
            Listener::new(move |_| clicks.set(clicks.get() + 1))
        };
        host.add_event_listener(button, "click", &handler).unwrap();

        assert_eq!(host.dispatch(button, &Event::new("click")), 1);
        assert_eq!(host.dispatch(button, &Event::new("input")), 0);

        host.remove_event_listener(button, "click", &handler)
            .unwrap();
        assert_eq!(host.dispatch(button, &Event::new("click")), 0);
        assert_eq!(clicks.get(), 1);
    }
}
