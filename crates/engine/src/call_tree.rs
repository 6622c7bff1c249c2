//! Call tree of an outer transaction and its nested transactions
//!
//! Every outer transaction attempt builds a fresh tree: the root stands for
//! the outer transaction and each nested transaction adds a child under the
//! transaction that started it. Nested transactions that roll back or fail
//! are detached again, so their committed callbacks never fire.
//!
//! The tree is an arena: nodes are addressed by [`NodeId`] and detached nodes
//! stay allocated but unreachable from the root.

/// Index of a node in a [`CallTree`]
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub(crate) struct NodeId(usize);

#[derive(Debug)]
struct Node<T> {
    value: T,
    parent: Option<NodeId>,
    children: Vec<NodeId>,
}

/// Arena-allocated tree recording parent/child relations between transactions
#[derive(Debug)]
pub(crate) struct CallTree<T> {
    nodes: Vec<Node<T>>,
}

impl<T> CallTree<T> {
    /// Create a tree holding only the root
    pub(crate) fn new(root: T) -> Self {
        CallTree {
            nodes: vec![Node {
                value: root,
                parent: None,
                children: Vec::new(),
            }],
        }
    }

    pub(crate) fn root(&self) -> NodeId {
        NodeId(0)
    }

    /// Append a child as the last child of `parent`
    pub(crate) fn add_child(&mut self, parent: NodeId, value: T) -> NodeId {
        let id = NodeId(self.nodes.len());
        self.nodes.push(Node {
            value,
            parent: Some(parent),
            children: Vec::new(),
        });
        self.nodes[parent.0].children.push(id);
        id
    }

    /// Detach the most recently added child of `parent`
    pub(crate) fn remove_last_child(&mut self, parent: NodeId) -> Option<NodeId> {
        let child = self.nodes[parent.0].children.pop()?;
        self.nodes[child.0].parent = None;
        Some(child)
    }

    pub(crate) fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.nodes[id.0].parent
    }

    pub(crate) fn children(&self, id: NodeId) -> &[NodeId] {
        &self.nodes[id.0].children
    }

    pub(crate) fn value_mut(&mut self, id: NodeId) -> &mut T {
        &mut self.nodes[id.0].value
    }

    /// Nodes reachable from the root, children before their parent
    ///
    /// Siblings are visited in the order they were added.
    pub(crate) fn postorder(&self) -> Vec<NodeId> {
        let mut order = Vec::with_capacity(self.nodes.len());
        // (node, index of the next child to visit)
        let mut stack = vec![(self.root(), 0usize)];
        while let Some((id, next)) = stack.pop() {
            let children = self.children(id);
            if next < children.len() {
                stack.push((id, next + 1));
                stack.push((children[next], 0));
            } else {
                order.push(id);
            }
        }
        order
    }
}
