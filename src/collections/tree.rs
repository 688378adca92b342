//! Arena-backed ordered tree.
//!
//! A [`Tree`] owns any number of nodes, each addressed by a [`NodeId`]. A node
//! starts out as a root and is attached under another node with
//! [`as_first_child`](Tree::as_first_child), [`as_last_child`](Tree::as_last_child),
//! [`as_sibling_before`](Tree::as_sibling_before) or
//! [`as_sibling_after`](Tree::as_sibling_after). Attaching a node first
//! detaches it from its current parent, taking its subtree along.
//!
//! Children are kept in a sibling chain whose first node's `previous` link
//! points at the last child, so both ends are reachable in O(1).

use std::fmt;
use std::iter::FusedIterator;
use std::ops::{Index, IndexMut};

use thiserror::Error;

/// Opaque handle to a node of a [`Tree`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct NodeId(usize);

impl fmt::Display for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "node#{}", self.0)
    }
}

/// Errors produced by tree restructuring.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Error)]
pub enum TreeError {
    #[error("{0} is not in the tree")]
    InvalidNode(NodeId),

    #[error("{0} has no parent to attach a sibling to")]
    NoParent(NodeId),

    #[error("{parent} is {node} or one of its descendants")]
    Cycle { node: NodeId, parent: NodeId },
}

#[derive(Debug, Clone)]
struct Node<T> {
    value: T,
    parent: Option<NodeId>,
    first_child: Option<NodeId>,
    /// For a first child this is the last child of the same parent.
    prev_sibling: Option<NodeId>,
    next_sibling: Option<NodeId>,
}

/// A forest of ordered trees stored in one arena.
///
/// # Examples
///
/// ```
/// use slotqueue::collections::Tree;
///
/// let mut tree = Tree::new();
/// let scene = tree.insert("scene");
/// let camera = tree.insert("camera");
/// let light = tree.insert("light");
///
/// tree.as_last_child(light, scene).unwrap();
/// tree.as_first_child(camera, scene).unwrap();
///
/// let names: Vec<_> = tree.children(scene).map(|id| tree[id]).collect();
/// assert_eq!(names, ["camera", "light"]);
/// assert_eq!(tree.depth(light), 1);
/// assert_eq!(tree.root(light), scene);
/// ```
#[derive(Debug, Clone)]
pub struct Tree<T> {
    nodes: Vec<Option<Node<T>>>,
    free: Vec<NodeId>,
    len: usize,
}

impl<T> Tree<T> {
    pub fn new() -> Self {
        Self::with_capacity(0)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        Self {
            nodes: Vec::with_capacity(capacity),
            free: Vec::new(),
            len: 0,
        }
    }

    /// Adds a detached root node.
    pub fn insert(&mut self, value: T) -> NodeId {
        let node = Some(Node {
            value,
            parent: None,
            first_child: None,
            prev_sibling: None,
            next_sibling: None,
        });
        self.len += 1;
        match self.free.pop() {
            Some(id) => {
                self.nodes[id.0] = node;
                id
            }
            None => {
                self.nodes.push(node);
                NodeId(self.nodes.len() - 1)
            }
        }
    }

    /// Removes a node and returns its value. Its children become roots.
    ///
    /// # Errors
    ///
    /// [`TreeError::InvalidNode`] if `id` is not in the tree.
    pub fn remove(&mut self, id: NodeId) -> Result<T, TreeError> {
        self.detach_parent(id)?;
        self.detach_children(id)?;
        let node = self
            .nodes
            .get_mut(id.0)
            .and_then(Option::take)
            .ok_or(TreeError::InvalidNode(id))?;
        self.free.push(id);
        self.len -= 1;
        Ok(node.value)
    }

    pub fn len(&self) -> usize {
        self.len
    }

    pub fn is_empty(&self) -> bool {
        self.len == 0
    }

    pub fn contains(&self, id: NodeId) -> bool {
        self.node(id).is_ok()
    }

    pub fn get(&self, id: NodeId) -> Option<&T> {
        self.node(id).ok().map(|node| &node.value)
    }

    pub fn get_mut(&mut self, id: NodeId) -> Option<&mut T> {
        self.node_mut(id).ok().map(|node| &mut node.value)
    }

    pub fn parent(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).ok().and_then(|node| node.parent)
    }

    pub fn first_child(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).ok().and_then(|node| node.first_child)
    }

    pub fn last_child(&self, id: NodeId) -> Option<NodeId> {
        self.first_child(id)
            .and_then(|first| self.node(first).ok())
            .and_then(|first| first.prev_sibling)
    }

    pub fn next_sibling(&self, id: NodeId) -> Option<NodeId> {
        self.node(id).ok().and_then(|node| node.next_sibling)
    }

    /// The sibling before `id`, or `None` for a first child or a root.
    pub fn previous_sibling(&self, id: NodeId) -> Option<NodeId> {
        let node = self.node(id).ok()?;
        let parent = node.parent?;
        if self.first_child(parent) == Some(id) {
            None
        } else {
            node.prev_sibling
        }
    }

    pub fn is_root(&self, id: NodeId) -> bool {
        self.parent(id).is_none()
    }

    pub fn is_leaf(&self, id: NodeId) -> bool {
        self.first_child(id).is_none()
    }

    /// Number of children. O(children).
    pub fn child_count(&self, id: NodeId) -> usize {
        self.children(id).count()
    }

    /// Distance to the root; a root has depth zero. O(depth).
    pub fn depth(&self, id: NodeId) -> usize {
        self.ancestors(id).count().saturating_sub(1)
    }

    /// The root of the tree `id` belongs to. O(depth).
    pub fn root(&self, id: NodeId) -> NodeId {
        self.ancestors(id).last().unwrap_or(id)
    }

    /// Returns `true` if `id` is `ancestor` or lies below it.
    pub fn is_descendant_of(&self, id: NodeId, ancestor: NodeId) -> bool {
        self.ancestors(id).any(|node| node == ancestor)
    }

    /// Children of `id`, first to last.
    pub fn children(&self, id: NodeId) -> Children<'_, T> {
        Children {
            tree: self,
            next: self.first_child(id),
        }
    }

    /// `id` followed by its parent, grandparent and so on up to the root.
    pub fn ancestors(&self, id: NodeId) -> Ancestors<'_, T> {
        Ancestors {
            tree: self,
            next: self.contains(id).then_some(id),
        }
    }

    /// `id` and every node below it, in pre-order.
    pub fn descendants(&self, id: NodeId) -> Descendants<'_, T> {
        Descendants {
            tree: self,
            root: id,
            next: self.contains(id).then_some(id),
        }
    }

    /// Attaches `id` as the first child of `parent`.
    ///
    /// # Errors
    ///
    /// [`TreeError::InvalidNode`] for an unknown id, [`TreeError::Cycle`]
    /// if `parent` is `id` or below it.
    pub fn as_first_child(&mut self, id: NodeId, parent: NodeId) -> Result<(), TreeError> {
        self.check_new_parent(id, parent)?;
        if self.first_child(parent) == Some(id) {
            return Ok(());
        }
        self.detach_parent(id)?;

        let (prev, next) = match self.first_child(parent) {
            Some(first) => {
                let last = self.link(first).prev_sibling;
                self.link(first).prev_sibling = Some(id);
                (last, Some(first))
            }
            None => (Some(id), None),
        };
        let node = self.link(id);
        node.parent = Some(parent);
        node.prev_sibling = prev;
        node.next_sibling = next;
        self.link(parent).first_child = Some(id);
        Ok(())
    }

    /// Attaches `id` as the last child of `parent`.
    ///
    /// # Errors
    ///
    /// As [`as_first_child`](Self::as_first_child).
    pub fn as_last_child(&mut self, id: NodeId, parent: NodeId) -> Result<(), TreeError> {
        self.check_new_parent(id, parent)?;
        if self.last_child(parent) == Some(id) {
            return Ok(());
        }
        self.detach_parent(id)?;

        let prev = match self.first_child(parent) {
            Some(first) => {
                let last = self.link(first).prev_sibling;
                if let Some(last) = last {
                    self.link(last).next_sibling = Some(id);
                }
                self.link(first).prev_sibling = Some(id);
                last
            }
            None => {
                self.link(parent).first_child = Some(id);
                Some(id)
            }
        };
        let node = self.link(id);
        node.parent = Some(parent);
        node.prev_sibling = prev;
        node.next_sibling = None;
        Ok(())
    }

    /// Attaches `id` right before `next`, under the same parent.
    ///
    /// # Errors
    ///
    /// [`TreeError::NoParent`] if `next` is a root, otherwise as
    /// [`as_first_child`](Self::as_first_child).
    pub fn as_sibling_before(&mut self, id: NodeId, next: NodeId) -> Result<(), TreeError> {
        let parent = self.sibling_parent(next)?;
        self.node(id)?;
        if id == next || self.next_sibling(id) == Some(next) {
            return Ok(());
        }
        self.check_new_parent(id, parent)?;
        self.detach_parent(id)?;

        let prev = self.link(next).prev_sibling;
        self.link(next).prev_sibling = Some(id);
        if self.first_child(parent) == Some(next) {
            self.link(parent).first_child = Some(id);
        } else if let Some(prev) = prev {
            self.link(prev).next_sibling = Some(id);
        }
        let node = self.link(id);
        node.parent = Some(parent);
        node.prev_sibling = prev;
        node.next_sibling = Some(next);
        Ok(())
    }

    /// Attaches `id` right after `previous`, under the same parent.
    ///
    /// # Errors
    ///
    /// As [`as_sibling_before`](Self::as_sibling_before).
    pub fn as_sibling_after(&mut self, id: NodeId, previous: NodeId) -> Result<(), TreeError> {
        let parent = self.sibling_parent(previous)?;
        self.node(id)?;
        if id == previous || self.previous_sibling(id) == Some(previous) {
            return Ok(());
        }
        self.check_new_parent(id, parent)?;
        self.detach_parent(id)?;

        let next = self.link(previous).next_sibling;
        self.link(previous).next_sibling = Some(id);
        match next {
            Some(next) => self.link(next).prev_sibling = Some(id),
            None => {
                if let Some(first) = self.first_child(parent) {
                    self.link(first).prev_sibling = Some(id);
                }
            }
        }
        let node = self.link(id);
        node.parent = Some(parent);
        node.prev_sibling = Some(previous);
        node.next_sibling = next;
        Ok(())
    }

    /// Moves `id` under `parent` as its last child, or makes it a root when
    /// `parent` is `None`.
    ///
    /// # Errors
    ///
    /// As [`as_last_child`](Self::as_last_child).
    pub fn set_parent(&mut self, id: NodeId, parent: Option<NodeId>) -> Result<(), TreeError> {
        if self.node(id)?.parent == parent {
            return Ok(());
        }
        match parent {
            Some(parent) => self.as_last_child(id, parent),
            None => self.detach_parent(id),
        }
    }

    /// Makes `id` a root. Its subtree moves with it.
    ///
    /// # Errors
    ///
    /// [`TreeError::InvalidNode`] if `id` is not in the tree.
    pub fn detach_parent(&mut self, id: NodeId) -> Result<(), TreeError> {
        let node = self.node(id)?;
        let (Some(parent), prev, next) = (node.parent, node.prev_sibling, node.next_sibling) else {
            return Ok(());
        };

        match next {
            Some(next) => self.link(next).prev_sibling = prev,
            None => {
                if let Some(first) = self.first_child(parent) {
                    self.link(first).prev_sibling = prev;
                }
            }
        }
        if self.first_child(parent) == Some(id) {
            self.link(parent).first_child = next;
        } else if let Some(prev) = prev {
            self.link(prev).next_sibling = next;
        }

        let node = self.link(id);
        node.parent = None;
        node.prev_sibling = None;
        node.next_sibling = None;
        Ok(())
    }

    /// Makes every child of `id` a root.
    ///
    /// # Errors
    ///
    /// [`TreeError::InvalidNode`] if `id` is not in the tree.
    pub fn detach_children(&mut self, id: NodeId) -> Result<(), TreeError> {
        let mut child = self.node_mut(id)?.first_child.take();
        while let Some(current) = child {
            let node = self.link(current);
            child = node.next_sibling.take();
            node.parent = None;
            node.prev_sibling = None;
        }
        Ok(())
    }

    fn node(&self, id: NodeId) -> Result<&Node<T>, TreeError> {
        self.nodes
            .get(id.0)
            .and_then(Option::as_ref)
            .ok_or(TreeError::InvalidNode(id))
    }

    fn node_mut(&mut self, id: NodeId) -> Result<&mut Node<T>, TreeError> {
        self.nodes
            .get_mut(id.0)
            .and_then(Option::as_mut)
            .ok_or(TreeError::InvalidNode(id))
    }

    /// A node reached through another node's links.
    fn link(&mut self, id: NodeId) -> &mut Node<T> {
        match self.nodes.get_mut(id.0).and_then(Option::as_mut) {
            Some(node) => node,
            None => unreachable!("linked {id} is not in the tree"),
        }
    }

    fn check_new_parent(&self, id: NodeId, parent: NodeId) -> Result<(), TreeError> {
        self.node(id)?;
        self.node(parent)?;
        if self.is_descendant_of(parent, id) {
            return Err(TreeError::Cycle { node: id, parent });
        }
        Ok(())
    }

    fn sibling_parent(&self, sibling: NodeId) -> Result<NodeId, TreeError> {
        self.node(sibling)?
            .parent
            .ok_or(TreeError::NoParent(sibling))
    }
}

impl<T> Default for Tree<T> {
    fn default() -> Self {
        Self::new()
    }
}

impl<T> Index<NodeId> for Tree<T> {
    type Output = T;

    /// # Panics
    ///
    /// Panics if `id` is not in the tree.
    fn index(&self, id: NodeId) -> &T {
        match self.get(id) {
            Some(value) => value,
            None => panic!("invalid tree node {id}"),
        }
    }
}

impl<T> IndexMut<NodeId> for Tree<T> {
    fn index_mut(&mut self, id: NodeId) -> &mut T {
        match self.get_mut(id) {
            Some(value) => value,
            None => panic!("invalid tree node {id}"),
        }
    }
}

/// Iterator over a node's children, created by [`Tree::children`].
#[derive(Debug, Clone)]
pub struct Children<'a, T> {
    tree: &'a Tree<T>,
    next: Option<NodeId>,
}

impl<T> Iterator for Children<'_, T> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let id = self.next?;
        self.next = self.tree.next_sibling(id);
        Some(id)
    }
}

impl<T> FusedIterator for Children<'_, T> {}

/// Iterator from a node up to its root, created by [`Tree::ancestors`].
#[derive(Debug, Clone)]
pub struct Ancestors<'a, T> {
    tree: &'a Tree<T>,
    next: Option<NodeId>,
}

impl<T> Iterator for Ancestors<'_, T> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let id = self.next?;
        self.next = self.tree.parent(id);
        Some(id)
    }
}

impl<T> FusedIterator for Ancestors<'_, T> {}

/// Pre-order iterator over a subtree, created by [`Tree::descendants`].
#[derive(Debug, Clone)]
pub struct Descendants<'a, T> {
    tree: &'a Tree<T>,
    root: NodeId,
    next: Option<NodeId>,
}

impl<T> Iterator for Descendants<'_, T> {
    type Item = NodeId;

    fn next(&mut self) -> Option<NodeId> {
        let id = self.next?;
        self.next = self.tree.first_child(id).or_else(|| {
            let mut node = id;
            while node != self.root {
                if let Some(next) = self.tree.next_sibling(node) {
                    return Some(next);
                }
                node = self.tree.parent(node)?;
            }
            None
        });
        Some(id)
    }
}

impl<T> FusedIterator for Descendants<'_, T> {}
