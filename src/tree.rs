//! Phylogenetic tree model.
//!
//! # Overview
//! A [`Tree`] owns all of its nodes in a single arena (`Vec<Node>`) and hands
//! out [`NodeId`] indices into it. Children are owned through the arena; the
//! parent link is just another index, so no reference cycles can exist and
//! dropping the tree releases the whole graph.
//!
//! ```text
//!         root (0)
//!        /        \
//!      A (1)     node (2)
//!                /     \
//!             B (3)    C (4)
//! ```
//!
//! Node ids are assigned in insertion order. Trees built by the Newick parser
//! are filled top-down, so the arena order is a pre-order of the tree and is
//! stable for the tree's lifetime.
//!
//! Topology is fixed once built: nodes can be appended with
//! [`Tree::add_child`], but there is no API to detach or re-parent them.

use crate::error::{Result, TreeError};
use crate::newick::write_newick;
use std::collections::HashSet;

/// Index of a node in a tree's arena.
pub type NodeId = usize;

/// A single node: label data plus the links into the owning tree's arena.
#[derive(Debug, Clone, Default, PartialEq)]
pub struct Node {
    /// Taxon name for leaves, clade name for labelled internal nodes.
    pub name: String,

    /// Length of the branch leading to this node; `None` when not given.
    pub branch_length: Option<f64>,

    /// Support value as written in the input (e.g. `"95"` or `"0.87"`).
    pub support_label: Option<String>,

    children: Vec<NodeId>,
    parent: Option<NodeId>,
}

impl Node {
    pub fn new(name: impl Into<String>) -> Self {
        Node {
            name: name.into(),
            ..Node::default()
        }
    }

    pub fn with_branch_length(mut self, length: f64) -> Self {
        self.branch_length = Some(length);
        self
    }

    pub fn with_support(mut self, label: impl Into<String>) -> Self {
        self.support_label = Some(label.into());
        self
    }

    pub fn children(&self) -> &[NodeId] {
        &self.children
    }

    pub fn parent(&self) -> Option<NodeId> {
        self.parent
    }

    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    /// Label to print for this node: its name, or the support label if unnamed.
    ///
    /// A named node's support label is not part of the printed label.
    pub fn label(&self) -> &str {
        if self.name.is_empty() {
            self.support_label.as_deref().unwrap_or("")
        } else {
            &self.name
        }
    }
}

/// A rooted phylogenetic tree stored as an arena of [`Node`]s.
#[derive(Debug, Clone, PartialEq)]
pub struct Tree {
    nodes: Vec<Node>,
    root: NodeId,
    num_leaves: usize,
    name: Option<String>,
}

// ============================================================================
// Construction
// ============================================================================
impl Tree {
    /// Creates a tree consisting only of `root`.
    pub fn with_root(root: Node) -> Self {
        let mut root = root;
        root.children.clear();
        root.parent = None;
        Tree {
            nodes: vec![root],
            root: 0,
            num_leaves: 1,
            name: None,
        }
    }

    /// Appends `node` as the last child of `parent` and returns its id.
    ///
    /// # Panics
    /// If `parent` is not a node of this tree.
    pub fn add_child(&mut self, parent: NodeId, node: Node) -> NodeId {
        assert!(parent < self.nodes.len(), "parent {parent} not in tree");
        let id = self.nodes.len();
        let mut node = node;
        node.children.clear();
        node.parent = Some(parent);
        self.nodes.push(node);

        // A leaf turning into an internal node does not change the leaf count.
        if !self.nodes[parent].children.is_empty() {
            self.num_leaves += 1;
        }
        self.nodes[parent].children.push(id);
        id
    }

    pub fn set_name(&mut self, name: impl Into<String>) {
        self.name = Some(name.into());
    }

    pub fn name(&self) -> Option<&str> {
        self.name.as_deref()
    }
}

// ============================================================================
// Accessors
// ============================================================================
impl Tree {
    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn node(&self, id: NodeId) -> &Node {
        &self.nodes[id]
    }

    /// Mutable access to a node's labels and branch length.
    ///
    /// Topology stays untouched: children and parent are private.
    pub fn node_mut(&mut self, id: NodeId) -> &mut Node {
        &mut self.nodes[id]
    }

    /// All nodes in arena order.
    pub fn nodes(&self) -> &[Node] {
        &self.nodes
    }

    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }

    pub fn is_root(&self, id: NodeId) -> bool {
        id == self.root
    }

    pub fn child_count(&self, id: NodeId) -> usize {
        self.nodes[id].children.len()
    }

    pub fn leaf_count(&self) -> usize {
        self.num_leaves
    }

    pub fn internal_count(&self) -> usize {
        self.nodes.len() - self.num_leaves
    }

    /// A root with more than two children is read as an unrooted tree.
    pub fn is_unrooted(&self) -> bool {
        self.child_count(self.root) > 2
    }

    /// Leaf ids in arena order.
    pub fn leaves(&self) -> impl Iterator<Item = NodeId> + '_ {
        (0..self.nodes.len()).filter(|&id| self.nodes[id].is_leaf())
    }

    /// Internal node ids (the root included) in arena order.
    pub fn internal_nodes(&self) -> impl Iterator<Item = NodeId> + '_ {
        (0..self.nodes.len()).filter(|&id| !self.nodes[id].is_leaf())
    }

    /// Names of all leaves, in pre-order.
    pub fn leaf_names(&self) -> Vec<String> {
        self.leaf_names_under(self.root)
    }

    /// Returns the Newick string of this tree, terminated by `;`.
    pub fn to_newick(&self, with_branch_lengths: bool) -> String {
        write_newick(self, with_branch_lengths)
    }
}

// ============================================================================
// Queries
// ============================================================================
impl Tree {
    /// Names of the leaves below `id`, in pre-order.
    pub fn leaf_names_under(&self, id: NodeId) -> Vec<String> {
        self.pre_order_from(id)
            .filter(|&n| self.nodes[n].is_leaf())
            .map(|n| self.nodes[n].name.clone())
            .collect()
    }

    /// Number of leaves in the subtree rooted at `id` (a leaf counts itself).
    pub fn descendant_count(&self, id: NodeId) -> usize {
        self.pre_order_from(id)
            .filter(|&n| self.nodes[n].is_leaf())
            .count()
    }

    /// Most recent common ancestor of the leaves named in `names`.
    ///
    /// # Errors
    /// [`TreeError::NotFound`] if `names` is empty or any name is not a leaf
    /// of this tree.
    pub fn find_mrca<S: AsRef<str>>(&self, names: &[S]) -> Result<NodeId> {
        let Some(first) = names.first() else {
            return Err(TreeError::NotFound(String::new()));
        };

        let mut mrca = self.find_leaf(first.as_ref())?;
        for name in &names[1..] {
            let leaf = self.find_leaf(name.as_ref())?;
            let ancestors: HashSet<NodeId> = self.ancestors_inclusive(mrca).collect();
            // The root is an ancestor of everything, so this always hits.
            mrca = self
                .ancestors_inclusive(leaf)
                .find(|n| ancestors.contains(n))
                .unwrap_or(self.root);
        }
        Ok(mrca)
    }

    /// Id of the leaf called `name`.
    pub fn find_leaf(&self, name: &str) -> Result<NodeId> {
        self.leaves()
            .find(|&id| self.nodes[id].name == name)
            .ok_or_else(|| TreeError::NotFound(name.to_string()))
    }

    /// Walks from `id` up to the root, yielding `id` first.
    pub fn ancestors_inclusive(&self, id: NodeId) -> impl Iterator<Item = NodeId> + '_ {
        std::iter::successors(Some(id), move |&n| self.nodes[n].parent)
    }

    /// Pre-order traversal (parents before children) of the whole tree.
    pub fn pre_order(&self) -> PreOrderIter<'_> {
        self.pre_order_from(self.root)
    }

    /// Pre-order traversal of the subtree rooted at `id`.
    pub fn pre_order_from(&self, id: NodeId) -> PreOrderIter<'_> {
        PreOrderIter {
            tree: self,
            stack: vec![id],
        }
    }

    /// Post-order traversal (children before parents) of the whole tree.
    pub fn post_order(&self) -> PostOrderIter<'_> {
        PostOrderIter {
            tree: self,
            stack: vec![(self.root, false)],
        }
    }
}

/// Stack-based pre-order iterator; children are visited in their stored order.
pub struct PreOrderIter<'a> {
    tree: &'a Tree,
    stack: Vec<NodeId>,
}

impl Iterator for PreOrderIter<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.stack.pop()?;
        self.stack
            .extend(self.tree.nodes[id].children.iter().rev().copied());
        Some(id)
    }
}

/// Stack-based post-order iterator.
pub struct PostOrderIter<'a> {
    tree: &'a Tree,
    stack: Vec<(NodeId, bool)>, // (id, children_visited)
}

impl Iterator for PostOrderIter<'_> {
    type Item = NodeId;

    fn next(&mut self) -> Option<Self::Item> {
        while let Some((id, children_visited)) = self.stack.pop() {
            let node = &self.tree.nodes[id];
            if children_visited || node.is_leaf() {
                return Some(id);
            }
            self.stack.push((id, true));
            self.stack
                .extend(node.children.iter().rev().map(|&c| (c, false)));
        }
        None
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    /// Builds the tree drawn in the module docs:
    ///
    /// ```text
    ///         root
    ///        /    \
    ///       A     node (0.5)
    ///             /   \
    ///            B     C
    /// ```
    fn small_tree() -> Tree {
        let mut tree = Tree::with_root(Node::default());
        tree.add_child(0, Node::new("A").with_branch_length(1.0));
        let node = tree.add_child(0, Node::default().with_branch_length(0.5));
        tree.add_child(node, Node::new("B"));
        tree.add_child(node, Node::new("C"));
        tree
    }

    #[test]
    fn test_counts() {
        let tree = small_tree();
        assert_eq!(tree.len(), 5);
        assert_eq!(tree.leaf_count(), 3);
        assert_eq!(tree.internal_count(), 2);
        assert_eq!(tree.child_count(tree.root()), 2);
        assert!(tree.is_root(0));
        assert!(!tree.is_root(2));
        assert!(!tree.is_unrooted());
    }

    #[test]
    fn test_leaf_names_and_descendants() {
        let tree = small_tree();
        assert_eq!(tree.leaf_names(), vec!["A", "B", "C"]);
        assert_eq!(tree.leaf_names_under(2), vec!["B", "C"]);
        assert_eq!(tree.descendant_count(0), 3);
        assert_eq!(tree.descendant_count(2), 2);
        assert_eq!(tree.descendant_count(1), 1);
    }

    #[test]
    fn test_parent_links() {
        let tree = small_tree();
        assert_eq!(tree.node(0).parent(), None);
        assert_eq!(tree.node(3).parent(), Some(2));
        assert_eq!(tree.node(2).parent(), Some(0));
        assert_eq!(tree.ancestors_inclusive(4).collect::<Vec<_>>(), vec![4, 2, 0]);
    }

    #[test]
    fn test_traversals() {
        let tree = small_tree();
        assert_eq!(tree.pre_order().collect::<Vec<_>>(), vec![0, 1, 2, 3, 4]);
        assert_eq!(tree.post_order().collect::<Vec<_>>(), vec![1, 3, 4, 2, 0]);
        assert_eq!(tree.internal_nodes().collect::<Vec<_>>(), vec![0, 2]);
    }

    #[test]
    fn test_find_mrca() {
        let tree = small_tree();
        assert_eq!(tree.find_mrca(&["B", "C"]).unwrap(), 2);
        assert_eq!(tree.find_mrca(&["A", "C"]).unwrap(), 0);
        assert_eq!(tree.find_mrca(&["B"]).unwrap(), 3);
    }

    #[test]
    fn test_find_mrca_missing_name() {
        let tree = small_tree();
        match tree.find_mrca(&["B", "Z"]) {
            Err(TreeError::NotFound(name)) => assert_eq!(name, "Z"),
            other => panic!("expected NotFound, got {other:?}"),
        }
        let empty: [&str; 0] = [];
        assert!(matches!(tree.find_mrca(&empty), Err(TreeError::NotFound(_))));
    }

    #[test]
    fn test_unrooted_root() {
        let mut tree = Tree::with_root(Node::default());
        for name in ["A", "B", "C"] {
            tree.add_child(0, Node::new(name));
        }
        assert!(tree.is_unrooted());
        assert_eq!(tree.leaf_count(), 3);
    }

    #[test]
    fn test_label_prefers_name() {
        let named = Node::new("Root").with_support("90");
        assert_eq!(named.label(), "Root");
        let unnamed = Node::default().with_support("90");
        assert_eq!(unnamed.label(), "90");
    }
}
