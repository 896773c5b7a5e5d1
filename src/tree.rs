//! Arena-backed rooted phylogenetic trees.
//!
//! Nodes live in a flat `Vec<TreeNode>` and are referenced by `NodeId`.
//! Every node carries a height (age above the youngest reference point);
//! the branch above a node has length `parent height - node height`.

use crate::error::{AdequacyError, PpResult};

/// Index into the tree's node arena.
pub type NodeId = usize;

/// A single node in a phylogenetic tree.
#[derive(Debug, Clone)]
pub struct TreeNode {
    pub id: NodeId,
    /// Parent node (None for the root).
    pub parent: Option<NodeId>,
    pub children: Vec<NodeId>,
    /// Age of this node above the youngest tip.
    pub height: f64,
    /// Per-branch rate annotation carried by relaxed-clock tree logs.
    pub rate: Option<f64>,
    /// Taxon label (leaves) or clade label.
    pub name: Option<String>,
}

impl TreeNode {
    pub fn is_leaf(&self) -> bool {
        self.children.is_empty()
    }

    pub fn is_root(&self) -> bool {
        self.parent.is_none()
    }
}

/// A rooted tree stored as an arena of nodes.
#[derive(Debug, Clone)]
pub struct Tree {
    nodes: Vec<TreeNode>,
    root: NodeId,
}

impl Tree {
    /// A tree consisting of a single root node at the given height.
    pub fn solo(height: f64) -> Self {
        Self {
            nodes: vec![TreeNode {
                id: 0,
                parent: None,
                children: Vec::new(),
                height,
                rate: None,
                name: None,
            }],
            root: 0,
        }
    }

    /// Build a tree from pre-constructed nodes.
    ///
    /// Rejects an empty arena, an out-of-range root, and any arena with more
    /// than one parentless node: the sampled state holds exactly one tree,
    /// and a forest here would silently mis-assign samples downstream.
    pub fn from_nodes(nodes: Vec<TreeNode>, root: NodeId) -> PpResult<Self> {
        if nodes.is_empty() {
            return Err(AdequacyError::Validation("empty tree node list".into()));
        }
        if root >= nodes.len() {
            return Err(AdequacyError::Validation(format!(
                "root index {} out of range ({})",
                root,
                nodes.len()
            )));
        }
        let roots = nodes.iter().filter(|n| n.parent.is_none()).count();
        if roots != 1 {
            return Err(AdequacyError::Validation(format!(
                "tree must have exactly one root, found {}",
                roots
            )));
        }
        Ok(Self { nodes, root })
    }

    /// Add a child under `parent` and return its id.
    pub fn add_child(
        &mut self,
        parent: NodeId,
        name: Option<String>,
        height: f64,
    ) -> PpResult<NodeId> {
        if parent >= self.nodes.len() {
            return Err(AdequacyError::Validation(format!(
                "parent index {} out of range ({})",
                parent,
                self.nodes.len()
            )));
        }
        let id = self.nodes.len();
        self.nodes.push(TreeNode {
            id,
            parent: Some(parent),
            children: Vec::new(),
            height,
            rate: None,
            name,
        });
        self.nodes[parent].children.push(id);
        Ok(id)
    }

    pub fn node(&self, id: NodeId) -> &TreeNode {
        &self.nodes[id]
    }

    pub fn node_mut(&mut self, id: NodeId) -> &mut TreeNode {
        &mut self.nodes[id]
    }

    pub fn root(&self) -> NodeId {
        self.root
    }

    pub fn node_count(&self) -> usize {
        self.nodes.len()
    }

    pub fn leaf_count(&self) -> usize {
        self.nodes.iter().filter(|n| n.is_leaf()).count()
    }

    /// Ids of all leaf nodes, in arena order.
    pub fn leaves(&self) -> Vec<NodeId> {
        self.nodes
            .iter()
            .filter(|n| n.is_leaf())
            .map(|n| n.id)
            .collect()
    }

    /// Sorted leaf labels (unnamed leaves excluded).
    pub fn leaf_names(&self) -> Vec<String> {
        let mut names: Vec<String> = self
            .nodes
            .iter()
            .filter(|n| n.is_leaf())
            .filter_map(|n| n.name.clone())
            .collect();
        names.sort();
        names
    }

    /// Length of the branch above `id`: parent height minus node height.
    /// The root has no branch and reports 0.
    pub fn branch_length(&self, id: NodeId) -> f64 {
        match self.nodes[id].parent {
            Some(p) => self.nodes[p].height - self.nodes[id].height,
            None => 0.0,
        }
    }

    /// Pre-order (parent before children) traversal.
    pub fn iter_preorder(&self) -> PreorderIter<'_> {
        PreorderIter {
            tree: self,
            stack: vec![self.root],
        }
    }

    /// Replace this tree's structure with a copy of `other`.
    ///
    /// This is a structural copy: the arena is cloned wholesale, so later
    /// mutation of `other` cannot leak into this tree.
    pub fn assign_from(&mut self, other: &Tree) {
        self.nodes = other.nodes.clone();
        self.root = other.root;
    }
}

/// Pre-order iterator over node ids.
pub struct PreorderIter<'a> {
    tree: &'a Tree,
    stack: Vec<NodeId>,
}

impl<'a> Iterator for PreorderIter<'a> {
    type Item = NodeId;

    fn next(&mut self) -> Option<Self::Item> {
        let id = self.stack.pop()?;
        // Push children in reverse order so the leftmost is visited first.
        for &child in self.tree.nodes[id].children.iter().rev() {
            self.stack.push(child);
        }
        Some(id)
    }
}
