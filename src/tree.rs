//! Unrooted tree stored as an arena of nodes with mutual adjacency.
//!
//! # Overview
//! Nodes live in slots addressed by a stable [`NodeId`]. Each node keeps its
//! neighbours as a list of [`Link`]s, and every link has a mirror on the other
//! endpoint carrying the same branch length. Topology edits rewrite links in
//! place, so a `NodeId` stays valid for the whole lifetime of a tree
//! generation.
//!
//! # Generations
//! A new topology is loaded into the same arena next to the previous one.
//! [`Tree::load`] then marks everything reachable from the new anchor and
//! recycles every other slot, so the old generation disappears in one sweep
//! and its slots are reused by the next load.
//!
//! # Reading and writing
//! Parsing and printing Newick is done by `phylotree`. A parsed
//! `phylotree::tree::Tree` is converted on load (dissolving degree-2 nodes),
//! and any part of the arena can be turned back into a rooted
//! `phylotree::tree::Tree` for printing.

use phylotree::tree::{Node as PhyloNode, Tree as PhyloTree};
use std::ops::Index;

use crate::error::{ReplayError, Result};

pub type NodeId = usize;

/// One half of an edge: the neighbour and the length of the shared branch.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Link {
    pub to: NodeId,
    pub length: Option<f64>,
}

/// A node of the arena. Tips carry a name, internal nodes none.
#[derive(Clone, Debug, Default, PartialEq)]
pub struct Node {
    pub name: Option<String>,
    pub links: Vec<Link>,
}

impl Node {
    fn tip(name: Option<String>) -> Self {
        Node { name: name.filter(|n| !n.is_empty()), links: Vec::new() }
    }

    /// A node with at most one neighbour.
    #[inline]
    pub fn is_leaf(&self) -> bool {
        self.links.len() <= 1
    }

    #[inline]
    pub fn degree(&self) -> usize {
        self.links.len()
    }

    /// Position of the link pointing at `to`, if any.
    #[inline]
    pub fn slot_of(&self, to: NodeId) -> Option<usize> {
        self.links.iter().position(|l| l.to == to)
    }
}

#[derive(Clone, Debug, Default, PartialEq)]
pub struct Tree {
    slots: Vec<Option<Node>>,
    free: Vec<NodeId>,
    anchor: Option<NodeId>,
}

impl Index<NodeId> for Tree {
    type Output = Node;

    fn index(&self, id: NodeId) -> &Node {
        match self.slots.get(id) {
            Some(Some(node)) => node,
            _ => panic!("node {id} is not live"),
        }
    }
}

/// Sum of two optional branch lengths; a missing side contributes nothing.
pub(crate) fn join_lengths(a: Option<f64>, b: Option<f64>) -> Option<f64> {
    match (a, b) {
        (Some(x), Some(y)) => Some(x + y),
        (x, None) => x,
        (None, y) => y,
    }
}

fn malformed(e: impl std::fmt::Display) -> ReplayError {
    ReplayError::MalformedTree(e.to_string())
}

impl Tree {
    pub fn new() -> Self {
        Self::default()
    }

    /// Parse a topology string and load it as the only generation of a new arena.
    pub fn from_newick(text: &str) -> Result<Self> {
        let parsed = crate::io::parse_topology(text)?;
        let mut tree = Tree::new();
        tree.load(&parsed)?;
        Ok(tree)
    }

    /// A live node of the current generation, preferably internal.
    pub fn anchor(&self) -> Option<NodeId> {
        self.anchor
    }

    /// Number of occupied slots.
    pub fn live_count(&self) -> usize {
        self.slots.iter().filter(|s| s.is_some()).count()
    }

    pub fn get(&self, id: NodeId) -> Option<&Node> {
        self.slots.get(id).and_then(Option::as_ref)
    }

    pub(crate) fn node_mut(&mut self, id: NodeId) -> &mut Node {
        match self.slots.get_mut(id) {
            Some(Some(node)) => node,
            _ => panic!("node {id} is not live"),
        }
    }

    fn alloc(&mut self, node: Node) -> NodeId {
        match self.free.pop() {
            Some(id) => {
                self.slots[id] = Some(node);
                id
            }
            None => {
                self.slots.push(Some(node));
                self.slots.len() - 1
            }
        }
    }

    fn connect(&mut self, a: NodeId, b: NodeId, length: Option<f64>) {
        self.node_mut(a).links.push(Link { to: b, length });
        self.node_mut(b).links.push(Link { to: a, length });
    }

    /// Load a parsed topology as the new generation and reclaim the old one.
    ///
    /// A root of degree 2 and unary internal nodes are dissolved, summing the
    /// lengths of the two branches they joined. Internal labels are dropped.
    /// Returns the anchor of the new generation.
    pub fn load(&mut self, src: &PhyloTree) -> Result<NodeId> {
        let root = src.get_root().map_err(malformed)?;
        let root_node = src.get(&root).map_err(malformed)?;

        let anchor = if let [left, right] = root_node.children.as_slice() {
            let (a, extra_a) = self.load_clade(src, *left)?;
            let (b, extra_b) = self.load_clade(src, *right)?;
            let len_a = join_lengths(src.get(left).map_err(malformed)?.parent_edge, extra_a);
            let len_b = join_lengths(src.get(right).map_err(malformed)?.parent_edge, extra_b);
            self.connect(a, b, join_lengths(len_a, len_b));
            if self[a].is_leaf() { b } else { a }
        } else {
            self.load_clade(src, root)?.0
        };

        let swept = self.reclaim(anchor);
        self.anchor = Some(anchor);
        tracing::debug!(anchor, swept, live = self.live_count(), "loaded tree generation");
        Ok(anchor)
    }

    /// Convert the clade below `id`. The returned length is the part of the
    /// branch above the returned node that came from dissolved unary nodes.
    fn load_clade(&mut self, src: &PhyloTree, id: usize) -> Result<(NodeId, Option<f64>)> {
        let node = src.get(&id).map_err(malformed)?;
        match node.children.as_slice() {
            [] => Ok((self.alloc(Node::tip(node.name.clone())), None)),
            [only] => {
                let (child, extra) = self.load_clade(src, *only)?;
                let above = src.get(only).map_err(malformed)?.parent_edge;
                Ok((child, join_lengths(above, extra)))
            }
            children => {
                let here = self.alloc(Node::default());
                for &c in children {
                    let (child, extra) = self.load_clade(src, c)?;
                    let above = src.get(&c).map_err(malformed)?.parent_edge;
                    self.connect(here, child, join_lengths(above, extra));
                }
                Ok((here, None))
            }
        }
    }

    /// Mark every node reachable from `root`, free all other live slots.
    /// Returns the number of slots freed.
    pub fn reclaim(&mut self, root: NodeId) -> usize {
        let mut marked = vec![false; self.slots.len()];
        let mut stack = vec![root];
        while let Some(id) = stack.pop() {
            if marked[id] {
                continue;
            }
            marked[id] = true;
            stack.extend(self[id].links.iter().map(|l| l.to).filter(|&to| !marked[to]));
        }

        let mut swept = 0;
        for (id, slot) in self.slots.iter_mut().enumerate() {
            if slot.is_some() && !marked[id] {
                *slot = None;
                self.free.push(id);
                swept += 1;
            }
        }
        swept
    }

    /// Nodes on the `toward` side of the edge `from`–`toward`, `toward` first.
    /// With `from == None` the whole component of `toward` is returned.
    pub fn side(&self, from: Option<NodeId>, toward: NodeId) -> Vec<NodeId> {
        let mut out = Vec::new();
        let mut stack = vec![(toward, from)];
        while let Some((id, parent)) = stack.pop() {
            out.push(id);
            for link in &self[id].links {
                if Some(link.to) != parent {
                    stack.push((link.to, Some(id)));
                }
            }
        }
        out
    }

    /// Sorted tip names on the `toward` side of `from`–`toward`.
    pub fn tip_names(&self, from: Option<NodeId>, toward: NodeId) -> Vec<String> {
        let mut names: Vec<String> = self
            .side(from, toward)
            .into_iter()
            .filter_map(|id| self[id].name.clone())
            .collect();
        names.sort();
        names
    }

    /// Number of edges in the component containing `start`.
    pub fn edge_count(&self, start: NodeId) -> usize {
        self.side(None, start).iter().map(|&id| self[id].degree()).sum::<usize>() / 2
    }

    fn phylo_node(&self, id: NodeId) -> PhyloNode {
        match &self[id].name {
            Some(name) => PhyloNode::new_named(name),
            None => PhyloNode::new(),
        }
    }

    /// The clade on the `root` side of `away_from`–`root`, as a rooted tree.
    pub fn rooted_phylo(&self, root: NodeId, away_from: Option<NodeId>) -> Result<PhyloTree> {
        let mut out = PhyloTree::new();
        let top = out.add(self.phylo_node(root));
        let mut stack = vec![(root, away_from, top)];
        while let Some((id, parent, pid)) = stack.pop() {
            for link in &self[id].links {
                if Some(link.to) == parent {
                    continue;
                }
                let cid = out
                    .add_child(self.phylo_node(link.to), pid, link.length)
                    .map_err(malformed)?;
                stack.push((link.to, Some(id), cid));
            }
        }
        Ok(out)
    }

    /// Newick for the clade on the `root` side of `away_from`–`root`.
    pub fn to_newick_rooted(&self, root: NodeId, away_from: Option<NodeId>) -> Result<String> {
        self.rooted_phylo(root, away_from)?.to_newick().map_err(malformed)
    }

    /// Newick for the whole component containing `start`, written from an
    /// internal node when there is one.
    pub fn to_newick_unrooted(&self, start: NodeId) -> Result<String> {
        let node = &self[start];
        if !node.is_leaf() {
            return self.to_newick_rooted(start, None);
        }
        let Some(link) = node.links.first().copied() else {
            return self.to_newick_rooted(start, None);
        };
        if !self[link.to].is_leaf() {
            return self.to_newick_rooted(link.to, None);
        }

        // two tips joined by a single edge: root at its midpoint
        let half = link.length.map(|l| l / 2.0);
        let mut out = PhyloTree::new();
        let top = out.add(PhyloNode::new());
        out.add_child(self.phylo_node(start), top, half).map_err(malformed)?;
        out.add_child(self.phylo_node(link.to), top, half).map_err(malformed)?;
        out.to_newick().map_err(malformed)
    }
}
