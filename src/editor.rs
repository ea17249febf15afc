//! Scoped topology edits that undo themselves.
//!
//! # Prune
//! ```text
//!      a               a
//!       \               \
//!        x --- r   →     \        x --- r
//!       /                 \           (subtree, x left open)
//!      b                   b
//! ```
//! The attachment node `x` gives up its links to `a` and `b`, which are
//! joined by a single bridging edge. The subtree hangs from `x` with two open
//! slots.
//!
//! # Splice
//! The open node `x` is grafted into a remainder edge `u`–`v`, which becomes
//! `u`–`x`–`v`.
//!
//! # Rollback
//! Both edits are guards that restore the exact previous adjacency (links,
//! slot order and branch lengths) when dropped, unless `commit` was called.
//! A [`Splice`] mutably borrows its [`Prune`], so it is always released
//! first.

use std::collections::HashSet;

use crate::error::{ReplayError, Result};
use crate::splits::Edge;
use crate::tree::{join_lengths, Link, NodeId, Tree};

/// One end of the bridging edge, with the slot it reuses and the length of
/// the branch it had to the attachment node.
#[derive(Clone, Copy, Debug)]
struct BridgeEnd {
    node: NodeId,
    slot: usize,
    length: Option<f64>,
}

/// An open prune. Reverts on drop.
pub struct Prune<'t> {
    tree: &'t mut Tree,
    attach: NodeId,
    root: NodeId,
    saved: Vec<Link>,
    ends: [BridgeEnd; 2],
    subtree: HashSet<NodeId>,
    committed: bool,
}

impl<'t> Prune<'t> {
    /// Detach the clade on the `inner` side of `edge`.
    ///
    /// `edge.outer` is the attachment point and must have exactly two
    /// neighbours besides `edge.inner`.
    ///
    /// # Errors
    /// `Inconsistent` if the attachment point is not such a node.
    pub fn open(tree: &'t mut Tree, edge: Edge) -> Result<Self> {
        let Edge { inner: root, outer: attach } = edge;
        let node = tree
            .get(attach)
            .ok_or_else(|| ReplayError::Inconsistent(format!("prune point {attach} is not live")))?;
        if node.degree() != 3 || node.slot_of(root).is_none() {
            return Err(ReplayError::Inconsistent(format!(
                "prune point {attach} has degree {} and must join node {root} to exactly two other neighbours",
                node.degree()
            )));
        }

        let saved = node.links.clone();
        let mut others = saved.iter().filter(|l| l.to != root);
        let (Some(left), Some(right)) = (others.next().copied(), others.next().copied()) else {
            return Err(ReplayError::Inconsistent(format!("prune point {attach} lost a neighbour")));
        };

        let mut ends = [left, right].map(|l| BridgeEnd { node: l.to, slot: 0, length: l.length });
        for end in &mut ends {
            end.slot = tree[end.node].slot_of(attach).ok_or_else(|| {
                ReplayError::Inconsistent(format!("node {} has no link back to {attach}", end.node))
            })?;
        }

        let bridge = join_lengths(left.length, right.length);
        let [a, b] = ends;
        tree.node_mut(a.node).links[a.slot] = Link { to: b.node, length: bridge };
        tree.node_mut(b.node).links[b.slot] = Link { to: a.node, length: bridge };
        tree.node_mut(attach).links.retain(|l| l.to == root);

        let subtree = tree.side(None, root).into_iter().collect();
        tracing::trace!(attach, root, "prune opened");

        Ok(Prune { tree, attach, root, saved, ends, subtree, committed: false })
    }

    pub fn tree(&self) -> &Tree {
        &*self.tree
    }

    /// Root of the detached clade (the former `inner` endpoint).
    pub fn subtree_root(&self) -> NodeId {
        self.root
    }

    /// The open node the clade hangs from.
    pub fn attach_point(&self) -> NodeId {
        self.attach
    }

    /// The edge joining the attachment point's two former neighbours.
    pub fn bridge(&self) -> Edge {
        Edge { inner: self.ends[0].node, outer: self.ends[1].node }
    }

    /// Whether `id` belongs to the detached part, attachment point included.
    pub fn contains(&self, id: NodeId) -> bool {
        self.subtree.contains(&id)
    }

    /// The remainder edge corresponding to an edge of the unpruned tree.
    ///
    /// The three edges at the attachment point all collapse onto the bridge;
    /// edges inside the detached clade have no counterpart.
    pub fn remainder_edge(&self, edge: Edge) -> Option<Edge> {
        if edge.touches(self.attach) {
            Some(self.bridge())
        } else if self.contains(edge.inner) || self.contains(edge.outer) {
            None
        } else {
            Some(edge)
        }
    }

    /// Newick of the remainder tree.
    pub fn remainder_newick(&self) -> Result<String> {
        self.tree.to_newick_unrooted(self.ends[0].node)
    }

    /// Newick of the detached clade, rooted at its root.
    pub fn subtree_newick(&self) -> Result<String> {
        self.tree.to_newick_rooted(self.root, Some(self.attach))
    }

    /// Keep the tree split in two.
    pub fn commit(mut self) {
        self.committed = true;
    }

    pub fn rollback(self) {}

    fn revert(&mut self) {
        for end in self.ends {
            self.tree.node_mut(end.node).links[end.slot] = Link { to: self.attach, length: end.length };
        }
        self.tree.node_mut(self.attach).links = std::mem::take(&mut self.saved);
    }
}

impl Drop for Prune<'_> {
    fn drop(&mut self) {
        if !self.committed {
            self.revert();
            tracing::trace!(attach = self.attach, "prune reverted");
        }
    }
}

/// An open regraft inside a [`Prune`]. Reverts on drop.
pub struct Splice<'p, 't> {
    prune: &'p mut Prune<'t>,
    target: Edge,
    slots: [usize; 2],
    length: Option<f64>,
    committed: bool,
}

impl<'p, 't> Splice<'p, 't> {
    /// Graft the pruned clade into the remainder edge `target`.
    ///
    /// # Errors
    /// `Inconsistent` if the clade is not open or `target` is not an edge of
    /// the remainder.
    pub fn open(prune: &'p mut Prune<'t>, target: Edge) -> Result<Self> {
        let x = prune.attach;
        if prune.tree[x].degree() != 1 {
            return Err(ReplayError::Inconsistent(format!("subtree at {x} is not open for splicing")));
        }
        if prune.contains(target.inner) || prune.contains(target.outer) {
            return Err(ReplayError::Inconsistent(format!(
                "edge {}-{} lies inside the pruned subtree",
                target.inner, target.outer
            )));
        }

        let Edge { inner: u, outer: v } = target;
        let not_an_edge = || ReplayError::Inconsistent(format!("nodes {u} and {v} are not adjacent"));
        let u_slot = prune.tree.get(u).and_then(|n| n.slot_of(v)).ok_or_else(not_an_edge)?;
        let v_slot = prune.tree.get(v).and_then(|n| n.slot_of(u)).ok_or_else(not_an_edge)?;

        let length = prune.tree[u].links[u_slot].length;
        let half = length.map(|l| l / 2.0);
        let tree = &mut *prune.tree;
        tree.node_mut(u).links[u_slot] = Link { to: x, length: half };
        tree.node_mut(v).links[v_slot] = Link { to: x, length: half };
        tree.node_mut(x).links.push(Link { to: u, length: half });
        tree.node_mut(x).links.push(Link { to: v, length: half });
        tracing::trace!(u, v, attach = x, "splice opened");

        Ok(Splice { prune, target, slots: [u_slot, v_slot], length, committed: false })
    }

    pub fn tree(&self) -> &Tree {
        &*self.prune.tree
    }

    /// Newick of the reconstructed full tree.
    pub fn newick(&self) -> Result<String> {
        self.prune.tree.to_newick_unrooted(self.prune.attach)
    }

    /// Keep the regraft. This also finalizes the enclosing prune.
    pub fn commit(mut self) {
        self.committed = true;
        self.prune.committed = true;
    }

    pub fn rollback(self) {}
}

impl Drop for Splice<'_, '_> {
    fn drop(&mut self) {
        if self.committed {
            return;
        }
        let Edge { inner: u, outer: v } = self.target;
        let [u_slot, v_slot] = self.slots;
        let attach = self.prune.attach;
        let tree = &mut *self.prune.tree;
        tree.node_mut(attach).links.truncate(1);
        tree.node_mut(u).links[u_slot] = Link { to: v, length: self.length };
        tree.node_mut(v).links[v_slot] = Link { to: u, length: self.length };
        tracing::trace!(u, v, "splice reverted");
    }
}
