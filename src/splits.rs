//! Bipartition identity for every edge of a tree, indexed for lookup by tip set.
//!
//! # What is a split?
//! Removing one edge from an unrooted tree cuts its tips into two groups:
//! ```text
//!    A           C
//!     \         /
//!      x ----- y        the x–y edge induces {A,B} | {C,D}
//!     /         \
//!    B           D
//! ```
//! A split is stored as a [`Bitset`] over the tips sorted by name.
//!
//! # Canonical orientation
//! Each bipartition has two sides, so it could be stored two ways. We always
//! store the side that does NOT contain tip 0 (the lexicographically smallest
//! name). The same rule is applied to lookups: a queried tip set containing
//! tip 0 is complemented before the lookup, and the returned [`Edge`] is
//! flipped back so that it still points at the queried side. A split absent
//! from the index is an error; there is no second attempt with the
//! complement.

use std::collections::HashMap;

use itertools::Itertools;

use crate::bitset::Bitset;
use crate::error::{ReplayError, Result};
use crate::tree::{NodeId, Tree};

/// An edge seen from one of its sides.
///
/// `inner` is the endpoint on the side holding the tips that named the edge,
/// `outer` the endpoint on the other side.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Hash)]
pub struct Edge {
    pub inner: NodeId,
    pub outer: NodeId,
}

impl Edge {
    /// The same edge seen from the other side.
    #[inline]
    pub fn flipped(self) -> Edge {
        Edge { inner: self.outer, outer: self.inner }
    }

    #[inline]
    pub fn touches(&self, id: NodeId) -> bool {
        self.inner == id || self.outer == id
    }
}

/// All splits of one tree generation.
///
/// # Fields
/// - `edges`: canonical split → edge, with `inner` on the canonical side
/// - `names`: tip names sorted ascending; bit `i` of a split is `names[i]`
#[derive(Debug, Clone)]
pub struct SplitIndex {
    edges: HashMap<Bitset, Edge>,
    names: Vec<String>,
}

impl SplitIndex {
    /// Index every edge of the current generation of `tree`.
    ///
    /// # Algorithm
    /// 1. Walk the tree from its anchor, collecting tips and the parent of
    ///    every node
    /// 2. Sort tip names; reject unnamed or duplicate tips
    /// 3. Bottom-up, OR the tip sets of children into their parent
    /// 4. Each non-anchor node closes the edge to its parent; canonicalize
    ///    the tip set below it and record the edge
    ///
    /// # Errors
    /// - `MalformedTree` if a tip has no name or two tips share one
    /// - `EmptyTree` if the tree has fewer than two tips
    pub fn compute(tree: &Tree) -> Result<Self> {
        let anchor = tree.anchor().ok_or(ReplayError::EmptyTree { tips: 0 })?;

        // Step 1: preorder walk recording each node's parent
        let mut order: Vec<(NodeId, Option<NodeId>)> = Vec::new();
        let mut stack = vec![(anchor, None)];
        while let Some((id, parent)) = stack.pop() {
            order.push((id, parent));
            for link in &tree[id].links {
                if Some(link.to) != parent {
                    stack.push((link.to, Some(id)));
                }
            }
        }

        // Step 2: sorted, unique tip names
        let mut names = Vec::new();
        for &(id, _) in &order {
            let node = &tree[id];
            if !node.is_leaf() {
                continue;
            }
            match &node.name {
                Some(name) => names.push(name.clone()),
                None => return Err(ReplayError::MalformedTree(format!("tip node {id} has no name"))),
            }
        }
        if names.len() < 2 {
            return Err(ReplayError::EmptyTree { tips: names.len() });
        }
        names.sort();
        if let Some((dup, _)) = names.iter().tuple_windows().find(|(a, b)| a == b) {
            return Err(ReplayError::MalformedTree(format!("tip name '{dup}' is not unique")));
        }

        let num_tips = names.len();
        let words = Bitset::words_for(num_tips);

        // Step 3 and 4: bottom-up tip sets, one split per edge
        let mut below: HashMap<NodeId, Bitset> = HashMap::with_capacity(order.len());
        let mut edges = HashMap::with_capacity(order.len());
        for &(id, parent) in order.iter().rev() {
            let mut bits = below.remove(&id).unwrap_or_else(|| Bitset::zeros(words));
            if let Some(name) = tree[id].name.as_ref().filter(|_| tree[id].is_leaf()) {
                if let Ok(idx) = names.binary_search(name) {
                    bits.set(idx);
                }
            }

            let Some(parent) = parent else { continue };
            let (split, edge) = if bits.get(0) {
                (bits.complement(num_tips), Edge { inner: parent, outer: id })
            } else {
                (bits.clone(), Edge { inner: id, outer: parent })
            };
            if edges.insert(split, edge).is_some() {
                return Err(ReplayError::MalformedTree(format!(
                    "edge {parent}-{id} repeats the split of another edge"
                )));
            }

            below
                .entry(parent)
                .or_insert_with(|| Bitset::zeros(words))
                .or_assign(&bits);
        }

        tracing::debug!(edges = edges.len(), tips = num_tips, "built split index");
        Ok(SplitIndex { edges, names })
    }

    /// Tip names of the indexed tree, sorted.
    pub fn names(&self) -> &[String] {
        &self.names
    }

    /// Number of indexed edges.
    pub fn len(&self) -> usize {
        self.edges.len()
    }

    pub fn is_empty(&self) -> bool {
        self.edges.is_empty()
    }

    /// Canonical split for a set of tip names.
    ///
    /// Returns the split and whether the queried side had to be
    /// complemented. Names are located by binary search in the sorted name
    /// list.
    ///
    /// # Errors
    /// `UnknownTip` for a name that is not a tip of the indexed tree.
    pub fn canonical_split<S: AsRef<str>>(&self, tips: &[S]) -> Result<(Bitset, bool)> {
        let mut split = Bitset::zeros(Bitset::words_for(self.names.len()));
        for tip in tips {
            let tip = tip.as_ref();
            let idx = self
                .names
                .binary_search_by(|n| n.as_str().cmp(tip))
                .map_err(|_| ReplayError::UnknownTip(tip.to_string()))?;
            split.set(idx);
        }

        if split.get(0) {
            Ok((split.complement(self.names.len()), true))
        } else {
            Ok((split, false))
        }
    }

    /// The edge whose split is exactly `tips` | rest.
    ///
    /// The returned edge has `inner` on the side of `tips`.
    ///
    /// # Errors
    /// - `UnknownTip` for a name not in the tree
    /// - `SplitNotFound` if no edge induces that bipartition
    pub fn resolve<S: AsRef<str>>(&self, tips: &[S]) -> Result<Edge> {
        let (split, flipped) = self.canonical_split(tips)?;
        match self.edges.get(&split) {
            Some(&edge) if flipped => Ok(edge.flipped()),
            Some(&edge) => Ok(edge),
            None => Err(ReplayError::SplitNotFound(
                tips.iter().map(|t| t.as_ref().to_string()).sorted().collect(),
            )),
        }
    }

    /// Every indexed split as the sorted tip names of its canonical side.
    pub fn splits(&self) -> Vec<Vec<String>> {
        self.edges
            .keys()
            .map(|split| split.ones().map(|i| self.names[i].clone()).collect::<Vec<_>>())
            .sorted()
            .collect()
    }

    /// Canonical split and edge pairs, in no particular order.
    pub fn iter(&self) -> impl Iterator<Item = (&Bitset, &Edge)> {
        self.edges.iter()
    }
}
