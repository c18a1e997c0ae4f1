//! Unrooted phylogenetic tree with directed-branch indexing.
//!
//! An undirected branch `b` in `0..B` owns a length; its two directions are
//! addressed as `b` and `b + B`. The conditional-likelihood cache stores one
//! entry per directed branch, so the traversal closures here
//! (`branches_after`, `branches_from_node`, `branches_toward`) define
//! exactly which cache entries a mutation invalidates and in which order
//! the pruning recursion peels.

use rand::Rng;
use rand::seq::SliceRandom;
use rand_distr::{Distribution, Exp};
use smallvec::SmallVec;

use crate::errors::{PhylignError, Result};

#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Branch {
    pub nodes: [usize; 2],
    pub length: f64,
}

#[derive(Clone, Debug, PartialEq)]
pub struct Tree {
    /// Per node, the undirected branches incident to it.
    adjacency: Vec<SmallVec<[usize; 3]>>,
    branches: Vec<Branch>,
}

impl Tree {
    /// Build a tree over `n_nodes` nodes from undirected weighted edges.
    pub fn from_branches(n_nodes: usize, edges: &[(usize, usize, f64)]) -> Result<Self> {
        if n_nodes == 0 || edges.len() + 1 != n_nodes {
            return Err(PhylignError::InitializationError(format!(
                "{} branches cannot form a tree over {} nodes",
                edges.len(),
                n_nodes
            )));
        }
        let mut adjacency = vec![SmallVec::new(); n_nodes];
        let mut branches = Vec::with_capacity(edges.len());
        for (i, &(u, v, length)) in edges.iter().enumerate() {
            if u >= n_nodes || v >= n_nodes || u == v {
                return Err(PhylignError::InitializationError(format!(
                    "invalid branch ({u},{v})"
                )));
            }
            adjacency[u].push(i);
            adjacency[v].push(i);
            branches.push(Branch {
                nodes: [u, v],
                length,
            });
        }
        let tree = Self {
            adjacency,
            branches,
        };
        if !tree.connected() {
            return Err(PhylignError::InitializationError(
                "branches do not connect all nodes".to_string(),
            ));
        }
        Ok(tree)
    }

    fn connected(&self) -> bool {
        let mut seen = vec![false; self.n_nodes()];
        let mut stack = vec![0];
        seen[0] = true;
        while let Some(n) = stack.pop() {
            for &b in &self.adjacency[n] {
                let m = self.other_end(b, n);
                if !seen[m] {
                    seen[m] = true;
                    stack.push(m);
                }
            }
        }
        seen.into_iter().all(|s| s)
    }

    pub fn n_nodes(&self) -> usize {
        self.adjacency.len()
    }

    pub fn n_branches(&self) -> usize {
        self.branches.len()
    }

    pub fn n_directed_branches(&self) -> usize {
        2 * self.branches.len()
    }

    pub fn is_leaf(&self, node: usize) -> bool {
        self.adjacency[node].len() == 1
    }

    pub fn degree(&self, node: usize) -> usize {
        self.adjacency[node].len()
    }

    pub fn neighbors(&self, node: usize) -> SmallVec<[usize; 3]> {
        self.adjacency[node]
            .iter()
            .map(|&b| self.other_end(b, node))
            .collect()
    }

    /// Undirected branches incident to `node`.
    pub fn incident_branches(&self, node: usize) -> &[usize] {
        &self.adjacency[node]
    }

    pub fn branch_length(&self, branch: usize) -> f64 {
        self.branches[branch % self.n_branches()].length
    }

    pub fn set_branch_length(&mut self, branch: usize, length: f64) {
        let b = branch % self.n_branches();
        self.branches[b].length = length;
    }

    fn other_end(&self, branch: usize, node: usize) -> usize {
        let [u, v] = self.branches[branch].nodes;
        if u == node { v } else { u }
    }

    /// Undirected index of a directed branch.
    pub fn undirected(&self, d: usize) -> usize {
        d % self.n_branches()
    }

    pub fn source(&self, d: usize) -> usize {
        let [u, v] = self.branches[d % self.n_branches()].nodes;
        if d < self.n_branches() { u } else { v }
    }

    pub fn target(&self, d: usize) -> usize {
        let [u, v] = self.branches[d % self.n_branches()].nodes;
        if d < self.n_branches() { v } else { u }
    }

    pub fn reverse(&self, d: usize) -> usize {
        (d + self.n_branches()) % self.n_directed_branches()
    }

    /// The direction of undirected branch `b` whose source is `source`.
    pub fn directed_from(&self, b: usize, source: usize) -> usize {
        let [u, v] = self.branches[b].nodes;
        debug_assert!(source == u || source == v);
        if source == u { b } else { b + self.n_branches() }
    }

    /// The direction of undirected branch `b` whose target is `target`.
    pub fn directed_toward(&self, b: usize, target: usize) -> usize {
        self.reverse(self.directed_from(b, target))
    }

    /// All directed branches at-or-beyond `d`: `d` first, then every branch
    /// pointing further away from `d`'s source. A change on `d` leaves
    /// exactly these cache entries stale.
    pub fn branches_after(&self, d: usize) -> Vec<usize> {
        let mut list = vec![d];
        let mut i = 0;
        while i < list.len() {
            let e = list[i];
            let t = self.target(e);
            for &b in &self.adjacency[t] {
                if b != self.undirected(e) {
                    list.push(self.directed_from(b, t));
                }
            }
            i += 1;
        }
        list
    }

    /// All directed branches whose source side contains `node` — the ones
    /// whose cached conditional likelihood depends on data at `node`.
    pub fn branches_from_node(&self, node: usize) -> Vec<usize> {
        let mut list = Vec::new();
        for &b in &self.adjacency[node] {
            list.extend(self.branches_after(self.directed_from(b, node)));
        }
        list
    }

    /// Directed branches pointing toward `root`, deepest first; peeling in
    /// this order sees every feeding branch before the branch it feeds.
    pub fn branches_toward(&self, root: usize) -> Vec<usize> {
        let mut list = self.branches_from_node(root);
        list.reverse();
        list.iter().map(|&d| self.reverse(d)).collect()
    }

    /// Directed branches feeding `d`: those whose target is `d`'s source.
    pub fn branches_into_source(&self, d: usize) -> SmallVec<[usize; 3]> {
        let u = self.source(d);
        self.adjacency[u]
            .iter()
            .filter(|&&b| b != self.undirected(d))
            .map(|&b| self.directed_toward(b, u))
            .collect()
    }

    /// Is `node` on the target side of directed branch `d`?
    pub fn subtree_contains(&self, d: usize, node: usize) -> bool {
        let cut = self.undirected(d);
        let mut seen = vec![false; self.n_nodes()];
        let mut stack = vec![self.target(d)];
        seen[self.target(d)] = true;
        while let Some(n) = stack.pop() {
            if n == node {
                return true;
            }
            for &b in &self.adjacency[n] {
                let m = self.other_end(b, n);
                if b != cut && !seen[m] {
                    seen[m] = true;
                    stack.push(m);
                }
            }
        }
        false
    }

    /// The node subset for the three-way alignment HMM around internal node
    /// `n0`: the node itself, then its three neighbors.
    pub fn three_way_nodes(&self, n0: usize) -> Result<[usize; 4]> {
        let neighbors = self.neighbors(n0);
        if neighbors.len() != 3 {
            return Err(PhylignError::InitializationError(format!(
                "node {n0} has degree {}, three-way HMM needs an internal node",
                neighbors.len()
            )));
        }
        Ok([n0, neighbors[0], neighbors[1], neighbors[2]])
    }

    /// Three-way nodes with the neighbor order randomized.
    pub fn three_way_nodes_random<R: Rng>(&self, n0: usize, rng: &mut R) -> Result<[usize; 4]> {
        let mut nodes = self.three_way_nodes(n0)?;
        nodes[1..].shuffle(rng);
        Ok(nodes)
    }

    /// Three-way nodes with `n1` forced into the first neighbor slot.
    pub fn three_way_nodes_branch_random<R: Rng>(
        &self,
        n0: usize,
        n1: usize,
        rng: &mut R,
    ) -> Result<[usize; 4]> {
        let mut nodes = self.three_way_nodes_random(n0, rng)?;
        let pos = nodes[1..]
            .iter()
            .position(|&n| n == n1)
            .ok_or_else(|| {
                PhylignError::InitializationError(format!("{n1} is not a neighbor of {n0}"))
            })?;
        nodes.swap(1, 1 + pos);
        Ok(nodes)
    }

    /// The node subset for the five-way alignment HMM across internal
    /// branch `b` with endpoints (x, y): the two outer neighbors of x, the
    /// two outer neighbors of y, then x and y.
    pub fn five_way_nodes(&self, b: usize) -> Result<[usize; 6]> {
        let [x, y] = self.branches[b % self.n_branches()].nodes;
        let xs: SmallVec<[usize; 3]> =
            self.neighbors(x).into_iter().filter(|&n| n != y).collect();
        let ys: SmallVec<[usize; 3]> =
            self.neighbors(y).into_iter().filter(|&n| n != x).collect();
        if xs.len() != 2 || ys.len() != 2 {
            return Err(PhylignError::InitializationError(format!(
                "branch {b} is not internal, five-way HMM needs two degree-3 endpoints"
            )));
        }
        Ok([xs[0], xs[1], ys[0], ys[1], x, y])
    }

    /// Five-way nodes with the outer pairs independently shuffled.
    pub fn five_way_nodes_random<R: Rng>(&self, b: usize, rng: &mut R) -> Result<[usize; 6]> {
        let mut nodes = self.five_way_nodes(b)?;
        if rng.random_bool(0.5) {
            nodes.swap(0, 1);
        }
        if rng.random_bool(0.5) {
            nodes.swap(2, 3);
        }
        Ok(nodes)
    }

    /// Are all present nodes mutually reachable without crossing a node
    /// that is neither present nor ignored?
    pub fn all_characters_connected(&self, present: &[bool], ignore: &[usize]) -> bool {
        debug_assert_eq!(present.len(), self.n_nodes());
        let mut passable = present.to_vec();
        for &n in ignore {
            passable[n] = true;
        }
        let start = match (0..self.n_nodes()).find(|&n| present[n]) {
            Some(n) => n,
            None => return true,
        };
        let mut seen = vec![false; self.n_nodes()];
        let mut stack = vec![start];
        seen[start] = true;
        while let Some(n) = stack.pop() {
            for &b in &self.adjacency[n] {
                let m = self.other_end(b, n);
                if passable[m] && !seen[m] {
                    seen[m] = true;
                    stack.push(m);
                }
            }
        }
        (0..self.n_nodes()).all(|n| !present[n] || seen[n])
    }

    /// A random unrooted binary tree over `n_leaves` leaves with
    /// exponentially distributed branch lengths of the given mean. Leaves
    /// are nodes `0..n_leaves`, internal nodes follow.
    pub fn random<R: Rng>(n_leaves: usize, mean_length: f64, rng: &mut R) -> Result<Self> {
        if n_leaves < 2 {
            return Err(PhylignError::InitializationError(
                "a tree needs at least two leaves".to_string(),
            ));
        }
        let exp = Exp::new(1.0 / mean_length).map_err(|e| {
            PhylignError::InitializationError(format!("bad branch length mean: {e}"))
        })?;
        let mut sample = |rng: &mut R| exp.sample(rng);

        if n_leaves == 2 {
            return Self::from_branches(2, &[(0, 1, sample(rng))]);
        }

        // Start from a star over the first three leaves, then split a
        // random branch for each further leaf.
        let n_nodes = 2 * n_leaves - 2;
        let mut next_internal = n_leaves;
        let mut edges: Vec<(usize, usize, f64)> = (0..3)
            .map(|leaf| (leaf, next_internal, sample(rng)))
            .collect();
        next_internal += 1;

        for leaf in 3..n_leaves {
            let split = rng.random_range(0..edges.len());
            let (u, v, length) = edges[split];
            let hub = next_internal;
            next_internal += 1;
            edges[split] = (u, hub, length / 2.0);
            edges.push((hub, v, length / 2.0));
            edges.push((leaf, hub, sample(rng)));
        }

        Self::from_branches(n_nodes, &edges)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    /// Four leaves (0..4), two internal nodes (4, 5):
    /// 0-4, 1-4, 4-5, 5-2, 5-3.
    fn quartet() -> Tree {
        Tree::from_branches(
            6,
            &[
                (0, 4, 0.1),
                (1, 4, 0.2),
                (4, 5, 0.3),
                (5, 2, 0.4),
                (5, 3, 0.5),
            ],
        )
        .unwrap()
    }

    #[test]
    fn rejects_non_trees() {
        assert!(Tree::from_branches(3, &[(0, 1, 1.0)]).is_err());
        assert!(Tree::from_branches(4, &[(0, 1, 1.0), (2, 3, 1.0), (0, 1, 1.0)]).is_err());
    }

    #[test]
    fn directed_branch_indexing() {
        let t = quartet();
        assert_eq!(t.n_directed_branches(), 10);
        assert_eq!(t.source(2), 4);
        assert_eq!(t.target(2), 5);
        assert_eq!(t.source(t.reverse(2)), 5);
        assert_eq!(t.target(t.reverse(2)), 4);
        assert_eq!(t.reverse(t.reverse(2)), 2);
        assert_eq!(t.directed_from(2, 5), 7);
        assert_eq!(t.directed_toward(2, 5), 2);
    }

    #[test]
    fn branches_after_crosses_the_far_hub() {
        let t = quartet();
        // After 0->4 comes everything pointing further away from leaf 0.
        let after = t.branches_after(0);
        assert_eq!(after[0], 0);
        // 4->1 direction is 1+B = 6, 4->5 is 2, then 5->2 (3) and 5->3 (4).
        assert_eq!(after.len(), 5);
        assert!(after.contains(&6));
        assert!(after.contains(&2));
        assert!(after.contains(&3));
        assert!(after.contains(&4));
    }

    #[test]
    fn branches_from_node_covers_every_outward_direction() {
        let t = quartet();
        let from_leaf = t.branches_from_node(0);
        assert_eq!(from_leaf.len(), 5);
        let from_hub = t.branches_from_node(4);
        // Away from node 4: 4->0, 4->1, 4->5, 5->2, 5->3.
        assert_eq!(from_hub.len(), 5);
        assert!(from_hub.contains(&5));
        assert!(from_hub.contains(&6));
        assert!(from_hub.contains(&2));
    }

    #[test]
    fn peeling_order_feeds_before_reading() {
        let t = quartet();
        let order = t.branches_toward(5);
        assert_eq!(order.len(), 5);
        for (i, &d) in order.iter().enumerate() {
            for &feed in &t.branches_into_source(d) {
                let fed_pos = order.iter().position(|&e| e == feed).unwrap();
                assert!(fed_pos < i, "branch {d} read before its feed {feed}");
            }
        }
        // Everything points toward the root.
        for &d in &order {
            assert!(t.subtree_contains(d, 5));
        }
    }

    #[test]
    fn subtree_contains_splits_at_the_branch() {
        let t = quartet();
        assert!(t.subtree_contains(2, 2)); // 4->5 side holds leaf 2
        assert!(!t.subtree_contains(2, 0));
        assert!(t.subtree_contains(t.reverse(2), 0));
    }

    #[test]
    fn node_subsets() {
        let t = quartet();
        assert_eq!(t.three_way_nodes(4).unwrap(), [4, 0, 1, 5]);
        assert!(t.three_way_nodes(0).is_err());
        assert_eq!(t.five_way_nodes(2).unwrap(), [0, 1, 2, 3, 4, 5]);
        assert!(t.five_way_nodes(0).is_err());
    }

    #[test]
    fn connectivity_respects_absent_nodes() {
        let t = quartet();
        // Leaves 0 and 1 connect through absent hub 4 only if 4 is ignored.
        let mut present = vec![false; 6];
        present[0] = true;
        present[1] = true;
        assert!(!t.all_characters_connected(&present, &[]));
        assert!(t.all_characters_connected(&present, &[4]));
        // Adding the hub as present connects them outright.
        present[4] = true;
        assert!(t.all_characters_connected(&present, &[]));
    }

    #[test]
    fn random_tree_shape() {
        let mut rng = StdRng::seed_from_u64(42);
        let t = Tree::random(5, 0.1, &mut rng).unwrap();
        assert_eq!(t.n_nodes(), 8);
        assert_eq!(t.n_branches(), 7);
        for leaf in 0..5 {
            assert!(t.is_leaf(leaf));
        }
        for b in 0..t.n_branches() {
            assert!(t.branch_length(b) > 0.0);
        }
    }
}
