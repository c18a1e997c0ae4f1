//! Token-based conditional-likelihood cache.
//!
//! Storage is organized as *locations*: one matrix block per directed
//! branch, shaped (columns x mixture components x alphabet size). A
//! *token* maps every directed branch to a location and stands for one
//! live copy of the sampler state. Copying a token shares all locations
//! (reference count increment, no data copied); invalidating a branch on a
//! shared location forks it onto a fresh exclusive one, leaving the other
//! tokens' views untouched. A location's contents may only be written
//! while its reference count is 1, and only stale locations are ever
//! rewritten — the cache fails loudly on any other access instead of
//! returning numbers that might be wrong.

use std::cell::RefCell;
use std::rc::Rc;

use derive_more::{Deref, DerefMut};
use ndarray::Array2;

use crate::core::tree::Tree;

#[derive(Debug)]
pub struct MultiLikelihoodCache {
    /// Per location, one (components x alphabet) matrix per column.
    locations: Vec<Vec<Array2<f64>>>,
    n_uses: Vec<usize>,
    up_to_date: Vec<bool>,
    unused_locations: Vec<usize>,
    /// token -> directed branch -> location
    mapping: Vec<Vec<usize>>,
    active: Vec<bool>,
    lengths: Vec<usize>,
    /// Global column capacity; grows, never shrinks.
    columns: usize,
    n_components: usize,
    alphabet_size: usize,
}

impl MultiLikelihoodCache {
    pub fn new(n_components: usize, alphabet_size: usize) -> Self {
        Self {
            locations: Vec::new(),
            n_uses: Vec::new(),
            up_to_date: Vec::new(),
            unused_locations: Vec::new(),
            mapping: Vec::new(),
            active: Vec::new(),
            lengths: Vec::new(),
            columns: 0,
            n_components,
            alphabet_size,
        }
    }

    pub fn n_components(&self) -> usize {
        self.n_components
    }

    pub fn alphabet_size(&self) -> usize {
        self.alphabet_size
    }

    fn blank_matrix(&self) -> Array2<f64> {
        Array2::zeros((self.n_components, self.alphabet_size))
    }

    fn get_unused_location(&mut self) -> usize {
        assert!(
            !self.unused_locations.is_empty(),
            "no free cache locations left"
        );
        let loc = self.unused_locations.pop().unwrap();
        assert_eq!(self.n_uses[loc], 0);
        self.n_uses[loc] = 1;
        self.up_to_date[loc] = false;
        loc
    }

    fn release_location(&mut self, loc: usize) {
        assert!(
            self.n_uses[loc] > 0,
            "released cache location {loc} with zero reference count"
        );
        self.n_uses[loc] -= 1;
        if self.n_uses[loc] == 0 {
            self.unused_locations.push(loc);
        }
    }

    /// Allocate space for `s` new locations.
    fn allocate(&mut self, s: usize) {
        let old_size = self.locations.len();
        log::debug!("likelihood cache grows by {s} locations to {}", old_size + s);
        for i in 0..s {
            let location = (0..self.columns).map(|_| self.blank_matrix()).collect();
            self.locations.push(location);
            self.n_uses.push(0);
            self.up_to_date.push(false);
            self.unused_locations.push(old_size + i);
        }
    }

    pub fn validate_branch(&mut self, token: usize, branch: usize) {
        let loc = self.mapping[token][branch];
        self.up_to_date[loc] = true;
    }

    pub fn is_up_to_date(&self, token: usize, branch: usize) -> bool {
        self.up_to_date[self.mapping[token][branch]]
    }

    /// Make (token, branch) stale without touching any other token: fork
    /// off a fresh exclusive location when the current one is shared,
    /// otherwise mark it stale in place.
    pub fn invalidate_one_branch(&mut self, token: usize, branch: usize) {
        let loc = self.mapping[token][branch];
        if self.n_uses[loc] > 1 {
            self.release_location(loc);
            self.mapping[token][branch] = self.get_unused_location();
        } else {
            self.up_to_date[loc] = false;
        }
    }

    pub fn invalidate_all(&mut self, token: usize) {
        for branch in 0..self.mapping[token].len() {
            self.invalidate_one_branch(token, branch);
        }
    }

    /// Grow the column capacity to hold `length` alignment columns; the
    /// reservation is monotonic so repeated alignment-length moves do not
    /// thrash the allocator.
    pub fn set_length(&mut self, token: usize, length: usize) {
        if length > self.columns {
            let delta = length - self.columns;
            self.columns = length;
            for loc in 0..self.locations.len() {
                for _ in 0..delta {
                    let matrix = self.blank_matrix();
                    self.locations[loc].push(matrix);
                }
            }
        }
        self.lengths[token] = length;
    }

    pub fn length(&self, token: usize) -> usize {
        self.lengths[token]
    }

    fn find_free_token(&self) -> Option<usize> {
        self.active.iter().position(|&a| !a)
    }

    fn add_token(&mut self, branches: usize) -> usize {
        let token = self.active.len();
        self.active.push(false);
        self.lengths.push(0);
        self.mapping.push(vec![0; branches]);
        self.allocate(branches);
        token
    }

    /// Obtain a token sized for `branches` directed branches and `columns`
    /// alignment columns, reusing a released token when one is available.
    pub fn claim_token(&mut self, columns: usize, branches: usize) -> usize {
        let token = match self.find_free_token() {
            Some(token) => {
                assert_eq!(self.mapping[token].len(), branches);
                token
            }
            None => self.add_token(branches),
        };
        self.set_length(token, columns);
        self.active[token] = true;
        log::trace!("claimed cache token {token}");
        token
    }

    /// Give each of the token's branch slots a fresh exclusive location.
    pub fn init_token(&mut self, token: usize) {
        for branch in 0..self.mapping[token].len() {
            self.mapping[token][branch] = self.get_unused_location();
        }
    }

    /// Point `token`'s slots at the same locations as `source`: the O(1)
    /// snapshot taken when a proposal clones the sampler state.
    pub fn copy_token(&mut self, token: usize, source: usize) {
        assert_eq!(self.mapping[token].len(), self.mapping[source].len());
        self.mapping[token] = self.mapping[source].clone();
        let length = self.lengths[source];
        self.set_length(token, length);
        for branch in 0..self.mapping[token].len() {
            let loc = self.mapping[token][branch];
            self.n_uses[loc] += 1;
        }
    }

    pub fn release_token(&mut self, token: usize) {
        for branch in 0..self.mapping[token].len() {
            let loc = self.mapping[token][branch];
            self.release_location(loc);
        }
        self.active[token] = false;
        log::trace!("released cache token {token}");
    }

    /// Read access to an up-to-date branch matrix block. Reading a stale
    /// entry would silently corrupt the inference, so it aborts instead.
    pub fn branch_likelihoods(&self, token: usize, branch: usize) -> &[Array2<f64>] {
        let loc = self.mapping[token][branch];
        assert!(
            self.up_to_date[loc],
            "read of stale likelihoods for branch {branch} on token {token}"
        );
        &self.locations[loc]
    }

    /// Write access for recomputation; the location must be exclusively
    /// owned, which `invalidate_one_branch` guarantees after a fork.
    pub fn branch_likelihoods_mut(&mut self, token: usize, branch: usize) -> &mut [Array2<f64>] {
        let loc = self.mapping[token][branch];
        assert_eq!(
            self.n_uses[loc], 1,
            "mutation of shared cache location {loc} (branch {branch}, token {token})"
        );
        &mut self.locations[loc]
    }

    /// The location a branch maps to; stable identity for sharing tests.
    pub fn location_of(&self, token: usize, branch: usize) -> usize {
        self.mapping[token][branch]
    }

    pub fn use_count(&self, token: usize, branch: usize) -> usize {
        self.n_uses[self.mapping[token][branch]]
    }

    pub fn n_free_locations(&self) -> usize {
        self.unused_locations.len()
    }

    pub fn n_locations(&self) -> usize {
        self.locations.len()
    }
}

/// One Parameters object's view into the shared cache: a claimed token
/// plus the tree-aware invalidation closures. Cloning claims a new token
/// that shares every location with the source; dropping releases it.
#[derive(Debug, Deref, DerefMut)]
pub struct LikelihoodCache {
    #[deref]
    #[deref_mut]
    cache: Rc<RefCell<MultiLikelihoodCache>>,
    token: usize,
    branches: usize,
    /// The node the pruning recursion peels toward.
    pub root: usize,
}

impl LikelihoodCache {
    pub fn new(tree: &Tree, n_components: usize, alphabet_size: usize, columns: usize) -> Self {
        let cache = Rc::new(RefCell::new(MultiLikelihoodCache::new(
            n_components,
            alphabet_size,
        )));
        let branches = tree.n_directed_branches();
        let token = {
            let mut inner = cache.borrow_mut();
            let token = inner.claim_token(columns, branches);
            inner.init_token(token);
            token
        };
        Self {
            cache,
            token,
            branches,
            root: tree.n_nodes() - 1,
        }
    }

    pub fn token(&self) -> usize {
        self.token
    }

    pub fn length(&self) -> usize {
        self.cache.borrow().length(self.token)
    }

    pub fn set_length(&self, columns: usize) {
        self.cache.borrow_mut().set_length(self.token, columns);
    }

    pub fn is_up_to_date(&self, branch: usize) -> bool {
        self.cache.borrow().is_up_to_date(self.token, branch)
    }

    pub fn validate_branch(&self, branch: usize) {
        self.cache.borrow_mut().validate_branch(self.token, branch);
    }

    pub fn invalidate_all(&self) {
        self.cache.borrow_mut().invalidate_all(self.token);
    }

    /// Invalidate every branch whose conditional likelihood depends on
    /// directed branch `d`.
    pub fn invalidate_directed_branch(&self, tree: &Tree, d: usize) {
        let mut cache = self.cache.borrow_mut();
        for branch in tree.branches_after(d) {
            cache.invalidate_one_branch(self.token, branch);
        }
    }

    /// Invalidate both directions of undirected branch `b` and everything
    /// downstream of them.
    pub fn invalidate_branch(&self, tree: &Tree, b: usize) {
        self.invalidate_directed_branch(tree, b);
        self.invalidate_directed_branch(tree, tree.reverse(b));
    }

    /// Invalidate every branch that can see node `n`.
    pub fn invalidate_node(&self, tree: &Tree, n: usize) {
        let mut cache = self.cache.borrow_mut();
        for branch in tree.branches_from_node(n) {
            cache.invalidate_one_branch(self.token, branch);
        }
    }

    /// After an alignment change on branch `b`: the branches beyond `b` in
    /// both directions go stale, but `b`'s own transition matrices are
    /// untouched, so `b` itself is skipped.
    pub fn invalidate_branch_alignment(&self, tree: &Tree, b: usize) {
        let mut cache = self.cache.borrow_mut();
        for direction in [b, tree.reverse(b)] {
            for branch in tree.branches_after(direction).into_iter().skip(1) {
                cache.invalidate_one_branch(self.token, branch);
            }
        }
    }
}

impl Clone for LikelihoodCache {
    fn clone(&self) -> Self {
        let length = self.length();
        let token = {
            let mut inner = self.cache.borrow_mut();
            let token = inner.claim_token(length, self.branches);
            inner.copy_token(token, self.token);
            token
        };
        Self {
            cache: Rc::clone(&self.cache),
            token,
            branches: self.branches,
            root: self.root,
        }
    }
}

impl Drop for LikelihoodCache {
    fn drop(&mut self) {
        self.cache.borrow_mut().release_token(self.token);
    }
}

/// Move the peeling root to an end of branch `b`, keeping it on the side
/// it already was when possible so fewer branches need repeeling.
pub fn select_root(tree: &Tree, b: usize, cache: &mut LikelihoodCache) {
    let mut d = b;
    let r = tree.reverse(b);
    if tree.subtree_contains(r, cache.root) {
        d = r;
    }
    cache.root = tree.target(d);
}
