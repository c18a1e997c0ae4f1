//! The full sampler state: alignment, tree, models and the cache view.
//!
//! `Parameters` is the only mutation path for branch lengths and the
//! alignment. Every setter recomputes the per-branch matrices it affects
//! and invalidates the matching cache entries in the same call, so a
//! mutated branch can never be read stale — there is no separate
//! invalidation step to forget. Cloning a `Parameters` is the cheap
//! proposal snapshot: models are shared, the cache token is copy-shared,
//! and a rejected proposal is simply dropped.

use std::rc::Rc;

use derivative::Derivative;

use crate::core::alignment::Alignment;
use crate::core::tree::Tree;
use crate::errors::{PhylignError, Result};
use crate::hmm::path::{self, Path};
use crate::hmm::space::StateSpace;
use crate::likelihood::cache::LikelihoodCache;
use crate::likelihood::peel::{self, BranchTransitions};
use crate::model::indel::{IndelModel, PairHmm};
use crate::model::subst::SubstModel;

#[derive(Derivative, Clone)]
#[derivative(Debug)]
pub struct Parameters {
    alignment: Alignment,
    tree: Tree,
    #[derivative(Debug = "ignore")]
    indel: Rc<dyn IndelModel>,
    #[derivative(Debug = "ignore")]
    subst: Rc<dyn SubstModel>,
    /// Per undirected branch, the pairwise alignment HMM for its length.
    branch_hmms: Vec<PairHmm>,
    /// Per undirected branch, the substitution transition matrices.
    transitions: BranchTransitions,
    cache: LikelihoodCache,
    /// Mean of the exponential prior on branch lengths.
    branch_mean: f64,
}

impl Parameters {
    pub fn new(
        alignment: Alignment,
        tree: Tree,
        indel: Rc<dyn IndelModel>,
        subst: Rc<dyn SubstModel>,
        branch_mean: f64,
    ) -> Result<Self> {
        if alignment.n_rows() != tree.n_nodes() {
            return Err(PhylignError::InitializationError(format!(
                "alignment has {} rows but the tree has {} nodes",
                alignment.n_rows(),
                tree.n_nodes()
            )));
        }
        if branch_mean <= 0.0 {
            return Err(PhylignError::InitializationError(format!(
                "branch length prior mean must be positive, got {branch_mean}"
            )));
        }
        let branch_hmms = (0..tree.n_branches())
            .map(|b| indel.branch_hmm(tree.branch_length(b)))
            .collect();
        let transitions = peel::branch_transitions(&tree, subst.as_ref());
        let cache = LikelihoodCache::new(
            &tree,
            subst.n_components(),
            subst.alphabet_size(),
            alignment.len(),
        );
        Ok(Self {
            alignment,
            tree,
            indel,
            subst,
            branch_hmms,
            transitions,
            cache,
            branch_mean,
        })
    }

    pub fn alignment(&self) -> &Alignment {
        &self.alignment
    }

    pub fn tree(&self) -> &Tree {
        &self.tree
    }

    pub fn cache(&self) -> &LikelihoodCache {
        &self.cache
    }

    pub fn cache_mut(&mut self) -> &mut LikelihoodCache {
        &mut self.cache
    }

    pub fn indel_model(&self) -> &dyn IndelModel {
        self.indel.as_ref()
    }

    pub fn subst_model(&self) -> &dyn SubstModel {
        self.subst.as_ref()
    }

    /// The pairwise HMM of undirected branch `b` at its current length.
    pub fn branch_hmm(&self, b: usize) -> &PairHmm {
        &self.branch_hmms[b % self.tree.n_branches()]
    }

    /// Pairwise HMMs for the subset branches spanned by `nodes`, in subset
    /// branch order, for feeding the composite transition builder.
    pub fn subset_hmms(&self, nodes: &[usize], space: &StateSpace) -> Result<Vec<PairHmm>> {
        let shape = space.shape();
        (0..shape.n_branches())
            .map(|b| {
                let (first, second) = shape.branch(b);
                let (u, v) = (nodes[first], nodes[second]);
                self.tree
                    .incident_branches(u)
                    .iter()
                    .copied()
                    .find(|&tb| self.tree.incident_branches(v).contains(&tb))
                    .map(|tb| self.branch_hmms[tb].clone())
                    .ok_or_else(|| {
                        PhylignError::InitializationError(format!(
                            "nodes {u} and {v} are not adjacent in the tree"
                        ))
                    })
            })
            .collect()
    }

    pub fn branch_mean(&self) -> f64 {
        self.branch_mean
    }

    /// Set branch `b` to length `length`: the branch HMM and transition
    /// matrices are recomputed and both cache directions downstream of the
    /// branch go stale, all in one step.
    pub fn set_branch_length(&mut self, b: usize, length: f64) {
        let b = b % self.tree.n_branches();
        log::debug!("branch {b} length -> {length}");
        self.tree.set_branch_length(b, length);
        self.branch_hmms[b] = self.indel.branch_hmm(length);
        self.transitions[b] = (0..self.subst.n_components())
            .map(|m| self.subst.transition_p(length, m))
            .collect();
        self.cache.invalidate_branch(&self.tree, b);
    }

    /// Replace the whole alignment; every branch goes stale.
    pub fn set_alignment(&mut self, alignment: Alignment) -> Result<()> {
        if alignment.n_rows() != self.tree.n_nodes() {
            return Err(PhylignError::InitializationError(format!(
                "alignment has {} rows but the tree has {} nodes",
                alignment.n_rows(),
                self.tree.n_nodes()
            )));
        }
        self.cache.set_length(alignment.len());
        self.alignment = alignment;
        self.cache.invalidate_all();
        Ok(())
    }

    /// Apply a resampled path for the sub-alignment of `nodes`. Branches
    /// that can see a subset node go stale; when the column count shifts,
    /// every cached column index moves and the whole cache goes stale.
    pub fn realign(
        &mut self,
        nodes: &[usize],
        new_path: &Path,
        seqs: &[Vec<u8>],
        space: &StateSpace,
    ) -> Result<()> {
        let old_length = self.alignment.len();
        let alignment = path::construct(&self.alignment, new_path, nodes, seqs, space)?;
        self.cache.set_length(alignment.len());
        if alignment.len() == old_length {
            for &n in nodes {
                self.cache.invalidate_node(&self.tree, n);
            }
        } else {
            self.cache.invalidate_all();
        }
        self.alignment = alignment;
        Ok(())
    }

    /// Total log-likelihood under the substitution model, peeling only the
    /// stale branches.
    pub fn log_likelihood(&self) -> f64 {
        peel::log_likelihood(
            &self.alignment,
            &self.tree,
            &self.transitions,
            self.subst.as_ref(),
            &self.cache,
        )
    }

    /// Log-prior of the branch lengths (independent exponentials) plus the
    /// indel model's length contribution for each leaf sequence.
    pub fn log_prior(&self) -> f64 {
        let branch_prior: f64 = (0..self.tree.n_branches())
            .map(|b| {
                let l = self.tree.branch_length(b);
                -l / self.branch_mean - self.branch_mean.ln()
            })
            .sum();
        let length_prior: f64 = (0..self.tree.n_nodes())
            .filter(|&n| self.tree.is_leaf(n))
            .map(|n| self.indel.lengthp(self.alignment.seqlength(n)))
            .sum();
        branch_prior + length_prior
    }

    pub fn log_probability(&self) -> f64 {
        self.log_prior() + self.log_likelihood()
    }
}
