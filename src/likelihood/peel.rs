//! Felsenstein pruning over the cached branch matrices.
//!
//! The conditional likelihood of directed branch `d` (source u, target v)
//! holds, per column, mixture component and character y, the probability
//! of the observed data on u's side of the branch given character y at v.
//! Peeling walks the branches toward the root deepest-first, recomputing
//! only the stale ones, and combines the root's incoming branches with the
//! stationary frequencies.

use ndarray::Array2;

use crate::core::alignment::Alignment;
use crate::core::tree::Tree;
use crate::encoding::Cell;
use crate::likelihood::cache::{LikelihoodCache, MultiLikelihoodCache};
use crate::logsum::{LOG_ZERO, log_clamped, logsum};
use crate::model::subst::SubstModel;

/// Per undirected branch, per mixture component, the transition matrix for
/// that branch's current length. Owned by the Parameters object and
/// rebuilt whenever a branch length changes.
pub type BranchTransitions = Vec<Vec<Array2<f64>>>;

pub fn branch_transitions(tree: &Tree, model: &dyn SubstModel) -> BranchTransitions {
    (0..tree.n_branches())
        .map(|b| {
            (0..model.n_components())
                .map(|m| model.transition_p(tree.branch_length(b), m))
                .collect()
        })
        .collect()
}

/// The probability vector of the data at/below node `u` for one column and
/// component, before crossing the branch toward the root.
fn below(
    inner: &MultiLikelihoodCache,
    token: usize,
    tree: &Tree,
    alignment: &Alignment,
    d: usize,
    column: usize,
    m: usize,
    alphabet_size: usize,
) -> Vec<f64> {
    let u = tree.source(d);
    if tree.is_leaf(u) {
        match alignment.cell(column, u) {
            Cell::Letter(l) => {
                let mut v = vec![0.0; alphabet_size];
                v[l as usize] = 1.0;
                v
            }
            // Gaps and unknowns are missing data.
            Cell::Gap | Cell::Unknown => vec![1.0; alphabet_size],
        }
    } else {
        let mut v = vec![1.0; alphabet_size];
        for e in tree.branches_into_source(d) {
            let child = &inner.branch_likelihoods(token, e)[column];
            for (x, value) in v.iter_mut().enumerate() {
                *value *= child[[m, x]];
            }
        }
        v
    }
}

/// Recompute every stale branch on the way to the root and return the
/// total log-likelihood of the alignment's leaf data.
pub fn log_likelihood(
    alignment: &Alignment,
    tree: &Tree,
    transitions: &BranchTransitions,
    model: &dyn SubstModel,
    cache: &LikelihoodCache,
) -> f64 {
    let token = cache.token();
    let root = cache.root;
    let a = model.alphabet_size();
    let n_components = model.n_components();
    let columns = alignment.len();

    let mut inner = cache.borrow_mut();
    assert!(
        columns <= inner.length(token),
        "alignment outgrew the cache: call set_length before evaluating"
    );

    for d in tree.branches_toward(root) {
        if inner.is_up_to_date(token, d) {
            continue;
        }
        let p = &transitions[tree.undirected(d)];
        let mut computed: Vec<Array2<f64>> = Vec::with_capacity(columns);
        for column in 0..columns {
            let mut matrix = Array2::zeros((n_components, a));
            for m in 0..n_components {
                let data = below(&inner, token, tree, alignment, d, column, m, a);
                for y in 0..a {
                    matrix[[m, y]] = (0..a).map(|x| p[m][[y, x]] * data[x]).sum();
                }
            }
            computed.push(matrix);
        }
        let slot = inner.branch_likelihoods_mut(token, d);
        for (column, matrix) in computed.into_iter().enumerate() {
            slot[column] = matrix;
        }
        inner.validate_branch(token, d);
        log::trace!("peeled branch {d} toward root {root}");
    }

    let incoming: Vec<usize> = tree
        .incident_branches(root)
        .iter()
        .map(|&b| tree.directed_toward(b, root))
        .collect();

    let mut total = 0.0;
    for column in 0..columns {
        let mut log_column = LOG_ZERO;
        for m in 0..n_components {
            let pi = model.frequencies(m);
            let mut sum = 0.0;
            for x in 0..a {
                let mut product = pi[x];
                if tree.is_leaf(root) {
                    if let Cell::Letter(l) = alignment.cell(column, root) {
                        if l as usize != x {
                            product = 0.0;
                        }
                    }
                }
                for &d in &incoming {
                    product *= inner.branch_likelihoods(token, d)[column][[m, x]];
                }
                sum += product;
            }
            log_column = logsum(
                log_column,
                model.component_weight(m).ln() + log_clamped(sum),
            );
        }
        total += log_column;
    }
    total
}
