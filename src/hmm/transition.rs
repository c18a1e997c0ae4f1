//! Composite transition matrix over a state space.
//!
//! The composite HMM is the product machine of the per-branch pairwise
//! HMMs: a transition multiplies, over every subset branch, either the
//! pairwise transition into that branch's next sub-state (when the branch
//! has a column in the target state) or a carry factor that forbids the
//! stored memory from changing while the branch is silent. Only legal
//! composite states get rows and columns; illegal bit patterns are not
//! representable here at all.

use ndarray::Array2;

use crate::hmm::space::StateSpace;
use crate::hmm::state::{CompositeState, PairState};
use crate::model::indel::PairHmm;

/// Transition probability between two composite states, given one pairwise
/// HMM per subset branch.
pub fn transition(
    space: &StateSpace,
    from: &CompositeState,
    to: &CompositeState,
    hmms: &[PairHmm],
) -> f64 {
    debug_assert_eq!(hmms.len(), space.shape().n_branches());
    let mut p = 1.0;
    for b in 0..space.shape().n_branches() {
        let s1 = from.substate(b);
        let s2 = to.substate(b);
        if to.branch_not_present(b) {
            // Silent branch: the carried memory must pass through unchanged.
            if s1 != s2 {
                return 0.0;
            }
        } else {
            p *= hmms[b].q(s1.pair_state(), s2.pair_state());
        }
    }
    p
}

/// Build the full `(n+1) x (n+1)` transition matrix over the legal states
/// plus the End state (last row/column). End is absorbing.
pub fn create_q(space: &StateSpace, hmms: &[PairHmm]) -> Array2<f64> {
    let n = space.len();
    let nb = space.shape().n_branches();
    let mut q = Array2::zeros((n + 1, n + 1));
    for s1 in 0..n {
        let from = space.state(s1);
        for s2 in 0..n {
            q[[s1, s2]] = transition(space, &from, &space.state(s2), hmms);
        }
        q[[s1, n]] = (0..nb)
            .map(|b| hmms[b].q(from.substate(b).pair_state(), PairState::End))
            .product();
    }
    q[[n, n]] = 1.0;
    q
}

/// Start distribution over the legal states: the product of the pairwise
/// start distributions, silent branches drawing their carried memory from
/// the same distribution.
pub fn start_p(space: &StateSpace, hmms: &[PairHmm]) -> Vec<f64> {
    debug_assert_eq!(hmms.len(), space.shape().n_branches());
    (0..space.len())
        .map(|i| {
            let state = space.state(i);
            (0..space.shape().n_branches())
                .map(|b| hmms[b].start_pi(state.substate(b).pair_state()))
                .product()
        })
        .collect()
}
