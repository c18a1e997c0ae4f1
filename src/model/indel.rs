//! Insertion/deletion models.
//!
//! An indel model supplies, for any branch length, the pairwise alignment
//! HMM over {Match, Gap1, Gap2, End} for that branch. The alignment-HMM
//! core consumes nothing else from the model layer, so concrete models stay
//! behind the [`IndelModel`] trait object.
//!
//! In a branch HMM the first sequence plays the ancestor: Gap1 emits only
//! the ancestor (a deletion), Gap2 only the descendant (an insertion).

use derive_more::{Deref, DerefMut};
use ndarray::Array2;

use crate::errors::{PhylignError, Result};
use crate::hmm::state::PairState;

/// Pairwise transition matrix over {Match, Gap1, Gap2, End} plus the start
/// distribution.
#[derive(Clone, Debug, Deref, DerefMut, PartialEq)]
pub struct PairHmm {
    #[deref]
    #[deref_mut]
    q: Array2<f64>,
    start_pi: [f64; PairState::COUNT],
}

impl PairHmm {
    pub fn new(q: Array2<f64>, start_pi: [f64; PairState::COUNT]) -> Self {
        assert_eq!(q.dim(), (PairState::COUNT, PairState::COUNT));
        Self { q, start_pi }
    }

    /// Number of emitting states (End excluded).
    pub fn n_states(&self) -> usize {
        self.q.nrows() - 1
    }

    #[inline]
    pub fn q(&self, from: PairState, to: PairState) -> f64 {
        self.q[[from.index(), to.index()]]
    }

    #[inline]
    pub fn start_pi(&self, s: PairState) -> f64 {
        self.start_pi[s.index()]
    }

    /// Probability of being in state `s` one transition after the start.
    pub fn start(&self, s: PairState) -> f64 {
        (0..PairState::COUNT)
            .map(|j| self.start_pi[j] * self.q[[j, s.index()]])
            .sum()
    }
}

/// A generic insertion/deletion model.
pub trait IndelModel {
    /// Alignment distribution for a branch of time `t`.
    fn branch_hmm(&self, t: f64) -> PairHmm;

    /// Log-probability that a sequence has length `len` at equilibrium.
    fn lengthp(&self, len: usize) -> f64;

    fn name(&self) -> &'static str;
}

/// Time-independent affine gap model: one probability to open a gap, one to
/// extend it, one to end the alignment. The same HMM is used on every
/// branch.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct SimpleIndelModel {
    gap_open: f64,
    gap_extend: f64,
    end_prob: f64,
}

impl SimpleIndelModel {
    pub fn new(gap_open: f64, gap_extend: f64, end_prob: f64) -> Result<Self> {
        if !(0.0..0.5).contains(&gap_open)
            || !(0.0..1.0).contains(&gap_extend)
            || !(0.0..1.0).contains(&end_prob)
            || 1.0 - 2.0 * gap_open - end_prob <= 0.0
            || 1.0 - gap_extend - end_prob <= 0.0
        {
            return Err(PhylignError::InitializationError(format!(
                "inadmissible affine gap parameters: open={gap_open} extend={gap_extend} end={end_prob}"
            )));
        }
        Ok(Self {
            gap_open,
            gap_extend,
            end_prob,
        })
    }
}

impl IndelModel for SimpleIndelModel {
    fn branch_hmm(&self, _t: f64) -> PairHmm {
        let (d, e, tau) = (self.gap_open, self.gap_extend, self.end_prob);
        let q = Array2::from_shape_vec(
            (PairState::COUNT, PairState::COUNT),
            vec![
                1.0 - 2.0 * d - tau, d, d, tau, // from Match
                1.0 - e - tau, e, 0.0, tau, // from Gap1
                1.0 - e - tau, 0.0, e, tau, // from Gap2
                0.0, 0.0, 0.0, 1.0, // End is absorbing
            ],
        )
        .unwrap();
        PairHmm::new(q, [1.0 - 2.0 * d, d, d, 0.0])
    }

    fn lengthp(&self, len: usize) -> f64 {
        // Geometric sequence length with stopping probability end_prob.
        len as f64 * (1.0 - self.end_prob).ln() + self.end_prob.ln()
    }

    fn name(&self) -> &'static str {
        "simple-indel"
    }
}

/// The Thorne-Kishino-Felsenstein birth-death links model. Requires a
/// birth rate strictly below the death rate so sequence lengths stay
/// finite at equilibrium.
#[derive(Clone, Copy, Debug, PartialEq)]
pub struct Tkf1 {
    lambda: f64,
    mu: f64,
    time_dependent: bool,
}

impl Tkf1 {
    pub fn new(lambda: f64, mu: f64, time_dependent: bool) -> Result<Self> {
        if lambda <= 0.0 || mu <= 0.0 || lambda >= mu {
            return Err(PhylignError::InitializationError(format!(
                "TKF1 needs 0 < lambda < mu, got lambda={lambda} mu={mu}"
            )));
        }
        Ok(Self {
            lambda,
            mu,
            time_dependent,
        })
    }

    fn beta(&self, t: f64) -> f64 {
        let (l, m) = (self.lambda, self.mu);
        let e = ((l - m) * t).exp();
        (1.0 - e) / (m - l * e)
    }
}

impl IndelModel for Tkf1 {
    fn branch_hmm(&self, t: f64) -> PairHmm {
        let t = if self.time_dependent { t } else { 1.0 };
        let (l, m) = (self.lambda, self.mu);
        let kappa = l / m;
        let alpha = (-m * t).exp();
        let beta = self.beta(t);
        // Probability that a dead link left at least one descendant.
        let gamma = 1.0 - m * beta / (1.0 - alpha);

        let survive = |next: f64| next * kappa * alpha;
        let die = |next: f64| next * kappa * (1.0 - alpha);
        let end = |next: f64| next * (1.0 - kappa);

        let from_live = 1.0 - l * beta;
        let from_dead = 1.0 - gamma;
        let q = Array2::from_shape_vec(
            (PairState::COUNT, PairState::COUNT),
            vec![
                survive(from_live), die(from_live), l * beta, end(from_live), // from Match
                survive(from_dead), die(from_dead), gamma, end(from_dead), // from Gap1
                survive(from_live), die(from_live), l * beta, end(from_live), // from Gap2
                0.0, 0.0, 0.0, 1.0,
            ],
        )
        .unwrap();
        // The immortal link starts the chain like a surviving link.
        PairHmm::new(
            q,
            [survive(from_live), die(from_live), l * beta, end(from_live)],
        )
    }

    fn lengthp(&self, len: usize) -> f64 {
        let kappa = self.lambda / self.mu;
        len as f64 * kappa.ln() + (1.0 - kappa).ln()
    }

    fn name(&self) -> &'static str {
        "tkf1"
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assert_stochastic(hmm: &PairHmm) {
        for from in [PairState::Match, PairState::Gap1, PairState::Gap2, PairState::End] {
            let total: f64 = [
                PairState::Match,
                PairState::Gap1,
                PairState::Gap2,
                PairState::End,
            ]
            .iter()
            .map(|&to| hmm.q(from, to))
            .sum();
            assert!(
                (total - 1.0).abs() < 1e-12,
                "row {from:?} sums to {total}"
            );
        }
        let pi: f64 = (0..PairState::COUNT)
            .map(|i| hmm.start_pi[i])
            .sum();
        assert!((pi - 1.0).abs() < 1e-12);
    }

    #[test]
    fn simple_model_rows_are_stochastic() {
        let model = SimpleIndelModel::new(0.05, 0.4, 0.01).unwrap();
        assert_stochastic(&model.branch_hmm(0.3));
    }

    #[test]
    fn simple_model_rejects_bad_parameters() {
        assert!(SimpleIndelModel::new(0.6, 0.4, 0.01).is_err());
        assert!(SimpleIndelModel::new(0.05, 0.995, 0.01).is_err());
    }

    #[test]
    fn simple_model_ignores_branch_length() {
        let model = SimpleIndelModel::new(0.05, 0.4, 0.01).unwrap();
        assert_eq!(model.branch_hmm(0.1), model.branch_hmm(2.0));
    }

    #[test]
    fn tkf1_rows_are_stochastic() {
        let model = Tkf1::new(0.1, 0.12, true).unwrap();
        for t in [0.01, 0.1, 1.0, 5.0] {
            assert_stochastic(&model.branch_hmm(t));
        }
    }

    #[test]
    fn tkf1_gaps_grow_with_time() {
        let model = Tkf1::new(0.1, 0.12, true).unwrap();
        let short = model.branch_hmm(0.01);
        let long = model.branch_hmm(2.0);
        assert!(
            short.q(PairState::Match, PairState::Match)
                > long.q(PairState::Match, PairState::Match)
        );
        assert!(
            short.q(PairState::Match, PairState::Gap1)
                < long.q(PairState::Match, PairState::Gap1)
        );
    }

    #[test]
    fn tkf1_time_independent_flag() {
        let model = Tkf1::new(0.1, 0.12, false).unwrap();
        assert_eq!(model.branch_hmm(0.1), model.branch_hmm(3.0));
    }

    #[test]
    fn tkf1_rejects_growing_sequences() {
        assert!(Tkf1::new(0.2, 0.1, true).is_err());
        assert!(Tkf1::new(0.1, 0.1, true).is_err());
    }

    #[test]
    fn lengthp_decreases_with_length() {
        let model = Tkf1::new(0.1, 0.12, true).unwrap();
        assert!(model.lengthp(10) > model.lengthp(100));
        let simple = SimpleIndelModel::new(0.05, 0.4, 0.01).unwrap();
        assert!(simple.lengthp(10) > simple.lengthp(100));
    }
}
