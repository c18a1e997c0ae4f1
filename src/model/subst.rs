//! Narrow interface to the substitution-model layer.
//!
//! The alignment core only ever asks a substitution model three things:
//! how big the alphabet is, what the rate-mixture looks like, and what the
//! transition probabilities are across a branch of a given length. The
//! whole model catalogue stays behind this trait.

use ndarray::Array2;

use crate::errors::{PhylignError, Result};

pub trait SubstModel {
    fn alphabet_size(&self) -> usize;

    /// Number of rate-mixture components.
    fn n_components(&self) -> usize;

    fn component_weight(&self, m: usize) -> f64;

    /// Stationary character frequencies of component `m`.
    fn frequencies(&self, m: usize) -> Vec<f64>;

    /// Transition-probability matrix across a branch of length `t` under
    /// component `m`; rows are the start character.
    fn transition_p(&self, t: f64, m: usize) -> Array2<f64>;

    fn name(&self) -> &'static str;
}

/// Jukes-Cantor nucleotide model, optionally as a uniform mixture of
/// scaled-rate components.
#[derive(Clone, Debug, PartialEq)]
pub struct Jc69 {
    rates: Vec<f64>,
}

impl Jc69 {
    pub fn new() -> Self {
        Self { rates: vec![1.0] }
    }

    /// A uniform-weight mixture with the given relative rates; the rates
    /// are rescaled so the mixture's mean rate is 1.
    pub fn with_rates(rates: &[f64]) -> Result<Self> {
        if rates.is_empty() || rates.iter().any(|&r| r <= 0.0) {
            return Err(PhylignError::InitializationError(
                "rate mixture needs at least one positive rate".to_string(),
            ));
        }
        let mean: f64 = rates.iter().sum::<f64>() / rates.len() as f64;
        Ok(Self {
            rates: rates.iter().map(|&r| r / mean).collect(),
        })
    }
}

impl Default for Jc69 {
    fn default() -> Self {
        Self::new()
    }
}

impl SubstModel for Jc69 {
    fn alphabet_size(&self) -> usize {
        4
    }

    fn n_components(&self) -> usize {
        self.rates.len()
    }

    fn component_weight(&self, _m: usize) -> f64 {
        1.0 / self.rates.len() as f64
    }

    fn frequencies(&self, _m: usize) -> Vec<f64> {
        vec![0.25; 4]
    }

    fn transition_p(&self, t: f64, m: usize) -> Array2<f64> {
        let decay = (-4.0 / 3.0 * self.rates[m] * t).exp();
        let same = 0.25 + 0.75 * decay;
        let diff = 0.25 - 0.25 * decay;
        Array2::from_shape_fn((4, 4), |(i, j)| if i == j { same } else { diff })
    }

    fn name(&self) -> &'static str {
        "JC69"
    }
}
