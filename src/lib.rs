//! Bayesian joint sampling of multiple sequence alignments and
//! phylogenetic trees.
//!
//! The crate provides the data structures and algorithms that make
//! repeated likelihood evaluation fast and correct while an MCMC sampler
//! mutates partially shared copies of the state: the composite-state
//! alignment HMMs over 2-, 3- and 5-branch node subsets (`hmm`), the
//! path/alignment codec (`hmm::path`), and the token-based
//! conditional-likelihood cache with copy-on-invalidate sharing
//! (`likelihood`). Substitution and indel models enter only through the
//! narrow traits in `model`; proposal scheduling, file formats and the CLI
//! live outside the crate.

pub mod config;
pub mod core;
pub mod encoding;
pub mod errors;
pub mod hmm;
pub mod likelihood;
pub mod logsum;
pub mod model;
pub mod params;
