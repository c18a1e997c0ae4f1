//! Conditional-likelihood caching and the pruning recursion.

pub mod cache;
pub mod peel;

pub use cache::{LikelihoodCache, MultiLikelihoodCache, select_root};
