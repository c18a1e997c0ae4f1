//! Narrow interfaces to the model layer: everything the alignment core
//! needs from indel and substitution models, and nothing more.

pub mod indel;
pub mod subst;

pub use indel::{IndelModel, PairHmm};
pub use subst::SubstModel;
