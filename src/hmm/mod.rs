//! Composite alignment HMMs over tree-node subsets.

pub mod path;
pub mod project;
pub mod space;
pub mod state;
pub mod transition;

pub use path::Path;
pub use space::StateSpace;
pub use state::{CompositeState, PairState, SubState, SubsetShape};
