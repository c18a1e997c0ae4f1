//! This module contains the core datatypes of the library.

pub mod alignment;
pub mod tree;

pub use alignment::Alignment;
pub use tree::Tree;
