//! All errors that can occur in the phylign library.

use std::fmt;

pub type Result<T> = std::result::Result<T, PhylignError>;

#[derive(Clone, Debug)]
pub enum PhylignError {
    /// An alignment column has no legal composite state for the requested
    /// node subset. Indicates corrupted input or an upstream bug; the
    /// current operation cannot continue.
    MalformedAlignment(String),
    /// A path references a state outside the legal-state list, or does not
    /// pair with the sequences it is decoded against.
    MalformedPath(String),
    InitializationError(String),
}

impl fmt::Display for PhylignError {
    fn fmt(&self, f: &mut fmt::Formatter) -> fmt::Result {
        match self {
            PhylignError::MalformedAlignment(message) => {
                write!(f, "MalformedAlignment: {}", message)
            }
            PhylignError::MalformedPath(message) => {
                write!(f, "MalformedPath: {}", message)
            }
            PhylignError::InitializationError(message) => {
                write!(f, "InitializationError: {}", message)
            }
        }
    }
}

impl std::error::Error for PhylignError {}
