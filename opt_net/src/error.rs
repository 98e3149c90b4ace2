use std::{
    error::Error,
    fmt::{self, Display},
};

use crate::arch::cells::CellKind;

/// The result type used in the entire model module.
pub type Result<T> = std::result::Result<T, OptNetErr>;

/// The model's error type.
#[derive(Debug)]
pub enum OptNetErr {
    /// The requested recurrent cell variant has no implementation. Raised at
    /// model construction, never at first use.
    UnsupportedCell { kind: CellKind },
    /// A cell name did not match any known variant.
    UnknownCell(String),
    SizeMismatch {
        what: &'static str,
        got: usize,
        expected: usize,
    },
}

impl Display for OptNetErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::UnsupportedCell { kind } => {
                write!(f, "recurrent cell variant {kind} is not implemented")
            }
            Self::UnknownCell(name) => write!(f, "unknown recurrent cell variant: {name}"),
            Self::SizeMismatch {
                what,
                got,
                expected,
            } => write!(
                f,
                "size mismatch for {what}: got {got}, expected {expected}"
            ),
        }
    }
}

impl Error for OptNetErr {}
