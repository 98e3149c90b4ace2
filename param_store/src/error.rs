use std::{
    error::Error,
    fmt::{self, Display},
    io,
};

/// The result type used in the entire parameter store module.
pub type Result<T> = std::result::Result<T, StoreErr>;

/// The parameter store's error type.
#[derive(Debug)]
pub enum StoreErr {
    SizeMismatch {
        what: &'static str,
        got: usize,
        expected: usize,
    },
    TensorMismatch {
        name: String,
        detail: &'static str,
    },
    Io(io::Error),
    Encoding(serde_json::Error),
}

impl Display for StoreErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::SizeMismatch {
                what,
                got,
                expected,
            } => write!(
                f,
                "size mismatch for {what}: got {got}, expected {expected}"
            ),
            Self::TensorMismatch { name, detail } => {
                write!(f, "tensor {name} does not match the store layout: {detail}")
            }
            Self::Io(e) => write!(f, "io error: {e}"),
            Self::Encoding(e) => write!(f, "encoding error: {e}"),
        }
    }
}

impl Error for StoreErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Io(e) => Some(e),
            Self::Encoding(e) => Some(e),
            _ => None,
        }
    }
}

impl From<io::Error> for StoreErr {
    fn from(e: io::Error) -> Self {
        Self::Io(e)
    }
}

impl From<serde_json::Error> for StoreErr {
    fn from(e: serde_json::Error) -> Self {
        Self::Encoding(e)
    }
}
