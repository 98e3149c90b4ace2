use std::{
    error::Error,
    fmt::{self, Display},
};

use opt_net::OptNetErr;
use param_store::StoreErr;

/// The result type used in the entire trainer module.
pub type Result<T> = std::result::Result<T, TrainerErr>;

/// All errors that can occur while driving a training run.
#[derive(Debug)]
pub enum TrainerErr {
    /// Invalid configuration — caught before any worker is spawned.
    InvalidConfig(String),
    /// The model rejected its configuration or inputs.
    Model(OptNetErr),
    /// The shared parameter store rejected an operation.
    Store(StoreErr),
    /// A worker thread panicked.
    WorkerPanic { worker_id: usize },
}

impl Display for TrainerErr {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Self::InvalidConfig(msg) => write!(f, "invalid config: {msg}"),
            Self::Model(e) => write!(f, "model error: {e}"),
            Self::Store(e) => write!(f, "parameter store error: {e}"),
            Self::WorkerPanic { worker_id } => write!(f, "worker {worker_id} panicked"),
        }
    }
}

impl Error for TrainerErr {
    fn source(&self) -> Option<&(dyn Error + 'static)> {
        match self {
            Self::Model(e) => Some(e),
            Self::Store(e) => Some(e),
            _ => None,
        }
    }
}

impl From<OptNetErr> for TrainerErr {
    fn from(e: OptNetErr) -> Self {
        Self::Model(e)
    }
}

impl From<StoreErr> for TrainerErr {
    fn from(e: StoreErr) -> Self {
        Self::Store(e)
    }
}
