mod checkpoint;
mod error;
mod optimization;
mod spec;
mod store;

pub use checkpoint::{TensorRecord, flatten, load, save};
pub use error::{Result, StoreErr};
pub use optimization::{Optimizer, RmsProp};
pub use spec::TensorSpec;
pub use store::ParameterStore;
