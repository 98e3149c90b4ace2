mod cancel;
mod config;
mod error;
pub mod rollout;
mod supervisor;
pub mod worker;

pub use cancel::CancellationToken;
pub use config::{RmsPropConfig, TrainerConfig};
pub use error::{Result, TrainerErr};
pub use supervisor::{TrainReport, train, train_with_token};
pub use worker::{TrainingWorker, WorkerReport};
