mod config;
mod problem;
mod surface;

pub use config::LandscapeConfig;
pub use problem::{Problem, StepOutcome};
pub use surface::{ProblemState, SurrogateProblem};
