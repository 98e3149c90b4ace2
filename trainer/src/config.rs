use std::{num::NonZeroUsize, path::PathBuf};

use landscape::LandscapeConfig;
use opt_net::ModelConfig;

use crate::{Result, TrainerErr};

/// RMSProp hyperparameters shared by every tensor's optimizer instance.
#[derive(Debug, Clone, Copy)]
pub struct RmsPropConfig {
    pub alpha: f32,
    pub momentum: f32,
    pub epsilon: f32,
}

impl Default for RmsPropConfig {
    fn default() -> Self {
        Self {
            alpha: 0.99,
            momentum: 0.9,
            epsilon: 1e-10,
        }
    }
}

/// The whole training run's configuration surface.
///
/// Read once at startup and immutable afterwards; `validate` runs before any
/// worker is spawned.
#[derive(Debug, Clone)]
pub struct TrainerConfig {
    pub workers: NonZeroUsize,
    /// Maximum rollout length per update.
    pub local_t_max: usize,
    pub discount_rate: f32,
    pub entropy_beta: f32,
    pub learning_rate: f32,
    pub rmsprop: RmsPropConfig,
    /// Global gradient-norm bound; `<= 0` disables clipping.
    pub grad_norm_clip: f32,
    /// Total environment step budget across all workers.
    pub max_time_steps: u64,
    /// Emit one summary log line per worker every this many rollouts.
    pub summary_freq: usize,
    /// Where to write the final checkpoint; `None` skips saving.
    pub save_path: Option<PathBuf>,
    /// Seed for every random draw in the run; `None` picks one at startup.
    pub seed: Option<u64>,
    /// Scales each step's advantage by its position in the episode. Known to
    /// be numerically delicate late in long runs; off unless asked for.
    pub advantage_weighting: bool,
    pub model: ModelConfig,
    pub landscape: LandscapeConfig,
}

impl Default for TrainerConfig {
    fn default() -> Self {
        Self {
            workers: NonZeroUsize::new(8).unwrap(),
            local_t_max: 5,
            discount_rate: 0.99,
            entropy_beta: 1e-4,
            learning_rate: 1e-4,
            rmsprop: RmsPropConfig::default(),
            grad_norm_clip: 1.0,
            max_time_steps: 10_000_000,
            summary_freq: 500,
            save_path: None,
            seed: None,
            advantage_weighting: false,
            model: ModelConfig::default(),
            landscape: LandscapeConfig::default(),
        }
    }
}

impl TrainerConfig {
    /// Rejects configurations no worker should ever run with.
    pub fn validate(&self) -> Result<()> {
        if self.local_t_max == 0 {
            return Err(invalid("local_t_max must be at least 1"));
        }
        if !(self.discount_rate > 0.0 && self.discount_rate <= 1.0) {
            return Err(invalid("discount_rate must be in (0, 1]"));
        }
        if !(self.entropy_beta >= 0.0 && self.entropy_beta.is_finite()) {
            return Err(invalid("entropy_beta must be finite and non-negative"));
        }
        if !(self.learning_rate > 0.0 && self.learning_rate.is_finite()) {
            return Err(invalid("learning_rate must be finite and positive"));
        }
        if !(self.rmsprop.alpha > 0.0 && self.rmsprop.alpha < 1.0) {
            return Err(invalid("rmsprop alpha must be in (0, 1)"));
        }
        if !(self.rmsprop.momentum >= 0.0 && self.rmsprop.momentum < 1.0) {
            return Err(invalid("rmsprop momentum must be in [0, 1)"));
        }
        if self.rmsprop.epsilon <= 0.0 {
            return Err(invalid("rmsprop epsilon must be positive"));
        }
        if self.max_time_steps == 0 {
            return Err(invalid("max_time_steps must be at least 1"));
        }
        if self.summary_freq == 0 {
            return Err(invalid("summary_freq must be at least 1"));
        }
        if self.model.rnn_size == 0 || self.model.value_rnn_size == 0 {
            return Err(invalid("cell sizes must be at least 1"));
        }
        if self.model.dimensions != self.landscape.dimensions {
            return Err(invalid("model and landscape dimensions must agree"));
        }
        if self.landscape.dimensions == 0 {
            return Err(invalid("landscape dimensions must be at least 1"));
        }
        if self.landscape.hyperplanes == 0 {
            return Err(invalid("landscape needs at least one hyperplane"));
        }
        if self.landscape.variance_floor <= 0.0 {
            return Err(invalid("landscape variance floor must be positive"));
        }
        if !(0.0..1.0).contains(&self.landscape.termination_prob) {
            return Err(invalid("termination probability must be in [0, 1)"));
        }
        if self.landscape.max_episode_steps == 0 {
            return Err(invalid("max_episode_steps must be at least 1"));
        }
        Ok(())
    }
}

fn invalid(msg: &str) -> TrainerErr {
    TrainerErr::InvalidConfig(msg.to_string())
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config_is_valid() {
        assert!(TrainerConfig::default().validate().is_ok());
    }

    #[test]
    fn test_out_of_range_discount_is_rejected() {
        let mut config = TrainerConfig::default();
        config.discount_rate = 0.0;
        assert!(config.validate().is_err());
        config.discount_rate = 1.5;
        assert!(config.validate().is_err());
    }

    #[test]
    fn test_disagreeing_dimensions_are_rejected() {
        let mut config = TrainerConfig::default();
        config.model.dimensions = 10;
        config.landscape.dimensions = 20;
        assert!(config.validate().is_err());
    }
}
