/// Configuration of the synthetic loss surface family and its episode dynamics.
///
/// All fields are read once at problem construction and are immutable afterwards.
#[derive(Debug, Clone)]
pub struct LandscapeConfig {
    /// Dimensionality of the optimization space.
    pub dimensions: usize,
    /// Number of hyperplane ridges mixed into one surface draw.
    pub hyperplanes: usize,
    /// Lower bound for the per-ridge variances. Keeps the surface smooth and
    /// the gradients finite.
    pub variance_floor: f32,
    /// Width of the uniform range the per-ridge variances are drawn from,
    /// on top of `variance_floor`.
    pub variance_scale: f32,
    /// Standard deviation of the zero-mean noise added to gradient observations.
    pub observation_noise: f32,
    /// Relative magnitude of the noise added to the loss after each step.
    pub loss_noise: f32,
    /// Per-step probability of the episode terminating.
    pub termination_prob: f32,
    /// Hard cap on the number of steps in one episode.
    pub max_episode_steps: usize,
}

impl Default for LandscapeConfig {
    fn default() -> Self {
        Self {
            dimensions: 30,
            hyperplanes: 10,
            variance_floor: 0.05,
            variance_scale: 0.2,
            observation_noise: 0.5,
            loss_noise: 0.0,
            termination_prob: 0.003,
            max_episode_steps: 100,
        }
    }
}
