use ndarray::{Array1, Array2, ArrayView1};
use rand::Rng;
use rand_distr::StandardNormal;

use crate::{LandscapeConfig, Problem, StepOutcome};

/// Positions are kept inside this box so a runaway policy cannot push the
/// arithmetic into overflow.
const POSITION_LIMIT: f32 = 1e4;

/// One random draw of the surface: a mixture of `k` Gaussian-weighted
/// hyperplane ridges in `m` dimensions.
#[derive(Debug, Clone)]
struct Surface {
    /// Unit normals of the hyperplanes, one row per ridge.
    normals: Array2<f32>,
    offsets: Array1<f32>,
    weights: Array1<f32>,
    variances: Array1<f32>,
}

impl Surface {
    fn draw<R: Rng>(config: &LandscapeConfig, rng: &mut R) -> Self {
        let (k, m) = (config.hyperplanes, config.dimensions);

        let mut normals = Array2::from_shape_fn((k, m), |_| rng.sample::<f32, _>(StandardNormal));
        for mut row in normals.rows_mut() {
            let norm = row.dot(&row).sqrt();
            if norm > 1e-6 {
                row.mapv_inplace(|x| x / norm);
            } else {
                row.fill(0.0);
                row[0] = 1.0;
            }
        }

        let offsets = Array1::from_shape_fn(k, |_| rng.sample::<f32, _>(StandardNormal));
        let weights = Array1::from_iter((0..k).map(|_| rng.random_range(0.1..1.0f32)));
        let variances = Array1::from_iter((0..k).map(|_| {
            let spread = if config.variance_scale > 0.0 {
                rng.random_range(0.0..config.variance_scale)
            } else {
                0.0
            };
            config.variance_floor + spread
        }));

        Self {
            normals,
            offsets,
            weights,
            variances,
        }
    }

    /// Signed distances from `position` to every hyperplane.
    fn distances(&self, position: ArrayView1<f32>) -> Array1<f32> {
        &self.normals.dot(&position) - &self.offsets
    }

    fn loss(&self, position: ArrayView1<f32>) -> f32 {
        let d = self.distances(position);
        self.weights
            .iter()
            .zip(&d)
            .zip(&self.variances)
            .map(|((&w, &d), &v)| w * (-d * d / (2.0 * v)).exp())
            .sum()
    }

    fn gradient(&self, position: ArrayView1<f32>) -> Array1<f32> {
        let d = self.distances(position);
        let coefs = Array1::from_iter(
            self.weights
                .iter()
                .zip(&d)
                .zip(&self.variances)
                .map(|((&w, &d), &v)| w * (-d * d / (2.0 * v)).exp() * (-d / v)),
        );
        self.normals.t().dot(&coefs)
    }
}

/// State of one episode: the current surface draw, the position on it and the
/// loss at that position.
#[derive(Debug, Clone)]
pub struct ProblemState {
    surface: Surface,
    position: Array1<f32>,
    loss: f32,
    steps: usize,
}

/// The synthetic optimization target the policy learns to navigate.
///
/// The struct itself only holds configuration; every episode's state is a
/// separate [`ProblemState`] so workers can own their episodes exclusively.
#[derive(Debug, Clone)]
pub struct SurrogateProblem {
    config: LandscapeConfig,
}

impl SurrogateProblem {
    pub fn new(config: LandscapeConfig) -> Self {
        Self { config }
    }
}

impl Problem for SurrogateProblem {
    type State = ProblemState;

    fn dimensions(&self) -> usize {
        self.config.dimensions
    }

    fn reset<R: Rng>(&self, rng: &mut R) -> ProblemState {
        let surface = Surface::draw(&self.config, rng);
        let position =
            Array1::from_shape_fn(self.config.dimensions, |_| rng.sample::<f32, _>(StandardNormal));
        let loss = surface.loss(position.view());

        ProblemState {
            surface,
            position,
            loss,
            steps: 0,
        }
    }

    fn observe<R: Rng>(&self, state: &ProblemState, rng: &mut R) -> Array1<f32> {
        let mut grad = state.surface.gradient(state.position.view());
        if self.config.observation_noise > 0.0 {
            let noise = self.config.observation_noise;
            grad.mapv_inplace(|g| g + noise * rng.sample::<f32, _>(StandardNormal));
        }
        grad
    }

    fn step<R: Rng>(
        &self,
        state: &mut ProblemState,
        action: ArrayView1<f32>,
        rng: &mut R,
    ) -> StepOutcome {
        for (p, &a) in state.position.iter_mut().zip(action) {
            if a.is_finite() {
                *p = (*p + a).clamp(-POSITION_LIMIT, POSITION_LIMIT);
            }
        }

        let mut new_loss = state.surface.loss(state.position.view());
        if self.config.loss_noise > 0.0 {
            new_loss += new_loss.abs() * self.config.loss_noise * rng.random_range(-1.0..1.0f32);
        }
        if !new_loss.is_finite() {
            new_loss = state.loss;
        }

        let loss_delta = new_loss - state.loss;
        state.loss = new_loss;
        state.steps += 1;

        let terminated = state.steps >= self.config.max_episode_steps
            || rng.random::<f32>() < self.config.termination_prob;

        StepOutcome {
            loss_delta,
            terminated,
        }
    }

    fn loss(&self, state: &ProblemState) -> f32 {
        state.loss
    }
}

#[cfg(test)]
mod tests {
    use ndarray::Array1;
    use rand::{SeedableRng, rngs::StdRng};

    use super::*;

    fn test_config() -> LandscapeConfig {
        LandscapeConfig {
            dimensions: 6,
            hyperplanes: 4,
            observation_noise: 0.0,
            loss_noise: 0.0,
            termination_prob: 0.0,
            max_episode_steps: 10,
            ..LandscapeConfig::default()
        }
    }

    #[test]
    fn test_draw_produces_unit_normals_and_floored_variances() {
        let config = test_config();
        let mut rng = StdRng::seed_from_u64(7);
        let surface = Surface::draw(&config, &mut rng);

        for row in surface.normals.rows() {
            let norm = row.dot(&row).sqrt();
            assert!((norm - 1.0).abs() < 1e-4, "normal is not unit length: {norm}");
        }
        for &v in &surface.variances {
            assert!(v >= config.variance_floor);
        }
        for &w in &surface.weights {
            assert!(w > 0.0);
        }
    }

    #[test]
    fn test_gradient_matches_finite_differences() {
        let config = test_config();
        let mut rng = StdRng::seed_from_u64(11);
        let surface = Surface::draw(&config, &mut rng);
        let position =
            Array1::from_shape_fn(config.dimensions, |_| rng.sample::<f32, _>(StandardNormal));

        let grad = surface.gradient(position.view());
        let eps = 1e-3;
        for i in 0..config.dimensions {
            let mut plus = position.clone();
            plus[i] += eps;
            let mut minus = position.clone();
            minus[i] -= eps;
            let numeric = (surface.loss(plus.view()) - surface.loss(minus.view())) / (2.0 * eps);
            let analytic = grad[i];
            assert!(
                (numeric - analytic).abs() < 1e-2 * (1.0 + analytic.abs()),
                "component {i}: numeric {numeric} vs analytic {analytic}"
            );
        }
    }

    #[test]
    fn test_step_reports_signed_loss_change() {
        let config = test_config();
        let problem = SurrogateProblem::new(config.clone());
        let mut rng = StdRng::seed_from_u64(3);
        let mut state = problem.reset(&mut rng);

        let before = problem.loss(&state);
        let action = Array1::from_elem(config.dimensions, 0.1);
        let outcome = problem.step(&mut state, action.view(), &mut rng);
        let after = problem.loss(&state);

        assert!((outcome.loss_delta - (after - before)).abs() < 1e-6);
    }

    #[test]
    fn test_episode_terminates_at_max_steps() {
        let config = test_config();
        let problem = SurrogateProblem::new(config.clone());
        let mut rng = StdRng::seed_from_u64(5);
        let mut state = problem.reset(&mut rng);
        let action = Array1::zeros(config.dimensions);

        for step in 1..=config.max_episode_steps {
            let outcome = problem.step(&mut state, action.view(), &mut rng);
            assert_eq!(outcome.terminated, step == config.max_episode_steps);
        }
    }

    #[test]
    fn test_non_finite_action_components_are_ignored() {
        let config = test_config();
        let problem = SurrogateProblem::new(config.clone());
        let mut rng = StdRng::seed_from_u64(13);
        let mut state = problem.reset(&mut rng);

        let mut action = Array1::from_elem(config.dimensions, f32::NAN);
        action[0] = 0.5;
        let before = state.position.clone();
        problem.step(&mut state, action.view(), &mut rng);

        assert!((state.position[0] - (before[0] + 0.5)).abs() < 1e-6);
        for i in 1..config.dimensions {
            assert_eq!(state.position[i], before[i]);
        }
        assert!(problem.loss(&state).is_finite());
    }

    #[test]
    fn test_observation_is_deterministic_without_noise() {
        let config = test_config();
        let problem = SurrogateProblem::new(config);
        let mut rng = StdRng::seed_from_u64(17);
        let state = problem.reset(&mut rng);

        let a = problem.observe(&state, &mut rng);
        let b = problem.observe(&state, &mut rng);
        assert_eq!(a, b);
    }
}
