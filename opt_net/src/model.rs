use std::f32::consts::TAU;

use ndarray::prelude::*;
use param_store::TensorSpec;
use rand::Rng;

use crate::{
    OptNetErr, Result,
    arch::{
        Head,
        cells::{CellKind, RecurrentCell},
    },
    policy::VARIANCE_FLOOR,
};

/// Shape of the actor-critic pair.
#[derive(Debug, Clone)]
pub struct ModelConfig {
    /// Cell variant of the actor.
    pub cell: CellKind,
    /// Cell variant of the critic.
    pub value_cell: CellKind,
    pub rnn_size: usize,
    pub value_rnn_size: usize,
    /// Dimensionality of the optimization space; acts as the actor's batch.
    pub dimensions: usize,
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            cell: CellKind::Gru,
            value_cell: CellKind::Gru,
            rnn_size: 20,
            value_rnn_size: 20,
            dimensions: 30,
        }
    }
}

/// The hidden states carried between consecutive steps, one per network.
///
/// Zeroed at the start of a worker's lifetime and whenever an episode inside a
/// rollout terminates.
#[derive(Debug, Clone)]
pub struct RecurrentState {
    actor: Array2<f32>,
    critic: Array2<f32>,
}

impl RecurrentState {
    pub fn reset(&mut self) {
        self.actor.fill(0.0);
        self.critic.fill(0.0);
    }
}

/// One rollout's data, laid out for the training unroll.
///
/// All slices have the same length; `losses[t]` is the loss the critic saw at
/// step `t`, before the action was applied.
pub struct TrainingBatch<'a> {
    pub observations: &'a [Array1<f32>],
    pub actions: &'a [Array1<f32>],
    pub losses: &'a [f32],
    pub returns: &'a [f32],
    pub advantages: &'a [f32],
    /// The hidden states the rollout started from.
    pub initial_state: &'a RecurrentState,
    pub entropy_beta: f32,
}

/// Loss terms of one update, for logging.
#[derive(Debug, Clone, Copy)]
pub struct LossReport {
    pub policy_loss: f32,
    pub value_loss: f32,
    pub entropy: f32,
}

impl LossReport {
    pub fn total(&self) -> f32 {
        self.policy_loss + self.value_loss
    }
}

/// Recurrent actor and critic over a stepwise optimization trajectory.
///
/// The actor reads the per-dimension gradient observation (the `dimensions`
/// axis acts as the batch) and emits a Gaussian over each dimension's update;
/// the critic reads the scalar loss sequence. Parameters are not stored here:
/// every method borrows a flat slice laid out per [`ActorCritic::layout`], so
/// workers can own private copies and swap them out wholesale.
pub struct ActorCritic {
    dimensions: usize,
    actor_cell: RecurrentCell,
    mean_head: Head,
    variance_head: Head,
    critic_cell: RecurrentCell,
    value_head: Head,
    nparams: usize,
}

impl ActorCritic {
    /// Builds the networks described by `config`.
    ///
    /// # Returns
    /// An `UnsupportedCell` error for cell variants without an implementation,
    /// before any worker could be spawned on top of this model.
    pub fn new(config: &ModelConfig) -> Result<Self> {
        if config.dimensions == 0 {
            return Err(OptNetErr::SizeMismatch {
                what: "dimensions",
                got: 0,
                expected: 1,
            });
        }

        let actor_cell = RecurrentCell::new(config.cell, 1, config.rnn_size)?;
        let critic_cell = RecurrentCell::new(config.value_cell, 1, config.value_rnn_size)?;
        let mean_head = Head::new((config.rnn_size, 1));
        let variance_head = Head::new((config.rnn_size, 1));
        let value_head = Head::new((config.value_rnn_size, 1));

        let nparams = actor_cell.size()
            + mean_head.size()
            + variance_head.size()
            + critic_cell.size()
            + value_head.size();

        Ok(Self {
            dimensions: config.dimensions,
            actor_cell,
            mean_head,
            variance_head,
            critic_cell,
            value_head,
            nparams,
        })
    }

    pub fn dimensions(&self) -> usize {
        self.dimensions
    }

    /// Total number of scalar parameters.
    pub fn param_len(&self) -> usize {
        self.nparams
    }

    /// Ordered tensor specs describing the flat parameter vector.
    pub fn layout(&self) -> Vec<TensorSpec> {
        let mut layout = self.actor_cell.layout("actor/cell");
        layout.extend(self.mean_head.layout("actor/mean"));
        layout.extend(self.variance_head.layout("actor/variance"));
        layout.extend(self.critic_cell.layout("critic/cell"));
        layout.extend(self.value_head.layout("critic/value"));
        layout
    }

    /// Draws initial parameters: Xavier-uniform weights, zero biases. The
    /// variance head's bias starts at one so the initial policy is not pinned
    /// to the variance floor.
    pub fn init_params<R: Rng>(&self, rng: &mut R) -> Vec<f32> {
        let mut params = Vec::with_capacity(self.nparams);
        for spec in self.layout() {
            match spec.shape.as_slice() {
                [fan_in, fan_out] => {
                    let range = (6.0 / (*fan_in + *fan_out) as f32).sqrt();
                    params.extend((0..spec.len()).map(|_| rng.random_range(-range..range)));
                }
                _ => {
                    let value = if spec.name == "actor/variance/b" { 1.0 } else { 0.0 };
                    params.extend(std::iter::repeat(value).take(spec.len()));
                }
            }
        }
        params
    }

    /// Zeroed hidden states for a fresh episode.
    pub fn initial_state(&self) -> RecurrentState {
        RecurrentState {
            actor: Array2::zeros((self.dimensions, self.actor_cell.hidden())),
            critic: Array2::zeros((1, self.critic_cell.hidden())),
        }
    }

    /// One policy step: advances the actor's hidden state and returns the
    /// Gaussian's per-dimension mean and (floored) variance.
    pub fn act(
        &self,
        params: &[f32],
        observation: ArrayView1<f32>,
        state: &mut RecurrentState,
    ) -> Result<(Array1<f32>, Array1<f32>)> {
        self.check_len("parameters", params.len())?;
        if observation.len() != self.dimensions {
            return Err(OptNetErr::SizeMismatch {
                what: "observation",
                got: observation.len(),
                expected: self.dimensions,
            });
        }

        let (actor_p, mean_p, var_p, _, _) = self.split_params(params);
        let x = observation.insert_axis(Axis(1));
        let (h, _) = self.actor_cell.forward(actor_p, x, state.actor.view());

        let mean = self.mean_head.forward(mean_p, h.view());
        let variance = self
            .variance_head
            .forward(var_p, h.view())
            .mapv(|v| v.max(VARIANCE_FLOOR));
        state.actor = h;

        Ok((mean.column(0).to_owned(), variance.column(0).to_owned()))
    }

    /// One critic step over the scalar loss signal; advances the critic's
    /// hidden state.
    pub fn evaluate(&self, params: &[f32], loss: f32, state: &mut RecurrentState) -> Result<f32> {
        self.check_len("parameters", params.len())?;
        let (_, _, _, critic_p, value_p) = self.split_params(params);

        let x = Array2::from_elem((1, 1), loss);
        let (h, _) = self.critic_cell.forward(critic_p, x.view(), state.critic.view());
        let value = self.value_head.forward(value_p, h.view())[[0, 0]];
        state.critic = h;
        Ok(value)
    }

    /// Critic estimate at `loss` without advancing the hidden state. Used to
    /// bootstrap a non-terminal rollout's final return.
    pub fn peek_value(&self, params: &[f32], loss: f32, state: &RecurrentState) -> Result<f32> {
        self.check_len("parameters", params.len())?;
        let (_, _, _, critic_p, value_p) = self.split_params(params);

        let x = Array2::from_elem((1, 1), loss);
        let (h, _) = self.critic_cell.forward(critic_p, x.view(), state.critic.view());
        Ok(self.value_head.forward(value_p, h.view())[[0, 0]])
    }

    /// Accumulates the gradients of the combined policy and value loss over a
    /// whole trajectory into `grad`.
    ///
    /// Re-unrolls both networks from the rollout's initial hidden states, so
    /// the forward quantities match what the rollout sampled from, then walks
    /// the trajectory backwards through the heads and the cells.
    ///
    /// # Arguments
    /// * `params` - The private parameters the rollout was sampled with.
    /// * `grad` - Flat gradient buffer, accumulated into; callers zero it
    ///   between updates.
    /// * `batch` - The rollout's recorded steps and targets.
    ///
    /// # Returns
    /// The update's loss terms.
    pub fn unroll_gradients(
        &self,
        params: &[f32],
        grad: &mut [f32],
        batch: &TrainingBatch<'_>,
    ) -> Result<LossReport> {
        let t_len = batch.observations.len();
        if t_len == 0 {
            return Err(OptNetErr::SizeMismatch {
                what: "trajectory",
                got: 0,
                expected: 1,
            });
        }
        for (what, len) in [
            ("actions", batch.actions.len()),
            ("losses", batch.losses.len()),
            ("returns", batch.returns.len()),
            ("advantages", batch.advantages.len()),
        ] {
            if len != t_len {
                return Err(OptNetErr::SizeMismatch {
                    what,
                    got: len,
                    expected: t_len,
                });
            }
        }
        self.check_len("parameters", params.len())?;
        self.check_len("gradient", grad.len())?;

        let (actor_p, mean_p, var_p, critic_p, value_p) = self.split_params(params);

        // Actor forward over the whole trajectory.
        let mut h = batch.initial_state.actor.clone();
        let mut actor_caches = Vec::with_capacity(t_len);
        let mut hiddens = Vec::with_capacity(t_len);
        let mut means = Vec::with_capacity(t_len);
        let mut raw_variances = Vec::with_capacity(t_len);
        for observation in batch.observations {
            if observation.len() != self.dimensions {
                return Err(OptNetErr::SizeMismatch {
                    what: "observation",
                    got: observation.len(),
                    expected: self.dimensions,
                });
            }
            let x = observation.view().insert_axis(Axis(1));
            let (h_new, cache) = self.actor_cell.forward(actor_p, x, h.view());
            means.push(self.mean_head.forward(mean_p, h_new.view()));
            raw_variances.push(self.variance_head.forward(var_p, h_new.view()));
            actor_caches.push(cache);
            hiddens.push(h_new.clone());
            h = h_new;
        }

        // Critic forward over the loss sequence.
        let mut hc = batch.initial_state.critic.clone();
        let mut critic_caches = Vec::with_capacity(t_len);
        let mut critic_hiddens = Vec::with_capacity(t_len);
        let mut values = Vec::with_capacity(t_len);
        for &loss in batch.losses {
            let x = Array2::from_elem((1, 1), loss);
            let (h_new, cache) = self.critic_cell.forward(critic_p, x.view(), hc.view());
            values.push(self.value_head.forward(value_p, h_new.view())[[0, 0]]);
            critic_caches.push(cache);
            critic_hiddens.push(h_new.clone());
            hc = h_new;
        }

        // Loss terms and the seeds of the backward pass.
        let m = self.dimensions as f32;
        let beta = batch.entropy_beta;
        let mut policy_loss = 0.0;
        let mut value_loss = 0.0;
        let mut entropy_sum = 0.0;
        let mut d_means = Vec::with_capacity(t_len);
        let mut d_raw_variances = Vec::with_capacity(t_len);
        let mut d_values = Vec::with_capacity(t_len);
        for t in 0..t_len {
            let advantage = batch.advantages[t];
            let action = &batch.actions[t];
            let mean = &means[t];
            let raw = &raw_variances[t];

            let mut d_mean = Array2::zeros((self.dimensions, 1));
            let mut d_raw = Array2::zeros((self.dimensions, 1));
            let mut log_pd = 0.0;
            let mut entropy = 0.0;
            for i in 0..self.dimensions {
                let diff = action[i] - mean[[i, 0]];
                let raw_v = raw[[i, 0]];
                let v = raw_v.max(VARIANCE_FLOOR);

                log_pd += -0.5 * (TAU * v).ln() - diff * diff / (2.0 * v);
                entropy += 0.5 * ((TAU * v).ln() + 1.0);

                d_mean[[i, 0]] = -advantage / m * diff / v;
                // The floor is flat: no gradient flows once it clamps.
                if raw_v > VARIANCE_FLOOR {
                    let dlp_dv = -0.5 / v + diff * diff / (2.0 * v * v);
                    d_raw[[i, 0]] = -advantage / m * dlp_dv - beta / m * (0.5 / v);
                }
            }
            log_pd /= m;
            entropy /= m;

            policy_loss += -advantage * log_pd - beta * entropy;
            entropy_sum += entropy;

            let err = batch.returns[t] - values[t];
            value_loss += 0.5 * err * err;
            d_values.push(-err);
            d_means.push(d_mean);
            d_raw_variances.push(d_raw);
        }

        // Backward through the heads and through time.
        let (actor_g, mean_g, var_g, critic_g, value_g) = self.split_grad(grad);

        let mut d_h = Array2::zeros((self.dimensions, self.actor_cell.hidden()));
        for t in (0..t_len).rev() {
            d_h += &self
                .mean_head
                .backward(mean_p, mean_g, hiddens[t].view(), d_means[t].view());
            d_h += &self.variance_head.backward(
                var_p,
                var_g,
                hiddens[t].view(),
                d_raw_variances[t].view(),
            );
            d_h = self
                .actor_cell
                .backward(actor_p, actor_g, &actor_caches[t], d_h);
        }

        let mut d_hc = Array2::zeros((1, self.critic_cell.hidden()));
        for t in (0..t_len).rev() {
            let d_value = Array2::from_elem((1, 1), d_values[t]);
            d_hc += &self.value_head.backward(
                value_p,
                value_g,
                critic_hiddens[t].view(),
                d_value.view(),
            );
            d_hc = self
                .critic_cell
                .backward(critic_p, critic_g, &critic_caches[t], d_hc);
        }

        Ok(LossReport {
            policy_loss,
            value_loss,
            entropy: entropy_sum / t_len as f32,
        })
    }

    fn check_len(&self, what: &'static str, got: usize) -> Result<()> {
        if got != self.nparams {
            return Err(OptNetErr::SizeMismatch {
                what,
                got,
                expected: self.nparams,
            });
        }
        Ok(())
    }

    #[allow(clippy::type_complexity)]
    fn split_params<'a>(
        &self,
        params: &'a [f32],
    ) -> (&'a [f32], &'a [f32], &'a [f32], &'a [f32], &'a [f32]) {
        let (actor, rest) = params.split_at(self.actor_cell.size());
        let (mean, rest) = rest.split_at(self.mean_head.size());
        let (variance, rest) = rest.split_at(self.variance_head.size());
        let (critic, value) = rest.split_at(self.critic_cell.size());
        (actor, mean, variance, critic, value)
    }

    #[allow(clippy::type_complexity)]
    fn split_grad<'a>(
        &self,
        grad: &'a mut [f32],
    ) -> (
        &'a mut [f32],
        &'a mut [f32],
        &'a mut [f32],
        &'a mut [f32],
        &'a mut [f32],
    ) {
        let (actor, rest) = grad.split_at_mut(self.actor_cell.size());
        let (mean, rest) = rest.split_at_mut(self.mean_head.size());
        let (variance, rest) = rest.split_at_mut(self.variance_head.size());
        let (critic, value) = rest.split_at_mut(self.critic_cell.size());
        (actor, mean, variance, critic, value)
    }
}

#[cfg(test)]
mod tests {
    use rand::{Rng, SeedableRng, rngs::StdRng};

    use super::*;

    fn small_config(kind: CellKind) -> ModelConfig {
        ModelConfig {
            cell: kind,
            value_cell: kind,
            rnn_size: 4,
            value_rnn_size: 3,
            dimensions: 3,
        }
    }

    #[test]
    fn test_lstm_model_fails_at_construction() {
        let config = ModelConfig {
            cell: CellKind::Lstm,
            ..ModelConfig::default()
        };
        assert!(matches!(
            ActorCritic::new(&config),
            Err(OptNetErr::UnsupportedCell { .. })
        ));
    }

    #[test]
    fn test_layout_covers_every_parameter_once() {
        let model = ActorCritic::new(&small_config(CellKind::Gru)).unwrap();
        let layout = model.layout();

        let total: usize = layout.iter().map(|spec| spec.len()).sum();
        assert_eq!(total, model.param_len());

        let mut names: Vec<_> = layout.iter().map(|spec| spec.name.as_str()).collect();
        names.sort_unstable();
        names.dedup();
        assert_eq!(names.len(), layout.len(), "duplicate tensor names");
    }

    #[test]
    fn test_variance_is_never_below_the_floor() {
        for seed in 0..5 {
            let model = ActorCritic::new(&small_config(CellKind::Basic)).unwrap();
            let mut rng = StdRng::seed_from_u64(seed);
            let mut params = model.init_params(&mut rng);
            // Force the variance head towards negative raw outputs.
            let mut offset = 0;
            for spec in model.layout() {
                if spec.name.starts_with("actor/variance") {
                    for p in params[offset..offset + spec.len()].iter_mut() {
                        *p = -5.0;
                    }
                }
                offset += spec.len();
            }

            let mut state = model.initial_state();
            let observation = Array1::from_iter((0..3).map(|_| rng.random_range(-1.0..1.0f32)));
            let (_, variance) = model.act(&params, observation.view(), &mut state).unwrap();

            for &v in &variance {
                assert!(v >= VARIANCE_FLOOR);
                assert!(v.is_finite());
            }
        }
    }

    #[test]
    fn test_peek_value_does_not_advance_the_state() {
        let model = ActorCritic::new(&small_config(CellKind::Gru)).unwrap();
        let mut rng = StdRng::seed_from_u64(3);
        let params = model.init_params(&mut rng);
        let mut state = model.initial_state();

        model.evaluate(&params, 0.7, &mut state).unwrap();
        let a = model.peek_value(&params, 0.3, &state).unwrap();
        let b = model.peek_value(&params, 0.3, &state).unwrap();
        assert_eq!(a, b);

        // Advancing afterwards must still see the pre-peek state.
        let advanced = model.evaluate(&params, 0.3, &mut state).unwrap();
        assert_eq!(advanced, a);
    }

    fn gradient_check(kind: CellKind) {
        let model = ActorCritic::new(&small_config(kind)).unwrap();
        let mut rng = StdRng::seed_from_u64(9);
        let mut params = model.init_params(&mut rng);
        for p in params.iter_mut() {
            *p += rng.random_range(-0.05..0.05);
        }

        let t_len = 4;
        let dims = model.dimensions();
        let random_vec = |rng: &mut StdRng| {
            Array1::from_iter((0..dims).map(|_| rng.random_range(-1.0..1.0f32)))
        };
        let observations: Vec<_> = (0..t_len).map(|_| random_vec(&mut rng)).collect();
        let actions: Vec<_> = (0..t_len).map(|_| random_vec(&mut rng)).collect();
        let losses: Vec<f32> = (0..t_len).map(|_| rng.random_range(-1.0..1.0)).collect();
        let returns: Vec<f32> = (0..t_len).map(|_| rng.random_range(-1.0..1.0)).collect();
        let advantages: Vec<f32> = (0..t_len).map(|_| rng.random_range(-1.0..1.0)).collect();
        let initial_state = model.initial_state();

        let batch = TrainingBatch {
            observations: &observations,
            actions: &actions,
            losses: &losses,
            returns: &returns,
            advantages: &advantages,
            initial_state: &initial_state,
            entropy_beta: 0.01,
        };

        let mut grad = vec![0.0; model.param_len()];
        model.unroll_gradients(&params, &mut grad, &batch).unwrap();

        let mut scratch = vec![0.0; model.param_len()];
        let eps = 1e-3;
        for idx in (0..params.len()).step_by(5) {
            let orig = params[idx];

            params[idx] = orig + eps;
            scratch.fill(0.0);
            let plus = model
                .unroll_gradients(&params, &mut scratch, &batch)
                .unwrap()
                .total();

            params[idx] = orig - eps;
            scratch.fill(0.0);
            let minus = model
                .unroll_gradients(&params, &mut scratch, &batch)
                .unwrap()
                .total();

            params[idx] = orig;
            let numeric = (plus - minus) / (2.0 * eps);
            let analytic = grad[idx];
            assert!(
                (numeric - analytic).abs() <= 2e-2 * (1.0 + numeric.abs().max(analytic.abs())),
                "param {idx}: numeric {numeric} vs analytic {analytic}"
            );
        }
    }

    #[test]
    fn test_gradients_match_finite_differences_basic() {
        gradient_check(CellKind::Basic);
    }

    #[test]
    fn test_gradients_match_finite_differences_gru() {
        gradient_check(CellKind::Gru);
    }
}
