use landscape::Problem;
use log::{debug, info};
use opt_net::{ActorCritic, LossReport, RecurrentState, TrainingBatch, policy};
use param_store::{ParameterStore, RmsProp};
use rand::{SeedableRng, rngs::StdRng};

use crate::{
    CancellationToken, Result, TrainerConfig,
    rollout::{self, StepRecord, Trajectory},
};

/// What one worker did over its lifetime.
#[derive(Debug)]
pub struct WorkerReport {
    pub worker_id: usize,
    pub rollouts: usize,
    /// Environment steps this worker contributed to the global counter.
    pub steps: u64,
    /// Mean loss change of each completed summary window, in order.
    pub window_means: Vec<f32>,
}

/// One asynchronous training thread's state.
///
/// Owns a private model parameter copy, one problem episode and both recurrent
/// states; shares nothing with other workers except the parameter store. Each
/// iteration syncs the private copy from the store, rolls out up to
/// `local_t_max` steps, computes bootstrapped returns and pushes the resulting
/// gradients back.
pub struct TrainingWorker<P: Problem> {
    id: usize,
    model: ActorCritic,
    problem: P,
    problem_state: P::State,
    store: ParameterStore<RmsProp>,
    state: RecurrentState,
    params: Vec<f32>,
    grad: Vec<f32>,
    rng: StdRng,
    episode_step: usize,

    local_t_max: usize,
    discount_rate: f32,
    entropy_beta: f32,
    summary_freq: usize,
    max_time_steps: u64,
    advantage_weighting: bool,
    episode_length: usize,
}

impl<P: Problem> TrainingWorker<P> {
    /// Creates a new `TrainingWorker`.
    ///
    /// # Arguments
    /// * `id` - Identifier used for observability.
    /// * `model` - This worker's private model structure.
    /// * `problem` - The optimization target generator this worker trains on.
    /// * `store` - Shared parameter store handle.
    /// * `config` - The run's configuration.
    /// * `seed` - Seed for every random draw this worker makes.
    pub fn new(
        id: usize,
        model: ActorCritic,
        problem: P,
        store: ParameterStore<RmsProp>,
        config: &TrainerConfig,
        seed: u64,
    ) -> Self {
        let mut rng = StdRng::seed_from_u64(seed);
        let problem_state = problem.reset(&mut rng);
        let state = model.initial_state();
        let params = vec![0.0; model.param_len()];
        let grad = vec![0.0; model.param_len()];

        Self {
            id,
            model,
            problem,
            problem_state,
            store,
            state,
            params,
            grad,
            rng,
            episode_step: 0,
            local_t_max: config.local_t_max,
            discount_rate: config.discount_rate,
            entropy_beta: config.entropy_beta,
            summary_freq: config.summary_freq,
            max_time_steps: config.max_time_steps,
            advantage_weighting: config.advantage_weighting,
            episode_length: config.landscape.max_episode_steps,
        }
    }

    /// Runs the rollout/update cycle until the stop signal or the global step
    /// budget is observed. Both are checked once per iteration, so the final
    /// global count may overshoot the budget by up to one rollout per worker.
    pub fn run(mut self, token: &CancellationToken) -> Result<WorkerReport> {
        let mut rollouts = 0;
        let mut steps_taken = 0;
        let mut window_changes = Vec::new();
        let mut window_signs = Vec::new();
        let mut window_means = Vec::new();

        loop {
            if token.is_cancelled() {
                debug!(worker_id = self.id as u64; "stop requested");
                break;
            }
            if self.store.steps() > self.max_time_steps {
                debug!(worker_id = self.id as u64; "step budget reached");
                break;
            }

            self.store.read_into(&mut self.params)?;
            let start_state = self.state.clone();
            let trajectory = self.rollout()?;
            let report = self.update(&trajectory, &start_state)?;

            let diff = trajectory.len() as u64;
            steps_taken += diff;
            let global_step = self.store.add_steps(diff);

            rollouts += 1;
            let change = trajectory.mean_loss_change();
            window_changes.push(change);
            window_signs.push(sign(change));

            if rollouts % self.summary_freq == 0 {
                let mean_change = mean(&window_changes);
                let mean_signed = mean(&window_signs);
                info!(
                    worker_id = self.id as u64, global_step = global_step;
                    "rollout summary: mean_change={mean_change:.4} mean_signed={mean_signed:.4} total_loss={:.4}",
                    report.total(),
                );
                window_means.push(mean_change);
                window_changes.clear();
                window_signs.clear();
            }
        }

        info!(worker_id = self.id as u64; "worker finished");
        Ok(WorkerReport {
            worker_id: self.id,
            rollouts,
            steps: steps_taken,
            window_means,
        })
    }

    /// Collects up to `local_t_max` transitions, cutting the rollout short
    /// when the episode terminates.
    fn rollout(&mut self) -> Result<Trajectory> {
        let mut trajectory = Trajectory::with_capacity(self.local_t_max);

        for _ in 0..self.local_t_max {
            let loss_before = self.problem.loss(&self.problem_state);
            let observation = self.problem.observe(&self.problem_state, &mut self.rng);

            let (mean, variance) =
                self.model
                    .act(&self.params, observation.view(), &mut self.state)?;
            let value = self.model.evaluate(&self.params, loss_before, &mut self.state)?;
            let action = policy::sample(mean.view(), variance.view(), &mut self.rng);

            let outcome = self
                .problem
                .step(&mut self.problem_state, action.view(), &mut self.rng);

            trajectory.push(StepRecord {
                observation,
                action,
                reward: -outcome.loss_delta,
                value,
                loss: loss_before,
                episode_step: self.episode_step,
            });
            self.episode_step += 1;

            if outcome.terminated {
                trajectory.mark_terminated();
                self.state.reset();
                self.problem_state = self.problem.reset(&mut self.rng);
                self.episode_step = 0;
                break;
            }
        }

        Ok(trajectory)
    }

    /// Turns one trajectory into a gradient push against the shared store.
    fn update(&mut self, trajectory: &Trajectory, start_state: &RecurrentState) -> Result<LossReport> {
        let bootstrap = if trajectory.terminated() {
            0.0
        } else {
            let loss = self.problem.loss(&self.problem_state);
            self.model.peek_value(&self.params, loss, &self.state)?
        };

        let (returns, mut advantages) =
            rollout::compute_returns(trajectory, bootstrap, self.discount_rate);
        if self.advantage_weighting {
            for (adv, &episode_step) in advantages.iter_mut().zip(trajectory.episode_steps()) {
                *adv *= rollout::advantage_weight(self.discount_rate, self.episode_length, episode_step);
            }
        }

        let batch = TrainingBatch {
            observations: trajectory.observations(),
            actions: trajectory.actions(),
            losses: trajectory.losses(),
            returns: &returns,
            advantages: &advantages,
            initial_state: start_state,
            entropy_beta: self.entropy_beta,
        };

        self.grad.fill(0.0);
        let report = self.model.unroll_gradients(&self.params, &mut self.grad, &batch)?;
        self.store.apply(&mut self.grad)?;
        Ok(report)
    }
}

fn mean(xs: &[f32]) -> f32 {
    if xs.is_empty() {
        return 0.0;
    }
    xs.iter().sum::<f32>() / xs.len() as f32
}

fn sign(x: f32) -> f32 {
    if x > 0.0 {
        1.0
    } else if x < 0.0 {
        -1.0
    } else {
        0.0
    }
}
