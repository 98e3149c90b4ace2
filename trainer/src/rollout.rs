//! Per-rollout bookkeeping: the recorded trajectory and the bootstrapped
//! return/advantage computation.

use ndarray::Array1;

/// One recorded transition.
pub struct StepRecord {
    /// Gradient observation the policy acted on.
    pub observation: Array1<f32>,
    /// Update vector sampled from the policy.
    pub action: Array1<f32>,
    /// Negated loss change: a loss decrease is a positive reward.
    pub reward: f32,
    /// Critic estimate at this step's state.
    pub value: f32,
    /// Loss at the state, before the action was applied.
    pub loss: f32,
    /// Step index within the surrounding episode.
    pub episode_step: usize,
}

/// The ordered transitions of one rollout. Built and discarded every rollout.
#[derive(Default)]
pub struct Trajectory {
    observations: Vec<Array1<f32>>,
    actions: Vec<Array1<f32>>,
    rewards: Vec<f32>,
    values: Vec<f32>,
    losses: Vec<f32>,
    episode_steps: Vec<usize>,
    terminated: bool,
}

impl Trajectory {
    pub fn with_capacity(n: usize) -> Self {
        Self {
            observations: Vec::with_capacity(n),
            actions: Vec::with_capacity(n),
            rewards: Vec::with_capacity(n),
            values: Vec::with_capacity(n),
            losses: Vec::with_capacity(n),
            episode_steps: Vec::with_capacity(n),
            terminated: false,
        }
    }

    pub fn push(&mut self, step: StepRecord) {
        self.observations.push(step.observation);
        self.actions.push(step.action);
        self.rewards.push(step.reward);
        self.values.push(step.value);
        self.losses.push(step.loss);
        self.episode_steps.push(step.episode_step);
    }

    /// Marks that the episode ended with the last recorded step.
    pub fn mark_terminated(&mut self) {
        self.terminated = true;
    }

    pub fn terminated(&self) -> bool {
        self.terminated
    }

    pub fn len(&self) -> usize {
        self.rewards.len()
    }

    pub fn is_empty(&self) -> bool {
        self.rewards.is_empty()
    }

    pub fn observations(&self) -> &[Array1<f32>] {
        &self.observations
    }

    pub fn actions(&self) -> &[Array1<f32>] {
        &self.actions
    }

    pub fn rewards(&self) -> &[f32] {
        &self.rewards
    }

    pub fn values(&self) -> &[f32] {
        &self.values
    }

    pub fn losses(&self) -> &[f32] {
        &self.losses
    }

    pub fn episode_steps(&self) -> &[usize] {
        &self.episode_steps
    }

    /// Average loss change across the rollout's steps.
    pub fn mean_loss_change(&self) -> f32 {
        if self.rewards.is_empty() {
            return 0.0;
        }
        -self.rewards.iter().sum::<f32>() / self.rewards.len() as f32
    }
}

/// Walks the trajectory backwards, accumulating the discounted return
/// `R_t = reward_t + discount_rate · R_{t+1}` from `bootstrap`, and the
/// temporal-difference advantage `R_t − V(s_t)` per step.
///
/// # Arguments
/// * `trajectory` - The rollout to process.
/// * `bootstrap` - Final value estimate: 0 if the episode terminated, else
///   the critic's estimate at the state after the last step.
/// * `discount_rate` - Per-step discount.
pub fn compute_returns(
    trajectory: &Trajectory,
    bootstrap: f32,
    discount_rate: f32,
) -> (Vec<f32>, Vec<f32>) {
    let len = trajectory.len();
    let mut returns = vec![0.0; len];
    let mut advantages = vec![0.0; len];

    let mut running = bootstrap;
    for i in (0..len).rev() {
        running = trajectory.rewards()[i] + discount_rate * running;
        returns[i] = running;
        advantages[i] = running - trajectory.values()[i];
    }

    (returns, advantages)
}

/// Weight of a step's advantage by its position in the episode.
///
/// The denominator is floored: near the end of an episode the raw expression
/// degenerates to 0/0 and has produced non-finite values in long runs.
pub fn advantage_weight(discount_rate: f32, episode_length: usize, episode_step: usize) -> f32 {
    let remaining = episode_length.saturating_sub(episode_step);
    let tmp = discount_rate.powi(remaining as i32);
    tmp * (1.0 - discount_rate) / (1.0 - tmp).max(1e-6)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn step(reward: f32, value: f32) -> StepRecord {
        StepRecord {
            observation: Array1::zeros(2),
            action: Array1::zeros(2),
            reward,
            value,
            loss: 0.0,
            episode_step: 0,
        }
    }

    #[test]
    fn test_terminal_single_step_bootstraps_from_zero() {
        let mut trajectory = Trajectory::with_capacity(1);
        trajectory.push(step(2.0, 0.5));
        trajectory.mark_terminated();

        let (returns, advantages) = compute_returns(&trajectory, 0.0, 0.99);
        assert_eq!(returns, vec![2.0]);
        assert_eq!(advantages, vec![1.5]);
    }

    #[test]
    fn test_returns_discount_towards_the_bootstrap() {
        let mut trajectory = Trajectory::with_capacity(3);
        trajectory.push(step(1.0, 0.0));
        trajectory.push(step(1.0, 0.0));
        trajectory.push(step(1.0, 0.0));

        let (returns, _) = compute_returns(&trajectory, 10.0, 0.5);
        // Backwards: 1 + 0.5·10 = 6, 1 + 0.5·6 = 4, 1 + 0.5·4 = 3.
        assert_eq!(returns, vec![3.0, 4.0, 6.0]);
    }

    #[test]
    fn test_constant_positive_rewards_give_positive_advantages() {
        let mut trajectory = Trajectory::with_capacity(5);
        for _ in 0..5 {
            trajectory.push(step(1.0, 0.0));
        }
        trajectory.mark_terminated();

        let (_, advantages) = compute_returns(&trajectory, 0.0, 0.99);
        assert_eq!(advantages.len(), 5);
        for &adv in &advantages {
            assert!(adv > 0.0);
        }
    }

    #[test]
    fn test_mean_loss_change_negates_rewards() {
        let mut trajectory = Trajectory::with_capacity(2);
        trajectory.push(step(1.0, 0.0));
        trajectory.push(step(3.0, 0.0));
        assert_eq!(trajectory.mean_loss_change(), -2.0);
    }

    #[test]
    fn test_advantage_weight_stays_finite_at_episode_end() {
        for episode_step in [0, 50, 99, 100, 150] {
            let w = advantage_weight(0.99, 100, episode_step);
            assert!(w.is_finite(), "weight at step {episode_step} is not finite");
            assert!(w >= 0.0);
        }
    }
}
