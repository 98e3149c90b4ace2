use ndarray::{Array1, ArrayView1};
use rand::Rng;

/// Result of applying one proposed update to a problem instance.
#[derive(Debug, Clone, Copy)]
pub struct StepOutcome {
    /// Signed change of the loss caused by the step (negative means improvement).
    pub loss_delta: f32,
    /// Whether the episode ended with this step.
    pub terminated: bool,
}

/// A stateful optimization target.
///
/// Implementations act as stateless generators: all episode state lives in the
/// associated `State` type, which is exclusively owned by a single worker.
pub trait Problem {
    type State;

    /// Dimensionality of positions, observations and actions.
    fn dimensions(&self) -> usize;

    /// Draws a fresh problem instance together with an initial position.
    fn reset<R: Rng>(&self, rng: &mut R) -> Self::State;

    /// Returns a (possibly noisy) directional signal at the current position
    /// without mutating the state.
    fn observe<R: Rng>(&self, state: &Self::State, rng: &mut R) -> Array1<f32>;

    /// Applies a proposed update vector to the position and recomputes the loss.
    ///
    /// # Arguments
    /// * `state` - The episode state to advance.
    /// * `action` - The update vector added to the current position.
    ///
    /// # Returns
    /// The signed loss change and whether the episode terminated.
    fn step<R: Rng>(&self, state: &mut Self::State, action: ArrayView1<f32>, rng: &mut R)
    -> StepOutcome;

    /// Current loss at the state's position.
    fn loss(&self, state: &Self::State) -> f32;
}
