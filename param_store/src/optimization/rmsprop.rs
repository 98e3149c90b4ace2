use super::Optimizer;

/// RMSProp with momentum.
///
/// Keeps a moving average of the squared gradient per parameter and scales the
/// step by its inverse square root, so dimensions with persistently large
/// gradients take smaller steps.
pub struct RmsProp {
    learning_rate: f32,
    alpha: f32,
    momentum: f32,
    epsilon: f32,
    mean_square: Vec<f32>,
    velocity: Vec<f32>,
}

impl RmsProp {
    /// Returns a new `RmsProp` for a tensor of `len` parameters.
    ///
    /// # Arguments
    /// * `len` - Number of parameters the accumulators must cover.
    /// * `learning_rate` - Base step length.
    /// * `alpha` - Decay of the squared-gradient moving average.
    /// * `momentum` - Decay of the velocity buffer.
    /// * `epsilon` - Added to the root-mean-square before dividing.
    pub fn new(len: usize, learning_rate: f32, alpha: f32, momentum: f32, epsilon: f32) -> Self {
        Self {
            learning_rate,
            alpha,
            momentum,
            epsilon,
            mean_square: vec![0.0; len],
            velocity: vec![0.0; len],
        }
    }
}

impl Optimizer for RmsProp {
    fn update_params(&mut self, params: &mut [f32], grad: &[f32]) {
        let (lr, alpha, mu, eps) = (self.learning_rate, self.alpha, self.momentum, self.epsilon);

        for (((p, &g), ms), v) in params
            .iter_mut()
            .zip(grad)
            .zip(self.mean_square.iter_mut())
            .zip(self.velocity.iter_mut())
        {
            *ms = alpha * *ms + (1.0 - alpha) * g * g;
            *v = mu * *v + lr * g / (ms.sqrt() + eps);
            *p -= *v;
        }
    }
}
