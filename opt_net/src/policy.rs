//! Per-dimension Gaussian policy math.
//!
//! The policy emits one mean/variance pair per problem dimension; densities
//! and entropies are averaged across dimensions so trajectories of different
//! dimensionality stay comparable.

use std::f32::consts::TAU;

use ndarray::{Array1, ArrayView1};
use rand::Rng;
use rand_distr::StandardNormal;

/// Variances are never allowed below this floor; it keeps the density and the
/// entropy finite for any finite input.
pub const VARIANCE_FLOOR: f32 = 1e-5;

/// Mean log probability density of `action` under the emitted Gaussian.
pub fn log_density(
    action: ArrayView1<f32>,
    mean: ArrayView1<f32>,
    variance: ArrayView1<f32>,
) -> f32 {
    let n = action.len() as f32;
    action
        .iter()
        .zip(mean)
        .zip(variance)
        .map(|((&a, &m), &v)| {
            let diff = a - m;
            -0.5 * (TAU * v).ln() - diff * diff / (2.0 * v)
        })
        .sum::<f32>()
        / n
}

/// Mean entropy of the emitted Gaussian, `0.5·(ln(2πσ²) + 1)` per dimension.
pub fn entropy(variance: ArrayView1<f32>) -> f32 {
    let n = variance.len() as f32;
    variance
        .iter()
        .map(|&v| 0.5 * ((TAU * v).ln() + 1.0))
        .sum::<f32>()
        / n
}

/// Samples one action from the emitted Gaussian.
pub fn sample<R: Rng>(
    mean: ArrayView1<f32>,
    variance: ArrayView1<f32>,
    rng: &mut R,
) -> Array1<f32> {
    Array1::from_iter(mean.iter().zip(variance).map(|(&m, &v)| {
        let z: f32 = rng.sample(StandardNormal);
        m + v.max(VARIANCE_FLOOR).sqrt() * z
    }))
}
