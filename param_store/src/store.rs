use std::sync::{
    Arc,
    atomic::{AtomicU64, Ordering},
};

use log::debug;
use parking_lot::Mutex;
use rayon::prelude::*;

use crate::{Optimizer, Result, StoreErr, TensorSpec};

/// The single shared set of trainable parameters, plus the global counter of
/// environment steps consumed so far.
///
/// Tensors live behind individual locks: concurrent workers contend per
/// tensor, never on the store as a whole, so two updates touching different
/// tensors interleave freely while updates to the same tensor serialize.
/// Cloning shares the underlying slots.
pub struct ParameterStore<O> {
    slots: Arc<[Slot<O>]>,
    steps: Arc<AtomicU64>,
    clip_norm: f32,
    nparams: usize,
}

struct Slot<O> {
    spec: TensorSpec,
    inner: Mutex<SlotInner<O>>,
}

struct SlotInner<O> {
    values: Vec<f32>,
    optimizer: O,
}

impl<O> Clone for ParameterStore<O> {
    fn clone(&self) -> Self {
        Self {
            slots: Arc::clone(&self.slots),
            steps: Arc::clone(&self.steps),
            clip_norm: self.clip_norm,
            nparams: self.nparams,
        }
    }
}

impl<O: Optimizer> ParameterStore<O> {
    /// Creates a new `ParameterStore`.
    ///
    /// # Arguments
    /// * `layout` - Ordered tensor specs describing the flat parameter vector.
    /// * `init` - Initial parameter values, one flat slice covering the layout.
    /// * `clip_norm` - Global gradient-norm bound applied in `apply`; a value
    ///   `<= 0` disables clipping.
    /// * `factory` - An `Optimizer` factory closure, called once per tensor.
    ///
    /// # Returns
    /// A `SizeMismatch` error if `init` does not cover the layout exactly.
    pub fn new<F>(layout: Vec<TensorSpec>, init: &[f32], clip_norm: f32, mut factory: F) -> Result<Self>
    where
        F: FnMut(usize) -> O,
    {
        let nparams: usize = layout.iter().map(TensorSpec::len).sum();
        if init.len() != nparams {
            return Err(StoreErr::SizeMismatch {
                what: "initial parameters",
                got: init.len(),
                expected: nparams,
            });
        }

        let mut slots = Vec::with_capacity(layout.len());
        let mut offset = 0;
        for spec in layout {
            let len = spec.len();
            let inner = SlotInner {
                values: init[offset..offset + len].to_vec(),
                optimizer: factory(len),
            };
            slots.push(Slot {
                spec,
                inner: Mutex::new(inner),
            });
            offset += len;
        }

        Ok(Self {
            slots: Arc::from(slots),
            steps: Arc::new(AtomicU64::new(0)),
            clip_norm,
            nparams,
        })
    }

    /// Total number of scalar parameters.
    pub fn len(&self) -> usize {
        self.nparams
    }

    pub fn is_empty(&self) -> bool {
        self.nparams == 0
    }

    /// The ordered tensor specs this store was built from.
    pub fn layout(&self) -> Vec<TensorSpec> {
        self.slots.iter().map(|slot| slot.spec.clone()).collect()
    }

    /// Adds `n` consumed environment steps and returns the new total.
    pub fn add_steps(&self, n: u64) -> u64 {
        self.steps.fetch_add(n, Ordering::AcqRel) + n
    }

    /// Total environment steps consumed so far. May lag concurrent increments
    /// by a few rollouts, which callers must tolerate.
    pub fn steps(&self) -> u64 {
        self.steps.load(Ordering::Acquire)
    }
}

impl<O: Optimizer + Send> ParameterStore<O> {
    /// Copies every tensor's current values into a worker's flat buffer.
    ///
    /// Each tensor is copied under its own lock; the result is not a single
    /// atomic snapshot across tensors, which is tolerated by design.
    ///
    /// # Arguments
    /// * `out` - A mutable slice covering the whole layout.
    pub fn read_into(&self, out: &mut [f32]) -> Result<()> {
        if out.len() != self.nparams {
            return Err(StoreErr::SizeMismatch {
                what: "parameter buffer",
                got: out.len(),
                expected: self.nparams,
            });
        }

        let mut chunks = Vec::with_capacity(self.slots.len());
        let mut rest = out;
        for slot in self.slots.iter() {
            let (head, tail) = rest.split_at_mut(slot.spec.len());
            chunks.push(head);
            rest = tail;
        }

        self.slots.par_iter().zip(chunks).for_each(|(slot, chunk)| {
            chunk.copy_from_slice(&slot.inner.lock().values);
        });

        Ok(())
    }

    /// Pushes one worker's gradient into the shared parameters.
    ///
    /// The global gradient norm is clipped to the configured bound first, then
    /// every tensor is updated under its own lock by its optimizer instance.
    /// Non-finite gradients are dropped whole instead of poisoning the
    /// parameters.
    ///
    /// # Arguments
    /// * `grad` - A flat gradient covering the whole layout; scaled in place
    ///   when clipping applies.
    pub fn apply(&self, grad: &mut [f32]) -> Result<()> {
        if grad.len() != self.nparams {
            return Err(StoreErr::SizeMismatch {
                what: "gradient",
                got: grad.len(),
                expected: self.nparams,
            });
        }

        let norm = grad.iter().map(|g| g * g).sum::<f32>().sqrt();
        if !norm.is_finite() {
            debug!(norm = norm as f64; "dropping non-finite gradient");
            return Ok(());
        }
        if self.clip_norm > 0.0 && norm > self.clip_norm {
            let scale = self.clip_norm / norm;
            for g in grad.iter_mut() {
                *g *= scale;
            }
        }

        let mut chunks = Vec::with_capacity(self.slots.len());
        let mut rest = &grad[..];
        for slot in self.slots.iter() {
            let (head, tail) = rest.split_at(slot.spec.len());
            chunks.push(head);
            rest = tail;
        }

        self.slots.par_iter().zip(chunks).for_each(|(slot, chunk)| {
            let mut inner = slot.inner.lock();
            let SlotInner { values, optimizer } = &mut *inner;
            optimizer.update_params(values, chunk);
        });

        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    struct AddOptimizer;

    impl Optimizer for AddOptimizer {
        fn update_params(&mut self, params: &mut [f32], grad: &[f32]) {
            for (p, g) in params.iter_mut().zip(grad) {
                *p += g;
            }
        }
    }

    fn test_layout() -> Vec<TensorSpec> {
        vec![
            TensorSpec::new("a/w", vec![2, 3]),
            TensorSpec::new("a/b", vec![3]),
            TensorSpec::new("b/w", vec![4]),
        ]
    }

    fn create_test_store(clip_norm: f32) -> ParameterStore<AddOptimizer> {
        let layout = test_layout();
        let init: Vec<f32> = (0..13).map(|i| i as f32).collect();
        ParameterStore::new(layout, &init, clip_norm, |_| AddOptimizer).unwrap()
    }

    #[test]
    fn test_read_back_initial_parameters() {
        let store = create_test_store(0.0);
        let mut out = vec![0.0; store.len()];
        store.read_into(&mut out).unwrap();

        let expected: Vec<f32> = (0..13).map(|i| i as f32).collect();
        assert_eq!(out, expected);
    }

    #[test]
    fn test_apply_accumulates_into_parameters() {
        let store = create_test_store(0.0);
        let mut grad = vec![1.0; store.len()];
        store.apply(&mut grad).unwrap();

        let mut out = vec![0.0; store.len()];
        store.read_into(&mut out).unwrap();
        let expected: Vec<f32> = (0..13).map(|i| i as f32 + 1.0).collect();
        assert_eq!(out, expected);
    }

    #[test]
    fn test_apply_rejects_size_mismatch() {
        let store = create_test_store(0.0);
        let mut grad = vec![1.0; store.len() + 1];
        assert!(store.apply(&mut grad).is_err());

        let mut out = vec![0.0; store.len() - 1];
        assert!(store.read_into(&mut out).is_err());
    }

    #[test]
    fn test_clip_scales_gradient_to_bound() {
        let layout = vec![TensorSpec::new("w", vec![2])];
        let store = ParameterStore::new(layout, &[0.0, 0.0], 1.0, |_| AddOptimizer).unwrap();

        let mut grad = vec![3.0, 4.0];
        store.apply(&mut grad).unwrap();

        let mut out = vec![0.0; 2];
        store.read_into(&mut out).unwrap();
        assert!((out[0] - 0.6).abs() < 1e-6);
        assert!((out[1] - 0.8).abs() < 1e-6);
    }

    #[test]
    fn test_non_finite_gradient_is_dropped() {
        let store = create_test_store(1.0);
        let mut grad = vec![f32::NAN; store.len()];
        store.apply(&mut grad).unwrap();

        let mut out = vec![0.0; store.len()];
        store.read_into(&mut out).unwrap();
        let expected: Vec<f32> = (0..13).map(|i| i as f32).collect();
        assert_eq!(out, expected);
    }

    #[test]
    fn test_step_counter_is_monotonic() {
        let store = create_test_store(0.0);
        assert_eq!(store.steps(), 0);
        assert_eq!(store.add_steps(5), 5);
        assert_eq!(store.add_steps(3), 8);
        assert_eq!(store.steps(), 8);
    }

    #[test]
    fn test_init_size_mismatch_is_rejected() {
        let layout = test_layout();
        let init = vec![0.0; 12];
        assert!(ParameterStore::new(layout, &init, 0.0, |_| AddOptimizer).is_err());
    }
}
