mod basic;
mod gru;

use std::{fmt, str::FromStr};

use ndarray::{Array2, ArrayView2};
use param_store::TensorSpec;

pub use basic::{BasicCache, BasicCell};
pub use gru::{GruCache, GruCell};

use crate::{OptNetErr, Result};

/// Selectable recurrent cell variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CellKind {
    Basic,
    Gru,
    Lstm,
}

impl fmt::Display for CellKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let s = match self {
            Self::Basic => "basic",
            Self::Gru => "gru",
            Self::Lstm => "lstm",
        };
        write!(f, "{s}")
    }
}

impl FromStr for CellKind {
    type Err = OptNetErr;

    fn from_str(s: &str) -> Result<Self> {
        match s {
            "basic" | "rnn" => Ok(Self::Basic),
            "gru" => Ok(Self::Gru),
            "lstm" => Ok(Self::Lstm),
            other => Err(OptNetErr::UnknownCell(other.to_string())),
        }
    }
}

/// A single-layer recurrent cell processing one time step per call.
pub enum RecurrentCell {
    Basic(BasicCell),
    Gru(GruCell),
}

/// Forward metadata one cell step leaves behind for the backward pass.
pub enum CellCache {
    Basic(BasicCache),
    Gru(GruCache),
}

impl RecurrentCell {
    /// Builds the requested cell variant.
    ///
    /// # Arguments
    /// * `kind` - The cell variant to construct.
    /// * `input` - Input features per step.
    /// * `hidden` - Hidden state width.
    ///
    /// # Returns
    /// An `UnsupportedCell` error for variants without an implementation.
    pub fn new(kind: CellKind, input: usize, hidden: usize) -> Result<Self> {
        match kind {
            CellKind::Basic => Ok(Self::Basic(BasicCell::new(input, hidden))),
            CellKind::Gru => Ok(Self::Gru(GruCell::new(input, hidden))),
            CellKind::Lstm => Err(OptNetErr::UnsupportedCell { kind }),
        }
    }

    /// The amount of parameters this cell has.
    pub fn size(&self) -> usize {
        match self {
            Self::Basic(cell) => cell.size(),
            Self::Gru(cell) => cell.size(),
        }
    }

    pub fn hidden(&self) -> usize {
        match self {
            Self::Basic(cell) => cell.hidden(),
            Self::Gru(cell) => cell.hidden(),
        }
    }

    pub fn layout(&self, prefix: &str) -> Vec<TensorSpec> {
        match self {
            Self::Basic(cell) => cell.layout(prefix),
            Self::Gru(cell) => cell.layout(prefix),
        }
    }

    /// Advances the hidden state by one step.
    pub fn forward(
        &self,
        params: &[f32],
        x: ArrayView2<f32>,
        h: ArrayView2<f32>,
    ) -> (Array2<f32>, CellCache) {
        match self {
            Self::Basic(cell) => {
                let (h_new, cache) = cell.forward(params, x, h);
                (h_new, CellCache::Basic(cache))
            }
            Self::Gru(cell) => {
                let (h_new, cache) = cell.forward(params, x, h);
                (h_new, CellCache::Gru(cache))
            }
        }
    }

    /// Accumulates this cell's parameter gradients for one step and returns
    /// the gradient with respect to the previous hidden state.
    pub fn backward(
        &self,
        params: &[f32],
        grad: &mut [f32],
        cache: &CellCache,
        d_h: Array2<f32>,
    ) -> Array2<f32> {
        match (self, cache) {
            (Self::Basic(cell), CellCache::Basic(cache)) => cell.backward(params, grad, cache, d_h),
            (Self::Gru(cell), CellCache::Gru(cache)) => cell.backward(params, grad, cache, d_h),
            _ => unreachable!("cache does not belong to this cell variant"),
        }
    }
}
