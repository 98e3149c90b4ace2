use ndarray::{linalg, prelude::*};
use param_store::TensorSpec;

/// A linear output head mapping a cell's hidden state to `dim.1` values per
/// batch row.
#[derive(Debug, Clone)]
pub struct Head {
    dim: (usize, usize),
}

impl Head {
    pub fn new(dim: (usize, usize)) -> Self {
        Self { dim }
    }

    /// The amount of parameters this head has.
    pub fn size(&self) -> usize {
        (self.dim.0 + 1) * self.dim.1
    }

    pub fn layout(&self, prefix: &str) -> Vec<TensorSpec> {
        vec![
            TensorSpec::new(format!("{prefix}/w"), vec![self.dim.0, self.dim.1]),
            TensorSpec::new(format!("{prefix}/b"), vec![self.dim.1]),
        ]
    }

    pub fn forward(&self, params: &[f32], x: ArrayView2<f32>) -> Array2<f32> {
        let (w, b) = self.view_params(params);
        let mut y = Array2::zeros((x.nrows(), self.dim.1));
        linalg::general_mat_mul(1.0, &x, &w, 0.0, &mut y);
        y += &b;
        y
    }

    /// Accumulates this head's parameter gradients and returns the gradient
    /// with respect to its input.
    ///
    /// # Arguments
    /// * `params` - This head's parameter slice.
    /// * `grad` - This head's gradient slice, accumulated into.
    /// * `x` - The input the corresponding `forward` call saw.
    /// * `d` - Gradient of the loss with respect to the head's output.
    pub fn backward(
        &self,
        params: &[f32],
        grad: &mut [f32],
        x: ArrayView2<f32>,
        d: ArrayView2<f32>,
    ) -> Array2<f32> {
        let (mut dw, mut db) = self.view_grad(grad);
        linalg::general_mat_mul(1.0, &x.t(), &d, 1.0, &mut dw);
        db.zip_mut_with(&d.sum_axis(Axis(0)), |b, &v| *b += v);

        let (w, _) = self.view_params(params);
        let mut dx = Array2::zeros((d.nrows(), self.dim.0));
        linalg::general_mat_mul(1.0, &d, &w.t(), 0.0, &mut dx);
        dx
    }

    /// Gives a view of the raw parameter slice as the weights and biases of this head.
    fn view_params<'a>(&self, params: &'a [f32]) -> (ArrayView2<'a, f32>, ArrayView1<'a, f32>) {
        let w_size = self.size() - self.dim.1;
        let weights = ArrayView2::from_shape(self.dim, &params[..w_size]).unwrap();
        let biases = ArrayView1::from_shape(self.dim.1, &params[w_size..]).unwrap();
        (weights, biases)
    }

    /// Gives a view of the raw gradient slice as the delta weights and delta biases.
    fn view_grad<'a>(&self, grad: &'a mut [f32]) -> (ArrayViewMut2<'a, f32>, ArrayViewMut1<'a, f32>) {
        let w_size = self.size() - self.dim.1;
        let (dw_raw, db_raw) = grad.split_at_mut(w_size);
        let dw = ArrayViewMut2::from_shape(self.dim, dw_raw).unwrap();
        let db = ArrayViewMut1::from_shape(self.dim.1, db_raw).unwrap();
        (dw, db)
    }
}
