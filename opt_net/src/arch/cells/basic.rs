use ndarray::{linalg, prelude::*};
use param_store::TensorSpec;

/// A plain tanh recurrent cell: `h' = tanh(x·Wx + h·Wh + b)`.
///
/// The input and hidden weights live in one `[(input + hidden), hidden]`
/// tensor, input rows first.
#[derive(Debug, Clone)]
pub struct BasicCell {
    input: usize,
    hidden: usize,
}

/// Forward metadata for one step of a [`BasicCell`].
pub struct BasicCache {
    x: Array2<f32>,
    h_prev: Array2<f32>,
    h_new: Array2<f32>,
}

impl BasicCell {
    pub fn new(input: usize, hidden: usize) -> Self {
        Self { input, hidden }
    }

    pub fn size(&self) -> usize {
        (self.input + self.hidden + 1) * self.hidden
    }

    pub fn hidden(&self) -> usize {
        self.hidden
    }

    pub fn layout(&self, prefix: &str) -> Vec<TensorSpec> {
        vec![
            TensorSpec::new(
                format!("{prefix}/w"),
                vec![self.input + self.hidden, self.hidden],
            ),
            TensorSpec::new(format!("{prefix}/b"), vec![self.hidden]),
        ]
    }

    pub fn forward(
        &self,
        params: &[f32],
        x: ArrayView2<f32>,
        h: ArrayView2<f32>,
    ) -> (Array2<f32>, BasicCache) {
        let (w, b) = self.view_params(params);
        let (wx, wh) = w.split_at(Axis(0), self.input);

        let mut z = Array2::zeros((x.nrows(), self.hidden));
        linalg::general_mat_mul(1.0, &x, &wx, 0.0, &mut z);
        linalg::general_mat_mul(1.0, &h, &wh, 1.0, &mut z);
        z += &b;

        let h_new = z.mapv(f32::tanh);
        let cache = BasicCache {
            x: x.to_owned(),
            h_prev: h.to_owned(),
            h_new: h_new.clone(),
        };
        (h_new, cache)
    }

    /// Accumulates one step's parameter gradients from `d_h`, the gradient of
    /// the loss with respect to the step's output state.
    pub fn backward(
        &self,
        params: &[f32],
        grad: &mut [f32],
        cache: &BasicCache,
        mut d_h: Array2<f32>,
    ) -> Array2<f32> {
        // Through the tanh first.
        d_h.zip_mut_with(&cache.h_new, |d, &h| *d *= 1.0 - h * h);

        let (mut dw, mut db) = self.view_grad(grad);
        let (mut dwx, mut dwh) = dw.split_at(Axis(0), self.input);
        linalg::general_mat_mul(1.0, &cache.x.t(), &d_h, 1.0, &mut dwx);
        linalg::general_mat_mul(1.0, &cache.h_prev.t(), &d_h, 1.0, &mut dwh);
        db.zip_mut_with(&d_h.sum_axis(Axis(0)), |b, &v| *b += v);

        let (w, _) = self.view_params(params);
        let wh = w.slice(s![self.input.., ..]);
        let mut d_prev = Array2::zeros((d_h.nrows(), self.hidden));
        linalg::general_mat_mul(1.0, &d_h, &wh.t(), 0.0, &mut d_prev);
        d_prev
    }

    fn view_params<'a>(&self, params: &'a [f32]) -> (ArrayView2<'a, f32>, ArrayView1<'a, f32>) {
        let w_size = (self.input + self.hidden) * self.hidden;
        let weights =
            ArrayView2::from_shape((self.input + self.hidden, self.hidden), &params[..w_size])
                .unwrap();
        let biases = ArrayView1::from_shape(self.hidden, &params[w_size..]).unwrap();
        (weights, biases)
    }

    fn view_grad<'a>(&self, grad: &'a mut [f32]) -> (ArrayViewMut2<'a, f32>, ArrayViewMut1<'a, f32>) {
        let w_size = (self.input + self.hidden) * self.hidden;
        let (dw_raw, db_raw) = grad.split_at_mut(w_size);
        let dw = ArrayViewMut2::from_shape((self.input + self.hidden, self.hidden), dw_raw).unwrap();
        let db = ArrayViewMut1::from_shape(self.hidden, db_raw).unwrap();
        (dw, db)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_zero_parameters_keep_state_at_zero() {
        let cell = BasicCell::new(1, 3);
        let params = vec![0.0; cell.size()];
        let x = ndarray::array![[1.0], [2.0]];
        let h = Array2::zeros((2, 3));

        let (h_new, _) = cell.forward(&params, x.view(), h.view());
        assert_eq!(h_new, Array2::<f32>::zeros((2, 3)));
    }

    #[test]
    fn test_forward_is_deterministic() {
        let cell = BasicCell::new(2, 3);
        let params: Vec<f32> = (0..cell.size()).map(|i| (i as f32) * 0.01 - 0.05).collect();
        let x = ndarray::array![[0.3, -0.2]];
        let h = ndarray::array![[0.1, 0.0, -0.1]];

        let (a, _) = cell.forward(&params, x.view(), h.view());
        let (b, _) = cell.forward(&params, x.view(), h.view());
        assert_eq!(a, b);
        assert!(a.iter().all(|v| v.abs() < 1.0));
    }
}
