use ndarray::{linalg, prelude::*};
use param_store::TensorSpec;

/// A gated recurrent unit.
///
/// Gate pre-activations share one `[(input + hidden), 2·hidden]` tensor with
/// the reset gate in the first `hidden` columns and the update gate in the
/// rest; the candidate has its own `[(input + hidden), hidden]` tensor.
///
/// ```text
/// r  = sigmoid(x·Wgx[..h] + h·Wgh[..h] + bg[..h])
/// u  = sigmoid(x·Wgx[h..] + h·Wgh[h..] + bg[h..])
/// c  = tanh(x·Wcx + (r ⊙ h)·Wch + bc)
/// h' = u ⊙ h + (1 − u) ⊙ c
/// ```
#[derive(Debug, Clone)]
pub struct GruCell {
    input: usize,
    hidden: usize,
}

/// Forward metadata for one step of a [`GruCell`].
pub struct GruCache {
    x: Array2<f32>,
    h_prev: Array2<f32>,
    r: Array2<f32>,
    u: Array2<f32>,
    c: Array2<f32>,
    rh: Array2<f32>,
}

impl GruCell {
    pub fn new(input: usize, hidden: usize) -> Self {
        Self { input, hidden }
    }

    pub fn size(&self) -> usize {
        3 * (self.input + self.hidden + 1) * self.hidden
    }

    pub fn hidden(&self) -> usize {
        self.hidden
    }

    pub fn layout(&self, prefix: &str) -> Vec<TensorSpec> {
        let rows = self.input + self.hidden;
        vec![
            TensorSpec::new(format!("{prefix}/gates_w"), vec![rows, 2 * self.hidden]),
            TensorSpec::new(format!("{prefix}/gates_b"), vec![2 * self.hidden]),
            TensorSpec::new(format!("{prefix}/cand_w"), vec![rows, self.hidden]),
            TensorSpec::new(format!("{prefix}/cand_b"), vec![self.hidden]),
        ]
    }

    pub fn forward(
        &self,
        params: &[f32],
        x: ArrayView2<f32>,
        h: ArrayView2<f32>,
    ) -> (Array2<f32>, GruCache) {
        let (wg, bg, wc, bc) = self.view_params(params);
        let (wgx, wgh) = wg.split_at(Axis(0), self.input);
        let batch = x.nrows();

        let mut ag = Array2::zeros((batch, 2 * self.hidden));
        linalg::general_mat_mul(1.0, &x, &wgx, 0.0, &mut ag);
        linalg::general_mat_mul(1.0, &h, &wgh, 1.0, &mut ag);
        ag += &bg;

        let r = ag.slice(s![.., ..self.hidden]).mapv(sigmoid);
        let u = ag.slice(s![.., self.hidden..]).mapv(sigmoid);
        let rh = &r * &h;

        let (wcx, wch) = wc.split_at(Axis(0), self.input);
        let mut ac = Array2::zeros((batch, self.hidden));
        linalg::general_mat_mul(1.0, &x, &wcx, 0.0, &mut ac);
        linalg::general_mat_mul(1.0, &rh, &wch, 1.0, &mut ac);
        ac += &bc;
        let c = ac.mapv(f32::tanh);

        let kept = u.mapv(|v| 1.0 - v);
        let h_new = &u * &h + &kept * &c;

        let cache = GruCache {
            x: x.to_owned(),
            h_prev: h.to_owned(),
            r,
            u,
            c,
            rh,
        };
        (h_new, cache)
    }

    /// Accumulates one step's parameter gradients from `d_h`, the gradient of
    /// the loss with respect to the step's output state.
    pub fn backward(
        &self,
        params: &[f32],
        grad: &mut [f32],
        cache: &GruCache,
        d_h: Array2<f32>,
    ) -> Array2<f32> {
        let GruCache {
            x,
            h_prev,
            r,
            u,
            c,
            rh,
        } = cache;
        let (wg, _, wc, _) = self.view_params(params);
        let (mut dwg, mut dbg, mut dwc, mut dbc) = self.view_grad(grad);
        let batch = d_h.nrows();

        let du = &d_h * &(h_prev - c);
        let dc = &d_h * &u.mapv(|v| 1.0 - v);
        let mut d_prev = &d_h * u;

        // Candidate branch.
        let mut da_c = dc;
        da_c.zip_mut_with(c, |d, &cv| *d *= 1.0 - cv * cv);

        let (mut dwcx, mut dwch) = dwc.view_mut().split_at(Axis(0), self.input);
        linalg::general_mat_mul(1.0, &x.t(), &da_c, 1.0, &mut dwcx);
        linalg::general_mat_mul(1.0, &rh.t(), &da_c, 1.0, &mut dwch);
        dbc.zip_mut_with(&da_c.sum_axis(Axis(0)), |b, &v| *b += v);

        let wch = wc.slice(s![self.input.., ..]);
        let mut d_rh = Array2::zeros((batch, self.hidden));
        linalg::general_mat_mul(1.0, &da_c, &wch.t(), 0.0, &mut d_rh);

        let dr = &d_rh * h_prev;
        d_prev += &(&d_rh * r);

        // Gate branch.
        let da_r = &dr * &r.mapv(|v| v * (1.0 - v));
        let da_u = &du * &u.mapv(|v| v * (1.0 - v));
        let mut da_g = Array2::zeros((batch, 2 * self.hidden));
        da_g.slice_mut(s![.., ..self.hidden]).assign(&da_r);
        da_g.slice_mut(s![.., self.hidden..]).assign(&da_u);

        let (mut dwgx, mut dwgh) = dwg.view_mut().split_at(Axis(0), self.input);
        linalg::general_mat_mul(1.0, &x.t(), &da_g, 1.0, &mut dwgx);
        linalg::general_mat_mul(1.0, &h_prev.t(), &da_g, 1.0, &mut dwgh);
        dbg.zip_mut_with(&da_g.sum_axis(Axis(0)), |b, &v| *b += v);

        let wgh = wg.slice(s![self.input.., ..]);
        let mut d_from_gates = Array2::zeros((batch, self.hidden));
        linalg::general_mat_mul(1.0, &da_g, &wgh.t(), 0.0, &mut d_from_gates);
        d_prev += &d_from_gates;

        d_prev
    }

    #[allow(clippy::type_complexity)]
    fn view_params<'a>(
        &self,
        params: &'a [f32],
    ) -> (
        ArrayView2<'a, f32>,
        ArrayView1<'a, f32>,
        ArrayView2<'a, f32>,
        ArrayView1<'a, f32>,
    ) {
        let rows = self.input + self.hidden;
        let (wg_raw, rest) = params.split_at(rows * 2 * self.hidden);
        let (bg_raw, rest) = rest.split_at(2 * self.hidden);
        let (wc_raw, bc_raw) = rest.split_at(rows * self.hidden);

        (
            ArrayView2::from_shape((rows, 2 * self.hidden), wg_raw).unwrap(),
            ArrayView1::from_shape(2 * self.hidden, bg_raw).unwrap(),
            ArrayView2::from_shape((rows, self.hidden), wc_raw).unwrap(),
            ArrayView1::from_shape(self.hidden, bc_raw).unwrap(),
        )
    }

    #[allow(clippy::type_complexity)]
    fn view_grad<'a>(
        &self,
        grad: &'a mut [f32],
    ) -> (
        ArrayViewMut2<'a, f32>,
        ArrayViewMut1<'a, f32>,
        ArrayViewMut2<'a, f32>,
        ArrayViewMut1<'a, f32>,
    ) {
        let rows = self.input + self.hidden;
        let (wg_raw, rest) = grad.split_at_mut(rows * 2 * self.hidden);
        let (bg_raw, rest) = rest.split_at_mut(2 * self.hidden);
        let (wc_raw, bc_raw) = rest.split_at_mut(rows * self.hidden);

        (
            ArrayViewMut2::from_shape((rows, 2 * self.hidden), wg_raw).unwrap(),
            ArrayViewMut1::from_shape(2 * self.hidden, bg_raw).unwrap(),
            ArrayViewMut2::from_shape((rows, self.hidden), wc_raw).unwrap(),
            ArrayViewMut1::from_shape(self.hidden, bc_raw).unwrap(),
        )
    }
}

fn sigmoid(x: f32) -> f32 {
    1.0 / (1.0 + (-x).exp())
}
