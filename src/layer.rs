//! Dense layer: weights + bias, Adam-style moment estimation, and an
//! elastic-net weight decay pass, plus a residual skip connection over the
//! shared `min(in, out)` prefix of input/output.
//!
//! Grounded on `model.cpp`/`model.h` (`Layer::calc`, `Layer::backprop`,
//! `Layer::learn`, `Layer::normalize`).

use crate::numeric::{Buffer, MatSlice, Slice};
use rand::Rng;

const ADAM_RHO1: f32 = 0.1;
const ADAM_RHO2: f32 = 0.001;
const ADAM_EPS: f32 = 1e-8;

/// A single affine layer `y = W x + b`, with the bias folded into `W` as an
/// extra column (see `Slice::dot1`), plus per-weight Adam moments and a
/// pending-gradient accumulator, all packed into one buffer.
#[derive(Debug, Clone)]
pub struct DenseLayer {
    in_size: usize,
    out_size: usize,
    /// Number of `backprop` calls accumulated into `delta` since the last
    /// `backprop_init`. `learn` averages the accumulated gradient by this
    /// count before applying the Adam update, and no-ops when it is zero.
    deltas: u32,
    /// Four panels of `out_size * (in_size + 1)` each: weights, first
    /// moment, second moment, accumulated gradient.
    data: Buffer,
}

impl DenseLayer {
    fn panel_len(in_size: usize, out_size: usize) -> usize {
        out_size * (in_size + 1)
    }

    pub fn new(in_size: usize, out_size: usize) -> DenseLayer {
        let panel = Self::panel_len(in_size, out_size);
        DenseLayer { in_size, out_size, deltas: 0, data: Buffer::zeros(panel * 4) }
    }

    pub fn in_size(&self) -> usize {
        self.in_size
    }

    pub fn out_size(&self) -> usize {
        self.out_size
    }

    pub fn deltas(&self) -> u32 {
        self.deltas
    }

    fn panel_len_self(&self) -> usize {
        Self::panel_len(self.in_size, self.out_size)
    }

    fn weights(&mut self) -> MatSlice<'_> {
        let panel = self.panel_len_self();
        let ptr = self.data.slice_range(0, panel).as_mut_slice().as_mut_ptr();
        unsafe { MatSlice::from_raw(ptr, self.out_size, self.in_size + 1) }
    }

    fn moment1(&mut self) -> MatSlice<'_> {
        let panel = self.panel_len_self();
        let ptr = self.data.slice_range(panel, panel).as_mut_slice().as_mut_ptr();
        unsafe { MatSlice::from_raw(ptr, self.out_size, self.in_size + 1) }
    }

    fn moment2(&mut self) -> MatSlice<'_> {
        let panel = self.panel_len_self();
        let ptr = self.data.slice_range(panel * 2, panel).as_mut_slice().as_mut_ptr();
        unsafe { MatSlice::from_raw(ptr, self.out_size, self.in_size + 1) }
    }

    fn delta(&mut self) -> MatSlice<'_> {
        let panel = self.panel_len_self();
        let ptr = self.data.slice_range(panel * 3, panel).as_mut_slice().as_mut_ptr();
        unsafe { MatSlice::from_raw(ptr, self.out_size, self.in_size + 1) }
    }

    /// The raw weight panel only (for persistence); moments and the pending
    /// delta are training-time state and are not serialized.
    pub fn raw_panels(&self) -> &[f32] {
        let panel = Self::panel_len(self.in_size, self.out_size);
        &self.data.as_raw()[0..panel]
    }

    /// Loads a previously-serialized weight panel. Moments and the pending
    /// delta are reset to zero.
    pub fn load_raw_panels(&mut self, weights: &[f32]) -> Result<(), ()> {
        let panel = self.panel_len_self();
        if weights.len() != panel {
            return Err(());
        }
        self.data.slice_range(0, panel).as_mut_slice().copy_from_slice(weights);
        Ok(())
    }

    /// Fills weights with small uniform random values in `±1/(in_size+1)`,
    /// matching `Layer::randomize` in the original; moments and deltas
    /// start at zero.
    pub fn randomize<R: Rng>(&mut self, rng: &mut R) {
        let scale = 1.0 / (self.in_size as f32 + 1.0);
        let mut w = self.weights();
        for r in 0..w.rows() {
            let mut row = w.row(r);
            for c in 0..row.len() {
                row.set(c, rng.random_range(-scale..scale));
            }
        }
    }

    /// `output[o] = dot(W[o], input) + bias[o]`, plus a residual skip adding
    /// `input[o]` for `o < min(in_size, out_size)`.
    pub fn calc(&mut self, input: Slice<'_>, mut output: Slice<'_>) {
        debug_assert_eq!(input.len(), self.in_size);
        debug_assert_eq!(output.len(), self.out_size);
        let w = self.weights();
        for o in 0..self.out_size {
            output.set(o, w.row(o).dot1(input));
        }
        let skip = self.in_size.min(self.out_size);
        for i in 0..skip {
            let v = output.get(i) + input.get(i);
            output.set(i, v);
        }
    }

    /// Zeroes the pending-gradient accumulator. Call once before a round of
    /// `backprop` calls over a mini-batch.
    pub fn backprop_init(&mut self) {
        self.deltas = 0;
        self.delta().flat().assign_scalar(0.0);
    }

    /// Accumulates `d(loss)/dW` and `d(loss)/d(bias)` into the delta panel
    /// from `input` and the upstream gradient `output_grad`, and writes the
    /// gradient with respect to `input` (including the skip term) into
    /// `input_grad`.
    pub fn backprop(&mut self, input: Slice<'_>, output_grad: Slice<'_>, mut input_grad: Slice<'_>) {
        debug_assert_eq!(input.len(), self.in_size);
        debug_assert_eq!(output_grad.len(), self.out_size);
        debug_assert_eq!(input_grad.len(), self.in_size);

        input_grad.assign_scalar(0.0);
        let skip = self.in_size.min(self.out_size);
        for i in 0..skip {
            let v = input_grad.get(i) + output_grad.get(i);
            input_grad.set(i, v);
        }

        let w = self.weights();
        let mut delta = self.delta();
        for o in 0..self.out_size {
            let go = output_grad.get(o);
            let mut drow = delta.row(o);
            for i in 0..self.in_size {
                let v = drow.get(i) + go * input.get(i);
                drow.set(i, v);
                let g = input_grad.get(i) + go * w.row(o).get(i);
                input_grad.set(i, g);
            }
            let v = drow.get(self.in_size) + go;
            drow.set(self.in_size, v);
        }
        self.deltas += 1;
    }

    /// Applies an Adam-style update from the accumulated delta panel
    /// (averaged over the `deltas` accumulated since `backprop_init`), then
    /// zeroes it for the next mini-batch. No-ops if no gradient was
    /// accumulated.
    pub fn learn(&mut self, learn_rate: f32) {
        if self.deltas == 0 {
            return;
        }
        let panel = self.panel_len_self();
        let mut w = self.data.slice_range(0, panel);
        let mut m1 = self.data.slice_range(panel, panel);
        let mut m2 = self.data.slice_range(panel * 2, panel);
        let mut d = self.data.slice_range(panel * 3, panel);

        d.mult(1.0 / self.deltas as f32);
        m1.decay_average(d.slice(0), ADAM_RHO1);
        m2.decay_variance(d.slice(0), ADAM_RHO2);

        for i in 0..panel {
            let denom = m2.get(i).sqrt() + ADAM_EPS;
            let step = learn_rate * m1.get(i) / denom;
            w.set(i, w.get(i) - step);
        }
        d.assign_scalar(0.0);
        self.deltas = 0;
    }

    /// Elastic-net decay: both the L2 shrinkage factor and the L1
    /// soft-threshold magnitude are `learn_rate * 1e-11`, matching the
    /// original's `Layer::normalize`.
    pub fn normalize(&mut self, learn_rate: f32) {
        let l1 = learn_rate * 1e-11;
        let panel = self.panel_len_self();
        let mut w = self.data.slice_range(0, panel);
        for i in 0..panel {
            let mut v = w.get(i) * (1.0 - l1);
            if v > l1 {
                v -= l1;
            } else if v < -l1 {
                v += l1;
            } else {
                v = 0.0;
            }
            w.set(i, v);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;
    use rand::rngs::StdRng;

    #[test]
    fn calc_applies_residual_skip() {
        let mut layer = DenseLayer::new(3, 3);
        layer.weights().flat().assign_scalar(0.0);
        let mut input = Buffer::zeros(3);
        input.slice().set(0, 1.0);
        input.slice().set(1, 2.0);
        input.slice().set(2, 3.0);
        let mut output = Buffer::zeros(3);
        layer.calc(input.slice(), output.slice());
        assert_eq!(output.as_raw(), &[1.0, 2.0, 3.0]);
    }

    #[test]
    fn learn_reduces_accumulated_delta_to_zero() {
        let mut layer = DenseLayer::new(2, 2);
        let mut rng = StdRng::seed_from_u64(1);
        layer.randomize(&mut rng);
        layer.backprop_init();
        let mut input = Buffer::zeros(2);
        input.slice().set(0, 1.0);
        input.slice().set(1, -1.0);
        let mut grad = Buffer::zeros(2);
        grad.slice().set(0, 1.0);
        grad.slice().set(1, 1.0);
        let mut input_grad = Buffer::zeros(2);
        layer.backprop(input.slice(), grad.slice(), input_grad.slice());
        layer.learn(0.01);
        let panel = layer.panel_len_self();
        let delta = layer.data.slice_range(panel * 3, panel);
        assert!(delta.as_slice().iter().all(|&v| v == 0.0));
    }

    #[test]
    fn normalize_shrinks_small_weights_to_zero() {
        let mut layer = DenseLayer::new(1, 1);
        layer.weights().flat().set(0, 1e-13);
        layer.normalize(1.0);
        assert_eq!(layer.weights().flat().get(0), 0.0);
    }

    #[test]
    fn backprop_init_resets_deltas_and_backprop_increments_it() {
        let mut layer = DenseLayer::new(2, 2);
        layer.backprop_init();
        assert_eq!(layer.deltas(), 0);
        let input = Buffer::zeros(2);
        let grad = Buffer::zeros(2);
        let mut input_grad = Buffer::zeros(2);
        layer.backprop(input.slice(), grad.slice(), input_grad.slice());
        assert_eq!(layer.deltas(), 1);
        layer.backprop(input.slice(), grad.slice(), input_grad.slice());
        assert_eq!(layer.deltas(), 2);
        layer.backprop_init();
        assert_eq!(layer.deltas(), 0);
    }

    #[test]
    fn learn_with_zero_rate_leaves_weights_unchanged() {
        let mut layer = DenseLayer::new(2, 2);
        let mut rng = StdRng::seed_from_u64(11);
        layer.randomize(&mut rng);
        let before: Vec<f32> = layer.weights().flat().as_slice().to_vec();
        layer.backprop_init();
        let mut input = Buffer::zeros(2);
        input.slice().set(0, 1.0);
        input.slice().set(1, -1.0);
        let mut grad = Buffer::zeros(2);
        grad.slice().set(0, 1.0);
        grad.slice().set(1, 1.0);
        let mut input_grad = Buffer::zeros(2);
        layer.backprop(input.slice(), grad.slice(), input_grad.slice());
        layer.learn(0.0);
        let after: Vec<f32> = layer.weights().flat().as_slice().to_vec();
        assert_eq!(before, after);
    }

    #[test]
    fn learn_is_noop_when_no_gradient_accumulated() {
        let mut layer = DenseLayer::new(2, 2);
        let mut rng = StdRng::seed_from_u64(12);
        layer.randomize(&mut rng);
        layer.backprop_init();
        let before: Vec<f32> = layer.weights().flat().as_slice().to_vec();
        layer.learn(0.5);
        let after: Vec<f32> = layer.weights().flat().as_slice().to_vec();
        assert_eq!(before, after);
    }
}
