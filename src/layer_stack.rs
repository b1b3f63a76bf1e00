//! Leaky-ReLU activation and a stack of dense layers. Each layer's input and
//! output are retained in owned buffers reused call-to-call, so a forward
//! pass over a fixed-shape stack never grows the heap after the first call.
//!
//! Grounded on `model.cpp`'s `ReLULayer`/`ReLULayers`.

use crate::layer::DenseLayer;
use crate::numeric::{Buffer, Slice};
use rand::Rng;

/// `x` for `x >= 0`, `x / 10` otherwise.
pub fn leaky_relu(x: f32) -> f32 {
    if x >= 0.0 { x } else { x / 10.0 }
}

/// Derivative of `leaky_relu`, evaluated from the *post*-activation value
/// (the activation preserves sign, so no separate pre-activation storage is
/// needed to recover it).
fn leaky_relu_grad_from_output(y: f32) -> f32 {
    if y >= 0.0 { 1.0 } else { 0.1 }
}

/// A dense layer followed by the leaky-ReLU nonlinearity.
#[derive(Debug, Clone)]
pub struct ReluLayer {
    dense: DenseLayer,
}

impl ReluLayer {
    pub fn new(in_size: usize, out_size: usize) -> ReluLayer {
        ReluLayer { dense: DenseLayer::new(in_size, out_size) }
    }

    pub fn in_size(&self) -> usize {
        self.dense.in_size()
    }

    pub fn out_size(&self) -> usize {
        self.dense.out_size()
    }

    pub fn randomize<R: Rng>(&mut self, rng: &mut R) {
        self.dense.randomize(rng);
    }

    pub fn calc(&mut self, input: Slice<'_>, mut output: Slice<'_>) {
        self.dense.calc(input, output.slice_len(0, output.len()));
        for i in 0..output.len() {
            let v = leaky_relu(output.get(i));
            output.set(i, v);
        }
    }

    /// `output` must be this layer's *post*-activation result from the
    /// matching `calc` call. Writes `d(loss)/d(input)` into `input_grad`.
    pub fn backprop(&mut self, input: Slice<'_>, output: Slice<'_>, output_grad: Slice<'_>, input_grad: Slice<'_>) {
        let mut preact_grad = Buffer::zeros(output.len());
        {
            let mut pg = preact_grad.slice();
            for i in 0..output.len() {
                let v = output_grad.get(i) * leaky_relu_grad_from_output(output.get(i));
                pg.set(i, v);
            }
        }
        self.dense.backprop(input, preact_grad.slice(), input_grad);
    }

    pub fn backprop_init(&mut self) {
        self.dense.backprop_init();
    }

    pub fn learn(&mut self, learn_rate: f32) {
        self.dense.learn(learn_rate);
    }

    pub fn normalize(&mut self, learn_rate: f32) {
        self.dense.normalize(learn_rate);
    }

    pub fn dense(&self) -> &DenseLayer {
        &self.dense
    }

    pub fn from_dense(dense: DenseLayer) -> ReluLayer {
        ReluLayer { dense }
    }
}

/// A sequence of `ReluLayer`s, `widths[0] -> widths[1] -> .. -> widths[n]`.
#[derive(Debug, Clone)]
pub struct LayerStack {
    layers: Vec<ReluLayer>,
    /// `layer_inputs[i]` / `layer_outputs[i]` hold layer `i`'s input/output
    /// from the most recent `calc`, reused across calls and read back by
    /// `backprop`.
    layer_inputs: Vec<Buffer>,
    layer_outputs: Vec<Buffer>,
}

impl LayerStack {
    pub fn new(widths: &[usize]) -> LayerStack {
        debug_assert!(widths.len() >= 2);
        let mut layers = Vec::with_capacity(widths.len() - 1);
        let mut layer_inputs = Vec::with_capacity(widths.len() - 1);
        let mut layer_outputs = Vec::with_capacity(widths.len() - 1);
        for w in widths.windows(2) {
            layers.push(ReluLayer::new(w[0], w[1]));
            layer_inputs.push(Buffer::zeros(w[0]));
            layer_outputs.push(Buffer::zeros(w[1]));
        }
        LayerStack { layers, layer_inputs, layer_outputs }
    }

    pub fn in_size(&self) -> usize {
        self.layers.first().map(|l| l.in_size()).unwrap_or(0)
    }

    pub fn out_size(&self) -> usize {
        self.layers.last().map(|l| l.out_size()).unwrap_or(0)
    }

    pub fn randomize<R: Rng>(&mut self, rng: &mut R) {
        for l in self.layers.iter_mut() {
            l.randomize(rng);
        }
    }

    /// Runs the whole stack; returns the final layer's output.
    pub fn calc(&mut self, input: Slice<'_>) -> Slice<'_> {
        debug_assert_eq!(input.len(), self.in_size());
        let mut cur = Buffer::zeros(input.len());
        cur.slice().assign(input);
        for i in 0..self.layers.len() {
            self.layer_inputs[i].slice().assign(cur.slice());
            self.layers[i].calc(cur.slice(), self.layer_outputs[i].slice());
            cur = self.layer_outputs[i].clone();
        }
        let last = self.layers.len() - 1;
        self.layer_outputs[last].slice()
    }

    /// Writes `d(loss)/d(input)` into `input_grad`, given the upstream
    /// gradient `output_grad` on the stack's final output.
    pub fn backprop(&mut self, output_grad: Slice<'_>, mut input_grad: Slice<'_>) {
        debug_assert_eq!(output_grad.len(), self.out_size());
        let mut cur_grad = Buffer::zeros(output_grad.len());
        cur_grad.slice().assign(output_grad);
        for i in (0..self.layers.len()).rev() {
            let layer_in_len = self.layers[i].in_size();
            let mut next_grad = Buffer::zeros(layer_in_len);
            self.layers[i].backprop(
                self.layer_inputs[i].slice(),
                self.layer_outputs[i].slice(),
                cur_grad.slice(),
                next_grad.slice(),
            );
            cur_grad = next_grad;
        }
        input_grad.assign(cur_grad.slice());
    }

    pub fn backprop_init(&mut self) {
        for l in self.layers.iter_mut() {
            l.backprop_init();
        }
    }

    pub fn learn(&mut self, learn_rate: f32) {
        for l in self.layers.iter_mut() {
            l.learn(learn_rate);
        }
    }

    pub fn normalize(&mut self, learn_rate: f32) {
        for l in self.layers.iter_mut() {
            l.normalize(learn_rate);
        }
    }

    /// Total storage for intermediate activations across every layer.
    pub fn inner_size(&self) -> usize {
        self.layer_outputs.iter().map(Buffer::len).sum()
    }

    pub fn layers(&self) -> &[ReluLayer] {
        &self.layers
    }

    /// Replaces layer `i`'s weights in place (for deserialization); the
    /// stack's retained input/output buffers keep their existing sizes.
    pub fn replace_layer(&mut self, i: usize, layer: ReluLayer) {
        self.layers[i] = layer;
    }
}
