//! Composite model: a board encoder, per-own-card and per-opponent-card
//! encoders, a shared trunk, and two output heads — one scalar for "pass",
//! one per own card for "play this card".
//!
//! Grounded on `model.cpp`'s `Model` (board/card encoders, trunk, heads) and
//! `Model::calc`'s `full` flag (whether the opponent's hand is visible).

use crate::layer::DenseLayer;
use crate::layer_stack::LayerStack;
use crate::numeric::Buffer;
use rand::Rng;

fn buffer_from_slice(values: &[f32]) -> Buffer {
    let mut buf = Buffer::zeros(values.len());
    buf.slice().as_mut_slice().copy_from_slice(values);
    buf
}

fn concat(a: &[f32], b: &[f32]) -> Buffer {
    let mut buf = Buffer::zeros(a.len() + b.len());
    {
        let mut s = buf.slice();
        let (mut sa, mut sb) = s.split(a.len());
        sa.as_mut_slice().copy_from_slice(a);
        sb.as_mut_slice().copy_from_slice(b);
    }
    buf
}

/// Widths for every sub-network. Defaults match `model.cpp`'s hardcoded
/// shape (`board_out_width = 10`, `card_out_width = 8`, trunk hidden
/// `{20, 22, 24, 26}` at `l3_out_width = 18`, per-card head hidden
/// `{8, 8, 8}`); the board and card encoders each carry one hidden layer of
/// their own output width before the final projection, matching
/// `ReLULayers::randomize(input, {width}, width)` in the original.
pub struct ModelConfig {
    pub board_in: usize,
    pub board_out: usize,
    pub card_in: usize,
    pub card_out: usize,
    pub trunk_hidden: Vec<usize>,
    pub trunk_out: usize,
    pub card_head_hidden: Vec<usize>,
}

impl ModelConfig {
    pub fn new(board_in: usize, card_in: usize) -> ModelConfig {
        ModelConfig {
            board_in,
            board_out: 10,
            card_in,
            card_out: 8,
            trunk_hidden: vec![20, 22, 24, 26],
            trunk_out: 18,
            card_head_hidden: vec![8, 8, 8],
        }
    }
}

/// Output of a single forward pass: index 0 is the pass value, index `i+1`
/// is the value of playing own card `i`.
#[derive(Debug, Clone)]
pub struct Eval {
    pub values: Vec<f32>,
}

impl Eval {
    pub fn pass_value(&self) -> f32 {
        self.values[0]
    }

    pub fn card_value(&self, i: usize) -> f32 {
        self.values[i + 1]
    }

    pub fn len(&self) -> usize {
        self.values.len()
    }

    pub fn is_empty(&self) -> bool {
        self.values.is_empty()
    }

    pub fn argmax(&self) -> usize {
        let mut best = 0;
        for i in 1..self.values.len() {
            if self.values[i] > self.values[best] {
                best = i;
            }
        }
        best
    }

    /// Best value seen so far, with the `replace_i` slot's contribution
    /// swapped for `replace_value` before the max, then clamped to `[0,1]`.
    /// Used by the self-play worker's backward-sweep TD(0) labeling.
    pub fn clamped_best_pct(&self, replace_i: usize, replace_value: f32) -> f32 {
        let mut best = if replace_i == 0 { replace_value } else { self.values[0] };
        for i in 1..self.values.len() {
            let v = if i == replace_i { replace_value } else { self.values[i] };
            if v > best {
                best = v;
            }
        }
        best.clamp(0.0, 1.0)
    }
}

/// The full composite network for one player's turn evaluation.
#[derive(Debug, Clone)]
pub struct Model {
    board_out_width: usize,
    card_out_width: usize,
    trunk_out_width: usize,
    board_encoder: LayerStack,
    card_encoder: LayerStack,
    opp_card_encoder: LayerStack,
    trunk: LayerStack,
    /// A bare affine layer, no leaky-ReLU — matches `model.cpp`'s `Layer p`
    /// (every other sub-network is a `ReLULayers` stack; the pass head is
    /// the one place the raw affine+skip output is used directly as a
    /// win-probability estimate).
    pass_head: DenseLayer,
    card_head: LayerStack,
}

impl Model {
    pub fn new(cfg: &ModelConfig) -> Model {
        let board_widths = vec![cfg.board_in, cfg.board_out, cfg.board_out];
        let card_widths = vec![cfg.card_in, cfg.card_out, cfg.card_out];

        let trunk_in = cfg.board_out + cfg.card_out;
        let mut trunk_widths = vec![trunk_in];
        trunk_widths.extend(cfg.trunk_hidden.iter().copied());
        trunk_widths.push(cfg.trunk_out);

        let mut card_head_widths = vec![cfg.trunk_out + cfg.card_out];
        card_head_widths.extend(cfg.card_head_hidden.iter().copied());
        card_head_widths.push(1);

        Model {
            board_out_width: cfg.board_out,
            card_out_width: cfg.card_out,
            trunk_out_width: cfg.trunk_out,
            board_encoder: LayerStack::new(&board_widths),
            card_encoder: LayerStack::new(&card_widths),
            opp_card_encoder: LayerStack::new(&card_widths),
            trunk: LayerStack::new(&trunk_widths),
            pass_head: DenseLayer::new(cfg.trunk_out, 1),
            card_head: LayerStack::new(&card_head_widths),
        }
    }

    pub fn card_out_width(&self) -> usize {
        self.card_out_width
    }

    pub fn board_out_width(&self) -> usize {
        self.board_out_width
    }

    pub fn trunk_out_width(&self) -> usize {
        self.trunk_out_width
    }

    pub fn randomize<R: Rng>(&mut self, rng: &mut R) {
        self.board_encoder.randomize(rng);
        self.card_encoder.randomize(rng);
        self.opp_card_encoder.randomize(rng);
        self.trunk.randomize(rng);
        self.pass_head.randomize(rng);
        self.card_head.randomize(rng);
    }

    /// Evaluates a turn. When `full` is false, `opponent_cards` is ignored
    /// and the opponent's contribution to the card pool is treated as zero,
    /// matching the partial-information evaluation mode (me_cards=0 yields
    /// a length-1 "pass only" result; you_cards=0 with full=true is
    /// equivalent to full=false at the trunk input).
    pub fn calc(&mut self, board: &[f32], own_cards: &[Vec<f32>], opponent_cards: &[Vec<f32>], full: bool) -> Eval {
        let (trunk_out, own_enc) = self.forward_shared(board, own_cards, opponent_cards, full);

        let mut trunk_buf = buffer_from_slice(&trunk_out);
        let mut pass_out = Buffer::zeros(1);
        self.pass_head.calc(trunk_buf.slice(), pass_out.slice());

        let mut values = Vec::with_capacity(own_cards.len() + 1);
        values.push(pass_out.as_raw()[0]);
        for enc in &own_enc {
            let mut head_buf = concat(&trunk_out, enc);
            let v = self.card_head.calc(head_buf.slice()).get(0);
            values.push(v);
        }

        Eval { values }
    }

    pub fn backprop_init(&mut self) {
        self.board_encoder.backprop_init();
        self.card_encoder.backprop_init();
        self.opp_card_encoder.backprop_init();
        self.trunk.backprop_init();
        self.pass_head.backprop_init();
        self.card_head.backprop_init();
    }

    /// Back-propagates `output_grad` (length `own_cards.len() + 1`, one
    /// entry per `Eval` slot) through every sub-network touched by the
    /// matching `calc` call. Re-runs the shared forward chain first so each
    /// `LayerStack`'s retained activations match this exact input.
    pub fn backprop(&mut self, board: &[f32], own_cards: &[Vec<f32>], opponent_cards: &[Vec<f32>], full: bool, output_grad: &[f32]) {
        debug_assert_eq!(output_grad.len(), own_cards.len() + 1);
        let (trunk_out, own_enc) = self.forward_shared(board, own_cards, opponent_cards, full);

        let mut trunk_grad = Buffer::zeros(self.trunk.out_size());

        // Pass head (bare dense layer, no activation).
        {
            let mut trunk_buf = buffer_from_slice(&trunk_out);
            let mut pass_out = Buffer::zeros(1);
            self.pass_head.calc(trunk_buf.slice(), pass_out.slice());
            let mut g = Buffer::zeros(1);
            g.slice().set(0, output_grad[0]);
            let mut trunk_in_grad = Buffer::zeros(self.pass_head.in_size());
            self.pass_head.backprop(trunk_buf.slice(), g.slice(), trunk_in_grad.slice());
            trunk_grad.slice().add(trunk_in_grad.slice());
        }

        // Per-card head: re-enter the head for each card before
        // backpropagating it, then split its input-gradient into a
        // trunk-side addend and a card-encoding-side addend.
        let mut own_enc_grad: Vec<Buffer> = Vec::with_capacity(own_cards.len());
        for (i, enc) in own_enc.iter().enumerate() {
            let mut head_buf = concat(&trunk_out, enc);
            let _ = self.card_head.calc(head_buf.slice());

            let mut g = Buffer::zeros(1);
            g.slice().set(0, output_grad[i + 1]);
            let mut head_in_grad = Buffer::zeros(self.card_head.in_size());
            self.card_head.backprop(g.slice(), head_in_grad.slice());

            let raw = head_in_grad.as_raw();
            let trunk_side = &raw[0..self.trunk.out_size()];
            let card_side = &raw[self.trunk.out_size()..];

            trunk_grad.slice().as_mut_slice().iter_mut().zip(trunk_side.iter()).for_each(|(t, v)| *t += v);
            own_enc_grad.push(buffer_from_slice(card_side));
        }

        // Trunk.
        let mut trunk_input_grad = Buffer::zeros(self.trunk.in_size());
        self.trunk.backprop(trunk_grad.slice(), trunk_input_grad.slice());
        let raw = trunk_input_grad.as_raw().to_vec();
        let board_grad = &raw[0..self.board_out_width];
        let pool_grad = &raw[self.board_out_width..];

        // Board encoder.
        {
            let mut board_buf = buffer_from_slice(board);
            let _ = self.board_encoder.calc(board_buf.slice());
            let mut bg = buffer_from_slice(board_grad);
            let mut board_in_grad = Buffer::zeros(self.board_encoder.in_size());
            self.board_encoder.backprop(bg.slice(), board_in_grad.slice());
        }

        // Own-card encoders: gradient is the pool's broadcast gradient plus
        // this card's own card_head-side addend.
        for (i, card) in own_cards.iter().enumerate() {
            let mut card_buf = buffer_from_slice(card);
            let _ = self.card_encoder.calc(card_buf.slice());
            let mut g = buffer_from_slice(pool_grad);
            g.slice().add(own_enc_grad[i].slice());
            let mut card_in_grad = Buffer::zeros(self.card_encoder.in_size());
            self.card_encoder.backprop(g.slice(), card_in_grad.slice());
        }

        // Opponent-card encoders: every opponent card receives the same
        // broadcast pool gradient (gradient of a sum).
        if full {
            for card in opponent_cards {
                let mut card_buf = buffer_from_slice(card);
                let _ = self.opp_card_encoder.calc(card_buf.slice());
                let g = buffer_from_slice(pool_grad);
                let mut opp_in_grad = Buffer::zeros(self.opp_card_encoder.in_size());
                self.opp_card_encoder.backprop(g.slice(), opp_in_grad.slice());
            }
        }
    }

    /// Forward pass shared by `calc` and `backprop`: runs the board/card
    /// encoders and the trunk, returning the trunk output and each own
    /// card's encoding (the per-action heads are evaluated by the caller).
    fn forward_shared(&mut self, board: &[f32], own_cards: &[Vec<f32>], opponent_cards: &[Vec<f32>], full: bool) -> (Vec<f32>, Vec<Vec<f32>>) {
        let mut board_buf = buffer_from_slice(board);
        let board_enc = self.board_encoder.calc(board_buf.slice()).as_slice().to_vec();

        let mut own_enc: Vec<Vec<f32>> = Vec::with_capacity(own_cards.len());
        let mut card_pool = Buffer::zeros(self.card_out_width);
        for card in own_cards {
            let mut card_buf = buffer_from_slice(card);
            let enc = self.card_encoder.calc(card_buf.slice()).as_slice().to_vec();
            card_pool.slice().as_mut_slice().iter_mut().zip(enc.iter()).for_each(|(p, v)| *p += v);
            own_enc.push(enc);
        }
        if full {
            for card in opponent_cards {
                let mut card_buf = buffer_from_slice(card);
                let enc = self.opp_card_encoder.calc(card_buf.slice()).as_slice().to_vec();
                card_pool.slice().as_mut_slice().iter_mut().zip(enc.iter()).for_each(|(p, v)| *p += v);
            }
        }

        let trunk_in = concat(&board_enc, card_pool.as_raw());
        let trunk_out = self.trunk.calc(trunk_in.slice()).as_slice().to_vec();
        (trunk_out, own_enc)
    }

    pub fn learn(&mut self, learn_rate: f32) {
        self.board_encoder.learn(learn_rate);
        self.card_encoder.learn(learn_rate);
        self.opp_card_encoder.learn(learn_rate);
        self.trunk.learn(learn_rate);
        self.pass_head.learn(learn_rate);
        self.card_head.learn(learn_rate);
    }

    pub fn normalize(&mut self, learn_rate: f32) {
        self.board_encoder.normalize(learn_rate);
        self.card_encoder.normalize(learn_rate);
        self.opp_card_encoder.normalize(learn_rate);
        self.trunk.normalize(learn_rate);
        self.pass_head.normalize(learn_rate);
        self.card_head.normalize(learn_rate);
    }

    // ---- accessors for persistence (C8) ----

    pub fn board_encoder_stack(&self) -> &LayerStack {
        &self.board_encoder
    }

    pub fn card_encoder_stack(&self) -> &LayerStack {
        &self.card_encoder
    }

    pub fn opp_card_encoder_stack(&self) -> &LayerStack {
        &self.opp_card_encoder
    }

    pub fn trunk_stack(&self) -> &LayerStack {
        &self.trunk
    }

    pub fn pass_head_layer(&self) -> &DenseLayer {
        &self.pass_head
    }

    pub fn card_head_stack(&self) -> &LayerStack {
        &self.card_head
    }

    /// Rebuilds a model from previously-deserialized sub-networks. The
    /// shapes of the supplied stacks define the reloaded model's
    /// dimensions; `card_out_width`/`trunk_out_width` are read back off
    /// them rather than re-derived from a `ModelConfig`.
    pub fn replace_stacks(
        &mut self,
        board_encoder: LayerStack,
        card_encoder: LayerStack,
        opp_card_encoder: LayerStack,
        trunk: LayerStack,
        pass_head: DenseLayer,
        card_head: LayerStack,
    ) {
        self.board_out_width = board_encoder.out_size();
        self.card_out_width = card_encoder.out_size();
        self.trunk_out_width = trunk.out_size();
        self.board_encoder = board_encoder;
        self.card_encoder = card_encoder;
        self.opp_card_encoder = opp_card_encoder;
        self.trunk = trunk;
        self.pass_head = pass_head;
        self.card_head = card_head;
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn tiny_config() -> ModelConfig {
        ModelConfig {
            board_in: 4,
            board_out: 3,
            card_in: 5,
            card_out: 2,
            trunk_hidden: vec![6],
            trunk_out: 4,
            card_head_hidden: vec![3],
        }
    }

    #[test]
    fn forward_produces_one_value_per_card_plus_pass() {
        let mut model = Model::new(&tiny_config());
        let mut rng = StdRng::seed_from_u64(3);
        model.randomize(&mut rng);
        let board = vec![0.0, 1.0, 0.0, 1.0];
        let own = vec![vec![1.0; 5], vec![0.5; 5]];
        let opp = vec![vec![0.2; 5]];
        let eval = model.calc(&board, &own, &opp, true);
        assert_eq!(eval.len(), 3);
    }

    #[test]
    fn zero_own_cards_yields_pass_only_output() {
        let mut model = Model::new(&tiny_config());
        let mut rng = StdRng::seed_from_u64(4);
        model.randomize(&mut rng);
        let board = vec![0.0, 1.0, 0.0, 1.0];
        let eval = model.calc(&board, &[], &[], false);
        assert_eq!(eval.len(), 1);
    }

    #[test]
    fn you_cards_zero_with_full_matches_partial() {
        let mut model = Model::new(&tiny_config());
        let mut rng = StdRng::seed_from_u64(6);
        model.randomize(&mut rng);
        let board = vec![0.0, 1.0, 0.0, 1.0];
        let own = vec![vec![1.0; 5]];
        let full = model.calc(&board, &own, &[], true).values;
        let partial = model.calc(&board, &own, &[], false).values;
        assert_eq!(full, partial);
    }

    #[test]
    fn backprop_runs_without_panicking() {
        let mut model = Model::new(&tiny_config());
        let mut rng = StdRng::seed_from_u64(5);
        model.randomize(&mut rng);
        let board = vec![0.0, 1.0, 0.0, 1.0];
        let own = vec![vec![1.0; 5]];
        let opp = vec![vec![0.2; 5]];
        model.backprop_init();
        model.backprop(&board, &own, &opp, true, &[0.1, -0.2]);
        model.learn(0.01);
        model.normalize(0.01);
    }

    #[test]
    fn clamped_best_pct_substitutes_and_clamps() {
        let eval = Eval { values: vec![0.2, 1.5, -0.3] };
        assert_eq!(eval.clamped_best_pct(1, 0.0), 0.2);
        assert_eq!(eval.clamped_best_pct(0, 2.0), 1.0);
    }
}
