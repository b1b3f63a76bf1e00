//! Self-play worker: plays episodes against itself, labels every turn by a
//! backward TD(0) sweep, and accumulates the resulting gradients into one
//! model on a dedicated thread.
//!
//! Grounded on `shared/worker.cpp`'s `Worker::work` (episode loop, labeling,
//! the three-cadence tick schedule) and `Worker::compete_baseline_work` (the
//! baseline competition thread).

use std::sync::atomic::{AtomicU32, AtomicU64, AtomicUsize, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;

use log::{debug, info, trace};
use rand::rngs::StdRng;
use rand::{Rng, SeedableRng};

use crate::arena::play_batch;
use crate::config::{BaselineConfig, WorkerConfig};
use crate::coordination::{ModelSlot, ThreadControl};
use crate::game::GameAdapter;
use crate::model::Model;

/// Lock-free rolling window of `f32` values, used for the per-worker
/// telemetry spec.md §6 calls for (squared-error history, baseline
/// win-fraction history).
pub struct Ring {
    slots: Vec<AtomicU32>,
    next: AtomicUsize,
}

impl Ring {
    fn new(len: usize) -> Ring {
        Ring { slots: (0..len.max(1)).map(|_| AtomicU32::new(f32::NAN.to_bits())).collect(), next: AtomicUsize::new(0) }
    }

    fn push(&self, value: f32) {
        let idx = self.next.fetch_add(1, Ordering::Relaxed) % self.slots.len();
        self.slots[idx].store(value.to_bits(), Ordering::Relaxed);
    }

    /// Snapshot of every slot that has been written at least once.
    pub fn values(&self) -> Vec<f32> {
        self.slots
            .iter()
            .map(|s| f32::from_bits(s.load(Ordering::Relaxed)))
            .filter(|v| !v.is_nan())
            .collect()
    }
}

/// Per-worker telemetry: lock-free counters and rings, readable from any
/// thread without blocking the training loop.
pub struct Telemetry {
    trials: AtomicU64,
    error_ring: Ring,
    baseline_ring: Ring,
}

impl Telemetry {
    fn new(ring_size: usize) -> Telemetry {
        Telemetry { trials: AtomicU64::new(0), error_ring: Ring::new(ring_size), baseline_ring: Ring::new(ring_size) }
    }

    pub fn trials(&self) -> u64 {
        self.trials.load(Ordering::Relaxed)
    }

    pub fn squared_error_history(&self) -> Vec<f32> {
        self.error_ring.values()
    }

    pub fn baseline_win_fraction_history(&self) -> Vec<f32> {
        self.baseline_ring.values()
    }
}

/// One turn's recorded state, used both to choose the action during play
/// and to replay it during the backward labeling sweep.
struct TurnRecord {
    board: Vec<f32>,
    own_cards: Vec<Vec<f32>>,
    opp_cards: Vec<Vec<f32>>,
    eval_full: Vec<f32>,
    eval_partial: Vec<f32>,
    chosen: usize,
    player2_turn: bool,
}

fn avail_actions(turn: &TurnRecord) -> usize {
    turn.own_cards.len() + 1
}

/// Plays one self-play episode with exploration flag `explore`, returning
/// the per-turn record in play order.
fn play_episode<G: GameAdapter, R: Rng>(game: &mut G, model: &mut Model, explore: bool, rng: &mut R) -> Vec<TurnRecord> {
    game.init();
    let mut turns = Vec::new();
    loop {
        use crate::game::GameResult;
        if game.cur_result() != GameResult::Playing {
            break;
        }
        let state = game.encode();
        let eval_partial = model.calc(state.board(), state.me_cards(), state.you_cards(), false);
        let eval_full = model.calc(state.board(), state.me_cards(), state.you_cards(), true);
        let n = state.avail_actions();

        let chosen = if explore {
            let u: f32 = rng.random();
            if u < 0.3 {
                (((u * n as f32) / 0.3).floor() as usize).min(n - 1)
            } else {
                eval_partial.argmax()
            }
        } else {
            eval_full.argmax()
        };

        let player2_turn = game.player2_turn();
        game.advance(chosen);
        turns.push(TurnRecord {
            board: state.board().to_vec(),
            own_cards: state.me_cards().to_vec(),
            opp_cards: state.you_cards().to_vec(),
            eval_full: eval_full.values,
            eval_partial: eval_partial.values,
            chosen,
            player2_turn,
        });
    }
    turns
}

/// Win/loss target (1.0/0.0) for the player who moved at the terminal turn,
/// from that player's own perspective. A `Timeout` is scored as a draw
/// (0.5): neither player's terminal action is rewarded or penalized.
fn terminal_label<G: GameAdapter>(game: &G, mover_was_p2: bool) -> f32 {
    use crate::game::GameResult;
    match game.cur_result() {
        GameResult::P1Win => if mover_was_p2 { 0.0 } else { 1.0 },
        GameResult::P2Win => if mover_was_p2 { 1.0 } else { 0.0 },
        GameResult::Timeout => 0.5,
        GameResult::Playing => unreachable!("episode only labels a finished game"),
    }
}

/// Backward TD(0) sweep: fills one label per turn, terminal turn first.
fn backward_labels(turns: &[TurnRecord], terminal: f32) -> Vec<f32> {
    let mut labels = vec![0.0f32; turns.len()];
    let last = turns.len() - 1;
    labels[last] = terminal;
    for t in (0..last).rev() {
        let next = &turns[t + 1];
        let best = crate::model::Eval { values: next.eval_full.clone() }.clamped_best_pct(next.chosen, labels[t + 1]);
        labels[t] = if next.player2_turn != turns[t].player2_turn { 1.0 - best } else { best };
    }
    labels
}

/// Accumulates gradients for every turn into `model` (does not call `learn`
/// or `backprop_init`; the caller schedules those at its own cadence).
/// Returns the mean squared terminal-action error, for telemetry.
fn accumulate_episode(model: &mut Model, turns: &[TurnRecord], labels: &[f32]) -> f32 {
    let mut sq_err_sum = 0.0f32;
    for (t, turn) in turns.iter().enumerate() {
        let n = avail_actions(turn);
        let full_err = turn.eval_full[turn.chosen] - labels[t];
        sq_err_sum += full_err * full_err;

        let mut err_full = vec![0.0f32; n];
        err_full[turn.chosen] = full_err * n as f32;
        model.backprop(&turn.board, &turn.own_cards, &turn.opp_cards, true, &err_full);

        let err_partial: Vec<f32> = turn.eval_partial.iter().zip(turn.eval_full.iter()).map(|(p, f)| p - f).collect();
        model.backprop(&turn.board, &turn.own_cards, &turn.opp_cards, false, &err_partial);
    }
    sq_err_sum / turns.len().max(1) as f32
}

/// Handle to a spawned self-play worker: the published model, its
/// telemetry, and the join handles for its training and (optional)
/// baseline-competition threads.
pub struct WorkerHandle {
    pub slot: Arc<ModelSlot>,
    pub telemetry: Arc<Telemetry>,
    pub control: Arc<ThreadControl>,
    training: Option<JoinHandle<()>>,
    baseline: Option<JoinHandle<()>>,
}

impl WorkerHandle {
    pub fn join(mut self) {
        if let Some(h) = self.training.take() {
            let _ = h.join();
        }
        if let Some(h) = self.baseline.take() {
            let _ = h.join();
        }
    }
}

/// Spawns one self-play worker. `make_game` builds a fresh, independently
/// seeded game adapter for each thread the worker needs (the training loop
/// and, if `baseline` is supplied, the baseline-competition loop).
pub fn spawn<G, F>(
    name: impl Into<String>,
    make_game: F,
    seed_model: Model,
    worker_cfg: WorkerConfig,
    baseline: Option<(Model, BaselineConfig)>,
    seed: u64,
) -> WorkerHandle
where
    G: GameAdapter + Send + 'static,
    F: Fn() -> G + Send + Sync + 'static,
{
    let name = name.into();
    let slot = Arc::new(ModelSlot::new(name.clone(), seed_model.clone(), worker_cfg.compete_ring));
    let telemetry = Arc::new(Telemetry::new(worker_cfg.telemetry_ring));
    let control = Arc::new(ThreadControl::new());
    let make_game = Arc::new(make_game);

    let training = {
        let slot = Arc::clone(&slot);
        let telemetry = Arc::clone(&telemetry);
        let control = Arc::clone(&control);
        let make_game = Arc::clone(&make_game);
        let worker_cfg = worker_cfg.clone();
        let mut model = seed_model;
        let name = name.clone();
        std::thread::spawn(move || {
            let mut game = make_game();
            let mut rng = StdRng::seed_from_u64(seed);
            model.backprop_init();
            let mut tick: u64 = 0;
            while control.wait_until_runnable() {
                let explore = rng.random_bool(0.5);
                let turns = play_episode(&mut game, &mut model, explore, &mut rng);
                if turns.is_empty() {
                    continue;
                }
                let last = turns.len() - 1;
                let terminal = terminal_label(&game, turns[last].player2_turn);
                let labels = backward_labels(&turns, terminal);
                let mse = accumulate_episode(&mut model, &turns, &labels);
                telemetry.trials.fetch_add(1, Ordering::Relaxed);
                telemetry.error_ring.push(mse);
                trace!("worker {name}: episode of {} turns, mse={mse:.4}", turns.len());

                tick += 1;
                if tick % worker_cfg.learn_every as u64 == 0 {
                    model.learn(worker_cfg.learn_rate());
                    model.backprop_init();
                }
                if tick % worker_cfg.normalize_every as u64 == 0 {
                    model.normalize(worker_cfg.learn_rate() * 1e-9);
                }
                if tick % worker_cfg.publish_every as u64 == 0 {
                    slot.publish(&model);
                    info!("worker {name}: published {}", slot.name());
                }
                if control.should_exit() {
                    break;
                }
            }
            debug!("worker {name}: training thread exiting");
        })
    };

    let baseline_handle = baseline.map(|(baseline_model, baseline_cfg)| {
        let slot = Arc::clone(&slot);
        let telemetry = Arc::clone(&telemetry);
        let control = Arc::clone(&control);
        let make_game = Arc::clone(&make_game);
        let name = name.clone();
        std::thread::spawn(move || {
            let mut game = make_game();
            let mut baseline_model = baseline_model;
            while control.wait_until_runnable() {
                let mut current = slot.clone_model();
                let mut wins = 0u32;
                let mut games = 0u32;
                for _ in 0..baseline_cfg.batches {
                    let a = play_batch(&mut game, &mut current, &mut baseline_model, baseline_cfg.games_per_batch);
                    let b = play_batch(&mut game, &mut baseline_model, &mut current, baseline_cfg.games_per_batch);
                    wins += a.p1 + b.p2;
                    games += a.total() + b.total();
                }
                if games > 0 {
                    let fraction = wins as f32 / games as f32;
                    telemetry.baseline_ring.push(fraction);
                    info!("worker {name}: baseline win fraction {fraction:.3}");
                }
                if control.should_exit() {
                    break;
                }
            }
            debug!("worker {name}: baseline thread exiting");
        })
    });

    WorkerHandle { slot, telemetry, control, training: Some(training), baseline: baseline_handle }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::games::duel::DuelGame;
    use crate::model::ModelConfig;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    fn duel_model_config() -> ModelConfig {
        ModelConfig::new(20, 11)
    }

    #[test]
    fn backward_labels_assigns_terminal_value_to_last_turn() {
        let turns = vec![
            TurnRecord { board: vec![], own_cards: vec![vec![]], opp_cards: vec![], eval_full: vec![0.1, 0.2], eval_partial: vec![0.1, 0.2], chosen: 1, player2_turn: false },
            TurnRecord { board: vec![], own_cards: vec![vec![]], opp_cards: vec![], eval_full: vec![0.3, 0.4], eval_partial: vec![0.3, 0.4], chosen: 0, player2_turn: true },
        ];
        let labels = backward_labels(&turns, 1.0);
        assert_eq!(labels[1], 1.0);
        // next turn (index 1) mover differs from turn 0's mover, so the
        // propagated value is flipped.
        let expected_next_best = crate::model::Eval { values: turns[1].eval_full.clone() }.clamped_best_pct(turns[1].chosen, 1.0);
        assert_eq!(labels[0], 1.0 - expected_next_best);
    }

    #[test]
    fn terminal_label_matches_mover_perspective() {
        let mut game = DuelGame::new(StdRng::seed_from_u64(40));
        for _ in 0..40 {
            if game.cur_result() != crate::game::GameResult::Playing {
                break;
            }
            game.advance(0);
        }
        // after enough no-op passes the game has ended one way or another.
        let label_if_p2_moved = terminal_label(&game, true);
        let label_if_p1_moved = terminal_label(&game, false);
        assert!((0.0..=1.0).contains(&label_if_p2_moved));
        assert!((0.0..=1.0).contains(&label_if_p1_moved));
    }

    #[test]
    fn play_episode_produces_at_least_one_turn() {
        let cfg = duel_model_config();
        let mut model = Model::new(&cfg);
        let mut rng = StdRng::seed_from_u64(41);
        model.randomize(&mut rng);
        let mut game = DuelGame::new(StdRng::seed_from_u64(42));
        let turns = play_episode(&mut game, &mut model, false, &mut rng);
        assert!(!turns.is_empty());
    }

    #[test]
    fn accumulate_episode_leaves_gradient_for_learn_to_consume() {
        let cfg = duel_model_config();
        let mut model = Model::new(&cfg);
        let mut rng = StdRng::seed_from_u64(43);
        model.randomize(&mut rng);
        model.backprop_init();
        let mut game = DuelGame::new(StdRng::seed_from_u64(44));
        let turns = play_episode(&mut game, &mut model, true, &mut rng);
        let terminal = terminal_label(&game, turns.last().unwrap().player2_turn);
        let labels = backward_labels(&turns, terminal);
        let mse = accumulate_episode(&mut model, &turns, &labels);
        assert!(mse.is_finite());
        let before = model.pass_head_layer().raw_panels().to_vec();
        model.learn(0.01);
        let after = model.pass_head_layer().raw_panels().to_vec();
        assert_ne!(before, after, "learn should move weights after a non-empty gradient accumulation");
    }

    #[test]
    fn ring_drops_oldest_once_full() {
        let ring = Ring::new(2);
        ring.push(1.0);
        ring.push(2.0);
        ring.push(3.0);
        let values = ring.values();
        assert_eq!(values.len(), 2);
    }
}
