//! Tournament engine: maintains an ordered population of model snapshots,
//! plays pairwise round-robin batches to saturation, ranks by win rate, and
//! culls/repopulates the population from worker-supplied snapshots.
//!
//! Grounded on `bin/main.cpp`'s `Tournament_Group::Worker::work` (cell
//! saturation loop, `winrates()`, the repopulate step) and its
//! `restart`/`paused`/`updated` flag set.

use std::sync::{Arc, Condvar, Mutex};

use log::info;

use crate::arena::{play_batch_parallel, WinStats};
use crate::config::TournamentConfig;
use crate::game::GameAdapter;
use crate::model::Model;

/// One pairwise cell's accumulated sample, `[i][j]` row-major: `i` played
/// player 1, `j` played player 2.
#[derive(Debug, Clone, Copy, Default)]
struct Cell {
    p1: u32,
    p2: u32,
    tie: u32,
}

impl Cell {
    fn total(&self) -> u32 {
        self.p1 + self.p2 + self.tie
    }

    fn add(&mut self, stats: WinStats) {
        self.p1 += stats.p1;
        self.p2 += stats.p2;
        self.tie += stats.tie;
    }
}

/// Square sample matrix over the current population, plus the models
/// themselves. `data[i][j]` is always the cell for (player1 = i, player2 = j);
/// the diagonal is left at zero and never sampled.
struct Population {
    models: Vec<Model>,
    data: Vec<Vec<Cell>>,
}

impl Population {
    fn new() -> Population {
        Population { models: Vec::new(), data: Vec::new() }
    }

    fn len(&self) -> usize {
        self.models.len()
    }

    fn grow_to(&mut self, target: usize, fresh: impl Iterator<Item = Model>) {
        for model in fresh {
            if self.models.len() >= target {
                break;
            }
            self.models.push(model);
        }
        let n = self.models.len();
        for row in &mut self.data {
            row.resize(n, Cell::default());
        }
        self.data.resize_with(n, || vec![Cell::default(); n]);
    }

    /// Removes entries at indices flagged `true`, preserving relative order
    /// of the rest (`erase_ns` from spec.md §8).
    fn erase(&mut self, erase: &[bool]) {
        let mut keep_models = Vec::with_capacity(self.models.len());
        let mut keep_rows = Vec::with_capacity(self.data.len());
        for (i, model) in self.models.drain(..).enumerate() {
            if !erase[i] {
                keep_models.push(model);
            }
        }
        for (i, row) in self.data.drain(..).enumerate() {
            if !erase[i] {
                let kept_row: Vec<Cell> = row.into_iter().enumerate().filter(|(j, _)| !erase[*j]).map(|(_, c)| c).collect();
                keep_rows.push(kept_row);
            }
        }
        self.models = keep_models;
        self.data = keep_rows;
    }
}

/// Win-rate formula from spec.md §4.7: for model `i`, average over `j != i`
/// of two terms per opposing pair — `100*p1[i][j]/(p1[i][j]+p2[i][j])` (skip
/// if denominator 0) and `100*p2[j][i]/(p1[j][i]+p2[j][i])` — divided by the
/// number of terms actually summed.
fn win_rates(data: &[Vec<Cell>]) -> Vec<f32> {
    let n = data.len();
    let mut rates = vec![0.0f32; n];
    for i in 0..n {
        let mut sum = 0.0f32;
        let mut terms = 0u32;
        for j in 0..n {
            if j == i {
                continue;
            }
            let cell_ij = &data[i][j];
            let denom_ij = cell_ij.p1 + cell_ij.p2;
            if denom_ij > 0 {
                sum += 100.0 * cell_ij.p1 as f32 / denom_ij as f32;
                terms += 1;
            }
            let cell_ji = &data[j][i];
            let denom_ji = cell_ji.p1 + cell_ji.p2;
            if denom_ji > 0 {
                sum += 100.0 * cell_ji.p2 as f32 / denom_ji as f32;
                terms += 1;
            }
        }
        rates[i] = if terms > 0 { sum / terms as f32 } else { 0.0 };
    }
    rates
}

struct SharedState {
    population: Population,
    pending_models: Vec<Model>,
    restart: bool,
    paused: bool,
    updated: bool,
    exit: bool,
    win_rates: Vec<f32>,
}

/// Shared tournament state plus its condition variable, the counterpart to
/// spec.md §4.9's "tournament state" observable.
pub struct TournamentState {
    inner: Mutex<SharedState>,
    cv: Condvar,
    cfg: TournamentConfig,
}

impl TournamentState {
    pub fn new(cfg: TournamentConfig) -> Arc<TournamentState> {
        Arc::new(TournamentState {
            inner: Mutex::new(SharedState {
                population: Population::new(),
                pending_models: Vec::new(),
                restart: false,
                paused: false,
                updated: false,
                exit: false,
                win_rates: Vec::new(),
            }),
            cv: Condvar::new(),
            cfg,
        })
    }

    /// Submits a fresh worker snapshot to be folded into the population at
    /// the next repopulate step, and requests a restart so the engine picks
    /// it up promptly.
    pub fn submit_snapshot(&self, model: Model) {
        let mut state = self.inner.lock().unwrap();
        state.pending_models.push(model);
        state.restart = true;
        self.cv.notify_all();
    }

    pub fn pause(&self) {
        self.inner.lock().unwrap().paused = true;
    }

    pub fn resume(&self) {
        let mut state = self.inner.lock().unwrap();
        state.paused = false;
        self.cv.notify_all();
    }

    /// Current win-rate ranking, one entry per population member, in
    /// population order (not sorted).
    pub fn win_rates(&self) -> Vec<f32> {
        self.inner.lock().unwrap().win_rates.clone()
    }

    pub fn population_size(&self) -> usize {
        self.inner.lock().unwrap().population.len()
    }
}

/// Runs one full wake cycle: pick up a restart if requested, play every
/// unsaturated cell to `max_samples_per_cell`, then repopulate. `G` must be
/// cheap to construct since one fresh instance is used per rayon task.
pub fn run_cycle<G, F>(state: &Arc<TournamentState>, make_game: &F)
where
    G: GameAdapter,
    F: Fn() -> G + Sync,
{
    let mut working = {
        let mut shared = state.inner.lock().unwrap();
        if shared.restart {
            shared.restart = false;
            let pending = std::mem::take(&mut shared.pending_models);
            let target = state.cfg.target_population.min(shared.population.len() + pending.len());
            if shared.population.len() > target {
                let to_erase = shared.population.len() - target;
                let rates = win_rates(&shared.population.data);
                let mut order: Vec<usize> = (0..rates.len()).collect();
                order.sort_by(|&a, &b| rates[a].partial_cmp(&rates[b]).unwrap());
                let mut erase = vec![false; rates.len()];
                for &idx in order.iter().take(to_erase) {
                    erase[idx] = true;
                }
                shared.population.erase(&erase);
            }
            shared.population.grow_to(target, pending.into_iter());
        }
        clone_population(&shared.population)
    };

    let n = working.models.len();
    'cells: for i in 0..n {
        for j in 0..n {
            if i == j {
                continue;
            }
            if state.inner.lock().unwrap().restart {
                break 'cells;
            }
            if !state.inner.lock().unwrap().paused {
                if working.data[i][j].total() < state.cfg.max_samples_per_cell {
                    let stats = play_batch_parallel(make_game, &working.models[i], &working.models[j], state.cfg.batch_size);
                    working.data[i][j].add(stats);
                }
            } else {
                state.cv.notify_all();
            }
        }
    }

    let rates = win_rates(&working.data);
    let mut shared = state.inner.lock().unwrap();
    if !shared.restart {
        shared.population = working;
        shared.win_rates = rates;
        shared.updated = true;
        info!("tournament: cycle complete, population {} models", shared.population.len());
    }
}

fn clone_population(p: &Population) -> Population {
    Population { models: p.models.clone(), data: p.data.clone() }
}
