//! Runtime configuration: plain structs with `Default` impls for the knobs
//! spec.md §6 names, instead of the original's scattered file-scope global
//! variables (`s_learn_rate`, `target_tournament`, `max_samples`, ...).
//!
//! Grounded on `shared/worker.h`'s `Worker` member defaults and
//! `bin/main.cpp`'s `target_tournament`/`max_samples` constants.

use std::sync::atomic::{AtomicU32, Ordering};

/// Per-worker runtime knobs. `learn_rate` is retunable while the worker
/// thread runs (spec.md §6), so it is stored as a bit-cast `AtomicU32`
/// rather than a plain field.
#[derive(Debug)]
pub struct WorkerConfig {
    learn_rate_bits: AtomicU32,
    /// `learn()` + `backprop_init()` every this many iterations.
    pub learn_every: u32,
    /// `normalize()` every this many iterations.
    pub normalize_every: u32,
    /// Publish a snapshot every this many iterations.
    pub publish_every: u32,
    /// Size of the per-worker ring of recently published snapshots.
    pub compete_ring: usize,
    /// Length of the rolling telemetry rings (squared-error, baseline
    /// win-fraction).
    pub telemetry_ring: usize,
}

impl WorkerConfig {
    pub fn learn_rate(&self) -> f32 {
        f32::from_bits(self.learn_rate_bits.load(Ordering::Relaxed))
    }

    pub fn set_learn_rate(&self, rate: f32) {
        self.learn_rate_bits.store(rate.to_bits(), Ordering::Relaxed);
    }
}

impl Clone for WorkerConfig {
    fn clone(&self) -> WorkerConfig {
        WorkerConfig {
            learn_rate_bits: AtomicU32::new(self.learn_rate_bits.load(Ordering::Relaxed)),
            learn_every: self.learn_every,
            normalize_every: self.normalize_every,
            publish_every: self.publish_every,
            compete_ring: self.compete_ring,
            telemetry_ring: self.telemetry_ring,
        }
    }
}

impl Default for WorkerConfig {
    fn default() -> WorkerConfig {
        WorkerConfig {
            learn_rate_bits: AtomicU32::new((5e-4f32).to_bits()),
            learn_every: 10,
            normalize_every: 200,
            publish_every: 300,
            compete_ring: 200,
            telemetry_ring: 200,
        }
    }
}

/// Tournament engine knobs (spec.md §6: `target_tournament`,
/// `max_samples_per_cell`, `batch_size`, `compete_ring`).
#[derive(Debug, Clone, Copy)]
pub struct TournamentConfig {
    pub target_population: usize,
    pub max_samples_per_cell: u32,
    pub batch_size: u32,
}

impl Default for TournamentConfig {
    fn default() -> TournamentConfig {
        TournamentConfig { target_population: 12, max_samples_per_cell: 250, batch_size: 100 }
    }
}

/// Per-worker-vs-baseline competition knobs (spec.md §4.7).
#[derive(Debug, Clone, Copy)]
pub struct BaselineConfig {
    pub batches: u32,
    pub games_per_batch: u32,
}

impl Default for BaselineConfig {
    fn default() -> BaselineConfig {
        BaselineConfig { batches: 10, games_per_batch: 10 }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn learn_rate_is_retunable_while_shared() {
        let cfg = WorkerConfig::default();
        assert!((cfg.learn_rate() - 5e-4).abs() < 1e-9);
        cfg.set_learn_rate(0.001);
        assert_eq!(cfg.learn_rate(), 0.001);
    }

    #[test]
    fn defaults_match_spec_knobs() {
        let t = TournamentConfig::default();
        assert_eq!(t.target_population, 12);
        assert_eq!(t.max_samples_per_cell, 250);
        assert_eq!(t.batch_size, 100);
    }
}
