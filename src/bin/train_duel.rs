//! Spins up N self-play workers training against `games::duel`, logs
//! progress, and periodically writes each worker's published snapshot to a
//! directory via the persistence (C8) document format.
//!
//! Thin wiring only (spec.md §4.12 / SPEC_FULL.md C12) — all algorithmic
//! weight stays in the library's C1-C9 modules.

use std::fs;
use std::path::PathBuf;
use std::time::{Duration, Instant};

use clap::Parser;
use log::info;
use rand::rngs::StdRng;
use rand::SeedableRng;

use duel_selfplay::config::WorkerConfig;
use duel_selfplay::games::duel::{DuelGame, CARD_ENCODED_SIZE, PLAYER_ENCODED_SIZE};
use duel_selfplay::model::{Model, ModelConfig};
use duel_selfplay::persistence::to_document;
use duel_selfplay::worker;

#[derive(Parser, Debug)]
#[command(about = "Train a population of self-play duel models")]
struct Args {
    /// Number of independent self-play workers to run.
    #[arg(long, default_value_t = 4)]
    workers: usize,

    /// Learning rate handed to every worker's Adam-style update.
    #[arg(long, default_value_t = 5e-4)]
    learn_rate: f32,

    /// Directory snapshots are written into every `--snapshot-every`.
    #[arg(long, default_value = "snapshots")]
    out_dir: PathBuf,

    /// Wall-clock seconds to train before a clean shutdown.
    #[arg(long, default_value_t = 30)]
    seconds: u64,

    /// How often (wall-clock seconds) to dump every worker's current model.
    #[arg(long, default_value_t = 5)]
    snapshot_every: u64,

    /// RNG seed; each worker derives its own seed from this.
    #[arg(long, default_value_t = 1)]
    seed: u64,
}

fn board_width() -> usize {
    2 + PLAYER_ENCODED_SIZE * 2
}

fn write_snapshot(out_dir: &PathBuf, handle: &worker::WorkerHandle, generation_hint: u64) -> std::io::Result<()> {
    let model = handle.slot.clone_model();
    let name = handle.slot.name();
    let doc = to_document(&model, &name, generation_hint).expect("model document always serializes");
    let path = out_dir.join(format!("{}.json", name.replace('#', "_gen")));
    fs::write(path, serde_json::to_string_pretty(&doc)?)
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    fs::create_dir_all(&args.out_dir).expect("snapshot directory must be creatable");

    let cfg = ModelConfig::new(board_width(), CARD_ENCODED_SIZE);
    let worker_cfg = WorkerConfig::default();
    worker_cfg.set_learn_rate(args.learn_rate);

    let mut handles = Vec::with_capacity(args.workers);
    for i in 0..args.workers {
        let mut seed_model = Model::new(&cfg);
        let mut rng = StdRng::seed_from_u64(args.seed.wrapping_add(i as u64));
        seed_model.randomize(&mut rng);
        let worker_seed = args.seed.wrapping_add(1000 + i as u64);
        let handle = worker::spawn(format!("duel-{i}"), || DuelGame::new(StdRng::seed_from_u64(rand::random())), seed_model, worker_cfg.clone(), None, worker_seed);
        handles.push(handle);
    }

    info!("spawned {} workers, training for {}s", args.workers, args.seconds);
    let start = Instant::now();
    let mut last_snapshot = Instant::now();
    while start.elapsed() < Duration::from_secs(args.seconds) {
        std::thread::sleep(Duration::from_millis(200));
        if last_snapshot.elapsed() >= Duration::from_secs(args.snapshot_every) {
            for handle in &handles {
                if let Err(e) = write_snapshot(&args.out_dir, handle, handle.slot.generation()) {
                    log::warn!("failed to write snapshot: {e}");
                }
                info!("worker {}: {} trials so far", handle.slot.name(), handle.telemetry.trials());
            }
            last_snapshot = Instant::now();
        }
    }

    info!("shutting down");
    for handle in &handles {
        handle.control.request_exit();
    }
    for handle in handles {
        write_snapshot(&args.out_dir, &handle, handle.slot.generation()).ok();
        handle.join();
    }
    info!("all workers joined");
}
