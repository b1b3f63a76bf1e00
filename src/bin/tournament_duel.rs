//! Loads a directory of previously-published model snapshots (see
//! `train_duel`) and runs the tournament engine (C7) against them
//! standalone, printing the final win-rate ranking.
//!
//! Thin wiring only (spec.md §4.12 / SPEC_FULL.md C12).

use std::fs;
use std::path::PathBuf;

use clap::Parser;
use log::info;
use rand::rngs::StdRng;
use rand::SeedableRng;

use duel_selfplay::config::TournamentConfig;
use duel_selfplay::games::duel::DuelGame;
use duel_selfplay::persistence::from_document;
use duel_selfplay::tournament::{run_cycle, TournamentState};

#[derive(Parser, Debug)]
#[command(about = "Run a standalone round-robin tournament over saved duel snapshots")]
struct Args {
    /// Directory of `*.json` model documents (see `train_duel --out-dir`).
    #[arg(long)]
    snapshots: PathBuf,

    /// Target population size to keep after culling.
    #[arg(long, default_value_t = 12)]
    target_population: usize,

    /// Required sample count per ordered pair before a cell is saturated.
    #[arg(long, default_value_t = 250)]
    max_samples_per_cell: u32,

    /// Games played per batch within a cell.
    #[arg(long, default_value_t = 100)]
    batch_size: u32,

    /// Safety cap on wake cycles, in case the population never saturates.
    #[arg(long, default_value_t = 64)]
    max_cycles: u32,
}

fn main() {
    env_logger::Builder::from_env(env_logger::Env::default().default_filter_or("info")).init();
    let args = Args::parse();

    let mut names = Vec::new();
    let mut models = Vec::new();
    for entry in fs::read_dir(&args.snapshots).expect("snapshot directory must be readable") {
        let entry = entry.expect("directory entry must be readable");
        if entry.path().extension().map(|e| e != "json").unwrap_or(true) {
            continue;
        }
        let raw = fs::read_to_string(entry.path()).expect("snapshot file must be readable");
        let value: serde_json::Value = serde_json::from_str(&raw).expect("snapshot file must be valid JSON");
        let (model, name, generation) = from_document(value).expect("snapshot must match the model document schema");
        names.push(format!("{name}#{generation}"));
        models.push(model);
    }
    if models.is_empty() {
        eprintln!("no snapshots found in {:?}", args.snapshots);
        std::process::exit(1);
    }
    info!("loaded {} snapshots", models.len());

    let cfg = TournamentConfig { target_population: args.target_population, max_samples_per_cell: args.max_samples_per_cell, batch_size: args.batch_size };
    let state = TournamentState::new(cfg);
    for model in models {
        state.submit_snapshot(model);
    }

    for cycle in 0..args.max_cycles {
        run_cycle(&state, &|| DuelGame::new(StdRng::seed_from_u64(rand::random())));
        info!("cycle {cycle}: population {}", state.population_size());
        if state.population_size() <= args.target_population {
            break;
        }
    }

    info!("snapshots submitted (pre-cull order): {names:?}");

    let rates = state.win_rates();
    let mut ranked: Vec<(usize, f32)> = rates.iter().copied().enumerate().collect();
    ranked.sort_by(|a, b| b.1.partial_cmp(&a.1).unwrap());
    println!("{:<8} win-rate", "model#");
    for (idx, rate) in ranked {
        println!("{idx:<8} {rate:.1}");
    }
}
