//! Plays games between two models using the partial-information head only
//! (a real opponent's hand is not visible at decision time) — shared by the
//! self-play worker's baseline competition thread and the tournament
//! engine's round-robin batches.
//!
//! Grounded on `shared/worker.cpp`'s `compete_baseline_work` (both-orderings
//! batches against a baseline) and `bin/main.cpp`'s `Tournament_Group::Worker::work`
//! (`run_100`'s `p1_wins`/`p2_wins`/ties batch play).

use rayon::prelude::*;

use crate::game::{GameAdapter, GameResult};
use crate::model::Model;

/// Outcome of a batch of games between a fixed "player 1" and "player 2"
/// model assignment.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq)]
pub struct WinStats {
    pub p1: u32,
    pub p2: u32,
    pub tie: u32,
}

impl WinStats {
    pub fn total(&self) -> u32 {
        self.p1 + self.p2 + self.tie
    }
}

/// Plays one game to completion, `model_p1` acting for player 1 and
/// `model_p2` for player 2, each choosing `argmax` on its partial-
/// information evaluation. Returns the terminal result.
pub fn play_game<G: GameAdapter>(game: &mut G, model_p1: &mut Model, model_p2: &mut Model) -> GameResult {
    game.init();
    loop {
        match game.cur_result() {
            GameResult::Playing => {}
            result => return result,
        }
        let state = game.encode();
        let mover = if game.player2_turn() { &mut *model_p2 } else { &mut *model_p1 };
        let eval = mover.calc(state.board(), state.me_cards(), state.you_cards(), false);
        game.advance(eval.argmax());
    }
}

/// Plays `count` games and tallies the outcome from player 1/player 2's
/// perspective (a `Timeout` result counts as a tie).
pub fn play_batch<G: GameAdapter>(game: &mut G, model_p1: &mut Model, model_p2: &mut Model, count: u32) -> WinStats {
    let mut stats = WinStats::default();
    for _ in 0..count {
        match play_game(game, model_p1, model_p2) {
            GameResult::P1Win => stats.p1 += 1,
            GameResult::P2Win => stats.p2 += 1,
            GameResult::Timeout => stats.tie += 1,
            GameResult::Playing => unreachable!("play_game only returns terminal results"),
        }
    }
    stats
}

/// Same tally as [`play_batch`], but each game runs as its own `rayon` task
/// against an independently constructed game instance, cloning `model_p1`/
/// `model_p2` per task (tournament cells do this for their 100-game
/// batches; see spec.md §4.7's ambient note on `rayon` use).
pub fn play_batch_parallel<G, F>(make_game: &F, model_p1: &Model, model_p2: &Model, count: u32) -> WinStats
where
    G: GameAdapter,
    F: Fn() -> G + Sync,
{
    (0..count)
        .into_par_iter()
        .map(|_| {
            let mut game = make_game();
            let mut mp1 = model_p1.clone();
            let mut mp2 = model_p2.clone();
            play_game(&mut game, &mut mp1, &mut mp2)
        })
        .fold(WinStats::default, |mut acc, result| {
            match result {
                GameResult::P1Win => acc.p1 += 1,
                GameResult::P2Win => acc.p2 += 1,
                GameResult::Timeout => acc.tie += 1,
                GameResult::Playing => unreachable!("play_game only returns terminal results"),
            }
            acc
        })
        .reduce(WinStats::default, |a, b| WinStats { p1: a.p1 + b.p1, p2: a.p2 + b.p2, tie: a.tie + b.tie })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::games::duel::DuelGame;
    use crate::model::ModelConfig;
    use rand::rngs::StdRng;
    use rand::SeedableRng;

    #[test]
    fn batch_tally_sums_to_count() {
        let mut game = DuelGame::new(StdRng::seed_from_u64(21));
        let cfg = ModelConfig::new(20, 11);
        let mut m1 = Model::new(&cfg);
        let mut m2 = Model::new(&cfg);
        let mut rng = StdRng::seed_from_u64(22);
        m1.randomize(&mut rng);
        m2.randomize(&mut rng);
        let stats = play_batch(&mut game, &mut m1, &mut m2, 5);
        assert_eq!(stats.total(), 5);
    }

    #[test]
    fn parallel_batch_tally_sums_to_count() {
        let cfg = ModelConfig::new(20, 11);
        let mut m1 = Model::new(&cfg);
        let mut m2 = Model::new(&cfg);
        let mut rng = StdRng::seed_from_u64(23);
        m1.randomize(&mut rng);
        m2.randomize(&mut rng);
        let stats = play_batch_parallel(&|| DuelGame::new(StdRng::seed_from_u64(24)), &m1, &m2, 6);
        assert_eq!(stats.total(), 6);
    }
}
