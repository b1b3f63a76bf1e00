//! A small duel card game: health, mana, a creature, a defense value, and a
//! hand of cards drawn one per turn. Supplied as the one concrete
//! `GameAdapter` implementation used by the CLI binaries and tests; it is a
//! fixture, not a rules authority (§1 Non-goals).
//!
//! Grounded on `game.h`/`game.cpp`'s `Card`/`Player`/`Game`.

use crate::game::{EncodedState, GameAdapter, GameResult};
use rand::rngs::StdRng;
use rand::Rng;

pub const ARTIFACT_TYPES: usize = 5;
pub const CARD_TYPES: usize = 6;
pub const CARD_ENCODED_SIZE: usize = CARD_TYPES + ARTIFACT_TYPES;
pub const PLAYER_ENCODED_SIZE: usize = 4 + ARTIFACT_TYPES;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CardType {
    Creature,
    Direct,
    Heal,
    Land,
    Draw3,
    Artifact,
}

#[derive(Debug, Clone, Copy)]
pub struct Card {
    pub kind: CardType,
    pub value: i32,
}

impl Card {
    /// Matches `Card::randomize`: only the first four types are ever drawn.
    fn random<R: Rng>(rng: &mut R) -> Card {
        let kind = match rng.random_range(0..4) {
            0 => CardType::Creature,
            1 => CardType::Direct,
            2 => CardType::Heal,
            _ => CardType::Land,
        };
        let value = if kind == CardType::Land { 10 } else { 1 + rng.random_range(0..7) };
        Card { kind, value }
    }

    fn encode(&self) -> Vec<f32> {
        let mut out = vec![0.0f32; CARD_ENCODED_SIZE];
        let idx = match self.kind {
            CardType::Creature => 0,
            CardType::Direct => 1,
            CardType::Heal => 2,
            CardType::Land => 3,
            CardType::Draw3 => 4,
            CardType::Artifact => 5,
        };
        out[idx] = self.value as f32 / 10.0;
        out
    }
}

#[derive(Debug, Clone)]
pub struct Player {
    pub health: i32,
    pub mana: i32,
    pub creature: i32,
    pub def: i32,
    pub hand: Vec<Card>,
}

impl Player {
    fn init<R: Rng>(initial_hand_size: usize, rng: &mut R) -> Player {
        Player {
            health: 20,
            mana: 1,
            creature: 0,
            def: 0,
            hand: (0..initial_hand_size).map(|_| Card::random(rng)).collect(),
        }
    }

    fn encode(&self) -> Vec<f32> {
        let mut out = vec![0.0f32; PLAYER_ENCODED_SIZE];
        out[0] = self.health as f32 / 10.0;
        out[1] = self.mana as f32 / 10.0;
        out[2] = self.creature as f32 / 10.0;
        out[3] = self.def as f32 / 10.0;
        out
    }

    fn encode_cards(&self) -> Vec<Vec<f32>> {
        self.hand.iter().map(Card::encode).collect()
    }
}

/// A two-player duel. Owns its own RNG, seeded once at construction; `init`
/// resets board state but does not reseed (matching the global-RNG-keeps-
/// advancing behavior of the original, which never reseeds between games).
#[derive(Debug, Clone)]
pub struct DuelGame {
    p1: Player,
    p2: Player,
    player2_turn: bool,
    turn: u32,
    rng: StdRng,
}

const TIMEOUT_TURN: u32 = 30;

impl DuelGame {
    pub fn new(rng: StdRng) -> DuelGame {
        let mut game = DuelGame { p1: Player::init(3, &mut rng.clone()), p2: Player::init(5, &mut rng.clone()), player2_turn: false, turn: 0, rng };
        game.init();
        game
    }

    fn cur_player(&self) -> &Player {
        if self.player2_turn { &self.p2 } else { &self.p1 }
    }
}

impl GameAdapter for DuelGame {
    fn init(&mut self) {
        self.p1 = Player::init(3, &mut self.rng);
        self.p2 = Player::init(5, &mut self.rng);
        self.player2_turn = false;
        self.turn = 0;
    }

    fn encode(&self) -> EncodedState {
        let (me, you) = if self.player2_turn { (&self.p2, &self.p1) } else { (&self.p1, &self.p2) };
        let mut board = Vec::with_capacity(2 + PLAYER_ENCODED_SIZE * 2);
        board.push(self.turn as f32 / 30.0);
        board.push(if self.player2_turn { 1.0 } else { 0.0 });
        board.extend(me.encode());
        board.extend(you.encode());
        EncodedState::new(board, me.encode_cards(), you.encode_cards())
    }

    fn advance(&mut self, index: usize) {
        let me_cards = self.cur_player().hand.len();
        let action = if index > me_cards { 0 } else { index };

        let rng = &mut self.rng;
        let (me, you) = if self.player2_turn { (&mut self.p2, &mut self.p1) } else { (&mut self.p1, &mut self.p2) };

        if action > 0 {
            let card = me.hand[action - 1];
            match card.kind {
                CardType::Land => me.mana += 1,
                _ if me.mana >= card.value => match card.kind {
                    CardType::Creature => me.creature = me.creature.max(card.value),
                    CardType::Direct => you.health -= card.value,
                    CardType::Heal => me.health += card.value,
                    _ => {}
                },
                _ => me.mana += 1,
            }
            me.hand.remove(action - 1);
        }
        me.hand.push(Card::random(rng));

        you.health -= (me.creature - you.def).max(0);
        self.player2_turn = !self.player2_turn;
        self.turn += 1;
    }

    fn cur_result(&self) -> GameResult {
        if self.p1.health <= 0 {
            GameResult::P2Win
        } else if self.p2.health <= 0 {
            GameResult::P1Win
        } else if self.turn > TIMEOUT_TURN {
            GameResult::Timeout
        } else {
            GameResult::Playing
        }
    }

    fn player2_turn(&self) -> bool {
        self.player2_turn
    }

    fn turn(&self) -> u32 {
        self.turn
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use rand::SeedableRng;

    #[test]
    fn board_width_matches_encoded_size() {
        let game = DuelGame::new(StdRng::seed_from_u64(1));
        let encoded = game.encode();
        assert_eq!(encoded.board().len(), 2 + PLAYER_ENCODED_SIZE * 2);
    }

    #[test]
    fn out_of_range_action_is_clamped_to_pass() {
        let mut game = DuelGame::new(StdRng::seed_from_u64(2));
        let hand_before = game.cur_player().hand.len();
        game.advance(999);
        assert_eq!(game.cur_player().hand.len(), hand_before);
    }

    #[test]
    fn timeout_after_thirty_turns() {
        let mut game = DuelGame::new(StdRng::seed_from_u64(3));
        for _ in 0..=TIMEOUT_TURN {
            if game.cur_result() != GameResult::Playing {
                break;
            }
            game.advance(0);
        }
        assert_ne!(game.cur_result(), GameResult::Playing);
    }
}
