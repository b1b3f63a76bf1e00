//! Game adapter contract: the narrow interface the CORE needs from a game —
//! encode a state, list legal actions, advance, report the result. Game
//! rules themselves live in `games::`, not here.
//!
//! Grounded on `game.h`'s `Game` interface and `Encoded` state layout.

/// Outcome of a finished (or in-progress) game, from a neutral perspective.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum GameResult {
    Playing,
    P1Win,
    P2Win,
    Timeout,
}

/// A flat encoding of game state: shared board features plus each player's
/// hand, laid out for direct consumption by `Model::calc`.
#[derive(Debug, Clone)]
pub struct EncodedState {
    board: Vec<f32>,
    me_cards: Vec<Vec<f32>>,
    you_cards: Vec<Vec<f32>>,
}

impl EncodedState {
    pub fn new(board: Vec<f32>, me_cards: Vec<Vec<f32>>, you_cards: Vec<Vec<f32>>) -> EncodedState {
        EncodedState { board, me_cards, you_cards }
    }

    pub fn board(&self) -> &[f32] {
        &self.board
    }

    pub fn me_card(&self, i: usize) -> &[f32] {
        &self.me_cards[i]
    }

    pub fn you_card(&self, i: usize) -> &[f32] {
        &self.you_cards[i]
    }

    pub fn me_cards(&self) -> &[Vec<f32>] {
        &self.me_cards
    }

    pub fn you_cards(&self) -> &[Vec<f32>] {
        &self.you_cards
    }

    pub fn me_card_count(&self) -> usize {
        self.me_cards.len()
    }

    pub fn you_card_count(&self) -> usize {
        self.you_cards.len()
    }

    /// Number of legal actions for the player to move: one "pass" slot plus
    /// one per card in their hand.
    pub fn avail_actions(&self) -> usize {
        self.me_cards.len() + 1
    }
}

/// The interface a concrete game must provide. RNG is external: an adapter
/// is constructed with (or seeded by) whatever randomness its game needs,
/// and `init()` performs a deterministic reset of that already-seeded state.
pub trait GameAdapter {
    /// Resets to a fresh game state.
    fn init(&mut self);

    /// Encodes the current state from the mover's perspective: "me" is
    /// whoever is about to act.
    fn encode(&self) -> EncodedState;

    /// Applies action `index` (0 = pass, `i+1` = play hand card `i`) from
    /// the mover's perspective. Out-of-range indices are clamped to pass,
    /// not signalled as an error (see the game-adapter error policy).
    fn advance(&mut self, index: usize);

    fn cur_result(&self) -> GameResult;

    /// True when player 2 is the mover.
    fn player2_turn(&self) -> bool;

    fn turn(&self) -> u32;
}
