//! Self-play reinforcement-learning engine for a small two-player card
//! game: a hand-rolled numeric kernel (`numeric`), a dense layer with a
//! residual skip and Adam-style moments (`layer`), a leaky-ReLU layer stack
//! (`layer_stack`), the composite board/card/trunk/head network
//! (`model`), a self-play training worker (`worker`), and a pairwise
//! round-robin tournament engine (`tournament`).
//!
//! `game` defines the narrow adapter contract the CORE needs from a game;
//! `games::duel` is the one concrete fixture shipped in-tree.

pub mod arena;
pub mod config;
pub mod coordination;
pub mod game;
pub mod games;
pub mod layer;
pub mod layer_stack;
pub mod model;
pub mod numeric;
pub mod persistence;
pub mod tournament;
pub mod worker;
