//! Concrete game adapters. The CORE only depends on the `GameAdapter` trait
//! in `crate::game`; everything here is a fixture for exercising it, not a
//! rules authority.

pub mod duel;
