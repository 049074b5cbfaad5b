//! Testing utilities and mock implementations
//!
//! Mocks for the game session and the settings store, usable from unit and
//! integration tests without a broker or a game server.

pub mod mocks;

pub use mocks::*;
