//! Deterministic, pure logic shared by the bot.
//!
//! Core modules must be free of I/O side effects. They operate on detection
//! snapshots and in-memory state and return deterministic outputs suitable
//! for tests.

pub mod bootstrap;
pub mod build_order;
pub mod classes;
pub mod cooldown;
pub mod detection;
pub mod state;
