//! Detection-driven automation for a city-building mobile game.
//!
//! Each configured instance runs its own loop against one Android device:
//! a tutorial bootstrap, one-time startup tasks, then a scheduler that picks
//! one task per perception cycle. The crate keeps a strict split:
//!
//! - **[`core`]**: Pure, deterministic logic (detections, view and tutorial
//!   classification, cooldowns, the persisted data model, the build order).
//!   No I/O, fully testable in isolation.
//! - **[`io`]**: Side-effecting adapters (adb, the detector command, the
//!   clock, JSON state files, TOML config) behind traits so tests can script
//!   them.
//!
//! Orchestration modules ([`bootstrap`], [`pipeline`], [`scheduler`],
//! [`instance`]) combine the two and back the CLI commands.

pub mod bootstrap;
pub mod console;
pub mod control;
pub mod core;
pub mod exit_codes;
pub mod instance;
pub mod io;
pub mod logging;
pub mod pipeline;
pub mod scheduler;
pub mod session;
pub mod tasks;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
