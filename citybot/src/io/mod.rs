//! Side-effecting adapters: device input, screen capture, detection,
//! persistence, configuration, and the clock.

pub mod clock;
pub mod config;
pub mod detector;
pub mod device;
pub mod process;
pub mod state_store;
