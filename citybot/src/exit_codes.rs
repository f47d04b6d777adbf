//! Stable exit codes for citybot CLI commands.

/// Command succeeded.
pub const OK: i32 = 0;
/// Invalid config, unreadable state, or any other failure.
pub const INVALID: i32 = 1;
