//! Stable exit codes for `repair-loop` commands.

/// The target reached zero static errors and zero test failures (or every batch item did).
pub const OK: i32 = 0;
/// The invocation failed: missing target or binary, invalid config, tool or write error.
pub const INVALID: i32 = 1;
/// The iteration budget ran out before the target was clean.
pub const EXHAUSTED: i32 = 2;
