//! Stable exit codes for orchestrator CLI commands.

/// Command succeeded.
pub const OK: i32 = 0;
/// Invalid config, board or roster, or the run failed.
pub const INVALID: i32 = 1;
/// Another orchestrator instance holds the ownership lease.
pub const LEASE_HELD: i32 = 2;
