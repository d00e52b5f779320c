//! Deterministic, pure logic shared by the orchestrator.
//!
//! Core modules must be free of I/O side effects. They operate on in-memory
//! data structures and return deterministic outputs suitable for tests; the
//! only source of variation is an explicitly passed [`random::RandomSource`].

pub mod board;
pub mod faction;
pub mod green;
pub mod guard_state;
pub mod phase;
pub mod random;
pub mod rules;
pub mod target;
pub mod timing;
pub mod types;
