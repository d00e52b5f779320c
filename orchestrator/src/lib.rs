//! Host-authoritative turn orchestrator for autonomous agents.
//!
//! The scheduler drives one agent through a fixed turn protocol (move, the
//! mandatory room action, at most one attack, end) against a shared state
//! store that other observers read concurrently. The crate is split the same
//! way throughout:
//!
//! - **[`core`]**: Pure, deterministic logic (board, guard state, phase table,
//!   target selection, room rules, faction heuristic, negotiation lifecycle).
//!   No I/O, no sleeping.
//! - **[`io`]**: Collaborators behind traits (shared store, ownership lease,
//!   dice and finalize bus, presentation, human input, config, board files).
//!
//! Orchestration modules ([`guard`], [`sync_gate`], [`card_flow`],
//! [`negotiation`], [`room_action`], [`scheduler`], [`driver`], [`simulate`])
//! compose the two into turns.

pub mod card_flow;
pub mod core;
pub mod driver;
pub mod effects;
pub mod error;
pub mod exit_codes;
pub mod guard;
pub mod io;
pub mod logging;
pub mod negotiation;
pub mod room_action;
pub mod scheduler;
pub mod session;
pub mod simulate;
pub mod sync_gate;
#[cfg(any(test, feature = "test-support"))]
pub mod test_support;
