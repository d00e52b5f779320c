//! Collaborators of the orchestrator: configuration, the shared store, dice,
//! presentation and human input. Each sits behind a trait or a narrow type so
//! tests can substitute scripted versions.

pub mod board_file;
pub mod config;
pub mod dice;
pub mod human;
pub mod lease;
pub mod presentation;
pub mod store;
pub mod world;
