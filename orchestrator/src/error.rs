//! Failures that abort a turn.
//!
//! Guard-policy outcomes (stale tokens, re-entry, rooms without a legal
//! action) are not represented here; they are ordinary return values.

use std::time::Duration;

use thiserror::Error;

use crate::core::types::{AgentId, DeckId, LocationId, RollKind};

#[derive(Debug, Error)]
pub enum TurnError {
    #[error("no {kind} finalize event for agent {actor} within {timeout:?}")]
    ConfirmationTimeout {
        kind: RollKind,
        actor: AgentId,
        timeout: Duration,
    },
    #[error("finalize channel closed while waiting for {kind} by agent {actor}")]
    FinalizeChannelClosed { kind: RollKind, actor: AgentId },
    #[error("store write to '{path}' failed: {reason}")]
    StoreWrite { path: String, reason: String },
    #[error("orchestrator lease held by '{holder}'")]
    LeaseHeld { holder: String },
    #[error("orchestrator lease for '{instance}' was lost")]
    LeaseLost { instance: String },
    #[error("turn {serial} finished without a room-action record")]
    MissingRoomAction { serial: u64 },
    #[error("unknown agent {0}")]
    UnknownAgent(AgentId),
    #[error("unknown location '{0}'")]
    UnknownLocation(LocationId),
    #[error("unknown deck '{0}'")]
    UnknownDeck(DeckId),
}
