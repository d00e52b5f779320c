//! Turn phase state machine.

use std::fmt;

use serde::{Deserialize, Serialize};

/// Phase of the active turn.
///
/// Phases only move forward along `Idle → Move → RoomAction → (Attack) → End`;
/// any non-terminal phase may jump to `Cancelled`. A fresh token resets the
/// machine to `Idle`.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum TurnPhase {
    #[default]
    Idle,
    Move,
    RoomAction,
    Attack,
    End,
    Cancelled,
}

impl TurnPhase {
    /// Transition table.
    pub fn can_advance_to(self, next: TurnPhase) -> bool {
        match (self, next) {
            (from, TurnPhase::Cancelled) => !from.is_terminal(),
            (TurnPhase::Idle, TurnPhase::Move)
            | (TurnPhase::Move, TurnPhase::RoomAction)
            | (TurnPhase::RoomAction, TurnPhase::Attack)
            | (TurnPhase::RoomAction, TurnPhase::End)
            | (TurnPhase::Attack, TurnPhase::End) => true,
            _ => false,
        }
    }

    pub fn is_terminal(self) -> bool {
        matches!(self, TurnPhase::End | TurnPhase::Cancelled)
    }

    pub fn as_str(self) -> &'static str {
        match self {
            TurnPhase::Idle => "idle",
            TurnPhase::Move => "move",
            TurnPhase::RoomAction => "room_action",
            TurnPhase::Attack => "attack",
            TurnPhase::End => "end",
            TurnPhase::Cancelled => "cancelled",
        }
    }
}

impl fmt::Display for TurnPhase {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}
