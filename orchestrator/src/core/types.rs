//! Shared deterministic types for the turn orchestrator.
//!
//! These types define stable contracts between core components and the
//! collaborators in [`crate::io`]. They carry no I/O and serialize to the
//! shapes written into the shared state store.

use std::fmt;

use serde::{Deserialize, Serialize};
use tokio::time::Instant;

use crate::core::board::CardEffect;
use crate::core::rules::SpecialAction;

/// Stable agent identifier assigned by seat assignment.
///
/// Ordering is used as the fixed tie-break wherever two candidates are equally
/// good (lowest id wins).
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AgentId(pub u32);

impl fmt::Display for AgentId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.0)
    }
}

macro_rules! string_id {
    ($(#[$meta:meta])* $name:ident) => {
        $(#[$meta])*
        #[derive(Debug, Clone, PartialEq, Eq, PartialOrd, Ord, Hash, Serialize, Deserialize)]
        #[serde(transparent)]
        pub struct $name(pub String);

        impl $name {
            pub fn as_str(&self) -> &str {
                &self.0
            }
        }

        impl fmt::Display for $name {
            fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
                f.write_str(&self.0)
            }
        }

        impl From<&str> for $name {
            fn from(value: &str) -> Self {
                Self(value.to_string())
            }
        }
    };
}

string_id!(
    /// Board location (room) identifier.
    LocationId
);
string_id!(
    /// Deck identifier.
    DeckId
);
string_id!(
    /// Card identifier, unique across all decks of a board.
    CardId
);
string_id!(
    /// Green negotiation request identifier.
    RequestId
);

/// Allegiance of an agent.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum Faction {
    Hunter,
    Shadow,
    Neutral,
}

impl fmt::Display for Faction {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Faction::Hunter => "hunter",
            Faction::Shadow => "shadow",
            Faction::Neutral => "neutral",
        };
        f.write_str(label)
    }
}

/// Seat-assignment output for one agent. Read-only to the orchestrator.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AgentProfile {
    pub id: AgentId,
    pub name: String,
    pub color: String,
    pub faction: Faction,
    #[serde(default)]
    pub seat: u8,
    #[serde(default)]
    pub autonomous: bool,
}

/// Unified actor record: the roster profile joined with live board state.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct Agent {
    pub id: AgentId,
    pub name: String,
    pub color: String,
    pub faction: Faction,
    pub position: Option<LocationId>,
    pub hp: i32,
    pub autonomous: bool,
    pub equipment: Vec<String>,
}

impl Agent {
    pub fn from_profile(profile: &AgentProfile, position: Option<LocationId>, hp: i32) -> Self {
        Self {
            id: profile.id,
            name: profile.name.clone(),
            color: profile.color.clone(),
            faction: profile.faction,
            position,
            hp,
            autonomous: profile.autonomous,
            equipment: Vec::new(),
        }
    }

    pub fn is_alive(&self) -> bool {
        self.hp > 0
    }
}

/// Kind of randomized outcome the dice/animation engine resolves.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum RollKind {
    Move,
    Attack,
}

impl fmt::Display for RollKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            RollKind::Move => f.write_str("move"),
            RollKind::Attack => f.write_str("attack"),
        }
    }
}

/// Identity of one started roll, unique per finalize bus.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord, Hash)]
pub struct RollId(pub u64);

impl fmt::Display for RollId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "r{}", self.0)
    }
}

/// Handle on a started roll. Only the finalize event carrying the same
/// [`RollId`] settles it.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct RollTicket {
    pub id: RollId,
    pub kind: RollKind,
    pub actor: AgentId,
}

/// Completion signal of a randomized outcome animation.
///
/// `timestamp` is monotonic; it anchors the visual sync delay.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct FinalizeEvent {
    pub roll: RollId,
    pub kind: RollKind,
    pub actor: AgentId,
    pub timestamp: Instant,
    pub value: u8,
}

/// Hit-point change applied to one agent.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AppliedEffect {
    pub target: AgentId,
    pub effect: CardEffect,
    pub hp_after: i32,
}

/// Outcome of the five-phase card flow.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardDrawResult {
    pub deck_id: DeckId,
    pub card_id: CardId,
    pub applied_effects: Vec<AppliedEffect>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub granted_equipment: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub negotiation: Option<RequestId>,
}

/// Terminal completion record of the mandatory room action.
///
/// Every completed turn carries exactly one of these; `NoLegalAction` is the
/// explicit marker for locations without a legal action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RoomActionOutcome {
    Draw {
        location: LocationId,
        draw: CardDrawResult,
    },
    Special {
        location: LocationId,
        action: SpecialAction,
        applied_effects: Vec<AppliedEffect>,
        #[serde(default, skip_serializing_if = "Option::is_none")]
        moved_equipment: Option<String>,
    },
    NoLegalAction {
        location: Option<LocationId>,
    },
}

impl RoomActionOutcome {
    /// Deck drawn from, if this outcome is (or fell back to) a draw.
    pub fn drawn_deck(&self) -> Option<&DeckId> {
        match self {
            RoomActionOutcome::Draw { draw, .. } => Some(&draw.deck_id),
            _ => None,
        }
    }
}

/// Result of the single attack a turn may perform.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct AttackRecord {
    pub attacker: AgentId,
    pub target: AgentId,
    pub damage: u8,
    pub target_hp: i32,
}
