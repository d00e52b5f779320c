//! Mandatory room-action dispatch table.

use serde::{Deserialize, Serialize};

use crate::core::random::RandomSource;
use crate::core::types::DeckId;

/// Per-location mandatory action.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum RoomActionRule {
    /// Always draw from `deck`.
    Deterministic { deck: DeckId },
    /// Draw from one of `decks`, chosen uniformly.
    Probabilistic { decks: Vec<DeckId> },
    /// Perform `special` when its precondition holds, otherwise draw from
    /// `fallback`.
    SpecialWithFallback {
        special: SpecialAction,
        fallback: DeckId,
    },
    /// No legal action; the turn records an explicit marker.
    None,
}

impl RoomActionRule {
    /// Decks this rule may draw from.
    pub fn decks(&self) -> Vec<&DeckId> {
        match self {
            RoomActionRule::Deterministic { deck } => vec![deck],
            RoomActionRule::Probabilistic { decks } => decks.iter().collect(),
            RoomActionRule::SpecialWithFallback { fallback, .. } => vec![fallback],
            RoomActionRule::None => Vec::new(),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum SpecialAction {
    /// Damage an opponent anywhere on the board.
    Hex { damage: u8 },
    /// Take one piece of equipment from another agent.
    StealEquipment,
}

/// What the resolver must do for a rule, after randomness is spent.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RoomActionPlan {
    Draw(DeckId),
    Special {
        action: SpecialAction,
        fallback: DeckId,
    },
    NoLegalAction,
}

/// Turn a rule into a plan. Only `Probabilistic` consumes randomness.
pub fn plan_room_action(rule: &RoomActionRule, rng: &RandomSource) -> RoomActionPlan {
    match rule {
        RoomActionRule::Deterministic { deck } => RoomActionPlan::Draw(deck.clone()),
        RoomActionRule::Probabilistic { decks } => match decks.len() {
            0 => RoomActionPlan::NoLegalAction,
            len => RoomActionPlan::Draw(decks[rng.pick_index(len)].clone()),
        },
        RoomActionRule::SpecialWithFallback { special, fallback } => RoomActionPlan::Special {
            action: *special,
            fallback: fallback.clone(),
        },
        RoomActionRule::None => RoomActionPlan::NoLegalAction,
    }
}

#[cfg(test)]
mod tests {
    use std::collections::HashMap;

    use super::*;

    fn three_decks() -> RoomActionRule {
        RoomActionRule::Probabilistic {
            decks: vec![
                DeckId::from("white"),
                DeckId::from("black"),
                DeckId::from("green"),
            ],
        }
    }

    #[test]
    fn deterministic_rule_always_draws_its_deck() {
        let rng = RandomSource::seeded(1);
        let rule = RoomActionRule::Deterministic {
            deck: DeckId::from("white"),
        };
        for _ in 0..100 {
            assert_eq!(
                plan_room_action(&rule, &rng),
                RoomActionPlan::Draw(DeckId::from("white"))
            );
        }
    }

    #[test]
    fn probabilistic_rule_is_close_to_uniform() {
        let rng = RandomSource::seeded(0x5eed);
        let rule = three_decks();
        let mut counts: HashMap<DeckId, u32> = HashMap::new();
        for _ in 0..3000 {
            match plan_room_action(&rule, &rng) {
                RoomActionPlan::Draw(deck) => *counts.entry(deck).or_default() += 1,
                other => panic!("unexpected plan {other:?}"),
            }
        }
        assert_eq!(counts.len(), 3);
        for (deck, count) in counts {
            // 1000 expected; sd ~= 26.
            assert!((880..=1120).contains(&count), "{deck}: {count}");
        }
    }

    #[test]
    fn none_and_empty_probabilistic_yield_no_legal_action() {
        let rng = RandomSource::seeded(1);
        assert_eq!(
            plan_room_action(&RoomActionRule::None, &rng),
            RoomActionPlan::NoLegalAction
        );
        assert_eq!(
            plan_room_action(&RoomActionRule::Probabilistic { decks: Vec::new() }, &rng),
            RoomActionPlan::NoLegalAction
        );
    }

    #[test]
    fn special_rule_carries_its_fallback() {
        let rng = RandomSource::seeded(1);
        let rule = RoomActionRule::SpecialWithFallback {
            special: SpecialAction::StealEquipment,
            fallback: DeckId::from("black"),
        };
        assert_eq!(
            plan_room_action(&rule, &rng),
            RoomActionPlan::Special {
                action: SpecialAction::StealEquipment,
                fallback: DeckId::from("black"),
            }
        );
    }
}
