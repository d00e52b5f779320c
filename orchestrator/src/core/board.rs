//! Board layout: locations, areas, roll mapping, decks and card content.

use std::collections::HashSet;

use serde::{Deserialize, Serialize};

use crate::core::rules::RoomActionRule;
use crate::core::types::{CardId, DeckId, Faction, LocationId};

/// Roll value that lets the mover pick any location.
pub const FREE_CHOICE_ROLL: u8 = 7;

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Board {
    pub locations: Vec<LocationSpec>,
    pub decks: Vec<DeckSpec>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LocationSpec {
    pub id: LocationId,
    pub name: String,
    /// Locations sharing an area are within attack range of each other.
    pub area: u8,
    /// Move-roll values that land on this location.
    pub rolls: Vec<u8>,
    pub rule: RoomActionRule,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DeckCategory {
    Standard,
    /// Cards handed to a second participant through a green negotiation.
    Negotiation,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct DeckSpec {
    pub id: DeckId,
    pub category: DeckCategory,
    pub cards: Vec<CardSpec>,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct CardSpec {
    pub id: CardId,
    pub name: String,
    #[serde(default)]
    pub effect: CardEffect,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub equipment: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub question: Option<GreenQuestion>,
}

/// Hit-point effect of a card.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum CardEffect {
    #[default]
    None,
    /// Heal the affected agent.
    Heal { amount: u8 },
    /// Damage the affected agent.
    Damage { amount: u8 },
    /// Damage the drawer's nearest eligible opponent.
    DamageNearest { amount: u8 },
}

/// Question carried by a negotiation-category card.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct GreenQuestion {
    /// Receivers of these factions are the card's "same" relation.
    pub factions: Vec<Faction>,
    pub on_affirm: CardEffect,
}

impl Board {
    pub fn location(&self, id: &LocationId) -> Option<&LocationSpec> {
        self.locations.iter().find(|location| &location.id == id)
    }

    pub fn deck(&self, id: &DeckId) -> Option<&DeckSpec> {
        self.decks.iter().find(|deck| &deck.id == id)
    }

    pub fn card(&self, deck: &DeckId, card: &CardId) -> Option<&CardSpec> {
        self.deck(deck)?.cards.iter().find(|spec| &spec.id == card)
    }

    pub fn is_negotiation_deck(&self, id: &DeckId) -> bool {
        self.deck(id)
            .is_some_and(|deck| deck.category == DeckCategory::Negotiation)
    }

    /// Distance between two locations: 0 for the same location, 1 for the
    /// same area, `None` when out of range.
    pub fn distance(&self, a: &LocationId, b: &LocationId) -> Option<u32> {
        if a == b {
            return self.location(a).map(|_| 0);
        }
        let left = self.location(a)?;
        let right = self.location(b)?;
        (left.area == right.area).then_some(1)
    }

    /// Destination for a move roll.
    ///
    /// A free-choice roll takes the first location in board order that differs
    /// from `current`. Any other roll lands on the location listing it, which
    /// may be the current location.
    pub fn destination(&self, roll: u8, current: Option<&LocationId>) -> Option<&LocationId> {
        if roll == FREE_CHOICE_ROLL {
            return self
                .locations
                .iter()
                .map(|location| &location.id)
                .find(|id| Some(*id) != current);
        }
        self.locations
            .iter()
            .find(|location| location.rolls.contains(&roll))
            .map(|location| &location.id)
    }
}

/// Check semantic invariants not expressible in JSON Schema:
/// - Unique location, deck and card ids
/// - No roll value mapped twice, and the free-choice roll never mapped
/// - Every deck named by a room rule exists
/// - Every negotiation-category card carries a question
pub fn validate_board_invariants(board: &Board) -> Vec<String> {
    let mut errors = Vec::new();

    let mut location_ids = HashSet::new();
    let mut rolls = HashSet::new();
    for location in &board.locations {
        if !location_ids.insert(&location.id) {
            errors.push(format!("duplicate location id '{}'", location.id));
        }
        for roll in &location.rolls {
            if *roll == FREE_CHOICE_ROLL {
                errors.push(format!(
                    "{}: roll {} is reserved for free choice",
                    location.id, FREE_CHOICE_ROLL
                ));
            } else if !rolls.insert(*roll) {
                errors.push(format!("{}: roll {} mapped twice", location.id, roll));
            }
        }
        for deck in location.rule.decks() {
            if board.deck(deck).is_none() {
                errors.push(format!("{}: unknown deck '{}'", location.id, deck));
            }
        }
    }

    let mut deck_ids = HashSet::new();
    let mut card_ids = HashSet::new();
    for deck in &board.decks {
        if !deck_ids.insert(&deck.id) {
            errors.push(format!("duplicate deck id '{}'", deck.id));
        }
        if deck.cards.is_empty() {
            errors.push(format!("deck '{}' has no cards", deck.id));
        }
        for card in &deck.cards {
            if !card_ids.insert(&card.id) {
                errors.push(format!("duplicate card id '{}'", card.id));
            }
            if deck.category == DeckCategory::Negotiation && card.question.is_none() {
                errors.push(format!("{}/{}: negotiation card needs a question", deck.id, card.id));
            }
        }
    }

    errors
}
